//! Onion forum crawler library.
//!
//! Crawls a German-language forum board reachable through a SOCKS proxy:
//! the forum and subforum hierarchy with its post listings, the paginated
//! user directory, and each user's profile page. Results are written as
//! JSON snapshots and optionally stored in SQLite.

#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod dates;
pub mod db;
pub mod extract;
pub mod fetch;
pub mod records;
pub mod snapshot;
pub mod walker;
