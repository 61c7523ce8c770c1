//! Stateful traversals that turn fetched pages into record collections.

mod captcha;
mod forums;
mod users;

pub use captcha::*;
pub use forums::*;
pub use users::*;
