//! In-memory board used by the walker tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use onion_forum_crawler::dates::RunContext;
use onion_forum_crawler::fetch::{
    Fetcher, RawResponse, SessionCredential, Transport, TransportError,
};

pub const BASE: &str = "http://forum.test/index.php";

/// Serves canned responses per URL. A URL with several responses yields
/// them in order and then keeps repeating the last one.
#[derive(Default)]
pub struct FakeBoard {
    routes: Mutex<HashMap<String, VecDeque<RawResponse>>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl FakeBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, body: impl Into<String>) -> &Self {
        self.respond(url, RawResponse::ok(body))
    }

    pub fn respond(&self, url: &str, response: RawResponse) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// `(url, session token)` of every request, in order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self, url: &str) -> usize {
        self.requests().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl Transport for FakeBoard {
    async fn get(
        &self,
        url: &str,
        credential: &SessionCredential,
    ) -> Result<RawResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), credential.token().to_string()));

        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .get_mut(url)
            .ok_or_else(|| TransportError::Other(format!("connection refused: {url}")))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue.front().cloned().unwrap())
        }
    }
}

pub fn fetcher(board: &Arc<FakeBoard>) -> Fetcher {
    Fetcher::new(board.clone())
}

pub fn credential() -> SessionCredential {
    SessionCredential::new("PHPSESSID", "session-one")
}

pub fn ctx() -> RunContext {
    RunContext::at(
        NaiveDate::from_ymd_opt(2023, 8, 20)
            .unwrap()
            .and_hms_opt(16, 45, 0)
            .unwrap(),
    )
}

// ========== Board pages ==========

pub fn forum_listing(forums: &[(&str, &str)]) -> String {
    let items: String = forums
        .iter()
        .map(|(title, href)| {
            format!(
                r##"<div class="main-item">
                    <div class="item-subject"><h3><a href="{href}"><span>{title}</span></a></h3></div>
                    <ul class="item-info">
                        <li class="info-topics"><strong>3</strong></li>
                        <li class="info-posts"><strong>1.024</strong></li>
                        <li class="info-lastpost"><strong><a href="#">Gestern 22:10</a></strong> <cite>carol</cite></li>
                    </ul>
                </div>"##
            )
        })
        .collect();
    format!("<html><body><div id=\"brdmain\">{items}</div></body></html>")
}

pub fn subforum_page(subforums: &[(&str, &str)]) -> String {
    let items: String = subforums
        .iter()
        .map(|(title, href)| {
            format!(
                r##"<div class="main-item vf-subforum">
                    <div class="item-subject"><h3><a href="{href}">{title}</a></h3></div>
                    <ul class="item-info">
                        <li class="info-topics"><strong>5</strong></li>
                        <li class="info-posts"><strong>77</strong></li>
                        <li class="info-lastpost"><strong><a href="#">2023-08-01 09:00</a></strong> <cite>dave</cite></li>
                    </ul>
                </div>"##
            )
        })
        .collect();
    format!("<html><body>{items}</body></html>")
}

/// A posts view; titles starting with `~` are rendered as moved posts.
pub fn posts_page(titles: &[&str]) -> String {
    let items: String = titles
        .iter()
        .map(|title| {
            let (class, title) = match title.strip_prefix('~') {
                Some(rest) => ("main-item moved", rest),
                None => ("main-item", *title),
            };
            format!(
                r##"<div class="{class}">
                    <div class="item-subject"><h3><a href="/viewtopic.php?t={title}">{title}</a></h3>
                    <p><span class="byuser">von <cite>erin</cite></span></p></div>
                    <ul class="item-info">
                        <li class="info-replies"><strong>4</strong></li>
                        <li class="info-views"><strong>1,500</strong></li>
                        <li class="info-lastpost"><strong><a href="#">Heute 08:15</a></strong> <cite>frank</cite></li>
                    </ul>
                </div>"##
            )
        })
        .collect();
    format!(r#"<html><body><div class="main forum-views">{items}</div></body></html>"#)
}

pub fn user_page(names: &[&str], next: Option<&str>) -> String {
    let head = next
        .map(|href| format!(r#"<link rel="next" href="{href}">"#))
        .unwrap_or_default();
    let rows: String = names
        .iter()
        .map(|name| {
            format!(
                r#"<tr><td class="tcl"><a href="profile.php?id={name}">{name}</a></td>
                   <td class="tc2">Mitglied</td><td class="tc3">10 Beiträge</td>
                   <td class="tc4">3 Punkte</td><td class="tcr">2022-11-05</td></tr>"#
            )
        })
        .collect();
    format!("<html><head>{head}</head><body><table><tbody>{rows}</tbody></table></body></html>")
}

pub fn profile_url(name: &str) -> String {
    format!("http://forum.test/profile.php?id={name}")
}

pub fn profile_page(fingerprint: &str) -> String {
    format!(
        r#"<html><body><div class="profile">
            <ul>
              <li class="first-item">Handelspunkte <strong>12</strong></li>
              <li>Positiv <strong>10</strong></li>
              <li>Neutral <strong>1</strong></li>
              <li>Negativ <strong>0</strong></li>
            </ul>
            <pre>{fingerprint}</pre>
        </div></body></html>"#
    )
}

pub fn captcha_page() -> String {
    r#"<html><body><iframe name="captcha" src="/captcha.php"></iframe></body></html>"#.to_string()
}
