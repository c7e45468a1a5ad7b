//! Shared helpers for integration tests: mock server startup, Ariel page
//! fixtures and pre-wired sessions.

#![allow(dead_code)]

pub mod socket_guard;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use unimi_dl::page::{ArielPageParser, PageResolver};
use unimi_dl::retry::RetryPolicy;
use unimi_dl::session::{HttpTimeouts, Session, SessionProvider};
use wiremock::{Request, Respond, ResponseTemplate};

/// Provider that already holds an anonymous session, so no login is attempted.
pub fn anonymous_provider() -> Arc<SessionProvider> {
    let session = Session::unauthenticated(HttpTimeouts::default()).expect("build session");
    Arc::new(SessionProvider::preauthenticated(session))
}

/// Page resolver over `sessions` that retries immediately up to `attempts` times.
pub fn resolver(sessions: Arc<SessionProvider>, attempts: u32) -> Arc<PageResolver> {
    Arc::new(
        PageResolver::new(sessions, Arc::new(ArielPageParser::new()))
            .with_retry_policy(RetryPolicy::immediate(attempts)),
    )
}

/// A section page with one room list linking to `rooms` and one post per
/// entry of `documents`, each carrying a single attached file.
pub fn thread_page(rooms: &[(&str, &str)], documents: &[(&str, &str)]) -> String {
    let room_rows: String = rooms
        .iter()
        .map(|(name, href)| format!(r#"<tr><td><a href="{href}">{name}</a></td></tr>"#))
        .collect();
    let post_rows: String = documents
        .iter()
        .map(|(name, href)| {
            format!(
                r#"<tr><td><div class="arielMessageBody">post {name}</div><a class="filename" href="{href}">{name}</a></td></tr>"#
            )
        })
        .collect();
    format!(
        r#"<html><body>
        <table class="table arielRoomList"><tbody>{room_rows}</tbody></table>
        <table class="table arielThreadList"><tbody>{post_rows}</tbody></table>
        </body></html>"#
    )
}

/// A section page whose only post embeds a streaming video.
pub fn video_page(manifest_url: &str) -> String {
    format!(
        r#"<table class="arielThreadList"><tbody><tr><td>
        <div class="arielMessageBody">registrazione</div>
        <video controls><source src="{manifest_url}" type="application/x-mpegURL"></video>
        </td></tr></tbody></table>"#
    )
}

/// A course contents page listing `sections`.
pub fn contents_page(sections: &[(&str, &str)]) -> String {
    let rows: String = sections
        .iter()
        .map(|(name, href)| format!(r#"<tr><td><a href="{href}">{name}</a></td></tr>"#))
        .collect();
    format!("<table><tbody>{rows}</tbody></table>")
}

/// The "my courses" catalog listing `(name, url)` pairs.
pub fn catalog_page(courses: &[(&str, &str)]) -> String {
    let projects: String = courses
        .iter()
        .map(|(name, url)| {
            format!(
                r#"<div class="ariel-project"><a href="{url}">{name}</a>
                <a href="/offerta/teacher/mrossi">Mario Rossi</a>
                <span class="tag bg-F1">Edizione</span> 2024/2025</div>"#
            )
        })
        .collect();
    format!(r#"<table class="table"><tbody><tr><td>{projects}</td></tr></tbody></table>"#)
}

/// Responder that fails the first `fail_count` requests with `fail_status`,
/// then returns 200 with `success_body`.
pub struct FlakyResponder {
    request_count: Arc<AtomicUsize>,
    fail_count: usize,
    fail_status: u16,
    success_body: Vec<u8>,
}

impl FlakyResponder {
    pub fn new(fail_count: usize, fail_status: u16, success_body: impl Into<Vec<u8>>) -> Self {
        Self {
            request_count: Arc::new(AtomicUsize::new(0)),
            fail_count,
            fail_status,
            success_body: success_body.into(),
        }
    }
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            ResponseTemplate::new(self.fail_status).set_body_string("temporarily unavailable")
        } else {
            ResponseTemplate::new(200).set_body_bytes(self.success_body.clone())
        }
    }
}
