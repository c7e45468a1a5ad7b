//! Integration tests for lazy login and session sharing.

#![allow(clippy::unwrap_used)]

mod support;

use std::sync::Arc;

use futures_util::future::try_join_all;
use support::socket_guard::start_mock_server_or_skip;
use support::{resolver, thread_page};
use unimi_dl::page::PageError;
use unimi_dl::session::{AuthError, Credentials, HttpTimeouts, SessionConfig, SessionProvider};
use unimi_dl::tree::{Section, TreeError};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> Arc<SessionProvider> {
    Arc::new(SessionProvider::new(
        SessionConfig {
            login_url: format!("{}/login.aspx", server.uri()),
            timeouts: HttpTimeouts::default(),
        },
        Credentials::new("mario.rossi@studenti.unimi.it", "hunter2"),
    ))
}

#[tokio::test]
async fn test_concurrent_first_requests_share_one_login() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path("/login.aspx"))
        .and(body_string_contains("tbLogin=mario.rossi%40studenti.unimi.it"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Benvenuto</html>"))
        .expect(1)
        .mount(&server)
        .await;
    for i in 0..5 {
        let name = format!("f{i}.pdf");
        let url = format!("{base}/{name}");
        Mock::given(method("GET"))
            .and(path(format!("/s{i}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(thread_page(&[], &[(name.as_str(), url.as_str())])))
            .expect(1)
            .mount(&server)
            .await;
    }

    let sessions = provider_for(&server);
    assert!(!sessions.is_authenticated());
    let pages = resolver(Arc::clone(&sessions), 1);
    let sections: Vec<_> = (0..5)
        .map(|i| Section::new(format!("S{i}"), format!("{base}/s{i}"), &base, Arc::clone(&pages)))
        .collect();

    let lists = try_join_all(sections.iter().map(|section| section.attachments()))
        .await
        .unwrap();

    assert_eq!(lists.len(), 5);
    assert_eq!(sessions.handshake_count(), 1);
    assert!(sessions.is_authenticated());
}

#[tokio::test]
async fn test_login_cookie_is_sent_with_page_requests() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path("/login.aspx"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "ASP.NET_SessionId=abc123; Path=/")
                .set_body_string("<html>ok</html>"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s"))
        .and(header("cookie", "ASP.NET_SessionId=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(thread_page(&[], &[])))
        .expect(1)
        .mount(&server)
        .await;

    let section = Section::new("S", format!("{base}/s"), &base, resolver(provider_for(&server), 1));
    let attachments = section.attachments().await.unwrap();
    assert!(attachments.is_empty());
}

#[tokio::test]
async fn test_login_form_shown_again_is_rejection() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path("/login.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form><input name="tbLogin"><input type="password" name="tbPassword"></form>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s"))
        .respond_with(ResponseTemplate::new(200).set_body_string(thread_page(&[], &[])))
        .expect(0)
        .mount(&server)
        .await;

    let sessions = provider_for(&server);
    let section = Section::new("S", format!("{base}/s"), &base, resolver(Arc::clone(&sessions), 3));
    let err = section.attachments().await.unwrap_err();

    assert!(
        matches!(
            err,
            TreeError::Page(PageError::Session(AuthError::Rejected { status: 200, .. }))
        ),
        "got {err:?}"
    );
    assert!(!err.is_transient());
    assert!(!sessions.is_authenticated());
}

#[tokio::test]
async fn test_login_error_status_is_rejection_and_not_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("POST"))
        .and(path("/login.aspx"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let sessions = provider_for(&server);
    let err = sessions.session().await.unwrap_err();

    match err {
        AuthError::Rejected { url, status, .. } => {
            assert_eq!(status, 500);
            assert!(url.ends_with("/login.aspx"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(sessions.handshake_count(), 1);
}

#[tokio::test]
async fn test_failed_login_can_be_retried_with_other_credentials() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("POST"))
        .and(path("/login.aspx"))
        .and(body_string_contains("tbPassword=right"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<input name="tbPassword">"#))
        .mount(&server)
        .await;

    let sessions = provider_for(&server);
    assert!(sessions.session().await.is_err());
    assert!(!sessions.is_authenticated());

    sessions
        .session_with(&Credentials::new("mario.rossi@studenti.unimi.it", "right"))
        .await
        .unwrap();
    assert!(sessions.is_authenticated());
    assert_eq!(sessions.handshake_count(), 2);

    // Established: later calls reuse the session without another handshake.
    sessions.session().await.unwrap();
    assert_eq!(sessions.handshake_count(), 2);
}
