//! Router-level tests for the session and injection layers.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Html,
    routing::{get, post},
    Extension, Router,
};
use formgate::config::{CsrfSettings, SessionSettings};
use formgate::csrf::CsrfEngine;
use formgate::handlers;
use formgate::middleware::{CsrfInjectLayer, SessionLayer};
use formgate::session::SessionStore;
use http_body_util::BodyExt;
use regex::Regex;
use tower::ServiceExt;

async fn index() -> Html<&'static str> {
    Html("<html><body><form method=\"post\" action=\"/\">x</form></body></html>")
}

async fn plain() -> &'static str {
    "no forms"
}

fn app() -> Router {
    let engine = CsrfEngine::new(&CsrfSettings {
        secret: "middleware-test-secret".to_string(),
        ..CsrfSettings::default()
    });
    let sessions = SessionStore::new();

    Router::new()
        .route("/", get(index))
        .route("/plain", get(plain))
        .route("/csrf/keepalive/{page}", post(handlers::keep_alive))
        .layer(CsrfInjectLayer::new(engine.clone()))
        .layer(SessionLayer::with_settings(sessions, SessionSettings::default()))
        .layer(Extension(engine))
}

async fn body_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn html_responses_get_tokens_and_a_session_cookie() {
    let response = app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("formgate_session="));
    assert!(cookie.contains("HttpOnly"));

    let html = body_string(response.into_body()).await;
    assert!(html.contains("name=\"csrf_token\""));
    assert!(html.contains("/csrf/keepalive/"));
}

#[tokio::test]
async fn non_html_responses_pass_through_untouched() {
    let response = app()
        .oneshot(Request::builder().uri("/plain").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let body = body_string(response.into_body()).await;
    assert_eq!(body, "no forms");
}

#[tokio::test]
async fn keep_alive_round_trip_through_the_router() {
    let app = app();

    // Render the page once to obtain the session cookie, the keep-alive URL
    // and the first keep-alive token.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let html = body_string(response.into_body()).await;

    let url = Regex::new(r#"u="([^"]+)""#).unwrap().captures(&html).unwrap()[1].to_string();
    let token = Regex::new(r#"t="([^"]+)""#).unwrap().captures(&html).unwrap()[1].to_string();

    // A valid ping returns the next token in the chain.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&url)
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("token={token}")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fresh = body_string(response.into_body()).await;
    assert_ne!(fresh, "false");
    assert_ne!(fresh, token);
    assert!(fresh.starts_with("keepalive_"));

    // A replayed ping gets the stop sentinel.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&url)
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("token={token}")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_string(response.into_body()).await, "false");
}

#[tokio::test]
async fn keep_alive_rejects_garbage_tokens() {
    let app = app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/csrf/keepalive/some_page")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("token=not-a-real-token"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(body_string(response.into_body()).await, "false");
}

#[tokio::test]
async fn returning_sessions_are_not_issued_a_second_cookie() {
    let app = app();

    let first = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let cookie = first
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let second = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(second.headers().get(header::SET_COOKIE).is_none());
}
