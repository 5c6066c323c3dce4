//! Router-level tests.
//!
//! The pool connects lazily to an address nothing listens on, so every
//! request exercised here must be answered before the database is touched.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    routing::get,
};
use barrierefrei_server::{
    router,
    services::{auth_service, mail::LogMailer},
    state::AppState,
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

mod common;

use common::{SECRET, config, json_body};

fn app_with_mollie(mollie_api_base: &str) -> Router {
    let config = config(mollie_api_base);
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&config.database_url)
        .unwrap();
    let state = AppState::with_mailer(config, pool, Arc::new(LogMailer)).unwrap();
    router(state)
}

fn app() -> Router {
    app_with_mollie("http://127.0.0.1:1/v2")
}

fn token(role: &str, ttl_hours: i64) -> String {
    auth_service::issue_token(SECRET, Uuid::new_v4(), "pruefer@example.de", role, 0, ttl_hours)
        .unwrap()
}

/// Mollie stand-in that knows no payments.
async fn fake_mollie() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route(
        "/v2/payments/{id}",
        get(|| async {
            (
                StatusCode::NOT_FOUND,
                axum::Json(serde_json::json!({
                    "status": 404,
                    "title": "Not Found",
                    "detail": "No payment exists with token tr_unknown."
                })),
            )
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v2")
}

#[tokio::test]
async fn protected_route_without_session_is_401() {
    let response = app()
        .oneshot(Request::get("/api/auth/me").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "unauthorized");
    assert_eq!(body["error"], "Nicht angemeldet");
}

#[tokio::test]
async fn tampered_or_expired_tokens_are_401() {
    let expired = token("user", -2);
    let response = app()
        .oneshot(
            Request::get("/api/tickets")
                .header(header::COOKIE, format!("auth-token={expired}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app()
        .oneshot(
            Request::get("/api/tickets")
                .header(header::AUTHORIZATION, "Bearer not.a.token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_require_a_session_first() {
    let response = app()
        .oneshot(
            Request::patch("/api/admin/tickets/00000000-0000-0000-0000-000000000000")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"status":"closed"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wcag_rules_are_public_and_filterable() {
    let response = app()
        .oneshot(
            Request::get("/api/wcag/rules?level=A&q=bild")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let rules = json_body(response).await;
    let rules = rules.as_array().unwrap();
    assert!(!rules.is_empty());
    assert!(rules.iter().all(|r| r["level"] == "A"));
    assert!(rules.iter().any(|r| r["id"] == "image-alt"));
}

#[tokio::test]
async fn unknown_wcag_rule_is_404() {
    let response = app()
        .oneshot(
            Request::get("/api/wcag/rules/no-such-rule")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Regel nicht gefunden");
}

#[tokio::test]
async fn price_list_contains_all_bundles_and_packs() {
    let response = app()
        .oneshot(Request::get("/api/bundles").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let bundles = body["bundles"].as_array().unwrap();
    assert_eq!(bundles.len(), 4);
    assert_eq!(bundles[0]["bundle"], "FREE");
    assert_eq!(bundles[0]["monthly_price_cents"], Value::Null);
    assert_eq!(bundles[2]["bundle"], "PRO");
    assert_eq!(bundles[2]["yearly_price_cents"], 79_000);
    assert_eq!(body["credit_packs"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn webhook_without_id_is_400() {
    let response = app()
        .oneshot(
            Request::post("/api/webhooks/mollie")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("foo=bar"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "invalid_request");
}

#[tokio::test]
async fn webhook_with_malformed_id_is_400() {
    let response = app()
        .oneshot(
            Request::post("/api/webhooks/mollie")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"id":"tr_1/../../customers"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_with_unknown_payment_is_400() {
    let mollie = fake_mollie().await;
    let response = app_with_mollie(&mollie)
        .oneshot(
            Request::post("/api/webhooks/mollie")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("id=tr_unknown"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Unknown payment");
}

#[tokio::test]
async fn logout_clears_the_cookie() {
    let response = app()
        .oneshot(
            Request::post("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("auth-token=;"));
    assert!(cookie.contains("Max-Age=0"));
}
