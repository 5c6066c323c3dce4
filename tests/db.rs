//! Tests against a real database.
//!
//! `#[sqlx::test]` creates a fresh database per test from `DATABASE_URL`
//! and applies `migrations/` before handing over the pool.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::Path,
    http::{Method, Request, StatusCode, header},
    routing::get,
};
use barrierefrei_server::{
    error::AppError,
    models::{credit::CreditKind, payment::WebhookOutcome, user::TokenPurpose},
    router,
    services::{auth_service, coach_service, credit_service, mail::LogMailer, payment_service},
    state::AppState,
};
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

mod common;

use common::{SECRET, config, json_body};

fn state_with_mollie(pool: PgPool, mollie_api_base: &str) -> AppState {
    AppState::with_mailer(config(mollie_api_base), pool, Arc::new(LogMailer)).unwrap()
}

fn state(pool: PgPool) -> AppState {
    state_with_mollie(pool, "http://127.0.0.1:1/v2")
}

async fn seed_user(pool: &PgPool, email: &str, role: &str, bundle: &str, credits: i64) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO users (email, password_hash, name, role, bundle, credits)
        VALUES ($1, 'x', 'Test', $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(email)
    .bind(role)
    .bind(bundle)
    .bind(credits)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn credits(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn session(user_id: Uuid, role: &str) -> String {
    auth_service::issue_token(SECRET, user_id, "test@example.de", role, 0, 1).unwrap()
}

fn request(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("auth-token={token}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Mollie stand-in that reports every payment as a paid 50-credit pack
/// for `user_id`.
async fn paid_mollie(user_id: Uuid) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route(
        "/v2/payments/{id}",
        get(move |Path(id): Path<String>| async move {
            Json(json!({
                "id": id,
                "status": "paid",
                "amount": { "currency": "EUR", "value": "39.90" },
                "description": "50 Credits",
                "metadata": { "type": "credits", "user_id": user_id, "credits": 50 }
            }))
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v2")
}

#[sqlx::test(migrations = "./migrations")]
async fn repeated_webhook_grants_credits_once(pool: PgPool) {
    let user_id = seed_user(&pool, "kunde@example.de", "user", "FREE", 0).await;
    let state = state_with_mollie(pool.clone(), &paid_mollie(user_id).await);

    let first = payment_service::process_webhook(&state, "tr_paid1").await.unwrap();
    assert!(matches!(first, WebhookOutcome::Applied { .. }));
    let second = payment_service::process_webhook(&state, "tr_paid1").await.unwrap();
    assert_eq!(second, WebhookOutcome::AlreadyProcessed);

    assert_eq!(credits(&pool, user_id).await, 50);
    let invoices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(invoices, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn webhook_for_missing_user_is_rejected(pool: PgPool) {
    let state = state_with_mollie(pool.clone(), &paid_mollie(Uuid::new_v4()).await);

    let err = payment_service::process_webhook(&state, "tr_orphan1").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(ref msg) if msg == "Unknown user"));

    let claimed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_payments")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(claimed, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn spending_beyond_the_balance_changes_nothing(pool: PgPool) {
    let user_id = seed_user(&pool, "knapp@example.de", "user", "FREE", 2).await;

    let mut tx = pool.begin().await.unwrap();
    let err = credit_service::spend(&mut tx, user_id, 3, CreditKind::BfeStatement, "Erklärung")
        .await
        .unwrap_err();
    tx.rollback().await.unwrap();
    assert!(matches!(
        err,
        AppError::InsufficientCredits {
            required: 3,
            available: 2
        }
    ));
    assert_eq!(credits(&pool, user_id).await, 2);

    let ledger: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM credit_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(ledger, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn scan_without_credits_is_402(pool: PgPool) {
    let user_id = seed_user(&pool, "leer@example.de", "user", "FREE", 0).await;
    let website_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO websites (user_id, name, url)
        VALUES ($1, 'Portal', 'https://www.musterstadt.de/')
        RETURNING id
        "#,
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let response = router(state(pool.clone()))
        .oneshot(request(
            Method::POST,
            &format!("/api/websites/{website_id}/scans"),
            &session(user_id, "user"),
            Some(json!({})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json_body(response).await["code"], "insufficient_credits");
    assert_eq!(credits(&pool, user_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn coach_refunds_when_the_model_is_unreachable(pool: PgPool) {
    let user_id = seed_user(&pool, "coach@example.de", "user", "STARTER", 5).await;
    let state = state(pool.clone());

    let err = coach_service::ask(&state, user_id, None, "Was verlangt 1.4.3?")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Upstream(_)));
    assert_eq!(credits(&pool, user_id).await, 5);

    let amounts: Vec<i64> = sqlx::query_scalar(
        "SELECT amount FROM credit_transactions WHERE user_id = $1 ORDER BY created_at, amount",
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(amounts.len(), 2);
    assert_eq!(amounts.iter().sum::<i64>(), 0);
}

async fn seed_questions(pool: &PgPool, user_id: Uuid, count: i64, age: &str) {
    let session_id: Uuid = sqlx::query_scalar(
        "INSERT INTO wcag_sessions (user_id, title) VALUES ($1, 'Verlauf') RETURNING id",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query(
        r#"
        INSERT INTO wcag_messages (session_id, user_id, role, content, created_at)
        SELECT $1, $2, 'user', 'Frage', NOW() - $4::INTERVAL
        FROM generate_series(1, $3)
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .bind(count)
    .bind(age)
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn coach_enforces_the_minute_window(pool: PgPool) {
    let user_id = seed_user(&pool, "eilig@example.de", "user", "STARTER", 5).await;
    seed_questions(&pool, user_id, 10, "5 seconds").await;

    let err = coach_service::ask(&state(pool.clone()), user_id, None, "Noch eine Frage")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RateLimited(_)));
    assert_eq!(credits(&pool, user_id).await, 5);
}

#[sqlx::test(migrations = "./migrations")]
async fn coach_enforces_the_daily_window(pool: PgPool) {
    let user_id = seed_user(&pool, "fleissig@example.de", "user", "STARTER", 5).await;
    seed_questions(&pool, user_id, 100, "2 hours").await;

    let err = coach_service::ask(&state(pool.clone()), user_id, None, "Noch eine Frage")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RateLimited(_)));
    assert_eq!(credits(&pool, user_id).await, 5);
}

#[sqlx::test(migrations = "./migrations")]
async fn tickets_are_hidden_from_other_users(pool: PgPool) {
    let owner = seed_user(&pool, "owner@example.de", "user", "FREE", 0).await;
    let stranger = seed_user(&pool, "fremd@example.de", "user", "FREE", 0).await;
    let staff = seed_user(&pool, "support@example.de", "admin", "FREE", 0).await;
    let ticket_id: Uuid = sqlx::query_scalar(
        "INSERT INTO support_tickets (user_id, subject) VALUES ($1, 'Rechnung fehlt') RETURNING id",
    )
    .bind(owner)
    .fetch_one(&pool)
    .await
    .unwrap();

    let app = router(state(pool));
    let uri = format!("/api/tickets/{ticket_id}");

    for (user_id, role, expected) in [
        (stranger, "user", StatusCode::NOT_FOUND),
        (owner, "user", StatusCode::OK),
        (staff, "admin", StatusCode::OK),
    ] {
        let response = app
            .clone()
            .oneshot(request(Method::GET, &uri, &session(user_id, role), None))
            .await
            .unwrap();
        assert_eq!(response.status(), expected);
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn free_bundle_allows_one_website_under_concurrency(pool: PgPool) {
    let user_id = seed_user(&pool, "free@example.de", "user", "FREE", 0).await;
    let app = router(state(pool.clone()));
    let token = session(user_id, "user");

    let attempts = (0..5).map(|i| {
        app.clone().oneshot(request(
            Method::POST,
            "/api/websites",
            &token,
            Some(json!({ "name": "", "url": format!("https://seite{i}.example.de") })),
        ))
    });
    let statuses: Vec<StatusCode> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|response| response.unwrap().status())
        .collect();

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
    assert!(
        statuses
            .iter()
            .all(|s| *s == StatusCode::CREATED || *s == StatusCode::FORBIDDEN)
    );

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM websites WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn team_seats_are_capped_by_the_bundle(pool: PgPool) {
    let owner = seed_user(&pool, "chefin@example.de", "user", "PRO", 0).await;
    let team_id: Uuid = sqlx::query_scalar(
        "INSERT INTO teams (owner_id, name) VALUES ($1, 'Redaktion') RETURNING id",
    )
    .bind(owner)
    .fetch_one(&pool)
    .await
    .unwrap();

    for i in 0..5 {
        let member = seed_user(&pool, &format!("mitglied{i}@example.de"), "user", "FREE", 0).await;
        sqlx::query("INSERT INTO team_members (team_id, user_id) VALUES ($1, $2)")
            .bind(team_id)
            .bind(member)
            .execute(&pool)
            .await
            .unwrap();
    }
    seed_user(&pool, "sechste@example.de", "user", "FREE", 0).await;

    let response = router(state(pool))
        .oneshot(request(
            Method::POST,
            &format!("/api/teams/{team_id}/members"),
            &session(owner, "user"),
            Some(json!({ "email": "sechste@example.de" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], "feature_not_in_plan");
}

#[sqlx::test(migrations = "./migrations")]
async fn password_reset_ends_existing_sessions(pool: PgPool) {
    let user_id = seed_user(&pool, "reset@example.de", "user", "FREE", 0).await;
    let app = router(state(pool.clone()));
    let old_session = session(user_id, "user");

    let me = app
        .clone()
        .oneshot(request(Method::GET, "/api/auth/me", &old_session, None))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);

    let mut conn = pool.acquire().await.unwrap();
    let reset_token =
        auth_service::create_one_time_token(&mut conn, user_id, TokenPurpose::ResetPassword)
            .await
            .unwrap();
    drop(conn);

    let reset = app
        .clone()
        .oneshot(
            Request::post("/api/auth/reset-password")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "token": reset_token, "password": "neues-passwort" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(reset.status(), StatusCode::OK);

    let me = app
        .oneshot(request(Method::GET, "/api/auth/me", &old_session, None))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "./migrations")]
async fn admin_access_follows_the_stored_role(pool: PgPool) {
    let admin = seed_user(&pool, "admin@example.de", "admin", "FREE", 0).await;
    let app = router(state(pool.clone()));
    let token = session(admin, "admin");

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/api/admin/stats", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    sqlx::query("UPDATE users SET role = 'user' WHERE id = $1")
        .bind(admin)
        .execute(&pool)
        .await
        .unwrap();

    let response = app
        .oneshot(request(Method::GET, "/api/admin/stats", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], "forbidden");
}

#[sqlx::test(migrations = "./migrations")]
async fn sessions_of_deleted_users_are_401(pool: PgPool) {
    let user_id = seed_user(&pool, "weg@example.de", "user", "FREE", 0).await;
    let token = session(user_id, "user");
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();

    let response = router(state(pool))
        .oneshot(request(Method::GET, "/api/auth/me", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
