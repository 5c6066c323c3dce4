//! Admin endpoints. All routes sit behind the admin middleware.
//!
//! - GET /api/admin/stats - Dashboard figures
//! - GET /api/admin/users?q= - User list
//! - POST /api/admin/users/{id}/credits - Manual credit correction
//! - POST /api/admin/users/{id}/bundle - Set a user's bundle

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        credit::{CreditAdjustmentRequest, CreditTransaction},
        notification::NewNotification,
        user::{SetBundleRequest, User, UserResponse},
    },
    services::{auth_service::USER_COLUMNS, credit_service, notification_service},
    state::AppState,
};

const USER_PAGE: i64 = 200;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AdminStats {
    pub users: i64,
    pub paid_invoices: i64,
    pub revenue_cents: i64,
    pub open_tickets: i64,
    pub scans_last_30_days: i64,
}

pub async fn stats(State(pool): State<DbPool>) -> Result<Json<AdminStats>, AppError> {
    let stats = sqlx::query_as::<_, AdminStats>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS users,
            (SELECT COUNT(*) FROM invoices WHERE status = 'paid') AS paid_invoices,
            (SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM invoices WHERE status = 'paid') AS revenue_cents,
            (SELECT COUNT(*) FROM support_tickets WHERE status <> 'closed') AS open_tickets,
            (SELECT COUNT(*) FROM scans WHERE created_at > $1) AS scans_last_30_days
        "#,
    )
    .bind(Utc::now() - Duration::days(30))
    .fetch_one(&pool)
    .await?;

    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct UserSearch {
    pub q: Option<String>,
}

pub async fn list_users(
    State(pool): State<DbPool>,
    Query(search): Query<UserSearch>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let pattern = search
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")));

    let users = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE $1::TEXT IS NULL OR email ILIKE $1 OR name ILIKE $1
        ORDER BY created_at DESC
        LIMIT $2
        "#
    ))
    .bind(pattern)
    .bind(USER_PAGE)
    .fetch_all(&pool)
    .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Book a manual credit correction.
///
/// # Request Body
///
/// ```json
/// { "amount": -5, "reason": "Doppelte Gutschrift korrigiert" }
/// ```
///
/// Negative amounts cannot take the balance below zero (402).
pub async fn adjust_credits(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<CreditAdjustmentRequest>,
) -> Result<Json<CreditTransaction>, AppError> {
    let entry =
        credit_service::adjust(&state.pool, user_id, request.amount, request.reason.trim()).await?;

    tracing::info!(admin = %admin.user_id, %user_id, amount = request.amount, "credits adjusted by admin");

    notification_service::notify_best_effort(
        &state.pool,
        &state.notifications,
        NewNotification::new(
            user_id,
            "credits",
            "Guthaben angepasst",
            format!(
                "{:+} Credits: {}. Neuer Stand: {}",
                entry.amount, entry.description, entry.balance_after
            ),
        ),
    )
    .await;

    Ok(Json(entry))
}

/// Set a user's bundle without a payment, e.g. for support cases.
///
/// Does not grant credits; use the credit endpoint for that.
pub async fn set_bundle(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SetBundleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if request.expires_at.is_some_and(|expiry| expiry <= Utc::now()) {
        return Err(AppError::InvalidRequest(
            "Das Ablaufdatum muss in der Zukunft liegen".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET bundle = $1,
            bundle_cycle = NULL,
            bundle_expires_at = $2,
            updated_at = NOW()
        WHERE id = $3
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(request.bundle.as_str())
    .bind(request.expires_at)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Benutzer"))?;

    tracing::info!(admin = %admin.user_id, %user_id, bundle = request.bundle.as_str(), "bundle set by admin");

    notification_service::notify_best_effort(
        &state.pool,
        &state.notifications,
        NewNotification::new(
            user_id,
            "bundle",
            "Paket geändert",
            format!("Ihr Paket ist jetzt {}", request.bundle.display_name()),
        )
        .with_link("/dashboard/billing"),
    )
    .await;

    Ok(Json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_serialize_flat() {
        let stats = AdminStats {
            users: 3,
            paid_invoices: 2,
            revenue_cents: 10_800,
            open_tickets: 1,
            scans_last_30_days: 7,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["revenue_cents"], 10_800);
        assert_eq!(json["scans_last_30_days"], 7);
    }
}
