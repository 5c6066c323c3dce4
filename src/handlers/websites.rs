//! Website and scan HTTP handlers.
//!
//! - POST /api/websites - Register a website (limited by bundle)
//! - GET /api/websites - List own websites
//! - DELETE /api/websites/{id} - Remove a website with its pages and scans
//! - POST /api/websites/{id}/scans - Scan one page (1 credit)
//! - GET /api/websites/{id}/scans - Scan history
//! - GET /api/scans/{id} - Full scan result

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::{AppError, conflict_on_unique},
    middleware::auth::AuthContext,
    models::{
        notification::NewNotification,
        website::{CreateWebsiteRequest, Scan, ScanSummary, StartScanRequest, Website},
    },
    services::{auth_service, notification_service, scan_service},
    state::AppState,
};

/// Load a website owned by the caller.
///
/// Websites of other users are reported as not found.
async fn owned_website(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<Website, AppError> {
    sqlx::query_as::<_, Website>(
        "SELECT id, user_id, name, url, created_at FROM websites WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Website"))
}

/// Register a website.
///
/// # Request Body
///
/// ```json
/// { "name": "Stadtportal", "url": "https://www.musterstadt.de" }
/// ```
///
/// # Response
///
/// - **201 Created**: the website
/// - **403**: bundle website limit reached
/// - **409**: URL already registered by this user
///
/// The user row stays locked between counting and inserting, so concurrent
/// requests cannot both take the last slot.
pub async fn create_website(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateWebsiteRequest>,
) -> Result<(StatusCode, Json<Website>), AppError> {
    let url = scan_service::parse_site_url(&request.url)?;
    let name = match request.name.trim() {
        "" => url.host_str().unwrap_or_default().to_string(),
        name => name.to_string(),
    };

    let mut tx = state.pool.begin().await?;

    let user = auth_service::lock_user(&mut tx, auth.user_id).await?;
    let current: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM websites WHERE user_id = $1")
        .bind(auth.user_id)
        .fetch_one(&mut *tx)
        .await?;
    user.entitlements(Utc::now()).require_website_slot(current)?;

    let website = sqlx::query_as::<_, Website>(
        r#"
        INSERT INTO websites (user_id, name, url)
        VALUES ($1, $2, $3)
        RETURNING id, user_id, name, url, created_at
        "#,
    )
    .bind(auth.user_id)
    .bind(&name)
    .bind(url.as_str())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "Diese Website ist bereits angelegt"))?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(website)))
}

pub async fn list_websites(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Website>>, AppError> {
    let websites = sqlx::query_as::<_, Website>(
        "SELECT id, user_id, name, url, created_at FROM websites WHERE user_id = $1 ORDER BY created_at",
    )
    .bind(auth.user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(websites))
}

pub async fn delete_website(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM websites WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.user_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Website"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Scan one page of a website.
///
/// # Request Body
///
/// ```json
/// { "url": "/kontakt" }
/// ```
///
/// `url` is optional and resolved against the website URL; it must stay on
/// the same host. Costs one credit.
pub async fn start_scan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(website_id): Path<Uuid>,
    body: Option<Json<StartScanRequest>>,
) -> Result<(StatusCode, Json<Scan>), AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let website = owned_website(&state.pool, auth.user_id, website_id).await?;

    let scan =
        scan_service::run_scan(&state, auth.user_id, &website, request.url.as_deref()).await?;

    notification_service::notify_best_effort(
        &state.pool,
        &state.notifications,
        NewNotification::new(
            auth.user_id,
            "scan_finished",
            "Scan abgeschlossen",
            format!(
                "{}: {} Verstöße, Bewertung {}/100",
                website.name, scan.violation_count, scan.score
            ),
        )
        .with_link(format!("/dashboard/scans/{}", scan.id)),
    )
    .await;

    Ok((StatusCode::CREATED, Json(scan)))
}

pub async fn list_scans(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(website_id): Path<Uuid>,
) -> Result<Json<Vec<ScanSummary>>, AppError> {
    owned_website(&pool, auth.user_id, website_id).await?;

    let scans = sqlx::query_as::<_, ScanSummary>(
        r#"
        SELECT id, page_id, status, score, violation_count, created_at
        FROM scans
        WHERE website_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(website_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(scans))
}

pub async fn get_scan(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Scan>, AppError> {
    let scan = sqlx::query_as::<_, Scan>(
        r#"
        SELECT id, website_id, page_id, user_id, status, score, violation_count, violations, passes, created_at
        FROM scans
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(auth.user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Scan"))?;

    Ok(Json(scan))
}
