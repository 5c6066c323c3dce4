//! Notification endpoints.
//!
//! - GET /api/notifications - Latest notifications
//! - GET /api/notifications/unread-count - Badge counter
//! - POST /api/notifications/{id}/read - Mark one as read
//! - POST /api/notifications/read-all - Mark all as read
//! - GET /api/notifications/stream - Server-sent events for new notifications

use std::{convert::Infallible, time::Duration};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::notification::{Notification, UnreadCount},
    services::notification_service,
    state::AppState,
};

const LIST_LIMIT: i64 = 50;
const KEEP_ALIVE_SECS: u64 = 25;

pub async fn list(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(
        notification_service::list(&pool, auth.user_id, LIST_LIMIT).await?,
    ))
}

pub async fn unread_count(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UnreadCount>, AppError> {
    let unread = notification_service::unread_count(&pool, auth.user_id).await?;
    Ok(Json(UnreadCount { unread }))
}

pub async fn mark_read(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    notification_service::mark_read(&pool, auth.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let updated = notification_service::mark_all_read(&pool, auth.user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// Live notification stream.
///
/// Each notification is sent as an event named `notification` with the
/// notification as JSON data. A comment ping keeps proxies from closing the
/// connection.
pub async fn stream(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(user_id = %auth.user_id, "notification stream opened");

    let events = state
        .notifications
        .user_stream(auth.user_id)
        .filter_map(|notification| async move {
            match Event::default().event("notification").json_data(&notification) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    tracing::error!(id = %notification.id, "failed to encode notification event: {}", e);
                    None
                }
            }
        });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("ping"),
    )
}
