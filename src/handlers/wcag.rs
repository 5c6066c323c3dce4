//! WCAG library and WCAG coach endpoints.
//!
//! - GET /api/wcag/rules?level=AA&q=kontrast - Search the rule catalogue (public)
//! - GET /api/wcag/rules/{id} - One rule (public)
//! - POST /api/wcag-coach - Ask the coach (STARTER+, 1 credit)
//! - GET /api/wcag-coach/sessions - Own chat sessions
//! - GET /api/wcag-coach/sessions/{id} - Session with messages

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::coach::{CoachRequest, CoachResponse, SessionDetail, WcagSession},
    services::{
        auth_service, coach_service,
        wcag_library::{self, Level, WcagRule},
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RuleQuery {
    pub level: Option<Level>,
    pub q: Option<String>,
}

pub async fn list_rules(Query(query): Query<RuleQuery>) -> Json<Vec<&'static WcagRule>> {
    Json(wcag_library::search(query.level, query.q.as_deref()))
}

pub async fn get_rule(Path(id): Path<String>) -> Result<Json<&'static WcagRule>, AppError> {
    wcag_library::find(&id)
        .map(Json)
        .ok_or(AppError::NotFound("Regel"))
}

/// Ask the WCAG coach.
///
/// # Request Body
///
/// ```json
/// { "message": "Wie beschrifte ich Icon-Buttons?", "session_id": null }
/// ```
///
/// # Response
///
/// - **200 OK**: `{ "session_id", "reply", "credits_remaining" }`
/// - **402**: no credits left
/// - **403**: bundle below STARTER
/// - **429**: more than 10 messages per minute or 100 per day
/// - **502**: LLM API unavailable (credit is refunded)
pub async fn ask_coach(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CoachRequest>,
) -> Result<Json<CoachResponse>, AppError> {
    let user = auth_service::load_user(&state.pool, auth.user_id).await?;
    user.entitlements(Utc::now()).require_coach()?;

    let response =
        coach_service::ask(&state, auth.user_id, request.session_id, &request.message).await?;
    Ok(Json(response))
}

pub async fn list_sessions(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<WcagSession>>, AppError> {
    Ok(Json(coach_service::list_sessions(&pool, auth.user_id).await?))
}

pub async fn get_session(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetail>, AppError> {
    Ok(Json(coach_service::get_session(&pool, auth.user_id, id).await?))
}
