//! Accessibility statement endpoints.
//!
//! - POST /api/bfe/generate - Generate and store a statement (3 credits)
//! - GET /api/bfe - Own statements
//! - GET /api/bfe/{id}/export?format=text|html|pdf - Download

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::bfe::{BfeGeneration, BfeInput, ExportFormat, ExportQuery},
    services::{auth_service, bfe_service},
    state::AppState,
};

pub async fn generate(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<BfeInput>,
) -> Result<(StatusCode, Json<BfeGeneration>), AppError> {
    let generation = bfe_service::generate(&pool, auth.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(generation)))
}

pub async fn list(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<BfeGeneration>>, AppError> {
    Ok(Json(bfe_service::list(&pool, auth.user_id).await?))
}

/// Export a stored statement.
///
/// - `text`: `text/plain` attachment
/// - `html`: styled HTML document, PRO and above
/// - `pdf`: JSON placeholder `{ "format": "pdf-placeholder", "filename", "content" }`
pub async fn export(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let generation = bfe_service::get(&state.pool, auth.user_id, id).await?;
    let stem = bfe_service::file_stem(&generation.organisation);

    let response = match query.format {
        ExportFormat::Text => (
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{stem}.txt\""),
                ),
            ],
            generation.statement_text,
        )
            .into_response(),
        ExportFormat::Html => {
            let user = auth_service::load_user(&state.pool, auth.user_id).await?;
            user.entitlements(Utc::now()).require_html_export()?;

            let input = bfe_service::stored_input(&generation)?;
            (
                [
                    (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{stem}.html\""),
                    ),
                ],
                bfe_service::render_html(&input),
            )
                .into_response()
        }
        ExportFormat::Pdf => Json(bfe_service::pdf_placeholder(&generation)).into_response(),
    };

    Ok(response)
}
