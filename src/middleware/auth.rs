//! Session authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the session token from the `auth-token` cookie or an
//!    `Authorization: Bearer` header
//! 2. Verify its signature and expiry
//! 3. Check the user still exists and the token version is current
//! 4. Inject authentication context into the request
//! 5. Reject unauthenticated requests with HTTP 401

use crate::{error::AppError, services::auth_service, state::AppState};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// This struct is inserted into the request's extension map and can be
/// extracted by route handlers to know who made the request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Read the session token from the request headers.
///
/// The cookie wins over the header when both are present.
pub fn session_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(auth_service::token_from_cookie_header);

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    })
}

/// Current identity of a session's user.
#[derive(Debug, sqlx::FromRow)]
struct SessionUser {
    email: String,
    role: String,
    token_version: i32,
}

/// Session authentication middleware function.
///
/// # Flow
///
/// 1. Verify the token signature and expiry
/// 2. Load the user's email, role and token version
/// 3. Reject the token if the user is gone or the version moved on
///    (password reset)
/// 4. Inject `AuthContext` built from the database row, so role changes
///    apply to the next request
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(request.headers()).ok_or(AppError::Unauthorized)?;
    let claims = auth_service::verify_token(&state.config.jwt_secret, token)?;

    let user = sqlx::query_as::<_, SessionUser>(
        "SELECT email, role, token_version FROM users WHERE id = $1",
    )
    .bind(claims.sub)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    if user.token_version != claims.ver {
        tracing::debug!(user_id = %claims.sub, "stale session token");
        return Err(AppError::Unauthorized);
    }

    let auth_context = AuthContext {
        user_id: claims.sub,
        email: user.email,
        role: user.role,
    };

    request.extensions_mut().insert(auth_context);
    Ok(next.run(request).await)
}

/// Allows the request through only for admins.
///
/// Must run after [`auth_middleware`], which fills the role from `users`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = request
        .extensions()
        .get::<AuthContext>()
        .ok_or(AppError::Unauthorized)?
        .is_admin();

    if !is_admin {
        return Err(AppError::Forbidden);
    }
    Ok(next.run(request).await)
}
