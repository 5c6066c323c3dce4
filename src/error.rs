//! Error types and HTTP error response handling.
//!
//! Every handler returns `Result<T, AppError>`. The error is rendered as a
//! JSON body with a German message intended for direct display in the UI
//! and a stable machine-readable code.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Authentication / authorization**: missing session, wrong role, plan gating
/// - **Resource errors**: requested record not found or not owned by the caller
/// - **Business rules**: not enough credits, rate limit exceeded, conflicts
/// - **Infrastructure**: database, payment provider, LLM API, rendering
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Returns HTTP 500 and hides the underlying message from the client.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No valid session cookie or bearer token. Returns HTTP 401.
    #[error("Nicht angemeldet")]
    Unauthorized,

    /// Login with an unknown email or a wrong password. Returns HTTP 401.
    #[error("E-Mail oder Passwort ist falsch")]
    InvalidCredentials,

    /// Authenticated, but the role does not allow the action. Returns HTTP 403.
    #[error("Keine Berechtigung für diese Aktion")]
    Forbidden,

    /// The caller's bundle does not include the feature. Returns HTTP 403.
    #[error("{0}")]
    FeatureNotInPlan(String),

    /// Record does not exist or is not visible to the caller. Returns HTTP 404.
    #[error("{0} nicht gefunden")]
    NotFound(&'static str),

    /// Not enough credits left for a metered action. Returns HTTP 402.
    #[error("Nicht genügend Credits: {required} benötigt, {available} verfügbar")]
    InsufficientCredits { required: i64, available: i64 },

    /// Too many requests in the current window. Returns HTTP 429.
    #[error("{0}")]
    RateLimited(String),

    /// Unique constraint or state conflict. Returns HTTP 409.
    #[error("{0}")]
    Conflict(String),

    /// Request body or parameters are invalid. Returns HTTP 400.
    #[error("{0}")]
    InvalidRequest(String),

    /// A third-party service (payment provider, LLM API, scanned site) failed.
    /// Returns HTTP 502.
    #[error("Externer Dienst nicht erreichbar: {0}")]
    Upstream(String),

    /// Anything else that must not leak details to the client. Returns HTTP 500.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code used by clients to branch on.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::Forbidden => "forbidden",
            AppError::FeatureNotInPlan(_) => "feature_not_in_plan",
            AppError::NotFound(_) => "not_found",
            AppError::InsufficientCredits { .. } => "insufficient_credits",
            AppError::RateLimited(_) => "rate_limited",
            AppError::Conflict(_) => "conflict",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Upstream(_) => "upstream_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::FeatureNotInPlan(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": "Nicht genügend Credits: 3 benötigt, 1 verfügbar",
///   "code": "insufficient_credits"
/// }
/// ```
///
/// Database and internal errors are logged and replaced by a generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                "Ein interner Fehler ist aufgetreten".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                "Ein interner Fehler ist aufgetreten".to_string()
            }
            AppError::Upstream(e) => {
                tracing::warn!("upstream failure: {}", e);
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

/// Map a unique-constraint violation to `Conflict`, everything else to `Database`.
pub fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_maps_to_429() {
        let err = AppError::RateLimited("Zu viele Anfragen".into());
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code(), "rate_limited");
    }

    #[test]
    fn insufficient_credits_message_is_german() {
        let err = AppError::InsufficientCredits {
            required: 3,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "Nicht genügend Credits: 3 benötigt, 1 verfügbar"
        );
        assert_eq!(err.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn internal_errors_are_hidden() {
        let response = AppError::Internal("pdf renderer exploded".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
