//! WCAG coach chat models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WcagSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WcagMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,

    /// `user` or `assistant`
    pub role: String,

    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: WcagSession,
    pub messages: Vec<WcagMessage>,
}

/// Request body for `POST /api/wcag-coach`.
///
/// Without `session_id` a new session is started.
#[derive(Debug, Deserialize)]
pub struct CoachRequest {
    pub message: String,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CoachResponse {
    pub session_id: Uuid,
    pub reply: String,
    pub credits_remaining: i64,
}

/// One message in the chat-completion wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

impl From<WcagMessage> for ChatMessage {
    fn from(message: WcagMessage) -> Self {
        Self {
            role: message.role,
            content: message.content,
        }
    }
}
