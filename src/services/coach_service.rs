//! WCAG coach: chat-completion proxy with per-user rate limits and credit metering.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        bundle::costs,
        coach::{ChatMessage, CoachResponse, SessionDetail, WcagMessage, WcagSession},
        credit::CreditKind,
    },
    services::credit_service,
    state::AppState,
};

/// Fixed system prompt sent with every request.
pub const SYSTEM_PROMPT: &str = "Du bist ein erfahrener Berater für digitale Barrierefreiheit \
in Deutschland. Du beantwortest Fragen zu WCAG 2.1/2.2, BITV 2.0, EN 301 549 und zum \
Barrierefreiheitsstärkungsgesetz (BFSG) präzise, praxisnah und auf Deutsch. Nenne bei \
technischen Empfehlungen das betroffene WCAG-Erfolgskriterium. Gib keine Rechtsberatung im \
Einzelfall, sondern weise bei rechtlichen Detailfragen auf fachkundige Beratung hin.";

/// Chat history (besides the new message) forwarded to the model.
pub const HISTORY_LIMIT: i64 = 20;

pub const MAX_MESSAGE_CHARS: usize = 4_000;

/// A fixed-window limit: at most `max` events within `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max: i64,
    pub window_secs: i64,
    pub message: &'static str,
}

pub const PER_MINUTE: RateLimit = RateLimit {
    max: 10,
    window_secs: 60,
    message: "Zu viele Anfragen. Bitte warten Sie eine Minute.",
};

pub const PER_DAY: RateLimit = RateLimit {
    max: 100,
    window_secs: 24 * 60 * 60,
    message: "Tageslimit für den WCAG-Coach erreicht. Bitte versuchen Sie es morgen erneut.",
};

impl RateLimit {
    /// Start of the window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::seconds(self.window_secs)
    }

    /// Check a count of events observed since [`Self::window_start`].
    pub fn check(&self, observed: i64) -> Result<(), AppError> {
        if observed >= self.max {
            Err(AppError::RateLimited(self.message.to_string()))
        } else {
            Ok(())
        }
    }
}

/// OpenAI-compatible chat-completion client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client error: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Upstream("KI-Dienst ist nicht konfiguriert".to_string()))?;

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
                temperature: 0.3,
                max_tokens: 1_200,
            })
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("LLM: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "LLM returned {}",
                response.status()
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("LLM response: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::Upstream("LLM returned an empty answer".to_string()))
    }
}

/// Assemble the prompt: system prompt, prior history (oldest first), new question.
pub fn build_prompt(history: Vec<WcagMessage>, question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(history.into_iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(question));
    messages
}

/// Session title derived from the first question.
pub fn session_title(question: &str) -> String {
    const MAX: usize = 60;
    let question = question.trim();
    if question.chars().count() <= MAX {
        question.to_string()
    } else {
        let cut: String = question.chars().take(MAX).collect();
        format!("{}…", cut.trim_end())
    }
}

/// Answer one coach question.
///
/// The rate-limit check, credit charge and user message insert share a
/// transaction that holds the user row lock, so parallel requests of one
/// user cannot both slip under the limit. The LLM call happens after commit;
/// when it fails the charged credit is refunded.
pub async fn ask(
    state: &AppState,
    user_id: Uuid,
    session_id: Option<Uuid>,
    question: &str,
) -> Result<CoachResponse, AppError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::InvalidRequest("Bitte eine Frage eingeben".to_string()));
    }
    if question.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::InvalidRequest(format!(
            "Die Nachricht darf höchstens {MAX_MESSAGE_CHARS} Zeichen lang sein"
        )));
    }

    let now = Utc::now();
    let mut tx = state.pool.begin().await?;

    credit_service::lock_balance(&mut tx, user_id).await?;

    for limit in [PER_MINUTE, PER_DAY] {
        let observed: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM wcag_messages
            WHERE user_id = $1 AND role = 'user' AND created_at > $2
            "#,
        )
        .bind(user_id)
        .bind(limit.window_start(now))
        .fetch_one(&mut *tx)
        .await?;
        limit.check(observed)?;
    }

    let session = match session_id {
        Some(id) => sqlx::query_as::<_, WcagSession>(
            r#"
            SELECT id, user_id, title, created_at, updated_at
            FROM wcag_sessions
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Sitzung"))?,
        None => sqlx::query_as::<_, WcagSession>(
            r#"
            INSERT INTO wcag_sessions (user_id, title)
            VALUES ($1, $2)
            RETURNING id, user_id, title, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(session_title(question))
        .fetch_one(&mut *tx)
        .await?,
    };

    let mut history = sqlx::query_as::<_, WcagMessage>(
        r#"
        SELECT id, session_id, user_id, role, content, created_at
        FROM wcag_messages
        WHERE session_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(session.id)
    .bind(HISTORY_LIMIT)
    .fetch_all(&mut *tx)
    .await?;
    history.reverse();

    let charge = credit_service::spend(
        &mut tx,
        user_id,
        costs::COACH_MESSAGE,
        CreditKind::CoachMessage,
        "WCAG-Coach Nachricht",
    )
    .await?;

    insert_message(&mut tx, session.id, user_id, "user", question).await?;
    tx.commit().await?;

    let answer = match state.llm.complete(&build_prompt(history, question)).await {
        Ok(answer) => answer,
        Err(e) => {
            refund(&state.pool, user_id, "Erstattung: WCAG-Coach nicht erreichbar").await;
            return Err(e);
        }
    };

    store_answer(&state.pool, session.id, user_id, &answer).await?;

    Ok(CoachResponse {
        session_id: session.id,
        reply: answer,
        credits_remaining: charge.balance_after,
    })
}

async fn insert_message(
    conn: &mut sqlx::PgConnection,
    session_id: Uuid,
    user_id: Uuid,
    role: &str,
    content: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO wcag_messages (session_id, user_id, role, content) VALUES ($1, $2, $3, $4)",
    )
    .bind(session_id)
    .bind(user_id)
    .bind(role)
    .bind(content)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Store the assistant reply. The charged credit is refunded when the reply
/// cannot be stored.
pub(crate) async fn store_answer(
    pool: &DbPool,
    session_id: Uuid,
    user_id: Uuid,
    answer: &str,
) -> Result<(), AppError> {
    let stored = async {
        let mut tx = pool.begin().await?;
        insert_message(&mut tx, session_id, user_id, "assistant", answer).await?;
        sqlx::query("UPDATE wcag_sessions SET updated_at = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok::<_, AppError>(())
    }
    .await;

    if let Err(e) = stored {
        tracing::error!(%session_id, "failed to store coach reply: {}", e);
        refund(pool, user_id, "Erstattung: WCAG-Coach Antwort nicht gespeichert").await;
        return Err(e);
    }
    Ok(())
}

async fn refund(pool: &DbPool, user_id: Uuid, reason: &str) {
    let result = async {
        let mut tx = pool.begin().await?;
        credit_service::grant(
            &mut tx,
            user_id,
            costs::COACH_MESSAGE,
            CreditKind::CoachMessage,
            reason,
            None,
        )
        .await?;
        tx.commit().await?;
        Ok::<_, AppError>(())
    }
    .await;

    if let Err(e) = result {
        tracing::error!(%user_id, "failed to refund coach credit: {}", e);
    }
}

pub async fn list_sessions(pool: &DbPool, user_id: Uuid) -> Result<Vec<WcagSession>, AppError> {
    let sessions = sqlx::query_as::<_, WcagSession>(
        r#"
        SELECT id, user_id, title, created_at, updated_at
        FROM wcag_sessions
        WHERE user_id = $1
        ORDER BY updated_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}

pub async fn get_session(
    pool: &DbPool,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<SessionDetail, AppError> {
    let session = sqlx::query_as::<_, WcagSession>(
        r#"
        SELECT id, user_id, title, created_at, updated_at
        FROM wcag_sessions
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Sitzung"))?;

    let messages = sqlx::query_as::<_, WcagMessage>(
        r#"
        SELECT id, session_id, user_id, role, content, created_at
        FROM wcag_messages
        WHERE session_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(SessionDetail { session, messages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn limit_rejects_at_maximum() {
        assert!(PER_MINUTE.check(9).is_ok());
        let err = PER_MINUTE.check(10).unwrap_err();
        assert!(matches!(err, AppError::RateLimited(_)));
        assert!(PER_DAY.check(99).is_ok());
        assert!(PER_DAY.check(100).is_err());
    }

    #[test]
    fn window_start_moves_with_time() {
        // Counters reset once the window has elapsed: a message sent at t0 is
        // outside the window that starts a minute later.
        let t0 = Utc::now();
        let later = t0 + Duration::seconds(61);
        assert!(PER_MINUTE.window_start(later) > t0);
        assert!(PER_MINUTE.window_start(t0 + Duration::seconds(30)) < t0);
    }

    #[test]
    fn prompt_starts_with_system_and_ends_with_question() {
        let session_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let history = vec![
            WcagMessage {
                id: Uuid::new_v4(),
                session_id,
                user_id,
                role: "user".into(),
                content: "Was ist 1.4.3?".into(),
                created_at: Utc::now(),
            },
            WcagMessage {
                id: Uuid::new_v4(),
                session_id,
                user_id,
                role: "assistant".into(),
                content: "Kontrast (Minimum).".into(),
                created_at: Utc::now(),
            },
        ];

        let prompt = build_prompt(history, "Und 1.4.11?");
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].role, "system");
        assert_eq!(prompt[0].content, SYSTEM_PROMPT);
        assert_eq!(prompt[2].role, "assistant");
        assert_eq!(prompt[3], ChatMessage::user("Und 1.4.11?"));
    }

    #[test]
    fn long_questions_are_shortened_for_titles() {
        assert_eq!(session_title("  Kontrast?  "), "Kontrast?");
        let long = "Wie ".repeat(30);
        let title = session_title(&long);
        assert!(title.ends_with('…'));
        assert!(title.chars().count() <= 61);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn failed_reply_storage_refunds_the_credit(pool: DbPool) {
        let user_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (email, password_hash, name, credits)
            VALUES ('coach@example.de', 'x', 'Coach', 0)
            RETURNING id
            "#,
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        // No such session, so the reply insert fails its foreign key.
        let err = store_answer(&pool, Uuid::new_v4(), user_id, "Antwort")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        let credits: i64 = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(credits, costs::COACH_MESSAGE);

        let reason: String = sqlx::query_scalar(
            "SELECT description FROM credit_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(reason.starts_with("Erstattung"));
    }

    #[tokio::test]
    async fn unconfigured_client_reports_upstream_error() {
        let client = LlmClient::new("http://127.0.0.1:9", None, "test").unwrap();
        let err = client
            .complete(&[ChatMessage::user("Hallo")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
