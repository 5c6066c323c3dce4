//! Support ticket HTTP handlers.
//!
//! - POST /api/tickets - Open a ticket with its first message
//! - GET /api/tickets - Own tickets (admins: all)
//! - GET /api/tickets/{id} - Ticket with thread
//! - POST /api/tickets/{id}/messages - Reply
//! - PATCH /api/admin/tickets/{id} - Change status (admin)
//!
//! A ticket is only visible to its owner and to admins; everyone else gets
//! 404 so that ticket ids cannot be probed.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        notification::NewNotification,
        ticket::{
            CreateTicketRequest, SupportTicket, TicketDetail, TicketMessage, TicketReplyRequest,
            TicketStatus, UpdateTicketStatusRequest,
        },
    },
    services::notification_service,
    state::AppState,
};

const MAX_SUBJECT_CHARS: usize = 200;

pub fn can_view_ticket(ticket: &SupportTicket, auth: &AuthContext) -> bool {
    ticket.user_id == auth.user_id || auth.is_admin()
}

/// Status a ticket moves to after a reply.
pub fn status_after_reply(is_staff: bool) -> TicketStatus {
    if is_staff {
        TicketStatus::Answered
    } else {
        TicketStatus::Open
    }
}

async fn visible_ticket(
    pool: &DbPool,
    auth: &AuthContext,
    id: Uuid,
) -> Result<SupportTicket, AppError> {
    sqlx::query_as::<_, SupportTicket>(
        "SELECT id, user_id, subject, priority, status, created_at, updated_at FROM support_tickets WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .filter(|ticket| can_view_ticket(ticket, auth))
    .ok_or(AppError::NotFound("Ticket"))
}

/// Open a support ticket.
///
/// # Request Body
///
/// ```json
/// {
///   "subject": "Rechnung fehlt",
///   "message": "Für meine letzte Zahlung habe ich keine Rechnung erhalten.",
///   "priority": "high"
/// }
/// ```
pub async fn create_ticket(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<TicketDetail>), AppError> {
    let subject = request.subject.trim();
    let message = request.message.trim();
    if subject.is_empty() || message.is_empty() {
        return Err(AppError::InvalidRequest(
            "Betreff und Nachricht dürfen nicht leer sein".to_string(),
        ));
    }
    if subject.chars().count() > MAX_SUBJECT_CHARS {
        return Err(AppError::InvalidRequest(format!(
            "Der Betreff darf höchstens {MAX_SUBJECT_CHARS} Zeichen lang sein"
        )));
    }

    let mut tx = pool.begin().await?;

    let ticket = sqlx::query_as::<_, SupportTicket>(
        r#"
        INSERT INTO support_tickets (user_id, subject, priority)
        VALUES ($1, $2, $3)
        RETURNING id, user_id, subject, priority, status, created_at, updated_at
        "#,
    )
    .bind(auth.user_id)
    .bind(subject)
    .bind(request.priority.as_str())
    .fetch_one(&mut *tx)
    .await?;

    let first = sqlx::query_as::<_, TicketMessage>(
        r#"
        INSERT INTO ticket_messages (ticket_id, author_id, is_staff, body)
        VALUES ($1, $2, false, $3)
        RETURNING id, ticket_id, author_id, is_staff, body, created_at
        "#,
    )
    .bind(ticket.id)
    .bind(auth.user_id)
    .bind(message)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(ticket_id = %ticket.id, user_id = %auth.user_id, "support ticket opened");

    Ok((
        StatusCode::CREATED,
        Json(TicketDetail {
            ticket,
            messages: vec![first],
        }),
    ))
}

pub async fn list_tickets(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<SupportTicket>>, AppError> {
    let tickets = sqlx::query_as::<_, SupportTicket>(
        r#"
        SELECT id, user_id, subject, priority, status, created_at, updated_at
        FROM support_tickets
        WHERE user_id = $1 OR $2
        ORDER BY updated_at DESC
        "#,
    )
    .bind(auth.user_id)
    .bind(auth.is_admin())
    .fetch_all(&pool)
    .await?;

    Ok(Json(tickets))
}

pub async fn get_ticket(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketDetail>, AppError> {
    let ticket = visible_ticket(&pool, &auth, id).await?;

    let messages = sqlx::query_as::<_, TicketMessage>(
        r#"
        SELECT id, ticket_id, author_id, is_staff, body, created_at
        FROM ticket_messages
        WHERE ticket_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(ticket.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(TicketDetail { ticket, messages }))
}

/// Reply to a ticket.
///
/// Admin replies on someone else's ticket count as staff replies: the
/// ticket becomes `answered` and the owner is notified. Owner replies
/// reopen the ticket. Closed tickets accept no replies.
pub async fn reply(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<TicketReplyRequest>,
) -> Result<(StatusCode, Json<TicketMessage>), AppError> {
    let body = request.message.trim();
    if body.is_empty() {
        return Err(AppError::InvalidRequest(
            "Die Nachricht darf nicht leer sein".to_string(),
        ));
    }

    let ticket = visible_ticket(&state.pool, &auth, id).await?;
    if ticket.status == TicketStatus::Closed.as_str() {
        return Err(AppError::Conflict("Das Ticket ist geschlossen".to_string()));
    }
    let is_staff = auth.is_admin() && ticket.user_id != auth.user_id;

    let mut tx = state.pool.begin().await?;

    let message = sqlx::query_as::<_, TicketMessage>(
        r#"
        INSERT INTO ticket_messages (ticket_id, author_id, is_staff, body)
        VALUES ($1, $2, $3, $4)
        RETURNING id, ticket_id, author_id, is_staff, body, created_at
        "#,
    )
    .bind(ticket.id)
    .bind(auth.user_id)
    .bind(is_staff)
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE support_tickets SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(status_after_reply(is_staff).as_str())
        .bind(ticket.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    if is_staff {
        notification_service::notify_best_effort(
            &state.pool,
            &state.notifications,
            NewNotification::new(
                ticket.user_id,
                "ticket_reply",
                "Neue Antwort auf Ihr Ticket",
                ticket.subject.clone(),
            )
            .with_link(format!("/dashboard/support/{}", ticket.id)),
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// Change ticket status (admin).
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTicketStatusRequest>,
) -> Result<Json<SupportTicket>, AppError> {
    let ticket = sqlx::query_as::<_, SupportTicket>(
        r#"
        UPDATE support_tickets
        SET status = $1, updated_at = NOW()
        WHERE id = $2
        RETURNING id, user_id, subject, priority, status, created_at, updated_at
        "#,
    )
    .bind(request.status.as_str())
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Ticket"))?;

    if request.status == TicketStatus::Closed {
        notification_service::notify_best_effort(
            &state.pool,
            &state.notifications,
            NewNotification::new(
                ticket.user_id,
                "ticket_closed",
                "Ticket geschlossen",
                ticket.subject.clone(),
            )
            .with_link(format!("/dashboard/support/{}", ticket.id)),
        )
        .await;
    }

    Ok(Json(ticket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn auth(user_id: Uuid, role: &str) -> AuthContext {
        AuthContext {
            user_id,
            email: "x@example.de".to_string(),
            role: role.to_string(),
        }
    }

    fn ticket_of(user_id: Uuid) -> SupportTicket {
        SupportTicket {
            id: Uuid::new_v4(),
            user_id,
            subject: "Hilfe".to_string(),
            priority: "normal".to_string(),
            status: "open".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn ticket_is_hidden_from_other_users() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let ticket = ticket_of(alice);

        assert!(can_view_ticket(&ticket, &auth(alice, "user")));
        assert!(!can_view_ticket(&ticket, &auth(bob, "user")));
    }

    #[test]
    fn admins_see_every_ticket() {
        let ticket = ticket_of(Uuid::new_v4());
        assert!(can_view_ticket(&ticket, &auth(Uuid::new_v4(), "admin")));
    }

    #[test]
    fn replies_move_status() {
        assert_eq!(status_after_reply(true), TicketStatus::Answered);
        assert_eq!(status_after_reply(false), TicketStatus::Open);
    }
}
