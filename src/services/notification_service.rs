//! Notifications: persistence plus in-process fan-out to SSE listeners.
//!
//! Every created notification is written to the database first and then
//! published on a `tokio::sync::broadcast` channel. Listeners subscribe per
//! user; delivery to live listeners is best effort and the database row is
//! the source of truth.

use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::notification::{NewNotification, Notification},
};

/// Number of notifications a slow listener may lag behind before it skips.
const HUB_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    /// Publish to live listeners. Having no listeners is not an error.
    pub fn publish(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stream of notifications addressed to one user.
    ///
    /// Ends when the hub is dropped. Lagging listeners skip missed items.
    pub fn user_stream(&self, user_id: Uuid) -> impl Stream<Item = Notification> + Send + 'static + use<> {
        let receiver = self.sender.subscribe();
        futures::stream::unfold(receiver, move |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(notification) if notification.user_id == user_id => {
                        return Some((notification, receiver));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%user_id, skipped, "notification listener lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }
}

/// Persist a notification and publish it.
pub async fn notify(
    pool: &DbPool,
    hub: &NotificationHub,
    new: NewNotification,
) -> Result<Notification, AppError> {
    let notification = sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (user_id, kind, title, body, link)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, kind, title, body, link, read_at, created_at
        "#,
    )
    .bind(new.user_id)
    .bind(new.kind)
    .bind(&new.title)
    .bind(&new.body)
    .bind(&new.link)
    .fetch_one(pool)
    .await?;

    hub.publish(notification.clone());
    Ok(notification)
}

/// Like [`notify`], but failures are logged and swallowed.
pub async fn notify_best_effort(pool: &DbPool, hub: &NotificationHub, new: NewNotification) {
    let user_id = new.user_id;
    let kind = new.kind;
    if let Err(e) = notify(pool, hub, new).await {
        tracing::error!(%user_id, kind, "failed to create notification: {:?}", e);
    }
}

pub async fn list(pool: &DbPool, user_id: Uuid, limit: i64) -> Result<Vec<Notification>, AppError> {
    let rows = sqlx::query_as::<_, Notification>(
        r#"
        SELECT id, user_id, kind, title, body, link, read_at, created_at
        FROM notifications
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn unread_count(pool: &DbPool, user_id: Uuid) -> Result<i64, AppError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Mark one notification as read. Only the owner may do so.
pub async fn mark_read(
    pool: &DbPool,
    user_id: Uuid,
    notification_id: Uuid,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET read_at = COALESCE(read_at, NOW())
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(notification_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Benachrichtigung"));
    }
    Ok(())
}

/// Mark all unread notifications of a user as read; returns how many changed.
pub async fn mark_all_read(pool: &DbPool, user_id: Uuid) -> Result<u64, AppError> {
    let result = sqlx::query(
        "UPDATE notifications SET read_at = NOW() WHERE user_id = $1 AND read_at IS NULL",
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::StreamExt;

    fn notification_for(user_id: Uuid, title: &str) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: "test".to_string(),
            title: title.to_string(),
            body: String::new(),
            link: None,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn listeners_only_receive_their_own_notifications() {
        let hub = NotificationHub::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let stream = hub.user_stream(alice);
        tokio::pin!(stream);
        assert_eq!(hub.listener_count(), 1);

        hub.publish(notification_for(bob, "für Bob"));
        hub.publish(notification_for(alice, "für Alice"));

        let received = stream.next().await.unwrap();
        assert_eq!(received.user_id, alice);
        assert_eq!(received.title, "für Alice");
    }

    #[tokio::test]
    async fn publishing_without_listeners_is_fine() {
        let hub = NotificationHub::new();
        hub.publish(notification_for(Uuid::new_v4(), "ins Leere"));
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn stream_ends_when_hub_is_dropped() {
        let hub = NotificationHub::new();
        let stream = hub.user_stream(Uuid::new_v4());
        tokio::pin!(stream);
        drop(hub);
        assert!(stream.next().await.is_none());
    }
}
