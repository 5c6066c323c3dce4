//! Credit ledger - the only code path that changes `users.credits`.
//!
//! This service handles:
//! - Atomic balance updates with a matching ledger row
//! - Balance validation for metered actions
//! - Admin corrections
//!
//! # Atomicity Guarantees
//!
//! `grant` and `spend` run on a connection supplied by the caller, which is
//! expected to be inside a PostgreSQL transaction. The balance update and the
//! ledger insert therefore commit or roll back together with whatever else
//! the caller does (invoice creation, scan insert, chat message insert).

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::credit::{CreditKind, CreditTransaction},
};

/// Add credits to a user.
///
/// # Errors
///
/// - `InvalidRequest`: amount is zero or negative
/// - `NotFound`: user does not exist
pub async fn grant(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: i64,
    kind: CreditKind,
    description: &str,
    payment_id: Option<&str>,
) -> Result<CreditTransaction, AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidRequest(
            "Gutschrift muss positiv sein".to_string(),
        ));
    }

    let balance: i64 = sqlx::query_scalar(
        r#"
        UPDATE users
        SET credits = credits + $1,
            updated_at = NOW()
        WHERE id = $2
        RETURNING credits
        "#,
    )
    .bind(amount)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Benutzer"))?;

    record(conn, user_id, amount, kind, description, payment_id, balance).await
}

/// Remove credits from a user for a metered action.
///
/// Locks the user row with `FOR UPDATE`, so concurrent spends of the same
/// user are serialised and the balance can never go negative.
///
/// # Errors
///
/// - `InsufficientCredits`: balance is lower than `amount`
/// - `NotFound`: user does not exist
pub async fn spend(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: i64,
    kind: CreditKind,
    description: &str,
) -> Result<CreditTransaction, AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidRequest(
            "Abbuchung muss positiv sein".to_string(),
        ));
    }

    let available = lock_balance(conn, user_id).await?;
    if available < amount {
        return Err(AppError::InsufficientCredits {
            required: amount,
            available,
        });
    }

    let balance: i64 = sqlx::query_scalar(
        r#"
        UPDATE users
        SET credits = credits - $1,
            updated_at = NOW()
        WHERE id = $2
        RETURNING credits
        "#,
    )
    .bind(amount)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    record(conn, user_id, -amount, kind, description, None, balance).await
}

/// Lock the user row and return its balance.
pub async fn lock_balance(conn: &mut PgConnection, user_id: Uuid) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT credits FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("Benutzer"))
}

/// Manual correction by an admin. Positive amounts grant, negative amounts
/// spend (and may not overdraw the account).
pub async fn adjust(
    pool: &DbPool,
    user_id: Uuid,
    amount: i64,
    reason: &str,
) -> Result<CreditTransaction, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Bitte einen Grund angeben".to_string(),
        ));
    }

    if amount == 0 {
        return Err(AppError::InvalidRequest(
            "Betrag darf nicht 0 sein".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    let entry = if amount > 0 {
        grant(&mut tx, user_id, amount, CreditKind::AdminAdjustment, reason, None).await?
    } else {
        spend(&mut tx, user_id, -amount, CreditKind::AdminAdjustment, reason).await?
    };
    tx.commit().await?;

    tracing::info!(%user_id, amount, "admin credit adjustment");
    Ok(entry)
}

/// Most recent ledger rows of a user, newest first.
pub async fn history(
    pool: &DbPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<CreditTransaction>, AppError> {
    let rows = sqlx::query_as::<_, CreditTransaction>(
        r#"
        SELECT id, user_id, amount, kind, description, payment_id, balance_after, created_at
        FROM credit_transactions
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

async fn record(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: i64,
    kind: CreditKind,
    description: &str,
    payment_id: Option<&str>,
    balance_after: i64,
) -> Result<CreditTransaction, AppError> {
    let entry = sqlx::query_as::<_, CreditTransaction>(
        r#"
        INSERT INTO credit_transactions (
            user_id,
            amount,
            kind,
            description,
            payment_id,
            balance_after
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, user_id, amount, kind, description, payment_id, balance_after, created_at
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(kind.as_str())
    .bind(description)
    .bind(payment_id)
    .bind(balance_after)
    .fetch_one(&mut *conn)
    .await?;

    Ok(entry)
}
