//! Credit ledger models.
//!
//! Every change of `users.credits` is mirrored by one `CreditTransaction`
//! row, so the balance can always be reconstructed from the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a credit ledger row.
///
/// # Database Table
///
/// Maps to the `credit_transactions` table. Each row:
/// - Belongs to one user
/// - Carries a signed amount (positive grant, negative spend)
/// - Records the balance right after it was applied
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CreditTransaction {
    pub id: Uuid,

    pub user_id: Uuid,

    /// Signed amount of credits, never zero
    pub amount: i64,

    /// See [`CreditKind`]
    pub kind: String,

    pub description: String,

    /// Provider payment id for purchases
    pub payment_id: Option<String>,

    pub balance_after: i64,

    pub created_at: DateTime<Utc>,
}

/// Reason for a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    /// Starting allowance on registration
    Signup,
    /// Credits included in a purchased bundle
    BundlePurchase,
    /// Standalone credit pack
    CreditPurchase,
    /// Manual correction by an admin
    AdminAdjustment,
    CoachMessage,
    Scan,
    BfeStatement,
}

impl CreditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CreditKind::Signup => "signup",
            CreditKind::BundlePurchase => "bundle_purchase",
            CreditKind::CreditPurchase => "credit_purchase",
            CreditKind::AdminAdjustment => "admin_adjustment",
            CreditKind::CoachMessage => "coach_message",
            CreditKind::Scan => "scan",
            CreditKind::BfeStatement => "bfe_statement",
        }
    }
}

/// Response for `GET /api/credits`.
#[derive(Debug, Serialize)]
pub struct CreditOverview {
    pub balance: i64,
    pub transactions: Vec<CreditTransaction>,
}

/// Request body for `POST /api/admin/users/{id}/credits`.
///
/// # JSON Example
///
/// ```json
/// {
///   "amount": -5,
///   "reason": "Doppelte Gutschrift korrigiert"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreditAdjustmentRequest {
    pub amount: i64,
    pub reason: String,
}
