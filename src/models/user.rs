//! User data models and authentication request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::bundle::{Bundle, Entitlements};

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table. Each user:
/// - Owns websites, scans, tickets, invoices and coach sessions
/// - Holds a credit balance that is only changed through the credit ledger
/// - Has a bundle (text column, see [`Bundle`]) with an optional expiry
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    pub email: String,

    /// Argon2id PHC string, never serialized
    pub password_hash: String,

    pub name: String,

    /// `user` or `admin`
    pub role: String,

    /// `FREE`, `STARTER`, `PRO` or `ENTERPRISE`
    pub bundle: String,

    pub bundle_cycle: Option<String>,

    pub bundle_expires_at: Option<DateTime<Utc>>,

    /// Current credit balance, never negative (CHECK constraint)
    pub credits: i64,

    pub email_verified_at: Option<DateTime<Utc>>,

    /// Copied into session tokens; a token with an older value is rejected
    pub token_version: i32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Stored bundle, FREE if the column holds something unexpected.
    pub fn stored_bundle(&self) -> Bundle {
        self.bundle.parse().unwrap_or(Bundle::Free)
    }

    pub fn entitlements(&self, now: DateTime<Utc>) -> Entitlements {
        Entitlements::resolve(self.stored_bundle(), self.bundle_expires_at, now)
    }
}

/// Request body for `POST /api/auth/register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Request body for `POST /api/auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Public view of a user.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "email": "anna@example.de",
///   "name": "Anna",
///   "role": "user",
///   "bundle": "PRO",
///   "effective_bundle": "PRO",
///   "bundle_expires_at": "2026-10-16T10:00:00Z",
///   "credits": 200,
///   "email_verified": true,
///   "created_at": "2025-10-16T10:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub bundle: String,
    pub effective_bundle: Bundle,
    pub bundle_cycle: Option<String>,
    pub bundle_expires_at: Option<DateTime<Utc>>,
    pub credits: i64,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Removes the password hash and resolves the effective bundle.
impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let effective_bundle = user.entitlements(Utc::now()).bundle;
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            bundle: user.bundle,
            effective_bundle,
            bundle_cycle: user.bundle_cycle,
            bundle_expires_at: user.bundle_expires_at,
            credits: user.credits,
            email_verified: user.email_verified_at.is_some(),
            created_at: user.created_at,
        }
    }
}

/// Single-use token for email verification or password reset.
///
/// Only the SHA-256 hash of the token is stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    VerifyEmail,
    ResetPassword,
}

impl TokenPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenPurpose::VerifyEmail => "verify_email",
            TokenPurpose::ResetPassword => "reset_password",
        }
    }

    pub fn lifetime(self) -> chrono::Duration {
        match self {
            TokenPurpose::VerifyEmail => chrono::Duration::hours(24),
            TokenPurpose::ResetPassword => chrono::Duration::hours(1),
        }
    }
}

/// Request body for `POST /api/admin/users/{id}/bundle`.
///
/// Without `expires_at` the bundle does not expire.
#[derive(Debug, Deserialize)]
pub struct SetBundleRequest {
    pub bundle: Bundle,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}
