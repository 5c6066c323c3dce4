//! Password hashing, session tokens and single-use tokens.
//!
//! - Passwords: Argon2id PHC strings
//! - Sessions: HS256 JWT carried in the `auth-token` cookie
//! - Verification / reset tokens: 32 random bytes, hex encoded; only the
//!   SHA-256 hash is persisted

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use sqlx::PgConnection;

use crate::{
    db::DbPool,
    error::AppError,
    models::user::{AuthToken, TokenPurpose, User},
};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "auth-token";

pub const MIN_PASSWORD_LEN: usize = 8;

/// Claims stored in the session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub email: String,
    /// `user` or `admin`
    pub role: String,
    /// `users.token_version` at issue time
    pub ver: i32,
    pub iat: i64,
    pub exp: i64,
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("salt encoding failed: {e}")))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Verify a password against a stored PHC string.
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("unparseable password hash: {}", e);
            false
        }
    }
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidRequest(format!(
            "Das Passwort muss mindestens {MIN_PASSWORD_LEN} Zeichen lang sein"
        )));
    }
    Ok(())
}

/// Normalise an email address for storage and lookup.
pub fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(AppError::InvalidRequest(
            "Bitte eine gültige E-Mail-Adresse angeben".to_string(),
        ));
    }
    Ok(email)
}

/// Issue a signed session token.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    role: &str,
    token_version: i32,
    ttl_hours: i64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role: role.to_string(),
        ver: token_version,
        iat: now.timestamp(),
        exp: (now + Duration::hours(ttl_hours)).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))
}

/// Verify signature and expiry of a session token.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(token: &str, ttl_hours: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl_hours * 3600
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Extract the session token from a `Cookie` header value.
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .filter(|token| !token.is_empty())
}

/// Generate a single-use token. Returns `(plain, sha256_hex)`; only the
/// hash is stored, the plain value goes into the mail link.
pub fn generate_one_time_token() -> (String, String) {
    let bytes: [u8; 32] = rand::random();
    let plain = hex::encode(bytes);
    let hashed = hash_token(&plain);
    (plain, hashed)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Column list matching [`User`].
pub const USER_COLUMNS: &str = "id, email, password_hash, name, role, bundle, bundle_cycle, \
     bundle_expires_at, credits, email_verified_at, token_version, created_at, updated_at";

pub async fn load_user(pool: &DbPool, user_id: Uuid) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Benutzer"))
}

/// Load a user and lock the row until the transaction ends.
///
/// Serializes limit checks (websites, team seats) that count first and
/// insert afterwards.
pub async fn lock_user(conn: &mut PgConnection, user_id: Uuid) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
    ))
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Benutzer"))
}

pub async fn find_user_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Store a new single-use token and return its plain value.
pub async fn create_one_time_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    purpose: TokenPurpose,
) -> Result<String, AppError> {
    let (plain, hashed) = generate_one_time_token();

    sqlx::query(
        r#"
        INSERT INTO auth_tokens (user_id, token_hash, purpose, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(&hashed)
    .bind(purpose.as_str())
    .bind(Utc::now() + purpose.lifetime())
    .execute(&mut *conn)
    .await?;

    Ok(plain)
}

/// Mark a single-use token as used and return it.
///
/// Unknown, used, expired or wrong-purpose tokens all fail the same way.
pub async fn consume_one_time_token(
    conn: &mut PgConnection,
    plain: &str,
    purpose: TokenPurpose,
) -> Result<AuthToken, AppError> {
    sqlx::query_as::<_, AuthToken>(
        r#"
        UPDATE auth_tokens
        SET used_at = NOW()
        WHERE token_hash = $1
          AND purpose = $2
          AND used_at IS NULL
          AND expires_at > NOW()
        RETURNING id, user_id, token_hash, purpose, expires_at, used_at, created_at
        "#,
    )
    .bind(hash_token(plain.trim()))
    .bind(purpose.as_str())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::InvalidRequest("Der Link ist ungültig oder abgelaufen".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("korrekt-pferd").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("korrekt-pferd", &hash));
        assert!(!verify_password("falsch", &hash));
        assert!(!verify_password("korrekt-pferd", "not-a-hash"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("kurz").is_err());
        assert!(validate_password("lang genug").is_ok());
    }

    #[test]
    fn token_round_trip_and_tamper_detection() {
        let user_id = Uuid::new_v4();
        let token = issue_token("s3cret", user_id, "a@example.de", "admin", 3, 1).unwrap();
        let claims = verify_token("s3cret", &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.ver, 3);

        assert!(matches!(
            verify_token("other-secret", &token),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token = issue_token("s3cret", Uuid::new_v4(), "a@example.de", "user", 0, -2).unwrap();
        assert!(verify_token("s3cret", &token).is_err());
    }

    #[test]
    fn cookie_header_parsing() {
        assert_eq!(
            token_from_cookie_header("theme=dark; auth-token=abc.def.ghi; lang=de"),
            Some("abc.def.ghi")
        );
        assert_eq!(token_from_cookie_header("auth-token="), None);
        assert_eq!(token_from_cookie_header("auth-token-old=x"), None);
        assert_eq!(token_from_cookie_header("theme=dark"), None);
    }

    #[test]
    fn session_cookie_flags() {
        let cookie = session_cookie("tok", 2, true);
        assert!(cookie.starts_with("auth-token=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=7200"));
        assert!(cookie.ends_with("; Secure"));
        assert!(clear_session_cookie(false).contains("Max-Age=0"));
    }

    #[test]
    fn email_normalisation() {
        assert_eq!(
            normalize_email("  Anna@Example.DE ").unwrap(),
            "anna@example.de"
        );
        assert!(normalize_email("anna").is_err());
        assert!(normalize_email("@example.de").is_err());
    }

    #[test]
    fn one_time_token_hash_matches() {
        let (plain, hashed) = generate_one_time_token();
        assert_eq!(plain.len(), 64);
        assert_eq!(hash_token(&plain), hashed);
    }
}
