//! Authentication HTTP handlers.
//!
//! - POST /api/auth/register - Create account, start session, send verification mail
//! - POST /api/auth/login - Start session
//! - POST /api/auth/logout - End session
//! - GET /api/auth/me - Current user
//! - POST /api/auth/verify-email - Confirm email address
//! - POST /api/auth/forgot-password - Request reset link
//! - POST /api/auth/reset-password - Set new password

use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::{Value, json};

use crate::{
    error::{AppError, conflict_on_unique},
    middleware::auth::AuthContext,
    models::{
        bundle::Bundle,
        credit::CreditKind,
        user::{
            ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
            TokenPurpose, TokenRequest, User, UserResponse,
        },
    },
    services::{
        auth_service::{self, USER_COLUMNS},
        credit_service, mail,
    },
    state::AppState,
};

fn session_header(
    state: &AppState,
    user: &User,
) -> Result<[(header::HeaderName, String); 1], AppError> {
    let token = auth_service::issue_token(
        &state.config.jwt_secret,
        user.id,
        &user.email,
        &user.role,
        user.token_version,
        state.config.jwt_ttl_hours,
    )?;
    Ok([(
        header::SET_COOKIE,
        auth_service::session_cookie(
            &token,
            state.config.jwt_ttl_hours,
            state.config.cookie_secure,
        ),
    )])
}

/// Register a new account.
///
/// # Endpoint
///
/// `POST /api/auth/register`
///
/// # Request Body
///
/// ```json
/// {
///   "email": "anna@example.de",
///   "password": "mindestens-8",
///   "name": "Anna Beispiel"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: user profile, session cookie set
/// - **400**: invalid email, short password or empty name
/// - **409**: email already registered
///
/// New accounts start on FREE with its credit allowance booked as a
/// `signup` ledger entry.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = auth_service::normalize_email(&request.email)?;
    auth_service::validate_password(&request.password)?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Bitte einen Namen angeben".to_string()));
    }
    let password_hash = auth_service::hash_password(&request.password)?;

    let mut tx = state.pool.begin().await?;

    let mut user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (email, password_hash, name) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
    ))
    .bind(&email)
    .bind(&password_hash)
    .bind(name)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "Diese E-Mail-Adresse ist bereits registriert"))?;

    let signup = credit_service::grant(
        &mut tx,
        user.id,
        Bundle::Free.included_credits(),
        CreditKind::Signup,
        "Startguthaben",
        None,
    )
    .await?;
    user.credits = signup.balance_after;

    let verification =
        auth_service::create_one_time_token(&mut tx, user.id, TokenPurpose::VerifyEmail).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.id, "user registered");

    let link = state
        .config
        .public_url(&format!("/verify-email?token={verification}"));
    if let Err(e) = state
        .mailer
        .send(&mail::verification_email(&user.email, &user.name, &link))
        .await
    {
        tracing::error!(user_id = %user.id, "failed to send verification mail: {}", e);
    }

    let cookie = session_header(&state, &user)?;
    Ok((StatusCode::CREATED, cookie, Json(UserResponse::from(user))))
}

/// Start a session.
///
/// Unknown email and wrong password produce the same 401.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = request.email.trim().to_lowercase();
    let user = auth_service::find_user_by_email(&state.pool, &email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !auth_service::verify_password(&request.password, &user.password_hash) {
        tracing::info!(user_id = %user.id, "failed login");
        return Err(AppError::InvalidCredentials);
    }

    let cookie = session_header(&state, &user)?;
    Ok((cookie, Json(UserResponse::from(user))))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::SET_COOKIE,
            auth_service::clear_session_cookie(state.config.cookie_secure),
        )],
        StatusCode::NO_CONTENT,
    )
}

/// Current user with live balance and bundle.
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserResponse>, AppError> {
    let user = auth_service::load_user(&state.pool, auth.user_id).await?;
    Ok(Json(UserResponse::from(user)))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<Value>, AppError> {
    let mut tx = state.pool.begin().await?;

    let token =
        auth_service::consume_one_time_token(&mut tx, &request.token, TokenPurpose::VerifyEmail)
            .await?;

    sqlx::query(
        "UPDATE users SET email_verified_at = COALESCE(email_verified_at, NOW()), updated_at = NOW() WHERE id = $1",
    )
    .bind(token.user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(json!({ "message": "E-Mail-Adresse bestätigt" })))
}

/// Request a password reset link.
///
/// Always answers 200 so that registered addresses cannot be probed.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Json(json!({
        "message": "Falls ein Konto existiert, wurde eine E-Mail versendet"
    }));

    let email = request.email.trim().to_lowercase();
    let Some(user) = auth_service::find_user_by_email(&state.pool, &email).await? else {
        return Ok(response);
    };

    let mut tx = state.pool.begin().await?;
    let token =
        auth_service::create_one_time_token(&mut tx, user.id, TokenPurpose::ResetPassword).await?;
    tx.commit().await?;

    let link = state
        .config
        .public_url(&format!("/reset-password?token={token}"));
    if let Err(e) = state
        .mailer
        .send(&mail::password_reset_email(&user.email, &user.name, &link))
        .await
    {
        tracing::error!(user_id = %user.id, "failed to send password reset mail: {}", e);
    }

    Ok(response)
}

/// Set a new password with a reset token.
///
/// Other outstanding reset tokens of the user are invalidated and every
/// existing session ends, since the token version moves on.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    auth_service::validate_password(&request.password)?;
    let password_hash = auth_service::hash_password(&request.password)?;

    let mut tx = state.pool.begin().await?;

    let token = auth_service::consume_one_time_token(
        &mut tx,
        &request.token,
        TokenPurpose::ResetPassword,
    )
    .await?;

    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $1,
            token_version = token_version + 1,
            updated_at = NOW()
        WHERE id = $2
        "#,
    )
        .bind(&password_hash)
        .bind(token.user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE auth_tokens SET used_at = NOW() WHERE user_id = $1 AND purpose = $2 AND used_at IS NULL",
    )
    .bind(token.user_id)
    .bind(TokenPurpose::ResetPassword.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %token.user_id, "password reset");
    Ok(Json(json!({ "message": "Passwort wurde geändert" })))
}
