//! Bundle, credit, checkout and invoice endpoints.
//!
//! - GET /api/bundles - Price list (public)
//! - GET /api/credits - Balance and recent ledger entries
//! - POST /api/checkout/bundle - Start a bundle purchase
//! - POST /api/checkout/credits - Start a credit pack purchase
//! - GET /api/invoices - Own invoices
//! - GET /api/invoices/{id}/pdf - Invoice as PDF

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        bundle::{Bundle, BundleOffer, CREDIT_PACKS, CreditPack, find_credit_pack},
        credit::CreditOverview,
        invoice::Invoice,
        payment::{BundleCheckoutRequest, CheckoutResponse, CreditCheckoutRequest},
    },
    services::{
        auth_service, credit_service,
        invoice_service::{self, InvoiceRecipient},
        payment_service,
    },
    state::AppState,
};

const LEDGER_PAGE: i64 = 50;

#[derive(Debug, Serialize)]
pub struct PriceList {
    pub bundles: Vec<BundleOffer>,
    pub credit_packs: Vec<CreditPack>,
}

pub async fn list_bundles() -> Json<PriceList> {
    Json(PriceList {
        bundles: Bundle::ALL.into_iter().map(BundleOffer::from).collect(),
        credit_packs: CREDIT_PACKS.to_vec(),
    })
}

pub async fn get_credits(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<CreditOverview>, AppError> {
    let user = auth_service::load_user(&state.pool, auth.user_id).await?;
    let transactions = credit_service::history(&state.pool, auth.user_id, LEDGER_PAGE).await?;

    Ok(Json(CreditOverview {
        balance: user.credits,
        transactions,
    }))
}

/// Create a Mollie payment for a bundle.
///
/// # Request Body
///
/// ```json
/// { "bundle": "PRO", "cycle": "yearly" }
/// ```
///
/// # Response (200 OK)
///
/// ```json
/// { "payment_id": "tr_WDqYK6vllg", "checkout_url": "https://www.mollie.com/checkout/..." }
/// ```
pub async fn checkout_bundle(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<BundleCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let checkout =
        payment_service::create_bundle_checkout(&state, auth.user_id, request.bundle, request.cycle)
            .await?;
    Ok(Json(checkout))
}

pub async fn checkout_credits(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreditCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let pack = find_credit_pack(&request.pack).ok_or_else(|| {
        AppError::InvalidRequest(format!("Unbekanntes Credit-Paket: {}", request.pack))
    })?;
    let checkout = payment_service::create_credit_checkout(&state, auth.user_id, pack).await?;
    Ok(Json(checkout))
}

pub async fn list_invoices(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    let invoices = sqlx::query_as::<_, Invoice>(
        r#"
        SELECT id, user_id, number, payment_id, description, amount_cents, currency, status, issued_at
        FROM invoices
        WHERE user_id = $1
        ORDER BY issued_at DESC
        "#,
    )
    .bind(auth.user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(invoices))
}

/// Render an invoice PDF on the fly. Owner or admin only.
pub async fn invoice_pdf(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = sqlx::query_as::<_, Invoice>(
        r#"
        SELECT id, user_id, number, payment_id, description, amount_cents, currency, status, issued_at
        FROM invoices
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .filter(|invoice| invoice.user_id == auth.user_id || auth.is_admin())
    .ok_or(AppError::NotFound("Rechnung"))?;

    let owner = auth_service::load_user(&pool, invoice.user_id).await?;
    let pdf = invoice_service::render_pdf(
        &invoice,
        &InvoiceRecipient {
            name: &owner.name,
            email: &owner.email,
        },
    )?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", invoice.pdf_filename()),
            ),
        ],
        pdf,
    ))
}
