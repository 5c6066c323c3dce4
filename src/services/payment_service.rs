//! Checkout creation and payment webhook processing (Mollie).
//!
//! # Webhook Processing
//!
//! 1. Fetch the authoritative payment from the provider (the webhook body
//!    only carries an id and is not trusted)
//! 2. Ignore anything that is not `paid`
//! 3. In one database transaction: claim the payment id in
//!    `processed_payments`, apply the bundle or credit purchase, append the
//!    ledger row, create the invoice
//! 4. After commit: render the invoice PDF, mail it, notify the user.
//!    Failures here are logged and never undo the purchase.
//!
//! A redelivered webhook finds the claimed payment id and does nothing.

use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        bundle::{BillingCycle, Bundle, CreditPack},
        credit::CreditKind,
        invoice::{Invoice, format_euro},
        notification::NewNotification,
        payment::{
            CheckoutResponse, CreatePayment, MollieAmount, MolliePayment, PaymentMetadata,
            WebhookOutcome,
        },
    },
    services::{
        credit_service,
        invoice_service::{self, InvoiceRecipient},
        mail, notification_service,
    },
    state::AppState,
};

/// HTTP client for the Mollie payments API.
#[derive(Debug, Clone)]
pub struct MollieClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MollieClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client error: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub async fn create_payment(&self, request: &CreatePayment) -> Result<MolliePayment, AppError> {
        let response = self
            .http
            .post(format!("{}/payments", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Mollie: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("Mollie returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Mollie response: {e}")))
    }

    /// Fetch a payment; `None` if the provider does not know the id.
    pub async fn get_payment(&self, payment_id: &str) -> Result<Option<MolliePayment>, AppError> {
        let response = self
            .http
            .get(format!("{}/payments/{}", self.base_url, payment_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Mollie: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            status if status.is_success() => response
                .json()
                .await
                .map(Some)
                .map_err(|e| AppError::Upstream(format!("Mollie response: {e}"))),
            status => Err(AppError::Upstream(format!("Mollie returned {status}"))),
        }
    }
}

/// Payment ids are opaque but always `[A-Za-z0-9_]+`; anything else is rejected
/// before it is interpolated into a provider URL.
pub fn validate_payment_id(id: &str) -> Result<&str, AppError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::InvalidRequest("Missing payment id".to_string()));
    }
    if id.len() > 64 || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::InvalidRequest("Invalid payment id".to_string()));
    }
    Ok(id)
}

pub fn bundle_description(bundle: Bundle, cycle: BillingCycle) -> String {
    let cycle = match cycle {
        BillingCycle::Monthly => "monatlich",
        BillingCycle::Yearly => "jährlich",
    };
    format!("{}-Paket ({cycle})", bundle.display_name())
}

pub fn credits_description(credits: i64) -> String {
    format!("{credits} Credits")
}

/// Start a checkout for a bundle.
pub async fn create_bundle_checkout(
    state: &AppState,
    user_id: Uuid,
    bundle: Bundle,
    cycle: BillingCycle,
) -> Result<CheckoutResponse, AppError> {
    let price = bundle.price_cents(cycle).ok_or_else(|| {
        AppError::InvalidRequest("Das Free-Paket kann nicht gekauft werden".to_string())
    })?;

    create_checkout(
        state,
        price,
        bundle_description(bundle, cycle),
        PaymentMetadata::Bundle {
            user_id,
            bundle,
            cycle,
        },
    )
    .await
}

/// Start a checkout for a credit pack.
pub async fn create_credit_checkout(
    state: &AppState,
    user_id: Uuid,
    pack: CreditPack,
) -> Result<CheckoutResponse, AppError> {
    create_checkout(
        state,
        pack.price_cents,
        credits_description(pack.credits),
        PaymentMetadata::Credits {
            user_id,
            credits: pack.credits,
        },
    )
    .await
}

async fn create_checkout(
    state: &AppState,
    price_cents: i64,
    description: String,
    metadata: PaymentMetadata,
) -> Result<CheckoutResponse, AppError> {
    let request = CreatePayment {
        amount: MollieAmount::eur(price_cents),
        description,
        redirect_url: state.config.public_url("/dashboard/billing?payment=return"),
        webhook_url: state.config.public_url("/api/webhooks/mollie"),
        metadata,
    };

    let payment = state.mollie.create_payment(&request).await?;
    let checkout_url = payment
        .checkout_url()
        .ok_or_else(|| AppError::Upstream("Mollie returned no checkout link".to_string()))?
        .to_string();

    tracing::info!(
        payment_id = %payment.id,
        user_id = %request.metadata.user_id(),
        "checkout created"
    );

    Ok(CheckoutResponse {
        payment_id: payment.id,
        checkout_url,
    })
}

/// Handle one webhook delivery for `payment_id`.
///
/// # Errors
///
/// - `InvalidRequest`: id missing/malformed, unknown to the provider, the
///   payment carries no usable metadata, or its user no longer exists
/// - `Upstream`: provider unreachable
/// - `Database`: the purchase could not be stored (provider will retry)
pub async fn process_webhook(
    state: &AppState,
    payment_id: &str,
) -> Result<WebhookOutcome, AppError> {
    let payment_id = validate_payment_id(payment_id)?;

    let payment = state
        .mollie
        .get_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::InvalidRequest("Unknown payment".to_string()))?;

    if !payment.is_paid() {
        tracing::info!(payment_id, status = %payment.status, "payment not paid, ignoring");
        return Ok(WebhookOutcome::Ignored {
            status: payment.status,
        });
    }

    let metadata = payment.parsed_metadata().ok_or_else(|| {
        AppError::InvalidRequest("Payment carries no valid metadata".to_string())
    })?;
    let amount_cents = payment
        .amount
        .to_cents()
        .ok_or_else(|| AppError::InvalidRequest("Payment amount is malformed".to_string()))?;

    let mut tx = state.pool.begin().await?;

    // The user row stays locked until commit so it cannot vanish mid-way.
    let user_exists = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(metadata.user_id())
    .fetch_optional(&mut *tx)
    .await?
    .is_some();
    if !user_exists {
        tx.rollback().await?;
        tracing::warn!(payment_id, user_id = %metadata.user_id(), "payment for unknown user");
        return Err(AppError::InvalidRequest("Unknown user".to_string()));
    }

    let claimed = sqlx::query(
        r#"
        INSERT INTO processed_payments (payment_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (payment_id) DO NOTHING
        "#,
    )
    .bind(&payment.id)
    .bind(metadata.user_id())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if claimed == 0 {
        tx.rollback().await?;
        tracing::info!(payment_id, "payment already processed");
        return Ok(WebhookOutcome::AlreadyProcessed);
    }

    apply_purchase(&mut tx, &payment, &metadata, amount_cents).await?;

    let invoice = invoice_service::create_invoice(
        &mut tx,
        metadata.user_id(),
        &payment.id,
        &payment.description,
        amount_cents,
        &payment.amount.currency,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        payment_id,
        user_id = %metadata.user_id(),
        invoice = %invoice.number,
        "payment applied"
    );

    deliver_invoice(state, &invoice).await;
    notification_service::notify_best_effort(
        &state.pool,
        &state.notifications,
        NewNotification::new(
            metadata.user_id(),
            "payment",
            "Zahlung eingegangen",
            format!(
                "{} wurde gebucht. Rechnung {} über {}.",
                payment.description,
                invoice.number,
                format_euro(invoice.amount_cents)
            ),
        )
        .with_link("/dashboard/billing"),
    )
    .await;

    Ok(WebhookOutcome::Applied {
        invoice_number: invoice.number,
    })
}

async fn apply_purchase(
    conn: &mut PgConnection,
    payment: &MolliePayment,
    metadata: &PaymentMetadata,
    amount_cents: i64,
) -> Result<(), AppError> {
    match *metadata {
        PaymentMetadata::Bundle {
            user_id,
            bundle,
            cycle,
        } => {
            if bundle.price_cents(cycle) != Some(amount_cents) {
                tracing::warn!(
                    payment_id = %payment.id,
                    amount_cents,
                    "paid amount differs from list price"
                );
            }

            let updated = sqlx::query(
                r#"
                UPDATE users
                SET bundle = $1,
                    bundle_cycle = $2,
                    bundle_expires_at = $3,
                    updated_at = NOW()
                WHERE id = $4
                "#,
            )
            .bind(bundle.as_str())
            .bind(cycle.as_str())
            .bind(cycle.expiry_from(Utc::now()))
            .bind(user_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

            if updated == 0 {
                return Err(AppError::NotFound("Benutzer"));
            }

            credit_service::grant(
                conn,
                user_id,
                bundle.included_credits(),
                CreditKind::BundlePurchase,
                &bundle_description(bundle, cycle),
                Some(&payment.id),
            )
            .await?;
        }
        PaymentMetadata::Credits { user_id, credits } => {
            credit_service::grant(
                conn,
                user_id,
                credits,
                CreditKind::CreditPurchase,
                &credits_description(credits),
                Some(&payment.id),
            )
            .await?;
        }
    }
    Ok(())
}

/// Render and mail an invoice. Failures are logged only.
async fn deliver_invoice(state: &AppState, invoice: &Invoice) {
    let recipient: Option<(String, String)> =
        match sqlx::query_as("SELECT name, email FROM users WHERE id = $1")
            .bind(invoice.user_id)
            .fetch_optional(&state.pool)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(invoice = %invoice.number, "failed to load invoice recipient: {:?}", e);
                return;
            }
        };

    let Some((name, email)) = recipient else {
        tracing::error!(invoice = %invoice.number, "invoice recipient vanished");
        return;
    };

    let pdf = match invoice_service::render_pdf(
        invoice,
        &InvoiceRecipient {
            name: &name,
            email: &email,
        },
    ) {
        Ok(pdf) => pdf,
        Err(e) => {
            tracing::error!(invoice = %invoice.number, "failed to render invoice PDF: {}", e);
            return;
        }
    };

    if let Err(e) = state
        .mailer
        .send(&mail::invoice_email(&email, &name, invoice, pdf))
        .await
    {
        tracing::error!(invoice = %invoice.number, "failed to send invoice mail: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_id_validation() {
        assert_eq!(validate_payment_id(" tr_WDqYK6vllg ").unwrap(), "tr_WDqYK6vllg");
        assert!(matches!(
            validate_payment_id(""),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(validate_payment_id("tr_1/../../customers").is_err());
        assert!(validate_payment_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn descriptions_are_german() {
        assert_eq!(
            bundle_description(Bundle::Pro, BillingCycle::Yearly),
            "Pro-Paket (jährlich)"
        );
        assert_eq!(credits_description(50), "50 Credits");
    }
}
