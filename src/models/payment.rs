//! Payment provider (Mollie) models and checkout request/response types.
//!
//! # Payment Flow
//!
//! 1. User starts a checkout via `POST /api/checkout/bundle` or `/api/checkout/credits`
//! 2. A Mollie payment is created with [`PaymentMetadata`] attached
//! 3. User pays on the provider's hosted page
//! 4. Mollie calls `POST /api/webhooks/mollie` with the payment id only
//! 5. The service fetches the payment and applies it once it is `paid`

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::bundle::{BillingCycle, Bundle};

/// Amount in the provider's wire format: decimal string plus currency.
///
/// ```json
/// { "currency": "EUR", "value": "79.00" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MollieAmount {
    pub currency: String,
    pub value: String,
}

impl MollieAmount {
    pub fn eur(cents: i64) -> Self {
        Self {
            currency: "EUR".to_string(),
            value: format!("{}.{:02}", cents / 100, cents % 100),
        }
    }

    /// Parse the decimal string back into cents.
    ///
    /// Only unsigned amounts with at most two decimals are accepted; signs
    /// and values beyond `i64` cents yield `None`.
    pub fn to_cents(&self) -> Option<i64> {
        let (whole, fraction) = match self.value.split_once('.') {
            Some((w, f)) => (w, f),
            None => (self.value.as_str(), ""),
        };
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) {
            return None;
        }

        let whole: i64 = whole.parse().ok()?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().ok()? * 10,
            2 => fraction.parse().ok()?,
            _ => return None,
        };
        whole.checked_mul(100)?.checked_add(fraction)
    }
}

/// Metadata attached at checkout and read back in the webhook.
///
/// # Examples
///
/// ```json
/// { "user_id": "...", "type": "bundle", "bundle": "PRO", "cycle": "yearly" }
/// { "user_id": "...", "type": "credits", "credits": 50 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMetadata {
    Bundle {
        user_id: Uuid,
        bundle: Bundle,
        cycle: BillingCycle,
    },
    Credits {
        user_id: Uuid,
        credits: i64,
    },
}

impl PaymentMetadata {
    pub fn user_id(&self) -> Uuid {
        match self {
            PaymentMetadata::Bundle { user_id, .. } | PaymentMetadata::Credits { user_id, .. } => {
                *user_id
            }
        }
    }
}

/// Request body sent to `POST /payments`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayment {
    pub amount: MollieAmount,
    pub description: String,
    pub redirect_url: String,
    pub webhook_url: String,
    pub metadata: PaymentMetadata,
}

/// Subset of the provider's payment resource that the service relies on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MolliePayment {
    pub id: String,
    pub status: String,
    pub amount: MollieAmount,
    pub description: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, rename = "_links")]
    pub links: Option<MollieLinks>,
}

impl MolliePayment {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }

    pub fn checkout_url(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|l| l.checkout.as_ref())
            .map(|c| c.href.as_str())
    }

    /// Decode metadata attached at checkout.
    pub fn parsed_metadata(&self) -> Option<PaymentMetadata> {
        self.metadata
            .clone()
            .and_then(|m| serde_json::from_value(m).ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MollieLinks {
    pub checkout: Option<MollieLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MollieLink {
    pub href: String,
}

/// Webhook body: Mollie posts `id=tr_xxx` as form data; JSON is accepted too.
#[derive(Debug, Deserialize)]
pub struct WebhookNotification {
    pub id: Option<String>,
}

/// Request body for `POST /api/checkout/bundle`.
#[derive(Debug, Deserialize)]
pub struct BundleCheckoutRequest {
    pub bundle: Bundle,
    pub cycle: BillingCycle,
}

/// Request body for `POST /api/checkout/credits`.
#[derive(Debug, Deserialize)]
pub struct CreditCheckoutRequest {
    pub pack: String,
}

/// Response for checkout endpoints.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub payment_id: String,
    pub checkout_url: String,
}

/// Outcome of a webhook delivery, returned as JSON with HTTP 200.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Payment applied now
    Applied { invoice_number: String },
    /// Payment was applied by an earlier delivery
    AlreadyProcessed,
    /// Payment not (yet) paid, nothing to do
    Ignored { status: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amount_round_trips_through_cents() {
        let amount = MollieAmount::eur(7_900);
        assert_eq!(amount.value, "79.00");
        assert_eq!(amount.to_cents(), Some(7_900));
        assert_eq!(MollieAmount::eur(990).value, "9.90");
    }

    #[test]
    fn amount_parses_short_fractions() {
        let amount = MollieAmount {
            currency: "EUR".into(),
            value: "12.5".into(),
        };
        assert_eq!(amount.to_cents(), Some(1_250));
        let garbage = MollieAmount {
            currency: "EUR".into(),
            value: "abc".into(),
        };
        assert_eq!(garbage.to_cents(), None);
    }

    #[test]
    fn amount_rejects_signs_and_overflow() {
        let cents = |value: &str| {
            MollieAmount {
                currency: "EUR".into(),
                value: value.into(),
            }
            .to_cents()
        };
        assert_eq!(cents("-0.50"), None);
        assert_eq!(cents("+5.00"), None);
        assert_eq!(cents("5.-1"), None);
        assert_eq!(cents(".50"), None);
        assert_eq!(cents("92233720368547758.07"), Some(i64::MAX));
        assert_eq!(cents("92233720368547758.08"), None);
        assert_eq!(cents("99999999999999999999.00"), None);
        assert_eq!(cents("39"), Some(3_900));
    }

    #[test]
    fn metadata_is_tagged_by_type() {
        let user_id = Uuid::new_v4();
        let value = json!({
            "type": "bundle",
            "user_id": user_id,
            "bundle": "PRO",
            "cycle": "yearly"
        });
        let parsed: PaymentMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(
            parsed,
            PaymentMetadata::Bundle {
                user_id,
                bundle: Bundle::Pro,
                cycle: BillingCycle::Yearly
            }
        );

        let credits = serde_json::to_value(PaymentMetadata::Credits {
            user_id,
            credits: 50,
        })
        .unwrap();
        assert_eq!(credits["type"], "credits");
        assert_eq!(credits["credits"], 50);
    }

    #[test]
    fn payment_exposes_checkout_link() {
        let payment: MolliePayment = serde_json::from_value(json!({
            "id": "tr_123",
            "status": "open",
            "amount": { "currency": "EUR", "value": "29.00" },
            "description": "Starter",
            "metadata": null,
            "_links": { "checkout": { "href": "https://pay.example/tr_123" } }
        }))
        .unwrap();
        assert_eq!(payment.checkout_url(), Some("https://pay.example/tr_123"));
        assert!(!payment.is_paid());
        assert!(payment.parsed_metadata().is_none());
    }
}
