//! Invoice models.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// VAT rate applied to all invoices (German standard rate), in percent.
pub const VAT_PERCENT: i64 = 19;

/// Represents an invoice record from the database.
///
/// # Database Table
///
/// Maps to the `invoices` table. One invoice exists per applied payment
/// (`payment_id` is unique); `number` is the human-readable, sequential
/// invoice number such as `RE-2026-000042`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub number: String,
    pub payment_id: String,
    pub description: String,

    /// Gross amount in cents
    pub amount_cents: i64,

    pub currency: String,
    pub status: String,
    pub issued_at: DateTime<Utc>,
}

impl Invoice {
    /// VAT share contained in the gross amount, rounded to whole cents.
    pub fn vat_cents(&self) -> i64 {
        vat_share(self.amount_cents)
    }

    pub fn net_cents(&self) -> i64 {
        self.amount_cents - self.vat_cents()
    }

    pub fn pdf_filename(&self) -> String {
        format!("Rechnung-{}.pdf", self.number)
    }
}

/// VAT contained in a gross amount: gross * 19 / 119, rounded half up.
pub fn vat_share(gross_cents: i64) -> i64 {
    let divisor = 100 + VAT_PERCENT;
    (gross_cents * VAT_PERCENT * 2 + divisor) / (divisor * 2)
}

/// Format a human-readable invoice number from year and sequence.
pub fn format_invoice_number(year: i32, sequence: i64) -> String {
    format!("RE-{year}-{sequence:06}")
}

/// Format cents as a German currency string, e.g. `1.234,50 €`.
pub fn format_euro(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    let euros = cents / 100;
    let rest = cents % 100;

    let digits = euros.to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped},{rest:02} €")
}
