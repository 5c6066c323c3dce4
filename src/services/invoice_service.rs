//! Invoice numbering, persistence and PDF rendering.

use chrono::{Datelike, Utc};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::invoice::{Invoice, VAT_PERCENT, format_euro, format_invoice_number},
};

/// Seller block printed on every invoice.
const SELLER_LINES: [&str; 4] = [
    "Barrierefrei Check GmbH",
    "Musterstrasse 1",
    "10115 Berlin",
    "USt-IdNr. DE000000000",
];

/// Reserve the next invoice number of the current year.
///
/// The counter row is upserted and incremented in one statement, which
/// takes a row lock until the surrounding transaction ends. Numbers are
/// therefore gap-free as long as the caller commits.
pub async fn next_invoice_number(conn: &mut PgConnection) -> Result<String, AppError> {
    let year = Utc::now().year();
    let sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoice_counters (year, last_number)
        VALUES ($1, 1)
        ON CONFLICT (year) DO UPDATE
        SET last_number = invoice_counters.last_number + 1
        RETURNING last_number
        "#,
    )
    .bind(year)
    .fetch_one(&mut *conn)
    .await?;

    Ok(format_invoice_number(year, sequence))
}

/// Insert a paid invoice for a payment.
pub async fn create_invoice(
    conn: &mut PgConnection,
    user_id: Uuid,
    payment_id: &str,
    description: &str,
    amount_cents: i64,
    currency: &str,
) -> Result<Invoice, AppError> {
    let number = next_invoice_number(conn).await?;

    let invoice = sqlx::query_as::<_, Invoice>(
        r#"
        INSERT INTO invoices (user_id, number, payment_id, description, amount_cents, currency, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'paid')
        RETURNING id, user_id, number, payment_id, description, amount_cents, currency, status, issued_at
        "#,
    )
    .bind(user_id)
    .bind(&number)
    .bind(payment_id)
    .bind(description)
    .bind(amount_cents)
    .bind(currency)
    .fetch_one(&mut *conn)
    .await?;

    Ok(invoice)
}

/// Customer block printed on the invoice.
#[derive(Debug, Clone)]
pub struct InvoiceRecipient<'a> {
    pub name: &'a str,
    pub email: &'a str,
}

/// Render an invoice as a single A4 page PDF.
pub fn render_pdf(
    invoice: &Invoice,
    recipient: &InvoiceRecipient<'_>,
) -> Result<Vec<u8>, AppError> {
    let (doc, page, layer) = PdfDocument::new(
        format!("Rechnung {}", invoice.number),
        Mm(210.0),
        Mm(297.0),
        "Rechnung".to_string(),
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(pdf_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;
    let layer = doc.get_page(page).get_layer(layer);

    let mut cursor = Cursor::new(&layer, 277.0);

    for line in SELLER_LINES {
        cursor.line(line, 9.0, &regular);
    }
    cursor.gap(12.0);

    cursor.line(recipient.name, 11.0, &regular);
    cursor.line(recipient.email, 11.0, &regular);
    cursor.gap(14.0);

    cursor.line(&format!("Rechnung {}", invoice.number), 16.0, &bold);
    cursor.line(
        &format!("Rechnungsdatum: {}", invoice.issued_at.format("%d.%m.%Y")),
        10.0,
        &regular,
    );
    cursor.line(&format!("Zahlungsreferenz: {}", invoice.payment_id), 10.0, &regular);
    cursor.gap(10.0);

    cursor.line("Leistung", 11.0, &bold);
    cursor.line(&invoice.description, 11.0, &regular);
    cursor.gap(8.0);

    cursor.line(
        &format!("Nettobetrag: {}", format_euro(invoice.net_cents())),
        11.0,
        &regular,
    );
    cursor.line(
        &format!(
            "zzgl. {} % USt.: {}",
            VAT_PERCENT,
            format_euro(invoice.vat_cents())
        ),
        11.0,
        &regular,
    );
    cursor.line(
        &format!("Gesamtbetrag: {}", format_euro(invoice.amount_cents)),
        12.0,
        &bold,
    );
    cursor.gap(10.0);
    cursor.line("Der Betrag wurde bereits beglichen. Vielen Dank!", 10.0, &regular);

    doc.save_to_bytes().map_err(pdf_error)
}

/// Writes lines top-down on a page layer.
struct Cursor<'a> {
    layer: &'a PdfLayerReference,
    y: f32,
}

impl<'a> Cursor<'a> {
    const LEFT_MARGIN: f32 = 20.0;

    fn new(layer: &'a PdfLayerReference, top: f32) -> Self {
        Self { layer, y: top }
    }

    fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        self.layer
            .use_text(pdf_text(text), size, Mm(Self::LEFT_MARGIN), Mm(self.y), font);
        // ~0.5 mm per point plus leading
        self.y -= size * 0.5 + 1.5;
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }
}

/// Spell text with ASCII only.
///
/// The builtin Helvetica cannot encode UTF-8, so umlauts, the euro sign and
/// typographic punctuation are written out; anything else becomes `?`.
fn pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            c if c.is_ascii() => out.push(c),
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'Ä' => out.push_str("Ae"),
            'Ö' => out.push_str("Oe"),
            'Ü' => out.push_str("Ue"),
            'ß' => out.push_str("ss"),
            'é' | 'è' | 'ê' => out.push('e'),
            'á' | 'à' | 'â' => out.push('a'),
            '€' => out.push_str("EUR"),
            '„' | '“' | '”' | '«' | '»' => out.push('"'),
            '‚' | '‘' | '’' => out.push('\''),
            '–' | '—' => out.push('-'),
            '…' => out.push_str("..."),
            '\u{a0}' | '\u{202f}' => out.push(' '),
            _ => out.push('?'),
        }
    }
    out
}

fn pdf_error(err: printpdf::Error) -> AppError {
    AppError::Internal(format!("PDF rendering failed: {err}"))
}
