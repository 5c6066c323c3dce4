//! Accessibility statement ("Barrierefreiheitserklärung", BFE) models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Degree of conformance declared in the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conformance {
    Full,
    Partial,
    None,
}

/// How the accessibility assessment was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMethod {
    #[default]
    SelfAssessment,
    ThirdParty,
}

/// A known accessibility barrier listed in the statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownIssue {
    pub description: String,
    /// Optional WCAG success criterion (`1.4.3`) or library rule id
    /// (`color-contrast`)
    #[serde(default)]
    pub criterion: Option<String>,
    /// Optional planned fix date or workaround
    #[serde(default)]
    pub remedy: Option<String>,
}

/// Input for `POST /api/bfe/generate`.
///
/// # JSON Example
///
/// ```json
/// {
///   "organisation": "Musterstadt GmbH",
///   "website_url": "https://www.musterstadt.de",
///   "conformance": "partial",
///   "known_issues": [
///     { "description": "PDF-Dokumente sind nicht barrierefrei", "criterion": "1.3.1" }
///   ],
///   "justification": "Unverhältnismäßige Belastung bei Altdokumenten",
///   "contact_email": "barrierefreiheit@musterstadt.de",
///   "contact_phone": "+49 30 1234567",
///   "enforcement_body": "Marktüberwachungsstelle der Länder",
///   "statement_date": "2025-06-28",
///   "evaluation_method": "self_assessment"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BfeInput {
    pub organisation: String,
    pub website_url: String,
    pub conformance: Conformance,
    #[serde(default)]
    pub known_issues: Vec<KnownIssue>,
    #[serde(default)]
    pub justification: Option<String>,
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub enforcement_body: Option<String>,
    pub statement_date: NaiveDate,
    #[serde(default)]
    pub evaluation_method: EvaluationMethod,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BfeGeneration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organisation: String,
    pub website_url: String,
    pub input: serde_json::Value,
    pub statement_text: String,
    pub created_at: DateTime<Utc>,
}

/// Requested export format for `GET /api/bfe/{id}/export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Text,
    Html,
    Pdf,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

/// JSON-wrapped placeholder returned for the `pdf` export.
#[derive(Debug, Serialize)]
pub struct PdfPlaceholder {
    pub format: &'static str,
    pub filename: String,
    pub content: String,
}
