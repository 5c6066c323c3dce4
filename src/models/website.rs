//! Website, page and scan models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A website registered by a user for auditing.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Website {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// A single URL of a website that has been scanned at least once.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Page {
    pub id: Uuid,
    pub website_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub last_scanned_at: Option<DateTime<Utc>>,
}

/// Represents a scan record from the database.
///
/// `violations` and `passes` hold JSON arrays of [`Finding`].
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Scan {
    pub id: Uuid,
    pub website_id: Uuid,
    pub page_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub score: i32,
    pub violation_count: i32,
    pub violations: serde_json::Value,
    pub passes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Compact scan row for list views.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ScanSummary {
    pub id: Uuid,
    pub page_id: Uuid,
    pub status: String,
    pub score: i32,
    pub violation_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Impact of a violation, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
}

/// Result of one check on one page.
///
/// # JSON Example
///
/// ```json
/// {
///   "rule_id": "image-alt",
///   "criterion": "1.1.1",
///   "impact": "critical",
///   "message": "3 Bilder ohne Alternativtext",
///   "occurrences": 3,
///   "samples": ["<img src=\"/logo.png\">"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub criterion: String,
    pub impact: Impact,
    pub message: String,
    pub occurrences: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<String>,
}

/// Request body for `POST /api/websites`.
#[derive(Debug, Deserialize)]
pub struct CreateWebsiteRequest {
    pub name: String,
    pub url: String,
}

/// Request body for `POST /api/websites/{id}/scans`.
///
/// `url` defaults to the website's root URL and must share its host.
#[derive(Debug, Default, Deserialize)]
pub struct StartScanRequest {
    pub url: Option<String>,
}
