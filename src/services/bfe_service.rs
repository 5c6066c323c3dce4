//! Generator for accessibility statements ("Erklärung zur Barrierefreiheit").
//!
//! The statement text follows the structure required by BFSG / BITV 2.0:
//! conformance status, known barriers with justification, date and method
//! of the assessment, a feedback contact and the enforcement procedure.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        bfe::{BfeGeneration, BfeInput, Conformance, EvaluationMethod, PdfPlaceholder},
        bundle::costs,
        credit::CreditKind,
    },
    services::{credit_service, scan_service, wcag_library},
};

const DEFAULT_ENFORCEMENT_BODY: &str = "Marktüberwachungsstelle der Länder für die Barrierefreiheit von Produkten und Dienstleistungen (MLBF)";

fn conformance_sentence(input: &BfeInput) -> String {
    match input.conformance {
        Conformance::Full => format!(
            "Die Website {} ist vollständig mit den Anforderungen der BITV 2.0 bzw. der EN 301 549 vereinbar.",
            input.website_url
        ),
        Conformance::Partial => format!(
            "Die Website {} ist wegen der folgenden Unvereinbarkeiten teilweise mit den Anforderungen der BITV 2.0 bzw. der EN 301 549 vereinbar.",
            input.website_url
        ),
        Conformance::None => format!(
            "Die Website {} ist nicht mit den Anforderungen der BITV 2.0 bzw. der EN 301 549 vereinbar.",
            input.website_url
        ),
    }
}

fn method_sentence(method: EvaluationMethod) -> &'static str {
    match method {
        EvaluationMethod::SelfAssessment => "Die Bewertung beruht auf einer Selbstbewertung.",
        EvaluationMethod::ThirdParty => "Die Bewertung beruht auf einer Prüfung durch eine externe Stelle.",
    }
}

/// One barrier as a list item.
///
/// The criterion may also name a rule of the WCAG library (e.g.
/// `image-alt`, as reported by scans); it is then shown as the rule's
/// success criterion and the rule's fix serves as the remedy when none is
/// given.
fn issue_line(issue: &crate::models::bfe::KnownIssue) -> String {
    let criterion = issue
        .criterion
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let rule = criterion.and_then(wcag_library::find);

    let mut line = issue.description.trim().to_string();
    if let Some(criterion) = rule.map(|r| r.criterion).or(criterion) {
        line.push_str(&format!(" (WCAG {criterion})"));
    }
    let remedy = issue
        .remedy
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .or(rule.map(|r| r.fix));
    if let Some(remedy) = remedy {
        line.push_str(&format!(". Abhilfe: {remedy}"));
    }
    line
}

/// Check required fields before charging credits.
pub fn validate(input: &BfeInput) -> Result<(), AppError> {
    if input.organisation.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Bitte den Namen der Organisation angeben".to_string(),
        ));
    }
    scan_service::parse_site_url(&input.website_url)?;
    if !input.contact_email.contains('@') {
        return Err(AppError::InvalidRequest(
            "Bitte eine gültige Kontakt-E-Mail angeben".to_string(),
        ));
    }
    if input.conformance != Conformance::Full && input.known_issues.is_empty() {
        return Err(AppError::InvalidRequest(
            "Bei teilweiser oder fehlender Vereinbarkeit müssen Barrieren aufgeführt werden"
                .to_string(),
        ));
    }
    Ok(())
}

/// Render the statement as plain text.
pub fn render_text(input: &BfeInput) -> String {
    let mut out = String::new();
    let date = input.statement_date.format("%d.%m.%Y");

    out.push_str("Erklärung zur Barrierefreiheit\n\n");
    out.push_str(&format!(
        "{} ist bemüht, die Website {} im Einklang mit dem Barrierefreiheitsstärkungsgesetz (BFSG) \
         und der Barrierefreie-Informationstechnik-Verordnung (BITV 2.0) barrierefrei zugänglich zu machen.\n\n",
        input.organisation.trim(),
        input.website_url
    ));

    out.push_str("Stand der Vereinbarkeit mit den Anforderungen\n\n");
    out.push_str(&conformance_sentence(input));
    out.push_str("\n\n");

    if !input.known_issues.is_empty() {
        out.push_str("Nicht barrierefreie Inhalte\n\n");
        for issue in &input.known_issues {
            out.push_str(&format!("- {}\n", issue_line(issue)));
        }
        out.push('\n');
    }

    if let Some(justification) = input.justification.as_deref().filter(|j| !j.trim().is_empty()) {
        out.push_str("Begründung\n\n");
        out.push_str(justification.trim());
        out.push_str("\n\n");
    }

    out.push_str("Erstellung dieser Erklärung zur Barrierefreiheit\n\n");
    out.push_str(&format!("Diese Erklärung wurde am {date} erstellt. "));
    out.push_str(method_sentence(input.evaluation_method));
    out.push_str("\n\n");

    out.push_str("Feedback und Kontaktangaben\n\n");
    out.push_str(
        "Sie möchten uns bestehende Barrieren mitteilen oder Informationen zur Umsetzung der \
         Barrierefreiheit erfragen? Wenden Sie sich an:\n",
    );
    out.push_str(&format!("E-Mail: {}\n", input.contact_email.trim()));
    if let Some(phone) = input.contact_phone.as_deref().filter(|p| !p.trim().is_empty()) {
        out.push_str(&format!("Telefon: {}\n", phone.trim()));
    }
    out.push('\n');

    out.push_str("Durchsetzungsverfahren\n\n");
    out.push_str(&format!(
        "Wenn Sie auf Ihre Mitteilung keine zufriedenstellende Antwort erhalten, können Sie sich an die zuständige Stelle wenden: {}.\n",
        input
            .enforcement_body
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_ENFORCEMENT_BODY)
    ));

    out
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render the statement as a standalone, styled HTML document.
///
/// Headings of the text rendering become `<h2>`, dash lines become a list.
pub fn render_html(input: &BfeInput) -> String {
    let text = render_text(input);
    let mut body = String::new();

    for block in text.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let lines: Vec<&str> = block.lines().collect();
        if lines.iter().all(|l| l.starts_with("- ")) {
            body.push_str("<ul>\n");
            for line in lines {
                body.push_str(&format!("  <li>{}</li>\n", escape_html(&line[2..])));
            }
            body.push_str("</ul>\n");
            continue;
        }
        if lines.len() == 1 && is_heading(lines[0]) {
            if lines[0] == "Erklärung zur Barrierefreiheit" {
                body.push_str(&format!("<h1>{}</h1>\n", escape_html(lines[0])));
            } else {
                body.push_str(&format!("<h2>{}</h2>\n", escape_html(lines[0])));
            }
            continue;
        }
        let joined = lines
            .iter()
            .map(|l| escape_html(l))
            .collect::<Vec<_>>()
            .join("<br>\n");
        body.push_str(&format!("<p>{joined}</p>\n"));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="de">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Erklärung zur Barrierefreiheit - {organisation}</title>
<style>
  body {{ font-family: system-ui, sans-serif; line-height: 1.6; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; color: #1a1a1a; background: #fff; }}
  h1 {{ font-size: 1.75rem; }}
  h2 {{ font-size: 1.25rem; margin-top: 2rem; border-bottom: 2px solid #005a9c; }}
  a {{ color: #005a9c; }}
</style>
</head>
<body>
<main>
{body}</main>
</body>
</html>
"#,
        organisation = escape_html(input.organisation.trim()),
    )
}

fn is_heading(line: &str) -> bool {
    matches!(
        line,
        "Erklärung zur Barrierefreiheit"
            | "Stand der Vereinbarkeit mit den Anforderungen"
            | "Nicht barrierefreie Inhalte"
            | "Begründung"
            | "Erstellung dieser Erklärung zur Barrierefreiheit"
            | "Feedback und Kontaktangaben"
            | "Durchsetzungsverfahren"
    )
}

/// File name stem derived from the organisation, ASCII only.
pub fn file_stem(organisation: &str) -> String {
    let mut stem = String::new();
    for c in organisation.trim().chars() {
        match c {
            'ä' | 'Ä' => stem.push_str("ae"),
            'ö' | 'Ö' => stem.push_str("oe"),
            'ü' | 'Ü' => stem.push_str("ue"),
            'ß' => stem.push_str("ss"),
            c if c.is_ascii_alphanumeric() => stem.push(c.to_ascii_lowercase()),
            _ if !stem.ends_with('-') && !stem.is_empty() => stem.push('-'),
            _ => {}
        }
    }
    let stem = stem.trim_end_matches('-');
    if stem.is_empty() {
        "erklaerung".to_string()
    } else {
        format!("barrierefreiheitserklaerung-{stem}")
    }
}

pub fn pdf_placeholder(generation: &BfeGeneration) -> PdfPlaceholder {
    PdfPlaceholder {
        format: "pdf-placeholder",
        filename: format!("{}.pdf", file_stem(&generation.organisation)),
        content: generation.statement_text.clone(),
    }
}

/// Stored input of a generation, for re-rendering exports.
pub fn stored_input(generation: &BfeGeneration) -> Result<BfeInput, AppError> {
    serde_json::from_value(generation.input.clone())
        .map_err(|e| AppError::Internal(format!("stored BFE input unreadable: {e}")))
}

/// Generate and persist a statement, charging its credits in the same transaction.
pub async fn generate(
    pool: &DbPool,
    user_id: Uuid,
    input: &BfeInput,
) -> Result<BfeGeneration, AppError> {
    validate(input)?;
    let statement = render_text(input);
    let stored = serde_json::to_value(input)
        .map_err(|e| AppError::Internal(format!("serialize BFE input: {e}")))?;

    let mut tx = pool.begin().await?;

    credit_service::spend(
        &mut tx,
        user_id,
        costs::BFE_STATEMENT,
        CreditKind::BfeStatement,
        &format!("Erklärung zur Barrierefreiheit: {}", input.organisation.trim()),
    )
    .await?;

    let generation = sqlx::query_as::<_, BfeGeneration>(
        r#"
        INSERT INTO bfe_generations (user_id, organisation, website_url, input, statement_text)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, organisation, website_url, input, statement_text, created_at
        "#,
    )
    .bind(user_id)
    .bind(input.organisation.trim())
    .bind(&input.website_url)
    .bind(stored)
    .bind(&statement)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(generation_id = %generation.id, %user_id, "accessibility statement generated");
    Ok(generation)
}

pub async fn list(pool: &DbPool, user_id: Uuid) -> Result<Vec<BfeGeneration>, AppError> {
    let rows = sqlx::query_as::<_, BfeGeneration>(
        r#"
        SELECT id, user_id, organisation, website_url, input, statement_text, created_at
        FROM bfe_generations
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<BfeGeneration, AppError> {
    sqlx::query_as::<_, BfeGeneration>(
        r#"
        SELECT id, user_id, organisation, website_url, input, statement_text, created_at
        FROM bfe_generations
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Erklärung"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bfe::KnownIssue;
    use chrono::NaiveDate;

    fn input(conformance: Conformance) -> BfeInput {
        BfeInput {
            organisation: "Müller & Söhne GmbH".to_string(),
            website_url: "https://www.mueller-soehne.de".to_string(),
            conformance,
            known_issues: vec![KnownIssue {
                description: "PDF-Formulare sind nicht <getaggt>".to_string(),
                criterion: Some("1.3.1".to_string()),
                remedy: Some("Überarbeitung bis Q4".to_string()),
            }],
            justification: Some("Unverhältnismäßige Belastung".to_string()),
            contact_email: "barrierefreiheit@mueller-soehne.de".to_string(),
            contact_phone: None,
            enforcement_body: None,
            statement_date: NaiveDate::from_ymd_opt(2025, 6, 28).unwrap(),
            evaluation_method: EvaluationMethod::SelfAssessment,
        }
    }

    #[test]
    fn text_contains_mandatory_sections() {
        let text = render_text(&input(Conformance::Partial));
        assert!(text.starts_with("Erklärung zur Barrierefreiheit"));
        assert!(text.contains("teilweise mit den Anforderungen"));
        assert!(text.contains(
            "- PDF-Formulare sind nicht <getaggt> (WCAG 1.3.1). Abhilfe: Überarbeitung bis Q4"
        ));
        assert!(text.contains("am 28.06.2025 erstellt"));
        assert!(text.contains("Selbstbewertung"));
        assert!(text.contains("E-Mail: barrierefreiheit@mueller-soehne.de"));
        assert!(!text.contains("Telefon:"));
        assert!(text.contains(DEFAULT_ENFORCEMENT_BODY));
    }

    #[test]
    fn scan_rule_ids_resolve_through_the_library() {
        let from_scan = KnownIssue {
            description: "Bilder ohne Alternativtext".to_string(),
            criterion: Some("image-alt".to_string()),
            remedy: None,
        };
        let rule = wcag_library::find("image-alt").unwrap();
        assert_eq!(
            issue_line(&from_scan),
            format!("Bilder ohne Alternativtext (WCAG 1.1.1). Abhilfe: {}", rule.fix)
        );

        let plain = KnownIssue {
            description: "Kontraste zu gering".to_string(),
            criterion: Some(" 1.4.3 ".to_string()),
            remedy: None,
        };
        assert_eq!(issue_line(&plain), "Kontraste zu gering (WCAG 1.4.3)");
    }

    #[test]
    fn html_export_escapes_user_input() {
        let html = render_html(&input(Conformance::Partial));
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"<html lang="de">"#));
        assert!(html.contains("Müller &amp; Söhne GmbH"));
        assert!(html.contains("nicht &lt;getaggt&gt;"));
        assert!(!html.contains("<getaggt>"));
        assert!(html.contains("<h2>Nicht barrierefreie Inhalte</h2>"));
        assert!(html.contains("<li>"));
    }

    #[test]
    fn partial_conformance_requires_issues() {
        let mut partial = input(Conformance::Partial);
        partial.known_issues.clear();
        assert!(validate(&partial).is_err());

        let mut full = input(Conformance::Full);
        full.known_issues.clear();
        assert!(validate(&full).is_ok());
    }

    #[test]
    fn rejects_invalid_contact_and_url() {
        let mut bad_mail = input(Conformance::Full);
        bad_mail.contact_email = "keine-adresse".to_string();
        assert!(validate(&bad_mail).is_err());

        let mut bad_url = input(Conformance::Full);
        bad_url.website_url = "mueller-soehne".to_string();
        assert!(validate(&bad_url).is_err());
    }

    #[test]
    fn file_stem_is_ascii() {
        assert_eq!(file_stem("Müller & Söhne GmbH"), "barrierefreiheitserklaerung-mueller-soehne-gmbh");
        assert_eq!(file_stem("  "), "erklaerung");
    }
}
