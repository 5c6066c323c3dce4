//! Single-page accessibility scans.
//!
//! A scan fetches one HTML document and runs static checks on the parsed
//! DOM. Each check maps to a rule of the WCAG library and ends up either in
//! `violations` or in `passes`; checks whose elements do not occur on the
//! page are not applicable and do not affect the score.
//!
//! Scripts are not executed, so content rendered client-side is not seen.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{Arc, LazyLock},
    time::Duration,
};

use reqwest::{
    dns::{Addrs, Name, Resolve, Resolving},
    redirect,
};
use scraper::{ElementRef, Html, Selector};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        bundle::costs,
        credit::CreditKind,
        website::{Finding, Impact, Page, Scan, Website},
    },
    services::{credit_service, wcag_library},
    state::AppState,
};

/// Largest document that is analysed.
const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;
const MAX_REDIRECTS: usize = 5;
const MAX_SAMPLES: usize = 3;
const SAMPLE_CHARS: usize = 120;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static HTML: LazyLock<Selector> = LazyLock::new(|| selector("html"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("head title"));
static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static BUTTON: LazyLock<Selector> = LazyLock::new(|| {
    selector("button, input[type=submit], input[type=button], input[type=reset]")
});
static FORM_FIELD: LazyLock<Selector> = LazyLock::new(|| selector("input, select, textarea"));
static LABEL_FOR: LazyLock<Selector> = LazyLock::new(|| selector("label[for]"));
static HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2, h3, h4, h5, h6"));
static WITH_ID: LazyLock<Selector> = LazyLock::new(|| selector("[id]"));
static VIEWPORT: LazyLock<Selector> = LazyLock::new(|| selector("meta[name=viewport]"));
static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static TABLE_HEADER: LazyLock<Selector> = LazyLock::new(|| selector("th"));
static VIDEO: LazyLock<Selector> = LazyLock::new(|| selector("video"));
static CAPTION_TRACK: LazyLock<Selector> =
    LazyLock::new(|| selector("track[kind=captions], track[kind=subtitles]"));
static MAIN_LANDMARK: LazyLock<Selector> = LazyLock::new(|| selector("main, [role=main]"));
static SKIP_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href^='#']"));
static IMG_WITH_ALT: LazyLock<Selector> = LazyLock::new(|| selector("img[alt]"));

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    NotApplicable,
    Pass,
    Fail { occurrences: usize, samples: Vec<String> },
}

impl Outcome {
    fn from_offenders(applicable: bool, offenders: Vec<ElementRef<'_>>) -> Self {
        if !applicable {
            return Outcome::NotApplicable;
        }
        if offenders.is_empty() {
            return Outcome::Pass;
        }
        Outcome::Fail {
            occurrences: offenders.len(),
            samples: offenders.iter().take(MAX_SAMPLES).map(|e| sample(e)).collect(),
        }
    }
}

/// Result of analysing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub title: Option<String>,
    pub violations: Vec<Finding>,
    pub passes: Vec<Finding>,
    pub score: i32,
}

/// Score = share of applicable checks that passed, in percent.
pub fn score(passed: usize, failed: usize) -> i32 {
    let applicable = passed + failed;
    if applicable == 0 {
        return 100;
    }
    ((passed as f64 / applicable as f64) * 100.0).round() as i32
}

/// Run all checks on an HTML document.
pub fn analyze(html: &str) -> ScanReport {
    let document = Html::parse_document(html);

    let checks: [(&str, Impact, Outcome, &str); 12] = [
        (
            "html-has-lang",
            Impact::Serious,
            check_lang(&document),
            "Das html-Element hat kein lang-Attribut",
        ),
        (
            "document-title",
            Impact::Serious,
            check_title(&document),
            "Die Seite hat keinen Titel",
        ),
        (
            "image-alt",
            Impact::Critical,
            check_image_alt(&document),
            "Bilder ohne alt-Attribut",
        ),
        (
            "link-name",
            Impact::Serious,
            check_link_names(&document),
            "Links ohne zugänglichen Namen",
        ),
        (
            "button-name",
            Impact::Critical,
            check_button_names(&document),
            "Schaltflächen ohne zugänglichen Namen",
        ),
        (
            "label",
            Impact::Critical,
            check_labels(&document),
            "Formularfelder ohne Beschriftung",
        ),
        (
            "heading-order",
            Impact::Moderate,
            check_heading_order(&document),
            "Überschriftenebenen werden übersprungen",
        ),
        (
            "duplicate-id",
            Impact::Minor,
            check_duplicate_ids(&document),
            "Mehrfach vergebene id-Attribute",
        ),
        (
            "meta-viewport",
            Impact::Critical,
            check_viewport(&document),
            "Vergrößern der Seite ist unterbunden",
        ),
        (
            "table-headers",
            Impact::Serious,
            check_table_headers(&document),
            "Datentabellen ohne Kopfzellen",
        ),
        (
            "video-caption",
            Impact::Critical,
            check_video_captions(&document),
            "Videos ohne Untertitelspur",
        ),
        (
            "bypass",
            Impact::Moderate,
            check_bypass(&document),
            "Kein main-Bereich und keine Sprungmarke",
        ),
    ];

    let mut violations = Vec::new();
    let mut passes = Vec::new();

    for (rule_id, impact, outcome, message) in checks {
        let criterion = wcag_library::find(rule_id)
            .map(|rule| rule.criterion)
            .unwrap_or_default()
            .to_string();

        match outcome {
            Outcome::NotApplicable => {}
            Outcome::Pass => passes.push(Finding {
                rule_id: rule_id.to_string(),
                criterion,
                impact,
                message: "Erfüllt".to_string(),
                occurrences: 0,
                samples: Vec::new(),
            }),
            Outcome::Fail {
                occurrences,
                samples,
            } => violations.push(Finding {
                rule_id: rule_id.to_string(),
                criterion,
                impact,
                message: format!("{message} ({occurrences})"),
                occurrences,
                samples,
            }),
        }
    }

    violations.sort_by(|a, b| b.impact.cmp(&a.impact));

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| normalize_space(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    ScanReport {
        title,
        score: score(passes.len(), violations.len()),
        violations,
        passes,
    }
}

fn check_lang(document: &Html) -> Outcome {
    let has_lang = document
        .select(&HTML)
        .next()
        .and_then(|html| html.value().attr("lang"))
        .is_some_and(|lang| !lang.trim().is_empty());
    if has_lang {
        Outcome::Pass
    } else {
        Outcome::Fail {
            occurrences: 1,
            samples: Vec::new(),
        }
    }
}

fn check_title(document: &Html) -> Outcome {
    let has_title = document
        .select(&TITLE)
        .next()
        .is_some_and(|t| !t.text().collect::<String>().trim().is_empty());
    if has_title {
        Outcome::Pass
    } else {
        Outcome::Fail {
            occurrences: 1,
            samples: Vec::new(),
        }
    }
}

fn check_image_alt(document: &Html) -> Outcome {
    let images: Vec<_> = document.select(&IMG).filter(|img| !is_hidden(img)).collect();
    let offenders = images
        .iter()
        .copied()
        .filter(|img| img.value().attr("alt").is_none() && !has_aria_name(img))
        .collect();
    Outcome::from_offenders(!images.is_empty(), offenders)
}

fn check_link_names(document: &Html) -> Outcome {
    let links: Vec<_> = document.select(&LINK).filter(|a| !is_hidden(a)).collect();
    let offenders = links
        .iter()
        .copied()
        .filter(|a| {
            let has_image_name = a
                .select(&IMG_WITH_ALT)
                .any(|img| img.value().attr("alt").is_some_and(|alt| !alt.trim().is_empty()));
            !has_text(a) && !has_aria_name(a) && !has_image_name && !has_attr(a, "title")
        })
        .collect();
    Outcome::from_offenders(!links.is_empty(), offenders)
}

fn check_button_names(document: &Html) -> Outcome {
    let buttons: Vec<_> = document.select(&BUTTON).filter(|b| !is_hidden(b)).collect();
    let offenders = buttons
        .iter()
        .copied()
        .filter(|b| {
            let is_input = b.value().name() == "input";
            let input_type = b.value().attr("type");
            let named_input = is_input
                && (has_attr(b, "value") || matches!(input_type, Some("submit" | "reset")));
            !named_input && !has_text(b) && !has_aria_name(b) && !has_attr(b, "title")
        })
        .collect();
    Outcome::from_offenders(!buttons.is_empty(), offenders)
}

fn check_labels(document: &Html) -> Outcome {
    let labelled_ids: std::collections::HashSet<&str> = document
        .select(&LABEL_FOR)
        .filter_map(|label| label.value().attr("for"))
        .collect();

    let fields: Vec<_> = document
        .select(&FORM_FIELD)
        .filter(|field| {
            !matches!(
                field.value().attr("type"),
                Some("hidden" | "submit" | "button" | "reset" | "image")
            ) && !is_hidden(field)
        })
        .collect();

    let offenders = fields
        .iter()
        .copied()
        .filter(|field| {
            let by_for = field
                .value()
                .attr("id")
                .is_some_and(|id| labelled_ids.contains(id));
            let wrapped = field.ancestors().any(|node| {
                node.value()
                    .as_element()
                    .is_some_and(|el| el.name() == "label")
            });
            !by_for && !wrapped && !has_aria_name(field) && !has_attr(field, "title")
        })
        .collect();

    Outcome::from_offenders(!fields.is_empty(), offenders)
}

fn check_heading_order(document: &Html) -> Outcome {
    let headings: Vec<_> = document.select(&HEADING).collect();
    let mut previous: Option<u8> = None;
    let mut offenders = Vec::new();

    for heading in &headings {
        let level = heading_level(heading);
        if let Some(prev) = previous {
            if level > prev + 1 {
                offenders.push(*heading);
            }
        }
        previous = Some(level);
    }

    Outcome::from_offenders(!headings.is_empty(), offenders)
}

fn check_duplicate_ids(document: &Html) -> Outcome {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut offenders = Vec::new();

    for element in document.select(&WITH_ID) {
        let Some(id) = element.value().attr("id") else {
            continue;
        };
        let count = seen.entry(id).or_insert(0);
        *count += 1;
        if *count == 2 {
            offenders.push(element);
        }
    }

    Outcome::from_offenders(!seen.is_empty(), offenders)
}

fn check_viewport(document: &Html) -> Outcome {
    let metas: Vec<_> = document.select(&VIEWPORT).collect();
    let offenders = metas
        .iter()
        .copied()
        .filter(|meta| meta.value().attr("content").is_some_and(blocks_zoom))
        .collect();
    Outcome::from_offenders(!metas.is_empty(), offenders)
}

/// True if a viewport `content` value disables zoom below 200 %.
pub fn blocks_zoom(content: &str) -> bool {
    content.split([',', ';']).any(|directive| {
        let Some((key, value)) = directive.split_once('=') else {
            return false;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key.trim().to_ascii_lowercase().as_str() {
            "user-scalable" => matches!(value.to_ascii_lowercase().as_str(), "no" | "0"),
            "maximum-scale" => value.parse::<f32>().is_ok_and(|scale| scale < 2.0),
            _ => false,
        }
    })
}

fn check_table_headers(document: &Html) -> Outcome {
    let tables: Vec<_> = document
        .select(&TABLE)
        .filter(|t| !matches!(t.value().attr("role"), Some("presentation" | "none")))
        .collect();
    let offenders = tables
        .iter()
        .copied()
        .filter(|t| t.select(&TABLE_HEADER).next().is_none())
        .collect();
    Outcome::from_offenders(!tables.is_empty(), offenders)
}

fn check_video_captions(document: &Html) -> Outcome {
    let videos: Vec<_> = document.select(&VIDEO).collect();
    let offenders = videos
        .iter()
        .copied()
        .filter(|v| v.select(&CAPTION_TRACK).next().is_none())
        .collect();
    Outcome::from_offenders(!videos.is_empty(), offenders)
}

fn check_bypass(document: &Html) -> Outcome {
    if document.select(&MAIN_LANDMARK).next().is_some()
        || document.select(&SKIP_LINK).next().is_some()
    {
        Outcome::Pass
    } else {
        Outcome::Fail {
            occurrences: 1,
            samples: Vec::new(),
        }
    }
}

fn heading_level(heading: &ElementRef<'_>) -> u8 {
    heading
        .value()
        .name()
        .trim_start_matches('h')
        .parse()
        .unwrap_or(1)
}

fn is_hidden(element: &ElementRef<'_>) -> bool {
    element.value().attr("aria-hidden") == Some("true")
        || has_attr(element, "hidden")
        || matches!(element.value().attr("role"), Some("presentation" | "none"))
}

fn has_attr(element: &ElementRef<'_>, name: &str) -> bool {
    element
        .value()
        .attr(name)
        .is_some_and(|value| !value.trim().is_empty())
}

fn has_aria_name(element: &ElementRef<'_>) -> bool {
    has_attr(element, "aria-label") || has_attr(element, "aria-labelledby")
}

fn has_text(element: &ElementRef<'_>) -> bool {
    element.text().any(|t| !t.trim().is_empty())
}

fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Opening tag of an element, shortened for display.
fn sample(element: &ElementRef<'_>) -> String {
    let html = element.html();
    let open_tag = match html.find('>') {
        Some(end) => &html[..=end],
        None => html.as_str(),
    };
    if open_tag.chars().count() > SAMPLE_CHARS {
        let cut: String = open_tag.chars().take(SAMPLE_CHARS).collect();
        format!("{cut}…")
    } else {
        open_tag.to_string()
    }
}

/// Validate a website root URL: absolute http(s) with a public host.
pub fn parse_site_url(raw: &str) -> Result<url::Url, AppError> {
    let url = url::Url::parse(raw.trim())
        .map_err(|_| AppError::InvalidRequest("Ungültige URL".to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::InvalidRequest(
            "Die URL muss mit http:// oder https:// beginnen".to_string(),
        ));
    }
    check_target(&url)?;
    Ok(url)
}

/// Resolve the page to scan; it must live on the website's host.
pub fn resolve_scan_url(website_url: &str, requested: Option<&str>) -> Result<url::Url, AppError> {
    let site = parse_site_url(website_url)?;
    let Some(requested) = requested.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(site);
    };

    let target = site
        .join(requested)
        .map_err(|_| AppError::InvalidRequest("Ungültige URL".to_string()))?;
    if target.host_str() != site.host_str() || !matches!(target.scheme(), "http" | "https") {
        return Err(AppError::InvalidRequest(
            "Es können nur Seiten der eigenen Website geprüft werden".to_string(),
        ));
    }
    check_target(&target)?;
    Ok(target)
}

fn is_internal_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || a == 0
        // carrier-grade NAT, 100.64.0.0/10
        || (a == 100 && (64..128).contains(&b))
}

fn is_internal_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_internal_ipv4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // unique local fc00::/7
        || (first & 0xfe00) == 0xfc00
        // link local fe80::/10
        || (first & 0xffc0) == 0xfe80
}

/// Whether an address belongs to loopback, private, link-local or other
/// non-public ranges.
pub fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_ipv4(v4),
        IpAddr::V6(v6) => is_internal_ipv6(v6),
    }
}

/// Reject URLs the scanner must never request: other schemes, `localhost`
/// names and literal addresses in internal ranges.
///
/// Host names are checked again after DNS resolution by [`PublicResolver`].
pub fn check_target(url: &url::Url) -> Result<(), AppError> {
    let internal = match url.host() {
        _ if !matches!(url.scheme(), "http" | "https") => true,
        None => true,
        Some(url::Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(url::Host::Ipv4(ip)) => is_internal_ipv4(ip),
        Some(url::Host::Ipv6(ip)) => is_internal_ipv6(ip),
    };

    if internal {
        return Err(AppError::InvalidRequest(
            "Interne Adressen können nicht geprüft werden".to_string(),
        ));
    }
    Ok(())
}

/// Whether a redirect may be followed: it must stay on the host of the
/// first request and pass [`check_target`].
pub fn redirect_allowed(previous: &[url::Url], next: &url::Url) -> bool {
    let Some(origin) = previous.first() else {
        return false;
    };
    previous.len() <= MAX_REDIRECTS
        && next.host_str() == origin.host_str()
        && check_target(next).is_ok()
}

/// DNS resolver that drops internal addresses, so public names pointing at
/// internal hosts cannot be reached either.
#[derive(Debug, Default)]
pub struct PublicResolver;

impl Resolve for PublicResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_public(name.as_str().to_string()))
    }
}

async fn resolve_public(host: String) -> Result<Addrs, Box<dyn std::error::Error + Send + Sync>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .filter(|addr| !is_internal_ip(addr.ip()))
        .collect();
    if addrs.is_empty() {
        tracing::warn!(%host, "refusing to scan host with internal addresses only");
        return Err(format!("{host} resolves to internal addresses only").into());
    }
    Ok(Box::new(addrs.into_iter()))
}

pub fn http_client() -> Result<reqwest::Client, AppError> {
    let redirects = redirect::Policy::custom(|attempt| {
        if redirect_allowed(attempt.previous(), attempt.url()) {
            attempt.follow()
        } else {
            attempt.error("Weiterleitung auf eine fremde oder interne Adresse")
        }
    });

    reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .user_agent("BarrierefreiCheck/1.0 (+accessibility scanner)")
        .redirect(redirects)
        .dns_resolver(Arc::new(PublicResolver))
        .build()
        .map_err(|e| AppError::Internal(format!("HTTP client error: {e}")))
}

fn too_large() -> AppError {
    AppError::InvalidRequest("Das Dokument ist zu groß für einen Scan".to_string())
}

async fn fetch_document(http: &reqwest::Client, url: &url::Url) -> Result<String, AppError> {
    let mut response = http
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("Seite nicht erreichbar: {e}")))?;

    if !response.status().is_success() {
        return Err(AppError::Upstream(format!(
            "Seite antwortet mit Status {}",
            response.status()
        )));
    }

    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_none_or(|ct| ct.contains("html"));
    if !is_html {
        return Err(AppError::InvalidRequest(
            "Die Adresse liefert kein HTML-Dokument".to_string(),
        ));
    }

    if response
        .content_length()
        .is_some_and(|len| len > MAX_DOCUMENT_BYTES as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AppError::Upstream(format!("Seite nicht lesbar: {e}")))?
    {
        if body.len() + chunk.len() > MAX_DOCUMENT_BYTES {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Fetch, analyse and store a scan of one page, charging one credit.
///
/// The credit is only charged together with the stored scan; when the page
/// cannot be fetched nothing is charged.
pub async fn run_scan(
    state: &AppState,
    user_id: Uuid,
    website: &Website,
    requested_url: Option<&str>,
) -> Result<Scan, AppError> {
    let target = resolve_scan_url(&website.url, requested_url)?;

    let balance: i64 = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("Benutzer"))?;
    if balance < costs::SCAN {
        return Err(AppError::InsufficientCredits {
            required: costs::SCAN,
            available: balance,
        });
    }

    let document = fetch_document(&state.http, &target).await?;
    let report = analyze(&document);

    let mut tx = state.pool.begin().await?;

    credit_service::spend(
        &mut tx,
        user_id,
        costs::SCAN,
        CreditKind::Scan,
        &format!("Scan {}", target),
    )
    .await?;

    let page = sqlx::query_as::<_, Page>(
        r#"
        INSERT INTO pages (website_id, url, title, last_scanned_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (website_id, url) DO UPDATE
        SET title = EXCLUDED.title,
            last_scanned_at = EXCLUDED.last_scanned_at
        RETURNING id, website_id, url, title, last_scanned_at
        "#,
    )
    .bind(website.id)
    .bind(target.as_str())
    .bind(&report.title)
    .fetch_one(&mut *tx)
    .await?;

    let violations = serde_json::to_value(&report.violations)
        .map_err(|e| AppError::Internal(format!("serialize violations: {e}")))?;
    let passes = serde_json::to_value(&report.passes)
        .map_err(|e| AppError::Internal(format!("serialize passes: {e}")))?;

    let scan = sqlx::query_as::<_, Scan>(
        r#"
        INSERT INTO scans (website_id, page_id, user_id, status, score, violation_count, violations, passes)
        VALUES ($1, $2, $3, 'completed', $4, $5, $6, $7)
        RETURNING id, website_id, page_id, user_id, status, score, violation_count, violations, passes, created_at
        "#,
    )
    .bind(website.id)
    .bind(page.id)
    .bind(user_id)
    .bind(report.score)
    .bind(report.violations.len() as i32)
    .bind(violations)
    .bind(passes)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(scan_id = %scan.id, url = %target, score = scan.score, "scan stored");
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESSIBLE: &str = r##"<!doctype html>
        <html lang="de">
        <head>
          <title>Startseite - Musterstadt</title>
          <meta name="viewport" content="width=device-width, initial-scale=1">
        </head>
        <body>
          <a href="#inhalt">Zum Inhalt springen</a>
          <main id="inhalt">
            <h1>Willkommen</h1>
            <h2>Aktuelles</h2>
            <img src="/rathaus.jpg" alt="Rathaus am Marktplatz">
            <img src="/deko.svg" alt="">
            <a href="/kontakt">Kontakt</a>
            <form>
              <label for="mail">E-Mail</label>
              <input id="mail" type="email">
              <label>Name <input type="text"></label>
              <button type="submit">Senden</button>
            </form>
          </main>
        </body>
        </html>"##;

    const BROKEN: &str = r##"<html>
        <head>
          <meta name="viewport" content="width=device-width, user-scalable=no">
        </head>
        <body>
          <h1>Shop</h1>
          <h4>Angebote</h4>
          <img src="/a.jpg">
          <img src="/b.jpg">
          <a href="/warenkorb"><span class="icon"></span></a>
          <button><svg></svg></button>
          <input type="text" id="suche">
          <div id="suche"></div>
          <table><tr><td>1</td></tr></table>
          <video src="/film.mp4"></video>
        </body>
        </html>"##;

    fn rule_ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.rule_id.as_str()).collect()
    }

    #[test]
    fn accessible_page_scores_full_marks() {
        let report = analyze(ACCESSIBLE);
        assert!(report.violations.is_empty(), "{:?}", report.violations);
        assert_eq!(report.score, 100);
        assert_eq!(report.title.as_deref(), Some("Startseite - Musterstadt"));
        // tables and videos are absent, so their checks do not count
        let passed = rule_ids(&report.passes);
        assert!(!passed.contains(&"table-headers"));
        assert!(!passed.contains(&"video-caption"));
    }

    #[test]
    fn broken_page_reports_every_barrier() {
        let report = analyze(BROKEN);
        let failed = rule_ids(&report.violations);
        for rule in [
            "html-has-lang",
            "document-title",
            "image-alt",
            "link-name",
            "button-name",
            "label",
            "heading-order",
            "duplicate-id",
            "meta-viewport",
            "table-headers",
            "video-caption",
            "bypass",
        ] {
            assert!(failed.contains(&rule), "expected {rule} in {failed:?}");
        }
        assert_eq!(report.score, 0);
        assert_eq!(report.title, None);

        let images = report
            .violations
            .iter()
            .find(|f| f.rule_id == "image-alt")
            .unwrap();
        assert_eq!(images.occurrences, 2);
        assert_eq!(images.criterion, "1.1.1");
        assert_eq!(images.samples[0], r#"<img src="/a.jpg">"#);
    }

    #[test]
    fn violations_are_sorted_by_impact() {
        let report = analyze(BROKEN);
        let impacts: Vec<_> = report.violations.iter().map(|f| f.impact).collect();
        let mut sorted = impacts.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(impacts, sorted);
    }

    #[test]
    fn score_rounds_share_of_passed_checks() {
        assert_eq!(score(0, 0), 100);
        assert_eq!(score(2, 1), 67);
        assert_eq!(score(0, 4), 0);
    }

    #[test]
    fn zoom_blocking_viewports() {
        assert!(blocks_zoom("width=device-width, user-scalable=no"));
        assert!(blocks_zoom("width=device-width, maximum-scale=1.0"));
        assert!(!blocks_zoom("width=device-width, maximum-scale=5"));
        assert!(!blocks_zoom("width=device-width, initial-scale=1"));
    }

    #[test]
    fn scan_urls_stay_on_the_website() {
        let url = resolve_scan_url("https://www.musterstadt.de", Some("/kontakt")).unwrap();
        assert_eq!(url.as_str(), "https://www.musterstadt.de/kontakt");

        let root = resolve_scan_url("https://www.musterstadt.de/", None).unwrap();
        assert_eq!(root.as_str(), "https://www.musterstadt.de/");

        assert!(
            resolve_scan_url("https://www.musterstadt.de", Some("https://evil.example/")).is_err()
        );
        assert!(parse_site_url("ftp://musterstadt.de").is_err());
        assert!(parse_site_url("keine url").is_err());
    }

    #[test]
    fn internal_addresses_are_refused() {
        for url in [
            "http://127.0.0.1/",
            "http://169.254.169.254/latest/meta-data/",
            "http://10.0.0.5/",
            "http://192.168.1.1/",
            "http://100.64.0.1/",
            "http://0.0.0.0/",
            "http://[::1]/",
            "http://[fd00::1]/",
            "http://[fe80::1]/",
            "http://[::ffff:192.168.1.1]/",
            "http://localhost:8080/",
            "http://intranet.localhost/",
        ] {
            assert!(parse_site_url(url).is_err(), "{url} must be refused");
        }

        assert!(parse_site_url("https://93.184.216.34/").is_ok());
        assert!(resolve_scan_url("http://10.0.0.5", Some("/admin")).is_err());
    }

    #[test]
    fn redirects_must_stay_on_the_public_host() {
        let start = url::Url::parse("https://www.musterstadt.de/").unwrap();
        let same_host = url::Url::parse("https://www.musterstadt.de/start").unwrap();
        let other_host = url::Url::parse("https://evil.example/").unwrap();
        let metadata = url::Url::parse("http://169.254.169.254/latest/meta-data/").unwrap();

        assert!(redirect_allowed(std::slice::from_ref(&start), &same_host));
        assert!(!redirect_allowed(std::slice::from_ref(&start), &other_host));
        assert!(!redirect_allowed(std::slice::from_ref(&start), &metadata));
        assert!(!redirect_allowed(&[], &same_host));

        let chain = vec![start.clone(); MAX_REDIRECTS + 1];
        assert!(!redirect_allowed(&chain, &same_host));
    }

    #[tokio::test]
    async fn names_resolving_to_loopback_are_refused() {
        assert!(resolve_public("localhost".to_string()).await.is_err());
    }

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn redirect_to_another_host_is_not_followed() {
        use axum::{
            http::{StatusCode, header},
            routing::get,
        };

        let base = serve(
            axum::Router::new().route(
                "/",
                get(|| async {
                    (
                        StatusCode::FOUND,
                        [(header::LOCATION, "http://169.254.169.254/latest/meta-data/")],
                    )
                }),
            ),
        )
        .await;
        let http = http_client().unwrap();

        let root = url::Url::parse(&format!("{base}/")).unwrap();
        assert!(matches!(
            fetch_document(&http, &root).await,
            Err(AppError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn oversized_documents_are_cut_off() {
        use axum::{body::Body, http::header, routing::get};

        let base = serve(
            axum::Router::new()
                .route(
                    "/declared",
                    get(|| async {
                        (
                            [(header::CONTENT_TYPE, "text/html")],
                            "a".repeat(MAX_DOCUMENT_BYTES + 1),
                        )
                    }),
                )
                .route(
                    "/streamed",
                    get(|| async {
                        let chunks = futures::stream::iter(
                            (0..6).map(|_| Ok::<_, std::io::Error>(vec![b'a'; 1024 * 1024])),
                        );
                        (
                            [(header::CONTENT_TYPE, "text/html")],
                            Body::from_stream(chunks),
                        )
                    }),
                ),
        )
        .await;
        let http = reqwest::Client::new();

        for path in ["/declared", "/streamed"] {
            let url = url::Url::parse(&format!("{base}{path}")).unwrap();
            assert!(
                matches!(
                    fetch_document(&http, &url).await,
                    Err(AppError::InvalidRequest(ref msg)) if msg.contains("zu groß")
                ),
                "{path} must be rejected"
            );
        }
    }
}
