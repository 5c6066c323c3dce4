//! Inbound payment provider webhook.
//!
//! - POST /api/webhooks/mollie - Payment status changed
//!
//! Mollie only sends the payment id; the payment itself is always fetched
//! from the provider before anything is applied.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
};

use crate::{
    error::AppError,
    models::payment::{WebhookNotification, WebhookOutcome},
    services::payment_service,
    state::AppState,
};

/// Pull the payment id out of a form-encoded or JSON body.
pub fn payment_id_from_body(headers: &HeaderMap, body: &[u8]) -> Result<String, AppError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let id = if is_json {
        serde_json::from_slice::<WebhookNotification>(body)
            .map_err(|_| AppError::InvalidRequest("Invalid webhook body".to_string()))?
            .id
    } else {
        url::form_urlencoded::parse(body)
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())
    };

    id.map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("Missing payment id".to_string()))
}

/// Process a Mollie webhook delivery.
///
/// # Response
///
/// - **200 OK**: applied, already processed, or ignored (not paid)
/// - **400**: missing id or id unknown to Mollie
/// - **502 / 500**: provider or database failure; Mollie retries later
pub async fn mollie_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, AppError> {
    let payment_id = payment_id_from_body(&headers, &body)?;
    let outcome = payment_service::process_webhook(&state, &payment_id).await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn reads_form_encoded_id() {
        let id = payment_id_from_body(
            &headers("application/x-www-form-urlencoded"),
            b"id=tr_WDqYK6vllg",
        )
        .unwrap();
        assert_eq!(id, "tr_WDqYK6vllg");
    }

    #[test]
    fn reads_json_id() {
        let id = payment_id_from_body(
            &headers("application/json; charset=utf-8"),
            br#"{"id":"tr_abc"}"#,
        )
        .unwrap();
        assert_eq!(id, "tr_abc");
    }

    #[test]
    fn missing_id_is_rejected() {
        assert!(payment_id_from_body(&headers("application/x-www-form-urlencoded"), b"").is_err());
        assert!(payment_id_from_body(&headers("application/json"), br#"{"id":""}"#).is_err());
        assert!(payment_id_from_body(&headers("application/json"), b"not json").is_err());
    }
}
