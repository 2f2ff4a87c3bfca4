//! GitHub webhook parsing.
//!
//! Deliveries are authenticated with the `X-Hub-Signature-256` header, an
//! HMAC-SHA256 of the raw body keyed with the shared webhook secret.

use super::{PushEvent, WebhookError, WebhookOutcome};
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: Option<String>,
}

/// Parse a GitHub delivery. Non-push events are ignored without touching
/// the signature; push events must carry a valid signature.
pub fn parse(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<WebhookOutcome, WebhookError> {
    let event = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if event != "push" {
        let event = if event.is_empty() { "(none)" } else { event };
        return Ok(WebhookOutcome::Ignored {
            event: event.to_string(),
        });
    }

    verify_signature(secret, headers, body)?;

    let payload: PushPayload = serde_json::from_slice(body)?;
    Ok(WebhookOutcome::Push(PushEvent {
        git_ref: payload.git_ref,
        repository: payload.repository.and_then(|repo| repo.full_name),
    }))
}

/// Compute the signature header value GitHub would send for `body`.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    )
}

fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), WebhookError> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookError::MissingHeader("X-Hub-Signature-256"))?;
    let hex_digest = header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(WebhookError::InvalidSignature)?;
    let digest = hex::decode(hex_digest).map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&digest)
        .map_err(|_| WebhookError::InvalidSignature)
}
