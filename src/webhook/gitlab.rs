//! GitLab webhook parsing.
//!
//! GitLab sends the shared secret verbatim in `X-Gitlab-Token` rather than
//! signing the body, so authentication is a constant-time token compare.

use super::{PushEvent, WebhookError, WebhookOutcome};
use axum::http::HeaderMap;
use serde::Deserialize;
use subtle::ConstantTimeEq;

const EVENT_HEADER: &str = "x-gitlab-event";
const TOKEN_HEADER: &str = "x-gitlab-token";
const PUSH_EVENT: &str = "Push Hook";

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    project: Option<Project>,
}

#[derive(Debug, Deserialize)]
struct Project {
    path_with_namespace: Option<String>,
}

/// Parse a GitLab delivery. Non-push hooks are ignored without touching the
/// token; push hooks must carry the right token.
pub fn parse(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<WebhookOutcome, WebhookError> {
    let event = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if event != PUSH_EVENT {
        let event = if event.is_empty() { "(none)" } else { event };
        return Ok(WebhookOutcome::Ignored {
            event: event.to_string(),
        });
    }

    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookError::MissingHeader("X-Gitlab-Token"))?;
    if !safe_equal(token, secret) {
        return Err(WebhookError::InvalidToken);
    }

    let payload: PushPayload = serde_json::from_slice(body)?;
    Ok(WebhookOutcome::Push(PushEvent {
        git_ref: payload.git_ref,
        repository: payload.project.and_then(|p| p.path_with_namespace),
    }))
}

/// Constant-time string comparison.
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
