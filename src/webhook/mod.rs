//! Inbound git webhook handling.
//!
//! The dispatcher validates a delivery with the configured provider's rules
//! and kicks off a forced refresh for push events. Senders always get an
//! immediate ack; validation failures are logged and dropped so that probes
//! cannot learn whether the secret matched.

pub mod github;
pub mod gitlab;

use crate::config::WebhookProvider;
use crate::refresh::RepoRefresher;
use axum::http::HeaderMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("signature mismatch")]
    InvalidSignature,
    #[error("token mismatch")]
    InvalidToken,
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// A validated push event. Field values are informational only.
#[derive(Debug, Clone, Default)]
pub struct PushEvent {
    pub git_ref: Option<String>,
    pub repository: Option<String>,
}

#[derive(Debug)]
pub enum WebhookOutcome {
    /// Authenticated push delivery.
    Push(PushEvent),
    /// Valid request for an event type we do not act on.
    Ignored { event: String },
}

/// Routes webhook deliveries to the provider parser and triggers refreshes.
pub struct WebhookDispatcher {
    provider: WebhookProvider,
    secret: String,
    refresher: Arc<RepoRefresher>,
}

impl WebhookDispatcher {
    pub fn new(
        provider: WebhookProvider,
        secret: impl Into<String>,
        refresher: Arc<RepoRefresher>,
    ) -> Self {
        Self {
            provider,
            secret: secret.into(),
            refresher,
        }
    }

    /// Process one delivery. Refreshes run in the background; the caller
    /// acks the sender without waiting for git.
    pub fn handle(&self, headers: &HeaderMap, body: &[u8]) {
        match self.parse(headers, body) {
            Ok(WebhookOutcome::Push(event)) => {
                info!(
                    "received {} push event for {} ({}), refreshing",
                    self.provider,
                    event.repository.as_deref().unwrap_or("unknown repository"),
                    event.git_ref.as_deref().unwrap_or("unknown ref"),
                );
                let refresher = self.refresher.clone();
                tokio::spawn(async move {
                    if let Err(err) = refresher.refresh(true).await {
                        error!("webhook-triggered refresh failed: {}", err);
                    }
                });
            }
            Ok(WebhookOutcome::Ignored { event }) => {
                debug!("received non-push {} event: {}", self.provider, event);
            }
            Err(err) => {
                error!("{} webhook failure: {}", self.provider, err);
            }
        }
    }

    fn parse(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookOutcome, WebhookError> {
        match self.provider {
            WebhookProvider::Github => github::parse(&self.secret, headers, body),
            WebhookProvider::Gitlab => gitlab::parse(&self.secret, headers, body),
        }
    }
}
