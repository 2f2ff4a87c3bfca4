//! Shared harness for the HTTP integration tests: an in-memory secret
//! store, a scripted git client, and a gateway bound to an ephemeral port.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use passhook::config::Config;
use passhook::gateway::{routes, GatewayState};
use passhook::refresh::{GitClient, RefreshError, RepoRefresher};
use passhook::store::{SecretAccessor, SecretStore, StoreError};
use passhook::webhook::WebhookDispatcher;

/// In-memory secret store standing in for gopass.
#[derive(Default)]
pub struct MockStore {
    entries: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
    calls: AtomicUsize,
    writes: Mutex<Vec<(String, String)>>,
}

impl MockStore {
    pub fn with_entries(entries: &[(&str, &str)]) -> Self {
        Self {
            entries: Mutex::new(
                entries
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// Make every backend call fail from now on.
    pub fn set_failing(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Writes recorded through `set`, in order.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().clone()
    }

    /// Total backend calls across list/get/set.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Command("injected backend failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MockStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(self.entries.lock().iter().map(|(n, _)| n.clone()).collect())
    }

    async fn get(&self, name: &str) -> Result<String, StoreError> {
        self.check()?;
        self.entries
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| StoreError::Command(format!("no entry '{name}'")))
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.writes
            .lock()
            .push((name.to_string(), value.to_string()));
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => entries.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }
}

/// Scripted git client recording the pull/fetch/reset sequence.
#[derive(Default)]
pub struct RecordingGit {
    pub pulls: AtomicUsize,
    pub fetches: AtomicUsize,
    pub resets: AtomicUsize,
    pub fail_pull: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub fail_reset: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl RecordingGit {
    async fn op(
        &self,
        counter: &AtomicUsize,
        fail: &AtomicBool,
        what: &str,
    ) -> Result<(), RefreshError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        counter.fetch_add(1, Ordering::SeqCst);
        if fail.load(Ordering::SeqCst) {
            return Err(RefreshError::Git(format!("{what} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl GitClient for RecordingGit {
    async fn pull_rebase(&self) -> Result<(), RefreshError> {
        self.op(&self.pulls, &self.fail_pull, "pull").await
    }

    async fn fetch_prune(&self) -> Result<(), RefreshError> {
        self.op(&self.fetches, &self.fail_fetch, "fetch").await
    }

    async fn reset_hard(&self) -> Result<(), RefreshError> {
        self.op(&self.resets, &self.fail_reset, "reset").await
    }
}

pub fn base_env() -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("GIT_WEBHOOK_SECRET".to_string(), "hook-secret".to_string());
    vars.insert("GIT_WEBHOOK_TYPE".to_string(), "github".to_string());
    vars
}

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars = base_env();
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_map(&vars).unwrap()
}

/// A live gateway instance on an ephemeral port backed by test doubles.
pub struct TestServer {
    pub base_url: String,
    pub store: Arc<MockStore>,
    pub git: Arc<RecordingGit>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TestServer {
    pub async fn spawn(extra_env: &[(&str, &str)]) -> Self {
        Self::spawn_with(
            extra_env,
            Arc::new(MockStore::default()),
            Arc::new(RecordingGit::default()),
        )
        .await
    }

    pub async fn spawn_with(
        extra_env: &[(&str, &str)],
        store: Arc<MockStore>,
        git: Arc<RecordingGit>,
    ) -> Self {
        let config = test_config(extra_env);
        let refresher = Arc::new(RepoRefresher::new(git.clone(), config.refresh_limit));
        let secrets = Arc::new(SecretAccessor::new(store.clone(), refresher.clone()));
        let webhooks = Arc::new(WebhookDispatcher::new(
            config.webhook_provider,
            config.webhook_secret.clone(),
            refresher.clone(),
        ));
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        let state = GatewayState {
            config: Arc::new(config),
            secrets,
            refresher,
            webhooks,
            shutdown_tx: shutdown_tx.clone(),
            version: "test".to_string(),
        };

        let app = routes::build_routes(state);

        // Bind to port 0 to get an ephemeral port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .unwrap();
        });

        // Small delay to ensure server is ready
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base_url: format!("http://127.0.0.1:{}", addr.port()),
            store,
            git,
            shutdown_tx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
