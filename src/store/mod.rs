//! Secret store access.
//!
//! `SecretStore` abstracts the password-store backend; `GopassStore` is the
//! production implementation shelling out to the gopass CLI. `SecretAccessor`
//! layers the request-level semantics (existence checks, trimming, the
//! refresh-before-write rule) on top of a store and a refresher.

mod gopass;

pub use gopass::GopassStore;

use crate::refresh::{RefreshError, RepoRefresher};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Failure talking to the secret store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Command(String),
    #[error("`{command}` timed out after {timeout_secs}s")]
    TimedOut { command: String, timeout_secs: u64 },
}

/// Failure serving a secret request.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("could not find secret '{name}'")]
    NotFound { name: String },
    #[error(transparent)]
    Backend(#[from] StoreError),
    #[error("refresh before write failed: {0}")]
    Refresh(#[from] RefreshError),
}

/// Backend operations against a password store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// List every secret name in the store.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
    /// Read the raw value of a secret.
    async fn get(&self, name: &str) -> Result<String, StoreError>;
    /// Create or overwrite a secret.
    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError>;
}

/// Request-level secret operations shared by the HTTP handlers.
pub struct SecretAccessor {
    store: Arc<dyn SecretStore>,
    refresher: Arc<RepoRefresher>,
}

impl SecretAccessor {
    pub fn new(store: Arc<dyn SecretStore>, refresher: Arc<RepoRefresher>) -> Self {
        Self { store, refresher }
    }

    /// Fetch a secret by name. The store listing is consulted first so a
    /// missing secret is distinguishable from a backend failure.
    pub async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        let names = self.store.list().await?;
        if !names.iter().any(|n| n == name) {
            return Err(SecretError::NotFound {
                name: name.to_string(),
            });
        }
        let value = self.store.get(name).await?;
        Ok(value.trim().to_string())
    }

    /// Store a secret. The repo is force-refreshed first so the write lands
    /// on top of the remote state; a failed refresh aborts the write.
    pub async fn put_secret(&self, name: &str, value: &str) -> Result<(), SecretError> {
        self.refresher.refresh(true).await?;
        debug!("storing secret '{}'", name);
        self.store.set(name, value).await?;
        info!("pushed secret '{}'", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::GitClient;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockStore {
        entries: Mutex<Vec<(String, String)>>,
        fail_list: AtomicBool,
        writes: Mutex<Vec<(String, String)>>,
    }

    impl MockStore {
        fn with_entries(entries: &[(&str, &str)]) -> Self {
            Self {
                entries: Mutex::new(
                    entries
                        .iter()
                        .map(|(n, v)| (n.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SecretStore for MockStore {
        async fn list(&self) -> Result<Vec<String>, StoreError> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(StoreError::Command("injected backend failure".into()));
            }
            Ok(self.entries.lock().iter().map(|(n, _)| n.clone()).collect())
        }

        async fn get(&self, name: &str) -> Result<String, StoreError> {
            self.entries
                .lock()
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| StoreError::Command(format!("no entry '{name}'")))
        }

        async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
            self.writes.lock().push((name.to_string(), value.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeGit {
        pulls: AtomicUsize,
        fail_pull: AtomicBool,
    }

    #[async_trait]
    impl GitClient for FakeGit {
        async fn pull_rebase(&self) -> Result<(), RefreshError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            if self.fail_pull.load(Ordering::SeqCst) {
                return Err(RefreshError::Git("pull rejected".into()));
            }
            Ok(())
        }

        async fn fetch_prune(&self) -> Result<(), RefreshError> {
            Err(RefreshError::Git("fetch rejected".into()))
        }

        async fn reset_hard(&self) -> Result<(), RefreshError> {
            Err(RefreshError::Git("reset rejected".into()))
        }
    }

    fn accessor(store: Arc<MockStore>, git: Arc<FakeGit>) -> SecretAccessor {
        let refresher = Arc::new(RepoRefresher::new(git, std::time::Duration::ZERO));
        SecretAccessor::new(store, refresher)
    }

    #[tokio::test]
    async fn get_secret_returns_trimmed_value() {
        let store = Arc::new(MockStore::with_entries(&[("svc/db", "hunter2\n")]));
        let accessor = accessor(store, Arc::new(FakeGit::default()));
        let value = accessor.get_secret("svc/db").await.unwrap();
        assert_eq!(value, "hunter2");
    }

    #[tokio::test]
    async fn trim_is_idempotent() {
        let store = Arc::new(MockStore::with_entries(&[("svc/db", "hunter2")]));
        let accessor = accessor(store, Arc::new(FakeGit::default()));
        let value = accessor.get_secret("svc/db").await.unwrap();
        assert_eq!(value, "hunter2");
    }

    #[tokio::test]
    async fn get_secret_not_in_listing_is_not_found() {
        let store = Arc::new(MockStore::with_entries(&[("svc/db", "hunter2")]));
        let accessor = accessor(store, Arc::new(FakeGit::default()));
        let err = accessor.get_secret("svc/other").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound { name } if name == "svc/other"));
    }

    #[tokio::test]
    async fn backend_list_failure_propagates() {
        let store = Arc::new(MockStore::with_entries(&[("svc/db", "hunter2")]));
        store.fail_list.store(true, Ordering::SeqCst);
        let accessor = accessor(store, Arc::new(FakeGit::default()));
        let err = accessor.get_secret("svc/db").await.unwrap_err();
        assert!(matches!(err, SecretError::Backend(_)));
    }

    #[tokio::test]
    async fn put_secret_refreshes_then_writes() {
        let store = Arc::new(MockStore::default());
        let git = Arc::new(FakeGit::default());
        let accessor = accessor(store.clone(), git.clone());

        accessor.put_secret("svc/new", "value").await.unwrap();

        assert_eq!(git.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.writes.lock().as_slice(),
            &[("svc/new".to_string(), "value".to_string())]
        );
    }

    #[tokio::test]
    async fn put_secret_aborts_when_refresh_fails() {
        let store = Arc::new(MockStore::default());
        let git = Arc::new(FakeGit::default());
        git.fail_pull.store(true, Ordering::SeqCst);
        let accessor = accessor(store.clone(), git);

        let err = accessor.put_secret("svc/new", "value").await.unwrap_err();

        assert!(matches!(err, SecretError::Refresh(_)));
        assert!(store.writes.lock().is_empty());
    }
}
