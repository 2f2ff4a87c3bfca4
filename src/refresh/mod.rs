//! Repository refresh coordination.
//!
//! All paths that want the local store synced with its remote go through
//! `RepoRefresher::refresh`: webhook deliveries and pre-write syncs force it,
//! the timer loop and other periodic callers are rate limited. At most one
//! git sequence runs at a time and the whole sequence is bounded by a
//! deadline so a wedged git invocation cannot pile up callers behind it.

mod git;

pub use git::{GitClient, GopassGit};

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("{0}")]
    Git(String),
    #[error("refresh timed out after {0:?}")]
    TimedOut(Duration),
}

/// Token bucket holding a single token that refills once per period.
struct RefreshLimiter {
    period: Duration,
    next_allowed: parking_lot::Mutex<Instant>,
}

impl RefreshLimiter {
    fn new(period: Duration) -> Self {
        Self {
            period,
            // Starts full: the first call is always allowed.
            next_allowed: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Take the token if available. Taking it pushes the next refill out by
    /// one period.
    fn allow(&self) -> bool {
        if self.period.is_zero() {
            return true;
        }
        let mut next = self.next_allowed.lock();
        let now = Instant::now();
        if now >= *next {
            *next = now + self.period;
            true
        } else {
            false
        }
    }
}

/// Serialized, rate-limited, deadline-bounded access to the git sequence.
pub struct RepoRefresher {
    git: Arc<dyn GitClient>,
    limiter: RefreshLimiter,
    op_lock: tokio::sync::Mutex<()>,
    timeout: Duration,
}

impl RepoRefresher {
    pub fn new(git: Arc<dyn GitClient>, refresh_limit: Duration) -> Self {
        Self {
            git,
            limiter: RefreshLimiter::new(refresh_limit),
            op_lock: tokio::sync::Mutex::new(()),
            timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    /// Override the refresh deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sync the local store with its remote.
    ///
    /// Unforced refreshes that find the rate-limit token spent are a quiet
    /// no-op. Forced ones skip the check but still spend the token when one
    /// is there, so a webhook delivery also resets the periodic clock.
    pub async fn refresh(&self, force: bool) -> Result<(), RefreshError> {
        if !self.limiter.allow() && !force {
            debug!("refresh not allowed yet");
            return Ok(());
        }
        match tokio::time::timeout(self.timeout, self.refresh_locked()).await {
            Ok(result) => result,
            Err(_) => Err(RefreshError::TimedOut(self.timeout)),
        }
    }

    async fn refresh_locked(&self) -> Result<(), RefreshError> {
        let _guard = self.op_lock.lock().await;
        debug!("starting gopass git repo refresh");
        if let Err(err) = self.git.pull_rebase().await {
            warn!("git pull failed, falling back to fetch and reset: {}", err);
            self.git.fetch_prune().await?;
            self.git.reset_hard().await?;
        }
        info!("gopass git repo refreshed");
        Ok(())
    }
}

/// Run unforced refreshes on a fixed interval until shutdown. `every` must
/// be positive.
pub fn spawn_auto_refresh(
    refresher: Arc<RepoRefresher>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // Skip the first immediate tick.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = refresher.refresh(false).await {
                        error!("scheduled refresh failed: {}", err);
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("auto-refresh loop shutting down");
                    break;
                }
            }
        }
    })
}
