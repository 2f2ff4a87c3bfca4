//! Git operations over the gopass `git` passthrough.
//!
//! Commands run inside the password store's working copy without this
//! process having to know where that copy lives.

use super::RefreshError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Git operations needed by the refresher.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// `git pull --prune --rebase`
    async fn pull_rebase(&self) -> Result<(), RefreshError>;
    /// `git fetch --prune`
    async fn fetch_prune(&self) -> Result<(), RefreshError>;
    /// `git reset --hard origin/HEAD`
    async fn reset_hard(&self) -> Result<(), RefreshError>;
}

/// Git client that shells out through `gopass git`.
pub struct GopassGit {
    binary: String,
}

impl GopassGit {
    pub fn new() -> Self {
        Self::with_binary("gopass")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run one git subcommand. No timeout here; the refresher cancels the
    /// whole sequence and `kill_on_drop` reaps the child.
    async fn run_git(&self, op: &str, args: &[&str]) -> Result<(), RefreshError> {
        let output = Command::new(&self.binary)
            .arg("git")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| RefreshError::Git(format!("failed to run git {op}: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RefreshError::Git(format!(
                "git {op} failed with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        debug!("git {} OK", op);
        Ok(())
    }
}

impl Default for GopassGit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitClient for GopassGit {
    async fn pull_rebase(&self) -> Result<(), RefreshError> {
        self.run_git("pull", &["pull", "--prune", "--rebase"]).await
    }

    async fn fetch_prune(&self) -> Result<(), RefreshError> {
        self.run_git("fetch", &["fetch", "--prune"]).await
    }

    async fn reset_hard(&self) -> Result<(), RefreshError> {
        self.run_git("reset", &["reset", "--hard", "origin/HEAD"])
            .await
    }
}
