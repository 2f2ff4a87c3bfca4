//! gopass-backed secret store.
//!
//! Every operation shells out to the gopass CLI so the store on disk stays
//! the single source of truth and the gpg/agent plumbing remains gopass's
//! problem.

use super::{SecretStore, StoreError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const GOPASS_TIMEOUT_SECS: u64 = 30;

/// Secret store backed by the gopass CLI.
pub struct GopassStore {
    binary: String,
}

impl GopassStore {
    pub fn new() -> Self {
        Self::with_binary("gopass")
    }

    /// Use a specific binary, for tests and non-standard installs.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Probe the binary and return its version line.
    pub async fn version(&self) -> Result<String, StoreError> {
        let output = self.run(&["--version"], None).await?;
        Ok(output.lines().next().unwrap_or_default().trim().to_string())
    }

    /// Run the binary with `args`, optionally piping `stdin` into it.
    async fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<String, StoreError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("running `{}`", command);

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| StoreError::Command(format!("failed to run `{command}`: {err}")))?;

        if let Some(input) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                handle
                    .write_all(input.as_bytes())
                    .await
                    .map_err(|err| {
                        StoreError::Command(format!("failed to write to `{command}`: {err}"))
                    })?;
                // Dropping the handle closes the pipe so the child sees EOF.
            }
        }

        let waited = tokio::time::timeout(
            std::time::Duration::from_secs(GOPASS_TIMEOUT_SECS),
            child.wait_with_output(),
        )
        .await;

        match waited {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(StoreError::Command(format!(
                        "`{command}` exited with {}: {}",
                        output.status,
                        stderr.trim()
                    )));
                }
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Err(err)) => Err(StoreError::Command(format!(
                "failed to run `{command}`: {err}"
            ))),
            Err(_) => Err(StoreError::TimedOut {
                command,
                timeout_secs: GOPASS_TIMEOUT_SECS,
            }),
        }
    }
}

impl Default for GopassStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for GopassStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let output = self.run(&["ls", "--flat"], None).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn get(&self, name: &str) -> Result<String, StoreError> {
        self.run(&["show", "-n", name], None).await
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.run(&["insert", "-f", name], Some(value)).await?;
        Ok(())
    }
}
