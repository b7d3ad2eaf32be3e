//! Device Shell Module - Command channel to the assessed device
//!
//! The engine never executes device commands itself. Everything goes through
//! an injected [`DeviceShell`] implementation supplied by the platform adapter.
//!
//! # Components
//! - `mod.rs`: `DeviceShell` contract, `ShellOutput`, `ShellError`, `ShellHandle`
//! - `local.rs`: `LocalShell` adapter (host processes + local filesystem)
//! - `mock.rs`: scripted test double (tests only)
//!
//! Every call made through [`ShellHandle`] is bounded by a timeout and runs on
//! the blocking pool, so a hung device never stalls the async runtime.

pub mod local;
#[cfg(test)]
pub mod mock;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local::LocalShell;

// ============================================================================
// CONTRACT
// ============================================================================

/// Result of one command execution on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOutput {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ShellOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Shell channel errors.
///
/// A command that ran and exited non-zero is NOT an error: it comes back as a
/// `ShellOutput` with `success == false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    /// The channel to the device is down
    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("shell call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("file transfer failed for {path}: {reason}")]
    TransferFailed { path: String, reason: String },

    #[error("shell I/O error: {0}")]
    Io(String),
}

impl ShellError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ShellError::Unreachable(_))
    }
}

/// Command channel to one device/environment
pub trait DeviceShell: Send + Sync {
    /// Run `command`, giving up after `timeout_ms`
    fn execute(&self, command: &str, timeout_ms: u64) -> Result<ShellOutput, ShellError>;

    /// Copy a local file onto the device
    fn push_file(&self, local_path: &Path, remote_path: &str) -> Result<(), ShellError>;

    /// Copy a device file into local storage
    fn pull_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ShellError>;
}

// ============================================================================
// BOUNDED HANDLE
// ============================================================================

/// Shared, timeout-bounded handle to a [`DeviceShell`]
#[derive(Clone)]
pub struct ShellHandle {
    shell: Arc<dyn DeviceShell>,
    timeout_ms: u64,
}

impl ShellHandle {
    pub fn new(shell: Arc<dyn DeviceShell>, timeout_ms: u64) -> Self {
        Self { shell, timeout_ms }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub async fn execute(&self, command: &str) -> Result<ShellOutput, ShellError> {
        let command = command.to_string();
        self.run(move |shell, timeout_ms| shell.execute(&command, timeout_ms))
            .await
    }

    /// Run an arbitrary blocking interaction with the shell under the same deadline
    pub async fn run<T, F>(&self, call: F) -> Result<T, ShellError>
    where
        F: FnOnce(&dyn DeviceShell, u64) -> Result<T, ShellError> + Send + 'static,
        T: Send + 'static,
    {
        let shell = Arc::clone(&self.shell);
        let timeout_ms = self.timeout_ms;
        bounded(timeout_ms, move || call(shell.as_ref(), timeout_ms)).await
    }

    pub async fn push_file(&self, local_path: &Path, remote_path: &str) -> Result<(), ShellError> {
        let shell = Arc::clone(&self.shell);
        let local_path: PathBuf = local_path.to_path_buf();
        let remote_path = remote_path.to_string();
        bounded(self.timeout_ms, move || shell.push_file(&local_path, &remote_path)).await
    }

    pub async fn pull_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ShellError> {
        let shell = Arc::clone(&self.shell);
        let local_path: PathBuf = local_path.to_path_buf();
        let remote_path = remote_path.to_string();
        bounded(self.timeout_ms, move || shell.pull_file(&remote_path, &local_path)).await
    }
}

/// Run a blocking shell call on the blocking pool with a hard deadline.
///
/// On expiry the call is reported as failed; the blocking task itself is left
/// to finish on its own thread.
async fn bounded<T, F>(timeout_ms: u64, call: F) -> Result<T, ShellError>
where
    F: FnOnce() -> Result<T, ShellError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(call);
    match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(ShellError::Io(format!("shell task aborted: {}", join_err))),
        Err(_) => {
            log::warn!("Shell call exceeded {}ms, treating as failed", timeout_ms);
            Err(ShellError::Timeout { timeout_ms })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
