//! Scripted Device Shell for tests.
//!
//! Holds an in-memory "device filesystem" and answers `sha256sum <path>` from
//! it, so integrity code can be exercised without a real device.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::{DeviceShell, ShellError, ShellOutput};

/// Distinct well-formed digests for scripting checksum sequences
pub const SUM_C0: &str = "c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0";
pub const SUM_C1: &str = "c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1";

#[derive(Default)]
pub struct MockShell {
    files: Mutex<HashMap<String, Vec<u8>>>,
    responses: Mutex<HashMap<String, Result<ShellOutput, ShellError>>>,
    checksum_script: Mutex<HashMap<String, VecDeque<Option<String>>>>,
    unreachable: AtomicBool,
    unreachable_after: Mutex<Option<usize>>,
    fail_push: AtomicBool,
    calls: AtomicUsize,
    pushes: AtomicUsize,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_file(&self, path: &str, content: &[u8]) {
        self.files.lock().insert(path.to_string(), content.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    pub fn respond(&self, command: &str, output: ShellOutput) {
        self.responses.lock().insert(command.to_string(), Ok(output));
    }

    pub fn fail_with(&self, command: &str, error: ShellError) {
        self.responses.lock().insert(command.to_string(), Err(error));
    }

    /// Script successive checksum answers for `path`. `None` means missing.
    /// The last entry repeats once the script is exhausted.
    pub fn script_checksums(&self, path: &str, checksums: Vec<Option<&str>>) {
        self.checksum_script.lock().insert(
            path.to_string(),
            checksums.into_iter().map(|c| c.map(str::to_string)).collect(),
        );
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Channel goes down once `calls` executions have been served
    pub fn unreachable_after(&self, calls: usize) {
        *self.unreachable_after.lock() = Some(calls);
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), ShellError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ShellError::Unreachable("mock channel down".to_string()));
        }
        if let Some(limit) = *self.unreachable_after.lock() {
            if self.calls.load(Ordering::SeqCst) >= limit {
                return Err(ShellError::Unreachable("mock channel dropped".to_string()));
            }
        }
        Ok(())
    }

    fn checksum_of(&self, path: &str) -> ShellOutput {
        let scripted = {
            let mut script = self.checksum_script.lock();
            script.get_mut(path).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };

        let checksum = match scripted {
            Some(entry) => entry,
            None => self
                .files
                .lock()
                .get(path)
                .map(|content| hex::encode(Sha256::digest(content))),
        };

        match checksum {
            Some(sum) => ShellOutput::ok(format!("{}  {}", sum, path)),
            None => ShellOutput::failed(format!("sha256sum: {}: No such file or directory", path)),
        }
    }
}

fn unquote(arg: &str) -> String {
    arg.trim().trim_matches('\'').replace("'\\''", "'")
}

impl DeviceShell for MockShell {
    fn execute(&self, command: &str, _timeout_ms: u64) -> Result<ShellOutput, ShellError> {
        self.check_reachable()?;
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(scripted) = self.responses.lock().get(command) {
            return scripted.clone();
        }
        if let Some(path) = command.strip_prefix("sha256sum ") {
            return Ok(self.checksum_of(&unquote(path)));
        }
        Ok(ShellOutput::failed(format!("{}: not found", command)))
    }

    fn push_file(&self, local_path: &Path, remote_path: &str) -> Result<(), ShellError> {
        self.check_reachable()?;
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(ShellError::TransferFailed {
                path: remote_path.to_string(),
                reason: "read-only file system".to_string(),
            });
        }
        let content = fs::read(local_path).map_err(|e| ShellError::Io(e.to_string()))?;
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.put_file(remote_path, &content);
        Ok(())
    }

    fn pull_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ShellError> {
        self.check_reachable()?;
        let content = self.file(remote_path).ok_or_else(|| ShellError::TransferFailed {
            path: remote_path.to_string(),
            reason: "no such file".to_string(),
        })?;
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ShellError::Io(e.to_string()))?;
        }
        fs::write(local_path, content).map_err(|e| ShellError::Io(e.to_string()))
    }
}
