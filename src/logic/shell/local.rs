//! Local Shell Adapter
//!
//! Runs commands on the host through `sh -c` and treats the local filesystem
//! as the "device" side of push/pull.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::{DeviceShell, ShellError, ShellOutput};

const WAIT_STEP_MS: u64 = 10;

#[derive(Debug, Clone, Default)]
pub struct LocalShell;

impl LocalShell {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceShell for LocalShell {
    fn execute(&self, command: &str, timeout_ms: u64) -> Result<ShellOutput, ShellError> {
        let mut child = Command::new("sh")
            .args(["-c", command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ShellError::Unreachable(format!("cannot spawn sh: {}", e)))?;

        // Drain pipes on their own threads so a chatty command cannot fill the
        // pipe buffer and stall before exiting.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ShellError::Timeout { timeout_ms });
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(WAIT_STEP_MS)),
                Err(e) => return Err(ShellError::Io(e.to_string())),
            }
        };

        let stdout = join_reader(stdout_reader)?;
        let stderr = join_reader(stderr_reader)?;

        let stdout = stdout.trim().to_string();
        let stderr = stderr.trim().to_string();

        Ok(ShellOutput {
            success: status.success(),
            output: stdout,
            error: if stderr.is_empty() { None } else { Some(stderr) },
        })
    }

    fn push_file(&self, local_path: &Path, remote_path: &str) -> Result<(), ShellError> {
        fs::copy(local_path, remote_path)
            .map(|_| ())
            .map_err(|e| ShellError::TransferFailed {
                path: remote_path.to_string(),
                reason: e.to_string(),
            })
    }

    fn pull_file(&self, remote_path: &str, local_path: &Path) -> Result<(), ShellError> {
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ShellError::Io(e.to_string()))?;
        }
        fs::copy(remote_path, local_path)
            .map(|_| ())
            .map_err(|e| ShellError::TransferFailed {
                path: remote_path.to_string(),
                reason: e.to_string(),
            })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<std::io::Result<String>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)
            .map(|_| String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_reader(
    reader: Option<std::thread::JoinHandle<std::io::Result<String>>>,
) -> Result<String, ShellError> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| ShellError::Io("pipe reader panicked".to_string()))?
            .map_err(|e| ShellError::Io(e.to_string())),
        None => Ok(String::new()),
    }
}
