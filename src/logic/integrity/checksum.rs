//! Checksums - remote (through the Device Shell) and local (backup blobs)

use std::fs;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::logic::shell::{ShellError, ShellHandle};

/// What one remote checksum attempt observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Present(String),
    Missing,
    /// The command ran but gave no usable answer (permissions, odd output)
    Unreadable(String),
}

/// Single-quote `arg` for a POSIX shell
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Fill `{path}` in the template with the quoted path (appended if absent)
pub fn render_command(template: &str, path: &str) -> String {
    let quoted = shell_quote(path);
    if template.contains("{path}") {
        template.replace("{path}", &quoted)
    } else {
        format!("{} {}", template.trim_end(), quoted)
    }
}

/// Shortest and longest digest accepted (MD5 .. SHA-512, in hex chars)
const MIN_DIGEST_LEN: usize = 32;
const MAX_DIGEST_LEN: usize = 128;

/// First token of the first non-empty line, if it is a hex digest
/// (`md5sum`, `sha1sum`, `sha256sum`, `sha512sum` ... output)
pub fn parse_checksum(output: &str) -> Option<String> {
    let token = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?
        .split_whitespace()
        .next()?;

    let plausible_len = (MIN_DIGEST_LEN..=MAX_DIGEST_LEN).contains(&token.len()) && token.len() % 2 == 0;
    if plausible_len && token.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(token.to_ascii_lowercase())
    } else {
        None
    }
}

/// Checksum `path` on the device.
///
/// Channel errors are returned as-is so callers can tell a dead device from
/// a missing file.
pub async fn remote_checksum(
    shell: &ShellHandle,
    template: &str,
    path: &str,
) -> Result<Observation, ShellError> {
    let out = shell.execute(&render_command(template, path)).await?;

    if out.success {
        return Ok(match parse_checksum(&out.output) {
            Some(sum) => Observation::Present(sum),
            None => Observation::Unreadable(format!("unexpected checksum output: {}", out.output.trim())),
        });
    }

    let reason = out
        .error
        .filter(|e| !e.trim().is_empty())
        .unwrap_or(out.output);
    if reason.contains("No such file") {
        Ok(Observation::Missing)
    } else {
        Ok(Observation::Unreadable(reason.trim().to_string()))
    }
}

/// Streaming SHA-256 of a local file
pub fn local_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

pub fn checksum_bytes(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}
