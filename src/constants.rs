//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Every value can be overridden through the environment (see `EngineConfig::from_env`).

/// Default timeout for a single Device Shell call (milliseconds)
pub const DEFAULT_SHELL_TIMEOUT_MS: u64 = 30_000;

/// Default polling interval of the integrity monitor (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default TTL of the evidence cache (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Default remote checksum command. `{path}` is replaced by the quoted target path.
pub const DEFAULT_CHECKSUM_COMMAND: &str = "sha256sum {path}";

/// Folder name (under the local data dir) holding backup blobs
pub const BACKUP_FOLDER: &str = "backups";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "device-guard";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get shell timeout from environment or use default
pub fn get_shell_timeout_ms() -> u64 {
    env_u64("DEVICE_GUARD_SHELL_TIMEOUT_MS").unwrap_or(DEFAULT_SHELL_TIMEOUT_MS)
}

/// Get monitor poll interval from environment or use default
pub fn get_poll_interval_ms() -> u64 {
    env_u64("DEVICE_GUARD_POLL_INTERVAL_MS").unwrap_or(DEFAULT_POLL_INTERVAL_MS)
}

/// Get evidence cache TTL from environment or use default
pub fn get_cache_ttl_secs() -> u64 {
    env_u64("DEVICE_GUARD_CACHE_TTL_SECS").unwrap_or(DEFAULT_CACHE_TTL_SECS)
}

/// Get checksum command template from environment or use default
pub fn get_checksum_command() -> String {
    std::env::var("DEVICE_GUARD_CHECKSUM_COMMAND")
        .unwrap_or_else(|_| DEFAULT_CHECKSUM_COMMAND.to_string())
}

/// Get backup directory from environment or fall back to the local data dir
pub fn get_backup_dir() -> std::path::PathBuf {
    std::env::var("DEVICE_GUARD_BACKUP_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_backup_dir())
}

/// `<local data dir>/device-guard/backups`
pub fn default_backup_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(APP_NAME)
        .join(BACKUP_FOLDER)
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
