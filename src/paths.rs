//! Centralized path resolution for ubup
//!
//! # Environment Variables
//!
//! - `UBUP_STATE_DIR` - Override the state directory
//! - `UBUP_LOCK_FILE` - Override the run lock path
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `UBUP_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/ubup` (if set)
//! 3. `~/.local/state/ubup`
//!
//! For lock_file():
//! 1. `UBUP_LOCK_FILE` environment variable
//! 2. `~/.cache/ubup/lock`
//!
//! Both are resolved after the privilege drop, so `~` is the invoking user's
//! home directory.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "UBUP_STATE_DIR";

/// Environment variable for lock file override
pub const ENV_LOCK_FILE: &str = "UBUP_LOCK_FILE";

/// Name of the idempotency state file inside the state directory
pub const STATE_FILE: &str = "state.toml";

/// Get the ubup state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("ubup");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("ubup");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Get the path of the idempotency state file
pub fn state_file() -> Result<PathBuf> {
    Ok(state_dir()?.join(STATE_FILE))
}

/// Get the path of the machine-wide run lock
pub fn lock_file() -> Result<PathBuf> {
    if let Ok(file) = std::env::var(ENV_LOCK_FILE) {
        let path = expand(&file);
        log::debug!("Using lock file from {}: {}", ENV_LOCK_FILE, path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".cache").join("ubup").join("lock"))
}

/// Expand ~ and environment variables in a path string
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
