//! Configuration and per-scenario artifact paths
//!
//! Artifact names are derived from the scenario name only, which is why two
//! scenarios must never run at the same time in the same work directory.

use std::path::{Path, PathBuf};

/// Name used for the per-user configuration directory
const APP_NAME: &str = "smtp-conformance";

/// Config file picked up from the current directory
pub const LOCAL_CONFIG_NAME: &str = "conformance.toml";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/smtp-conformance/`
/// - macOS: `~/Library/Application Support/smtp-conformance/`
/// - Windows: `%APPDATA%\smtp-conformance\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Path of the scenario script
pub fn script_path(scenarios_dir: &Path, name: &str) -> PathBuf {
    scenarios_dir.join(name)
}

/// Path of the server log file for a scenario
pub fn log_path(work_dir: &Path, name: &str) -> PathBuf {
    work_dir.join(format!("{}-log", name))
}

/// Path of the mailbox directory for a scenario
///
/// Keeps the trailing separator: the server concatenates subdirectory names
/// onto whatever it is given.
pub fn mail_dir(work_dir: &Path, name: &str) -> PathBuf {
    work_dir.join(format!("{}-mail/", name))
}

/// Remove a file if it exists
pub fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Remove a directory tree if it exists
pub fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
