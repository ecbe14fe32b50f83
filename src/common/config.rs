//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths;
use super::Result;
use crate::server::{Instrumentation, LEAK_SENTINEL_EXIT_CODE};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Server-under-test settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Leak-detection wrapper settings
    #[serde(default)]
    pub leak_check: LeakCheckConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Scenario and artifact locations
    #[serde(default)]
    pub paths: PathsConfig,
}

/// How to launch the server binary
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Path to the server executable
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Address passed to the server's bind flag
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Listening port, shared by every scenario
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hostname the server advertises in its greetings
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Additional arguments appended after the fixed flags
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            bind_address: default_bind_address(),
            port: default_port(),
            hostname: default_hostname(),
            extra_args: Vec::new(),
        }
    }
}

fn default_binary() -> PathBuf {
    PathBuf::from("../smtpserver")
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7548
}
fn default_hostname() -> String {
    "mysmtp.pvs.bmstu".to_string()
}

/// Leak-detection wrapper used in leak-checked mode
#[derive(Debug, Deserialize, Clone)]
pub struct LeakCheckConfig {
    /// Wrapper executable, looked up on PATH when given as a bare name
    #[serde(default = "default_leak_program")]
    pub program: PathBuf,

    /// Arguments placed between the wrapper and the server command line
    #[serde(default = "default_leak_args")]
    pub args: Vec<String>,
}

impl Default for LeakCheckConfig {
    fn default() -> Self {
        Self {
            program: default_leak_program(),
            args: default_leak_args(),
        }
    }
}

fn default_leak_program() -> PathBuf {
    PathBuf::from("valgrind")
}

fn default_leak_args() -> Vec<String> {
    vec![
        "--leak-check=full".to_string(),
        "--child-silent-after-fork=yes".to_string(),
        format!("--error-exitcode={}", LEAK_SENTINEL_EXIT_CODE),
    ]
}

impl LeakCheckConfig {
    /// Resolve the wrapper program to an executable path
    ///
    /// Bare names are searched on PATH; anything with a directory component
    /// is used as given.
    pub fn resolve_program(&self) -> PathBuf {
        if self.program.components().count() == 1 {
            if let Ok(found) = which::which(&self.program) {
                return found;
            }
        }
        self.program.clone()
    }
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Per-receive timeout while waiting for a reply line
    #[serde(default = "default_receive")]
    pub receive_secs: u64,

    /// Grace period after interrupt before the server is killed
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// Grace period in leak-checked mode
    #[serde(default = "default_stop_grace_leak_check")]
    pub stop_grace_leak_check_secs: u64,

    /// Delay between launching the server and connecting to it
    #[serde(default = "default_startup_delay")]
    pub startup_delay_ms: u64,

    /// Startup delay in leak-checked mode
    #[serde(default = "default_startup_delay_leak_check")]
    pub startup_delay_leak_check_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            receive_secs: default_receive(),
            stop_grace_secs: default_stop_grace(),
            stop_grace_leak_check_secs: default_stop_grace_leak_check(),
            startup_delay_ms: default_startup_delay(),
            startup_delay_leak_check_ms: default_startup_delay_leak_check(),
        }
    }
}

fn default_receive() -> u64 {
    10
}
fn default_stop_grace() -> u64 {
    2
}
fn default_stop_grace_leak_check() -> u64 {
    5
}
fn default_startup_delay() -> u64 {
    100
}
fn default_startup_delay_leak_check() -> u64 {
    1000
}

impl Timeouts {
    /// Grace period for the given instrumentation
    pub fn stop_grace(&self, instrumentation: Instrumentation) -> Duration {
        match instrumentation {
            Instrumentation::Plain => Duration::from_secs(self.stop_grace_secs),
            Instrumentation::LeakChecked => Duration::from_secs(self.stop_grace_leak_check_secs),
        }
    }

    /// Post-start delay for the given instrumentation
    pub fn startup_delay(&self, instrumentation: Instrumentation) -> Duration {
        match instrumentation {
            Instrumentation::Plain => Duration::from_millis(self.startup_delay_ms),
            Instrumentation::LeakChecked => {
                Duration::from_millis(self.startup_delay_leak_check_ms)
            }
        }
    }

    pub fn receive(&self) -> Duration {
        Duration::from_secs(self.receive_secs)
    }
}

/// Scenario and artifact locations
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory holding scenario scripts and reference trees
    #[serde(default = "default_dir")]
    pub scenarios_dir: PathBuf,

    /// Directory where per-scenario logs and mailboxes are written
    #[serde(default = "default_dir")]
    pub work_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scenarios_dir: default_dir(),
            work_dir: default_dir(),
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Load configuration
    ///
    /// An explicit path must exist. Otherwise `./conformance.toml` and then the
    /// per-user config file are tried, falling back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let local = PathBuf::from(paths::LOCAL_CONFIG_NAME);
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(path) = paths::config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            super::Error::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
