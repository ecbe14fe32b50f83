//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::testing::Mode;

#[derive(Parser, Debug)]
#[command(name = "smtp-conformance", about = "SMTP server conformance harness")]
#[command(version, long_about = None)]
pub struct Cli {
    /// Modes to run (default: all of ipv4, ipv6, valgrind)
    #[arg(value_enum)]
    pub modes: Vec<Mode>,

    /// Configuration file (default: ./conformance.toml, then the user config)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// YAML suite manifest replacing the built-in scenario list
    #[arg(long)]
    pub suite: Option<PathBuf>,

    /// Server binary under test
    #[arg(long)]
    pub server: Option<PathBuf>,

    /// Port the server listens on
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Directory holding scenario scripts and reference trees
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    /// Directory for per-scenario logs and mailboxes
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// Selected modes in canonical order, without duplicates
    pub fn selected_modes(&self) -> Vec<Mode> {
        if self.modes.is_empty() {
            return Mode::ALL.to_vec();
        }
        Mode::ALL
            .into_iter()
            .filter(|m| self.modes.contains(m))
            .collect()
    }
}
