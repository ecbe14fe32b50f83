//! CLI command handling
//!
//! Resolves configuration, builds the suite and runs it once per selected
//! mode.

use colored::Colorize;

use crate::commands::Cli;
use crate::common::{Config, Result};
use crate::testing::{default_suite, load_suite, SuiteOutcome, SuiteRunner};

/// Run the selected modes; returns whether every scenario passed
pub async fn dispatch(cli: Cli) -> Result<bool> {
    let config = resolve_config(&cli)?;

    let scenarios = match &cli.suite {
        Some(path) => load_suite(path)?,
        None => default_suite(),
    };

    tracing::debug!(
        "Server {} on port {}, {} scenarios",
        config.server.binary.display(),
        config.server.port,
        scenarios.len()
    );

    let runner = SuiteRunner::new(&config);
    let mut outcomes = Vec::new();
    for mode in cli.selected_modes() {
        outcomes.push(runner.run(mode, &scenarios).await);
        println!();
    }

    print_grand_summary(&outcomes);
    Ok(outcomes.iter().all(SuiteOutcome::success))
}

/// Load the config file and apply command-line overrides
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(server) = &cli.server {
        config.server.binary = server.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = &cli.scenarios {
        config.paths.scenarios_dir = dir.clone();
    }
    if let Some(dir) = &cli.work_dir {
        config.paths.work_dir = dir.clone();
    }
    Ok(config)
}

fn print_grand_summary(outcomes: &[SuiteOutcome]) {
    println!("{}", "Summary:".cyan());
    for outcome in outcomes {
        let status = if outcome.success() {
            "OK".green()
        } else {
            "FAILED".red()
        };
        println!(
            "  {:<10} {}/{} {}",
            outcome.mode.to_string(),
            outcome.passed(),
            outcome.total(),
            status
        );
    }

    if outcomes.iter().all(SuiteOutcome::success) {
        println!("{}", "ALL MODES OK".green().bold());
    } else {
        println!("{}", "FAILED".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("conformance.toml");
        std::fs::write(
            &file,
            "[server]\nport = 9000\nbinary = \"/opt/a\"\n[paths]\nwork_dir = \"/var/tmp\"\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "smtp-conformance",
            "--config",
            file.to_str().unwrap(),
            "--port",
            "9100",
        ]);
        let config = resolve_config(&cli).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.binary, PathBuf::from("/opt/a"));
        assert_eq!(config.paths.work_dir, PathBuf::from("/var/tmp"));
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let cli = Cli::parse_from(["smtp-conformance", "--config", "/nonexistent/c.toml"]);
        assert!(resolve_config(&cli).is_err());
    }
}
