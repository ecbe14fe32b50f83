//! Scenario runner implementation
//!
//! Runs one scenario end to end: clean artifacts, start the server, replay
//! the script, stop the server, then optionally compare the mailbox against
//! the reference tree. Stage results are combined explicitly; a failure in
//! one stage never skips stopping the server.

use std::fmt;

use colored::Colorize;

use crate::common::{paths, Config, Error, Result};
use crate::server::{LaunchSpec, ServerProcess};
use crate::smtp::Session;

use super::compare::DirectoryComparator;
use super::scenario::{Scenario, ScenarioPaths};
use super::script;
use super::suite::Mode;

/// Stage at which a scenario failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Harness-side problem: artifacts, script, or server launch
    Setup,
    Connect,
    ProtocolMismatch,
    Timeout,
    StopHang,
    LeakDetected,
    DirectoryMismatch,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Setup => "setup",
            FailureStage::Connect => "connect",
            FailureStage::ProtocolMismatch => "protocol mismatch",
            FailureStage::Timeout => "timeout",
            FailureStage::StopHang => "server stop hang",
            FailureStage::LeakDetected => "leak detected",
            FailureStage::DirectoryMismatch => "directory mismatch",
        };
        f.write_str(s)
    }
}

/// Result of a scenario run
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: String,
    pub passed: bool,
    /// First stage that failed
    pub failure: Option<FailureStage>,
    /// Every error recorded during the run, in order
    pub errors: Vec<String>,
}

impl ScenarioOutcome {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            failure: None,
            errors: Vec::new(),
        }
    }

    /// Fold a stage result into the outcome (logical AND)
    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            let stage = e.stage();
            tracing::error!(scenario = %self.name, stage = %stage, "{}", e);
            self.passed = false;
            if self.failure.is_none() {
                self.failure = Some(stage);
            }
            self.errors.push(e.to_string());
        }
    }
}

/// Runs single scenarios against the configured server
pub struct ScenarioRunner<'a> {
    config: &'a Config,
    comparator: DirectoryComparator,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            comparator: DirectoryComparator::default(),
        }
    }

    /// Run one scenario under `mode`
    ///
    /// Artifacts are removed on success and left in place on failure.
    pub async fn run(&self, scenario: &Scenario, mode: Mode) -> ScenarioOutcome {
        println!("{} {}: START", "SCENARIO".blue().bold(), scenario.name.white().bold());

        let artifacts = ScenarioPaths::resolve(self.config, scenario);
        let mut outcome = ScenarioOutcome::new(&scenario.name);

        outcome.record(prepare(&artifacts));
        if outcome.passed {
            self.exchange(&artifacts, mode, &mut outcome).await;
            if !outcome.passed {
                println!("{} {}: COMMAND FAIL", "SCENARIO".blue().bold(), scenario.name);
            }
        }

        if outcome.passed {
            if let Some(reference) = &artifacts.reference {
                outcome.record(
                    self.comparator
                        .compare(&artifacts.mail_dir, reference)
                        .map_err(|m| Error::DirectoryMismatch(m.to_string())),
                );
                if !outcome.passed {
                    println!(
                        "{} {}: DIRECTORY COMPARISON FAIL",
                        "SCENARIO".blue().bold(),
                        scenario.name
                    );
                }
            }
        }

        if outcome.passed {
            println!("{} {}: {}", "SCENARIO".blue().bold(), scenario.name, "SUCCESS".green());
            cleanup(&artifacts);
        } else {
            println!("{} {}: {}", "SCENARIO".blue().bold(), scenario.name, "FAIL".red());
            tracing::info!(
                scenario = %scenario.name,
                "Artifacts kept: {} {}",
                artifacts.log.display(),
                artifacts.mail_dir.display()
            );
        }

        outcome
    }

    /// Start, connect, replay, stop
    async fn exchange(&self, artifacts: &ScenarioPaths, mode: Mode, outcome: &mut ScenarioOutcome) {
        let instrumentation = mode.instrumentation();
        let timeouts = &self.config.timeouts;
        let grace = timeouts.stop_grace(instrumentation);

        let launch = LaunchSpec {
            log_path: artifacts.log.clone(),
            mail_dir: artifacts.mail_dir.clone(),
        };
        let mut server = match ServerProcess::start(
            &self.config.server,
            &self.config.leak_check,
            &launch,
            instrumentation,
        ) {
            Ok(server) => server,
            Err(e) => return outcome.record(Err(e)),
        };
        tracing::debug!(pid = ?server.id(), mode = %mode, "Server started");

        tokio::time::sleep(timeouts.startup_delay(instrumentation)).await;

        let session =
            match Session::connect(mode.family(), self.config.server.port, timeouts.receive()).await
            {
                Ok(session) => session,
                Err(e) => {
                    outcome.record(Err(e));
                    outcome.record(server.stop(grace).await);
                    tracing::debug!(state = %server.state(), "Server stopped");
                    return;
                }
            };

        // A parse failure drops the session, which closes the connection
        // before the server is stopped.
        let exchanged = match script::parse_file(&artifacts.script) {
            Ok(directives) => {
                tracing::debug!("Replaying {} directives", directives.len());
                session.run(&directives).await
            }
            Err(e) => Err(e),
        };
        outcome.record(exchanged);
        outcome.record(server.stop(grace).await);
        tracing::debug!(state = %server.state(), "Server stopped");
    }
}

/// Remove leftovers of a previous run
fn prepare(artifacts: &ScenarioPaths) -> Result<()> {
    paths::remove_file_if_exists(&artifacts.log)?;
    paths::remove_dir_if_exists(&artifacts.mail_dir)?;
    Ok(())
}

fn cleanup(artifacts: &ScenarioPaths) {
    if let Err(e) = paths::remove_file_if_exists(&artifacts.log) {
        tracing::warn!("Failed to remove {}: {}", artifacts.log.display(), e);
    }
    if let Err(e) = paths::remove_dir_if_exists(&artifacts.mail_dir) {
        tracing::warn!("Failed to remove {}: {}", artifacts.mail_dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_first_stage() {
        let mut outcome = ScenarioOutcome::new("x");
        outcome.record(Ok(()));
        assert!(outcome.passed);

        outcome.record(Err(Error::protocol_mismatch("221", "500")));
        outcome.record(Err(Error::StopHang(2)));
        assert!(!outcome.passed);
        assert_eq!(outcome.failure, Some(FailureStage::ProtocolMismatch));
        assert_eq!(outcome.errors.len(), 2);

        // A later success does not flip the result back.
        outcome.record(Ok(()));
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn test_missing_server_binary_is_setup_failure() {
        let work = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.binary = work.path().join("no-such-server");
        config.paths.work_dir = work.path().to_path_buf();
        config.paths.scenarios_dir = work.path().to_path_buf();

        // Stale artifacts from an earlier run must be gone even though the
        // scenario fails before the server starts.
        std::fs::write(work.path().join("starts-log"), "old").unwrap();
        std::fs::create_dir_all(work.path().join("starts-mail").join("cur")).unwrap();

        let outcome = ScenarioRunner::new(&config)
            .run(&Scenario::new("starts"), Mode::Ipv4)
            .await;

        assert!(!outcome.passed);
        assert_eq!(outcome.failure, Some(FailureStage::Setup));
        assert!(!work.path().join("starts-log").exists());
        assert!(!work.path().join("starts-mail").exists());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(FailureStage::LeakDetected.to_string(), "leak detected");
        assert_eq!(FailureStage::DirectoryMismatch.to_string(), "directory mismatch");
    }
}
