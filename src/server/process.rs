//! Server-under-test subprocess lifecycle
//!
//! Shutdown is two-phase: interrupt, then wait out a grace period, then kill.
//! A kill is always a failure. In leak-checked mode the wrapper's exit code
//! is also inspected for the leak sentinel.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::common::config::{LeakCheckConfig, ServerConfig};
use crate::common::{Error, Result};

/// Exit status the leak checker uses to report a leak
pub const LEAK_SENTINEL_EXIT_CODE: i32 = 77;

/// Whether the server runs bare or under the leak checker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrumentation {
    Plain,
    LeakChecked,
}

/// Per-scenario launch parameters
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub log_path: PathBuf,
    pub mail_dir: PathBuf,
}

/// Lifecycle state of the server process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Stopping,
    Exited,
    Killed,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Exited => "exited",
            ServerState::Killed => "killed",
        };
        f.write_str(s)
    }
}

/// How the server ended after `stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the grace period; `None` when terminated by a signal
    Exited(Option<i32>),
    /// Did not exit in time and was killed
    Killed,
}

impl StopOutcome {
    /// Judge the outcome under the given instrumentation
    ///
    /// Plain runs never look at the exit code.
    pub fn verdict(self, instrumentation: Instrumentation, grace: Duration) -> Result<()> {
        match (self, instrumentation) {
            (StopOutcome::Killed, _) => Err(Error::StopHang(grace.as_secs())),
            (StopOutcome::Exited(Some(LEAK_SENTINEL_EXIT_CODE)), Instrumentation::LeakChecked) => {
                Err(Error::LeakDetected(LEAK_SENTINEL_EXIT_CODE))
            }
            (StopOutcome::Exited(_), _) => Ok(()),
        }
    }
}

/// Arguments passed to the server binary
pub fn server_args(server: &ServerConfig, launch: &LaunchSpec) -> Vec<String> {
    let mut args = vec![
        "-d".to_string(),
        server.bind_address.clone(),
        "-p".to_string(),
        server.port.to_string(),
        "-l".to_string(),
        launch.log_path.to_string_lossy().into_owned(),
        "-m".to_string(),
        launch.mail_dir.to_string_lossy().into_owned(),
        "-r".to_string(),
        "-n".to_string(),
        server.hostname.clone(),
    ];
    args.extend(server.extra_args.iter().cloned());
    args
}

/// Full command line (program, args) for the given instrumentation
pub fn command_line(
    server: &ServerConfig,
    leak_check: &LeakCheckConfig,
    launch: &LaunchSpec,
    instrumentation: Instrumentation,
) -> (PathBuf, Vec<String>) {
    let args = server_args(server, launch);
    match instrumentation {
        Instrumentation::Plain => (server.binary.clone(), args),
        Instrumentation::LeakChecked => {
            let mut wrapped = leak_check.args.clone();
            wrapped.push(server.binary.to_string_lossy().into_owned());
            wrapped.extend(args);
            (leak_check.resolve_program(), wrapped)
        }
    }
}

/// Handle on the running server
pub struct ServerProcess {
    child: Child,
    instrumentation: Instrumentation,
    state: ServerState,
}

impl ServerProcess {
    /// Launch the server
    pub fn start(
        server: &ServerConfig,
        leak_check: &LeakCheckConfig,
        launch: &LaunchSpec,
        instrumentation: Instrumentation,
    ) -> Result<Self> {
        let (program, args) = command_line(server, leak_check, launch, instrumentation);
        tracing::debug!("Starting server: {} {}", program.display(), args.join(" "));

        let mut cmd = Command::new(&program);
        cmd.args(&args).stdin(Stdio::null()).kill_on_drop(true);
        Self::spawn(cmd, &program, instrumentation)
    }

    /// Spawn an arbitrary command as the server
    pub fn spawn(
        mut cmd: Command,
        program: &Path,
        instrumentation: Instrumentation,
    ) -> Result<Self> {
        let child = cmd.spawn().map_err(|source| Error::ServerSpawn {
            program: program.display().to_string(),
            source,
        })?;

        Ok(Self {
            child,
            instrumentation,
            state: ServerState::Running,
        })
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// OS process id; `None` once the process has been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Interrupt, wait up to `grace`, kill on timeout, and judge the result
    pub async fn stop(&mut self, grace: Duration) -> Result<()> {
        let outcome = self.shutdown(grace).await?;
        outcome.verdict(self.instrumentation, grace)
    }

    /// Interrupt, wait up to `grace`, kill on timeout
    pub async fn shutdown(&mut self, grace: Duration) -> Result<StopOutcome> {
        if self.state != ServerState::Running {
            return Err(Error::ServerNotRunning(self.state.to_string()));
        }
        self.state = ServerState::Stopping;

        self.interrupt();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                self.state = ServerState::Exited;
                tracing::debug!("Server exited with {}", status);
                Ok(StopOutcome::Exited(status.code()))
            }
            Err(_) => {
                tracing::warn!("Server hung on exit, killing");
                self.child.kill().await?;
                self.state = ServerState::Killed;
                Ok(StopOutcome::Killed)
            }
        }
    }

    #[cfg(unix)]
    fn interrupt(&mut self) {
        // The pid is gone once the child has been reaped.
        if let Some(pid) = self.child.id() {
            let result = unsafe { libc::kill(pid as i32, libc::SIGINT) };
            if result != 0 {
                tracing::debug!(
                    "SIGINT to {} failed: {}",
                    pid,
                    std::io::Error::last_os_error()
                );
            }
        }
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) {
        // No console interrupt for a piped child here; the grace period
        // runs out and the process is killed.
        tracing::debug!("Interrupt not supported on this platform");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch() -> LaunchSpec {
        LaunchSpec {
            log_path: PathBuf::from("./can_quit-log"),
            mail_dir: PathBuf::from("./can_quit-mail/"),
        }
    }

    #[test]
    fn test_plain_command_line() {
        let (program, args) = command_line(
            &ServerConfig::default(),
            &LeakCheckConfig::default(),
            &launch(),
            Instrumentation::Plain,
        );

        assert_eq!(program, PathBuf::from("../smtpserver"));
        assert_eq!(
            args,
            vec![
                "-d", "127.0.0.1", "-p", "7548", "-l", "./can_quit-log", "-m",
                "./can_quit-mail/", "-r", "-n", "mysmtp.pvs.bmstu",
            ]
        );
    }

    #[test]
    fn test_leak_checked_command_line_wraps_server() {
        let leak = LeakCheckConfig {
            program: PathBuf::from("/usr/bin/valgrind"),
            ..LeakCheckConfig::default()
        };
        let (program, args) = command_line(
            &ServerConfig::default(),
            &leak,
            &launch(),
            Instrumentation::LeakChecked,
        );

        assert_eq!(program, PathBuf::from("/usr/bin/valgrind"));
        assert_eq!(
            &args[..4],
            &[
                "--leak-check=full",
                "--child-silent-after-fork=yes",
                "--error-exitcode=77",
                "../smtpserver",
            ]
        );
        assert_eq!(args.last().map(String::as_str), Some("mysmtp.pvs.bmstu"));
    }

    #[test]
    fn test_extra_args_follow_fixed_flags() {
        let server = ServerConfig {
            extra_args: vec!["-t".to_string(), "4".to_string()],
            ..ServerConfig::default()
        };
        let args = server_args(&server, &launch());
        assert_eq!(&args[args.len() - 2..], &["-t", "4"]);
    }

    #[test]
    fn test_verdicts() {
        let grace = Duration::from_secs(2);
        assert!(StopOutcome::Exited(Some(0))
            .verdict(Instrumentation::Plain, grace)
            .is_ok());
        // Plain mode ignores the exit code entirely.
        assert!(StopOutcome::Exited(Some(77))
            .verdict(Instrumentation::Plain, grace)
            .is_ok());
        assert!(StopOutcome::Exited(None)
            .verdict(Instrumentation::LeakChecked, grace)
            .is_ok());
        assert!(StopOutcome::Exited(Some(1))
            .verdict(Instrumentation::LeakChecked, grace)
            .is_ok());
        assert!(matches!(
            StopOutcome::Exited(Some(77)).verdict(Instrumentation::LeakChecked, grace),
            Err(Error::LeakDetected(77))
        ));
        assert!(matches!(
            StopOutcome::Killed.verdict(Instrumentation::Plain, grace),
            Err(Error::StopHang(2))
        ));
        assert!(matches!(
            StopOutcome::Killed.verdict(Instrumentation::LeakChecked, grace),
            Err(Error::StopHang(_))
        ));
    }

    #[cfg(unix)]
    fn shell(script: &str, instrumentation: Instrumentation) -> ServerProcess {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script).kill_on_drop(true);
        ServerProcess::spawn(cmd, Path::new("sh"), instrumentation).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_graceful_stop() {
        let mut server = shell(
            "trap 'exit 0' INT; while :; do sleep 0.05; done",
            Instrumentation::Plain,
        );
        assert_eq!(server.state(), ServerState::Running);
        tokio::time::sleep(Duration::from_millis(100)).await;

        server.stop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(server.state(), ServerState::Exited);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sentinel_exit_is_a_leak() {
        let mut server = shell(
            "trap 'exit 77' INT; while :; do sleep 0.05; done",
            Instrumentation::LeakChecked,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = server.stop(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::LeakDetected(77)));
        assert_eq!(server.state(), ServerState::Exited);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_server_is_killed() {
        let mut server = shell(
            "trap '' INT; while :; do sleep 0.05; done",
            Instrumentation::Plain,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        let outcome = server.shutdown(Duration::from_millis(300)).await.unwrap();
        assert_eq!(outcome, StopOutcome::Killed);
        assert_eq!(server.state(), ServerState::Killed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_twice_is_rejected() {
        let mut server = shell("trap 'exit 0' INT; while :; do sleep 0.05; done", Instrumentation::Plain);
        tokio::time::sleep(Duration::from_millis(100)).await;

        server.stop(Duration::from_secs(2)).await.unwrap();
        let err = server.stop(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, Error::ServerNotRunning(ref state) if state == "exited"));
        assert!(!err.to_string().contains("Configuration"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let server = ServerConfig {
            binary: PathBuf::from("/nonexistent/smtpserver"),
            ..ServerConfig::default()
        };
        let result = ServerProcess::start(
            &server,
            &LeakCheckConfig::default(),
            &launch(),
            Instrumentation::Plain,
        );
        assert!(matches!(result, Err(Error::ServerSpawn { .. })));
    }
}
