//! Suite execution and aggregation
//!
//! Scenarios run strictly one after another: they share the server port and
//! scenario-named artifact paths.

use std::fmt;

use clap::ValueEnum;
use colored::Colorize;

use crate::common::Config;
use crate::server::Instrumentation;
use crate::smtp::AddressFamily;

use super::runner::{ScenarioOutcome, ScenarioRunner};
use super::scenario::Scenario;

/// Transport/instrumentation mode for a suite run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Plain server, IPv4 loopback
    Ipv4,
    /// Plain server, IPv6 loopback
    Ipv6,
    /// Server under the leak checker, IPv4 loopback
    Valgrind,
}

impl Mode {
    /// All modes, in the order they run when none are selected
    pub const ALL: [Mode; 3] = [Mode::Ipv4, Mode::Ipv6, Mode::Valgrind];

    pub fn family(self) -> AddressFamily {
        match self {
            Mode::Ipv6 => AddressFamily::Ipv6,
            Mode::Ipv4 | Mode::Valgrind => AddressFamily::Ipv4,
        }
    }

    pub fn instrumentation(self) -> Instrumentation {
        match self {
            Mode::Valgrind => Instrumentation::LeakChecked,
            Mode::Ipv4 | Mode::Ipv6 => Instrumentation::Plain,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Ipv4 => "IPV4",
            Mode::Ipv6 => "IPV6",
            Mode::Valgrind => "Valgrind",
        };
        f.write_str(s)
    }
}

/// Aggregated results of one suite run
#[derive(Debug, Clone)]
pub struct SuiteOutcome {
    pub mode: Mode,
    pub results: Vec<ScenarioOutcome>,
}

impl SuiteOutcome {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

const RULE_WIDTH: usize = 24;

/// Runs an ordered list of scenarios under one mode
pub struct SuiteRunner<'a> {
    runner: ScenarioRunner<'a>,
}

impl<'a> SuiteRunner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            runner: ScenarioRunner::new(config),
        }
    }

    pub async fn run(&self, mode: Mode, scenarios: &[Scenario]) -> SuiteOutcome {
        println!("{}", mode.to_string().cyan().bold());
        println!("{}", "-".repeat(RULE_WIDTH));

        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            results.push(self.runner.run(scenario, mode).await);
        }

        let outcome = SuiteOutcome { mode, results };
        print_summary(&outcome);
        outcome
    }
}

fn print_summary(outcome: &SuiteOutcome) {
    println!("{}", "-".repeat(RULE_WIDTH));
    println!("PASSED {}/{} TESTS", outcome.passed(), outcome.total());
    if outcome.success() {
        println!("{}", "OK".green().bold());
    } else {
        println!("{}", format!("{} TESTS FAILED", outcome.failed()).red().bold());
        for result in outcome.results.iter().filter(|r| !r.passed) {
            let stage = result
                .failure
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("  {} {} ({})", "✗".red(), result.name, stage.dimmed());
        }
    }
}
