//! Conformance test runner
//!
//! Reads line-oriented scenario scripts, replays them against the server
//! under test and checks the mailbox it leaves behind.

mod compare;
mod runner;
mod scenario;
pub mod script;
mod suite;

pub use compare::{DirectoryComparator, TreeMismatch, DEFAULT_MARKER};
pub use runner::{FailureStage, ScenarioOutcome, ScenarioRunner};
pub use scenario::{default_suite, load_suite, parse_suite, Scenario, ScenarioPaths};
pub use script::Directive;
pub use suite::{Mode, SuiteOutcome, SuiteRunner};
