//! SMTP conformance harness
//!
//! Drives a separately built SMTP server through scripted exchanges over a
//! raw socket, checks reply codes and the mailbox it writes, and can run the
//! server under a leak checker.

pub mod cli;
pub mod commands;
pub mod common;
pub mod server;
pub mod smtp;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Config, Error, Result};
pub use testing::{Mode, Scenario, ScenarioRunner, SuiteRunner};
