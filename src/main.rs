//! SMTP conformance harness
//!
//! Runs the scenario suite against the server under test in each selected
//! mode (`ipv4`, `ipv6`, `valgrind`; all three when none are given).

use clap::Parser;
use conformance::{cli, commands::Cli, common::logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_cli(cli.verbose);

    match cli::dispatch(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
