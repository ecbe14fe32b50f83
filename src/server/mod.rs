//! Control of the server under test

mod process;

pub use process::{
    command_line, server_args, Instrumentation, LaunchSpec, ServerProcess, ServerState,
    StopOutcome, LEAK_SENTINEL_EXIT_CODE,
};
