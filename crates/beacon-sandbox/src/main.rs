//! Binary entrypoint for the `beacon-cage` sandbox trampoline.

use std::io::{self, Write};
use std::process::ExitCode;

use beacon_sandbox::{CageArgs, CageInvocation};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Exit code used when the cage itself fails before the unit runs.
const CAGE_FAILURE: u8 = 125;

fn main() -> ExitCode {
    // The fmt subscriber writes synchronously, so no thread is started
    // before the sandbox activates.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_env("BEACON_CAGE_LOG"))
        .init();

    let outcome = CageInvocation::try_from(CageArgs::parse()).and_then(CageInvocation::run);
    match outcome {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(CAGE_FAILURE)),
        Err(error) => {
            writeln!(io::stderr().lock(), "beacon-cage: {error}").ok();
            ExitCode::from(CAGE_FAILURE)
        }
    }
}
