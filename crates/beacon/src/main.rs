//! Binary entry point for the beacon launcher.

use std::process::ExitCode;

#[expect(clippy::print_stderr, reason = "telemetry may not be installed yet")]
fn main() -> ExitCode {
    match beacon::run_launcher() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("beacon: {error}");
            ExitCode::FAILURE
        }
    }
}
