//! Runs the launcher from bootstrap to the end of the shell session.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::bootstrap::{BootstrapError, ConfigLoader, bootstrap_with};
use crate::clipboard::TerminalClipboard;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::host::Host;
use crate::prompt::TerminalPrompt;
use crate::shell::Shell;
use crate::terminal::Terminal;
use crate::SystemConfigLoader;

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Errors that end the launcher.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration or telemetry could not be set up.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The terminal failed.
    #[error("terminal I/O failed: {source}")]
    Terminal {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Runs the launcher on the process's terminal.
///
/// # Errors
///
/// Returns a [`LaunchError`] when bootstrap or the terminal fails.
pub fn run_launcher() -> Result<(), LaunchError> {
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    run_launcher_with(&SystemConfigLoader, reporter, Terminal::stdio(), |host| host)
}

/// Runs the launcher with injected collaborators; `customise` may swap
/// parts of the host before the first load.
pub(crate) fn run_launcher_with<F>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    terminal: Terminal,
    customise: F,
) -> Result<(), LaunchError>
where
    F: FnOnce(Host) -> Host,
{
    let config = bootstrap_with(loader, &reporter)?.into_config();
    info!(target: PROCESS_TARGET, registry = %config.registry_path().display(), "starting launcher");

    let host = Host::new(
        config,
        Arc::new(TerminalPrompt::new(terminal.clone())),
        Arc::new(TerminalClipboard::new(terminal.clone())),
    )
    .with_reporter(reporter);
    let mut shell = Shell::start(customise(host), terminal);
    shell
        .run()
        .map_err(|source| LaunchError::Terminal { source })?;
    info!(target: PROCESS_TARGET, "launcher stopped");
    Ok(())
}
