//! Launcher bootstrap: configuration and telemetry.

use std::sync::Arc;

use beacon_config::Config;
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the launcher configuration.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a prepared configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader(pub Config);

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.0.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Result of a successful bootstrap.
#[derive(Debug)]
pub struct Bootstrapped {
    config: Config,
    telemetry: TelemetryHandle,
}

impl Bootstrapped {
    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Consumes the bootstrap result, keeping the configuration.
    #[must_use]
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }
}

/// Loads configuration and initialises telemetry.
///
/// # Errors
///
/// Returns a [`BootstrapError`] naming the stage that failed; `reporter` is
/// told about the failure before it is returned.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
) -> Result<Bootstrapped, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let failure = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&failure);
            return Err(failure);
        }
    };

    let handle = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let failure = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&failure);
            return Err(failure);
        }
    };

    reporter.bootstrap_succeeded(&config);
    Ok(Bootstrapped {
        config,
        telemetry: handle,
    })
}
