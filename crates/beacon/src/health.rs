//! Structured health reporting for launcher lifecycle events.

use std::sync::Arc;

use beacon_config::Config;
use beacon_plugins::LoadedPlugins;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = "beacon::health";

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked each time the plugin set has been (re)loaded.
    fn plugins_loaded(&self, loaded: &LoadedPlugins);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn plugins_loaded(&self, loaded: &LoadedPlugins) {
        (**self).plugins_loaded(loaded);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting launcher bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            registry = %config.registry_path().display(),
            cage = %config.cage_program().display(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "launcher bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "launcher bootstrap failed"
        );
    }

    fn plugins_loaded(&self, loaded: &LoadedPlugins) {
        let skipped = loaded
            .outcomes
            .iter()
            .filter(|outcome| outcome.error.is_some())
            .count();
        for outcome in &loaded.outcomes {
            tracing::debug!(
                target: HEALTH_TARGET,
                event = "plugin_outcome",
                locator = %outcome.locator,
                state = %outcome.state,
            );
        }
        tracing::info!(
            target: HEALTH_TARGET,
            event = "plugins_loaded",
            sources = loaded.sources.len(),
            skipped,
            "plugin set loaded"
        );
    }
}
