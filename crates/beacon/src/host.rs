//! Wires configuration, the sandbox launcher, and terminal services into a
//! plugin loader.

use std::sync::Arc;

use beacon_config::Config;
use beacon_plugins::registry::PluginRegistry;
use beacon_plugins::{
    CageLauncher, HostServices, LoadedPlugins, PermissionPrompt, PluginLoader, SandboxLauncher,
    Source,
};

use crate::builtins::InstalledPlugins;
use crate::health::{HealthReporter, StructuredHealthReporter};

/// Everything needed to (re)build the active plugin set.
pub struct Host {
    config: Config,
    registry: PluginRegistry,
    launcher: Arc<dyn SandboxLauncher>,
    prompt: Arc<dyn PermissionPrompt>,
    services: Arc<dyn HostServices>,
    reporter: Arc<dyn HealthReporter>,
}

impl Host {
    /// Builds a host that starts plugins through the configured
    /// `beacon-cage`.
    #[must_use]
    pub fn new(
        config: Config,
        prompt: Arc<dyn PermissionPrompt>,
        services: Arc<dyn HostServices>,
    ) -> Self {
        let launcher = CageLauncher::new(config.cage_program().to_path_buf())
            .with_remote_runner(config.remote_runner().map(ToOwned::to_owned));
        Self {
            registry: PluginRegistry::open(config.registry_path().to_path_buf()),
            config,
            launcher: Arc::new(launcher),
            prompt,
            services,
            reporter: Arc::new(StructuredHealthReporter::new()),
        }
    }

    /// Replaces the sandbox launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn SandboxLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replaces the lifecycle reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The plugin registry.
    #[must_use]
    pub const fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Loads the built-in sources and every installed plugin.
    #[must_use]
    pub fn load(&self) -> LoadedPlugins {
        let builtins: Vec<Arc<dyn Source>> =
            vec![Arc::new(InstalledPlugins::new(self.registry.clone()))];
        let loaded = PluginLoader::new(
            self.registry.clone(),
            Arc::clone(&self.launcher),
            Arc::clone(&self.prompt),
        )
        .with_services(Arc::clone(&self.services))
        .with_timeouts(self.config.plugin_timeouts())
        .with_debounce(self.config.network_debounce())
        .load(builtins);
        self.reporter.plugins_loaded(&loaded);
        loaded
    }
}
