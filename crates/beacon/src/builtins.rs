//! Sources that ship with the launcher.

use beacon_plugins::registry::PluginRegistry;
use beacon_plugins::{Activation, SearchResult, Source};
use tracing::{info, warn};

const BUILTINS_TARGET: &str = "beacon::builtins";

/// Keyword that lists installed plugins.
pub const INSTALLED_PLUGINS_TRIGGER: &str = "plugins";

/// Lists registry entries; picking one uninstalls it.
///
/// The removal applies to the registry straight away and to the active
/// source set on the next reload.
#[derive(Debug, Clone)]
pub struct InstalledPlugins {
    registry: PluginRegistry,
}

impl InstalledPlugins {
    /// Lists the plugins in `registry`.
    #[must_use]
    pub const fn new(registry: PluginRegistry) -> Self {
        Self { registry }
    }
}

impl Source for InstalledPlugins {
    fn id(&self) -> &str {
        "installed-plugins"
    }

    fn name(&self) -> &str {
        "Installed plugins"
    }

    fn description(&self) -> Option<&str> {
        Some("Lists installed plugins; pick one to uninstall it")
    }

    fn trigger(&self) -> Option<&str> {
        Some(INSTALLED_PLUGINS_TRIGGER)
    }

    fn search(&self, query: &str) -> Vec<SearchResult> {
        let needle = query.trim().to_lowercase();
        self.registry
            .read()
            .plugins()
            .iter()
            .filter(|entry| entry.url().to_lowercase().contains(&needle))
            .map(|entry| {
                let kinds: Vec<&str> = entry
                    .permissions()
                    .granted_kinds()
                    .map(|kind| kind.as_str())
                    .collect();
                let granted = if kinds.is_empty() {
                    "no permissions".to_owned()
                } else {
                    kinds.join(", ")
                };
                let registry = self.registry.clone();
                let url = entry.url().to_owned();
                SearchResult::new(entry.url(), format!("Uninstall ({granted})"), 1.0)
                    .with_activation(Activation::new(move || uninstall(&registry, &url)))
            })
            .collect()
    }
}

fn uninstall(registry: &PluginRegistry, url: &str) {
    match registry.uninstall(url) {
        Ok(true) => info!(target: BUILTINS_TARGET, locator = url, "plugin uninstalled"),
        Ok(false) => info!(target: BUILTINS_TARGET, locator = url, "plugin already gone"),
        Err(error) => warn!(target: BUILTINS_TARGET, locator = url, %error, "uninstall failed"),
    }
}
