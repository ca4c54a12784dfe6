use std::collections::HashMap;
use std::sync::Arc;

use fore_core::config::PlatformsConfig;
use tracing::info;

use crate::adapter::PlatformAdapter;
use crate::dry_run::DryRunAdapter;
use crate::webhook::WebhookAdapter;

/// Platform adapters keyed by [`PlatformAdapter::name`].
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Build every adapter named in the `[platforms]` config section.
    ///
    /// Webhook entries are registered after dry-run ones and replace them on a
    /// name clash.
    pub fn from_config(cfg: &PlatformsConfig) -> Self {
        let mut registry = Self::new();
        for name in &cfg.dry_run {
            registry.register(Arc::new(DryRunAdapter::new(name.clone())));
        }
        for hook in &cfg.webhook {
            registry.register(Arc::new(WebhookAdapter::new(hook)));
        }
        registry
    }

    /// Register an adapter. An existing adapter with the same name is replaced.
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        let name = adapter.name().to_string();
        info!(platform = %name, "registering platform adapter");
        self.adapters.insert(name, adapter);
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(platform).cloned()
    }

    /// Registered platform names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
