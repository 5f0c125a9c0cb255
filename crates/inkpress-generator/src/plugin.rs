//! Plugin loading on top of the [`HookRegistry`].
//!
//! A [`PluginResolver`] turns a plugin id into a fresh [`Plugin`] instance.
//! The [`PluginManager`] initialises it with its config table, validates the
//! hooks it declares and registers them. Unloading calls `destroy` and drops
//! every handler the plugin contributed.

use std::{collections::BTreeMap, sync::Arc};

use inkpress_core::Config;
use inkpress_parser::MarkdownExtension;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    external_links::ExternalLinksPlugin,
    hooks::{HookHandler, HookRegistry},
};

/// Plugin errors.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The resolver has no plugin with this id.
    #[error("plugin not found: {0}")]
    NotFound(String),

    /// `init` rejected the plugin's configuration.
    #[error("plugin '{plugin}' failed to initialise: {message}")]
    Init { plugin: String, message: String },

    /// A declared hook is malformed.
    #[error("plugin '{plugin}' declares an invalid hook '{hook}'")]
    InvalidHook { plugin: String, hook: String },

    /// A handler failed while running.
    #[error("{0}")]
    Handler(String),
}

/// Result type for plugin operations.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Handlers a plugin attaches to one hook.
pub enum HookSpec {
    One(HookHandler),
    Many(Vec<HookHandler>),
}

impl HookSpec {
    fn into_handlers(self) -> Vec<HookHandler> {
        match self {
            Self::One(handler) => vec![handler],
            Self::Many(handlers) => handlers,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::Many(handlers) if handlers.is_empty())
    }
}

impl std::fmt::Debug for HookSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::One(_) => f.write_str("HookSpec::One"),
            Self::Many(handlers) => write!(f, "HookSpec::Many({})", handlers.len()),
        }
    }
}

/// A build plugin. Every capability is optional.
pub trait Plugin: Send {
    fn id(&self) -> &str;

    /// Receive the `[plugins.config.<id>]` table.
    fn init(&mut self, _config: &toml::Table) -> Result<()> {
        Ok(())
    }

    /// Hooks to register, keyed by hook name.
    fn hooks(&self) -> Vec<(String, HookSpec)> {
        Vec::new()
    }

    fn destroy(&mut self) {}

    /// Block renderers added to the Markdown parser.
    fn markdown_extensions(&self) -> Vec<Arc<dyn MarkdownExtension>> {
        Vec::new()
    }
}

/// Produces a freshly constructed plugin for an id.
pub trait PluginResolver: Send + Sync {
    fn resolve(&self, id: &str) -> Option<Box<dyn Plugin>>;
}

type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Resolver backed by a table of factory functions.
pub struct BuiltinResolver {
    factories: BTreeMap<String, PluginFactory>,
}

impl BuiltinResolver {
    /// A resolver that knows the bundled plugins.
    pub fn new() -> Self {
        let mut resolver = Self::empty();
        resolver.register(ExternalLinksPlugin::ID, || {
            Box::new(ExternalLinksPlugin::default())
        });
        resolver
    }

    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, id: &str, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(id.to_string(), Box::new(factory));
    }

    #[must_use]
    pub fn with<F>(mut self, id: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.register(id, factory);
        self
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for BuiltinResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BuiltinResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinResolver")
            .field("plugins", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginResolver for BuiltinResolver {
    fn resolve(&self, id: &str) -> Option<Box<dyn Plugin>> {
        self.factories.get(id).map(|factory| factory())
    }
}

/// Snapshot of the loaded plugins and registered handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginStats {
    pub plugins: Vec<String>,
    /// Handler count per non-empty hook.
    pub handlers: BTreeMap<String, usize>,
}

/// Loads, unloads and reloads plugins against a shared registry.
pub struct PluginManager {
    registry: Arc<HookRegistry>,
    resolver: Arc<dyn PluginResolver>,
    loaded: Mutex<Vec<Box<dyn Plugin>>>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("registry", &self.registry)
            .field("loaded", &self.loaded_ids())
            .finish_non_exhaustive()
    }
}

impl PluginManager {
    pub fn new(registry: Arc<HookRegistry>, resolver: Arc<dyn PluginResolver>) -> Self {
        Self {
            registry,
            resolver,
            loaded: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    /// Load every plugin in `plugins.order`. Failures are logged and the
    /// remaining plugins still load. Returns how many loaded.
    pub fn load_all(&self, config: &Config) -> usize {
        let mut loaded = 0;
        for id in &config.plugins.order {
            match self.load(id, config) {
                Ok(()) => loaded += 1,
                Err(e) => error!(plugin = %id, error = %e, "failed to load plugin"),
            }
        }
        info!(loaded, requested = config.plugins.order.len(), "plugins loaded");
        loaded
    }

    /// Resolve, initialise and register one plugin. A plugin already loaded
    /// under the same id is unloaded first.
    pub fn load(&self, id: &str, config: &Config) -> Result<()> {
        let mut plugin = self
            .resolver
            .resolve(id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;

        plugin.init(&config.plugin_config(id))?;

        let hooks = plugin.hooks();
        if let Some((hook, _)) = hooks
            .iter()
            .find(|(hook, spec)| !valid_hook_name(hook) || spec.is_empty())
        {
            let hook = hook.clone();
            plugin.destroy();
            return Err(PluginError::InvalidHook {
                plugin: id.to_string(),
                hook,
            });
        }

        self.unload(id);
        for (hook, spec) in hooks {
            for handler in spec.into_handlers() {
                self.registry.register(&hook, id, handler);
            }
        }

        debug!(plugin = id, "plugin loaded");
        self.loaded.lock().push(plugin);
        Ok(())
    }

    /// Destroy a plugin and remove its handlers. Returns whether it was
    /// loaded.
    pub fn unload(&self, id: &str) -> bool {
        let removed = {
            let mut loaded = self.loaded.lock();
            loaded
                .iter()
                .position(|p| p.id() == id)
                .map(|index| loaded.remove(index))
        };

        match removed {
            Some(mut plugin) => {
                plugin.destroy();
                self.registry.unregister(id);
                debug!(plugin = id, "plugin unloaded");
                true
            }
            None => false,
        }
    }

    /// Unload then load a fresh instance from the resolver.
    pub fn reload(&self, id: &str, config: &Config) -> Result<()> {
        self.unload(id);
        self.load(id, config)
    }

    /// Unload every plugin, in reverse load order.
    pub fn unload_all(&self) {
        for id in self.loaded_ids().iter().rev() {
            self.unload(id);
        }
    }

    pub fn loaded_ids(&self) -> Vec<String> {
        self.loaded.lock().iter().map(|p| p.id().to_string()).collect()
    }

    pub fn stats(&self) -> PluginStats {
        PluginStats {
            plugins: self.loaded_ids(),
            handlers: self.registry.counts(),
        }
    }

    /// Markdown extensions from every loaded plugin, in load order.
    pub fn markdown_extensions(&self) -> Vec<Arc<dyn MarkdownExtension>> {
        self.loaded
            .lock()
            .iter()
            .flat_map(|p| p.markdown_extensions())
            .collect()
    }
}

fn valid_hook_name(hook: &str) -> bool {
    !hook.is_empty() && !hook.chars().any(char::is_whitespace)
}
