//! Named extension points for the build pipeline.
//!
//! Each hook holds an ordered list of handlers. Invoking a hook folds a
//! [`HookValue`] through the handlers in registration order; a handler may
//! replace the value or leave it untouched. A failing or panicking handler
//! is logged and skipped, and the chain continues with the last good value.

use std::{
    collections::BTreeMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use inkpress_core::{Config, Document};
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::{
    build::BuildReport,
    collector::ScanResult,
    page::RenderedPage,
    plugin::PluginError,
};

pub const BEFORE_BUILD: &str = "before:build";
pub const AFTER_SCAN: &str = "after:scan";
pub const BEFORE_RENDER: &str = "before:render";
pub const AFTER_RENDER: &str = "after:render";
pub const BEFORE_WRITE: &str = "before:write";
pub const AFTER_BUILD: &str = "after:build";
pub const DEV_RELOAD: &str = "dev:reload";

/// Hooks that exist on every registry, even without handlers.
pub const HOOK_NAMES: &[&str] = &[
    BEFORE_BUILD,
    AFTER_SCAN,
    BEFORE_RENDER,
    AFTER_RENDER,
    BEFORE_WRITE,
    AFTER_BUILD,
    DEV_RELOAD,
];

/// The value threaded through a hook chain.
#[derive(Debug, Clone, Default)]
pub enum HookValue {
    #[default]
    None,
    /// Template data (`before:render`).
    Json(serde_json::Value),
    /// Rendered page HTML (`after:render`).
    Html(String),
    /// Scan output (`after:scan`).
    Scan(ScanResult),
    /// Every page about to be written (`before:write`).
    Pages(Vec<RenderedPage>),
    /// Final build summary (`after:build`).
    Report(BuildReport),
}

impl HookValue {
    /// Variant name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Json(_) => "json",
            Self::Html(_) => "html",
            Self::Scan(_) => "scan",
            Self::Pages(_) => "pages",
            Self::Report(_) => "report",
        }
    }

    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_html(self) -> Option<String> {
        match self {
            Self::Html(html) => Some(html),
            _ => None,
        }
    }

    pub fn into_scan(self) -> Option<ScanResult> {
        match self {
            Self::Scan(scan) => Some(scan),
            _ => None,
        }
    }

    pub fn into_pages(self) -> Option<Vec<RenderedPage>> {
        match self {
            Self::Pages(pages) => Some(pages),
            _ => None,
        }
    }

    pub fn into_report(self) -> Option<BuildReport> {
        match self {
            Self::Report(report) => Some(report),
            _ => None,
        }
    }
}

/// Fixed arguments passed to every handler alongside the value.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub hook: &'a str,
    pub config: &'a Config,
    /// The document being rendered, for per-document hooks.
    pub document: Option<&'a Document>,
}

impl<'a> HookContext<'a> {
    pub fn new(hook: &'a str, config: &'a Config) -> Self {
        Self {
            hook,
            config,
            document: None,
        }
    }

    #[must_use]
    pub fn with_document(mut self, document: &'a Document) -> Self {
        self.document = Some(document);
        self
    }
}

/// Result of a single handler call. `Ok(None)` keeps the current value.
pub type HandlerResult = Result<Option<HookValue>, PluginError>;

/// A hook handler.
pub type HookHandler = Arc<dyn Fn(&HookValue, &HookContext<'_>) -> HandlerResult + Send + Sync>;

#[derive(Clone)]
struct Registration {
    plugin_id: String,
    handler: HookHandler,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("plugin_id", &self.plugin_id)
            .finish_non_exhaustive()
    }
}

/// Ordered handler lists keyed by hook name.
#[derive(Debug)]
pub struct HookRegistry {
    hooks: RwLock<BTreeMap<String, Vec<Registration>>>,
    failures: AtomicUsize,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Create a registry with every built-in hook present and empty.
    pub fn new() -> Self {
        let hooks = HOOK_NAMES
            .iter()
            .map(|name| ((*name).to_string(), Vec::new()))
            .collect();
        Self {
            hooks: RwLock::new(hooks),
            failures: AtomicUsize::new(0),
        }
    }

    /// Append `handler` to the hook's list. New hook names are created on
    /// first registration.
    pub fn register(&self, hook: &str, plugin_id: &str, handler: HookHandler) {
        debug!(hook, plugin = plugin_id, "registering hook handler");
        self.hooks
            .write()
            .entry(hook.to_string())
            .or_default()
            .push(Registration {
                plugin_id: plugin_id.to_string(),
                handler,
            });
    }

    /// Convenience wrapper around [`register`](Self::register) for closures.
    pub fn on<F>(&self, hook: &str, plugin_id: &str, handler: F)
    where
        F: Fn(&HookValue, &HookContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(hook, plugin_id, Arc::new(handler));
    }

    /// Remove every handler contributed by `plugin_id`. Returns how many
    /// were removed.
    pub fn unregister(&self, plugin_id: &str) -> usize {
        let mut hooks = self.hooks.write();
        let mut removed = 0;
        for handlers in hooks.values_mut() {
            let before = handlers.len();
            handlers.retain(|r| r.plugin_id != plugin_id);
            removed += before - handlers.len();
        }
        debug!(plugin = plugin_id, removed, "unregistered hook handlers");
        removed
    }

    /// Thread `value` through the handlers of `ctx.hook`.
    pub fn invoke(&self, value: HookValue, ctx: &HookContext<'_>) -> HookValue {
        // Snapshot so handlers may register or unregister without deadlocking.
        let handlers = match self.hooks.read().get(ctx.hook) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => return value,
        };

        handlers.iter().fold(value, |current, registration| {
            let outcome = catch_unwind(AssertUnwindSafe(|| (registration.handler)(&current, ctx)));
            match outcome {
                Ok(Ok(Some(next))) if same_kind(&next, &current) => next,
                Ok(Ok(Some(_))) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        hook = ctx.hook,
                        plugin = %registration.plugin_id,
                        expected = current.kind(),
                        "hook handler returned a value of the wrong kind"
                    );
                    current
                }
                Ok(Ok(None)) => current,
                Ok(Err(e)) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        hook = ctx.hook,
                        plugin = %registration.plugin_id,
                        error = %e,
                        "hook handler failed"
                    );
                    current
                }
                Err(panic) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        hook = ctx.hook,
                        plugin = %registration.plugin_id,
                        panic = panic_message(panic.as_ref()),
                        "hook handler panicked"
                    );
                    current
                }
            }
        })
    }

    /// Every known hook name, built-in or registered.
    pub fn hook_names(&self) -> Vec<String> {
        self.hooks.read().keys().cloned().collect()
    }

    pub fn handler_count(&self, hook: &str) -> usize {
        self.hooks.read().get(hook).map_or(0, Vec::len)
    }

    /// Handler count per hook, skipping empty hooks.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.hooks
            .read()
            .iter()
            .filter(|(_, handlers)| !handlers.is_empty())
            .map(|(name, handlers)| (name.clone(), handlers.len()))
            .collect()
    }

    /// Handler failures since the last call, resetting the counter.
    pub fn take_failures(&self) -> usize {
        self.failures.swap(0, Ordering::Relaxed)
    }
}

fn same_kind(a: &HookValue, b: &HookValue) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config() -> Config {
        Config::new("Test", ".")
    }

    fn html(value: HookValue) -> String {
        value.into_html().expect("html value")
    }

    #[test]
    fn test_builtin_hooks_exist() {
        let registry = HookRegistry::new();
        let names = registry.hook_names();
        for hook in HOOK_NAMES {
            assert!(names.iter().any(|n| n == hook), "missing {hook}");
            assert_eq!(registry.handler_count(hook), 0);
        }
    }

    #[test]
    fn test_no_handlers_is_identity() {
        let registry = HookRegistry::new();
        let config = config();
        let ctx = HookContext::new(AFTER_RENDER, &config);

        assert_eq!(html(registry.invoke(HookValue::Html("<p>x</p>".into()), &ctx)), "<p>x</p>");

        let unknown = HookContext::new("never:registered", &config);
        let value = registry.invoke(HookValue::Json(json!({"a": 1})), &unknown);
        assert_eq!(value.into_json(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let registry = HookRegistry::new();
        registry.on(AFTER_RENDER, "a", |v, _| {
            Ok(v.clone().into_html().map(|h| HookValue::Html(h + "a")))
        });
        registry.on(AFTER_RENDER, "b", |v, _| {
            Ok(v.clone().into_html().map(|h| HookValue::Html(h + "b")))
        });

        let config = config();
        let ctx = HookContext::new(AFTER_RENDER, &config);
        assert_eq!(html(registry.invoke(HookValue::Html(String::new()), &ctx)), "ab");
    }

    #[test]
    fn test_none_keeps_current_value() {
        let registry = HookRegistry::new();
        registry.on(AFTER_RENDER, "a", |_, _| Ok(Some(HookValue::Html("changed".into()))));
        registry.on(AFTER_RENDER, "observer", |_, _| Ok(None));

        let config = config();
        let ctx = HookContext::new(AFTER_RENDER, &config);
        assert_eq!(html(registry.invoke(HookValue::Html("orig".into()), &ctx)), "changed");
    }

    #[test]
    fn test_failing_handler_does_not_stop_chain() {
        let registry = HookRegistry::new();
        registry.on(AFTER_RENDER, "a", |_, _| Err(PluginError::Handler("boom".into())));
        registry.on(AFTER_RENDER, "b", |v, _| {
            assert_eq!(v.clone().into_html().as_deref(), Some("V"));
            Ok(Some(HookValue::Html("X".into())))
        });

        let config = config();
        let ctx = HookContext::new(AFTER_RENDER, &config);
        assert_eq!(html(registry.invoke(HookValue::Html("V".into()), &ctx)), "X");
        assert_eq!(registry.take_failures(), 1);
        assert_eq!(registry.take_failures(), 0);
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let registry = HookRegistry::new();
        registry.on(BEFORE_BUILD, "bad", |_, _| panic!("plugin bug"));
        registry.on(BEFORE_BUILD, "good", |_, _| Ok(Some(HookValue::Json(json!(1)))));

        let config = config();
        let ctx = HookContext::new(BEFORE_BUILD, &config);
        let value = registry.invoke(HookValue::Json(json!(0)), &ctx);
        assert_eq!(value.into_json(), Some(json!(1)));
        assert_eq!(registry.take_failures(), 1);
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let registry = HookRegistry::new();
        registry.on(AFTER_RENDER, "confused", |_, _| Ok(Some(HookValue::Json(json!(1)))));

        let config = config();
        let ctx = HookContext::new(AFTER_RENDER, &config);
        assert_eq!(html(registry.invoke(HookValue::Html("keep".into()), &ctx)), "keep");
        assert_eq!(registry.take_failures(), 1);
    }

    #[test]
    fn test_unregister_removes_only_that_plugin() {
        let registry = HookRegistry::new();
        registry.on(AFTER_RENDER, "a", |_, _| Ok(None));
        registry.on(BEFORE_RENDER, "a", |_, _| Ok(None));
        registry.on(AFTER_RENDER, "b", |_, _| Ok(None));

        assert_eq!(registry.unregister("a"), 2);
        assert_eq!(registry.handler_count(AFTER_RENDER), 1);
        assert_eq!(registry.handler_count(BEFORE_RENDER), 0);
        assert_eq!(registry.unregister("missing"), 0);
    }

    #[test]
    fn test_dynamic_hook_names() {
        let registry = HookRegistry::new();
        registry.on("custom:event", "p", |_, _| Ok(None));

        assert!(registry.hook_names().iter().any(|n| n == "custom:event"));
        assert_eq!(registry.counts().get("custom:event"), Some(&1));
    }

    #[test]
    fn test_context_carries_document() {
        let registry = HookRegistry::new();
        registry.on(BEFORE_RENDER, "p", |_, ctx| {
            Ok(ctx.document.map(|d| HookValue::Html(d.title.clone())))
        });

        let config = config();
        let mut doc = crate::test_support::document("Hello", "/post/hello");
        doc.route_name = "posts".into();
        let ctx = HookContext::new(BEFORE_RENDER, &config).with_document(&doc);
        assert_eq!(html(registry.invoke(HookValue::Html(String::new()), &ctx)), "Hello");
    }
}
