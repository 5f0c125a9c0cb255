//! Bundled plugin that opens absolute links in a new tab.

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use crate::{
    hooks::{AFTER_RENDER, HandlerResult, HookContext, HookValue},
    plugin::{HookSpec, Plugin, PluginError, Result},
};

static EXTERNAL_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a\s[^>]*href\s*=\s*["']https?://[^>]*>"#).expect("valid regex")
});

const DEFAULT_REL: &str = "noopener noreferrer";

/// Adds `target="_blank"` and a `rel` attribute to `http(s)` anchors in
/// rendered pages. Anchors that already carry a `target` are left alone.
///
/// Config: `rel` overrides the default `noopener noreferrer`.
#[derive(Debug, Clone)]
pub struct ExternalLinksPlugin {
    rel: String,
}

impl ExternalLinksPlugin {
    pub const ID: &'static str = "external-links";
}

impl Default for ExternalLinksPlugin {
    fn default() -> Self {
        Self {
            rel: DEFAULT_REL.to_string(),
        }
    }
}

impl Plugin for ExternalLinksPlugin {
    fn id(&self) -> &str {
        Self::ID
    }

    fn init(&mut self, config: &toml::Table) -> Result<()> {
        match config.get("rel") {
            None => {}
            Some(toml::Value::String(rel)) => self.rel = rel.clone(),
            Some(other) => {
                return Err(PluginError::Init {
                    plugin: Self::ID.to_string(),
                    message: format!("`rel` must be a string, got {}", other.type_str()),
                });
            }
        }
        Ok(())
    }

    fn hooks(&self) -> Vec<(String, HookSpec)> {
        let rel = self.rel.clone();
        let handler = move |value: &HookValue, _: &HookContext<'_>| -> HandlerResult {
            Ok(match value {
                HookValue::Html(html) => Some(HookValue::Html(mark_external_links(html, &rel))),
                _ => None,
            })
        };
        vec![(AFTER_RENDER.to_string(), HookSpec::One(Arc::new(handler)))]
    }
}

/// Rewrite every external anchor in `html`.
pub fn mark_external_links(html: &str, rel: &str) -> String {
    EXTERNAL_ANCHOR
        .replace_all(html, |caps: &Captures<'_>| {
            let tag = &caps[0];
            if tag.contains("target=") {
                return tag.to_string();
            }
            let open = tag.trim_end_matches('>').trim_end_matches('/').trim_end();
            format!(r#"{open} target="_blank" rel="{rel}">"#)
        })
        .into_owned()
}
