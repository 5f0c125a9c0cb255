//! Inkpress Generator Library
//!
//! Build engine for Inkpress: content scanning, template rendering, the
//! plugin hook system and derived artifacts.
//!
//! # Modules
//!
//! - [`collector`] - Content scanning and taxonomy indexes
//! - [`template`] - Template resolution, layouts and helpers
//! - [`hooks`] - Named extension points for plugins
//! - [`plugin`] - Plugin lifecycle management
//! - [`build`] - Build orchestration
//! - [`feed`] - RSS, Atom and JSON Feed generation
//! - [`sitemap`] - XML sitemap generation
//! - [`search`] - Client-side search index
//! - [`assets`] - Static asset copying

pub mod assets;
pub mod build;
pub mod collector;
pub mod external_links;
pub mod feed;
pub mod helpers;
pub mod hooks;
pub mod page;
pub mod plugin;
pub mod robots;
pub mod search;
pub mod sitemap;
pub mod template;

pub use assets::AssetProcessor;
pub use build::{BuildError, BuildReport, BuildState, Pipeline};
pub use collector::{ContentStore, ScanResult};
pub use external_links::ExternalLinksPlugin;
pub use feed::FeedGenerator;
pub use hooks::{HookContext, HookRegistry, HookValue};
pub use page::{PageKind, RenderedPage};
pub use plugin::{BuiltinResolver, Plugin, PluginManager, PluginResolver};
pub use search::SearchIndex;
pub use sitemap::SitemapGenerator;
pub use template::TemplateEngine;

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};
    use inkpress_core::{Document, Frontmatter};

    /// A published post with empty body and no taxonomy.
    pub fn document(title: &str, url: &str) -> Document {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let slug = url.rsplit('/').next().unwrap_or_default().to_string();
        Document {
            source_path: PathBuf::from(format!("content/posts/{slug}.md")),
            route_name: "posts".to_string(),
            front_matter: Frontmatter::default(),
            title: title.to_string(),
            slug,
            raw_body: String::new(),
            rendered_html: String::new(),
            url: url.to_string(),
            excerpt: String::new(),
            word_count: 0,
            reading_time_minutes: 0,
            date,
            updated: date,
            tags: Vec::new(),
            categories: Vec::new(),
            draft: false,
            template: "post".to_string(),
            toc: Vec::new(),
        }
    }
}
