//! Site configuration management.
//!
//! A configuration is loaded once, validated, and then treated as immutable.
//! Reloading means calling [`Config::load`] again and swapping the held value.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Main configuration structure for Inkpress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Site identity.
    pub site: SiteConfig,

    /// Path roots, relative to the configuration file.
    #[serde(default)]
    pub paths: PathsConfig,

    /// One route per content collection, keyed by collection name.
    #[serde(default = "default_routes")]
    pub routes: BTreeMap<String, RouteConfig>,

    /// Pagination settings.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Per-artifact enable flags.
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Static asset settings.
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Feed settings shared by RSS, Atom and JSON Feed.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Plugin ordering and per-plugin configuration.
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Development server settings.
    #[serde(default)]
    pub dev: DevConfig,

    /// Directory the configuration was loaded from.
    #[serde(skip)]
    pub root: PathBuf,
}

/// Site-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site title.
    pub title: String,

    /// Site description for meta tags and feeds.
    #[serde(default)]
    pub description: String,

    /// Site author name.
    #[serde(default)]
    pub author: String,

    /// Base URL for the site (e.g., "https://example.com"). May be empty.
    #[serde(default)]
    pub url: String,

    /// Language code.
    #[serde(default = "default_language")]
    pub language: String,

    /// Default pattern for the `format_date` helper (strftime syntax).
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Theme name, used as `templates/themes/<theme>/`.
    #[serde(default = "default_theme")]
    pub theme: String,
}

/// Path roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_content_dir")]
    pub content: PathBuf,

    #[serde(default = "default_templates_dir")]
    pub templates: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output: PathBuf,

    #[serde(default = "default_public_dir")]
    pub public: PathBuf,
}

/// How one content collection maps to URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// URL pattern with `:slug`, `:year`, `:month`, `:day`, `:category`, `:title`.
    pub pattern: String,

    /// Directory under the content root holding this collection.
    pub directory: String,

    /// Template used to render documents of this collection.
    pub template: String,
}

/// Pagination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

/// Enable flags, one per derived artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_true")]
    pub search: bool,

    #[serde(default = "default_true")]
    pub rss: bool,

    #[serde(default = "default_true")]
    pub atom: bool,

    #[serde(default = "default_true")]
    pub json_feed: bool,

    #[serde(default = "default_true")]
    pub sitemap: bool,

    #[serde(default = "default_true")]
    pub robots: bool,
}

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Empty the output directory before writing.
    #[serde(default = "default_true")]
    pub clean: bool,

    /// Whether to include drafts.
    #[serde(default)]
    pub drafts: bool,

    /// Worker count for parsing and rendering.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Length of auto-derived excerpts, in characters.
    #[serde(default = "default_excerpt_length")]
    pub excerpt_length: usize,

    /// Marker that ends a hand-picked excerpt inside the body.
    #[serde(default = "default_excerpt_separator")]
    pub excerpt_separator: String,

    /// Cache template sources between renders.
    #[serde(default = "default_true")]
    pub template_cache: bool,

    /// Syntax highlighting theme name.
    #[serde(default = "default_syntax_theme")]
    pub syntax_theme: String,
}

/// Static asset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Glob patterns, relative to the public directory, that are not copied.
    #[serde(default = "default_asset_ignore")]
    pub ignore: Vec<String>,
}

/// Feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Maximum number of items in each feed.
    #[serde(default = "default_feed_limit")]
    pub limit: usize,

    /// Collection whose documents are syndicated.
    #[serde(default = "default_feed_collection")]
    pub collection: String,
}

/// Plugin configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Plugin ids, loaded in this order.
    #[serde(default)]
    pub order: Vec<String>,

    /// Free-form configuration table per plugin id.
    #[serde(default)]
    pub config: BTreeMap<String, toml::Table>,
}

/// Development server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub live_reload: bool,

    /// Quiet period used to collapse bursts of file events.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

// Default value functions
fn default_language() -> String {
    "en".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_theme() -> String {
    "default".to_string()
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_routes() -> BTreeMap<String, RouteConfig> {
    let route = |pattern: &str, directory: &str, template: &str| RouteConfig {
        pattern: pattern.to_string(),
        directory: directory.to_string(),
        template: template.to_string(),
    };

    BTreeMap::from([
        ("posts".to_string(), route("/post/:slug", "posts", "post")),
        ("pages".to_string(), route("/:slug", "pages", "page")),
        ("docs".to_string(), route("/docs/:slug", "docs", "doc")),
    ])
}

fn default_per_page() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    10
}

fn default_excerpt_length() -> usize {
    200
}

fn default_excerpt_separator() -> String {
    "<!-- more -->".to_string()
}

fn default_syntax_theme() -> String {
    "base16-ocean.dark".to_string()
}

fn default_asset_ignore() -> Vec<String> {
    vec![
        "**/.DS_Store".to_string(),
        "**/Thumbs.db".to_string(),
        "**/*.tmp".to_string(),
    ]
}

fn default_feed_limit() -> usize {
    20
}

fn default_feed_collection() -> String {
    "posts".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content: default_content_dir(),
            templates: default_templates_dir(),
            output: default_output_dir(),
            public: default_public_dir(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            search: true,
            rss: true,
            atom: true,
            json_feed: true,
            sitemap: true,
            robots: true,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            clean: true,
            drafts: false,
            concurrency: default_concurrency(),
            excerpt_length: default_excerpt_length(),
            excerpt_separator: default_excerpt_separator(),
            template_cache: true,
            syntax_theme: default_syntax_theme(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            ignore: default_asset_ignore(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            limit: default_feed_limit(),
            collection: default_feed_collection(),
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            live_reload: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Config {
    /// Build a configuration in memory with default settings.
    pub fn new(title: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            site: SiteConfig {
                title: title.into(),
                description: String::new(),
                author: String::new(),
                url: String::new(),
                language: default_language(),
                date_format: default_date_format(),
                theme: default_theme(),
            },
            paths: PathsConfig::default(),
            routes: default_routes(),
            pagination: PaginationConfig::default(),
            features: FeaturesConfig::default(),
            build: BuildConfig::default(),
            assets: AssetsConfig::default(),
            feed: FeedConfig::default(),
            plugins: PluginsConfig::default(),
            dev: DevConfig::default(),
            root: root.into(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.root = config_root(path);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `INKPRESS__SECTION__KEY` environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("INKPRESS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.root = config_root(path);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.site.title.is_empty() {
            return Err(CoreError::config("site.title cannot be empty"));
        }

        if self.site.url.ends_with('/') {
            tracing::warn!("site.url should not have a trailing slash");
        }

        if self.build.concurrency == 0 {
            return Err(CoreError::config("build.concurrency must be at least 1"));
        }

        if self.pagination.per_page == 0 {
            return Err(CoreError::config("pagination.per_page must be at least 1"));
        }

        for (name, route) in &self.routes {
            if route.pattern.trim().is_empty() {
                return Err(CoreError::config(format!(
                    "routes.{name}.pattern cannot be empty"
                )));
            }
            if route.template.trim().is_empty() {
                return Err(CoreError::config(format!(
                    "routes.{name}.template cannot be empty"
                )));
            }
        }

        Ok(())
    }

    /// Get the full URL for a path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.site.url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join(&self.paths.content)
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join(&self.paths.templates)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.paths.output)
    }

    pub fn public_dir(&self) -> PathBuf {
        self.root.join(&self.paths.public)
    }

    /// Configuration table for a plugin, empty if none was given.
    pub fn plugin_config(&self, id: &str) -> toml::Table {
        self.plugins.config.get(id).cloned().unwrap_or_default()
    }
}

fn config_root(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn create_test_config() -> String {
        r#"
[site]
title = "Test Site"
url = "https://example.com"
language = "zh"

[paths]
output = "public_html"

[routes.posts]
pattern = "/:year/:month/:slug"
directory = "posts"
template = "post"

[pagination]
per_page = 5

[features]
atom = false

[build]
concurrency = 4
excerpt_length = 120

[feed]
limit = 15

[plugins]
order = ["external-links"]

[plugins.config.external-links]
rel = "nofollow"
"#
        .to_string()
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("inkpress.toml");
        let mut file = std::fs::File::create(&config_path).expect("create file");
        file.write_all(create_test_config().as_bytes())
            .expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.site.title, "Test Site");
        assert_eq!(config.site.url, "https://example.com");
        assert_eq!(config.site.language, "zh");
        assert_eq!(config.output_dir(), dir.path().join("public_html"));
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes["posts"].pattern, "/:year/:month/:slug");
        assert_eq!(config.pagination.per_page, 5);
        assert!(!config.features.atom);
        assert!(config.features.rss);
        assert_eq!(config.build.concurrency, 4);
        assert_eq!(config.build.excerpt_length, 120);
        assert_eq!(config.feed.limit, 15);
        assert_eq!(config.plugins.order, vec!["external-links"]);
        assert_eq!(
            config.plugin_config("external-links").get("rel"),
            Some(&toml::Value::String("nofollow".to_string()))
        );
    }

    #[test]
    fn test_config_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("inkpress.toml");
        let minimal_config = r#"
[site]
title = "Minimal Site"
"#;
        std::fs::write(&config_path, minimal_config).expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.site.language, "en");
        assert_eq!(config.site.url, "");
        assert_eq!(config.content_dir(), dir.path().join("content"));
        assert_eq!(config.routes.len(), 3);
        assert_eq!(config.routes["posts"].pattern, "/post/:slug");
        assert_eq!(config.routes["pages"].template, "page");
        assert_eq!(config.pagination.per_page, 10);
        assert!(config.build.clean);
        assert!(!config.build.drafts);
        assert_eq!(config.build.excerpt_separator, "<!-- more -->");
        assert_eq!(config.feed.limit, 20);
        assert_eq!(config.dev.debounce_ms, 300);
        assert!(config.plugin_config("missing").is_empty());
    }

    #[test]
    fn test_url_for() {
        let mut config = Config::new("Test", ".");
        config.site.url = "https://example.com".to_string();

        assert_eq!(
            config.url_for("/post/hello"),
            "https://example.com/post/hello"
        );
        assert_eq!(
            config.url_for("post/hello"),
            "https://example.com/post/hello"
        );
    }

    #[test]
    fn test_config_validation_empty_title() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("inkpress.toml");
        std::fs::write(&config_path, "[site]\ntitle = \"\"\n").expect("write");

        let result = Config::load(&config_path);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("title cannot be empty")
        );
    }

    #[test]
    fn test_config_validation_zero_concurrency() {
        let mut config = Config::new("Test", ".");
        config.build.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_unparseable() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("inkpress.toml");
        std::fs::write(&config_path, "[site\ntitle = ").expect("write");

        let err = Config::load(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_config_not_found() {
        let result = Config::load(Path::new("/nonexistent/inkpress.toml"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }
}
