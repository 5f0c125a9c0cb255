//! Template resolution and rendering.
//!
//! Templates are Jinja files rendered with minijinja. A page template is
//! looked up in `layouts/`, then the templates root, then
//! `themes/<theme>/`, trying `.html` before `.jinja` in each place. A
//! template can ask to be wrapped in a layout by calling
//! `{{ layout("base") }}`; the layout then renders with the page output
//! bound to `body`.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use inkpress_core::{Config, frontmatter::parse_date, slugify};
use inkpress_parser::text::strip_html;
use minijinja::{AutoEscape, Environment, ErrorKind, Value, context};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::helpers;

/// File extensions tried for every template name, in order.
pub const TEMPLATE_EXTENSIONS: &[&str] = &["html", "jinja"];

/// Nested layouts deeper than this are treated as a cycle.
const MAX_LAYOUT_DEPTH: usize = 8;

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No file matched the template name.
    #[error("template not found: {name} (searched {searched:?})")]
    NotFound { name: String, searched: Vec<PathBuf> },

    /// A template asked for a layout that does not exist.
    #[error("layout '{layout}' requested by '{template}' not found")]
    LayoutNotFound { layout: String, template: String },

    /// Layouts kept requesting further layouts.
    #[error("layout chain too deep starting at '{0}'")]
    LayoutDepth(String),

    /// The template failed to compile or render.
    #[error("failed to render template '{name}': {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// Reading a template file failed.
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Template sources keyed by resolved file path.
///
/// Owned by one engine; never shared between engines.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<PathBuf, Arc<str>>>,
}

impl TemplateCache {
    pub fn get(&self, path: &Path) -> Option<Arc<str>> {
        self.entries.read().get(path).cloned()
    }

    pub fn insert(&self, path: PathBuf, source: Arc<str>) {
        self.entries.write().insert(path, source);
    }

    /// Drop every cached source.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[derive(Debug)]
struct TemplateSources {
    root: PathBuf,
    theme_dir: PathBuf,
    cache: TemplateCache,
    cache_enabled: bool,
}

impl TemplateSources {
    fn read(&self, path: &Path) -> Result<Arc<str>> {
        if self.cache_enabled
            && let Some(source) = self.cache.get(path)
        {
            return Ok(source);
        }

        let source: Arc<str> = fs::read_to_string(path)
            .map_err(|source| TemplateError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .into();

        if self.cache_enabled {
            self.cache.insert(path.to_path_buf(), source.clone());
        }
        Ok(source)
    }

    fn candidates(&self, dirs: &[PathBuf], name: &str) -> Vec<PathBuf> {
        let has_extension = Path::new(name).extension().is_some();
        dirs.iter()
            .flat_map(|dir| {
                let mut paths: Vec<PathBuf> = TEMPLATE_EXTENSIONS
                    .iter()
                    .map(|ext| dir.join(format!("{name}.{ext}")))
                    .collect();
                if has_extension {
                    paths.insert(0, dir.join(name));
                }
                paths
            })
            .collect()
    }

    fn page_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.root.join("layouts"),
            self.root.clone(),
            self.theme_dir.clone(),
        ]
    }

    fn include_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.root.join("partials"),
            self.root.clone(),
            self.root.join("layouts"),
            self.theme_dir.clone(),
        ]
    }

    /// First existing file among `dirs` for `name`.
    fn resolve(&self, dirs: &[PathBuf], name: &str) -> std::result::Result<PathBuf, Vec<PathBuf>> {
        let candidates = self.candidates(dirs, name);
        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or(candidates)
    }

    /// Key under which a resolved file is registered in the environment.
    fn key(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Values the helper functions close over.
#[derive(Debug, Clone)]
struct HelperSettings {
    site_url: String,
    date_format: String,
}

/// Resolves and renders templates.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    sources: Arc<TemplateSources>,
    helpers: HelperSettings,
}

impl TemplateEngine {
    /// Create an engine for the configured templates directory and theme.
    pub fn new(config: &Config) -> Self {
        Self::with_options(
            config.templates_dir(),
            &config.site.theme,
            config.build.template_cache,
            &config.site.url,
            &config.site.date_format,
        )
    }

    pub fn with_options(
        root: impl Into<PathBuf>,
        theme: &str,
        cache_enabled: bool,
        site_url: &str,
        date_format: &str,
    ) -> Self {
        let root = root.into();
        let theme_dir = root.join("themes").join(theme);
        Self {
            sources: Arc::new(TemplateSources {
                root,
                theme_dir,
                cache: TemplateCache::default(),
                cache_enabled,
            }),
            helpers: HelperSettings {
                site_url: site_url.to_string(),
                date_format: date_format.to_string(),
            },
        }
    }

    /// The engine's source cache.
    pub fn cache(&self) -> &TemplateCache {
        &self.sources.cache
    }

    pub fn clear_cache(&self) {
        debug!("clearing template cache");
        self.sources.cache.clear();
    }

    /// Whether a page template with this name can be resolved.
    pub fn has_template(&self, name: &str) -> bool {
        self.sources
            .resolve(&self.sources.page_dirs(), name)
            .is_ok()
    }

    /// Render template `name` with `data`, wrapping it in any layout it
    /// requests.
    pub fn render<S: Serialize>(&self, name: &str, data: &S) -> Result<String> {
        let path = self
            .sources
            .resolve(&self.sources.page_dirs(), name)
            .map_err(|searched| TemplateError::NotFound {
                name: name.to_string(),
                searched,
            })?;

        let data = Value::from_serialize(data);
        let (mut output, mut requested) = self.render_file(&path, data.clone())?;
        let mut current = self.sources.key(&path);
        let mut depth = 0;

        while let Some(layout) = requested {
            depth += 1;
            if depth > MAX_LAYOUT_DEPTH {
                return Err(TemplateError::LayoutDepth(name.to_string()));
            }

            let layout_path = self
                .sources
                .resolve(&[self.sources.root.join("layouts")], &layout)
                .map_err(|_| TemplateError::LayoutNotFound {
                    layout: layout.clone(),
                    template: current.clone(),
                })?;

            debug!(template = %current, layout = %layout, "wrapping in layout");
            let ctx = context! { body => Value::from_safe_string(output), ..data.clone() };
            (output, requested) = self.render_file(&layout_path, ctx)?;
            current = self.sources.key(&layout_path);
        }

        Ok(output)
    }

    /// Render one file, returning its output and the layout it asked for.
    fn render_file(&self, path: &Path, ctx: Value) -> Result<(String, Option<String>)> {
        let key = self.sources.key(path);
        let source = self.sources.read(path)?;
        let requested = Arc::new(Mutex::new(None::<String>));
        let mut env = self.environment(requested.clone());

        let render_error = |source| TemplateError::Render {
            name: key.clone(),
            source,
        };

        env.add_template_owned(key.clone(), source.to_string())
            .map_err(render_error)?;
        let output = env
            .get_template(&key)
            .and_then(|template| template.render(ctx))
            .map_err(render_error)?;

        let layout = requested.lock().take();
        Ok((output, layout))
    }

    fn environment(&self, layout_slot: Arc<Mutex<Option<String>>>) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);

        let sources = self.sources.clone();
        env.set_loader(move |name| {
            let dirs = sources.include_dirs();
            match sources.resolve(&dirs, name) {
                Ok(path) => sources.read(&path).map(|s| Some(s.to_string())).map_err(|e| {
                    minijinja::Error::new(ErrorKind::TemplateNotFound, e.to_string())
                }),
                Err(_) => Ok(None),
            }
        });

        env.add_function("layout", move |name: String| {
            *layout_slot.lock() = Some(name);
            String::new()
        });

        self.register_helpers(&mut env);
        env
    }

    fn register_helpers(&self, env: &mut Environment<'static>) {
        let date_format = self.helpers.date_format.clone();
        let format_date = move |date: Value, pattern: Option<String>| {
            helpers::format_date(&date.to_string(), pattern.as_deref().unwrap_or(&date_format))
        };
        env.add_function("format_date", format_date.clone());
        env.add_function("formatDate", format_date);

        let time_ago = |date: Value| {
            let raw = date.to_string();
            match parse_date(&raw) {
                Some(parsed) => helpers::time_ago(parsed, Utc::now()),
                None => raw,
            }
        };
        env.add_function("time_ago", time_ago);
        env.add_function("timeAgo", time_ago);

        let excerpt = |text: String, length: Option<usize>| {
            helpers::excerpt(&text, length.unwrap_or(inkpress_parser::text::DEFAULT_EXCERPT_LENGTH))
        };
        env.add_function("excerpt", excerpt);

        let strip = |html: String| strip_html(&html);
        env.add_function("strip_html", strip);
        env.add_function("stripHtml", strip);

        let site_url = self.helpers.site_url.clone();
        env.add_function("url", move |path: String| {
            Value::from_safe_string(helpers::url(&site_url, &path))
        });
        env.add_function("asset", |path: String| {
            Value::from_safe_string(helpers::asset(&path))
        });

        env.add_function(
            "paginate",
            |current: usize, total: usize, base_url: Option<String>| {
                Value::from_serialize(helpers::paginate(
                    current,
                    total,
                    base_url.as_deref().unwrap_or("/"),
                ))
            },
        );

        env.add_function("json", |value: Value| {
            serde_json::to_string(&value)
                .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string()))
        });

        env.add_function("capitalize", |s: String| helpers::capitalize(&s));
        env.add_function("slugify", |s: String| slugify(&s));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    fn engine(root: &Path, cache: bool) -> TemplateEngine {
        TemplateEngine::with_options(root, "default", cache, "https://example.com", "%Y-%m-%d")
    }

    #[test]
    fn test_render_simple() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "post.html", "<h1>{{ title }}</h1>");

        let html = engine(dir.path(), true)
            .render("post", &json!({"title": "Hi <there>"}))
            .expect("render");

        assert_eq!(html, "<h1>Hi &lt;there&gt;</h1>");
    }

    #[test]
    fn test_search_order() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "themes/default/page.html", "theme");
        write(dir.path(), "page.jinja", "root-jinja");
        let engine = engine(dir.path(), false);

        assert_eq!(engine.render("page", &json!({})).expect("render"), "root-jinja");

        write(dir.path(), "page.html", "root-html");
        assert_eq!(engine.render("page", &json!({})).expect("render"), "root-html");

        write(dir.path(), "layouts/page.jinja", "layouts");
        assert_eq!(engine.render("page", &json!({})).expect("render"), "layouts");
    }

    #[test]
    fn test_theme_fallback() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "themes/default/index.html", "from theme");

        let html = engine(dir.path(), true).render("index", &json!({})).expect("render");
        assert_eq!(html, "from theme");
    }

    #[test]
    fn test_missing_template_is_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = engine(dir.path(), true).render("post", &json!({})).unwrap_err();

        assert!(matches!(err, TemplateError::NotFound { ref name, .. } if name == "post"));
    }

    #[test]
    fn test_layout_wrapping() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "post.html", "{{ layout('base') }}<p>{{ title }}</p>");
        write(
            dir.path(),
            "layouts/base.html",
            "<title>{{ site }}</title><main>{{ body }}</main>",
        );

        let html = engine(dir.path(), true)
            .render("post", &json!({"title": "Hello", "site": "Blog"}))
            .expect("render");

        assert_eq!(html, "<title>Blog</title><main><p>Hello</p></main>");
    }

    #[test]
    fn test_nested_layouts() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "post.html", "{{ layout('article') }}post");
        write(dir.path(), "layouts/article.html", "{{ layout('base') }}[{{ body }}]");
        write(dir.path(), "layouts/base.html", "<{{ body }}>");

        let html = engine(dir.path(), true).render("post", &json!({})).expect("render");
        assert_eq!(html, "<[post]>");
    }

    #[test]
    fn test_missing_layout_is_error() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "post.html", "{{ layout('nope') }}x");

        let err = engine(dir.path(), true).render("post", &json!({})).unwrap_err();
        assert!(
            matches!(err, TemplateError::LayoutNotFound { ref layout, .. } if layout == "nope")
        );
    }

    #[test]
    fn test_layout_cycle_is_error() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "post.html", "{{ layout('loop') }}x");
        write(dir.path(), "layouts/loop.html", "{{ layout('loop') }}{{ body }}");

        let err = engine(dir.path(), true).render("post", &json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::LayoutDepth(_)));
    }

    #[test]
    fn test_render_error_names_template() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "broken.html", "{% if %}");

        let err = engine(dir.path(), true).render("broken", &json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Render { ref name, .. } if name == "broken.html"));
        assert!(err.to_string().contains("broken.html"));
    }

    #[test]
    fn test_includes_resolve_partials() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "partials/nav.html", "<nav>{{ title }}</nav>");
        write(dir.path(), "page.html", "{% include 'nav.html' %}body");

        let html = engine(dir.path(), true)
            .render("page", &json!({"title": "T"}))
            .expect("render");
        assert_eq!(html, "<nav>T</nav>body");
    }

    #[test]
    fn test_helpers() {
        let dir = TempDir::new().expect("tempdir");
        write(
            dir.path(),
            "helpers.html",
            "{{ formatDate(date) }}|{{ format_date(date, '%d.%m.%Y') }}|{{ url('/about') }}|\
             {{ asset('app.css') }}|{{ capitalize('hello') }}|{{ slugify('Hello World') }}|\
             {{ stripHtml('<b>bold</b>') }}|{{ excerpt('**a** b c', 3) }}|\
             {% for p in paginate(2, 3, '/blog').pages %}{{ p.number }}{% endfor %}",
        );

        let html = engine(dir.path(), true)
            .render("helpers", &json!({"date": "2024-03-01T00:00:00Z"}))
            .expect("render");

        assert_eq!(
            html,
            "2024-03-01|01.03.2024|https://example.com/about|/app.css|Hello|hello-world|bold|a b...|123"
        );
    }

    #[test]
    fn test_json_helper_is_escaped() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "j.html", "{{ json(data) }}|{{ json(data)|safe }}");

        let html = engine(dir.path(), true)
            .render("j", &json!({"data": {"a": 1}}))
            .expect("render");
        assert_eq!(html, "{&quot;a&quot;:1}|{\"a\":1}");
    }

    #[test]
    fn test_cache_and_clear() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "page.html", "v1");
        let engine = engine(dir.path(), true);

        assert_eq!(engine.render("page", &json!({})).expect("render"), "v1");
        write(dir.path(), "page.html", "v2");
        assert_eq!(engine.render("page", &json!({})).expect("render"), "v1");
        assert_eq!(engine.cache().len(), 1);

        engine.clear_cache();
        assert!(engine.cache().is_empty());
        assert_eq!(engine.render("page", &json!({})).expect("render"), "v2");
    }

    #[test]
    fn test_no_cache_mode_always_reads() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "page.html", "v1");
        let engine = engine(dir.path(), false);

        assert_eq!(engine.render("page", &json!({})).expect("render"), "v1");
        write(dir.path(), "page.html", "v2");
        assert_eq!(engine.render("page", &json!({})).expect("render"), "v2");
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn test_separate_engines_do_not_share_cache() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "page.html", "v1");
        let first = engine(dir.path(), true);
        let second = engine(dir.path(), true);

        first.render("page", &json!({})).expect("render");
        assert_eq!(first.cache().len(), 1);
        assert!(second.cache().is_empty());
    }
}
