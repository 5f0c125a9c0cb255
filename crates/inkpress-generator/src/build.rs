//! Build orchestration.
//!
//! A [`Pipeline`] runs one build at a time through four stages:
//! scanning, rendering, generating and writing. Rendering and generating
//! happen in memory, and the output directory is only touched once
//! everything rendered, so a failed build leaves the previous output intact.

use std::{
    collections::{BTreeMap, HashMap},
    fs, io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use chrono::{DateTime, Utc};
use inkpress_core::{
    Config, Document,
    router::{category_route, pagination_route, tag_route},
};
use inkpress_parser::MarkdownParser;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    assets::{AssetError, AssetProcessor},
    collector::{CollectorError, ContentStore, ScanResult},
    feed::{ATOM_PATH, FeedError, FeedGenerator, JSON_FEED_PATH, RSS_PATH},
    helpers::paginate,
    hooks::{
        AFTER_BUILD, AFTER_RENDER, AFTER_SCAN, BEFORE_BUILD, BEFORE_RENDER, BEFORE_WRITE,
        HookContext, HookRegistry, HookValue,
    },
    page::{PageKind, RenderedPage},
    plugin::{PluginManager, PluginResolver},
    robots::{self, ROBOTS_PATH},
    search::{SEARCH_INDEX_PATH, SearchIndex},
    sitemap::{SITEMAP_PATH, SitemapGenerator},
    template::{TemplateEngine, TemplateError},
};

/// Collection listed on the home page.
const HOME_COLLECTION: &str = "posts";

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// `build` was called while another build on the same pipeline runs.
    #[error("a build is already in progress")]
    AlreadyBuilding,

    #[error("content directory not found: {0}")]
    ContentRootMissing(PathBuf),

    /// Refusing to clean an output directory that holds site sources.
    #[error("refusing to clean {0}: it contains site sources")]
    UnsafeOutput(PathBuf),

    /// Collector error.
    #[error("collector error: {0}")]
    Collector(CollectorError),

    /// Template error.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Asset error.
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    /// Feed error.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl From<CollectorError> for BuildError {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::ContentRootMissing(path) => Self::ContentRootMissing(path),
            other => Self::Collector(other),
        }
    }
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Where a pipeline is in its current build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Idle,
    Scanning,
    Rendering,
    Generating,
    Writing,
    /// The last stage failed; the pipeline is about to return to idle.
    Error,
}

/// Summary of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Documents in the `posts` collection.
    pub posts: usize,
    /// Documents in every other collection.
    pub pages: usize,
    pub taxonomy_pages: usize,
    pub assets: usize,
    /// Skipped files plus failed hook handlers.
    pub errors: usize,
    /// URL collisions.
    pub warnings: usize,
    pub elapsed_ms: u64,
}

/// A file produced in the generating stage, relative to the output root.
#[derive(Debug, Clone)]
struct Artifact {
    path: &'static str,
    contents: String,
}

/// Resets the in-flight flag and state when a build ends, even on panic.
struct BuildGuard<'a> {
    pipeline: &'a Pipeline,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        *self.pipeline.state.write() = BuildState::Idle;
        self.pipeline.building.store(false, Ordering::Release);
    }
}

/// Site build pipeline.
#[derive(Debug)]
pub struct Pipeline {
    config: Arc<Config>,
    hooks: Arc<HookRegistry>,
    plugins: PluginManager,
    templates: TemplateEngine,
    store: ContentStore,
    building: AtomicBool,
    state: RwLock<BuildState>,
}

impl Pipeline {
    /// Create a pipeline and load the configured plugins.
    pub fn new(config: Arc<Config>, resolver: Arc<dyn PluginResolver>) -> Self {
        let hooks = Arc::new(HookRegistry::new());
        let plugins = PluginManager::new(hooks.clone(), resolver);
        plugins.load_all(&config);

        let mut parser = MarkdownParser::with_theme(&config.build.syntax_theme);
        for extension in plugins.markdown_extensions() {
            parser.add_extension(extension);
        }

        Self {
            templates: TemplateEngine::new(&config),
            store: ContentStore::new(config.clone(), parser),
            config,
            hooks,
            plugins,
            building: AtomicBool::new(false),
            state: RwLock::new(BuildState::Idle),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    pub fn state(&self) -> BuildState {
        *self.state.read()
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    /// Drop cached template sources. Only call between builds.
    pub fn clear_cache(&self) {
        self.templates.clear_cache();
    }

    /// Scan content without rendering or writing anything.
    pub fn scan(&self) -> Result<ScanResult> {
        Ok(self.store.scan()?)
    }

    /// Run a full build.
    pub fn build(&self) -> Result<BuildReport> {
        if self
            .building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BuildError::AlreadyBuilding);
        }
        let _guard = BuildGuard { pipeline: self };

        let result = self.run();
        if let Err(e) = &result {
            self.set_state(BuildState::Error);
            error!(error = %e, "build failed");
        }
        result
    }

    fn set_state(&self, state: BuildState) {
        debug!(?state, "build state");
        *self.state.write() = state;
    }

    fn run(&self) -> Result<BuildReport> {
        let start = Instant::now();
        let config = &*self.config;
        let mut report = BuildReport::default();
        self.hooks.take_failures();

        info!(
            content = %config.content_dir().display(),
            output = %config.output_dir().display(),
            "starting build"
        );

        self.hooks
            .invoke(HookValue::None, &HookContext::new(BEFORE_BUILD, config));

        self.set_state(BuildState::Scanning);
        let scan = self.store.scan()?;
        let scan = self
            .hooks
            .invoke(HookValue::Scan(scan), &HookContext::new(AFTER_SCAN, config))
            .into_scan()
            .unwrap_or_default()
            .reindex();

        report.errors += scan.failures;
        report.posts = scan.collection(HOME_COLLECTION).count();
        report.pages = scan.documents.len() - report.posts;

        self.set_state(BuildState::Rendering);
        let mut pages = self.render_all(&scan)?;
        report.taxonomy_pages = pages.iter().filter(|p| p.kind.is_taxonomy()).count();
        report.warnings += warn_collisions(&pages);

        pages = self
            .hooks
            .invoke(HookValue::Pages(pages), &HookContext::new(BEFORE_WRITE, config))
            .into_pages()
            .unwrap_or_default();

        self.set_state(BuildState::Generating);
        let assets = AssetProcessor::new(config.assets.ignore.as_slice())?;
        let artifacts = self.generate(&scan, &pages)?;

        self.set_state(BuildState::Writing);
        let output_dir = config.output_dir();
        if config.build.clean {
            self.clean_output(&output_dir)?;
        }
        fs::create_dir_all(&output_dir)?;
        write_pages(&output_dir, &pages)?;
        for artifact in &artifacts {
            write_file(&output_dir.join(artifact.path), &artifact.contents)?;
        }
        report.assets = assets.copy(&config.public_dir(), &output_dir)?;

        report.errors += self.hooks.take_failures();
        report.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let report = self
            .hooks
            .invoke(HookValue::Report(report.clone()), &HookContext::new(AFTER_BUILD, config))
            .into_report()
            .unwrap_or(report);

        info!(
            posts = report.posts,
            pages = report.pages,
            taxonomy_pages = report.taxonomy_pages,
            assets = report.assets,
            errors = report.errors,
            warnings = report.warnings,
            elapsed_ms = report.elapsed_ms,
            "build complete"
        );

        Ok(report)
    }

    /// Render documents, home listing pages and taxonomy pages.
    fn render_all(&self, scan: &ScanResult) -> Result<Vec<RenderedPage>> {
        let site = self.site_data(scan);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.build.concurrency)
            .build()?;

        let documents: Vec<RenderedPage> = pool.install(|| {
            scan.documents
                .par_iter()
                .map(|doc| self.render_document(doc, &site))
                .collect::<Result<_>>()
        })?;
        info!(count = documents.len(), "rendered documents");

        let mut pages = documents;
        pages.extend(self.render_home(scan, &site)?);
        pages.extend(self.render_taxonomies(scan, &site)?);
        Ok(pages)
    }

    fn render_document(&self, doc: &Document, site: &Value) -> Result<RenderedPage> {
        let data = json!({
            "site": site,
            "page": doc,
            "content": doc.rendered_html,
            "breadcrumbs": inkpress_core::router::breadcrumbs(&doc.url),
        });

        let html = self.render_page(&doc.template, data, Some(doc))?;
        debug!(url = %doc.url, template = %doc.template, "rendered document");

        Ok(
            RenderedPage::new(&doc.url, PageKind::Document(doc.route_name.clone()), html)
                .with_lastmod(Some(doc.updated)),
        )
    }

    fn render_home(&self, scan: &ScanResult, site: &Value) -> Result<Vec<RenderedPage>> {
        let posts: Vec<&Document> = scan.collection(HOME_COLLECTION).collect();
        let per_page = self.config.pagination.per_page.max(1);
        let total = posts.len().div_ceil(per_page).max(1);

        (1..=total)
            .map(|number| -> Result<RenderedPage> {
                let start = (number - 1) * per_page;
                let end = (start + per_page).min(posts.len());
                let chunk: &[&Document] = posts.get(start..end).unwrap_or(&[]);
                let url = pagination_route("/", number);
                let data = json!({
                    "site": site,
                    "page": { "title": self.config.site.title, "url": url },
                    "posts": chunk,
                    "pagination": paginate(number, total, "/"),
                });

                let html = self.render_page("index", data, None)?;
                let kind = if number == 1 { PageKind::Home } else { PageKind::Listing };
                Ok(RenderedPage::new(url, kind, html).with_lastmod(newest(chunk.iter().copied())))
            })
            .collect()
    }

    fn render_taxonomies(&self, scan: &ScanResult, site: &Value) -> Result<Vec<RenderedPage>> {
        let mut pages = Vec::with_capacity(scan.by_category.len() + scan.by_tag.len());

        let taxonomies = [
            ("category", &scan.by_category, category_route as fn(&str) -> String),
            ("tag", &scan.by_tag, tag_route),
        ];

        for (kind, index, route) in taxonomies {
            let template = self.taxonomy_template(kind);
            for (name, indices) in index {
                let posts = scan.resolve(indices);
                let url = route(name);
                let data = json!({
                    "site": site,
                    "page": { "title": name, "url": url },
                    "taxonomy": kind,
                    "name": name,
                    "posts": posts,
                });

                let html = self.render_page(template, data, None)?;
                let page_kind = if kind == "category" {
                    PageKind::Category(name.clone())
                } else {
                    PageKind::Tag(name.clone())
                };
                pages.push(
                    RenderedPage::new(url, page_kind, html)
                        .with_lastmod(newest(posts.iter().copied())),
                );
            }
        }

        info!(count = pages.len(), "rendered taxonomy pages");
        Ok(pages)
    }

    /// `category`/`tag`, falling back to `taxonomy` and then `index`.
    fn taxonomy_template(&self, kind: &'static str) -> &'static str {
        [kind, "taxonomy"]
            .into_iter()
            .find(|name| self.templates.has_template(name))
            .unwrap_or("index")
    }

    /// Render through `before:render` and `after:render`.
    fn render_page(&self, template: &str, data: Value, doc: Option<&Document>) -> Result<String> {
        let data = self
            .hooks
            .invoke(HookValue::Json(data), &self.context(BEFORE_RENDER, doc))
            .into_json()
            .unwrap_or_default();

        let html = self.templates.render(template, &data)?;

        Ok(self
            .hooks
            .invoke(HookValue::Html(html), &self.context(AFTER_RENDER, doc))
            .into_html()
            .unwrap_or_default())
    }

    fn context<'a>(&'a self, hook: &'a str, doc: Option<&'a Document>) -> HookContext<'a> {
        let ctx = HookContext::new(hook, &self.config);
        match doc {
            Some(doc) => ctx.with_document(doc),
            None => ctx,
        }
    }

    /// Site-wide template data.
    fn site_data(&self, scan: &ScanResult) -> Value {
        let site = &self.config.site;
        let terms = |index: &BTreeMap<String, Vec<usize>>, route: fn(&str) -> String| {
            index
                .iter()
                .map(|(name, docs)| {
                    json!({ "name": name, "url": route(name), "count": docs.len() })
                })
                .collect::<Vec<_>>()
        };

        json!({
            "title": site.title,
            "description": site.description,
            "author": site.author,
            "url": site.url,
            "language": site.language,
            "categories": terms(&scan.by_category, category_route),
            "tags": terms(&scan.by_tag, tag_route),
            "recent": scan.collection(HOME_COLLECTION).take(5).map(|d| json!({
                "title": d.title,
                "url": d.url,
                "date": d.date,
            })).collect::<Vec<_>>(),
            "features": {
                "search": self.config.features.search,
                "rss": self.config.features.rss,
                "atom": self.config.features.atom,
                "json_feed": self.config.features.json_feed,
            },
        })
    }

    /// Build every enabled derived artifact in memory.
    fn generate(&self, scan: &ScanResult, pages: &[RenderedPage]) -> Result<Vec<Artifact>> {
        let features = &self.config.features;
        let mut artifacts = Vec::new();

        if features.search {
            let index = SearchIndex::build(&scan.documents, Utc::now());
            artifacts.push(Artifact {
                path: SEARCH_INDEX_PATH,
                contents: index.to_json()?,
            });
        }

        let feeds = FeedGenerator::new(self.config.clone());
        let items = feeds.items(&scan.documents);
        if features.rss {
            artifacts.push(Artifact {
                path: RSS_PATH,
                contents: feeds.rss(&items),
            });
        }
        if features.atom {
            artifacts.push(Artifact {
                path: ATOM_PATH,
                contents: feeds.atom(&items),
            });
        }
        if features.json_feed {
            artifacts.push(Artifact {
                path: JSON_FEED_PATH,
                contents: feeds.json_feed(&items)?,
            });
        }

        if features.sitemap {
            artifacts.push(Artifact {
                path: SITEMAP_PATH,
                contents: SitemapGenerator::new(self.config.clone()).generate(pages),
            });
        }
        if features.robots {
            artifacts.push(Artifact {
                path: ROBOTS_PATH,
                contents: robots::generate(&self.config),
            });
        }

        debug!(count = artifacts.len(), "generated artifacts");
        Ok(artifacts)
    }

    /// Empty the output directory, keeping the directory itself.
    fn clean_output(&self, output_dir: &Path) -> Result<()> {
        if !output_dir.exists() {
            return Ok(());
        }

        let root = self.config.root.canonicalize().unwrap_or_else(|_| self.config.root.clone());
        let output = output_dir.canonicalize()?;
        let content = self.config.content_dir().canonicalize().ok();
        if output == root || content.is_some_and(|c| c.starts_with(&output)) {
            return Err(BuildError::UnsafeOutput(output_dir.to_path_buf()));
        }

        debug!(dir = %output_dir.display(), "cleaning output directory");
        for entry in fs::read_dir(output_dir)? {
            let path = entry?.path();
            if path.is_dir() && !path.is_symlink() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn newest<'a>(docs: impl Iterator<Item = &'a Document>) -> Option<DateTime<Utc>> {
    docs.map(|doc| doc.updated).max()
}

/// Log every URL produced by more than one page. Returns the number of
/// colliding URLs.
fn warn_collisions(pages: &[RenderedPage]) -> usize {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for page in pages {
        *seen.entry(page.url.as_str()).or_default() += 1;
    }

    let mut collisions: Vec<(&str, usize)> = seen.into_iter().filter(|(_, n)| *n > 1).collect();
    collisions.sort_unstable();
    for (url, count) in &collisions {
        warn!(url, count, "multiple pages resolve to the same URL, the last one wins");
    }
    collisions.len()
}

fn write_pages(output_dir: &Path, pages: &[RenderedPage]) -> Result<()> {
    for page in pages {
        write_file(&page.output_path(output_dir), &page.html)?;
    }
    info!(count = pages.len(), "wrote pages");
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| BuildError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| BuildError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "wrote file");
    Ok(())
}
