//! Content discovery and parsing.
//!
//! Walks each configured collection directory, turns every Markdown file into
//! a [`Document`] and indexes documents by category and tag.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use inkpress_core::{
    Config, Document, RouteConfig,
    content::is_markdown,
    frontmatter::parse_date,
    router,
    slug::{split_date_prefix, title_from_stem},
};
use inkpress_parser::{MarkdownParser, text};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Content collection errors.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The content root itself does not exist.
    #[error("content directory not found: {0}")]
    ContentRootMissing(PathBuf),

    /// A single file could not be turned into a document.
    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The parsing worker pool could not be created.
    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Output of one scan: every document plus the taxonomy indexes.
///
/// Index values are positions in `documents`.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Documents, newest first.
    pub documents: Vec<Document>,

    pub by_category: BTreeMap<String, Vec<usize>>,

    pub by_tag: BTreeMap<String, Vec<usize>>,

    /// Files skipped because they failed to parse.
    pub failures: usize,
}

impl ScanResult {
    /// Build the taxonomy indexes for an already sorted document list.
    pub fn new(documents: Vec<Document>, failures: usize) -> Self {
        let mut by_category: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut by_tag: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (index, doc) in documents.iter().enumerate() {
            for category in &doc.categories {
                by_category.entry(category.clone()).or_default().push(index);
            }
            for tag in &doc.tags {
                by_tag.entry(tag.clone()).or_default().push(index);
            }
        }

        Self {
            documents,
            by_category,
            by_tag,
            failures,
        }
    }

    /// Rebuild the indexes, e.g. after a hook replaced the document list.
    pub fn reindex(self) -> Self {
        Self::new(self.documents, self.failures)
    }

    /// Documents of one collection, in scan order.
    pub fn collection<'a>(
        &'a self,
        route_name: &'a str,
    ) -> impl Iterator<Item = &'a Document> + 'a {
        self.documents
            .iter()
            .filter(move |doc| doc.route_name == route_name)
    }

    /// Resolve index positions to documents.
    pub fn resolve(&self, indices: &[usize]) -> Vec<&Document> {
        indices
            .iter()
            .filter_map(|&i| self.documents.get(i))
            .collect()
    }
}

/// Scans content collections into documents.
#[derive(Debug)]
pub struct ContentStore {
    config: Arc<Config>,
    parser: MarkdownParser,
}

impl ContentStore {
    /// Create a new content store.
    #[must_use]
    pub fn new(config: Arc<Config>, parser: MarkdownParser) -> Self {
        Self { config, parser }
    }

    /// Scan every configured collection.
    ///
    /// Files that fail to parse are logged and skipped. A missing collection
    /// directory counts as an empty collection; a missing content root is
    /// an error.
    pub fn scan(&self) -> Result<ScanResult> {
        let content_dir = self.config.content_dir();
        if !content_dir.is_dir() {
            return Err(CollectorError::ContentRootMissing(content_dir));
        }

        info!(dir = %content_dir.display(), "scanning content");

        let mut files = Vec::new();
        for (name, route) in &self.config.routes {
            let dir = content_dir.join(&route.directory);
            if !dir.is_dir() {
                warn!(
                    collection = %name,
                    dir = %dir.display(),
                    "collection directory missing, skipping"
                );
                continue;
            }
            files.extend(
                find_markdown_files(&dir)
                    .into_iter()
                    .map(|path| (name.as_str(), route, path)),
            );
        }

        info!(count = files.len(), "found content files");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.build.concurrency)
            .build()?;

        let results: Vec<_> = pool.install(|| {
            files
                .par_iter()
                .map(|(name, route, path)| (path, self.load_document(path, name, route)))
                .collect()
        });

        let mut documents = Vec::with_capacity(results.len());
        let mut failures = 0;
        for (path, result) in results {
            match result {
                Ok(doc) if doc.draft && !self.config.build.drafts => {
                    debug!(url = %doc.url, "skipping draft");
                }
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    error!(
                        path = %path.display(),
                        error = %e,
                        "failed to parse content file, skipping"
                    );
                    failures += 1;
                }
            }
        }

        // Completion order under the pool is arbitrary.
        documents.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.url.cmp(&b.url)));

        let result = ScanResult::new(documents, failures);

        info!(
            documents = result.documents.len(),
            failures = result.failures,
            tags = result.by_tag.len(),
            categories = result.by_category.len(),
            "content scan complete"
        );

        Ok(result)
    }

    /// Parse one file of collection `route_name` into a document.
    pub fn load_document(
        &self,
        path: &Path,
        route_name: &str,
        route: &RouteConfig,
    ) -> Result<Document> {
        debug!(path = %path.display(), "parsing file");

        let source = fs::read_to_string(path)?;
        let parsed = self.parser.parse(&source, path).map_err(|e| CollectorError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let fm = parsed.frontmatter;
        let content_dir = self.config.content_dir();
        let relative = path.strip_prefix(&content_dir).unwrap_or(path);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let date = fm
            .date("date")
            .or_else(|| split_date_prefix(&stem).and_then(|(prefix, _)| parse_date(prefix)))
            .or_else(|| modified_time(path))
            .unwrap_or_else(Utc::now);
        let updated = fm.date("updated").unwrap_or(date);

        let url = router::route(relative, route, &fm, date);
        let slug = fm
            .slug()
            .map(|s| inkpress_core::slugify(&s))
            .unwrap_or_else(|| {
                router::path_slug(relative, &route.directory)
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            });

        let title = fm.title().unwrap_or_else(|| {
            let base = split_date_prefix(&stem).map_or(stem.as_str(), |(_, rest)| rest);
            title_from_stem(base)
        });

        let excerpt = fm.excerpt().unwrap_or_else(|| {
            text::excerpt(
                &parsed.raw,
                &self.config.build.excerpt_separator,
                self.config.build.excerpt_length,
            )
        });

        let word_count = text::word_count(&parsed.raw);

        Ok(Document {
            source_path: path.to_path_buf(),
            route_name: route_name.to_string(),
            title,
            slug,
            url,
            excerpt,
            word_count,
            reading_time_minutes: text::reading_time(word_count),
            date,
            updated,
            tags: fm.tags(),
            categories: fm.categories(),
            draft: fm.draft(),
            template: fm.template().unwrap_or_else(|| route.template.clone()),
            toc: parsed.toc,
            rendered_html: parsed.html,
            raw_body: parsed.raw,
            front_matter: fm,
        })
    }
}

/// All Markdown files below `dir`, skipping hidden entries, in path order.
fn find_markdown_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "failed to read directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_markdown(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn setup() -> (TempDir, Arc<Config>) {
        let dir = TempDir::new().expect("create temp dir");
        fs::create_dir_all(dir.path().join("content/posts")).expect("mkdir");
        fs::create_dir_all(dir.path().join("content/pages")).expect("mkdir");
        let config = Config::new("Test Site", dir.path());
        (dir, Arc::new(config))
    }

    fn store(config: &Arc<Config>) -> ContentStore {
        ContentStore::new(config.clone(), MarkdownParser::new())
    }

    #[test]
    fn test_hello_scenario() {
        let (dir, config) = setup();
        fs::write(
            dir.path().join("content/posts/2024-01-01-hello.md"),
            "---\ntitle: \"Hello\"\ntags: \"a,b\"\n---\n\nHi there.",
        )
        .expect("write");

        let result = store(&config).scan().expect("scan");

        assert_eq!(result.documents.len(), 1);
        let doc = &result.documents[0];
        assert_eq!(doc.url, "/post/hello");
        assert_eq!(doc.slug, "hello");
        assert_eq!(doc.tags, vec!["a", "b"]);
        assert_eq!(doc.route_name, "posts");
        assert_eq!(doc.template, "post");
        assert_eq!(doc.date.format("%Y-%m-%d").to_string(), "2024-01-01");
        assert_eq!(doc.updated, doc.date);
    }

    #[test]
    fn test_malformed_yaml_is_skipped() {
        let (dir, config) = setup();
        fs::write(
            dir.path().join("content/posts/bad.md"),
            "---\ntitle: [oops\n---\nBody",
        )
        .expect("write");
        fs::write(
            dir.path().join("content/posts/good.md"),
            "---\ntitle: Good\n---\nBody",
        )
        .expect("write");

        let result = store(&config).scan().expect("scan");

        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.documents[0].title, "Good");
        assert_eq!(result.failures, 1);
    }

    #[test]
    fn test_missing_collection_is_empty() {
        let (dir, config) = setup();
        fs::write(dir.path().join("content/pages/about.md"), "About me").expect("write");

        let result = store(&config).scan().expect("scan");

        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.documents[0].url, "/about");
        assert_eq!(result.documents[0].title, "About");
    }

    #[test]
    fn test_missing_content_root_is_fatal() {
        let dir = TempDir::new().expect("create temp dir");
        let config = Arc::new(Config::new("Test", dir.path()));

        let err = store(&config).scan().unwrap_err();
        assert!(matches!(err, CollectorError::ContentRootMissing(_)));
    }

    #[test]
    fn test_sorted_newest_first() {
        let (dir, config) = setup();
        for (name, date) in [("a", "2024-01-01"), ("b", "2024-03-01"), ("c", "2024-02-01")] {
            fs::write(
                dir.path().join(format!("content/posts/{name}.md")),
                format!("---\ntitle: {name}\ndate: {date}\n---\nBody"),
            )
            .expect("write");
        }

        let result = store(&config).scan().expect("scan");
        let titles: Vec<_> = result.documents.iter().map(|d| d.title.as_str()).collect();

        assert_eq!(titles, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_drafts_excluded_by_default() {
        let (dir, config) = setup();
        fs::write(
            dir.path().join("content/posts/wip.md"),
            "---\ntitle: WIP\ndraft: true\n---\nBody",
        )
        .expect("write");

        assert!(store(&config).scan().expect("scan").documents.is_empty());

        let mut with_drafts = (*config).clone();
        with_drafts.build.drafts = true;
        let result = store(&Arc::new(with_drafts)).scan().expect("scan");
        assert_eq!(result.documents.len(), 1);
        assert!(result.documents[0].draft);
    }

    #[test]
    fn test_taxonomy_index() {
        let (dir, config) = setup();
        fs::write(
            dir.path().join("content/posts/one.md"),
            "---\ntitle: One\ndate: 2024-02-01\ntags: [rust, web]\ncategory: Dev\n---\nBody",
        )
        .expect("write");
        fs::write(
            dir.path().join("content/posts/two.md"),
            "---\ntitle: Two\ndate: 2024-01-01\ntags: rust\n---\nBody",
        )
        .expect("write");

        let result = store(&config).scan().expect("scan");

        let rust: Vec<_> = result
            .resolve(&result.by_tag["rust"])
            .iter()
            .map(|d| d.title.clone())
            .collect();
        assert_eq!(rust, vec!["One", "Two"]);
        assert_eq!(result.by_tag["web"].len(), 1);
        assert_eq!(result.by_category["Dev"].len(), 1);
    }

    #[test]
    fn test_derived_fields() {
        let (dir, config) = setup();
        fs::write(
            dir.path().join("content/posts/stats.md"),
            format!("---\ntitle: Stats\n---\n\n# Heading\n\n{}", "word ".repeat(250)),
        )
        .expect("write");

        let result = store(&config).scan().expect("scan");
        let doc = &result.documents[0];

        assert_eq!(doc.word_count, 251);
        assert_eq!(doc.reading_time_minutes, 2);
        assert!(doc.excerpt.ends_with("..."));
        assert!(doc.rendered_html.contains("id=\"heading\""));
        assert_eq!(doc.toc.len(), 1);
    }

    #[test]
    fn test_hidden_files_ignored() {
        let (dir, config) = setup();
        fs::create_dir_all(dir.path().join("content/posts/.trash")).expect("mkdir");
        fs::write(dir.path().join("content/posts/.trash/old.md"), "old").expect("write");
        fs::write(dir.path().join("content/posts/notes.txt"), "not markdown").expect("write");

        assert!(store(&config).scan().expect("scan").documents.is_empty());
    }
}
