//! Content types and structures.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::frontmatter::Frontmatter;

/// File extensions treated as Markdown content.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdown"];

/// Whether a path has a Markdown extension.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Table of contents entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Heading level (1-6).
    pub level: u8,

    /// Heading text.
    pub text: String,

    /// Anchor ID for linking.
    pub id: String,
}

/// A parsed content file, immutable for the rest of the build.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Absolute path of the source file.
    pub source_path: PathBuf,

    /// Collection the file came from (`posts`, `pages`, ...).
    pub route_name: String,

    /// Front matter exactly as written, in source order.
    pub front_matter: Frontmatter,

    pub title: String,

    /// URL-safe identifier, the last segment of the route slug.
    pub slug: String,

    /// Markdown body without front matter.
    pub raw_body: String,

    /// Body rendered to HTML.
    pub rendered_html: String,

    /// Canonical route, always normalized.
    pub url: String,

    pub excerpt: String,

    pub word_count: usize,

    pub reading_time_minutes: usize,

    /// Resolved publication date.
    pub date: DateTime<Utc>,

    /// Last update, `date` unless front matter says otherwise.
    pub updated: DateTime<Utc>,

    pub tags: Vec<String>,

    pub categories: Vec<String>,

    pub draft: bool,

    /// Template used to render this document.
    pub template: String,

    pub toc: Vec<TocEntry>,
}

impl Document {
    /// Output path for this document under `output_dir`.
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_path_for(output_dir, &self.url)
    }
}

/// Map a route to the file that serves it: `/foo/bar` to
/// `<output>/foo/bar/index.html`, `/` to `<output>/index.html`.
///
/// `.` and `..` segments are dropped so a route never escapes `output_dir`.
pub fn output_path_for(output_dir: &Path, url: &str) -> PathBuf {
    let mut path = output_dir.to_path_buf();
    for segment in url
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
    {
        path.push(segment);
    }
    path.push("index.html");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_markdown() {
        assert!(is_markdown(Path::new("posts/hello.md")));
        assert!(is_markdown(Path::new("posts/hello.MD")));
        assert!(is_markdown(Path::new("posts/hello.markdown")));
        assert!(!is_markdown(Path::new("posts/hello.txt")));
        assert!(!is_markdown(Path::new("posts/README")));
    }

    #[test]
    fn test_output_path_for() {
        let out = Path::new("/site/dist");
        assert_eq!(output_path_for(out, "/"), PathBuf::from("/site/dist/index.html"));
        assert_eq!(
            output_path_for(out, "/foo/bar"),
            PathBuf::from("/site/dist/foo/bar/index.html")
        );
        assert_eq!(
            output_path_for(out, "/post/hello"),
            PathBuf::from("/site/dist/post/hello/index.html")
        );
        assert_eq!(
            output_path_for(out, "/../etc/passwd"),
            PathBuf::from("/site/dist/etc/passwd/index.html")
        );
    }
}
