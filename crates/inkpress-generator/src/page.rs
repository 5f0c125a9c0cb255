//! Rendered output pages.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use inkpress_core::content::output_path_for;
use serde::Serialize;

/// What produced a page. Drives sitemap priority and report counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum PageKind {
    /// First page of the home listing.
    Home,
    /// Later pages of the home listing.
    Listing,
    /// A content document, with its collection name.
    Document(String),
    Category(String),
    Tag(String),
    /// Added by a plugin.
    Custom,
}

impl PageKind {
    pub fn is_taxonomy(&self) -> bool {
        matches!(self, Self::Category(_) | Self::Tag(_))
    }
}

/// One HTML page ready to be written.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPage {
    /// Normalized route.
    pub url: String,
    pub kind: PageKind,
    pub html: String,
    /// Last content change, for the sitemap.
    pub lastmod: Option<DateTime<Utc>>,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, kind: PageKind, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            html: html.into(),
            lastmod: None,
        }
    }

    #[must_use]
    pub fn with_lastmod(mut self, lastmod: Option<DateTime<Utc>>) -> Self {
        self.lastmod = lastmod;
        self
    }

    /// Where this page lands under `output_dir`.
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_path_for(output_dir, &self.url)
    }
}
