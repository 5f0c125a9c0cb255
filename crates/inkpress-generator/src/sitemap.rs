//! Sitemap generation.
//!
//! Generates an XML sitemap with one entry per written page.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use inkpress_core::Config;
use tracing::debug;

use crate::page::{PageKind, RenderedPage};

pub const SITEMAP_PATH: &str = "sitemap.xml";

/// Change frequency for sitemap entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFreq {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFreq {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Never => "never",
        }
    }
}

/// A sitemap URL entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapUrl {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
    pub changefreq: ChangeFreq,
    /// Priority (0.0 to 1.0).
    pub priority: f32,
}

/// Sitemap generator.
#[derive(Debug)]
pub struct SitemapGenerator {
    config: Arc<Config>,
}

impl SitemapGenerator {
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Generate sitemap XML, entries ordered by URL.
    pub fn generate(&self, pages: &[RenderedPage]) -> String {
        debug!(count = pages.len(), "generating sitemap");

        let mut urls: Vec<SitemapUrl> = pages.iter().map(|page| self.page_to_url(page)).collect();
        urls.sort_by(|a, b| a.loc.cmp(&b.loc));
        urls.dedup_by(|a, b| a.loc == b.loc);

        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
        xml.push('\n');

        for url in &urls {
            xml.push_str(&url_to_xml(url));
        }

        xml.push_str("</urlset>\n");
        xml
    }

    /// Convert a page to a sitemap entry.
    pub fn page_to_url(&self, page: &RenderedPage) -> SitemapUrl {
        let (changefreq, priority) = match &page.kind {
            PageKind::Home => (ChangeFreq::Daily, 1.0),
            PageKind::Listing => (ChangeFreq::Daily, 0.5),
            PageKind::Document(collection) if collection == "posts" => (ChangeFreq::Weekly, 0.8),
            PageKind::Document(_) => (ChangeFreq::Monthly, 0.6),
            PageKind::Category(_) => (ChangeFreq::Weekly, 0.5),
            PageKind::Tag(_) => (ChangeFreq::Weekly, 0.4),
            PageKind::Custom => (ChangeFreq::Monthly, 0.5),
        };

        SitemapUrl {
            loc: self.config.url_for(&page.url),
            lastmod: page.lastmod,
            changefreq,
            priority,
        }
    }
}

fn url_to_xml(url: &SitemapUrl) -> String {
    let mut xml = String::from("  <url>\n");
    xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&url.loc)));

    if let Some(lastmod) = &url.lastmod {
        xml.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            lastmod.format("%Y-%m-%d")
        ));
    }

    xml.push_str(&format!(
        "    <changefreq>{}</changefreq>\n",
        url.changefreq.as_str()
    ));
    xml.push_str(&format!("    <priority>{:.1}</priority>\n", url.priority));
    xml.push_str("  </url>\n");
    xml
}

/// Escape special XML characters.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn generator() -> SitemapGenerator {
        let mut config = Config::new("Test", ".");
        config.site.url = "https://example.com".into();
        SitemapGenerator::new(Arc::new(config))
    }

    #[test]
    fn test_post_entry() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let page = RenderedPage::new("/post/hello", PageKind::Document("posts".into()), "")
            .with_lastmod(Some(date));

        let xml = generator().generate(&[page]);

        assert!(xml.contains("<loc>https://example.com/post/hello</loc>"));
        assert!(xml.contains("<lastmod>2024-03-01</lastmod>"));
        assert!(xml.contains("<changefreq>weekly</changefreq>"));
        assert!(xml.contains("<priority>0.8</priority>"));
    }

    #[test]
    fn test_priorities_by_kind() {
        let generator = generator();
        let priority =
            |kind: PageKind| generator.page_to_url(&RenderedPage::new("/x", kind, "")).priority;

        assert_eq!(priority(PageKind::Home), 1.0);
        assert_eq!(priority(PageKind::Document("pages".into())), 0.6);
        assert_eq!(priority(PageKind::Category("dev".into())), 0.5);
        assert_eq!(priority(PageKind::Tag("rust".into())), 0.4);
    }

    #[test]
    fn test_home_page() {
        let xml = generator().generate(&[RenderedPage::new("/", PageKind::Home, "")]);
        assert!(xml.contains("<loc>https://example.com/</loc>"));
        assert!(xml.contains("<changefreq>daily</changefreq>"));
        assert!(xml.contains("<priority>1.0</priority>"));
        assert!(!xml.contains("<lastmod>"));
    }

    #[test]
    fn test_entries_sorted_and_deduplicated() {
        let pages = vec![
            RenderedPage::new("/b", PageKind::Custom, ""),
            RenderedPage::new("/a", PageKind::Custom, ""),
            RenderedPage::new("/b", PageKind::Custom, ""),
        ];
        let xml = generator().generate(&pages);

        assert_eq!(xml.matches("<url>").count(), 2);
        let a = xml.find("example.com/a").expect("a");
        let b = xml.find("example.com/b").expect("b");
        assert!(a < b);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a & b"), "a &amp; b");
        assert_eq!(escape_xml("<tag>"), "&lt;tag&gt;");
        assert_eq!(escape_xml("\"quoted\""), "&quot;quoted&quot;");
    }
}
