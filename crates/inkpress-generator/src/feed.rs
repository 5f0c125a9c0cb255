//! Syndication feeds: RSS 2.0, Atom 1.0 and JSON Feed 1.1.
//!
//! All three are built from the same item list, newest first, capped at
//! `feed.limit`. Channel-level timestamps come from the newest item so an
//! unchanged site produces byte-identical feeds.

use std::sync::Arc;

use atom_syndication::{
    Category as AtomCategory, Entry, EntryBuilder, Feed, FeedBuilder, FixedDateTime,
    GeneratorBuilder, Link, LinkBuilder, PersonBuilder, Text,
};
use chrono::{DateTime, Utc};
use inkpress_core::{Config, Document};
use rss::{ChannelBuilder, GuidBuilder, Item, ItemBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub const RSS_PATH: &str = "rss.xml";
pub const ATOM_PATH: &str = "atom.xml";
pub const JSON_FEED_PATH: &str = "feed.json";

const JSON_FEED_VERSION: &str = "https://jsonfeed.org/version/1.1";
const GENERATOR: &str = "inkpress";

/// Feed generation errors.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("JSON feed serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Builds every feed format for a site.
#[derive(Debug, Clone)]
pub struct FeedGenerator {
    config: Arc<Config>,
}

impl FeedGenerator {
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Documents that belong in feeds: the configured collection, newest
    /// first, capped at the configured limit.
    pub fn items<'a>(&self, documents: &'a [Document]) -> Vec<&'a Document> {
        let mut items: Vec<&Document> = documents
            .iter()
            .filter(|doc| doc.route_name == self.config.feed.collection)
            .collect();
        items.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.url.cmp(&b.url)));
        items.truncate(self.config.feed.limit);
        items
    }

    fn newest(items: &[&Document]) -> DateTime<Utc> {
        items
            .iter()
            .map(|doc| doc.updated.max(doc.date))
            .max()
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    fn description(&self) -> &str {
        if self.config.site.description.is_empty() {
            &self.config.site.title
        } else {
            &self.config.site.description
        }
    }

    /// RSS 2.0 channel XML.
    pub fn rss(&self, items: &[&Document]) -> String {
        debug!(count = items.len(), "generating RSS feed");

        let rss_items: Vec<Item> = items.iter().map(|doc| self.rss_item(doc)).collect();

        let channel = ChannelBuilder::default()
            .title(&self.config.site.title)
            .link(self.config.url_for("/"))
            .description(self.description())
            .language(Some(self.config.site.language.clone()))
            .generator(Some(GENERATOR.to_string()))
            .last_build_date(Some(Self::newest(items).to_rfc2822()))
            .items(rss_items)
            .build();

        channel.to_string()
    }

    fn rss_item(&self, doc: &Document) -> Item {
        let url = self.config.url_for(&doc.url);
        let guid = GuidBuilder::default().value(&url).permalink(true).build();

        let mut builder = ItemBuilder::default();
        builder.title(Some(doc.title.clone()));
        builder.link(Some(url));
        builder.guid(Some(guid));
        builder.pub_date(Some(doc.date.to_rfc2822()));
        builder.description(Some(doc.excerpt.clone()));

        if !self.config.site.author.is_empty() {
            builder.author(Some(self.config.site.author.clone()));
        }

        let categories: Vec<_> = doc
            .categories
            .iter()
            .chain(&doc.tags)
            .map(|name| rss::Category {
                name: name.clone(),
                domain: None,
            })
            .collect();
        if !categories.is_empty() {
            builder.categories(categories);
        }

        builder.build()
    }

    /// Atom 1.0 feed XML.
    pub fn atom(&self, items: &[&Document]) -> String {
        debug!(count = items.len(), "generating Atom feed");

        let home = self.config.url_for("/");
        let entries: Vec<Entry> = items.iter().map(|doc| self.atom_entry(doc)).collect();

        let self_link: Link = LinkBuilder::default()
            .href(self.config.url_for(ATOM_PATH))
            .rel("self".to_string())
            .mime_type(Some("application/atom+xml".to_string()))
            .build();
        let alternate_link: Link = LinkBuilder::default()
            .href(home.clone())
            .rel("alternate".to_string())
            .build();

        let mut builder = FeedBuilder::default();
        builder
            .title(Text::plain(self.config.site.title.clone()))
            .id(home)
            .updated(fixed(Self::newest(items)))
            .links(vec![self_link, alternate_link])
            .subtitle(Some(Text::plain(self.description().to_string())))
            .generator(Some(GeneratorBuilder::default().value(GENERATOR).build()))
            .lang(Some(self.config.site.language.clone()))
            .entries(entries);

        if !self.config.site.author.is_empty() {
            builder.authors(vec![
                PersonBuilder::default()
                    .name(self.config.site.author.clone())
                    .build(),
            ]);
        }

        let feed: Feed = builder.build();
        feed.to_string()
    }

    fn atom_entry(&self, doc: &Document) -> Entry {
        let url = self.config.url_for(&doc.url);
        let link: Link = LinkBuilder::default()
            .href(url.clone())
            .rel("alternate".to_string())
            .build();

        let categories: Vec<AtomCategory> = doc
            .categories
            .iter()
            .chain(&doc.tags)
            .map(|term| AtomCategory {
                term: term.clone(),
                ..Default::default()
            })
            .collect();

        EntryBuilder::default()
            .title(Text::plain(doc.title.clone()))
            .id(url)
            .updated(fixed(doc.updated))
            .published(Some(fixed(doc.date)))
            .links(vec![link])
            .summary(Some(Text::plain(doc.excerpt.clone())))
            .categories(categories)
            .build()
    }

    /// JSON Feed 1.1 document.
    pub fn json_feed(&self, items: &[&Document]) -> Result<String> {
        debug!(count = items.len(), "generating JSON feed");

        let authors = if self.config.site.author.is_empty() {
            Vec::new()
        } else {
            vec![JsonFeedAuthor {
                name: &self.config.site.author,
            }]
        };

        let feed = JsonFeed {
            version: JSON_FEED_VERSION,
            title: &self.config.site.title,
            home_page_url: self.config.url_for("/"),
            feed_url: self.config.url_for(JSON_FEED_PATH),
            description: self.description(),
            language: &self.config.site.language,
            authors,
            items: items
                .iter()
                .map(|doc| {
                    let url = self.config.url_for(&doc.url);
                    JsonFeedItem {
                        id: url.clone(),
                        url,
                        title: &doc.title,
                        content_html: &doc.rendered_html,
                        summary: &doc.excerpt,
                        date_published: doc.date.to_rfc3339(),
                        date_modified: doc.updated.to_rfc3339(),
                        tags: doc.tags.iter().chain(&doc.categories).map(String::as_str).collect(),
                    }
                })
                .collect(),
        };

        Ok(serde_json::to_string_pretty(&feed)?)
    }
}

fn fixed(date: DateTime<Utc>) -> FixedDateTime {
    date.fixed_offset()
}

#[derive(Serialize)]
struct JsonFeed<'a> {
    version: &'static str,
    title: &'a str,
    home_page_url: String,
    feed_url: String,
    description: &'a str,
    language: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    authors: Vec<JsonFeedAuthor<'a>>,
    items: Vec<JsonFeedItem<'a>>,
}

#[derive(Serialize)]
struct JsonFeedAuthor<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct JsonFeedItem<'a> {
    id: String,
    url: String,
    title: &'a str,
    content_html: &'a str,
    summary: &'a str,
    date_published: String,
    date_modified: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
}
