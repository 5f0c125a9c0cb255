//! Client-side search index.
//!
//! The index is a JSON file listing every published document. [`query`] and
//! [`suggest`] implement the same ranking the browser script uses, so the
//! index can also be searched offline.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use inkpress_core::Document;
use serde::{Deserialize, Serialize};

pub const SEARCH_INDEX_PATH: &str = "search/index.json";

const INDEX_VERSION: &str = "1.0";

/// Queries shorter than this return nothing.
pub const MIN_QUERY_LENGTH: usize = 2;

const MAX_SUGGESTIONS: usize = 10;

/// One searchable document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub title: String,
    pub excerpt: String,
    pub date: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
}

impl SearchEntry {
    pub fn from_document(doc: &Document) -> Self {
        let date = doc.date.to_rfc3339_opts(SecondsFormat::Secs, true);
        let id = entry_id(&doc.url, &doc.title, &date);
        Self {
            id,
            kind: singular(&doc.route_name),
            url: doc.url.clone(),
            title: doc.title.clone(),
            excerpt: doc.excerpt.clone(),
            date,
            tags: doc.tags.clone(),
            categories: doc.categories.clone(),
        }
    }
}

/// The `search/index.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndex {
    pub version: String,
    /// When the index was written. The only field that differs between
    /// builds of unchanged content.
    pub generated: String,
    pub total: usize,
    pub index: Vec<SearchEntry>,
}

impl SearchIndex {
    /// Index every non-draft document, keeping the given order.
    pub fn build<'a>(
        documents: impl IntoIterator<Item = &'a Document>,
        generated: DateTime<Utc>,
    ) -> Self {
        let index: Vec<SearchEntry> = documents
            .into_iter()
            .filter(|doc| !doc.draft)
            .map(SearchEntry::from_document)
            .collect();

        Self {
            version: INDEX_VERSION.to_string(),
            generated: generated.to_rfc3339_opts(SecondsFormat::Millis, true),
            total: index.len(),
            index,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// First 8 hex chars of the blake3 hash of `url|title|date`.
fn entry_id(url: &str, title: &str, date: &str) -> String {
    let hash = blake3::hash(format!("{url}|{title}|{date}").as_bytes());
    hash.to_hex().as_str()[..8].to_string()
}

/// `posts` to `post`; names without a trailing `s` are kept.
fn singular(collection: &str) -> String {
    collection
        .strip_suffix('s')
        .filter(|s| !s.is_empty())
        .unwrap_or(collection)
        .to_string()
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit<'a> {
    pub entry: &'a SearchEntry,
    pub score: u32,
}

/// Relevance of `entry` for an already lowercased query.
pub fn score(entry: &SearchEntry, query: &str) -> u32 {
    let title = entry.title.to_lowercase();
    let excerpt = entry.excerpt.to_lowercase();
    let mut score = 0;

    if title.contains(query) {
        score += 10;
        if title == query {
            score += 20;
        }
    }
    if excerpt.contains(query) {
        score += 5;
    }
    score += 3 * entry
        .tags
        .iter()
        .filter(|t| t.to_lowercase().contains(query))
        .count() as u32;
    score += 3 * entry
        .categories
        .iter()
        .filter(|c| c.to_lowercase().contains(query))
        .count() as u32;
    if format!("{title} {excerpt}").contains(query) {
        score += 1;
    }

    score
}

/// Entries matching `query`, best first, at most `limit`.
pub fn query<'a>(entries: &'a [SearchEntry], query: &str, limit: usize) -> Vec<SearchHit<'a>> {
    let query = query.trim().to_lowercase();
    if query.chars().count() < MIN_QUERY_LENGTH {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit<'a>> = entries
        .iter()
        .map(|entry| SearchHit {
            entry,
            score: score(entry, &query),
        })
        .filter(|hit| hit.score > 0)
        .collect();

    // Stable sort keeps index order among equal scores.
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(limit);
    hits
}

/// Completions for a prefix: longer title words, then tags and categories.
pub fn suggest(entries: &[SearchEntry], prefix: &str) -> Vec<String> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.is_empty() {
        return Vec::new();
    }

    let mut seen = BTreeSet::new();
    let mut suggestions = Vec::new();
    let mut push = |s: String| {
        if seen.insert(s.clone()) {
            suggestions.push(s);
        }
    };

    for entry in entries {
        for word in entry.title.to_lowercase().split_whitespace() {
            if word.starts_with(&prefix) && word.len() > prefix.len() {
                push(word.to_string());
            }
        }
        for term in entry.tags.iter().chain(&entry.categories) {
            if term.to_lowercase().starts_with(&prefix) {
                push(term.clone());
            }
        }
    }

    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}
