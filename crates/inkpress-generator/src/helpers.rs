//! Helper functions exposed to every template.

use chrono::{DateTime, Utc};
use inkpress_core::{frontmatter::parse_date, router::pagination_route};
use inkpress_parser::text;
use serde::Serialize;

/// Number of page links shown by [`paginate`].
pub const PAGINATION_WINDOW: usize = 5;

/// Format a date string with a strftime pattern. Unparseable input comes
/// back unchanged.
pub fn format_date(date: &str, pattern: &str) -> String {
    match parse_date(date) {
        Some(parsed) => parsed.format(pattern).to_string(),
        None => date.to_string(),
    }
}

/// Relative description of `date` as seen from `now`, e.g. `3 days ago`.
pub fn time_ago(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - date).num_seconds();
    let (amount, unit, future) = {
        let abs = seconds.unsigned_abs();
        let future = seconds < 0;
        match abs {
            0..=44 => return "a few seconds ago".to_string(),
            45..=3_599 => ((abs / 60).max(1), "minute", future),
            3_600..=86_399 => (abs / 3_600, "hour", future),
            86_400..=2_591_999 => (abs / 86_400, "day", future),
            2_592_000..=31_535_999 => (abs / 2_592_000, "month", future),
            _ => (abs / 31_536_000, "year", future),
        }
    };

    let plural = if amount == 1 { "" } else { "s" };
    if future {
        format!("in {amount} {unit}{plural}")
    } else {
        format!("{amount} {unit}{plural} ago")
    }
}

/// Markdown-stripped excerpt of `text`.
pub fn excerpt(source: &str, length: usize) -> String {
    text::excerpt(source, "", length)
}

/// Absolute URL for `path` on the configured site. Absolute URLs pass through.
pub fn url(site_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("//") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        site_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Root-relative path of a static asset.
pub fn asset(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One entry of a pagination bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLink {
    pub number: usize,
    pub url: String,
    pub current: bool,
}

/// Pagination bar: a window of page links plus prev/next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current: usize,
    pub total: usize,
    pub pages: Vec<PageLink>,
    pub prev: Option<PageLink>,
    pub next: Option<PageLink>,
}

/// Windowed page list centred on `current`, clamped to `[1, total]`.
pub fn paginate(current: usize, total: usize, base_url: &str) -> Pagination {
    let total = total.max(1);
    let current = current.clamp(1, total);
    let link = |number: usize| PageLink {
        number,
        url: pagination_route(base_url, number),
        current: number == current,
    };

    let span = PAGINATION_WINDOW - 1;
    let mut start = current.saturating_sub(span / 2).max(1);
    let end = (start + span).min(total);
    if end - start < span {
        start = end.saturating_sub(span).max(1);
    }

    Pagination {
        current,
        total,
        pages: (start..=end).map(link).collect(),
        prev: (current > 1).then(|| link(current - 1)),
        next: (current < total).then(|| link(current + 1)),
    }
}
