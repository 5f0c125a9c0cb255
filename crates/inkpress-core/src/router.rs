//! Mapping documents to canonical URLs.
//!
//! Everything here is pure: no I/O and no mutation of inputs.

use std::path::{Component, Path};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::{
    config::RouteConfig,
    frontmatter::Frontmatter,
    slug::{normalize_route, slugify, split_date_prefix},
};

/// Compute the canonical URL of a content file.
///
/// `relative` is the file path relative to the content root. An explicit
/// `permalink` wins outright; otherwise the route pattern's placeholders are
/// filled in from the path, the front matter and `date`.
pub fn route(
    relative: &Path,
    route: &RouteConfig,
    front_matter: &Frontmatter,
    date: DateTime<Utc>,
) -> String {
    if let Some(permalink) = front_matter.permalink() {
        return normalize_route(&permalink);
    }

    let slug = front_matter
        .slug()
        .map(|s| slugify(&s))
        .unwrap_or_else(|| path_slug(relative, &route.directory));

    let title = front_matter
        .title()
        .map(|t| slugify(&t))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| slug.clone());

    let category = front_matter
        .categories()
        .first()
        .map(|c| slugify(c))
        .unwrap_or_default();

    let url = route
        .pattern
        .replace(":year", &format!("{:04}", date.year()))
        .replace(":month", &format!("{:02}", date.month()))
        .replace(":day", &format!("{:02}", date.day()))
        .replace(":category", &category)
        .replace(":title", &title)
        .replace(":slug", &slug);

    normalize_route(&url)
}

/// Slug path derived from the file location.
///
/// Strips the collection directory and the extension, drops a trailing
/// `index` segment, strips a `YYYY-MM-DD-` prefix from the last segment and
/// slugifies every segment: `posts/Guides/2024-01-01-Hello World.md` under
/// collection `posts` becomes `guides/hello-world`.
pub fn path_slug(relative: &Path, directory: &str) -> String {
    let relative = relative
        .strip_prefix(directory.trim_matches('/'))
        .unwrap_or(relative);

    let mut segments: Vec<String> = relative
        .with_extension("")
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if segments.last().is_some_and(|last| last == "index") {
        segments.pop();
    }

    if let Some(last) = segments.last_mut()
        && let Some((_, rest)) = split_date_prefix(last)
    {
        *last = rest.to_string();
    }

    segments
        .iter()
        .map(|segment| slugify(segment))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Route of page `page` of a paginated listing rooted at `base`.
pub fn pagination_route(base: &str, page: usize) -> String {
    if page <= 1 {
        normalize_route(base)
    } else {
        normalize_route(&format!("{base}/page/{page}"))
    }
}

pub fn category_route(name: &str) -> String {
    normalize_route(&format!("/category/{}", slugify(name)))
}

pub fn tag_route(name: &str) -> String {
    normalize_route(&format!("/tag/{}", slugify(name)))
}

/// One step of a breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub url: String,
}

/// Breadcrumb trail for a route, starting at the home page.
pub fn breadcrumbs(url: &str) -> Vec<Breadcrumb> {
    let mut trail = vec![Breadcrumb {
        name: "Home".to_string(),
        url: "/".to_string(),
    }];

    let mut current = String::new();
    for segment in url.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        trail.push(Breadcrumb {
            name: crate::slug::title_from_stem(segment),
            url: current.clone(),
        });
    }

    trail
}
