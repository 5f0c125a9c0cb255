//! Frontmatter parsing for content files.
//!
//! Front matter is kept as an ordered YAML mapping so custom fields survive
//! untouched. Typed accessors coerce the well-known keys.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::error::{CoreError, Result};

/// Delimiter types for frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    /// YAML frontmatter delimited by `---`.
    Yaml,
    /// TOML frontmatter delimited by `+++`.
    Toml,
}

impl FrontmatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// Frontmatter metadata for a content file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Frontmatter {
    data: Mapping,
}

impl Frontmatter {
    pub fn from_mapping(data: Mapping) -> Self {
        Self { data }
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.data.insert(Value::String(key.to_string()), value.into());
    }

    /// A non-empty scalar rendered as a string.
    pub fn str(&self, key: &str) -> Option<String> {
        let value = match self.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }

    pub fn title(&self) -> Option<String> {
        self.str("title")
    }

    pub fn slug(&self) -> Option<String> {
        self.str("slug")
    }

    pub fn permalink(&self) -> Option<String> {
        self.str("permalink")
    }

    pub fn excerpt(&self) -> Option<String> {
        self.str("excerpt")
    }

    /// Template override, `template` taking precedence over `layout`.
    pub fn template(&self) -> Option<String> {
        self.str("template").or_else(|| self.str("layout"))
    }

    pub fn draft(&self) -> bool {
        match self.get("draft") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Parse a date-valued key. `None` if absent or unparseable.
    pub fn date(&self, key: &str) -> Option<DateTime<Utc>> {
        self.str(key).and_then(|s| parse_date(&s))
    }

    /// Tags, normalized to a list of strings.
    pub fn tags(&self) -> Vec<String> {
        string_list(self.get("tags"))
    }

    /// Categories from both `categories` and `category`, without duplicates.
    pub fn categories(&self) -> Vec<String> {
        let mut categories = string_list(self.get("categories"));
        for category in string_list(self.get("category")) {
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
        categories
    }
}

/// Coerce a front matter value into a list of strings.
///
/// A string is split on commas and trimmed, a sequence passes through, and
/// anything absent becomes an empty list.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::Number(n)) => vec![n.to_string()],
        _ => Vec::new(),
    }
}

/// Parse the date formats people write in front matter.
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Split content into frontmatter and body.
///
/// The closing delimiter must start a line. Returns `None` when there is no
/// opening delimiter or the block is never closed.
pub fn split_frontmatter(content: &str) -> Option<(FrontmatterFormat, &str, &str)> {
    let content = content.trim_start_matches('\u{feff}').trim_start();

    let format = if content.starts_with("---") {
        FrontmatterFormat::Yaml
    } else if content.starts_with("+++") {
        FrontmatterFormat::Toml
    } else {
        return None;
    };

    let delimiter = format.delimiter();
    let after_first = &content[delimiter.len()..];
    let closing_pos = after_first.find(&format!("\n{delimiter}"))? + 1;

    let frontmatter = after_first[..closing_pos].trim();
    let body = after_first[closing_pos + delimiter.len()..].trim_start();

    Some((format, frontmatter, body))
}

/// Parse frontmatter from a string.
pub fn parse_frontmatter(content: &str, path: &Path) -> Result<(Frontmatter, String)> {
    let Some((format, fm_str, body)) = split_frontmatter(content) else {
        return Ok((Frontmatter::default(), content.to_string()));
    };

    let value = match format {
        FrontmatterFormat::Yaml => {
            serde_yaml::from_str::<Value>(fm_str)
                .map_err(|e| CoreError::frontmatter(path, e.to_string()))?
        }
        FrontmatterFormat::Toml => {
            let table: toml::Table =
                toml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?;
            toml_to_yaml(toml::Value::Table(table))
        }
    };

    let data = match value {
        Value::Mapping(map) => map,
        Value::Null => Mapping::new(),
        _ => return Err(CoreError::frontmatter(path, "front matter must be a mapping")),
    };

    Ok((Frontmatter::from_mapping(data), body.to_string()))
}

fn toml_to_yaml(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Value::Number(f.into()),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Sequence(items.into_iter().map(toml_to_yaml).collect()),
        toml::Value::Table(table) => Value::Mapping(
            table
                .into_iter()
                .map(|(k, v)| (Value::String(k), toml_to_yaml(v)))
                .collect(),
        ),
    }
}
