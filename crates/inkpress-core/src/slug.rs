//! Slug generation and URL path normalization.

use deunicode::deunicode;

/// Turn arbitrary text into a URL-safe slug.
///
/// Non-ASCII text is transliterated first, so `"你好 World"` becomes
/// `"ni-hao-world"`. Whitespace, `-` and `_` become separators, other
/// punctuation is dropped. The result only contains `[a-z0-9-]` and never
/// starts or ends with `-`.
pub fn slugify(text: &str) -> String {
    let ascii = deunicode(text).to_lowercase();
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_separator = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_separator = true;
        }
    }

    slug
}

/// Normalize a URL path: leading `/`, no repeated `/`, no trailing `/`
/// unless the path is the root.
pub fn normalize_route(route: &str) -> String {
    let segments: Vec<&str> = route.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

/// Split a `YYYY-MM-DD-` prefix off a file stem.
///
/// Returns the date part and the remainder, or `None` when the stem does
/// not start with a date.
pub fn split_date_prefix(stem: &str) -> Option<(&str, &str)> {
    let bytes = stem.as_bytes();
    if bytes.len() < 11 {
        return None;
    }

    let is_digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);
    let shaped = is_digits(0..4)
        && bytes[4] == b'-'
        && is_digits(5..7)
        && bytes[7] == b'-'
        && is_digits(8..10)
        && bytes[10] == b'-';

    shaped.then(|| (&stem[..10], &stem[11..]))
}

/// Human title from a file stem: `my-first_post` becomes `My First Post`.
pub fn title_from_stem(stem: &str) -> String {
    stem.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
