//! Plain-text derivations of a Markdown body: excerpt, word count and
//! reading time.

use std::sync::LazyLock;

use regex::Regex;

/// Reading speed used for `reading_time_minutes`.
pub const WORDS_PER_MINUTE: usize = 200;

/// Default excerpt length in characters.
pub const DEFAULT_EXCERPT_LENGTH: usize = 200;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```|~~~.*?~~~").expect("valid regex"));
static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+").expect("valid regex"));
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").expect("valid regex"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*|\b_([^_]+)_\b").expect("valid regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]*)`").expect("valid regex"));
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static CJK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{4e00}-\x{9fa5}]").expect("valid regex"));
static LATIN_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("valid regex"));

/// Strip Markdown formatting, keeping readable text on a single line.
///
/// Code fences and images disappear, links keep their text, heading markers
/// and emphasis markers go away.
pub fn strip_markdown(markdown: &str) -> String {
    let text = CODE_FENCE.replace_all(markdown, "");
    let text = IMAGE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = BOLD.replace_all(&text, "$1$2");
    let text = ITALIC.replace_all(&text, "$1$2");
    let text = INLINE_CODE.replace_all(&text, "$1");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Remove HTML tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let text = HTML_TAG.replace_all(html, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Cut `text` to `max_chars` characters, appending `...` if anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", text[..byte_idx].trim_end()),
        None => text.to_string(),
    }
}

/// Derive an excerpt from a Markdown body.
///
/// Text before `separator` wins when the marker is present, otherwise the
/// first `length` characters of the stripped body.
pub fn excerpt(markdown: &str, separator: &str, length: usize) -> String {
    if !separator.is_empty()
        && let Some((before, _)) = markdown.split_once(separator)
    {
        return strip_markdown(before);
    }

    truncate_chars(&strip_markdown(markdown), length)
}

/// Count words: CJK ideographs individually plus Latin word tokens.
///
/// Code blocks, inline code and markup do not count.
pub fn word_count(markdown: &str) -> usize {
    let text = CODE_FENCE.replace_all(markdown, "");
    let text = INLINE_CODE.replace_all(&text, "");
    let text = strip_markdown(&strip_html(&text));

    let cjk = CJK.find_iter(&text).count();
    let rest = CJK.replace_all(&text, " ");
    cjk + LATIN_WORD.find_iter(&rest).count()
}

/// Whole minutes needed to read `words` words, rounded up.
pub fn reading_time(words: usize) -> usize {
    words.div_ceil(WORDS_PER_MINUTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markdown() {
        let md = "# Title\n\nSome **bold** and *italic* with `code`.\n\n\
                  ![img](/a.png) A [link](https://x.dev).\n\n```rust\nfn main() {}\n```\nEnd";
        assert_eq!(
            strip_markdown(md),
            "Title Some bold and italic with code. A link. End"
        );
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<p>Hello <strong>World</strong></p>"), "Hello World");
        assert_eq!(strip_html("No tags here"), "No tags here");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_chars("Hello world", 5), "Hello...");
        assert_eq!(truncate_chars("你好世界", 2), "你好...");
    }

    #[test]
    fn test_excerpt_uses_separator() {
        let md = "Intro **text**.\n\n<!-- more -->\n\nRest of the post.";
        assert_eq!(excerpt(md, "<!-- more -->", 200), "Intro text.");
    }

    #[test]
    fn test_excerpt_truncates() {
        let md = "word ".repeat(100);
        let result = excerpt(&md, "<!-- more -->", 20);
        assert!(result.ends_with("..."));
        assert_eq!(result.chars().count(), 20 + 3 - 1);
    }

    #[test]
    fn test_excerpt_short_body_not_truncated() {
        assert_eq!(excerpt("Just a line.", "<!-- more -->", 200), "Just a line.");
    }

    #[test]
    fn test_word_count_latin() {
        assert_eq!(word_count("Hello world, this is Rust."), 5);
    }

    #[test]
    fn test_word_count_cjk() {
        assert_eq!(word_count("你好世界 hello"), 5);
    }

    #[test]
    fn test_word_count_ignores_code() {
        assert_eq!(word_count("One two\n\n```\nlet a = b;\n```\n\nthree `four`"), 3);
    }

    #[test]
    fn test_reading_time() {
        assert_eq!(reading_time(0), 0);
        assert_eq!(reading_time(1), 1);
        assert_eq!(reading_time(200), 1);
        assert_eq!(reading_time(201), 2);
    }
}
