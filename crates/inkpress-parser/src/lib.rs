//! Inkpress Parser Library
//!
//! Markdown rendering with pluggable block renderers, plus the plain-text
//! statistics (excerpt, word count, reading time) derived from a body.

pub mod markdown;
pub mod syntax;
pub mod text;

use std::fmt::Debug;

pub use markdown::{HeadingAnchors, MarkdownParser, RenderedMarkdown};
pub use syntax::SyntaxHighlighter;
use thiserror::Error;

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    /// Front matter could not be split or parsed.
    #[error("frontmatter error: {0}")]
    Frontmatter(#[from] inkpress_core::CoreError),
}

/// Result type for parser operations.
pub type Result<T> = std::result::Result<T, ParserError>;

/// A block-level rendering override.
///
/// Extensions are consulted in registration order and the first one that
/// returns `Some` produces the HTML for that block. Returning `None` passes
/// the block on to the next extension and finally to the built-ins.
pub trait MarkdownExtension: Debug + Send + Sync {
    /// Render a heading. `id` is the anchor id (explicit `{#id}` or the
    /// slugified text), `inner_html` the rendered content, `text` its plain text.
    fn heading(&self, _level: u8, _id: &str, _inner_html: &str, _text: &str) -> Option<String> {
        None
    }

    /// Render a fenced or indented code block.
    fn code_block(&self, _lang: Option<&str>, _code: &str) -> Option<String> {
        None
    }
}
