//! Markdown parser using pulldown-cmark.

use std::{path::Path, sync::Arc};

use inkpress_core::{
    Frontmatter, TocEntry,
    frontmatter::parse_frontmatter,
    slugify,
};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::{
    MarkdownExtension, Result,
    syntax::{SyntaxHighlighter, html_escape},
};

/// Rendered body of a Markdown document.
#[derive(Debug, Clone, Default)]
pub struct RenderedMarkdown {
    pub html: String,
    pub toc: Vec<TocEntry>,
}

/// Front matter plus rendered body.
#[derive(Debug, Clone)]
pub struct ParsedMarkdown {
    pub frontmatter: Frontmatter,

    /// Body without front matter.
    pub raw: String,

    pub html: String,

    pub toc: Vec<TocEntry>,
}

/// Heading renderer that adds an `id` and a self-link anchor.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadingAnchors;

impl MarkdownExtension for HeadingAnchors {
    fn heading(&self, level: u8, id: &str, inner_html: &str, _text: &str) -> Option<String> {
        Some(format!(
            "<h{level} id=\"{id}\"><a class=\"header-anchor\" href=\"#{id}\">#</a> {inner_html}</h{level}>\n"
        ))
    }
}

/// Markdown parser with syntax highlighting and pluggable block renderers.
#[derive(Debug, Clone)]
pub struct MarkdownParser {
    options: Options,
    extensions: Vec<Arc<dyn MarkdownExtension>>,
    anchors: HeadingAnchors,
    highlighter: Arc<SyntaxHighlighter>,
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownParser {
    /// Create a new markdown parser with default options.
    pub fn new() -> Self {
        Self::with_highlighter(Arc::new(SyntaxHighlighter::default()))
    }

    /// Create a parser with a custom syntax theme.
    pub fn with_theme(theme: &str) -> Self {
        Self::with_highlighter(Arc::new(SyntaxHighlighter::new(theme)))
    }

    /// Create a parser sharing an already loaded highlighter.
    pub fn with_highlighter(highlighter: Arc<SyntaxHighlighter>) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self {
            options,
            extensions: Vec::new(),
            anchors: HeadingAnchors,
            highlighter,
        }
    }

    /// Add a block renderer that takes priority over the built-ins.
    pub fn add_extension(&mut self, extension: Arc<dyn MarkdownExtension>) {
        self.extensions.push(extension);
    }

    /// Builder-style [`MarkdownParser::add_extension`].
    pub fn with_extension(mut self, extension: Arc<dyn MarkdownExtension>) -> Self {
        self.add_extension(extension);
        self
    }

    /// Parse markdown content with frontmatter.
    pub fn parse(&self, content: &str, path: &Path) -> Result<ParsedMarkdown> {
        let (frontmatter, body) = parse_frontmatter(content, path)?;
        let RenderedMarkdown { html, toc } = self.render(&body);

        Ok(ParsedMarkdown {
            frontmatter,
            raw: body,
            html,
            toc,
        })
    }

    fn render_heading(&self, level: u8, id: &str, inner_html: &str, text: &str) -> String {
        self.extensions
            .iter()
            .find_map(|ext| ext.heading(level, id, inner_html, text))
            .or_else(|| self.anchors.heading(level, id, inner_html, text))
            .unwrap_or_default()
    }

    fn render_code_block(&self, lang: Option<&str>, code: &str) -> String {
        self.extensions
            .iter()
            .find_map(|ext| ext.code_block(lang, code))
            .unwrap_or_else(|| self.highlighter.highlight(code, lang))
    }

    /// Render a markdown body to HTML with TOC extraction.
    pub fn render(&self, content: &str) -> RenderedMarkdown {
        let parser = Parser::new_ext(content, self.options);
        let mut toc = Vec::new();
        let mut html = String::new();

        // While inside a heading, `html` collects the heading content and the
        // surrounding document waits in `outer_html`.
        let mut outer_html = String::new();
        let mut heading: Option<(u8, Option<String>, String)> = None;

        let mut code_block: Option<Option<String>> = None;
        let mut code_content = String::new();

        let mut image: Option<(String, String, String)> = None;
        let mut in_table_head = false;

        for event in parser {
            match event {
                Event::Start(Tag::Heading { level, id, .. }) => {
                    outer_html = std::mem::take(&mut html);
                    heading = Some((level as u8, id.map(|i| i.to_string()), String::new()));
                }

                Event::End(TagEnd::Heading(_)) => {
                    let inner = std::mem::replace(&mut html, std::mem::take(&mut outer_html));
                    if let Some((level, explicit_id, text)) = heading.take() {
                        let id = explicit_id.unwrap_or_else(|| slugify(&text));
                        html.push_str(&self.render_heading(level, &id, &inner, &text));
                        toc.push(TocEntry { level, text, id });
                    }
                }

                Event::Start(Tag::CodeBlock(kind)) => {
                    code_block = Some(match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    });
                    code_content.clear();
                }

                Event::End(TagEnd::CodeBlock) => {
                    let lang = code_block.take().flatten();
                    html.push_str(&self.render_code_block(lang.as_deref(), &code_content));
                    code_content.clear();
                }

                Event::Text(text) if code_block.is_some() => {
                    code_content.push_str(&text);
                }

                Event::Start(Tag::Image {
                    dest_url, title, ..
                }) => {
                    image = Some((dest_url.to_string(), title.to_string(), String::new()));
                }

                Event::End(TagEnd::Image) => {
                    if let Some((src, title, alt)) = image.take() {
                        let title_attr = if title.is_empty() {
                            String::new()
                        } else {
                            format!(" title=\"{}\"", html_escape(&title))
                        };
                        html.push_str(&format!(
                            "<img src=\"{}\" alt=\"{}\"{title_attr} loading=\"lazy\" />",
                            html_escape(&src),
                            html_escape(&alt)
                        ));
                    }
                }

                Event::Text(text) | Event::Code(text) if image.is_some() => {
                    if let Some((_, _, alt)) = image.as_mut() {
                        alt.push_str(&text);
                    }
                }

                Event::Start(_) | Event::End(_) if image.is_some() => {}

                Event::Text(text) => {
                    if let Some((_, _, heading_text)) = heading.as_mut() {
                        heading_text.push_str(&text);
                    }
                    html.push_str(&html_escape(&text));
                }

                Event::Code(code) => {
                    if let Some((_, _, heading_text)) = heading.as_mut() {
                        heading_text.push_str(&code);
                    }
                    html.push_str(&format!("<code>{}</code>", html_escape(&code)));
                }

                Event::SoftBreak => {
                    html.push('\n');
                }

                Event::HardBreak => {
                    html.push_str("<br />\n");
                }

                Event::Start(Tag::TableHead) => {
                    in_table_head = true;
                    html.push_str("<thead><tr>");
                }

                Event::End(TagEnd::TableHead) => {
                    in_table_head = false;
                    html.push_str("</tr></thead>\n<tbody>\n");
                }

                Event::Start(Tag::TableCell) if in_table_head => html.push_str("<th>"),
                Event::End(TagEnd::TableCell) if in_table_head => html.push_str("</th>"),

                Event::Start(tag) => {
                    html.push_str(&tag_to_html_start(&tag));
                }

                Event::End(tag) => {
                    html.push_str(&tag_to_html_end(&tag));
                }

                Event::Html(raw) | Event::InlineHtml(raw) => {
                    html.push_str(&raw);
                }

                Event::FootnoteReference(name) => {
                    html.push_str(&format!(
                        "<sup class=\"footnote-ref\"><a href=\"#fn-{name}\">[{name}]</a></sup>"
                    ));
                }

                Event::Rule => {
                    html.push_str("<hr />\n");
                }

                Event::TaskListMarker(checked) => {
                    let checkbox = if checked {
                        "<input type=\"checkbox\" checked disabled />"
                    } else {
                        "<input type=\"checkbox\" disabled />"
                    };
                    html.push_str(checkbox);
                }

                Event::InlineMath(math) => {
                    html.push_str(&format!(
                        "<span class=\"math inline\">\\({}\\)</span>",
                        html_escape(&math)
                    ));
                }

                Event::DisplayMath(math) => {
                    html.push_str(&format!(
                        "<div class=\"math display\">\\[{}\\]</div>",
                        html_escape(&math)
                    ));
                }
            }
        }

        RenderedMarkdown { html, toc }
    }
}

/// Convert a pulldown-cmark tag to HTML opening tag.
fn tag_to_html_start(tag: &Tag) -> String {
    match tag {
        Tag::Paragraph => "<p>".to_string(),
        Tag::Heading { level, .. } => format!("<h{}>", *level as u8),
        Tag::BlockQuote(_) => "<blockquote>\n".to_string(),
        Tag::CodeBlock(_) => String::new(),
        Tag::List(Some(1)) => "<ol>\n".to_string(),
        Tag::List(Some(start)) => format!("<ol start=\"{start}\">\n"),
        Tag::List(None) => "<ul>\n".to_string(),
        Tag::Item => "<li>".to_string(),
        Tag::FootnoteDefinition(name) => {
            format!("<div class=\"footnote\" id=\"fn-{name}\">")
        }
        Tag::Table(_) => "<table>\n".to_string(),
        Tag::TableHead => "<thead><tr>".to_string(),
        Tag::TableRow => "<tr>".to_string(),
        Tag::TableCell => "<td>".to_string(),
        Tag::Emphasis => "<em>".to_string(),
        Tag::Strong => "<strong>".to_string(),
        Tag::Strikethrough => "<del>".to_string(),
        Tag::Link {
            dest_url, title, ..
        } => {
            let title_attr = if title.is_empty() {
                String::new()
            } else {
                format!(" title=\"{}\"", html_escape(title))
            };
            format!("<a href=\"{}\"{title_attr}>", html_escape(dest_url))
        }
        Tag::Image { .. } => String::new(),
        Tag::HtmlBlock => String::new(),
        Tag::MetadataBlock(_) => String::new(),
        Tag::DefinitionList => "<dl>".to_string(),
        Tag::DefinitionListTitle => "<dt>".to_string(),
        Tag::DefinitionListDefinition => "<dd>".to_string(),
        Tag::Superscript => "<sup>".to_string(),
        Tag::Subscript => "<sub>".to_string(),
    }
}

/// Convert a pulldown-cmark tag end to HTML closing tag.
fn tag_to_html_end(tag: &TagEnd) -> String {
    match tag {
        TagEnd::Paragraph => "</p>\n".to_string(),
        TagEnd::Heading(level) => format!("</h{}>\n", *level as u8),
        TagEnd::BlockQuote(_) => "</blockquote>\n".to_string(),
        TagEnd::CodeBlock => String::new(),
        TagEnd::List(true) => "</ol>\n".to_string(),
        TagEnd::List(false) => "</ul>\n".to_string(),
        TagEnd::Item => "</li>\n".to_string(),
        TagEnd::FootnoteDefinition => "</div>\n".to_string(),
        TagEnd::Table => "</tbody>\n</table>\n".to_string(),
        TagEnd::TableHead => "</tr></thead>\n".to_string(),
        TagEnd::TableRow => "</tr>\n".to_string(),
        TagEnd::TableCell => "</td>".to_string(),
        TagEnd::Emphasis => "</em>".to_string(),
        TagEnd::Strong => "</strong>".to_string(),
        TagEnd::Strikethrough => "</del>".to_string(),
        TagEnd::Link => "</a>".to_string(),
        TagEnd::Image => String::new(),
        TagEnd::HtmlBlock => String::new(),
        TagEnd::MetadataBlock(_) => String::new(),
        TagEnd::DefinitionList => "</dl>\n".to_string(),
        TagEnd::DefinitionListTitle => "</dt>\n".to_string(),
        TagEnd::DefinitionListDefinition => "</dd>\n".to_string(),
        TagEnd::Superscript => "</sup>".to_string(),
        TagEnd::Subscript => "</sub>".to_string(),
    }
}
