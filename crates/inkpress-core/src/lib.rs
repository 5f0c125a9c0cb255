//! Inkpress Core Library
//!
//! Configuration, error handling, front matter, the document model and URL
//! routing for the Inkpress blog generator.

pub mod config;
pub mod content;
pub mod error;
pub mod frontmatter;
pub mod router;
pub mod slug;

pub use config::{Config, RouteConfig};
pub use content::{Document, TocEntry};
pub use error::{CoreError, Result};
pub use frontmatter::Frontmatter;
pub use slug::{normalize_route, slugify};
