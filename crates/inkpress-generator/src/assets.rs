//! Static asset copying.
//!
//! Mirrors the public directory into the output tree, skipping hidden files
//! and anything matching the configured ignore globs.

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;
use wax::{Glob, Pattern};

/// Asset processing errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// An ignore pattern is not a valid glob.
    #[error("invalid ignore pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

/// Result type for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

/// Copies static files, honouring ignore globs.
#[derive(Debug)]
pub struct AssetProcessor {
    ignore: Vec<Glob<'static>>,
}

impl AssetProcessor {
    /// Compile the ignore patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let ignore = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Glob::new(pattern)
                    .map(Glob::into_owned)
                    .map_err(|e| AssetError::Pattern {
                        pattern: pattern.to_string(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ignore })
    }

    /// Whether a path relative to the asset root is excluded.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        self.ignore.iter().any(|glob| glob.is_match(relative))
    }

    /// Copy every non-ignored file from `source_dir` into `dest_dir`.
    /// Returns the number of files copied. A missing source is not an error.
    pub fn copy(&self, source_dir: &Path, dest_dir: &Path) -> Result<usize> {
        if !source_dir.is_dir() {
            debug!(dir = %source_dir.display(), "no static directory, skipping assets");
            return Ok(0);
        }

        info!(
            source = %source_dir.display(),
            dest = %dest_dir.display(),
            "copying assets"
        );

        let mut copied = 0;
        let walker = WalkDir::new(source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

        for entry in walker {
            let entry = entry.map_err(|source| AssetError::Walk {
                path: source_dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(source_dir) else {
                continue;
            };
            if self.is_ignored(relative) {
                debug!(path = %relative.display(), "ignored asset");
                continue;
            }

            let dest = dest_dir.join(relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
            copied += 1;
        }

        info!(count = copied, "assets copied");
        Ok(copied)
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
