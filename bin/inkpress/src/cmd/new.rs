//! New command - scaffold a post

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr, bail, eyre};
use inkpress_core::{Config, slug::title_from_stem};

/// Run the new command.
pub fn run(config_path: &Path, path: &Path, collection: &str) -> Result<()> {
    tracing::info!(?path, collection, "Creating new content");

    let config = Config::load(config_path).wrap_err("Failed to load configuration")?;
    let file_path = scaffold(&config, path, collection, Utc::now())?;

    println!("Created: {}", file_path.display());
    Ok(())
}

/// Write a draft with boilerplate front matter. Existing files are never
/// overwritten.
pub fn scaffold(
    config: &Config,
    path: &Path,
    collection: &str,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let route = config
        .routes
        .get(collection)
        .ok_or_else(|| eyre!("Unknown collection '{collection}'"))?;

    let mut file_path = config.content_dir().join(&route.directory).join(path);
    if file_path.extension().is_none() {
        file_path.set_extension("md");
    }
    if file_path.exists() {
        bail!("{} already exists", file_path.display());
    }

    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).wrap_err("Failed to create directories")?;
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled");
    fs::write(&file_path, front_matter(&title_from_stem(stem), now))
        .wrap_err("Failed to write file")?;

    tracing::info!(?file_path, "Created new content file");
    Ok(file_path)
}

fn front_matter(title: &str, now: DateTime<Utc>) -> String {
    let title = title.replace('"', "\\\"");
    let date = now.format("%Y-%m-%d");

    format!(
        r#"---
title: "{title}"
date: {date}
draft: true
tags: []
categories: []
---

Write your content here.

<!-- more -->
"#
    )
}
