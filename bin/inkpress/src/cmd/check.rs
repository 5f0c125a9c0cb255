//! Check command - validate configuration and content

use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
    sync::Arc,
};

use color_eyre::eyre::{Result, bail};
use inkpress_core::Config;
use inkpress_generator::{BuiltinResolver, Pipeline};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Run the check command.
///
/// Loads the configuration, scans all content and verifies templates and
/// plugins. Nothing is written.
pub fn run(config_path: &Path, strict: bool) -> Result<()> {
    tracing::info!(?config_path, strict, "Checking configuration and content");

    let result = validate(config_path);

    println!();
    println!("Summary:");
    println!("  Errors:   {}", result.errors.len());
    println!("  Warnings: {}", result.warnings.len());

    if result.has_errors() {
        println!();
        println!("Errors:");
        for err in &result.errors {
            println!("  ✗ {err}");
        }
    }

    if result.has_warnings() {
        println!();
        println!("Warnings:");
        for warn in &result.warnings {
            println!("  ⚠ {warn}");
        }
    }

    if result.has_errors() {
        bail!("Validation failed with {} error(s)", result.errors.len());
    }

    if strict && result.has_warnings() {
        bail!(
            "Validation failed with {} warning(s) (strict mode)",
            result.warnings.len()
        );
    }

    println!();
    println!("✓ All checks passed");

    Ok(())
}

/// Collect every problem with the site at `config_path`.
pub fn validate(config_path: &Path) -> ValidationResult {
    let mut result = ValidationResult::default();

    let config = match Config::load_with_env(config_path) {
        Ok(config) => config,
        Err(e) => {
            result.add_error(format!("Configuration error: {e}"));
            return result;
        }
    };

    if config.site.url.is_empty() {
        result.add_warning("site.url is empty, feeds and sitemap will use relative links");
    }
    if !config.templates_dir().is_dir() {
        result.add_error(format!(
            "Templates directory does not exist: {}",
            config.templates_dir().display()
        ));
    }

    let pipeline = Pipeline::new(Arc::new(config), Arc::new(BuiltinResolver::new()));
    check_plugins(&pipeline, &mut result);

    let scan = match pipeline.scan() {
        Ok(scan) => scan,
        Err(e) => {
            result.add_error(e.to_string());
            return result;
        }
    };

    if scan.failures > 0 {
        result.add_error(format!(
            "{} content file(s) failed to parse (see log)",
            scan.failures
        ));
    }

    let templates = pipeline.templates();
    if !templates.has_template("index") {
        result.add_error("Template 'index' not found");
    }
    let used: BTreeSet<&str> = scan.documents.iter().map(|d| d.template.as_str()).collect();
    for template in used {
        if !templates.has_template(template) {
            result.add_error(format!("Template '{template}' not found"));
        }
    }

    let mut urls: HashMap<&str, Vec<&Path>> = HashMap::new();
    for doc in &scan.documents {
        urls.entry(doc.url.as_str()).or_default().push(&doc.source_path);
    }
    let mut collisions: Vec<_> = urls.into_iter().filter(|(_, files)| files.len() > 1).collect();
    collisions.sort();
    for (url, files) in collisions {
        let files: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
        result.add_warning(format!("{url} is produced by {}", files.join(", ")));
    }

    println!("  ✓ {} document(s) checked", scan.documents.len());
    result
}

fn check_plugins(pipeline: &Pipeline, result: &mut ValidationResult) {
    let loaded = pipeline.plugins().loaded_ids();
    for id in &pipeline.config().plugins.order {
        if !loaded.contains(id) {
            result.add_warning(format!("Plugin '{id}' could not be loaded"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    fn site(root: &Path) {
        write(
            root,
            "inkpress.toml",
            "[site]\ntitle = \"T\"\nurl = \"https://example.com\"\n",
        );
        write(root, "templates/index.html", "");
        write(root, "templates/post.html", "");
        write(root, "content/posts/hello.md", "---\ntitle: Hello\n---\nHi");
    }

    #[test]
    fn test_valid_site() {
        let dir = TempDir::new().expect("tempdir");
        site(dir.path());

        let result = validate(&dir.path().join("inkpress.toml"));
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(!dir.path().join("dist").exists());
    }

    #[test]
    fn test_reports_problems() {
        let dir = TempDir::new().expect("tempdir");
        site(dir.path());
        write(
            dir.path(),
            "inkpress.toml",
            "[site]\ntitle = \"T\"\n\n[plugins]\norder = [\"missing\"]\n",
        );
        write(dir.path(), "content/pages/about.md", "---\ntitle: About\n---\nx");
        write(dir.path(), "content/pages/other.md", "---\npermalink: /about\n---\nx");
        write(dir.path(), "content/posts/bad.md", "---\ntitle: [oops\n---\nx");

        let result = validate(&dir.path().join("inkpress.toml"));
        assert!(result.errors.iter().any(|e| e.contains("failed to parse")));
        assert!(result.errors.iter().any(|e| e.contains("'page' not found")));
        assert!(result.warnings.iter().any(|w| w.contains("'missing'")));
        assert!(result.warnings.iter().any(|w| w.starts_with("/about is produced by")));
        assert!(result.warnings.iter().any(|w| w.contains("site.url")));
    }

    #[test]
    fn test_missing_config() {
        let dir = TempDir::new().expect("tempdir");
        let result = validate(&dir.path().join("inkpress.toml"));
        assert_eq!(result.errors.len(), 1);
        assert!(run(&dir.path().join("inkpress.toml"), false).is_err());
    }
}
