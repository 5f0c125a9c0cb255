//! Build command - generates the site

use std::{path::Path, sync::Arc};

use color_eyre::eyre::{Result, WrapErr};
use inkpress_core::Config;
use inkpress_generator::{BuildReport, BuiltinResolver, Pipeline};

/// Run the build command.
pub fn run(config_path: &Path, output: Option<&Path>, drafts: bool) -> Result<()> {
    tracing::info!(?config_path, ?output, drafts, "Starting build");

    let config = load(config_path, output, drafts)?;
    tracing::debug!(?config, "Loaded configuration");

    let output_dir = config.output_dir();
    let pipeline = Pipeline::new(Arc::new(config), Arc::new(BuiltinResolver::new()));
    let report = pipeline.build().wrap_err("Build failed")?;

    print_report(&report, &output_dir);
    Ok(())
}

/// Load configuration and apply command-line overrides.
fn load(config_path: &Path, output: Option<&Path>, drafts: bool) -> Result<Config> {
    let mut config = Config::load_with_env(config_path).wrap_err("Failed to load configuration")?;

    if let Some(output) = output {
        config.paths.output = output.to_path_buf();
    }
    config.build.drafts |= drafts;
    Ok(config)
}

fn print_report(report: &BuildReport, output_dir: &Path) {
    println!();
    println!("  Build completed successfully!");
    println!();
    println!("  Posts:      {}", report.posts);
    println!("  Pages:      {}", report.pages);
    println!("  Taxonomies: {}", report.taxonomy_pages);
    println!("  Assets:     {}", report.assets);
    if report.errors > 0 {
        println!("  Errors:     {} (see log)", report.errors);
    }
    if report.warnings > 0 {
        println!("  Warnings:   {}", report.warnings);
    }
    println!();
    println!("  Duration:   {}ms", report.elapsed_ms);
    println!("  Output:     {}", output_dir.display());
    println!();
}
