//! Inkpress CLI
//!
//! Pluggable Markdown blog generator with a live-reload dev server.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

/// Command-line interface for Inkpress.
#[derive(Parser)]
#[command(name = "inkpress", version, about = "A pluggable Markdown blog generator")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "inkpress.toml")]
    config: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build the site
    Build {
        /// Output directory, overriding `paths.output`
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Include draft posts
        #[arg(long)]
        drafts: bool,
    },
    /// Start the development server with live reload
    #[command(alias = "serve")]
    Watch {
        /// Port to listen on, overriding `dev.port`
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind, overriding `dev.host`
        #[arg(long)]
        host: Option<String>,
        /// Open browser automatically
        #[arg(long)]
        open: bool,
    },
    /// Scaffold a new post
    New {
        /// Path of the new file inside the collection (e.g. my-article)
        path: PathBuf,
        /// Collection to create it in
        #[arg(long, default_value = "posts")]
        collection: String,
    },
    /// Validate configuration and content without writing output
    Check {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    inkpress::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build { output, drafts } => {
            inkpress::cmd::build::run(&cli.config, output.as_deref(), drafts)?;
        }
        Commands::Watch { port, host, open } => {
            inkpress::cmd::watch::run(&cli.config, port, host, open).await?;
        }
        Commands::New { path, collection } => {
            inkpress::cmd::new::run(&cli.config, &path, &collection)?;
        }
        Commands::Check { strict } => {
            inkpress::cmd::check::run(&cli.config, strict)?;
        }
    }

    Ok(())
}
