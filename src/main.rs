//! CLI entry point for tessera

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tessera::commands::render::RenderArgs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(version)]
#[command(about = "Render and check Django-syntax templates", long_about = None)]
struct Cli {
    /// Set configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template
    #[command(alias = "r")]
    Render {
        /// Template name, resolved through the template directories
        template: String,

        /// Context file (JSON, YAML or TOML)
        #[arg(short = 'x', long)]
        context: Option<PathBuf>,

        /// Template directory (repeatable)
        #[arg(short = 'I', long = "dir")]
        dirs: Vec<PathBuf>,

        /// Ban a filter for this render (repeatable)
        #[arg(long = "ban-filter")]
        ban_filters: Vec<String>,

        /// Ban a tag for this render (repeatable)
        #[arg(long = "ban-tag")]
        ban_tags: Vec<String>,

        /// Disable HTML autoescaping
        #[arg(long)]
        no_autoescape: bool,

        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compile every template in a directory
    Check {
        /// Directory to scan
        #[arg(short = 'I', long, default_value = ".")]
        dir: PathBuf,

        /// Globs of template paths relative to the directory (default: **/*.html)
        patterns: Vec<String>,
    },

    /// Print the token stream of a template file
    Tokens {
        file: PathBuf,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "tessera=debug,info"
    } else {
        "tessera=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Render {
            template,
            context,
            dirs,
            ban_filters,
            ban_tags,
            no_autoescape,
            output,
        } => {
            let args = RenderArgs {
                template,
                context,
                dirs,
                config: cli.config,
                ban_filters,
                ban_tags,
                no_autoescape,
                output,
            };
            tessera::commands::render::run(&args)?;
        }

        Commands::Check { dir, patterns } => {
            tracing::info!("Checking templates in {:?}", dir);
            tessera::commands::check::run(&dir, &patterns, cli.config.as_deref())?;
        }

        Commands::Tokens { file } => {
            tessera::commands::tokens::run(&file, cli.config.as_deref())?;
        }

        Commands::Version => {
            println!("tessera version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
