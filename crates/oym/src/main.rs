//! OYM CLI - LaTeX math exercise compiler.
//!
//! Provides commands for:
//! - `build`: Compile exercise sources to JSON documents and artifact bundles
//! - `render`: Render TikZ diagrams of artifact bundles to SVG
//! - `cache stats|cleanup|validate`: Inspect and maintain the build cache

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{BuildArgs, CacheCommand, RenderArgs};
use output::Output;

/// OYM - LaTeX math exercise compiler.
#[derive(Parser)]
#[command(name = "oym", version, about)]
struct Cli {
    /// Enable verbose output (per-file progress logs).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile exercise sources.
    Build(BuildArgs),
    /// Render TikZ diagrams to SVG.
    Render(RenderArgs),
    /// Build cache maintenance.
    #[command(subcommand)]
    Cache(CacheCommand),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Build(args) => args.execute(),
        Commands::Render(args) => args.execute(),
        Commands::Cache(cmd) => cmd.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
