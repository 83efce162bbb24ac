//! `oym build` command implementation.

use std::path::PathBuf;

use clap::Args;
use oym_cache::IncrementalCache;
use oym_compiler::{BuildOptions, Builder, DocumentCompiler, select_converter};
use oym_config::{CliSettings, Config};
use oym_toolchain::SystemProbe;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Path to configuration file (default: auto-discover oym.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Exercise source directory or single file (overrides config).
    #[arg(short, long)]
    source_dir: Option<PathBuf>,

    /// Compiled output directory (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Skip sources whose compiled output is up to date.
    #[arg(short, long)]
    incremental: bool,
}

impl BuildArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            source_dir: self.source_dir,
            output_dir: self.output_dir,
            incremental: self.incremental.then_some(true),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let content = &config.content_resolved;
        tracing::debug!(config = ?config.config_path, "Loaded configuration");

        let converter = select_converter(&config.converter, &SystemProbe)?;
        let compiler =
            DocumentCompiler::new(converter).with_public_path(config.render.public_path.clone());
        let cache = IncrementalCache::open(content.output_dir.clone());

        output.highlight("Building exercises");
        output.info(&format!("Source: {}", content.source_dir.display()));
        output.info(&format!("Output: {}", content.output_dir.display()));
        output.info(&format!("Converter: {}", compiler.converter_name()));
        if config.build.incremental {
            output.info("Mode: incremental");
        }

        let options = BuildOptions {
            output_dir: content.output_dir.clone(),
            artifacts_dir: content.artifacts_dir.clone(),
            extension: content.extension.clone(),
            incremental: config.build.incremental,
            jobs: config.build.worker_count(),
        };
        let stats = Builder::new(&compiler, &cache, options).build(&content.source_dir)?;

        output.separator();
        output.stat("Processed", stats.processed);
        output.stat("Skipped", stats.skipped);
        output.stat("Errors", stats.errors);
        output.separator();

        if stats.errors > 0 {
            output.warning("Build finished with errors (run with --verbose for details)");
            return Err(CliError::Failed(format!(
                "{} file(s) failed to compile",
                stats.errors
            )));
        }
        output.success("Build finished successfully");
        Ok(())
    }
}
