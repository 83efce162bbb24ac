//! `oym cache` subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use oym_cache::IncrementalCache;
use oym_compiler::CompiledDocument;
use oym_config::Config;

use crate::error::CliError;
use crate::output::Output;

/// Cache maintenance commands.
#[derive(Subcommand)]
pub(crate) enum CacheCommand {
    /// Show cache statistics.
    Stats(CacheArgs),
    /// Drop entries whose compiled output no longer exists.
    Cleanup(CacheArgs),
    /// Check cached documents against their metadata entries.
    Validate(CacheArgs),
}

/// Arguments shared by cache commands.
#[derive(Args)]
pub(crate) struct CacheArgs {
    /// Path to configuration file (default: auto-discover oym.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl CacheArgs {
    fn open(&self) -> Result<IncrementalCache, CliError> {
        let config = Config::load(self.config.as_deref(), None)?;
        Ok(IncrementalCache::open(
            config.content_resolved.output_dir.clone(),
        ))
    }
}

impl CacheCommand {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        match self {
            Self::Stats(args) => {
                let cache = args.open()?;
                let stats = cache.stats();

                output.highlight(&format!("Cache: {}", cache.root().display()));
                output.stat("Version", &stats.version);
                output.stat("Files", stats.total_files);
                output.stat(
                    "Last update",
                    if stats.last_update.is_empty() {
                        "never"
                    } else {
                        stats.last_update.as_str()
                    },
                );
                if let Some(build) = &stats.build_stats {
                    output.stat(
                        "Last build",
                        format!(
                            "{} processed, {} skipped, {} errors ({})",
                            build.stats.processed,
                            build.stats.skipped,
                            build.stats.errors,
                            build.timestamp
                        ),
                    );
                }
                Ok(())
            }
            Self::Cleanup(args) => {
                let cache = args.open()?;
                let removed = cache.cleanup()?;
                output.success(&format!("Removed {removed} stale cache entries"));
                Ok(())
            }
            Self::Validate(args) => {
                let cache = args.open()?;
                let report = cache.validate_integrity::<CompiledDocument>();

                if report.is_valid() {
                    output.success(&format!(
                        "Cache is valid ({} files checked)",
                        report.total_files
                    ));
                    return Ok(());
                }

                for issue in &report.issues {
                    output.warning(issue);
                }
                Err(CliError::Failed(format!(
                    "{} integrity issue(s) in {} files",
                    report.issues.len(),
                    report.total_files
                )))
            }
        }
    }
}
