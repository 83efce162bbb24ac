//! `oym render` command implementation.

use std::path::PathBuf;

use clap::Args;
use oym_config::Config;
use oym_tikz::{RenderOrchestrator, RenderSettings};
use oym_toolchain::SystemProbe;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Path to configuration file (default: auto-discover oym.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Artifact bundle directory (overrides config).
    #[arg(short, long)]
    artifacts_dir: Option<PathBuf>,
}

impl RenderArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = Config::load(self.config.as_deref(), None)?;
        let content = &config.content_resolved;
        tracing::debug!(config = ?config.config_path, "Loaded configuration");
        let artifacts_dir = self
            .artifacts_dir
            .unwrap_or_else(|| content.artifacts_dir.clone());

        let settings = RenderSettings {
            static_dir: content.static_dir.clone(),
            jobs: config.render.worker_count(),
            timeout: config.render.timeout(),
            css_class: config.render.css_class.clone(),
            extra_packages: config.render.extra_packages.clone(),
        };
        let orchestrator = RenderOrchestrator::discover(&SystemProbe, settings);

        output.highlight("Rendering TikZ diagrams");
        output.info(&format!("Artifacts: {}", artifacts_dir.display()));
        if let Some(e) = orchestrator.missing_toolchain() {
            output.warning(&format!("{e}; writing fallback images for every diagram"));
        }

        let summary = orchestrator.run(&artifacts_dir)?;

        output.separator();
        output.stat("Files processed", summary.files);
        output.stat("Diagrams rendered", summary.rendered);
        output.stat("Errors", summary.errors);
        output.separator();

        if summary.errors > 0 {
            output.warning("Rendering finished with errors");
            return Err(CliError::Failed(format!(
                "{} diagram(s) or bundle(s) failed",
                summary.errors
            )));
        }
        output.success("Rendering finished successfully");
        Ok(())
    }
}
