//! Render pass over artifact bundles.
//!
//! Every `{artifacts_dir}/*.json` bundle is processed in parallel, and each
//! bundle's diagrams fan out on the same bounded pool:
//!
//! ```text
//! Pending -> Compiling -> Converting -> Rendered
//!        \______________\_____________-> Failed (fallback SVG)
//! ```
//!
//! A rendered SVG is written to `{static_dir}/{url}` and stored in the bundle,
//! which is rewritten once after all of its diagrams finish.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use oym_cache::{CacheError, write_atomic, write_json_atomic};
use oym_compiler::{ArtifactBundle, DiagramArtifact};
use oym_toolchain::{Probe, ToolchainError, discover_tex_toolchain};
use rayon::prelude::*;

use crate::renderer::{DiagramRenderer, RenderStage, TexRenderer, UnavailableRenderer};
use crate::svg::error_svg;

/// Error that stops the render pass before any job runs.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("cannot read artifacts directory {}: {source}", path.display())]
    ArtifactsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Totals of one render pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    /// Bundle files visited.
    pub files: usize,
    /// Diagrams rendered successfully.
    pub rendered: usize,
    /// Failed diagrams plus unreadable or unwritable bundles.
    pub errors: usize,
}

impl RenderSummary {
    fn merge(&mut self, other: Self) {
        self.files += other.files;
        self.rendered += other.rendered;
        self.errors += other.errors;
    }
}

/// Render pass settings.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Web root that diagram URLs resolve against.
    pub static_dir: PathBuf,
    pub jobs: usize,
    pub timeout: Duration,
    pub css_class: String,
    pub extra_packages: Vec<String>,
}

/// Drives a [`DiagramRenderer`] over every bundle of an artifacts directory.
pub struct RenderOrchestrator {
    renderer: Box<dyn DiagramRenderer>,
    static_dir: PathBuf,
    jobs: usize,
    missing_toolchain: Option<ToolchainError>,
}

impl RenderOrchestrator {
    #[must_use]
    pub fn new(renderer: Box<dyn DiagramRenderer>, static_dir: PathBuf, jobs: usize) -> Self {
        Self {
            renderer,
            static_dir,
            jobs,
            missing_toolchain: None,
        }
    }

    /// Build an orchestrator around the TeX toolchain found by `probe`.
    ///
    /// When `pdflatex` or every PDF-to-SVG converter is missing, the
    /// orchestrator still runs and every diagram gets the fallback SVG
    /// carrying the discovery error. See [`Self::missing_toolchain`].
    #[must_use]
    pub fn discover(probe: &dyn Probe, settings: RenderSettings) -> Self {
        match discover_tex_toolchain(probe) {
            Ok(toolchain) => {
                tracing::info!(converter = %toolchain.converter, "Using TeX toolchain");
                let renderer = TexRenderer::new(toolchain, settings.timeout)
                    .with_css_class(settings.css_class)
                    .with_extra_packages(settings.extra_packages);
                Self::new(Box::new(renderer), settings.static_dir, settings.jobs)
            }
            Err(e) => {
                tracing::warn!("TeX toolchain unavailable: {e}");
                let renderer = UnavailableRenderer::new(e.clone());
                Self {
                    missing_toolchain: Some(e),
                    ..Self::new(Box::new(renderer), settings.static_dir, settings.jobs)
                }
            }
        }
    }

    /// Discovery error when the orchestrator runs without a toolchain.
    #[must_use]
    pub fn missing_toolchain(&self) -> Option<&ToolchainError> {
        self.missing_toolchain.as_ref()
    }

    /// Render every diagram of every bundle in `artifacts_dir`.
    pub fn run(&self, artifacts_dir: &Path) -> Result<RenderSummary, OrchestratorError> {
        let entries = fs::read_dir(artifacts_dir).map_err(|source| OrchestratorError::ArtifactsDir {
            path: artifacts_dir.to_path_buf(),
            source,
        })?;

        let mut bundles: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        bundles.sort();

        if bundles.is_empty() {
            tracing::info!(dir = %artifacts_dir.display(), "No artifact bundles found");
            return Ok(RenderSummary::default());
        }
        tracing::info!(files = bundles.len(), "Rendering artifact bundles");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()?;
        let results: Vec<RenderSummary> =
            pool.install(|| bundles.par_iter().map(|path| self.process_bundle(path)).collect());

        let mut summary = RenderSummary::default();
        for result in results {
            summary.merge(result);
        }
        Ok(summary)
    }

    fn process_bundle(&self, path: &Path) -> RenderSummary {
        let mut summary = RenderSummary {
            files: 1,
            ..RenderSummary::default()
        };

        let mut bundle = match read_bundle(path) {
            Ok(bundle) => bundle,
            Err(message) => {
                tracing::warn!(path = %path.display(), "Failed to read bundle: {message}");
                summary.errors = 1;
                return summary;
            }
        };
        if bundle.tikz.is_empty() {
            tracing::debug!(path = %path.display(), "No TikZ artifacts");
            return summary;
        }

        let stages: Vec<RenderStage> = bundle
            .tikz
            .par_iter_mut()
            .map(|diagram| self.render_diagram(diagram))
            .collect();
        for stage in stages {
            match stage {
                RenderStage::Rendered => summary.rendered += 1,
                _ => summary.errors += 1,
            }
        }

        if let Err(e) = write_json_atomic(path, &bundle) {
            tracing::warn!(path = %path.display(), "Failed to rewrite bundle: {e}");
            summary.errors += 1;
        } else {
            tracing::info!(
                path = %path.display(),
                rendered = summary.rendered,
                errors = summary.errors,
                "Updated bundle"
            );
        }
        summary
    }

    fn render_diagram(&self, diagram: &mut DiagramArtifact) -> RenderStage {
        tracing::debug!(id = diagram.id, stage = %RenderStage::Pending);

        let (svg, stage) = match self.renderer.render(&diagram.latex) {
            Ok(svg) => (svg, RenderStage::Rendered),
            Err(e) => {
                tracing::warn!(id = diagram.id, url = diagram.url, "Render failed: {e}");
                (error_svg(&e.to_string(), &diagram.latex), RenderStage::Failed)
            }
        };

        let stage = match self.write_svg(&diagram.url, &svg) {
            Ok(()) => stage,
            Err(e) => {
                tracing::warn!(id = diagram.id, url = diagram.url, "Failed to write SVG: {e}");
                RenderStage::Failed
            }
        };
        diagram.svg = svg;

        tracing::debug!(id = diagram.id, stage = %stage);
        stage
    }

    /// Write `svg` at `{static_dir}/{url}`.
    fn write_svg(&self, url: &str, svg: &str) -> Result<(), CacheError> {
        let relative = Path::new(url.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(CacheError::Io {
                path: relative.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "diagram URL escapes the static directory",
                ),
            });
        }
        write_atomic(&self.static_dir.join(relative), svg.as_bytes())
    }
}

fn read_bundle(path: &Path) -> Result<ArtifactBundle, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&content).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RenderError;
    use oym_toolchain::StaticProbe;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Renders `<svg>{latex}</svg>` unless the source mentions `\fail`.
    struct FakeRenderer;

    impl DiagramRenderer for FakeRenderer {
        fn render(&self, latex: &str) -> Result<String, RenderError> {
            if latex.contains("\\fail") {
                Err(RenderError::Compile("! Undefined control sequence.".to_owned()))
            } else {
                Ok(format!("<svg>{latex}</svg>"))
            }
        }
    }

    fn diagram(id: &str, url: &str, latex: &str) -> DiagramArtifact {
        DiagramArtifact {
            id: id.to_owned(),
            url: url.to_owned(),
            latex: latex.to_owned(),
            svg: String::new(),
        }
    }

    fn write_bundle(dir: &Path, name: &str, tikz: Vec<DiagramArtifact>) -> PathBuf {
        let path = dir.join(name);
        let bundle = ArtifactBundle {
            tikz,
            code: Vec::new(),
        };
        fs::create_dir_all(dir).unwrap();
        fs::write(&path, serde_json::to_string(&bundle).unwrap()).unwrap();
        path
    }

    fn read(path: &Path) -> ArtifactBundle {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_run_renders_and_rewrites_bundles() {
        let tmp = TempDir::new().unwrap();
        let static_dir = tmp.path().join("static");
        let artifacts = static_dir.join("artifacts");
        let path = write_bundle(
            &artifacts,
            "abc.json",
            vec![
                diagram("diagram_1", "/artifacts/tikz/abc-diagram_1.svg", "a"),
                diagram("diagram_2", "/artifacts/tikz/abc-diagram_2.svg", "b"),
            ],
        );

        let orchestrator = RenderOrchestrator::new(Box::new(FakeRenderer), static_dir.clone(), 2);
        let summary = orchestrator.run(&artifacts).unwrap();

        assert_eq!(
            summary,
            RenderSummary {
                files: 1,
                rendered: 2,
                errors: 0
            }
        );
        let bundle = read(&path);
        assert_eq!(bundle.tikz[0].svg, "<svg>a</svg>");
        assert_eq!(bundle.tikz[1].svg, "<svg>b</svg>");
        assert_eq!(
            fs::read_to_string(static_dir.join("artifacts/tikz/abc-diagram_2.svg")).unwrap(),
            "<svg>b</svg>"
        );
    }

    #[test]
    fn test_failure_yields_fallback_without_cancelling_siblings() {
        let tmp = TempDir::new().unwrap();
        let artifacts = tmp.path().join("artifacts");
        let path = write_bundle(
            &artifacts,
            "x.json",
            vec![
                diagram("diagram_1", "/t/x-1.svg", "\\fail"),
                diagram("diagram_2", "/t/x-2.svg", "ok"),
            ],
        );

        let orchestrator =
            RenderOrchestrator::new(Box::new(FakeRenderer), tmp.path().to_path_buf(), 1);
        let summary = orchestrator.run(&artifacts).unwrap();

        assert_eq!((summary.rendered, summary.errors), (1, 1));
        let bundle = read(&path);
        assert!(bundle.tikz[0].svg.contains(r#"class="tikz-error""#));
        assert!(bundle.tikz[0].svg.contains("Undefined control sequence"));
        assert_eq!(bundle.tikz[1].svg, "<svg>ok</svg>");
        assert!(tmp.path().join("t/x-1.svg").exists());
    }

    #[test]
    fn test_every_diagram_gets_svg() {
        let tmp = TempDir::new().unwrap();
        let artifacts = tmp.path().join("artifacts");
        let tikz = (1..=8)
            .map(|i| diagram(&format!("diagram_{i}"), &format!("/t/{i}.svg"), "\\fail"))
            .collect();
        let path = write_bundle(&artifacts, "many.json", tikz);

        let orchestrator =
            RenderOrchestrator::new(Box::new(FakeRenderer), tmp.path().to_path_buf(), 4);
        let summary = orchestrator.run(&artifacts).unwrap();

        assert_eq!(summary.errors, 8);
        assert!(read(&path).tikz.iter().all(|d| !d.svg.is_empty()));
    }

    #[test]
    fn test_unreadable_bundle_counts_as_error() {
        let tmp = TempDir::new().unwrap();
        let artifacts = tmp.path().join("artifacts");
        write_bundle(&artifacts, "good.json", vec![diagram("diagram_1", "/t/g.svg", "g")]);
        fs::write(artifacts.join("broken.json"), "{not json").unwrap();
        fs::write(artifacts.join("notes.txt"), "ignored").unwrap();

        let orchestrator =
            RenderOrchestrator::new(Box::new(FakeRenderer), tmp.path().to_path_buf(), 2);
        let summary = orchestrator.run(&artifacts).unwrap();

        assert_eq!(
            summary,
            RenderSummary {
                files: 2,
                rendered: 1,
                errors: 1
            }
        );
    }

    #[test]
    fn test_bundle_without_diagrams_untouched() {
        let tmp = TempDir::new().unwrap();
        let artifacts = tmp.path().join("artifacts");
        let path = write_bundle(&artifacts, "code.json", Vec::new());
        let before = fs::read_to_string(&path).unwrap();

        let orchestrator =
            RenderOrchestrator::new(Box::new(FakeRenderer), tmp.path().to_path_buf(), 1);
        let summary = orchestrator.run(&artifacts).unwrap();

        assert_eq!((summary.files, summary.rendered, summary.errors), (1, 0, 0));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_url_outside_static_dir_rejected() {
        let tmp = TempDir::new().unwrap();
        let artifacts = tmp.path().join("static/artifacts");
        write_bundle(&artifacts, "e.json", vec![diagram("diagram_1", "/../escape.svg", "x")]);

        let orchestrator =
            RenderOrchestrator::new(Box::new(FakeRenderer), tmp.path().join("static"), 1);
        let summary = orchestrator.run(&artifacts).unwrap();

        assert_eq!(summary.errors, 1);
        assert!(!tmp.path().join("escape.svg").exists());
    }

    #[test]
    fn test_missing_artifacts_dir() {
        let tmp = TempDir::new().unwrap();
        let orchestrator =
            RenderOrchestrator::new(Box::new(FakeRenderer), tmp.path().to_path_buf(), 1);
        let result = orchestrator.run(&tmp.path().join("missing"));
        assert!(matches!(result, Err(OrchestratorError::ArtifactsDir { .. })));
    }

    fn settings(static_dir: PathBuf) -> RenderSettings {
        RenderSettings {
            static_dir,
            jobs: 2,
            timeout: Duration::from_secs(1),
            css_class: "tikz-diagram".to_owned(),
            extra_packages: Vec::new(),
        }
    }

    #[test]
    fn test_discover_reports_missing_toolchain() {
        let orchestrator =
            RenderOrchestrator::discover(&StaticProbe::new(), settings(PathBuf::from("static")));
        assert_eq!(
            orchestrator.missing_toolchain(),
            Some(&ToolchainError::CompilerNotFound)
        );

        let probe = StaticProbe::new().with("pdflatex", "/usr/bin/pdflatex");
        let orchestrator = RenderOrchestrator::discover(&probe, settings(PathBuf::from("static")));
        assert_eq!(
            orchestrator.missing_toolchain(),
            Some(&ToolchainError::ConverterNotFound)
        );
    }

    #[test]
    fn test_discover_with_toolchain_has_no_error() {
        let probe = StaticProbe::new()
            .with("pdflatex", "/usr/bin/pdflatex")
            .with("pdf2svg", "/usr/bin/pdf2svg");
        let orchestrator = RenderOrchestrator::discover(&probe, settings(PathBuf::from("static")));
        assert_eq!(orchestrator.missing_toolchain(), None);
    }

    #[test]
    fn test_without_toolchain_every_diagram_gets_fallback() {
        let tmp = TempDir::new().unwrap();
        let static_dir = tmp.path().join("static");
        let artifacts = static_dir.join("artifacts");
        let first = write_bundle(
            &artifacts,
            "a.json",
            vec![
                diagram("diagram_1", "/artifacts/tikz/a-diagram_1.svg", "\\draw (0,0) -- (1,1);"),
                diagram("diagram_2", "/artifacts/tikz/a-diagram_2.svg", "\\draw (0,0) circle (1);"),
            ],
        );
        let second = write_bundle(
            &artifacts,
            "b.json",
            vec![diagram("diagram_1", "/artifacts/tikz/b-diagram_1.svg", "\\fill (0,0);")],
        );

        let orchestrator = RenderOrchestrator::discover(&StaticProbe::new(), settings(static_dir.clone()));
        let summary = orchestrator.run(&artifacts).unwrap();

        assert_eq!(
            summary,
            RenderSummary {
                files: 2,
                rendered: 0,
                errors: 3
            }
        );
        for path in [first, second] {
            for diagram in read(&path).tikz {
                assert!(!diagram.svg.is_empty());
                assert!(diagram.svg.contains(r#"class="tikz-error""#));
                assert!(diagram.svg.contains("pdflatex not found"));
            }
        }
        assert!(static_dir.join("artifacts/tikz/b-diagram_1.svg").exists());
    }
}
