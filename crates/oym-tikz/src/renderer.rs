//! TikZ to SVG through pdflatex and a PDF-to-SVG converter.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use oym_toolchain::{ExecError, SvgConverter, TexToolchain, ToolchainError, run_with_timeout};

use crate::log::extract_tex_error;
use crate::svg::optimize_svg;

/// Packages loaded by every standalone document, before `tikz`.
const PACKAGES: &[&str] = &["pgfplots", "tikz-cd", "circuitikz", "amsmath", "amssymb"];

/// TikZ libraries loaded by every standalone document.
const TIKZ_LIBRARIES: &[&str] = &[
    "arrows",
    "shapes",
    "backgrounds",
    "patterns",
    "positioning",
    "calc",
    "arrows.meta",
    "fit",
    "shapes.geometric",
    "decorations.pathmorphing",
    "decorations.markings",
];

/// Base name of the files inside a render workspace.
const JOB_NAME: &str = "tikz-figure";

/// Renders one TikZ source to an SVG document.
pub trait DiagramRenderer: Send + Sync {
    fn render(&self, latex: &str) -> Result<String, RenderError>;
}

/// Failure to render one diagram.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to prepare render workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("LaTeX compilation failed: {0}")]
    Compile(String),
    #[error("PDF file not generated. Error: {0}")]
    MissingPdf(String),
    #[error("SVG conversion with {converter} failed: {message}")]
    Convert {
        converter: SvgConverter,
        message: String,
    },
    #[error("SVG file was not generated")]
    MissingSvg,
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
}

/// Lifecycle of one diagram job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Pending,
    Compiling,
    Converting,
    Rendered,
    Failed,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Compiling => "compiling",
            Self::Converting => "converting",
            Self::Rendered => "rendered",
            Self::Failed => "failed",
        })
    }
}

/// Renderer backed by a discovered [`TexToolchain`].
///
/// Each call works in its own temporary directory, removed afterwards.
#[derive(Debug, Clone)]
pub struct TexRenderer {
    toolchain: TexToolchain,
    timeout: Duration,
    css_class: String,
    extra_packages: Vec<String>,
}

impl TexRenderer {
    #[must_use]
    pub fn new(toolchain: TexToolchain, timeout: Duration) -> Self {
        Self {
            toolchain,
            timeout,
            css_class: "tikz-diagram".to_owned(),
            extra_packages: Vec::new(),
        }
    }

    /// Class injected into the root `<svg>` element.
    #[must_use]
    pub fn with_css_class(mut self, css_class: impl Into<String>) -> Self {
        self.css_class = css_class.into();
        self
    }

    /// Additional `\usepackage` names for the standalone document.
    #[must_use]
    pub fn with_extra_packages(mut self, packages: Vec<String>) -> Self {
        self.extra_packages = packages;
        self
    }

    fn render_in(&self, dir: &Path, latex: &str) -> Result<String, RenderError> {
        let tex = dir.join(format!("{JOB_NAME}.tex"));
        let pdf = dir.join(format!("{JOB_NAME}.pdf"));
        let log = dir.join(format!("{JOB_NAME}.log"));
        let svg = dir.join(format!("{JOB_NAME}.svg"));

        fs::write(&tex, standalone_document(latex, &self.extra_packages))
            .map_err(RenderError::Workspace)?;

        tracing::debug!(stage = %RenderStage::Compiling, "pdflatex");
        let mut output_directory = OsString::from("-output-directory=");
        output_directory.push(dir);
        let compiled = run_with_timeout(
            Command::new(&self.toolchain.compiler)
                .current_dir(dir)
                .args([
                    "-interaction=nonstopmode",
                    "-file-line-error",
                    "-halt-on-error",
                ])
                .arg(output_directory)
                .arg(&tex),
            self.timeout,
        )?;
        if !compiled.success() {
            return Err(RenderError::Compile(extract_tex_error(&log)));
        }
        if !pdf.exists() {
            return Err(RenderError::MissingPdf(extract_tex_error(&log)));
        }

        tracing::debug!(stage = %RenderStage::Converting, converter = %self.toolchain.converter);
        let converted = run_with_timeout(
            Command::new(&self.toolchain.converter_path)
                .current_dir(dir)
                .args(converter_args(self.toolchain.converter, &pdf, &svg)),
            self.timeout,
        )?;
        if !converted.success() {
            return Err(RenderError::Convert {
                converter: self.toolchain.converter,
                message: converted.failure_message(),
            });
        }

        let content = fs::read_to_string(&svg).map_err(|_| RenderError::MissingSvg)?;
        Ok(optimize_svg(&content, &self.css_class))
    }
}

impl DiagramRenderer for TexRenderer {
    fn render(&self, latex: &str) -> Result<String, RenderError> {
        let workspace = tempfile::Builder::new()
            .prefix("oym-tikz-")
            .tempdir()
            .map_err(RenderError::Workspace)?;
        let path = workspace.path().to_path_buf();

        let result = self.render_in(&path, latex);

        if let Err(e) = workspace.close() {
            tracing::warn!(path = %path.display(), "Failed to remove render workspace: {e}");
        }
        result
    }
}

/// Renderer used when no TeX toolchain is installed.
///
/// Every diagram fails with the discovery error, so each one still receives
/// a fallback SVG.
#[derive(Debug, Clone)]
pub struct UnavailableRenderer {
    error: ToolchainError,
}

impl UnavailableRenderer {
    #[must_use]
    pub fn new(error: ToolchainError) -> Self {
        Self { error }
    }
}

impl DiagramRenderer for UnavailableRenderer {
    fn render(&self, _latex: &str) -> Result<String, RenderError> {
        Err(RenderError::Toolchain(self.error.clone()))
    }
}

/// Arguments turning `pdf` into `svg` with `converter`.
fn converter_args(converter: SvgConverter, pdf: &Path, svg: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    match converter {
        SvgConverter::Pdf2Svg => {
            args.push(pdf.into());
            args.push(svg.into());
        }
        SvgConverter::Dvisvgm => {
            args.extend(["--pdf", "--no-fonts", "--optimize=all"].map(OsString::from));
            args.push(pdf.into());
            args.push("-o".into());
            args.push(svg.into());
        }
        SvgConverter::Inkscape => {
            args.push("--pdf-poppler".into());
            args.push(pdf.into());
            args.push("--export-type=svg".into());
            let mut filename = OsString::from("--export-filename=");
            filename.push(svg);
            args.push(filename);
        }
    }
    args
}

/// Standalone document compiling `latex` to a cropped single-page PDF.
///
/// The `tikzpicture` environment is added unless `latex` already opens one.
#[must_use]
pub fn standalone_document(latex: &str, extra_packages: &[String]) -> String {
    let picture = if latex.trim().starts_with("\\begin{tikzpicture}") {
        latex.to_owned()
    } else {
        format!("\\begin{{tikzpicture}}\n{latex}\n\\end{{tikzpicture}}")
    };

    let mut doc = String::from("\\documentclass[crop,tikz,border=2pt]{standalone}\n");
    for package in PACKAGES
        .iter()
        .copied()
        .chain(extra_packages.iter().map(String::as_str))
    {
        doc.push_str(&format!("\\usepackage{{{package}}}\n"));
    }
    doc.push_str("\\pgfplotsset{compat=1.18}\n\\usepackage{tikz}\n");
    doc.push_str(&format!("\\usetikzlibrary{{{}}}\n", TIKZ_LIBRARIES.join(",")));
    doc.push_str("\\begin{document}\n");
    doc.push_str(&picture);
    doc.push_str("\n\\end{document}\n");
    doc
}
