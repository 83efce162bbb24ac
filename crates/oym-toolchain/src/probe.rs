//! Dependency discovery.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Locates executables by name.
pub trait Probe: Send + Sync {
    /// Absolute path of `program`, or `None` when it is not installed.
    fn find(&self, program: &str) -> Option<PathBuf>;
}

/// [`Probe`] backed by a `PATH` lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl Probe for SystemProbe {
    fn find(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// [`Probe`] answering from a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    programs: HashMap<String, PathBuf>,
}

impl StaticProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `program` as installed at `path`.
    #[must_use]
    pub fn with(mut self, program: &str, path: impl Into<PathBuf>) -> Self {
        self.programs.insert(program.to_owned(), path.into());
        self
    }
}

impl Probe for StaticProbe {
    fn find(&self, program: &str) -> Option<PathBuf> {
        self.programs.get(program).cloned()
    }
}

/// PDF-to-SVG converter, in discovery priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvgConverter {
    Pdf2Svg,
    Dvisvgm,
    Inkscape,
}

impl SvgConverter {
    pub const ALL: [Self; 3] = [Self::Pdf2Svg, Self::Dvisvgm, Self::Inkscape];

    #[must_use]
    pub fn program(self) -> &'static str {
        match self {
            Self::Pdf2Svg => "pdf2svg",
            Self::Dvisvgm => "dvisvgm",
            Self::Inkscape => "inkscape",
        }
    }
}

impl fmt::Display for SvgConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Resolved TeX-to-SVG toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TexToolchain {
    /// Path to `pdflatex`.
    pub compiler: PathBuf,
    pub converter: SvgConverter,
    /// Path to the converter executable.
    pub converter_path: PathBuf,
}

/// Missing external dependency.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ToolchainError {
    #[error("pdflatex not found. Install a TeX distribution (TeX Live, MiKTeX)")]
    CompilerNotFound,
    #[error("No SVG converter found. Install pdf2svg, dvisvgm, or inkscape")]
    ConverterNotFound,
}

/// Find `pdflatex` and the first available PDF-to-SVG converter.
pub fn discover_tex_toolchain(probe: &dyn Probe) -> Result<TexToolchain, ToolchainError> {
    let compiler = probe
        .find("pdflatex")
        .ok_or(ToolchainError::CompilerNotFound)?;

    let (converter, converter_path) = SvgConverter::ALL
        .into_iter()
        .find_map(|converter| probe.find(converter.program()).map(|path| (converter, path)))
        .ok_or(ToolchainError::ConverterNotFound)?;

    tracing::debug!(
        compiler = %compiler.display(),
        converter = %converter,
        "discovered TeX toolchain"
    );

    Ok(TexToolchain {
        compiler,
        converter,
        converter_path,
    })
}
