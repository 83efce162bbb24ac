//! TikZ diagram rendering for OYM.
//!
//! The compile pass leaves each diagram's TikZ source in the document's
//! artifact bundle with an empty `svg`. This crate fills it in:
//!
//! - [`RenderOrchestrator`] walks the artifact bundles and renders in parallel
//! - [`DiagramRenderer`] is the rendering capability, with [`TexRenderer`]
//!   (pdflatex plus pdf2svg, dvisvgm or inkscape) as the real backend
//! - [`optimize_svg`] and [`error_svg`] post-process output and synthesize
//!   the fallback image for failed diagrams
//! - [`UnavailableRenderer`] stands in when the toolchain is missing, so the
//!   pass still gives every diagram a fallback image
//!
//! # Example
//!
//! ```ignore
//! use oym_tikz::{RenderOrchestrator, RenderSettings};
//! use oym_toolchain::SystemProbe;
//!
//! let orchestrator = RenderOrchestrator::discover(&SystemProbe, settings);
//! let summary = orchestrator.run(Path::new("static/artifacts"))?;
//! println!("{} diagrams rendered", summary.rendered);
//! ```

mod log;
mod orchestrator;
mod renderer;
mod svg;

pub use log::extract_tex_error;
pub use orchestrator::{OrchestratorError, RenderOrchestrator, RenderSettings, RenderSummary};
pub use renderer::{
    DiagramRenderer, RenderError, RenderStage, TexRenderer, UnavailableRenderer, standalone_document,
};
pub use svg::{error_svg, optimize_svg};
