//! LaTeX exercise compiler.
//!
//! Turns exercise sources written with the OYM command vocabulary into
//! [`CompiledDocument`] JSON plus a per-document [`ArtifactBundle`] holding
//! TikZ sources and rendered code blocks.
//!
//! - [`DocumentCompiler`] compiles one source
//! - [`Builder`] compiles a whole tree, in parallel and incrementally
//! - [`MarkupConverter`] is the LaTeX-to-HTML seam ([`PandocConverter`],
//!   [`BasicConverter`])
//!
//! # Example
//!
//! ```ignore
//! use oym_compiler::{BasicConverter, DocumentCompiler};
//!
//! let compiler = DocumentCompiler::new(Box::new(BasicConverter));
//! let compilation = compiler.compile_file(Path::new("ex1.tex"))?;
//! println!("{}", compilation.document.title);
//! ```

mod build;
mod commands;
mod compiler;
mod convert;
mod model;
mod normalize;

pub use build::{BuildError, BuildOptions, Builder};
pub use commands::{COMMANDS, CommandRole, MetaField, role_of};
pub use compiler::{Compilation, CompileError, DocumentCompiler, generate_short_id};
pub use convert::{
    BasicConverter, ConvertError, MarkupConverter, PandocConverter, clean_pandoc_html,
    select_converter,
};
pub use model::{
    ArtifactBundle, ArtifactIndex, BlockKind, CodeArtifact, CompiledDocument, ContentBlock,
    DiagramArtifact,
};
pub use normalize::{normalize_theme, parse_difficulty};
