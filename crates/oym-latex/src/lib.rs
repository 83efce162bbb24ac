//! LaTeX source handling for OYM exercises.
//!
//! Nothing here runs an external tool. The crate turns raw exercise source
//! into the pieces the compiler needs:
//!
//! - [`scanner`]: brace-balanced extraction of a fixed command vocabulary
//! - [`verbatim`]: `SaveVerbatim` code blocks and their HTML
//! - [`diagram`]: deduplicated `tikzpicture` regions
//! - [`placeholder`]: token substitution around the markup converter
//! - [`text`]: comment stripping, accent folding, display-math wrapping

pub mod diagram;
pub mod placeholder;
pub mod scanner;
pub mod text;
pub mod verbatim;

pub use diagram::{DEFAULT_PUBLIC_PATH, DiagramEntry, DiagramSet, extract_diagrams};
pub use placeholder::{PlaceholderKind, PlaceholderTable, protect};
pub use scanner::{CommandMatch, CommandScanner};
pub use verbatim::{CodeLanguage, VerbatimBlock, VerbatimBlocks, extract_verbatim_blocks};
