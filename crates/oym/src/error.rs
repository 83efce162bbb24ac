//! CLI error types.

use oym_cache::CacheError;
use oym_compiler::{BuildError, ConvertError};
use oym_config::ConfigError;
use oym_tikz::OrchestratorError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Convert(#[from] ConvertError),

    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("{0}")]
    Render(#[from] OrchestratorError),

    #[error("{0}")]
    Cache(#[from] CacheError),

    /// The command ran but some items failed.
    #[error("{0}")]
    Failed(String),
}
