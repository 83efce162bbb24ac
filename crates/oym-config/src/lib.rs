//! Configuration management for OYM.
//!
//! Parses `oym.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `content.source_dir`, `content.output_dir`, `content.artifacts_dir`,
//!   `content.static_dir`
//! - `converter.program`

mod expand;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override exercise source directory (or single file).
    pub source_dir: Option<PathBuf>,
    /// Override compiled output directory.
    pub output_dir: Option<PathBuf>,
    /// Override incremental build flag.
    pub incremental: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "oym.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content locations (paths are relative strings from TOML).
    content: ContentConfigRaw,
    /// Compilation pass settings.
    pub build: BuildConfig,
    /// LaTeX-to-HTML converter settings.
    pub converter: ConverterConfig,
    /// Diagram render pass settings.
    pub render: RenderConfig,

    /// Resolved content configuration (set after loading).
    #[serde(skip)]
    pub content_resolved: ContentConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw content configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ContentConfigRaw {
    source_dir: Option<String>,
    output_dir: Option<String>,
    artifacts_dir: Option<String>,
    static_dir: Option<String>,
    extension: Option<String>,
}

/// Resolved content configuration with absolute paths.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ContentConfig {
    /// Exercise sources (`.tex` tree).
    pub source_dir: PathBuf,
    /// Compiled document JSON tree, also the cache root.
    pub output_dir: PathBuf,
    /// Artifact bundles (`{id}.json`).
    pub artifacts_dir: PathBuf,
    /// Web root that rendered SVG URLs are relative to.
    pub static_dir: PathBuf,
    /// Source file extension, without the dot.
    pub extension: String,
}

/// Compilation pass settings.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Skip sources whose cached output is still valid.
    pub incremental: bool,
    /// Worker threads; 0 means available parallelism.
    pub jobs: usize,
}

impl BuildConfig {
    #[must_use]
    pub fn worker_count(&self) -> usize {
        resolve_jobs(self.jobs)
    }
}

/// Which LaTeX-to-HTML converter to use.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    /// Pandoc when installed, otherwise the basic converter.
    #[default]
    Auto,
    Pandoc,
    Basic,
}

/// LaTeX-to-HTML converter settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ConverterConfig {
    pub kind: ConverterKind,
    /// Pandoc executable name or path.
    pub program: String,
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            kind: ConverterKind::Auto,
            program: "pandoc".to_owned(),
            timeout_secs: 60,
        }
    }
}

impl ConverterConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Diagram render pass settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RenderConfig {
    /// URL prefix of rendered SVGs.
    pub public_path: String,
    /// Class injected into every rendered `<svg>`.
    pub css_class: String,
    pub timeout_secs: u64,
    /// Worker threads; 0 means available parallelism.
    pub jobs: usize,
    /// Extra `\usepackage` names for the standalone document.
    pub extra_packages: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            public_path: "/artifacts/tikz".to_owned(),
            css_class: "tikz-diagram".to_owned(),
            timeout_secs: 60,
            jobs: 0,
            extra_packages: Vec::new(),
        }
    }
}

impl RenderConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        resolve_jobs(self.jobs)
    }
}

fn resolve_jobs(jobs: usize) -> usize {
    if jobs > 0 {
        return jobs;
    }
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`converter.program`").
        field: String,
        /// Error message (e.g., "${`PANDOC`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a timeout to be positive.
fn require_positive(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `oym.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(source_dir) = &settings.source_dir {
            self.content_resolved.source_dir.clone_from(source_dir);
        }
        if let Some(output_dir) = &settings.output_dir {
            self.content_resolved.output_dir.clone_from(output_dir);
        }
        if let Some(incremental) = settings.incremental {
            self.build.incremental = incremental;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        let mut config = Self {
            content: ContentConfigRaw::default(),
            build: BuildConfig::default(),
            converter: ConverterConfig::default(),
            render: RenderConfig::default(),
            content_resolved: ContentConfig::default(),
            config_path: None,
        };
        config.resolve_paths(base);
        config
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.content_resolved.extension, "content.extension")?;
        require_non_empty(&self.converter.program, "converter.program")?;
        require_positive(self.converter.timeout_secs, "converter.timeout_secs")?;
        require_positive(self.render.timeout_secs, "render.timeout_secs")?;

        if !self.render.public_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "render.public_path must start with /".to_owned(),
            ));
        }
        require_non_empty(&self.render.css_class, "render.css_class")?;

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        expand::expand_opt(&mut self.content.source_dir, "content.source_dir")?;
        expand::expand_opt(&mut self.content.output_dir, "content.output_dir")?;
        expand::expand_opt(&mut self.content.artifacts_dir, "content.artifacts_dir")?;
        expand::expand_opt(&mut self.content.static_dir, "content.static_dir")?;
        self.converter.program = expand::expand_env(&self.converter.program, "converter.program")?;
        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.content_resolved = ContentConfig {
            source_dir: resolve(self.content.source_dir.as_deref(), "content/exercises"),
            output_dir: resolve(self.content.output_dir.as_deref(), "cache/exercises"),
            artifacts_dir: resolve(self.content.artifacts_dir.as_deref(), "static/artifacts"),
            static_dir: resolve(self.content.static_dir.as_deref(), "static"),
            extension: self
                .content
                .extension
                .as_deref()
                .unwrap_or("tex")
                .trim_start_matches('.')
                .to_owned(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(
            config.content_resolved,
            ContentConfig {
                source_dir: PathBuf::from("/test/content/exercises"),
                output_dir: PathBuf::from("/test/cache/exercises"),
                artifacts_dir: PathBuf::from("/test/static/artifacts"),
                static_dir: PathBuf::from("/test/static"),
                extension: "tex".to_owned(),
            }
        );
        assert!(!config.build.incremental);
        assert_eq!(config.converter.kind, ConverterKind::Auto);
        assert_eq!(config.converter.program, "pandoc");
        assert_eq!(config.converter.timeout(), Duration::from_secs(60));
        assert_eq!(config.render.public_path, "/artifacts/tikz");
        assert_eq!(config.render.css_class, "tikz-diagram");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.converter.program, "pandoc");
        assert_eq!(config.render.timeout_secs, 60);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[content]
source_dir = "exercices"
extension = ".tex"

[build]
incremental = true
jobs = 4

[converter]
kind = "basic"
timeout_secs = 10

[render]
public_path = "/img/tikz"
jobs = 2
extra_packages = ["mhchem"]
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(
            config.content_resolved.source_dir,
            PathBuf::from("/project/exercices")
        );
        assert_eq!(config.content_resolved.extension, "tex");
        assert!(config.build.incremental);
        assert_eq!(config.build.worker_count(), 4);
        assert_eq!(config.converter.kind, ConverterKind::Basic);
        assert_eq!(config.render.public_path, "/img/tikz");
        assert_eq!(config.render.worker_count(), 2);
        assert_eq!(config.render.extra_packages, vec!["mhchem".to_owned()]);
    }

    #[test]
    fn test_unknown_converter_kind_is_parse_error() {
        let result: Result<Config, _> = toml::from_str("[converter]\nkind = \"latexml\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_jobs_uses_available_parallelism() {
        assert!(BuildConfig::default().worker_count() >= 1);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.render.timeout_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("render.timeout_secs"));
    }

    #[test]
    fn test_validate_rejects_relative_public_path() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.render.public_path = "artifacts/tikz".to_owned();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("render.public_path"));
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            source_dir: Some(PathBuf::from("/custom/src")),
            incremental: Some(true),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(
            config.content_resolved.source_dir,
            PathBuf::from("/custom/src")
        );
        assert_eq!(
            config.content_resolved.output_dir,
            PathBuf::from("/test/cache/exercises")
        ); // Unchanged
        assert!(config.build.incremental);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("oym.toml");
        std::fs::write(
            &path,
            "[content]\noutput_dir = \"${OYM_TEST_CONFIG_OUT_UNSET:-build/json}\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(
            config.content_resolved.output_dir,
            tmp.path().join("build/json")
        );
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/oym.toml")), None);
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("oym.toml");
        std::fs::write(&path, "[build\nincremental = true").unwrap();

        let result = Config::load(Some(&path), None);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
