//! LaTeX-to-HTML converters.
//!
//! [`PandocConverter`] shells out to pandoc. [`BasicConverter`] is a small
//! regex converter used when pandoc is not installed.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use oym_config::{ConverterConfig, ConverterKind};
use oym_latex::text::fold_accents;
use oym_toolchain::{ExecError, Probe, run_with_timeout};
use regex::Regex;

/// Converts a LaTeX fragment to an HTML fragment.
pub trait MarkupConverter: Send + Sync {
    fn convert(&self, latex: &str) -> Result<String, ConvertError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Conversion failure for one fragment.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("{0}")]
    Exec(#[from] ExecError),
    #[error("{program} failed: {message}")]
    Failed { program: String, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} not found")]
    NotInstalled(String),
}

static BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*?)</body>").unwrap());
static ID_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\s+id="[^"]*""#).unwrap());
static DATA_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+data-[^=]*="[^"]*""#).unwrap());
static SPACE_BEFORE_GT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+>").unwrap());

/// Pandoc-backed converter.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: PathBuf,
    timeout: Duration,
}

impl PandocConverter {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl MarkupConverter for PandocConverter {
    fn convert(&self, latex: &str) -> Result<String, ConvertError> {
        let workspace = tempfile::Builder::new().prefix("oym-pandoc-").tempdir()?;
        let input = workspace.path().join("input.tex");
        let output = workspace.path().join("output.html");

        let document = format!(
            "\\documentclass{{article}}\n\\usepackage{{amsmath}}\n\\begin{{document}}\n{}\n\\end{{document}}\n",
            fold_accents(latex)
        );
        fs::write(&input, document)?;

        let result = run_with_timeout(
            Command::new(&self.program)
                .arg(&input)
                .args(["-f", "latex+smart", "-t", "html", "--mathjax", "--wrap=preserve", "-o"])
                .arg(&output),
            self.timeout,
        )?;
        if !result.success() {
            return Err(ConvertError::Failed {
                program: self.program.display().to_string(),
                message: result.failure_message(),
            });
        }

        let html = fs::read_to_string(&output)?;
        Ok(clean_pandoc_html(&html))
    }

    fn name(&self) -> &'static str {
        "pandoc"
    }
}

/// Keep only the body content and drop `id`/`data-*` attributes.
#[must_use]
pub fn clean_pandoc_html(html: &str) -> String {
    let body = BODY
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map_or(html, |m| m.as_str());
    let html = ID_ATTR.replace_all(body, "");
    let html = DATA_ATTR.replace_all(&html, "");
    SPACE_BEFORE_GT.replace_all(&html, ">").trim().to_owned()
}

/// Inline rules of the basic converter, applied in order.
static BASIC_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\\textbf\{([^}]+)\}", "<strong>$1</strong>"),
        (r"\\textit\{([^}]+)\}", "<em>$1</em>"),
        (r"\\emph\{([^}]+)\}", "<em>$1</em>"),
        (r"\\begin\{itemize\}", "<ul>"),
        (r"\\end\{itemize\}", "</ul>"),
        (r"\\begin\{enumerate\}", "<ol>"),
        (r"\\end\{enumerate\}", "</ol>"),
        (r"\\item\b\s*", "<li>"),
        (r"\\\\", "<br>"),
        (r"\\section\*?\{([^}]+)\}", "<h2>$1</h2>"),
        (r"\\subsection\*?\{([^}]+)\}", "<h3>$1</h3>"),
        (r"\\subsubsection\*?\{([^}]+)\}", "<h4>$1</h4>"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// Regex converter covering paragraphs, emphasis, lists, line breaks and headings.
///
/// Math is passed through untouched for client-side rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicConverter;

impl MarkupConverter for BasicConverter {
    fn convert(&self, latex: &str) -> Result<String, ConvertError> {
        let mut html = fold_accents(latex.trim());
        for (pattern, replacement) in BASIC_RULES.iter() {
            if pattern.is_match(&html) {
                html = pattern.replace_all(&html, *replacement).into_owned();
            }
        }

        let paragraphs: Vec<String> = PARAGRAPH_BREAK
            .split(&html)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                if is_block_element(p) {
                    p.to_owned()
                } else {
                    format!("<p>{p}</p>")
                }
            })
            .collect();
        Ok(paragraphs.join("\n"))
    }

    fn name(&self) -> &'static str {
        "basic"
    }
}

fn is_block_element(fragment: &str) -> bool {
    ["<ul>", "<ol>", "<h2>", "<h3>", "<h4>"]
        .iter()
        .any(|tag| fragment.starts_with(tag))
}

/// Build the converter selected by `config`.
///
/// `auto` picks pandoc when `probe` finds it and falls back to
/// [`BasicConverter`] otherwise. `pandoc` requires pandoc to be installed.
pub fn select_converter(
    config: &ConverterConfig,
    probe: &dyn Probe,
) -> Result<Box<dyn MarkupConverter>, ConvertError> {
    match config.kind {
        ConverterKind::Basic => Ok(Box::new(BasicConverter)),
        ConverterKind::Pandoc => {
            let program = probe
                .find(&config.program)
                .ok_or_else(|| ConvertError::NotInstalled(config.program.clone()))?;
            Ok(Box::new(PandocConverter::new(program, config.timeout())))
        }
        ConverterKind::Auto => {
            if let Some(program) = probe.find(&config.program) {
                Ok(Box::new(PandocConverter::new(program, config.timeout())))
            } else {
                tracing::warn!(
                    program = config.program,
                    "pandoc not available, using basic LaTeX conversion"
                );
                Ok(Box::new(BasicConverter))
            }
        }
    }
}
