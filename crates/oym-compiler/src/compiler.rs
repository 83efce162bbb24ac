//! Single-document compilation.
//!
//! Pipeline for one source:
//!
//! ```text
//! hash -> id -> SaveVerbatim blocks -> tikzpicture regions -> commands
//!   metadata command: strip comments, fold accents, normalize
//!   content command:  strip comments -> placeholders -> $$ wrap -> convert -> restore
//! ```
//!
//! Content blocks are converted in parallel and emitted in source order.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::Engine;
use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use oym_cache::{hash, timestamp_now};
use oym_latex::text::{strip_comments, wrap_display_math};
use oym_latex::verbatim::escape_html;
use oym_latex::{
    CommandScanner, DEFAULT_PUBLIC_PATH, DiagramSet, VerbatimBlocks, extract_diagrams,
    extract_verbatim_blocks, protect,
};
use rand::RngExt;
use rayon::prelude::*;
use regex::Regex;

use crate::commands::{CommandRole, MetaField, command_names, role_of};
use crate::convert::MarkupConverter;
use crate::model::{
    ArtifactBundle, BlockKind, CodeArtifact, CompiledDocument, ContentBlock, DiagramArtifact,
};
use crate::normalize::{clean_meta, normalize_theme, parse_difficulty};

static GEOGEBRA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\geogebra\{([^}]+)\}").unwrap());

/// Failure to read a source document.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not valid UTF-8", path.display())]
    Encoding { path: PathBuf },
}

/// Output of compiling one source.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub document: CompiledDocument,
    pub bundle: ArtifactBundle,
    /// Soft problems found while compiling.
    pub warnings: Vec<String>,
}

/// A content command waiting for conversion.
struct PendingBlock {
    order: usize,
    kind: BlockKind,
    verbatim: bool,
    argument: String,
}

/// Compiles exercise sources with a given converter.
pub struct DocumentCompiler {
    converter: Box<dyn MarkupConverter>,
    scanner: CommandScanner,
    public_path: String,
}

impl DocumentCompiler {
    #[must_use]
    pub fn new(converter: Box<dyn MarkupConverter>) -> Self {
        Self {
            converter,
            scanner: CommandScanner::new(command_names()),
            public_path: DEFAULT_PUBLIC_PATH.to_owned(),
        }
    }

    /// Set the URL prefix of rendered diagram SVGs.
    #[must_use]
    pub fn with_public_path(mut self, public_path: impl Into<String>) -> Self {
        self.public_path = public_path.into();
        self
    }

    /// Name of the converter in use.
    #[must_use]
    pub fn converter_name(&self) -> &'static str {
        self.converter.name()
    }

    /// Read and compile the source at `path`.
    pub fn compile_file(&self, path: &Path) -> Result<Compilation, CompileError> {
        let bytes = std::fs::read(path).map_err(|source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source_hash = hash::hash_bytes(&bytes);
        let source = String::from_utf8(bytes).map_err(|_| CompileError::Encoding {
            path: path.to_path_buf(),
        })?;
        Ok(self.compile_source(&source, source_hash))
    }

    /// Compile source text whose hash is already known.
    #[must_use]
    pub fn compile_source(&self, source: &str, source_hash: String) -> Compilation {
        let mut warnings = Vec::new();
        let matches = self.scanner.scan(source);

        let id = matches
            .iter()
            .find(|m| m.name == "uuid")
            .map(|m| clean_meta(&m.argument))
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_short_id);

        let mut document = CompiledDocument {
            id,
            source_hash,
            updated_at: timestamp_now(),
            ..CompiledDocument::default()
        };
        let mut bundle = ArtifactBundle::default();

        let code = extract_verbatim_blocks(source);
        for name in &code.duplicates {
            warnings.push(format!("duplicate SaveVerbatim block \"{name}\" ignored"));
        }
        for block in code.iter() {
            document.artifacts.code.push(block.id.clone());
            bundle.code.push(CodeArtifact {
                id: block.id.clone(),
                name: block.name.clone(),
                language: block.language.as_str().to_owned(),
                content: block.content.trim().to_owned(),
                html: block.html(),
            });
        }

        let diagrams = extract_diagrams(source, &document.id, &self.public_path);
        for entry in diagrams.iter() {
            document.artifacts.tikz.push(entry.id.clone());
            bundle.tikz.push(DiagramArtifact {
                id: entry.id.clone(),
                url: entry.url.clone(),
                latex: entry.latex.clone(),
                svg: String::new(),
            });
        }

        let mut pending = Vec::new();
        for m in &matches {
            if m.unterminated {
                tracing::warn!(command = m.name, "unterminated command argument");
                warnings.push(format!(
                    "\\{} at byte {} is never closed; using the rest of the file",
                    m.name, m.start
                ));
            }
            match role_of(&m.name) {
                Some(CommandRole::Meta(MetaField::Id)) | None => {}
                Some(CommandRole::Meta(field)) => apply_meta(&mut document, field, &m.argument),
                Some(CommandRole::Content { kind, verbatim }) => pending.push(PendingBlock {
                    order: pending.len() + 1,
                    kind,
                    verbatim,
                    argument: m.argument.clone(),
                }),
            }
        }

        document.content = pending
            .par_iter()
            .map(|block| self.convert_block(block, &code, &diagrams))
            .collect();

        document.artifacts.geogebra = GEOGEBRA
            .captures_iter(source)
            .map(|caps| caps[1].to_owned())
            .collect();

        if document.title.is_empty() {
            warnings.push("missing title".to_owned());
        }

        Compilation {
            document,
            bundle,
            warnings,
        }
    }

    fn convert_block(
        &self,
        block: &PendingBlock,
        code: &VerbatimBlocks,
        diagrams: &DiagramSet,
    ) -> ContentBlock {
        let latex = block.argument.trim();
        let text = if block.verbatim {
            latex.to_owned()
        } else {
            strip_comments(latex)
        };

        let (protected, placeholders) = protect(&text, code, diagrams);
        let input = wrap_display_math(&protected);

        let html = if input.trim().is_empty() {
            String::new()
        } else {
            match self.converter.convert(&input) {
                Ok(mut html) => {
                    placeholders.restore(&mut html);
                    html
                }
                Err(e) => {
                    tracing::warn!(block = block.order, "conversion failed: {e}");
                    format!(
                        r#"<div class="error">Conversion error: {}</div>"#,
                        escape_html(&e.to_string())
                    )
                }
            }
        };

        ContentBlock {
            id: format!("block_{}", block.order),
            kind: block.kind,
            latex: latex.to_owned(),
            html,
            order: block.order,
        }
    }
}

fn apply_meta(document: &mut CompiledDocument, field: MetaField, raw: &str) {
    let value = clean_meta(raw);
    match field {
        MetaField::Id => {}
        MetaField::Title => document.title = value,
        MetaField::Chapter => document.chapter = value,
        MetaField::Subchapter => document.subchapter = value,
        MetaField::Theme => document.theme = normalize_theme(&value),
        MetaField::Author => document.author = value,
        MetaField::Organization => document.organization = value,
        MetaField::CreatedAt => document.created_at = value,
        MetaField::Difficulty => document.difficulty = parse_difficulty(&value),
        MetaField::VideoId => {
            document.artifacts.video = Some(value.clone());
            document.video_id = value;
        }
    }
}

/// Four URL-safe characters from three random bytes.
#[must_use]
pub fn generate_short_id() -> String {
    let bytes: [u8; 3] = rand::rng().random();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{BasicConverter, ConvertError};
    use pretty_assertions::assert_eq;

    /// Wraps its input in `<p>` and records nothing else.
    struct EchoConverter;

    impl MarkupConverter for EchoConverter {
        fn convert(&self, latex: &str) -> Result<String, ConvertError> {
            Ok(format!("<p>{latex}</p>"))
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    /// Fails on any input containing `FAIL`.
    struct FlakyConverter;

    impl MarkupConverter for FlakyConverter {
        fn convert(&self, latex: &str) -> Result<String, ConvertError> {
            if latex.contains("FAIL") {
                Err(ConvertError::Failed {
                    program: "flaky".to_owned(),
                    message: "bad <input>".to_owned(),
                })
            } else {
                Ok(latex.to_owned())
            }
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn compile(source: &str) -> Compilation {
        DocumentCompiler::new(Box::new(EchoConverter)).compile_source(source, "hash".to_owned())
    }

    #[test]
    fn test_metadata_fields() {
        let source = r"\uuid{ x1Y2 }
\titre{Suites arithm\'etiques}
\chapitre{Suites}
\sousChapitre{D\'efinitions}
\theme{Algebra ,Geometry}
\auteur{A. Martin}
\organisation{Lyc\'ee}
\video{dQw4w9WgXcQ}
\datecreate{2024-01-15}
\niveau{3}
\geogebra{abc123}
";
        let doc = compile(source).document;

        assert_eq!(doc.id, "x1Y2");
        assert_eq!(doc.title, "Suites arithmétiques");
        assert_eq!(doc.chapter, "Suites");
        assert_eq!(doc.subchapter, "Définitions");
        assert_eq!(doc.theme, "Algebra, Geometry");
        assert_eq!(doc.author, "A. Martin");
        assert_eq!(doc.organization, "Lycée");
        assert_eq!(doc.video_id, "dQw4w9WgXcQ");
        assert_eq!(doc.artifacts.video.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(doc.created_at, "2024-01-15");
        assert_eq!(doc.difficulty, Some(3));
        assert_eq!(doc.artifacts.geogebra, vec!["abc123".to_owned()]);
        assert_eq!(doc.source_hash, "hash");
        assert!(!doc.updated_at.is_empty());
    }

    #[test]
    fn test_invalid_difficulty_is_null() {
        assert_eq!(compile("\\niveau{abc}").document.difficulty, None);
    }

    #[test]
    fn test_generated_id_when_missing() {
        let doc = compile("\\titre{x}").document;
        assert_eq!(doc.id.len(), 4);
        assert!(
            doc.id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_missing_title_warning() {
        let result = compile("\\texte{x}");
        assert!(result.warnings.contains(&"missing title".to_owned()));
    }

    #[test]
    fn test_content_blocks_in_source_order() {
        let source = "\\titre{t}\n\\texte{A}\n\\question{B}\n\\indication{C}\n\\reponse{D}\n\\code{E % kept}";
        let doc = compile(source).document;

        let blocks: Vec<_> = doc
            .content
            .iter()
            .map(|b| (b.id.as_str(), b.kind, b.order, b.html.as_str()))
            .collect();
        assert_eq!(
            blocks,
            vec![
                ("block_1", BlockKind::Text, 1, "<p>A</p>"),
                ("block_2", BlockKind::Question, 2, "<p>B</p>"),
                ("block_3", BlockKind::Hint, 3, "<p>C</p>"),
                ("block_4", BlockKind::Answer, 4, "<p>D</p>"),
                ("block_5", BlockKind::Code, 5, "<p>E % kept</p>"),
            ]
        );
    }

    #[test]
    fn test_order_preserved_with_many_blocks() {
        let source: String = (1..=64).map(|i| format!("\\texte{{{i}}}\n")).collect();
        let doc = compile(&source).document;

        assert_eq!(doc.content.len(), 64);
        for (i, block) in doc.content.iter().enumerate() {
            assert_eq!(block.order, i + 1);
            assert_eq!(block.html, format!("<p>{}</p>", i + 1));
        }
    }

    #[test]
    fn test_comments_stripped_from_content_but_kept_in_latex() {
        let doc = compile("\\texte{ Soit $x$ % remarque\n}").document;
        assert_eq!(doc.content[0].latex, "Soit $x$ % remarque");
        assert_eq!(doc.content[0].html, "<p>Soit $x$</p>");
    }

    #[test]
    fn test_blank_block_skips_converter() {
        let doc = compile("\\texte{ % rien\n}").document;
        assert_eq!(doc.content[0].html, "");
    }

    #[test]
    fn test_display_math_wrapped() {
        let doc = compile("\\texte{\\begin{align*}x\\end{align*}}").document;
        assert_eq!(doc.content[0].html, "<p>$$\\begin{align*}x\\end{align*}$$</p>");
    }

    #[test]
    fn test_conversion_error_is_inline() {
        let compiler = DocumentCompiler::new(Box::new(FlakyConverter));
        let doc = compiler
            .compile_source("\\texte{ok}\\texte{FAIL}", "h".to_owned())
            .document;

        assert_eq!(doc.content[0].html, "ok");
        assert_eq!(
            doc.content[1].html,
            r#"<div class="error">Conversion error: flaky failed: bad &lt;input&gt;</div>"#
        );
    }

    #[test]
    fn test_diagrams_deduplicated_into_bundle() {
        let picture = "\\begin{tikzpicture}\\draw (0,0) -- (1,0);\\end{tikzpicture}";
        let other = "\\begin{tikzpicture}\\draw (0,0) circle (1);\\end{tikzpicture}";
        let source = format!(
            "\\uuid{{abc}}\n\\texte{{{picture}}}\n\\question{{\\begin{{center}}{picture}\\end{{center}}}}\n\\reponse{{{other}}}"
        );
        let result = compile(&source);

        assert_eq!(result.bundle.tikz.len(), 2);
        assert_eq!(result.document.artifacts.tikz, vec!["diagram_1", "diagram_2"]);
        assert_eq!(result.bundle.tikz[0].url, "/artifacts/tikz/abc-diagram_1.svg");
        assert_eq!(result.bundle.tikz[0].svg, "");

        let content = &result.document.content;
        assert_eq!(
            content[0].html,
            r#"<p><p class="tikz-container"><img src="/artifacts/tikz/abc-diagram_1.svg" alt="TikZ diagram 1" class="tikz-svg-image"></p></p>"#
        );
        assert!(content[1].html.contains(r#"style="text-align: center;""#));
        assert!(content[1].html.contains("abc-diagram_1.svg"));
        assert!(content[2].html.contains("abc-diagram_2.svg"));
        assert!(content.iter().all(|b| !b.html.contains("OYMPH")));
    }

    #[test]
    fn test_code_blocks_into_bundle_and_html() {
        let source = "\\begin{SaveVerbatim}{algopy}\n  x = 1\n\\end{SaveVerbatim}\n\
                      \\texte{\\fbox{\\BUseVerbatim{algopy}} et \\BUseVerbatim{nope}}";
        let result = compile(source);

        assert_eq!(result.document.artifacts.code, vec!["code_1"]);
        let artifact = &result.bundle.code[0];
        assert_eq!(artifact.name, "algopy");
        assert_eq!(artifact.language, "python");
        assert_eq!(artifact.content, "x = 1");
        assert!(artifact.html.contains("<code class=\"language-python\">x = 1</code>"));

        let html = &result.document.content[0].html;
        assert!(html.starts_with("<p><div class=\"code-block\" data-language=\"python\""));
        assert!(html.contains(r#"<div class="code-error">Code block "nope" not found</div>"#));
    }

    #[test]
    fn test_unterminated_block_kept_with_warning() {
        let result = compile("\\titre{t}\n\\texte{jamais ferm\\'e");
        assert_eq!(result.document.content.len(), 1);
        assert_eq!(result.document.content[0].latex, "jamais ferm\\'e");
        assert!(result.warnings.iter().any(|w| w.contains("never closed")));
    }

    #[test]
    fn test_compile_file_hashes_raw_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ex.tex");
        std::fs::write(&path, "\\titre{x}").unwrap();

        let compiler = DocumentCompiler::new(Box::new(BasicConverter));
        let result = compiler.compile_file(&path).unwrap();
        assert_eq!(result.document.source_hash, hash::hash_str("\\titre{x}"));
    }

    #[test]
    fn test_compile_file_missing() {
        let compiler = DocumentCompiler::new(Box::new(BasicConverter));
        let result = compiler.compile_file(Path::new("/nonexistent/ex.tex"));
        assert!(matches!(result, Err(CompileError::Io { .. })));
    }

    #[test]
    fn test_custom_public_path() {
        let compiler = DocumentCompiler::new(Box::new(EchoConverter)).with_public_path("/img");
        let result = compiler.compile_source(
            "\\uuid{u}\\begin{tikzpicture}\\end{tikzpicture}",
            "h".to_owned(),
        );
        assert_eq!(result.bundle.tikz[0].url, "/img/u-diagram_1.svg");
    }
}
