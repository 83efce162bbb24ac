//! Compiled records written by the build pass.

use std::sync::LazyLock;

use oym_cache::{CacheRecord, FileEntry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Keys every stored document must carry.
const REQUIRED_FIELDS: &[&str] = &["title", "content", "source_hash", "updated_at"];

/// One compiled exercise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledDocument {
    #[serde(alias = "uuid")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub chapter: String,
    #[serde(default)]
    pub subchapter: String,
    #[serde(default)]
    pub theme: String,
    /// Difficulty level, 1 to 5.
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub created_at: String,
    /// Compile time (RFC 3339).
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub artifacts: ArtifactIndex,
    /// SHA-256 of the source at compile time.
    #[serde(default)]
    pub source_hash: String,
}

impl CompiledDocument {
    /// Plain text used by the full-text index.
    ///
    /// For each block: HTML with tags turned into spaces and whitespace
    /// collapsed, followed by the block's LaTeX.
    #[must_use]
    pub fn search_text(&self) -> String {
        self.content
            .iter()
            .map(|block| {
                let text = HTML_TAG.replace_all(&block.html, " ");
                let text = WHITESPACE.replace_all(&text, " ");
                format!("{} {}", text.trim(), block.latex).trim().to_owned()
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl CacheRecord for CompiledDocument {
    fn cache_entry(&self) -> FileEntry {
        FileEntry {
            source_hash: self.source_hash.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            id: self.id.clone(),
            title: self.title.clone(),
        }
    }

    fn integrity_issues(value: &Value) -> Vec<String> {
        let mut issues = Vec::new();
        if value.get("id").or_else(|| value.get("uuid")).is_none() {
            issues.push("missing required field: id".to_owned());
        }
        for field in REQUIRED_FIELDS {
            if value.get(field).is_none() {
                issues.push(format!("missing required field: {field}"));
            }
        }

        match value.get("content") {
            Some(Value::Array(blocks)) => {
                for (index, block) in blocks.iter().enumerate() {
                    let non_empty = |key: &str| {
                        block
                            .get(key)
                            .and_then(Value::as_str)
                            .is_some_and(|s| !s.is_empty())
                    };
                    // A blank block legitimately compiles to empty HTML.
                    let has_html = block.get("html").is_some_and(Value::is_string);
                    if !(non_empty("id") && non_empty("type") && has_html) {
                        issues.push(format!("invalid content block at index {index}"));
                    }
                }
            }
            Some(_) => issues.push("content is not an array".to_owned()),
            None => {}
        }
        issues
    }
}

/// Role of a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Question,
    Hint,
    Answer,
    Code,
}

/// One converted content command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// `block_{order}`.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    /// Source argument, trimmed.
    pub latex: String,
    pub html: String,
    /// Position in the document, from 1.
    pub order: usize,
}

/// Identifiers of the artifacts a document references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactIndex {
    #[serde(default)]
    pub tikz: Vec<String>,
    #[serde(default)]
    pub geogebra: Vec<String>,
    #[serde(default)]
    pub code: Vec<String>,
    #[serde(default)]
    pub video: Option<String>,
}

/// Heavy artifacts of one document, stored apart from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    #[serde(default)]
    pub tikz: Vec<DiagramArtifact>,
    #[serde(default)]
    pub code: Vec<CodeArtifact>,
}

impl ArtifactBundle {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tikz.is_empty() && self.code.is_empty()
    }
}

/// A TikZ picture awaiting (or after) rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramArtifact {
    pub id: String,
    /// Public URL of the SVG.
    pub url: String,
    pub latex: String,
    /// Rendered SVG; empty until the render pass runs.
    #[serde(default)]
    pub svg: String,
}

/// A verbatim code block with its rendered HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub id: String,
    pub name: String,
    pub language: String,
    pub content: String,
    pub html: String,
}
