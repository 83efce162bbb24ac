//! `SaveVerbatim` code blocks.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static SAVE_VERBATIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\begin\{SaveVerbatim\}\{([^}]+)\}(.*?)\\end\{SaveVerbatim\}").unwrap()
});

/// Programming language inferred from a block name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeLanguage {
    Python,
    JavaScript,
    Java,
    Sql,
    R,
    Cpp,
    C,
    Html,
    Css,
    Php,
    Bash,
    Matlab,
    Text,
}

/// Ordered language rules over the lowercased block name. First match wins.
const LANGUAGE_RULES: &[(fn(&str) -> bool, CodeLanguage)] = &[
    (|n| n.contains("python") || n.contains("py"), CodeLanguage::Python),
    (|n| n.contains("javascript") || n.contains("js"), CodeLanguage::JavaScript),
    (|n| n.contains("java"), CodeLanguage::Java),
    (|n| n.contains("sql"), CodeLanguage::Sql),
    (|n| n.contains('r') && n.len() <= 3, CodeLanguage::R),
    (|n| n.contains("cpp") || n.contains("c++"), CodeLanguage::Cpp),
    (|n| n.contains('c') && !n.contains("css"), CodeLanguage::C),
    (|n| n.contains("html"), CodeLanguage::Html),
    (|n| n.contains("css"), CodeLanguage::Css),
    (|n| n.contains("php"), CodeLanguage::Php),
    (|n| n.contains("bash") || n.contains("shell"), CodeLanguage::Bash),
    (|n| n.contains("matlab"), CodeLanguage::Matlab),
];

impl CodeLanguage {
    /// Infer the language from a `SaveVerbatim` block name.
    #[must_use]
    pub fn from_block_name(name: &str) -> Self {
        let name = name.to_lowercase();
        LANGUAGE_RULES
            .iter()
            .find(|(matches, _)| matches(name.as_str()))
            .map_or(Self::Text, |&(_, language)| language)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Java => "java",
            Self::Sql => "sql",
            Self::R => "r",
            Self::Cpp => "cpp",
            Self::C => "c",
            Self::Html => "html",
            Self::Css => "css",
            Self::Php => "php",
            Self::Bash => "bash",
            Self::Matlab => "matlab",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named verbatim block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbatimBlock {
    /// Artifact id (`code_1`, `code_2`, ...).
    pub id: String,
    pub name: String,
    pub language: CodeLanguage,
    /// Raw block body.
    pub content: String,
}

impl VerbatimBlock {
    /// Rendered HTML for this block.
    #[must_use]
    pub fn html(&self) -> String {
        render_code_html(&self.content, self.language, &self.name)
    }
}

/// Verbatim blocks of one document, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct VerbatimBlocks {
    blocks: Vec<VerbatimBlock>,
    by_name: HashMap<String, usize>,
    /// Names that appeared more than once.
    pub duplicates: Vec<String>,
}

impl VerbatimBlocks {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&VerbatimBlock> {
        self.by_name.get(name).map(|&index| &self.blocks[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &VerbatimBlock> {
        self.blocks.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Extract every `\begin{SaveVerbatim}{name} ... \end{SaveVerbatim}` block.
///
/// The first block with a given name wins; later duplicates are recorded in
/// [`VerbatimBlocks::duplicates`] and otherwise ignored.
#[must_use]
pub fn extract_verbatim_blocks(text: &str) -> VerbatimBlocks {
    let mut result = VerbatimBlocks::default();

    for caps in SAVE_VERBATIM.captures_iter(text) {
        let name = caps[1].to_owned();
        if result.by_name.contains_key(&name) {
            tracing::warn!(name, "duplicate SaveVerbatim block ignored");
            result.duplicates.push(name);
            continue;
        }

        let index = result.blocks.len();
        result.blocks.push(VerbatimBlock {
            id: format!("code_{}", index + 1),
            language: CodeLanguage::from_block_name(&name),
            content: caps[2].to_owned(),
            name: name.clone(),
        });
        result.by_name.insert(name, index);
    }

    result
}

/// Trim blank edge lines and remove the indentation common to all lines.
#[must_use]
pub fn dedent_code(code: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let first = lines.iter().position(|line| !line.trim().is_empty());
    let last = lines.iter().rposition(|line| !line.trim().is_empty());
    let (Some(first), Some(last)) = (first, last) else {
        return String::new();
    };
    let lines = &lines[first..=last];

    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                &line[indent..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape text for HTML content and attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    result
}

/// Render a code block as the HTML fragment embedded in documents.
#[must_use]
pub fn render_code_html(code: &str, language: CodeLanguage, name: &str) -> String {
    let escaped = escape_html(&dedent_code(code));
    let name = escape_html(name);
    let lang = language.as_str();
    let label = lang.to_uppercase();
    format!(
        r#"<div class="code-block" data-language="{lang}" data-block-name="{name}">
  <div class="code-header">
    <span class="language-label">{label}</span>
    <span class="block-name">{name}</span>
  </div>
  <pre><code class="language-{lang}">{escaped}</code></pre>
</div>"#
    )
}
