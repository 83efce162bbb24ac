//! Placeholder substitution around the external converter.
//!
//! The converter understands plain LaTeX but neither TikZ pictures nor
//! verbatim references. Before conversion those constructs are swapped for
//! opaque tokens; after conversion each token is replaced with its final HTML.
//!
//! ```text
//! \BUseVerbatim{algopy}  ->  OYMPHCODE3f9a0c...  ->  <div class="code-block">...
//! \begin{tikzpicture}... ->  OYMPHTIKZ81be4d...  ->  <p class="tikz-container"><img ...></p>
//! ```

use std::sync::LazyLock;

use rand::RngExt;
use regex::{Captures, Regex};

use crate::diagram::{DiagramSet, TIKZ_REGION};
use crate::verbatim::{VerbatimBlocks, escape_html};

const TOKEN_PREFIX: &str = "OYMPH";

/// Code references, most specific surface syntax first.
static CODE_REFS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        r"\{\\centering\s+\\fbox\{\\BUseVerbatim\{([^}]+)\}\}\\par\}",
        r"\\fbox\{\\BUseVerbatim\{([^}]+)\}\}",
        r"\{\\BUseVerbatim\{([^}]+)\}\\par\}",
        r"\\BUseVerbatim\{([^}]+)\}",
    ]
    .map(|pattern| Regex::new(pattern).unwrap())
});

/// Diagram regions wrapped in a layout environment, one pattern per wrapper.
static WRAPPED_DIAGRAMS: LazyLock<[(Wrapper, Regex); 3]> = LazyLock::new(|| {
    [Wrapper::Center, Wrapper::Figure, Wrapper::Minipage].map(|wrapper| {
        let env = wrapper.environment();
        let pattern = format!(
            r"(?s)\\begin\{{{env}\}}(?:\[[^\]]*\])?(?:\{{[^}}]*\}})?\s*(\\begin\{{tikzpicture\}}.*?\\end\{{tikzpicture\}})\s*\\end\{{{env}\}}"
        );
        (wrapper, Regex::new(&pattern).unwrap())
    })
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wrapper {
    Center,
    Figure,
    Minipage,
}

impl Wrapper {
    fn environment(self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::Figure => "figure",
            Self::Minipage => "minipage",
        }
    }

    fn is_centered(self) -> bool {
        matches!(self, Self::Center | Self::Figure)
    }
}

/// Kind of content a placeholder stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Diagram,
    Code,
}

impl PlaceholderKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Diagram => "TIKZ",
            Self::Code => "CODE",
        }
    }
}

/// Token to HTML table for one content block.
#[derive(Debug, Default)]
pub struct PlaceholderTable {
    diagrams: Vec<(String, String)>,
    code: Vec<(String, String)>,
}

impl PlaceholderTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `html` and return a fresh token for it.
    ///
    /// The token is unique within the table and does not occur in `text`.
    pub fn insert(&mut self, kind: PlaceholderKind, html: String, text: &str) -> String {
        let mut rng = rand::rng();
        let token = loop {
            let candidate = format!("{TOKEN_PREFIX}{}{:016x}", kind.tag(), rng.random::<u64>());
            if !text.contains(&candidate) && !self.contains_token(&candidate) {
                break candidate;
            }
        };

        let entries = match kind {
            PlaceholderKind::Diagram => &mut self.diagrams,
            PlaceholderKind::Code => &mut self.code,
        };
        entries.push((token.clone(), html));
        token
    }

    fn contains_token(&self, token: &str) -> bool {
        self.diagrams
            .iter()
            .chain(&self.code)
            .any(|(existing, _)| existing == token)
    }

    /// Replace every token in `html`, diagrams first, then code.
    pub fn restore(self, html: &mut String) {
        for (token, replacement) in self.diagrams.into_iter().chain(self.code) {
            if html.contains(&token) {
                *html = html.replace(&token, &replacement);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.diagrams.len() + self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagrams.is_empty() && self.code.is_empty()
    }
}

/// Swap code references and diagram regions in `text` for tokens.
///
/// Returns the converter-safe text and the table needed to restore it.
#[must_use]
pub fn protect(
    text: &str,
    code: &VerbatimBlocks,
    diagrams: &DiagramSet,
) -> (String, PlaceholderTable) {
    let mut table = PlaceholderTable::new();
    let mut current = text.to_owned();

    if current.contains("\\BUseVerbatim{") {
        for pattern in CODE_REFS.iter() {
            current = replace_with_tokens(&current, pattern, &mut table, |caps| {
                let name = &caps[1];
                let html = if let Some(block) = code.get(name) {
                    block.html()
                } else {
                    tracing::warn!(name, "reference to undefined code block");
                    format!(
                        r#"<div class="code-error">Code block "{}" not found</div>"#,
                        escape_html(name)
                    )
                };
                Some((PlaceholderKind::Code, html))
            });
        }
    }

    if current.contains("\\begin{tikzpicture}") {
        for (wrapper, pattern) in WRAPPED_DIAGRAMS.iter() {
            current = replace_with_tokens(&current, pattern, &mut table, |caps| {
                let entry = diagrams.lookup(&caps[1]);
                if entry.is_none() {
                    tracing::warn!("unknown diagram region left in place");
                }
                entry.map(|entry| (PlaceholderKind::Diagram, diagram_html(&entry.img, *wrapper)))
            });
        }
        current = replace_with_tokens(&current, &TIKZ_REGION, &mut table, |caps| {
            let entry = diagrams.lookup(&caps[0]);
            if entry.is_none() {
                tracing::warn!("unknown diagram region left in place");
            }
            entry.map(|entry| {
                let html = format!(r#"<p class="tikz-container">{}</p>"#, entry.img);
                (PlaceholderKind::Diagram, html)
            })
        });
    }

    (current, table)
}

fn diagram_html(img: &str, wrapper: Wrapper) -> String {
    if wrapper.is_centered() {
        format!(r#"<div class="tikz-container" style="text-align: center;">{img}</div>"#)
    } else {
        format!(r#"<p class="tikz-container">{img}</p>"#)
    }
}

/// Replace every match of `pattern` for which `resolve` yields HTML with a token.
///
/// Matches that resolve to `None` are kept verbatim.
fn replace_with_tokens<F>(
    text: &str,
    pattern: &Regex,
    table: &mut PlaceholderTable,
    mut resolve: F,
) -> String
where
    F: FnMut(&Captures<'_>) -> Option<(PlaceholderKind, String)>,
{
    let mut result = String::with_capacity(text.len());
    let mut last = 0;

    for caps in pattern.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        result.push_str(&text[last..whole.start()]);
        match resolve(&caps) {
            Some((kind, html)) => result.push_str(&table.insert(kind, html, text)),
            None => result.push_str(whole.as_str()),
        }
        last = whole.end();
    }

    result.push_str(&text[last..]);
    result
}
