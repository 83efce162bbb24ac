//! TikZ diagram regions.
//!
//! Regions are deduplicated by their comment-stripped text: two pictures that
//! differ only in comments share one id and one rendered SVG.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::text::strip_comments;

/// Default public path under which rendered SVGs are served.
pub const DEFAULT_PUBLIC_PATH: &str = "/artifacts/tikz";

pub(crate) static TIKZ_REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\begin\{tikzpicture\}.*?\\end\{tikzpicture\}").unwrap()
});

/// One distinct diagram of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramEntry {
    /// `diagram_1`, `diagram_2`, ...
    pub id: String,
    /// Public URL of the rendered SVG.
    pub url: String,
    /// Region text as first seen, comments included.
    pub latex: String,
    /// Inline `<img>` tag pointing at [`url`](Self::url).
    pub img: String,
}

/// Distinct diagrams of one document, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct DiagramSet {
    entries: Vec<DiagramEntry>,
    by_key: HashMap<String, usize>,
}

impl DiagramSet {
    /// Entry whose dedup key matches `region`.
    #[must_use]
    pub fn lookup(&self, region: &str) -> Option<&DiagramEntry> {
        self.by_key
            .get(&strip_comments(region))
            .map(|&index| &self.entries[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagramEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collect the distinct `tikzpicture` regions of `text`.
#[must_use]
pub fn extract_diagrams(text: &str, document_id: &str, public_path: &str) -> DiagramSet {
    let public_path = public_path.trim_end_matches('/');
    let mut set = DiagramSet::default();

    for region in TIKZ_REGION.find_iter(text) {
        let key = strip_comments(region.as_str());
        if set.by_key.contains_key(&key) {
            continue;
        }

        let n = set.entries.len() + 1;
        let id = format!("diagram_{n}");
        let url = format!("{public_path}/{document_id}-{id}.svg");
        let img = format!(r#"<img src="{url}" alt="TikZ diagram {n}" class="tikz-svg-image">"#);

        set.by_key.insert(key, set.entries.len());
        set.entries.push(DiagramEntry {
            id,
            url,
            latex: region.as_str().to_owned(),
            img,
        });
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PICTURE: &str = "\\begin{tikzpicture}\\draw (0,0) -- (1,1);\\end{tikzpicture}";

    #[test]
    fn test_extract_assigns_ids_and_urls() {
        let text = format!("{PICTURE}\n\\begin{{tikzpicture}}\\draw (0,0) circle (1);\\end{{tikzpicture}}");
        let set = extract_diagrams(&text, "x1Y2", DEFAULT_PUBLIC_PATH);

        let entries: Vec<_> = set.iter().map(|e| (e.id.as_str(), e.url.as_str())).collect();
        assert_eq!(
            entries,
            vec![
                ("diagram_1", "/artifacts/tikz/x1Y2-diagram_1.svg"),
                ("diagram_2", "/artifacts/tikz/x1Y2-diagram_2.svg"),
            ]
        );
    }

    #[test]
    fn test_identical_regions_modulo_comments_share_id() {
        let commented =
            "\\begin{tikzpicture}\\draw (0,0) -- (1,1);% axis\n\\end{tikzpicture}";
        let plain = "\\begin{tikzpicture}\\draw (0,0) -- (1,1);\n\\end{tikzpicture}";
        let other = "\\begin{tikzpicture}\\fill (0,0) circle (2pt);\\end{tikzpicture}";
        let text = format!("{commented}\n{plain}\n{other}");

        let set = extract_diagrams(&text, "doc", "/static/");

        assert_eq!(set.len(), 2);
        assert_eq!(set.lookup(plain).unwrap().id, "diagram_1");
        assert_eq!(set.lookup(commented).unwrap().latex, commented);
        assert_eq!(set.lookup(other).unwrap().url, "/static/doc-diagram_2.svg");
    }

    #[test]
    fn test_img_tag() {
        let set = extract_diagrams(PICTURE, "abc", DEFAULT_PUBLIC_PATH);
        assert_eq!(
            set.lookup(PICTURE).unwrap().img,
            r#"<img src="/artifacts/tikz/abc-diagram_1.svg" alt="TikZ diagram 1" class="tikz-svg-image">"#
        );
    }

    #[test]
    fn test_no_diagrams() {
        assert!(extract_diagrams("\\texte{rien}", "abc", DEFAULT_PUBLIC_PATH).is_empty());
    }
}
