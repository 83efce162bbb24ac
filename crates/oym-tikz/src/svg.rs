//! SVG post-processing and the error fallback image.

use std::sync::LazyLock;

use oym_latex::verbatim::escape_html;
use regex::Regex;

/// Longest error message shown in a fallback image, in characters.
const ERROR_MESSAGE_LIMIT: usize = 200;
/// Longest source excerpt shown in a fallback image, in characters.
const ERROR_SOURCE_LIMIT: usize = 250;

static XML_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<\?xml.*?\?>\s*").unwrap());
static DOCTYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!DOCTYPE.*?>\s*").unwrap());
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->\s*").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static BETWEEN_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").unwrap());
static SVG_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<svg([^>]*)>").unwrap());

/// Shrink converter output and tag the root element with `class_name`.
///
/// Drops the XML declaration, DOCTYPE and comments, collapses whitespace and
/// removes it between tags. An empty `class_name` adds no class.
#[must_use]
pub fn optimize_svg(svg: &str, class_name: &str) -> String {
    let svg = XML_DECLARATION.replace(svg, "");
    let svg = DOCTYPE.replace(&svg, "");
    let svg = COMMENT.replace_all(&svg, "");
    let svg = WHITESPACE.replace_all(&svg, " ");
    let svg = BETWEEN_TAGS.replace_all(&svg, "><");
    let svg = svg.trim();

    if class_name.is_empty() {
        return svg.to_owned();
    }
    SVG_OPEN
        .replace(svg, |caps: &regex::Captures<'_>| {
            format!(r#"<svg{} class="{class_name}">"#, &caps[1])
        })
        .into_owned()
}

/// Placeholder image shown in place of a diagram that failed to render.
#[must_use]
pub fn error_svg(message: &str, source: &str) -> String {
    let message = escape_html(&truncate(message, ERROR_MESSAGE_LIMIT));
    let source = escape_html(&truncate(source, ERROR_SOURCE_LIMIT));

    format!(
        r##"<svg viewBox="0 0 500 200" class="tikz-error" style="border: 2px dashed #dc3545; background: #f8d7da; max-width: 100%; height: auto;">
  <g font-family="monospace" font-size="12" fill="#721c24">
    <text x="50%" y="25" text-anchor="middle" font-size="14" font-weight="bold">TikZ Conversion Error</text>
    <foreignObject x="10" y="40" width="480" height="60">
      <pre xmlns="http://www.w3.org/1999/xhtml" style="font-size: 10px; color: #721c24; white-space: pre-wrap; word-wrap: break-word;">Error: {message}</pre>
    </foreignObject>
    <text x="10" y="110" font-size="10" fill="#6c757d">Content:</text>
    <foreignObject x="10" y="120" width="480" height="70">
      <pre xmlns="http://www.w3.org/1999/xhtml" style="font-size: 9px; color: #6c757d; white-space: pre-wrap; word-wrap: break-word;">{source}</pre>
    </foreignObject>
  </g>
</svg>"##
    )
}

/// First `limit` characters of `text`, with `...` appended when cut.
fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_owned(),
    }
}
