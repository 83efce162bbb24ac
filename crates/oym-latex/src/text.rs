//! Small text transforms applied to LaTeX fragments.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// LaTeX accent sequences and their Unicode equivalents.
const ACCENTS: &[(&str, &str)] = &[
    ("\\'E", "É"),
    ("\\'e", "é"),
    ("\\'a", "á"),
    ("\\'i", "í"),
    ("\\'o", "ó"),
    ("\\'u", "ú"),
    ("\\'A", "Á"),
    ("\\'I", "Í"),
    ("\\'O", "Ó"),
    ("\\'U", "Ú"),
    ("\\`E", "È"),
    ("\\`e", "è"),
    ("\\`a", "à"),
    ("\\`i", "ì"),
    ("\\`o", "ò"),
    ("\\`u", "ù"),
    ("\\`A", "À"),
    ("\\`I", "Ì"),
    ("\\`O", "Ò"),
    ("\\`U", "Ù"),
    ("\\^E", "Ê"),
    ("\\^e", "ê"),
    ("\\^a", "â"),
    ("\\^i", "î"),
    ("\\^o", "ô"),
    ("\\^u", "û"),
    ("\\^A", "Â"),
    ("\\^I", "Î"),
    ("\\^O", "Ô"),
    ("\\^U", "Û"),
    ("\\\"E", "Ë"),
    ("\\\"e", "ë"),
    ("\\\"a", "ä"),
    ("\\\"i", "ï"),
    ("\\\"o", "ö"),
    ("\\\"u", "ü"),
    ("\\\"A", "Ä"),
    ("\\\"I", "Ï"),
    ("\\\"O", "Ö"),
    ("\\\"U", "Ü"),
    ("\\c{C}", "Ç"),
    ("\\c{c}", "ç"),
    ("\\~N", "Ñ"),
    ("\\~n", "ñ"),
];

static ALIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\begin\{(align\*)\}(.*?)\\end\{align\*\}").unwrap());
static EQUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\begin\{(equation\*?)\}(.*?)\\end\{equation\*?\}").unwrap());
static GATHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\begin\{(gather\*?)\}(.*?)\\end\{gather\*?\}").unwrap());

/// Byte offset of the first unescaped `%` in `line`.
#[must_use]
pub fn comment_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    bytes
        .iter()
        .enumerate()
        .find(|&(i, &b)| b == b'%' && (i == 0 || bytes[i - 1] != b'\\'))
        .map(|(i, _)| i)
}

/// Whether an unescaped `%` precedes byte offset `pos` on `line`.
#[must_use]
pub fn is_command_commented(line: &str, pos: usize) -> bool {
    comment_start(line).is_some_and(|start| start < pos)
}

/// Remove `%` comments from every line, then trim the result.
///
/// `\%` is a literal percent sign and is kept.
#[must_use]
pub fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| match comment_start(line) {
            Some(start) => &line[..start],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

/// Replace LaTeX accent sequences (`\'e`, `\c{c}`, ...) with Unicode letters.
#[must_use]
pub fn fold_accents(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_owned();
    }
    let mut result = text.to_owned();
    for (from, to) in ACCENTS {
        if result.contains(from) {
            result = result.replace(from, to);
        }
    }
    result
}

/// Wrap display-math environments in `$$ ... $$` so MathJax picks them up.
#[must_use]
pub fn wrap_display_math(text: &str) -> String {
    let wrap = |caps: &Captures<'_>| {
        format!(
            "$$\\begin{{{env}}}{body}\\end{{{env}}}$$",
            env = &caps[1],
            body = &caps[2]
        )
    };
    let text = ALIGN.replace_all(text, wrap);
    let text = EQUATION.replace_all(&text, wrap);
    GATHER.replace_all(&text, wrap).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_comments() {
        let text = "  a = 1 % note\n% whole line\nb = 50\\% off  \n";
        assert_eq!(strip_comments(text), "a = 1 \n\nb = 50\\% off");
    }

    #[test]
    fn test_strip_comments_no_comment() {
        assert_eq!(strip_comments("  plain  "), "plain");
    }

    #[test]
    fn test_is_command_commented() {
        let line = "text % \\titre{x}";
        assert!(is_command_commented(line, line.find("\\titre").unwrap()));
        assert!(!is_command_commented("\\titre{x} % later", 0));
        assert!(!is_command_commented("50\\% \\titre{x}", 5));
    }

    #[test]
    fn test_fold_accents() {
        assert_eq!(
            fold_accents("Th\\'eor\\`eme de Fran\\c{c}ois, \\^etre na\\\"if"),
            "Théorème de François, être naïf"
        );
        assert_eq!(fold_accents("plain"), "plain");
    }

    #[test]
    fn test_wrap_display_math() {
        let text = "Soit \\begin{align*}x&=1\\end{align*} et \\begin{equation}y=2\\end{equation}";
        assert_eq!(
            wrap_display_math(text),
            "Soit $$\\begin{align*}x&=1\\end{align*}$$ et $$\\begin{equation}y=2\\end{equation}$$"
        );
    }

    #[test]
    fn test_wrap_display_math_starred_gather() {
        assert_eq!(
            wrap_display_math("\\begin{gather*}a\\\\b\\end{gather*}"),
            "$$\\begin{gather*}a\\\\b\\end{gather*}$$"
        );
    }

    #[test]
    fn test_wrap_display_math_leaves_inline_math() {
        assert_eq!(wrap_display_math("$x^2$"), "$x^2$");
    }
}
