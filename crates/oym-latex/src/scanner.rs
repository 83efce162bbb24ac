//! Brace-aware scanner for a fixed set of LaTeX commands.
//!
//! The scanner walks the source with an explicit cursor. At top level it
//! recognizes three things:
//!
//! - `%` (unescaped) starts a comment running to end of line
//! - `\` followed by a non-letter is an escape pair and is skipped whole
//! - `\` followed by letters is a control word; when the word is one of the
//!   configured names and is followed (after optional whitespace) by `{`, the
//!   argument is read by counting brace depth
//!
//! Inside an argument a backslash escapes the next character, so `\{` and
//! `\}` never change the depth. The returned argument is the raw source slice.

use std::collections::HashSet;

/// One recognized command occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMatch {
    /// Command name without the backslash.
    pub name: String,
    /// Raw argument text between the outer braces.
    pub argument: String,
    /// Byte offset of the backslash.
    pub start: usize,
    /// Byte offset just past the closing brace (or end of text).
    pub end: usize,
    /// The text ended before the braces balanced.
    pub unterminated: bool,
}

/// Scanner for a configured command vocabulary.
#[derive(Debug, Clone)]
pub struct CommandScanner {
    names: HashSet<String>,
}

impl CommandScanner {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Every top-level, non-commented occurrence in source order.
    #[must_use]
    pub fn scan(&self, text: &str) -> Vec<CommandMatch> {
        let bytes = text.as_bytes();
        let mut matches = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            match bytes[pos] {
                b'%' => pos = skip_line(bytes, pos),
                b'\\' => {
                    let word_start = pos + 1;
                    let word_end = control_word_end(bytes, word_start);
                    if word_end == word_start {
                        // Escape pair such as `\\`, `\%` or `\{`
                        pos += 2;
                        continue;
                    }

                    let word = &text[word_start..word_end];
                    if !self.names.contains(word) {
                        pos = word_end;
                        continue;
                    }

                    let brace = skip_whitespace(bytes, word_end);
                    if bytes.get(brace) != Some(&b'{') {
                        pos = word_end;
                        continue;
                    }

                    let (argument_end, end, unterminated) = read_group(bytes, brace + 1);
                    matches.push(CommandMatch {
                        name: word.to_owned(),
                        argument: text[brace + 1..argument_end].to_owned(),
                        start: pos,
                        end,
                        unterminated,
                    });
                    pos = end;
                }
                _ => pos += 1,
            }
        }

        matches
    }
}

fn control_word_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
        end += 1;
    }
    end
}

fn skip_whitespace(bytes: &[u8], start: usize) -> usize {
    let mut pos = start;
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| start + offset + 1)
}

/// Read a brace group whose opening brace precedes `start`.
///
/// Returns `(argument_end, match_end, unterminated)`.
fn read_group(bytes: &[u8], start: usize) -> (usize, usize, bool) {
    let mut depth = 1usize;
    let mut pos = start;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => {
                pos += 2;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return (pos, pos + 1, false);
                }
            }
            _ => {}
        }
        pos += 1;
    }

    (bytes.len(), bytes.len(), true)
}
