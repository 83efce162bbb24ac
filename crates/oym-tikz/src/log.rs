//! pdflatex log diagnostics.

use std::fs;
use std::path::Path;

const FATAL_SENTINEL: &str = "Fatal error occurred, no output PDF file produced!";

/// Best one-line explanation of a failed pdflatex run from its log.
///
/// Prefers the first line starting with `!`, then the fatal-error sentinel.
#[must_use]
pub fn extract_tex_error(log_path: &Path) -> String {
    match fs::read_to_string(log_path) {
        Ok(log) => tex_error_from_log(&log, log_path),
        Err(e) => format!("Cannot read log file: {e}"),
    }
}

fn tex_error_from_log(log: &str, log_path: &Path) -> String {
    if let Some(line) = log.lines().find(|line| line.starts_with('!')) {
        return line.to_owned();
    }
    if log.contains(FATAL_SENTINEL) {
        return format!(
            "Fatal error during compilation. Check the log file: {}",
            log_path.display()
        );
    }
    "Unknown compilation error. Check log file.".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_bang_line() {
        let log = "This is pdfTeX\n./tikz-figure.tex:5: ignored\n! Undefined control sequence.\nl.5 \\foo\n! Emergency stop.\n";
        assert_eq!(
            tex_error_from_log(log, Path::new("x.log")),
            "! Undefined control sequence."
        );
    }

    #[test]
    fn test_fatal_sentinel() {
        let log = "...\nFatal error occurred, no output PDF file produced!\n";
        assert_eq!(
            tex_error_from_log(log, Path::new("/tmp/x.log")),
            "Fatal error during compilation. Check the log file: /tmp/x.log"
        );
    }

    #[test]
    fn test_unknown_error() {
        assert_eq!(
            tex_error_from_log("all good?", Path::new("x.log")),
            "Unknown compilation error. Check log file."
        );
    }

    #[test]
    fn test_missing_log() {
        let message = extract_tex_error(Path::new("/nonexistent/tikz-figure.log"));
        assert!(message.starts_with("Cannot read log file: "));
    }

    #[test]
    fn test_extract_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("tikz-figure.log");
        fs::write(&path, "! LaTeX Error: File `foo.sty' not found.\n").unwrap();
        assert_eq!(
            extract_tex_error(&path),
            "! LaTeX Error: File `foo.sty' not found."
        );
    }
}
