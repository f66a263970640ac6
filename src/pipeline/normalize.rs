//! Normalisation: deterministic cleanup of text pulled out of a PDF page.
//!
//! pdfium returns text exactly as laid out in the content stream: Windows
//! line endings, trailing spaces used for justification, zero-width joiners
//! and long runs of blank lines between columns. None of that carries
//! meaning for retrieval, and all of it wastes chunk budget.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule only has to reason
//! about `\n`. Invisible characters are removed before blank-line collapsing,
//! because a line holding only a zero-width space is a blank line.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to one page of extracted text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Replace form feeds and vertical tabs with newlines
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 4+ consecutive newlines down to 3
/// 6. Trim leading and trailing blank lines
///
/// The result is empty when the page carried no visible text.
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = replace_page_breaks(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    trim_blank_edges(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Page-break control characters ────────────────────────────────────

fn replace_page_breaks(input: &str) -> String {
    input.replace(['\u{000C}', '\u{000B}'], "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{0000}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 6: Trim blank edges ─────────────────────────────────────────────────

fn trim_blank_edges(input: &str) -> String {
    input.trim_matches('\n').to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_replace_page_breaks() {
        assert_eq!(replace_page_breaks("a\u{000C}b"), "a\nb");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("Pa\u{200B}ris\u{FEFF}"), "Paris");
    }

    #[test]
    fn test_blank_page_becomes_empty() {
        assert_eq!(clean_page_text(" \r\n\u{200B}\r\n  \n"), "");
    }

    #[test]
    fn test_clean_page_full_pipeline() {
        let raw = "\r\nTitle  \r\n\r\n\r\n\r\n\r\nThe capital of France is Paris.\u{00AD}  \r\n";
        assert_eq!(
            clean_page_text(raw),
            "Title\n\n\nThe capital of France is Paris."
        );
    }
}
