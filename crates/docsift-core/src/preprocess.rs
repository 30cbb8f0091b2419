//! Normalization applied to extracted text before it is stored.

/// Normalize extracted text.
///
/// - `\r\n` and lone `\r` become `\n`
/// - runs of spaces and tabs collapse to one space
/// - trailing whitespace is stripped from every line
/// - runs of blank lines collapse to a single paragraph break (`\n\n`)
/// - the result is trimmed
///
/// Paragraph breaks are kept because the chunker splits on them.
pub fn clean_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(normalized.len());
    let mut pending_break = false;
    for line in normalized.split('\n') {
        let line = collapse_inline_whitespace(line);
        let line = line.trim();
        if line.is_empty() {
            pending_break = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_break { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        pending_break = false;
    }
    out
}

fn collapse_inline_whitespace(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_run = false;
    for c in line.chars() {
        if c == ' ' || c == '\t' {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_spaces_and_tabs() {
        assert_eq!(clean_text("a  \t b\t\tc"), "a b c");
    }

    #[test]
    fn test_carriage_returns_become_newlines() {
        assert_eq!(clean_text("one\r\ntwo\rthree"), "one\ntwo\nthree");
    }

    #[test]
    fn test_blank_line_runs_become_one_break() {
        assert_eq!(
            clean_text("\n\n  first  \n\n\n\n   \nsecond\n\n"),
            "first\n\nsecond"
        );
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        assert_eq!(clean_text(" \t\r\n \n"), "");
    }

    #[test]
    fn test_leading_indent_removed() {
        assert_eq!(clean_text("    indented line"), "indented line");
    }
}
