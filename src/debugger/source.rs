use std::fs;
use std::path::Path;

use anyhow::Result;

use crate::debugger::error::DebuggerError;

/// Context lines printed on each side of a stop location
pub const DEFAULT_CONTEXT: u64 = 2;

/// Render a window of source lines with a `>` cursor on the current one.
pub fn format_source_context(content: &str, line: u64, context: u64) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let current = line.max(1);
    let start = current.saturating_sub(context).max(1);
    let end = (current + context).min(lines.len() as u64);
    let mut out = String::new();
    for number in start..=end {
        let cursor = if number == current { '>' } else { ' ' };
        out.push_str(&format!("{} {:4} {}\n", cursor, number, lines[(number - 1) as usize]));
    }
    out
}

/// Print the source window around `line` of the given file.
pub fn print_source(path: &Path, line: u64, context: u64) -> Result<()> {
    let content = fs::read_to_string(path)
        .map_err(|_| DebuggerError::SourceUnavailable(path.display().to_string()))?;
    print!("{}", format_source_context(&content, line, context));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str = "one\ntwo\nthree\nfour\nfive\nsix\n";

    #[test]
    fn test_cursor_marks_current_line() {
        let out = format_source_context(CONTENT, 3, 1);
        assert_eq!(out, "     2 two\n>    3 three\n     4 four\n");
    }

    #[test]
    fn test_window_clamps_at_start() {
        let out = format_source_context(CONTENT, 1, 2);
        assert_eq!(out, ">    1 one\n     2 two\n     3 three\n");
    }

    #[test]
    fn test_window_clamps_at_end() {
        let out = format_source_context(CONTENT, 6, 2);
        assert_eq!(out, "     4 four\n     5 five\n>    6 six\n");
    }

    #[test]
    fn test_default_context_width() {
        let out = format_source_context(CONTENT, 3, DEFAULT_CONTEXT);
        assert_eq!(out.lines().count(), 5);
    }
}
