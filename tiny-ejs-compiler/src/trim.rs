//! Whitespace trimming rules for the whitespace-sensitive tag variants
//!
//! Each rule strips at most one line break, in any of its three forms
//! (CRLF, bare CR, bare LF).

fn is_inline_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Strips the trailing run of spaces and tabs from the literal run before a
/// `<%_` tag.
pub fn strip_trailing_space(run: &str) -> &str {
    run.trim_end_matches(is_inline_space)
}

/// Strips one leading line break from the literal run after a `-%>` tag.
pub fn strip_leading_break(run: &str) -> &str {
    if let Some(rest) = run.strip_prefix("\r\n") {
        rest
    } else if let Some(rest) = run.strip_prefix('\r') {
        rest
    } else if let Some(rest) = run.strip_prefix('\n') {
        rest
    } else {
        run
    }
}

/// Strips the leading run of spaces and tabs, then one line break if
/// present, from the literal run after a `_%>` tag.
pub fn strip_leading_space_and_break(run: &str) -> &str {
    strip_leading_break(run.trim_start_matches(is_inline_space))
}
