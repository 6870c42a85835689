//! Delimiter tokenizer
//!
//! Scans template text for the fixed tag marker vocabulary and yields the
//! literal run before each marker together with the marker itself. Matching
//! is leftmost with the most specific alternative first, so the three- and
//! four-character markers always win over the two-character markers they
//! contain. The scan cursor is local to one tokenizer value, so concurrent
//! compiles never interfere.

use regex::Regex;

/// The alternation is ordered most-specific-first; the `regex` crate's
/// leftmost-first semantics then give tag precedence for free.
pub(crate) const TAG_PATTERN: &str = "<%%|%%>|<%=|<%-|<%_|<%#|<%|%>|-%>|_%>";

/// Tag markers recognized by the tokenizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// `<%` — script statements, no output
    Open,
    /// `<%=` — escaped expression output
    OpenEscaped,
    /// `<%-` — raw expression output
    OpenRaw,
    /// `<%#` — comment, no code emitted
    OpenComment,
    /// `<%_` — script open that strips preceding spaces and tabs
    OpenSlurp,
    /// `%>` — close of any script region
    Close,
    /// `-%>` — close that strips one following line break
    CloseTrim,
    /// `_%>` — close that strips following spaces/tabs and one line break
    CloseSlurp,
    /// `<%%` — renders a literal `<%`, never interpreted as a tag
    LiteralOpen,
    /// `%%>` — renders a literal `%>`, never interpreted as a tag
    LiteralClose,
}

impl Tag {
    /// The marker text this tag was scanned from.
    pub fn marker(self) -> &'static str {
        match self {
            Tag::Open => "<%",
            Tag::OpenEscaped => "<%=",
            Tag::OpenRaw => "<%-",
            Tag::OpenComment => "<%#",
            Tag::OpenSlurp => "<%_",
            Tag::Close => "%>",
            Tag::CloseTrim => "-%>",
            Tag::CloseSlurp => "_%>",
            Tag::LiteralOpen => "<%%",
            Tag::LiteralClose => "%%>",
        }
    }

    fn from_marker(marker: &str) -> Self {
        match marker {
            "<%" => Tag::Open,
            "<%=" => Tag::OpenEscaped,
            "<%-" => Tag::OpenRaw,
            "<%#" => Tag::OpenComment,
            "<%_" => Tag::OpenSlurp,
            "%>" => Tag::Close,
            "-%>" => Tag::CloseTrim,
            "_%>" => Tag::CloseSlurp,
            "<%%" => Tag::LiteralOpen,
            "%%>" => Tag::LiteralClose,
            other => unreachable!("tag pattern produced unknown marker {other:?}"),
        }
    }

    /// Whether this marker opens a script region.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            Tag::Open | Tag::OpenEscaped | Tag::OpenRaw | Tag::OpenComment | Tag::OpenSlurp
        )
    }

    /// Whether this marker closes a script region.
    pub fn is_close(self) -> bool {
        matches!(self, Tag::Close | Tag::CloseTrim | Tag::CloseSlurp)
    }
}

/// A scanned tag marker with its byte offset in the template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub tag: Tag,
    pub offset: usize,
}

/// A literal run and the marker that terminated it
///
/// The final piece of a template has no token; its text runs to the end of
/// the input.
#[derive(Debug, Clone, Copy)]
pub struct Piece<'a> {
    pub text: &'a str,
    pub token: Option<Token>,
}

/// Resumable scanner over one template body
pub struct Tokenizer<'a> {
    src: &'a str,
    pattern: &'a Regex,
    cursor: usize,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str, pattern: &'a Regex) -> Self {
        Self {
            src,
            pattern,
            cursor: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Piece<'a>;

    fn next(&mut self) -> Option<Piece<'a>> {
        if self.done {
            return None;
        }
        match self.pattern.find_at(self.src, self.cursor) {
            Some(found) => {
                let piece = Piece {
                    text: &self.src[self.cursor..found.start()],
                    token: Some(Token {
                        tag: Tag::from_marker(found.as_str()),
                        offset: found.start(),
                    }),
                };
                self.cursor = found.end();
                Some(piece)
            }
            None => {
                self.done = true;
                Some(Piece {
                    text: &self.src[self.cursor..],
                    token: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> Regex {
        Regex::new(TAG_PATTERN).unwrap()
    }

    fn scan(src: &str) -> Vec<(String, Option<Tag>)> {
        let pattern = pattern();
        Tokenizer::new(src, &pattern)
            .map(|piece| (piece.text.to_string(), piece.token.map(|t| t.tag)))
            .collect()
    }

    #[test]
    fn plain_text_is_one_piece() {
        assert_eq!(scan("hello"), vec![("hello".to_string(), None)]);
        assert_eq!(scan(""), vec![(String::new(), None)]);
    }

    #[test]
    fn splits_on_markers() {
        assert_eq!(
            scan("a<% b %>c"),
            vec![
                ("a".to_string(), Some(Tag::Open)),
                (" b ".to_string(), Some(Tag::Close)),
                ("c".to_string(), None),
            ]
        );
    }

    #[test]
    fn specific_markers_win_over_generic() {
        assert_eq!(scan("<%=")[0].1, Some(Tag::OpenEscaped));
        assert_eq!(scan("<%-")[0].1, Some(Tag::OpenRaw));
        assert_eq!(scan("<%_")[0].1, Some(Tag::OpenSlurp));
        assert_eq!(scan("<%#")[0].1, Some(Tag::OpenComment));
        assert_eq!(scan("x -%>")[0].1, Some(Tag::CloseTrim));
        assert_eq!(scan("x _%>")[0].1, Some(Tag::CloseSlurp));
    }

    #[test]
    fn literal_escapes_are_single_markers() {
        let pieces = scan("<%%- \"foo\" %>");
        assert_eq!(pieces[0].1, Some(Tag::LiteralOpen));
        assert_eq!(pieces[1].0, "- \"foo\" ");
        assert_eq!(pieces[1].1, Some(Tag::Close));

        assert_eq!(scan("%%>")[0].1, Some(Tag::LiteralClose));
    }

    #[test]
    fn stray_angle_brackets_stay_literal() {
        assert_eq!(scan("a < b <p>"), vec![("a < b <p>".to_string(), None)]);
    }

    #[test]
    fn offsets_are_byte_positions() {
        let pattern = pattern();
        let offsets: Vec<usize> = Tokenizer::new("ab<% x %>cd<%= y %>", &pattern)
            .filter_map(|piece| piece.token.map(|t| t.offset))
            .collect();
        assert_eq!(offsets, vec![2, 7, 11, 17]);
    }
}
