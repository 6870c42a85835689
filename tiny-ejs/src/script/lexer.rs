//! Script lexer
//!
//! Hand-written scanner producing tokens with byte offsets. Whitespace and
//! comments separate tokens but produce none, so statements may be divided
//! by newlines as well as semicolons. Regex literals are not part of the
//! language.

use tiny_ejs_compiler::EvaluationError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Keyword(&'static str),
    Number(f64),
    Str(String),
    Punct(&'static str),
}

const KEYWORDS: &[&str] = &[
    "var",
    "let",
    "const",
    "return",
    "if",
    "else",
    "while",
    "for",
    "function",
    "true",
    "false",
    "null",
    "undefined",
    "this",
];

/// Multi-character operators first so they win over their prefixes.
const PUNCTS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "=>", "+=", "-=", "++", "--", "(", ")",
    "{", "}", "[", "]", ",", ";", ".", ":", "?", "=", "+", "-", "*", "/", "%", "!", "<", ">",
];

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Tokenizes script source, pairing each token with its byte offset.
pub fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, EvaluationError> {
    let mut tokens = Vec::new();
    let mut offset = 0;

    'scan: while offset < src.len() {
        let rest = &src[offset..];
        let c = rest.chars().next().expect("offset is on a char boundary");

        if c.is_whitespace() {
            offset += c.len_utf8();
            continue;
        }
        if let Some(comment) = rest.strip_prefix("//") {
            offset += 2 + comment.find('\n').unwrap_or(comment.len());
            continue;
        }
        if let Some(comment) = rest.strip_prefix("/*") {
            match comment.find("*/") {
                Some(end) => offset += 2 + end + 2,
                None => {
                    return Err(EvaluationError::new(format!(
                        "unterminated block comment at byte {offset}"
                    )));
                }
            }
            continue;
        }
        if c == '\'' || c == '"' {
            let (text, consumed) = scan_string(rest, c, offset)?;
            tokens.push((Token::Str(text), offset));
            offset += consumed;
            continue;
        }
        if c.is_ascii_digit() {
            let consumed = scan_number(rest);
            let text = &rest[..consumed];
            let value: f64 = text
                .parse()
                .map_err(|_| EvaluationError::new(format!("invalid number {text:?} at byte {offset}")))?;
            tokens.push((Token::Number(value), offset));
            offset += consumed;
            continue;
        }
        if is_ident_start(c) {
            let consumed = rest
                .find(|c: char| !is_ident_part(c))
                .unwrap_or(rest.len());
            let word = &rest[..consumed];
            let token = match KEYWORDS.iter().copied().find(|k| *k == word) {
                Some(keyword) => Token::Keyword(keyword),
                None => Token::Ident(word.to_string()),
            };
            tokens.push((token, offset));
            offset += consumed;
            continue;
        }
        for punct in PUNCTS {
            if rest.starts_with(punct) {
                tokens.push((Token::Punct(punct), offset));
                offset += punct.len();
                continue 'scan;
            }
        }
        return Err(EvaluationError::new(format!(
            "unexpected character {c:?} at byte {offset}"
        )));
    }

    Ok(tokens)
}

fn scan_string(rest: &str, quote: char, offset: usize) -> Result<(String, usize), EvaluationError> {
    let mut text = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((at, c)) = chars.next() {
        if c == quote {
            return Ok((text, at + quote.len_utf8()));
        }
        if c == '\\' {
            let Some((_, escaped)) = chars.next() else {
                break;
            };
            match escaped {
                'n' => text.push('\n'),
                'r' => text.push('\r'),
                't' => text.push('\t'),
                '0' => text.push('\0'),
                other => text.push(other),
            }
            continue;
        }
        text.push(c);
    }
    Err(EvaluationError::new(format!(
        "unterminated string at byte {offset}"
    )))
}

fn scan_number(rest: &str) -> usize {
    let digits = |s: &str| s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let mut consumed = digits(rest);
    let after = &rest[consumed..];
    if let Some(fraction) = after.strip_prefix('.') {
        let fraction_digits = digits(fraction);
        if fraction_digits > 0 {
            consumed += 1 + fraction_digits;
        }
    }
    consumed
}
