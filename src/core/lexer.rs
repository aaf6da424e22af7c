//! Purpose: Turn literal source text into positioned tokens.
//! Exports: `Token`, `TokenKind`, `Keyword`, `tokenize`.
//! Role: First stage of the load pipeline; all grammar errors raised here are diagnostics.
//! Invariants: No token may span more than one physical line.
//! Invariants: Newlines are only significant outside brackets.

use std::ops::Range;

use logos::{Lexer, Logos};

use crate::core::diagnostic::{Pos, SourceMap};
use crate::core::error::{Error, ErrorKind};

/// Raw token from logos, before literal cooking and keyword classification.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\f\r]+|#[^\n]*|\\\r?\n")]
enum RawToken {
    #[token("\n")]
    Newline,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("@")]
    At,
    #[token("|")]
    Pipe,
    #[token("&")]
    Amp,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,

    #[regex(r"0[xX][0-9a-fA-F_]+|0[oO][0-7_]+|0[bB][01_]+")]
    RadixInt,

    #[regex(r"[0-9][0-9_]*")]
    Int,

    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?|\.[0-9][0-9_]*([eE][+-]?[0-9]+)?|[0-9][0-9_]*[eE][+-]?[0-9]+")]
    Float,

    #[regex(r"([0-9][0-9_]*(\.[0-9_]*)?|\.[0-9][0-9_]*)([eE][+-]?[0-9]+)?[jJ]")]
    Imaginary,

    // Opening quote with an optional prefix; the callback consumes the rest.
    #[regex(r#"([rRbBuUfF]|[rR][bB]|[bB][rR]|[rR][fF]|[fF][rR])?["']"#, scan_string)]
    Str,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

/// Consumes a string body up to and including its closing quote(s).
/// Escaped characters (including escaped newlines) never terminate the body;
/// an unescaped newline terminates a single-quoted string with an error.
fn scan_string(lex: &mut Lexer<RawToken>) -> bool {
    let Some(quote) = lex.slice().chars().last() else {
        return false;
    };
    let rest = lex.remainder();
    let triple: String = [quote, quote].iter().collect();
    let is_triple = rest.starts_with(&triple);
    let mut consumed = if is_triple { 2 } else { 0 };
    let mut run = 0usize;
    let mut chars = rest[consumed..].chars();

    while let Some(ch) = chars.next() {
        consumed += ch.len_utf8();
        if ch == '\\' {
            run = 0;
            match chars.next() {
                Some(escaped) => consumed += escaped.len_utf8(),
                None => return false,
            }
            continue;
        }
        if ch == quote {
            if !is_triple {
                lex.bump(consumed);
                return true;
            }
            run += 1;
            if run == 3 {
                lex.bump(consumed);
                return true;
            }
            continue;
        }
        run = 0;
        if ch == '\n' && !is_triple {
            return false;
        }
    }
    false
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Keyword {
    None,
    True,
    False,
    Not,
    And,
    Or,
    Is,
    In,
    If,
    Else,
    For,
    Lambda,
    Async,
    Await,
    /// Statement keywords (`def`, `class`, `import`, ...) that can never start a literal.
    Reserved,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        let keyword = match ident {
            "None" => Keyword::None,
            "True" => Keyword::True,
            "False" => Keyword::False,
            "not" => Keyword::Not,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "is" => Keyword::Is,
            "in" => Keyword::In,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "for" => Keyword::For,
            "lambda" => Keyword::Lambda,
            "async" => Keyword::Async,
            "await" => Keyword::Await,
            "def" | "class" | "return" | "import" | "from" | "pass" | "global" | "nonlocal"
            | "del" | "while" | "with" | "yield" | "assert" | "raise" | "try" | "except"
            | "finally" | "break" | "continue" | "as" | "elif" => Keyword::Reserved,
            _ => return None,
        };
        Some(keyword)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Imaginary(f64),
    Str { value: String, formatted: bool },
    Bytes(Vec<u8>),
    Ident(String),
    Keyword(Keyword),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    At,
    Pipe,
    Amp,
    Caret,
    Tilde,
    Shl,
    Shr,
    Lt,
    Gt,
    LtEq,
    GtEq,
    EqEq,
    NotEq,
    Newline,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
    pub span: Range<usize>,
}

pub fn tokenize(source: &SourceMap<'_>) -> Result<Vec<Token>, Error> {
    let text = source.text();
    let mut lexer = RawToken::lexer(text);
    let mut tokens = Vec::new();
    let mut depth = 0usize;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let slice = lexer.slice();
        let pos = source.pos(span.start);

        let raw = match result {
            Ok(raw) => raw,
            Err(()) => {
                let message = if slice.ends_with(['"', '\'']) {
                    "unterminated string literal"
                } else {
                    "invalid syntax"
                };
                return Err(source.error(ErrorKind::Grammar, pos, message));
            }
        };

        if raw != RawToken::Newline && slice.contains('\n') {
            return Err(source.error(
                ErrorKind::Grammar,
                pos,
                "token spans multiple physical lines, which is not supported",
            ));
        }

        let kind = match raw {
            RawToken::Newline => {
                if depth > 0 {
                    continue;
                }
                TokenKind::Newline
            }
            RawToken::LParen | RawToken::LBracket | RawToken::LBrace => {
                depth += 1;
                open_bracket(raw)
            }
            RawToken::RParen | RawToken::RBracket | RawToken::RBrace => {
                depth = depth.saturating_sub(1);
                close_bracket(raw)
            }
            RawToken::Int => TokenKind::Int(
                parse_decimal_int(slice)
                    .map_err(|message| source.error(ErrorKind::Grammar, pos, message))?,
            ),
            RawToken::RadixInt => TokenKind::Int(
                parse_radix_int(slice)
                    .map_err(|message| source.error(ErrorKind::Grammar, pos, message))?,
            ),
            RawToken::Float => TokenKind::Float(
                parse_float(slice)
                    .map_err(|message| source.error(ErrorKind::Grammar, pos, message))?,
            ),
            RawToken::Imaginary => TokenKind::Imaginary(
                parse_float(&slice[..slice.len() - 1])
                    .map_err(|message| source.error(ErrorKind::Grammar, pos, message))?,
            ),
            RawToken::Str => cook_string(slice)
                .map_err(|message| source.error(ErrorKind::Grammar, pos, message))?,
            RawToken::Ident => match Keyword::from_ident(slice) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Ident(slice.to_string()),
            },
            other => punctuation(other),
        };

        tokens.push(Token { kind, pos, span });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: source.end_pos(),
        span: text.len()..text.len(),
    });
    Ok(tokens)
}

fn open_bracket(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::LParen => TokenKind::LParen,
        RawToken::LBracket => TokenKind::LBracket,
        _ => TokenKind::LBrace,
    }
}

fn close_bracket(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::RParen => TokenKind::RParen,
        RawToken::RBracket => TokenKind::RBracket,
        _ => TokenKind::RBrace,
    }
}

fn punctuation(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::Comma => TokenKind::Comma,
        RawToken::Colon => TokenKind::Colon,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Assign => TokenKind::Assign,
        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Star => TokenKind::Star,
        RawToken::DoubleStar => TokenKind::DoubleStar,
        RawToken::Slash => TokenKind::Slash,
        RawToken::DoubleSlash => TokenKind::DoubleSlash,
        RawToken::Percent => TokenKind::Percent,
        RawToken::At => TokenKind::At,
        RawToken::Pipe => TokenKind::Pipe,
        RawToken::Amp => TokenKind::Amp,
        RawToken::Caret => TokenKind::Caret,
        RawToken::Tilde => TokenKind::Tilde,
        RawToken::Shl => TokenKind::Shl,
        RawToken::Shr => TokenKind::Shr,
        RawToken::Lt => TokenKind::Lt,
        RawToken::Gt => TokenKind::Gt,
        RawToken::LtEq => TokenKind::LtEq,
        RawToken::GtEq => TokenKind::GtEq,
        RawToken::EqEq => TokenKind::EqEq,
        RawToken::NotEq => TokenKind::NotEq,
        // Brackets, literals and newlines are handled by `tokenize`.
        _ => TokenKind::Eof,
    }
}

fn parse_decimal_int(slice: &str) -> Result<i64, String> {
    slice
        .replace('_', "")
        .parse::<i64>()
        .map_err(|_| "integer literal too large".to_string())
}

fn parse_radix_int(slice: &str) -> Result<i64, String> {
    let radix = match slice.as_bytes().get(1) {
        Some(b'x' | b'X') => 16,
        Some(b'o' | b'O') => 8,
        _ => 2,
    };
    let digits = slice[2..].replace('_', "");
    if digits.is_empty() {
        return Err("invalid integer literal".to_string());
    }
    i64::from_str_radix(&digits, radix).map_err(|_| "integer literal too large".to_string())
}

fn parse_float(slice: &str) -> Result<f64, String> {
    slice
        .replace('_', "")
        .parse::<f64>()
        .map_err(|_| "invalid float literal".to_string())
}

fn cook_string(slice: &str) -> Result<TokenKind, String> {
    let prefix_len = slice.find(['"', '\'']).unwrap_or(0);
    let prefix = slice[..prefix_len].to_ascii_lowercase();
    let raw = prefix.contains('r');
    let bytes = prefix.contains('b');
    let formatted = prefix.contains('f');

    let body = &slice[prefix_len..];
    let quote_len = if body.len() >= 6
        && (body.starts_with("\"\"\"") || body.starts_with("'''"))
    {
        3
    } else {
        1
    };
    let content = &body[quote_len..body.len() - quote_len];

    if bytes {
        if !content.is_ascii() {
            return Err("bytes can only contain ASCII literal characters".to_string());
        }
        let value = if raw {
            content.as_bytes().to_vec()
        } else {
            unescape_bytes(content)?
        };
        return Ok(TokenKind::Bytes(value));
    }

    let value = if raw {
        content.to_string()
    } else {
        unescape_text(content)?
    };
    Ok(TokenKind::Str { value, formatted })
}

enum Escape {
    Char(char),
    Byte(u8),
    Skip,
    Verbatim(char),
}

fn next_escape(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    allow_unicode: bool,
) -> Result<Escape, String> {
    let Some(ch) = chars.next() else {
        return Err("trailing backslash in string literal".to_string());
    };
    let escape = match ch {
        '\n' => Escape::Skip,
        '\\' => Escape::Char('\\'),
        '\'' => Escape::Char('\''),
        '"' => Escape::Char('"'),
        'a' => Escape::Char('\u{07}'),
        'b' => Escape::Char('\u{08}'),
        'f' => Escape::Char('\u{0c}'),
        'n' => Escape::Char('\n'),
        'r' => Escape::Char('\r'),
        't' => Escape::Char('\t'),
        'v' => Escape::Char('\u{0b}'),
        '0'..='7' => {
            let mut value = ch.to_digit(8).unwrap_or(0);
            for _ in 0..2 {
                match chars.peek().and_then(|next| next.to_digit(8)) {
                    Some(digit) => {
                        value = value * 8 + digit;
                        chars.next();
                    }
                    None => break,
                }
            }
            if allow_unicode {
                Escape::Char(char::from_u32(value).unwrap_or('\u{fffd}'))
            } else {
                let byte = u8::try_from(value)
                    .map_err(|_| "octal escape value out of range".to_string())?;
                Escape::Byte(byte)
            }
        }
        'x' => {
            let value = read_hex(chars, 2).ok_or_else(|| "truncated \\xXX escape".to_string())?;
            if allow_unicode {
                Escape::Char(char::from_u32(value).unwrap_or('\u{fffd}'))
            } else {
                Escape::Byte(value as u8)
            }
        }
        'u' | 'U' if allow_unicode => {
            let width = if ch == 'u' { 4 } else { 8 };
            let value = read_hex(chars, width)
                .ok_or_else(|| format!("truncated \\{ch} escape"))?;
            let decoded = char::from_u32(value)
                .ok_or_else(|| "illegal Unicode character in escape".to_string())?;
            Escape::Char(decoded)
        }
        'N' if allow_unicode => {
            return Err("named Unicode escapes are not supported".to_string());
        }
        other => Escape::Verbatim(other),
    };
    Ok(escape)
}

fn read_hex(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, width: usize) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..width {
        let digit = chars.next()?.to_digit(16)?;
        value = value * 16 + digit;
    }
    Some(value)
}

fn unescape_text(content: &str) -> Result<String, String> {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match next_escape(&mut chars, true)? {
            Escape::Char(decoded) => out.push(decoded),
            Escape::Byte(byte) => out.push(char::from(byte)),
            Escape::Skip => {}
            Escape::Verbatim(other) => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

fn unescape_bytes(content: &str) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch as u8);
            continue;
        }
        match next_escape(&mut chars, false)? {
            Escape::Char(decoded) => out.push(decoded as u8),
            Escape::Byte(byte) => out.push(byte),
            Escape::Skip => {}
            Escape::Verbatim(other) => {
                out.push(b'\\');
                out.push(other as u8);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{Keyword, TokenKind, tokenize};
    use crate::core::diagnostic::{Pos, SourceMap};
    use crate::core::error::ErrorKind;

    fn kinds(text: &str) -> Vec<TokenKind> {
        let source = SourceMap::new("<string>", text);
        tokenize(&source)
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn integer_radixes() {
        assert_eq!(
            kinds("42 0x42 0o42 0b101 1_000"),
            vec![
                TokenKind::Int(42),
                TokenKind::Int(0x42),
                TokenKind::Int(0o42),
                TokenKind::Int(5),
                TokenKind::Int(1000),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn floats_and_imaginary() {
        assert_eq!(
            kinds("0.42 .5 1e3 6.5j .42J"),
            vec![
                TokenKind::Float(0.42),
                TokenKind::Float(0.5),
                TokenKind::Float(1000.0),
                TokenKind::Imaginary(6.5),
                TokenKind::Imaginary(0.42),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_prefixes_and_escapes() {
        assert_eq!(
            kinds(r#""a\tb" r"a\tb" b"\x41\n" 'it''s'"#),
            vec![
                TokenKind::Str {
                    value: "a\tb".to_string(),
                    formatted: false
                },
                TokenKind::Str {
                    value: "a\\tb".to_string(),
                    formatted: false
                },
                TokenKind::Bytes(b"A\n".to_vec()),
                TokenKind::Str {
                    value: "it".to_string(),
                    formatted: false
                },
                TokenKind::Str {
                    value: "s".to_string(),
                    formatted: false
                },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn triple_quoted_single_line_string() {
        assert_eq!(
            kinds(r#""""say "hi" now""""#),
            vec![
                TokenKind::Str {
                    value: "say \"hi\" now".to_string(),
                    formatted: false
                },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn empty_strings() {
        assert_eq!(
            kinds(r#""" ''"#),
            vec![
                TokenKind::Str {
                    value: String::new(),
                    formatted: false
                },
                TokenKind::Str {
                    value: String::new(),
                    formatted: false
                },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_classified() {
        assert_eq!(
            kinds("None not def foo"),
            vec![
                TokenKind::Keyword(Keyword::None),
                TokenKind::Keyword(Keyword::Not),
                TokenKind::Keyword(Keyword::Reserved),
                TokenKind::Ident("foo".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_dropped() {
        assert_eq!(
            kinds("[1,\n 2]\n"),
            vec![
                TokenKind::LBracket,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Int(2),
                TokenKind::RBracket,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("42 # the answer"),
            vec![TokenKind::Int(42), TokenKind::Eof]
        );
    }

    #[test]
    fn multi_line_token_is_rejected() {
        let source = SourceMap::new("<string>", "\"\"\"one\ntwo\"\"\"");
        let err = tokenize(&source).expect_err("multi-line string");
        assert_eq!(err.kind(), ErrorKind::Grammar);
        let diagnostic = err.diagnostic().expect("diagnostic");
        assert_eq!(
            diagnostic.message,
            "token spans multiple physical lines, which is not supported"
        );
        assert_eq!((diagnostic.line, diagnostic.column), (1, 1));
    }

    #[test]
    fn unterminated_string_is_reported() {
        let source = SourceMap::new("<string>", "[\"abc");
        let err = tokenize(&source).expect_err("unterminated");
        let diagnostic = err.diagnostic().expect("diagnostic");
        assert_eq!(diagnostic.message, "unterminated string literal");
        assert_eq!(diagnostic.column, 2);
    }

    #[test]
    fn integer_overflow_is_a_grammar_error() {
        let source = SourceMap::new("<string>", "99999999999999999999");
        let err = tokenize(&source).expect_err("overflow");
        assert_eq!(err.kind(), ErrorKind::Grammar);
        assert_eq!(err.message(), Some("integer literal too large"));
    }

    #[test]
    fn unknown_character_is_invalid_syntax() {
        let source = SourceMap::new("<string>", "1 $ 2");
        let err = tokenize(&source).expect_err("bad char");
        let diagnostic = err.diagnostic().expect("diagnostic");
        assert_eq!(diagnostic.message, "invalid syntax");
        assert_eq!(diagnostic.column, 3);
    }

    #[test]
    fn token_positions_track_lines() {
        let source = SourceMap::new("<string>", "[\n  1]");
        let tokens = tokenize(&source).expect("tokenize");
        assert_eq!(tokens[1].pos, Pos::new(2, 3));
    }
}
