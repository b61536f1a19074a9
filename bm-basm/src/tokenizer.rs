//! Tokens for the expression sublanguage.
//!
//! The tokenizer works over a single logical line (directive bodies and
//! instruction operands); newlines never reach it. It supports single-token
//! lookahead through a peek buffer.

use std::fmt;

use crate::error::{CompileError, CompileErrorKind};
use crate::location::FileLocation;

/// Kinds of expression tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A double-quoted string literal (escapes already processed).
    Str,
    /// A single-quoted char literal (raw bytes, 1 to 8 of them).
    Char,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Mult,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `=`
    Eq,
    /// `==`
    EqEq,
    /// A decimal, hexadecimal or floating point number.
    Number,
    /// A binding or function name.
    Name,
    /// `(`
    OpenParen,
    /// `)`
    ClosingParen,
    /// `,`
    Comma,
    /// The keyword `if`.
    If,
    /// The keyword `from`.
    From,
    /// The keyword `to`.
    To,
}

impl TokenKind {
    /// Diagnostic name of the token kind.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::Char => "character",
            Self::Plus => "plus",
            Self::Minus => "minus",
            Self::Mult => "multiply",
            Self::Div => "divide",
            Self::Mod => "%",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "=",
            Self::EqEq => "==",
            Self::Number => "number",
            Self::Name => "name",
            Self::OpenParen => "open paren",
            Self::ClosingParen => "closing paren",
            Self::Comma => "comma",
            Self::If => "if",
            Self::From => "from",
            Self::To => "to",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single token with its (unescaped) text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// The token text; for string literals the escapes are already resolved.
    pub text: String,
}

/// Tokenizer with single-token lookahead.
pub struct Tokenizer<'a> {
    rest: &'a str,
    peeked: Option<Token>,
}

fn unescape(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '0' => Some('\0'),
        '\\' => Some('\\'),
        '"' => Some('"'),
        '\'' => Some('\''),
        _ => None,
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.'
}

impl<'a> Tokenizer<'a> {
    /// Tokenize `source`, which must not contain newlines.
    pub fn new(source: &'a str) -> Self {
        Self {
            rest: source,
            peeked: None,
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek(&mut self, location: &FileLocation) -> Result<Option<Token>, CompileError> {
        if self.peeked.is_none() {
            self.peeked = self.scan(location)?;
        }
        Ok(self.peeked.clone())
    }

    /// Consume and return the next token.
    pub fn next(&mut self, location: &FileLocation) -> Result<Option<Token>, CompileError> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.scan(location),
        }
    }

    /// Consume the next token, which must be of the given kind.
    pub fn expect(
        &mut self,
        kind: TokenKind,
        location: &FileLocation,
    ) -> Result<Token, CompileError> {
        match self.next(location)? {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(CompileError::new(
                location.clone(),
                CompileErrorKind::UnexpectedToken {
                    expected: kind,
                    found: token.kind,
                },
            )),
            None => Err(CompileError::new(
                location.clone(),
                CompileErrorKind::MissingToken(kind),
            )),
        }
    }

    /// Fail unless the whole input has been consumed.
    pub fn expect_empty(&mut self, location: &FileLocation) -> Result<(), CompileError> {
        match self.next(location)? {
            None => Ok(()),
            Some(token) => Err(CompileError::new(
                location.clone(),
                CompileErrorKind::TrailingToken(token.text),
            )),
        }
    }

    fn scan(&mut self, location: &FileLocation) -> Result<Option<Token>, CompileError> {
        self.rest = self.rest.trim_start();

        let mut chars = self.rest.chars();
        let Some(first) = chars.next() else {
            return Ok(None);
        };

        let simple = |kind| Some((kind, 1));
        let decided = match first {
            '(' => simple(TokenKind::OpenParen),
            ')' => simple(TokenKind::ClosingParen),
            ',' => simple(TokenKind::Comma),
            '+' => simple(TokenKind::Plus),
            '-' => simple(TokenKind::Minus),
            '*' => simple(TokenKind::Mult),
            '/' => simple(TokenKind::Div),
            '%' => simple(TokenKind::Mod),
            '>' => simple(TokenKind::Gt),
            '<' => simple(TokenKind::Lt),
            '=' => {
                if chars.next() == Some('=') {
                    Some((TokenKind::EqEq, 2))
                } else {
                    Some((TokenKind::Eq, 1))
                }
            }
            _ => None,
        };
        if let Some((kind, len)) = decided {
            let token = Token {
                kind,
                text: self.rest[..len].to_owned(),
            };
            self.rest = &self.rest[len..];
            return Ok(Some(token));
        }

        match first {
            '"' => self.scan_string(location).map(Some),
            '\'' => self.scan_char(location).map(Some),
            c if c.is_ascii_alphabetic() => {
                let end = self
                    .rest
                    .find(|c| !is_name_char(c))
                    .unwrap_or(self.rest.len());
                let text = &self.rest[..end];
                self.rest = &self.rest[end..];
                let kind = match text {
                    "if" => TokenKind::If,
                    "from" => TokenKind::From,
                    "to" => TokenKind::To,
                    _ => TokenKind::Name,
                };
                Ok(Some(Token {
                    kind,
                    text: text.to_owned(),
                }))
            }
            c if c.is_ascii_digit() => {
                let end = self
                    .rest
                    .find(|c| !is_number_char(c))
                    .unwrap_or(self.rest.len());
                let text = &self.rest[..end];
                self.rest = &self.rest[end..];
                Ok(Some(Token {
                    kind: TokenKind::Number,
                    text: text.to_owned(),
                }))
            }
            c => Err(CompileError::new(
                location.clone(),
                CompileErrorKind::UnknownToken(c),
            )),
        }
    }

    fn scan_string(&mut self, location: &FileLocation) -> Result<Token, CompileError> {
        let mut text = String::new();
        let mut chars = self.rest.char_indices().skip(1);

        while let Some((index, c)) = chars.next() {
            match c {
                '"' => {
                    self.rest = &self.rest[index + 1..];
                    return Ok(Token {
                        kind: TokenKind::Str,
                        text,
                    });
                }
                '\\' => {
                    let Some((_, escape)) = chars.next() else {
                        break;
                    };
                    text.push(unescape(escape).ok_or_else(|| {
                        CompileError::new(
                            location.clone(),
                            CompileErrorKind::UnknownEscapeSequence(escape),
                        )
                    })?);
                }
                c => text.push(c),
            }
        }

        Err(CompileError::new(
            location.clone(),
            CompileErrorKind::UnclosedStringLiteral,
        ))
    }

    fn scan_char(&mut self, location: &FileLocation) -> Result<Token, CompileError> {
        match self.rest[1..].find('\'') {
            Some(end) => {
                let text = self.rest[1..1 + end].to_owned();
                self.rest = &self.rest[end + 2..];
                Ok(Token {
                    kind: TokenKind::Char,
                    text,
                })
            }
            None => Err(CompileError::new(
                location.clone(),
                CompileErrorKind::UnclosedCharLiteral,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> FileLocation {
        FileLocation::new("test.basm", 1)
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut tokenizer = Tokenizer::new(source);
        let mut out = Vec::new();
        while let Some(token) = tokenizer.next(&loc()).unwrap() {
            out.push(token.kind);
        }
        out
    }

    #[test]
    fn operators_and_names() {
        assert_eq!(
            kinds("N + 2 * (len - 1) == 0x45 % foo / 2"),
            vec![
                TokenKind::Name,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Mult,
                TokenKind::OpenParen,
                TokenKind::Name,
                TokenKind::Minus,
                TokenKind::Number,
                TokenKind::ClosingParen,
                TokenKind::EqEq,
                TokenKind::Number,
                TokenKind::Mod,
                TokenKind::Name,
                TokenKind::Div,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn keywords_are_recognized() {
        assert_eq!(
            kinds("i from 0 to N"),
            vec![
                TokenKind::Name,
                TokenKind::From,
                TokenKind::Number,
                TokenKind::To,
                TokenKind::Name,
            ]
        );
    }

    #[test]
    fn string_escapes_are_resolved() {
        let mut tokenizer = Tokenizer::new(r#""hi\n\t\"there\"""#);
        let token = tokenizer.next(&loc()).unwrap().unwrap();
        assert_eq!(token.kind, TokenKind::Str);
        assert_eq!(token.text, "hi\n\t\"there\"");
    }

    #[test]
    fn unclosed_string_is_an_error() {
        let mut tokenizer = Tokenizer::new("\"oops");
        let err = tokenizer.next(&loc()).unwrap_err();
        assert!(matches!(
            err.kind,
            CompileErrorKind::UnclosedStringLiteral
        ));
    }

    #[test]
    fn char_literals_are_raw() {
        let mut tokenizer = Tokenizer::new("'ab'");
        let token = tokenizer.next(&loc()).unwrap().unwrap();
        assert_eq!(token.kind, TokenKind::Char);
        assert_eq!(token.text, "ab");
    }

    #[test]
    fn peek_does_not_consume() {
        let mut tokenizer = Tokenizer::new("push 42");
        assert_eq!(tokenizer.peek(&loc()).unwrap().unwrap().text, "push");
        assert_eq!(tokenizer.next(&loc()).unwrap().unwrap().text, "push");
        assert_eq!(tokenizer.next(&loc()).unwrap().unwrap().text, "42");
        assert!(tokenizer.next(&loc()).unwrap().is_none());
    }

    #[test]
    fn single_equals_is_its_own_token() {
        assert_eq!(kinds("N = 1"), vec![TokenKind::Name, TokenKind::Eq, TokenKind::Number]);
    }
}
