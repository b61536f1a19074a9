//! Compile-time expressions and their parser.
//!
//! Binary operators are parsed by precedence climbing over three levels:
//! comparisons bind loosest, then additive, then multiplicative. A name
//! followed by `(` is a translation-time function call; anything else a name
//! resolves through the scope chain at evaluation time.

use crate::error::{CompileError, CompileErrorKind};
use crate::location::FileLocation;
use crate::tokenizer::{TokenKind, Tokenizer};

/// A compile-time expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// An integer literal (decimal or hex), kept as raw bits.
    LitInt(u64),
    /// A float literal.
    LitFloat(f64),
    /// A char literal of up to 8 bytes, packed big-endian into a word.
    LitChar(u64),
    /// A string literal, interned into data memory when evaluated.
    LitStr(String),
    /// A reference to a binding, resolved at evaluation time.
    Binding(String),
    /// A binary operation.
    BinaryOp(Box<BinaryOp>),
    /// A call to a translation-time function.
    Funcall(Box<Funcall>),
}

/// A binary operation node.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOp {
    /// The operator.
    pub kind: BinaryOpKind,
    /// Left operand.
    pub left: Expr,
    /// Right operand.
    pub right: Expr,
}

/// The binary operators of the expression sublanguage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpKind {
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
    /// `==`
    Equals,
}

/// The tightest binding level of [`BinaryOpKind::precedence`].
pub const MAX_PRECEDENCE: usize = 2;

impl BinaryOpKind {
    /// Binding strength; comparisons bind loosest.
    pub const fn precedence(self) -> usize {
        match self {
            Self::Equals | Self::Gt | Self::Lt => 0,
            Self::Plus | Self::Minus => 1,
            Self::Mult | Self::Div | Self::Mod => 2,
        }
    }

    const fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Plus => Some(Self::Plus),
            TokenKind::Minus => Some(Self::Minus),
            TokenKind::Mult => Some(Self::Mult),
            TokenKind::Div => Some(Self::Div),
            TokenKind::Mod => Some(Self::Mod),
            TokenKind::Gt => Some(Self::Gt),
            TokenKind::Lt => Some(Self::Lt),
            TokenKind::EqEq => Some(Self::Equals),
            _ => None,
        }
    }
}

/// A call to a translation-time function such as `len` or `byte_array`.
#[derive(Debug, Clone, PartialEq)]
pub struct Funcall {
    /// The function name.
    pub name: String,
    /// Argument expressions, in source order.
    pub args: Vec<Expr>,
}

/// Parse a complete expression out of `text`, requiring it to be fully
/// consumed.
pub fn parse_expr_from_text(
    text: &str,
    location: &FileLocation,
) -> Result<Expr, CompileError> {
    let mut tokenizer = Tokenizer::new(text);
    let expr = parse_expr(&mut tokenizer, location)?;
    tokenizer.expect_empty(location)?;
    Ok(expr)
}

/// Parse an expression from a token stream.
pub fn parse_expr(
    tokenizer: &mut Tokenizer,
    location: &FileLocation,
) -> Result<Expr, CompileError> {
    parse_binary_op(tokenizer, location, 0)
}

fn parse_binary_op(
    tokenizer: &mut Tokenizer,
    location: &FileLocation,
    precedence: usize,
) -> Result<Expr, CompileError> {
    if precedence > MAX_PRECEDENCE {
        return parse_primary(tokenizer, location);
    }

    let mut left = parse_binary_op(tokenizer, location, precedence + 1)?;

    while let Some(token) = tokenizer.peek(location)? {
        let Some(kind) = BinaryOpKind::from_token(token.kind) else {
            break;
        };
        if kind.precedence() != precedence {
            break;
        }
        tokenizer.next(location)?;

        let right = parse_binary_op(tokenizer, location, precedence + 1)?;
        left = Expr::BinaryOp(Box::new(BinaryOp { kind, left, right }));
    }

    Ok(left)
}

fn parse_primary(
    tokenizer: &mut Tokenizer,
    location: &FileLocation,
) -> Result<Expr, CompileError> {
    let Some(token) = tokenizer.peek(location)? else {
        return Err(CompileError::new(
            location.clone(),
            CompileErrorKind::EmptyExpression,
        ));
    };

    match token.kind {
        TokenKind::Str => {
            let token = tokenizer.expect(TokenKind::Str, location)?;
            Ok(Expr::LitStr(token.text))
        }

        TokenKind::Char => {
            let token = tokenizer.expect(TokenKind::Char, location)?;
            let bytes = token.text.as_bytes();
            if bytes.len() > 8 {
                return Err(CompileError::new(
                    location.clone(),
                    CompileErrorKind::CharLiteralTooLong,
                ));
            }
            let value = bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            Ok(Expr::LitChar(value))
        }

        TokenKind::Name => {
            let token = tokenizer.expect(TokenKind::Name, location)?;
            match tokenizer.peek(location)? {
                Some(next) if next.kind == TokenKind::OpenParen => {
                    let args = parse_funcall_args(tokenizer, location)?;
                    Ok(Expr::Funcall(Box::new(Funcall {
                        name: token.text,
                        args,
                    })))
                }
                _ => Ok(Expr::Binding(token.text)),
            }
        }

        TokenKind::Number => parse_number(tokenizer, location),

        TokenKind::Minus => {
            tokenizer.next(location)?;
            match parse_number(tokenizer, location)? {
                Expr::LitInt(value) => Ok(Expr::LitInt(value.wrapping_neg())),
                Expr::LitFloat(value) => Ok(Expr::LitFloat(-value)),
                _ => Err(CompileError::new(
                    location.clone(),
                    CompileErrorKind::ExpectedPrimary(TokenKind::Minus),
                )),
            }
        }

        TokenKind::OpenParen => {
            tokenizer.next(location)?;
            let expr = parse_expr(tokenizer, location)?;
            tokenizer.expect(TokenKind::ClosingParen, location)?;
            Ok(expr)
        }

        kind => Err(CompileError::new(
            location.clone(),
            CompileErrorKind::ExpectedPrimary(kind),
        )),
    }
}

/// Parse a `name(arg, ...)` argument list, starting at the open paren.
pub fn parse_funcall_args(
    tokenizer: &mut Tokenizer,
    location: &FileLocation,
) -> Result<Vec<Expr>, CompileError> {
    tokenizer.expect(TokenKind::OpenParen, location)?;

    let mut args = Vec::new();
    if let Some(token) = tokenizer.peek(location)? {
        if token.kind == TokenKind::ClosingParen {
            tokenizer.next(location)?;
            return Ok(args);
        }
    }

    loop {
        args.push(parse_expr(tokenizer, location)?);
        match tokenizer.next(location)? {
            Some(token) if token.kind == TokenKind::Comma => continue,
            Some(token) if token.kind == TokenKind::ClosingParen => return Ok(args),
            Some(token) => {
                return Err(CompileError::new(
                    location.clone(),
                    CompileErrorKind::UnexpectedToken {
                        expected: TokenKind::ClosingParen,
                        found: token.kind,
                    },
                ))
            }
            None => {
                return Err(CompileError::new(
                    location.clone(),
                    CompileErrorKind::MissingToken(TokenKind::ClosingParen),
                ))
            }
        }
    }
}

fn parse_number(
    tokenizer: &mut Tokenizer,
    location: &FileLocation,
) -> Result<Expr, CompileError> {
    let token = tokenizer.expect(TokenKind::Number, location)?;
    let text = token.text;

    if let Some(digits) = text.strip_prefix("0x") {
        return u64::from_str_radix(digits, 16)
            .map(Expr::LitInt)
            .map_err(|_| {
                CompileError::new(location.clone(), CompileErrorKind::BadHexLiteral(text))
            });
    }

    if let Ok(value) = text.parse::<u64>() {
        return Ok(Expr::LitInt(value));
    }
    text.parse::<f64>().map(Expr::LitFloat).map_err(|_| {
        CompileError::new(location.clone(), CompileErrorKind::BadNumberLiteral(text))
    })
}
