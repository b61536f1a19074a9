//! Statements and the block parser.
//!
//! A block is a flat run of statements ended by the end of input or by one of
//! the block-stop directives (`%end`, `%else`, `%elif`), which the enclosing
//! construct consumes. Directives that open blocks recurse back into
//! [`parse_block`].

use bm_asm::{inst_by_name, Opcode};

use crate::error::{CompileError, CompileErrorKind};
use crate::expr::{parse_expr, parse_expr_from_text, parse_funcall_args, Expr};
use crate::linizer::{Line, LineValue, Linizer};
use crate::location::FileLocation;
use crate::tokenizer::{TokenKind, Tokenizer};

/// A run of statements.
pub type Block = Vec<Statement>;

/// One statement with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// What the statement is.
    pub kind: StatementKind,
    /// Where it is.
    pub location: FileLocation,
}

/// The statement forms of the language.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// Append an instruction to the program.
    EmitInst {
        /// The opcode to emit.
        opcode: Opcode,
        /// Operand expression, present iff the opcode takes an operand.
        operand: Option<Expr>,
    },
    /// Define a label at the current program position.
    Label {
        /// The label name.
        name: String,
    },
    /// `%const name = expr`
    Const {
        /// The binding name.
        name: String,
        /// The defining expression.
        value: Expr,
    },
    /// `%native name`
    Native {
        /// External native name.
        name: String,
    },
    /// `%include "path"`
    Include {
        /// The path as written in the source.
        path: String,
    },
    /// `%assert expr`
    Assert {
        /// Condition that must be nonzero after translation.
        condition: Expr,
    },
    /// `%error "message"`
    Error {
        /// The message to fail the build with.
        message: String,
    },
    /// `%entry expr`
    Entry {
        /// Expression naming the entry label.
        value: Expr,
    },
    /// A nested bare block.
    Block(Block),
    /// `%if expr ... [%elif expr ...] [%else ...] %end`
    If {
        /// The condition, evaluated at translation time.
        condition: Expr,
        /// Statements translated when the condition is nonzero.
        then: Block,
        /// Statements translated otherwise; an `%elif` chain nests here.
        otherwise: Option<Block>,
    },
    /// `%scope ... %end`
    Scope(Block),
    /// `%for var from expr to expr ... %end`
    For {
        /// Loop variable, bound as a const in each iteration's scope.
        var: String,
        /// First value, inclusive.
        from: Expr,
        /// Last value, inclusive.
        to: Expr,
        /// The statements to repeat.
        body: Block,
    },
    /// `%macro name(args) ... %end`
    Macrodef {
        /// Macro name.
        name: String,
        /// Formal parameter names.
        args: Vec<String>,
        /// The statement template.
        body: Block,
    },
    /// `%name(args)` where `name` is no known directive.
    Macrocall {
        /// Macro name.
        name: String,
        /// Actual argument expressions.
        args: Vec<Expr>,
    },
}

/// Parse a whole source file into a block, rejecting leftover block-stop
/// directives.
pub fn parse_source(source: &str, file_path: &str) -> Result<Block, CompileError> {
    let mut linizer = Linizer::new(source, file_path);
    let block = parse_block(&mut linizer)?;
    if let Some(line) = linizer.next() {
        if let LineValue::Directive { name, .. } = line.value {
            return Err(CompileError::new(
                line.location,
                CompileErrorKind::StrayBlockEnd(name),
            ));
        }
    }
    Ok(block)
}

/// Parse statements until the end of input or a block-stop directive, which
/// is left for the caller to consume.
pub fn parse_block(linizer: &mut Linizer) -> Result<Block, CompileError> {
    let mut block = Block::new();

    while let Some(line) = linizer.peek() {
        let location = line.location.clone();
        match line.value {
            LineValue::Instruction { name, operand } => {
                let def = inst_by_name(&name).ok_or_else(|| {
                    CompileError::new(
                        location.clone(),
                        CompileErrorKind::UnknownInstruction(name.clone()),
                    )
                })?;

                let operand = if def.has_operand {
                    Some(parse_expr_from_text(&operand, &location)?)
                } else {
                    None
                };

                block.push(Statement {
                    kind: StatementKind::EmitInst {
                        opcode: def.opcode,
                        operand,
                    },
                    location,
                });
                linizer.next();
            }

            LineValue::Label { name } => {
                block.push(Statement {
                    kind: StatementKind::Label {
                        name: binding_name(&name, &location)?,
                    },
                    location,
                });
                linizer.next();
            }

            LineValue::Directive { ref name, .. } => {
                if is_block_stop(name) {
                    break;
                }
                parse_directive(linizer, &mut block)?;
            }
        }
    }

    Ok(block)
}

fn is_block_stop(name: &str) -> bool {
    matches!(name, "end" | "else" | "elif")
}

/// Parse the text of a label or `%const`/`%native` name into a plain binding
/// name.
fn binding_name(text: &str, location: &FileLocation) -> Result<String, CompileError> {
    match parse_expr_from_text(text, location)? {
        Expr::Binding(name) => Ok(name),
        _ => Err(CompileError::new(
            location.clone(),
            CompileErrorKind::ExpectedBindingName,
        )),
    }
}

fn parse_directive(
    linizer: &mut Linizer,
    block: &mut Block,
) -> Result<(), CompileError> {
    let Some(line) = linizer.next() else {
        return Err(CompileError::new(
            linizer.location(),
            CompileErrorKind::Bug("parse_directive called with no line pending"),
        ));
    };
    let location = line.location;
    let LineValue::Directive { name, body } = line.value else {
        return Err(CompileError::new(
            location,
            CompileErrorKind::Bug("parse_directive called on a non-directive line"),
        ));
    };

    match name.as_str() {
        "include" => {
            let path = match parse_expr_from_text(&body, &location)? {
                Expr::LitStr(path) => path,
                _ => {
                    return Err(CompileError::new(
                        location,
                        CompileErrorKind::ExpectedStringLiteral,
                    ))
                }
            };
            block.push(Statement {
                kind: StatementKind::Include { path },
                location,
            });
        }

        "const" => {
            let mut tokenizer = Tokenizer::new(&body);
            let name = match parse_expr(&mut tokenizer, &location)? {
                Expr::Binding(name) => name,
                _ => {
                    return Err(CompileError::new(
                        location,
                        CompileErrorKind::ExpectedBindingName,
                    ))
                }
            };
            tokenizer.expect(TokenKind::Eq, &location)?;
            let value = parse_expr(&mut tokenizer, &location)?;
            tokenizer.expect_empty(&location)?;
            block.push(Statement {
                kind: StatementKind::Const { name, value },
                location,
            });
        }

        "native" => {
            block.push(Statement {
                kind: StatementKind::Native {
                    name: binding_name(&body, &location)?,
                },
                location,
            });
        }

        "assert" => {
            block.push(Statement {
                kind: StatementKind::Assert {
                    condition: parse_expr_from_text(&body, &location)?,
                },
                location,
            });
        }

        "error" => {
            let mut tokenizer = Tokenizer::new(&body);
            let message = tokenizer.expect(TokenKind::Str, &location)?.text;
            tokenizer.expect_empty(&location)?;
            block.push(Statement {
                kind: StatementKind::Error { message },
                location,
            });
        }

        "entry" => {
            // `%entry name:` both sets the entry and defines the label.
            let mut body = body.trim();
            let inline_label = body.ends_with(':');
            if inline_label {
                body = body[..body.len() - 1].trim_end();
            }

            let value = parse_expr_from_text(body, &location)?;
            block.push(Statement {
                kind: StatementKind::Entry {
                    value: value.clone(),
                },
                location: location.clone(),
            });

            if inline_label {
                let Expr::Binding(name) = value else {
                    return Err(CompileError::new(
                        location,
                        CompileErrorKind::ExpectedBindingName,
                    ));
                };
                block.push(Statement {
                    kind: StatementKind::Label { name },
                    location,
                });
            }
        }

        "if" => {
            let condition = parse_expr_from_text(&body, &location)?;
            block.push(parse_if_else_body(linizer, condition, location)?);
        }

        "scope" => {
            let body = parse_block(linizer)?;
            expect_end(linizer, "scope", &location)?;
            block.push(Statement {
                kind: StatementKind::Scope(body),
                location,
            });
        }

        "for" => {
            let mut tokenizer = Tokenizer::new(&body);
            let var = tokenizer.expect(TokenKind::Name, &location)?.text;
            tokenizer.expect(TokenKind::From, &location)?;
            let from = parse_expr(&mut tokenizer, &location)?;
            tokenizer.expect(TokenKind::To, &location)?;
            let to = parse_expr(&mut tokenizer, &location)?;
            tokenizer.expect_empty(&location)?;

            let body = parse_block(linizer)?;
            expect_end(linizer, "for", &location)?;
            block.push(Statement {
                kind: StatementKind::For {
                    var,
                    from,
                    to,
                    body,
                },
                location,
            });
        }

        "macro" => {
            let mut tokenizer = Tokenizer::new(&body);
            let name = tokenizer.expect(TokenKind::Name, &location)?.text;
            let args = parse_fundef_args(&mut tokenizer, &location)?;
            tokenizer.expect_empty(&location)?;

            let body = parse_block(linizer)?;
            expect_end(linizer, "macro", &location)?;
            block.push(Statement {
                kind: StatementKind::Macrodef { name, args, body },
                location,
            });
        }

        _ => {
            // Not a known directive: with an argument list it is a macro
            // call, otherwise it is a typo.
            let mut tokenizer = Tokenizer::new(&body);
            match tokenizer.peek(&location)? {
                Some(token) if token.kind == TokenKind::OpenParen => {}
                _ => {
                    return Err(CompileError::new(
                        location,
                        CompileErrorKind::UnknownDirective(name),
                    ))
                }
            }
            let args = parse_funcall_args(&mut tokenizer, &location)?;
            tokenizer.expect_empty(&location)?;
            block.push(Statement {
                kind: StatementKind::Macrocall { name, args },
                location,
            });
        }
    }

    Ok(())
}

fn parse_if_else_body(
    linizer: &mut Linizer,
    condition: Expr,
    location: FileLocation,
) -> Result<Statement, CompileError> {
    let then = parse_block(linizer)?;

    let stop = linizer.next().and_then(|line| match line.value {
        LineValue::Directive { name, body } => Some((name, body, line.location)),
        _ => None,
    });
    let Some((name, body, stop_location)) = stop else {
        return Err(CompileError::new(
            linizer.location(),
            CompileErrorKind::UnterminatedIf { opened: location },
        ));
    };

    let otherwise = match name.as_str() {
        "end" => None,
        "else" => {
            let otherwise = parse_block(linizer)?;
            match linizer.next() {
                Some(Line {
                    value: LineValue::Directive { name, .. },
                    ..
                }) if name == "end" => {}
                _ => {
                    return Err(CompileError::new(
                        linizer.location(),
                        CompileErrorKind::UnterminatedElse {
                            opened: stop_location,
                        },
                    ))
                }
            }
            Some(otherwise)
        }
        "elif" => {
            let elif_condition = parse_expr_from_text(&body, &stop_location)?;
            let nested = parse_if_else_body(linizer, elif_condition, stop_location)?;
            Some(vec![nested])
        }
        _ => {
            return Err(CompileError::new(
                stop_location,
                CompileErrorKind::UnterminatedIf { opened: location },
            ))
        }
    };

    Ok(Statement {
        kind: StatementKind::If {
            condition,
            then,
            otherwise,
        },
        location,
    })
}

fn expect_end(
    linizer: &mut Linizer,
    construct: &'static str,
    opened: &FileLocation,
) -> Result<(), CompileError> {
    match linizer.next() {
        Some(Line {
            value: LineValue::Directive { name, .. },
            ..
        }) if name == "end" => Ok(()),
        _ => Err(CompileError::new(
            linizer.location(),
            CompileErrorKind::MissingBlockEnd {
                block: construct,
                opened: opened.clone(),
            },
        )),
    }
}

/// Parse a `(name, name, ...)` formal parameter list.
fn parse_fundef_args(
    tokenizer: &mut Tokenizer,
    location: &FileLocation,
) -> Result<Vec<String>, CompileError> {
    tokenizer.expect(TokenKind::OpenParen, location)?;

    let mut args = Vec::new();
    if let Some(token) = tokenizer.peek(location)? {
        if token.kind == TokenKind::ClosingParen {
            tokenizer.next(location)?;
            return Ok(args);
        }
    }

    loop {
        args.push(tokenizer.expect(TokenKind::Name, location)?.text);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Block {
        parse_source(source, "test.basm").unwrap()
    }

    fn parse_err(source: &str) -> CompileError {
        parse_source(source, "test.basm").unwrap_err()
    }

    #[test]
    fn instructions_labels_and_consts() {
        let block = parse("%const N = 2\nmain:\n    push N\n    halt\n");
        assert!(matches!(&block[0].kind, StatementKind::Const { name, .. } if name == "N"));
        assert!(matches!(&block[1].kind, StatementKind::Label { name } if name == "main"));
        assert!(matches!(
            &block[2].kind,
            StatementKind::EmitInst {
                opcode: Opcode::Push,
                operand: Some(Expr::Binding(name)),
            } if name == "N"
        ));
        assert!(matches!(
            &block[3].kind,
            StatementKind::EmitInst {
                opcode: Opcode::Halt,
                operand: None,
            }
        ));
    }

    #[test]
    fn unknown_instruction_is_reported_with_its_line() {
        let err = parse_err("main:\n    teleport 4\n");
        assert_eq!(err.location.line_number, 2);
        assert!(matches!(
            err.kind,
            CompileErrorKind::UnknownInstruction(name) if name == "teleport"
        ));
    }

    #[test]
    fn if_elif_else_chain_nests_in_the_else_branch() {
        let block = parse(
            "%if A\n    push 1\n%elif B\n    push 2\n%else\n    push 3\n%end\n",
        );
        let StatementKind::If {
            then, otherwise, ..
        } = &block[0].kind
        else {
            panic!("expected %if");
        };
        assert_eq!(then.len(), 1);

        let chain = otherwise.as_ref().unwrap();
        let StatementKind::If {
            then: elif_then,
            otherwise: elif_otherwise,
            ..
        } = &chain[0].kind
        else {
            panic!("expected nested %elif");
        };
        assert_eq!(elif_then.len(), 1);
        assert_eq!(elif_otherwise.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn for_parses_its_header_and_body() {
        let block = parse("%for i from 0 to 9\n    push i\n%end\n");
        let StatementKind::For {
            var, body, ..
        } = &block[0].kind
        else {
            panic!("expected %for");
        };
        assert_eq!(var, "i");
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn macro_definition_and_call() {
        let block = parse("%macro inc(x)\n    push x\n    push 1\n    plusi\n%end\n%inc(41)\n");
        assert!(matches!(
            &block[0].kind,
            StatementKind::Macrodef { name, args, body }
                if name == "inc" && args == &["x".to_owned()] && body.len() == 3
        ));
        assert!(matches!(
            &block[1].kind,
            StatementKind::Macrocall { name, args } if name == "inc" && args.len() == 1
        ));
    }

    #[test]
    fn entry_with_colon_defines_the_label_inline() {
        let block = parse("%entry main:\n    halt\n");
        assert!(matches!(&block[0].kind, StatementKind::Entry { .. }));
        assert!(matches!(&block[1].kind, StatementKind::Label { name } if name == "main"));
    }

    #[test]
    fn unknown_directive_without_parens_is_an_error() {
        let err = parse_err("%loop\n");
        assert!(matches!(
            err.kind,
            CompileErrorKind::UnknownDirective(name) if name == "loop"
        ));
    }

    #[test]
    fn unterminated_blocks_point_back_at_their_opening() {
        let err = parse_err("%scope\n    push 1\n");
        assert!(matches!(
            err.kind,
            CompileErrorKind::MissingBlockEnd { block: "scope", ref opened } if opened.line_number == 1
        ));

        let err = parse_err("%if 1\n    push 1\n");
        assert!(matches!(err.kind, CompileErrorKind::UnterminatedIf { .. }));
    }

    #[test]
    fn stray_end_is_rejected() {
        let err = parse_err("halt\n%end\n");
        assert!(matches!(
            err.kind,
            CompileErrorKind::StrayBlockEnd(name) if name == "end"
        ));
    }

    #[test]
    fn labels_must_be_names() {
        let err = parse_err("42:\n");
        assert!(matches!(err.kind, CompileErrorKind::ExpectedBindingName));
    }
}
