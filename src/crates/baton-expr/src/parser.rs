//! Expression grammar and parser
//!
//! A small Pratt parser over the token stream from [`crate::lexer`]. The
//! grammar covers what workflow guards need: context references rooted at
//! `$`, member access and indexing, literals and lists, arithmetic,
//! comparisons (including `in`), boolean connectives, and function calls.
//!
//! Precedence, loosest to tightest:
//!
//! ```text
//! or  <  and  <  not  <  = != < <= > >= in  <  + -  <  * / %  <  unary -  <  postfix . []
//! ```
//!
//! Parse errors carry the byte offset of the offending token and the full
//! expression source, so spec validation can point at the exact spot.

use crate::error::{ExpressionError, Result};
use crate::lexer::{tokenize, SpannedToken, Token};

/// A parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// The context root `$`
    Context,
    /// A bare identifier; only meaningful as a call head, evaluation of a
    /// standalone identifier fails
    Ident(String),
    List(Vec<Expr>),
    Member {
        object: Box<Expr>,
        field: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
}

const BP_OR: u8 = 10;
const BP_AND: u8 = 20;
const BP_NOT: u8 = 25;
const BP_CMP: u8 = 30;
const BP_ADD: u8 = 40;
const BP_MUL: u8 = 50;
const BP_NEG: u8 = 55;

/// Parse an expression body into an [`Expr`]
pub fn parse(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        src,
        tokens,
        idx: 0,
    };
    let expr = parser.parse_expr(0)?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(parser.unexpected()),
    }
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<SpannedToken>,
    idx: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.idx)
    }

    fn bump(&mut self) -> Option<SpannedToken> {
        let tok = self.tokens.get(self.idx).cloned();
        if tok.is_some() {
            self.idx += 1;
        }
        tok
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek().map(|t| &t.token) == Some(token) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> ExpressionError {
        match self.peek() {
            Some(tok) => ExpressionError::Parse {
                found: tok.lexeme.clone(),
                pos: tok.pos,
                expression: self.src.to_string(),
            },
            None => ExpressionError::Parse {
                found: "end of expression".to_string(),
                pos: self.src.len(),
                expression: self.src.to_string(),
            },
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;

        while let Some(tok) = self.peek() {
            let Some((op, lbp)) = binary_op(&tok.token) else {
                break;
            };
            if lbp <= min_bp {
                break;
            }
            self.bump();
            let rhs = self.parse_expr(lbp)?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        let Some(tok) = self.bump() else {
            return Err(self.unexpected());
        };

        let expr = match tok.token {
            Token::Null => Expr::Null,
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Int(n) => Expr::Int(n),
            Token::Float(f) => Expr::Float(f),
            Token::Str(s) => Expr::Str(s),
            Token::Dollar => Expr::Context,
            Token::Minus => {
                let operand = self.parse_expr(BP_NEG)?;
                Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                }
            }
            Token::Not => {
                let operand = self.parse_expr(BP_NOT)?;
                Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                }
            }
            Token::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(&Token::RParen)?;
                inner
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.parse_expr(0)?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RBracket)?;
                        break;
                    }
                }
                Expr::List(items)
            }
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.parse_expr(0)?);
                            if self.eat(&Token::Comma) {
                                continue;
                            }
                            self.expect(&Token::RParen)?;
                            break;
                        }
                    }
                    Expr::Call {
                        function: name,
                        args,
                    }
                } else {
                    Expr::Ident(name)
                }
            }
            _ => {
                // Back up so the error points at this token, not past it.
                self.idx -= 1;
                return Err(self.unexpected());
            }
        };

        self.parse_postfix(expr)
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            if self.eat(&Token::Dot) {
                match self.bump() {
                    Some(SpannedToken {
                        token: Token::Ident(field),
                        ..
                    }) => {
                        expr = Expr::Member {
                            object: Box::new(expr),
                            field,
                        };
                    }
                    _ => {
                        self.idx -= 1;
                        return Err(self.unexpected());
                    }
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expr(0)?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }
}

fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    let op = match token {
        Token::Or => (BinaryOp::Or, BP_OR),
        Token::And => (BinaryOp::And, BP_AND),
        Token::Eq => (BinaryOp::Eq, BP_CMP),
        Token::Ne => (BinaryOp::Ne, BP_CMP),
        Token::Lt => (BinaryOp::Lt, BP_CMP),
        Token::Le => (BinaryOp::Le, BP_CMP),
        Token::Gt => (BinaryOp::Gt, BP_CMP),
        Token::Ge => (BinaryOp::Ge, BP_CMP),
        Token::In => (BinaryOp::In, BP_CMP),
        Token::Plus => (BinaryOp::Add, BP_ADD),
        Token::Minus => (BinaryOp::Sub, BP_ADD),
        Token::Star => (BinaryOp::Mul, BP_MUL),
        Token::Slash => (BinaryOp::Div, BP_MUL),
        Token::Percent => (BinaryOp::Rem, BP_MUL),
        _ => return None,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_context_path() {
        assert_eq!(
            parse("$.a.b").unwrap(),
            Expr::Member {
                object: Box::new(Expr::Member {
                    object: Box::new(Expr::Context),
                    field: "a".to_string(),
                }),
                field: "b".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_precedence() {
        // 1 + 2 * 3 groups the multiplication first.
        assert_eq!(
            parse("1 + 2 * 3").unwrap(),
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Int(1)),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::Int(2)),
                    right: Box::new(Expr::Int(3)),
                }),
            }
        );
    }

    #[test]
    fn test_parse_not_binds_looser_than_comparison() {
        assert_eq!(
            parse("not $.a = 1").unwrap(),
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(Expr::Binary {
                    op: BinaryOp::Eq,
                    left: Box::new(Expr::Member {
                        object: Box::new(Expr::Context),
                        field: "a".to_string(),
                    }),
                    right: Box::new(Expr::Int(1)),
                }),
            }
        );
    }

    #[test]
    fn test_parse_call_and_list() {
        assert_eq!(
            parse("len([1, 2])").unwrap(),
            Expr::Call {
                function: "len".to_string(),
                args: vec![Expr::List(vec![Expr::Int(1), Expr::Int(2)])],
            }
        );
    }

    #[test]
    fn test_parse_error_position() {
        let err = parse("1 +/ 2").unwrap_err();
        assert_eq!(
            err,
            ExpressionError::Parse {
                found: "/".to_string(),
                pos: 3,
                expression: "1 +/ 2".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_error_nested_opener() {
        // A stray block opener inside an expression body fails on '<'.
        let err = parse("<% $.foobar").unwrap_err();
        assert_eq!(
            err,
            ExpressionError::Parse {
                found: "<".to_string(),
                pos: 0,
                expression: "<% $.foobar".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_trailing_garbage() {
        let err = parse("1 2").unwrap_err();
        assert_eq!(
            err,
            ExpressionError::Parse {
                found: "2".to_string(),
                pos: 2,
                expression: "1 2".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_unexpected_end() {
        let err = parse("1 +").unwrap_err();
        assert_eq!(
            err,
            ExpressionError::Parse {
                found: "end of expression".to_string(),
                pos: 3,
                expression: "1 +".to_string(),
            }
        );
    }
}
