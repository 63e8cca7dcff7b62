use crate::errors::{ExprError, ExprErrorKind};

use super::lexer::{tokenize, Token, TokenKind};
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
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
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident {
        name: String,
        pos: usize,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        pos: usize,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        pos: usize,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
        pos: usize,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        pos: usize,
    },
    Member {
        object: Box<Expr>,
        field: String,
        pos: usize,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        pos: usize,
    },
}

pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, index: 0 };
    let expr = parser.ternary()?;
    let trailing = parser.peek().clone();
    if trailing.kind != TokenKind::Eof {
        return Err(parse_err(trailing.pos, "unexpected trailing input"));
    }
    Ok(expr)
}

fn parse_err(pos: usize, detail: impl Into<String>) -> ExprError {
    ExprError::new(pos, ExprErrorKind::Parse, detail)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.index]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.index].clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ExprError> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(parse_err(self.peek().pos, format!("expected {what}")))
        }
    }

    // ternary := or ('?' ternary ':' ternary)?
    fn ternary(&mut self) -> Result<Expr, ExprError> {
        let cond = self.or()?;
        if self.peek().kind == TokenKind::Question {
            let pos = self.advance().pos;
            let then = self.ternary()?;
            self.expect(&TokenKind::Colon, "':' in conditional")?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
                pos,
            });
        }
        Ok(cond)
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.and()?;
        while self.peek().kind == TokenKind::OrOr {
            let pos = self.advance().pos;
            let rhs = self.and()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.equality()?;
        while self.peek().kind == TokenKind::AndAnd {
            let pos = self.advance().pos;
            let rhs = self.equality()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.relational()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => break,
            };
            let pos = self.advance().pos;
            let rhs = self.relational()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            let pos = self.advance().pos;
            let rhs = self.additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let pos = self.advance().pos;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            let pos = self.advance().pos;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek().kind {
            TokenKind::Not => {
                let pos = self.advance().pos;
                let operand = self.unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                    pos,
                })
            }
            TokenKind::Minus => {
                let pos = self.advance().pos;
                let operand = self.unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                    pos,
                })
            }
            _ => self.postfix(),
        }
    }

    // postfix := primary ('[' expr ']' | '.' ident)*
    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek().kind {
                TokenKind::LBracket => {
                    let pos = self.advance().pos;
                    let index = self.ternary()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        pos,
                    };
                }
                TokenKind::Dot => {
                    let pos = self.advance().pos;
                    let token = self.advance();
                    let field = match token.kind {
                        TokenKind::Ident(name) => name,
                        _ => return Err(parse_err(token.pos, "expected field name after '.'")),
                    };
                    expr = Expr::Member {
                        object: Box::new(expr),
                        field,
                        pos,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            TokenKind::Ident(name) => {
                if name == "true" {
                    Ok(Expr::Literal(Value::Bool(true)))
                } else if name == "false" {
                    Ok(Expr::Literal(Value::Bool(false)))
                } else if name == "null" {
                    Ok(Expr::Literal(Value::Null))
                } else if self.eat(&TokenKind::LParen) {
                    let mut args = Vec::new();
                    if self.peek().kind != TokenKind::RParen {
                        loop {
                            args.push(self.ternary()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "')' after call arguments")?;
                    Ok(Expr::Call {
                        name,
                        args,
                        pos: token.pos,
                    })
                } else {
                    Ok(Expr::Ident {
                        name,
                        pos: token.pos,
                    })
                }
            }
            TokenKind::LParen => {
                let inner = self.ternary()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Eof => Err(parse_err(token.pos, "unexpected end of expression")),
            other => Err(parse_err(token.pos, format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_mul_over_add() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => match *rhs {
                Expr::Binary { op: BinaryOp::Mul, .. } => {}
                other => panic!("expected mul on rhs, got {other:?}"),
            },
            other => panic!("expected add at root, got {other:?}"),
        }
    }

    #[test]
    fn test_ternary_is_lowest() {
        let expr = parse("a == 1 ? 'y' : 'n'").unwrap();
        assert!(matches!(expr, Expr::Ternary { .. }));
    }

    #[test]
    fn test_call_with_args() {
        let expr = parse("contains(body(), 'admin')").unwrap();
        match expr {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "contains");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_index_and_member_chain() {
        let expr = parse("csrf['X-CSRF']").unwrap();
        assert!(matches!(expr, Expr::Index { .. }));
        let expr = parse("response.status_code").unwrap();
        assert!(matches!(expr, Expr::Member { .. }));
    }

    #[test]
    fn test_keyword_literals() {
        assert_eq!(parse("true").unwrap(), Expr::Literal(Value::Bool(true)));
        assert_eq!(parse("null").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn test_trailing_input_rejected() {
        let err = parse("1 2").unwrap_err();
        assert_eq!(err.kind, ExprErrorKind::Parse);
    }

    #[test]
    fn test_unbalanced_paren_rejected() {
        assert!(parse("(1 + 2").is_err());
    }

    #[test]
    fn test_empty_expression_rejected() {
        let err = parse("").unwrap_err();
        assert_eq!(err.kind, ExprErrorKind::Parse);
    }
}
