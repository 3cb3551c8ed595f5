//! Recursive-descent parser for expression sources.
//!
//! Precedence, lowest first: `or`, `and`, `not`, comparisons (`==`,
//! `!=`, `<`, `<=`, `>`, `>=`, `in`, `not in`), additive, multiplicative.

use tiller_core::Value;

use crate::ast::{BinaryOp, Expr};
use crate::error::ExprError;
use crate::lexer::{lex, Token, TokenKind};

/// Parse a boolean or scalar expression source.
pub fn parse_expression(source: &str) -> Result<Expr, ExprError> {
    let tokens = lex(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_or()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a `@set` assignment source of the form `path = expression`.
///
/// Returns the target field path and the right-hand side expression.
pub fn parse_assignment(source: &str) -> Result<(Vec<String>, Expr), ExprError> {
    let tokens = lex(source)?;
    let mut parser = Parser::new(tokens);

    let target = parser.parse_ident_path()?;
    match parser.next() {
        Some(token) if token.kind == TokenKind::Assign => {}
        _ => return Err(ExprError::ExpectedAssignment),
    }
    let rhs = parser.parse_or()?;
    parser.expect_end()?;
    Ok((target, rhs))
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, position: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExprError> {
        match self.next() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken {
                found: token.kind.describe(),
                offset: token.offset,
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn expect_end(&mut self) -> Result<(), ExprError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken {
                found: token.kind.describe(),
                offset: token.offset,
            }),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        // `not` doubles as half of `not in`; only treat it as negation
        // when it prefixes a term.
        if self.eat(&TokenKind::Bang) {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        if self.peek().map(|t| &t.kind) == Some(&TokenKind::Not) {
            self.position += 1;
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_additive()?;

        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Equals) => Some(BinaryOp::Equals),
            Some(TokenKind::NotEquals) => Some(BinaryOp::NotEquals),
            Some(TokenKind::LessThan) => Some(BinaryOp::LessThan),
            Some(TokenKind::LessThanOrEquals) => Some(BinaryOp::LessThanOrEquals),
            Some(TokenKind::GreaterThan) => Some(BinaryOp::GreaterThan),
            Some(TokenKind::GreaterThanOrEquals) => Some(BinaryOp::GreaterThanOrEquals),
            Some(TokenKind::In) => Some(BinaryOp::In),
            _ => None,
        };

        if let Some(op) = op {
            self.position += 1;
            let rhs = self.parse_additive()?;
            return Ok(Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }

        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Subtract,
                _ => break,
            };
            self.position += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_primary()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Star) => BinaryOp::Multiply,
                Some(TokenKind::Slash) => BinaryOp::Divide,
                _ => break,
            };
            self.position += 1;
            let rhs = self.parse_primary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let token = self.next().ok_or(ExprError::UnexpectedEnd)?;

        match token.kind {
            TokenKind::String(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::Minus => {
                // Negative numeric literal.
                match self.next() {
                    Some(Token { kind: TokenKind::Int(i), .. }) => {
                        Ok(Expr::Literal(Value::Int(-i)))
                    }
                    Some(Token { kind: TokenKind::Float(f), .. }) => {
                        Ok(Expr::Literal(Value::Float(-f)))
                    }
                    Some(token) => Err(ExprError::UnexpectedToken {
                        found: token.kind.describe(),
                        offset: token.offset,
                    }),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            TokenKind::LeftParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::RightParen)?;
                Ok(Expr::Group(Box::new(inner)))
            }
            TokenKind::LeftBracket => {
                let mut items = Vec::new();
                if !self.eat(&TokenKind::RightBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        if self.eat(&TokenKind::Comma) {
                            continue;
                        }
                        self.expect(TokenKind::RightBracket)?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            TokenKind::Ident(first) => {
                // A lone identifier followed by `(` is a function call.
                if self.peek().map(|t| &t.kind) == Some(&TokenKind::LeftParen) {
                    self.position += 1;
                    let mut args = Vec::new();
                    if !self.eat(&TokenKind::RightParen) {
                        loop {
                            args.push(self.parse_or()?);
                            if self.eat(&TokenKind::Comma) {
                                continue;
                            }
                            self.expect(TokenKind::RightParen)?;
                            break;
                        }
                    }
                    return Ok(Expr::Function { name: first, args });
                }

                let mut path = vec![first];
                while self.eat(&TokenKind::Dot) {
                    match self.next() {
                        Some(Token { kind: TokenKind::Ident(part), .. }) => path.push(part),
                        Some(token) => {
                            return Err(ExprError::UnexpectedToken {
                                found: token.kind.describe(),
                                offset: token.offset,
                            })
                        }
                        None => return Err(ExprError::UnexpectedEnd),
                    }
                }
                Ok(Expr::Ident(path))
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                offset: token.offset,
            }),
        }
    }

    fn parse_ident_path(&mut self) -> Result<Vec<String>, ExprError> {
        let mut path = Vec::new();
        match self.next() {
            Some(Token { kind: TokenKind::Ident(first), .. }) => path.push(first),
            Some(token) => {
                return Err(ExprError::UnexpectedToken {
                    found: token.kind.describe(),
                    offset: token.offset,
                })
            }
            None => return Err(ExprError::UnexpectedEnd),
        }
        while self.eat(&TokenKind::Dot) {
            match self.next() {
                Some(Token { kind: TokenKind::Ident(part), .. }) => path.push(part),
                Some(token) => {
                    return Err(ExprError::UnexpectedToken {
                        found: token.kind.describe(),
                        offset: token.offset,
                    })
                }
                None => return Err(ExprError::UnexpectedEnd),
            }
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_simple_comparison() {
        let expr = parse_expression("thing.isActive == true").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Equals,
                lhs: Box::new(Expr::ident(["thing", "isActive"])),
                rhs: Box::new(Expr::Literal(Value::Bool(true))),
            }
        );
    }

    #[test]
    fn parse_in_list() {
        let expr = parse_expression("thing.age in [10, 20]").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::In,
                lhs: Box::new(Expr::ident(["thing", "age"])),
                rhs: Box::new(Expr::Array(vec![
                    Expr::Literal(Value::Int(10)),
                    Expr::Literal(Value::Int(20)),
                ])),
            }
        );
    }

    #[test]
    fn parse_and_or_precedence() {
        // a or b and c parses as a or (b and c)
        let expr = parse_expression("a == 1 or b == 2 and c == 3").unwrap();
        match expr {
            Expr::Or(_, rhs) => assert!(matches!(*rhs, Expr::And(_, _))),
            other => panic!("expected Or at the root, got {:?}", other),
        }
    }

    #[test]
    fn parse_groups_survive() {
        let expr = parse_expression("(a == 1 or b == 2) and c == 3").unwrap();
        match expr {
            Expr::And(lhs, _) => assert!(matches!(*lhs, Expr::Group(_))),
            other => panic!("expected And at the root, got {:?}", other),
        }
    }

    #[test]
    fn parse_function_call() {
        let expr = parse_expression("sum(order.items.price) > 100").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::GreaterThan, lhs, .. } => match *lhs {
                Expr::Function { ref name, ref args } => {
                    assert_eq!(name, "sum");
                    assert_eq!(args.len(), 1);
                }
                other => panic!("expected function, got {:?}", other),
            },
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn parse_assignment_source() {
        let (target, rhs) = parse_assignment("post.ownerId = ctx.identity.id").unwrap();
        assert_eq!(target, vec!["post".to_string(), "ownerId".to_string()]);
        assert_eq!(rhs, Expr::ident(["ctx", "identity", "id"]));
    }

    #[test]
    fn parse_assignment_rejects_bare_expression() {
        assert_eq!(
            parse_assignment("post.ownerId == 1"),
            Err(ExprError::ExpectedAssignment)
        );
    }

    #[test]
    fn parse_arithmetic_precedence() {
        let expr = parse_expression("a + b * c").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(
                    *rhs,
                    Expr::Binary { op: BinaryOp::Multiply, .. }
                ));
            }
            other => panic!("expected Add at the root, got {:?}", other),
        }
    }

    #[test]
    fn parse_not_in() {
        let expr = parse_expression("not thing.age in [1]").unwrap();
        assert!(matches!(expr, Expr::Not(_)));
    }

    #[test]
    fn parse_trailing_garbage_rejected() {
        assert!(parse_expression("a == 1 b").is_err());
    }
}
