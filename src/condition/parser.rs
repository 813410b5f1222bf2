//! Recursive-descent parser producing [`Expr`] trees.
//!
//! Precedence, loosest first: `?:`, `||`, `&&`, relations and `in`, `+ -`, `* / %`,
//! unary `! -`, then member access, indexing and calls.

use super::ast::{BinaryOp, Expr, Literal, UnaryOp};
use super::error::ConditionError;
use super::lexer::{tokenize, Spanned, Token};

/// Deepest nesting of parentheses, unary operators and ternaries accepted.
pub const MAX_NESTING: usize = 64;

pub fn parse(source: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ConditionError::syntax(0, "empty expression"));
    }

    let mut parser = Parser {
        tokens,
        position: 0,
        depth: 0,
        end: source.len(),
    };
    let expr = parser.expression()?;
    match parser.peek() {
        Some(spanned) => Err(ConditionError::syntax(
            spanned.offset,
            format!("unexpected token '{}'", spanned.token),
        )),
        None => Ok(expr),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.position)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|spanned| &spanned.token)
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |spanned| spanned.offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|spanned| spanned.token.clone());
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek_token() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        if self.eat(&expected) {
            return Ok(());
        }
        let found = match self.peek_token() {
            Some(token) => format!("'{token}'"),
            None => "end of input".to_string(),
        };
        Err(ConditionError::syntax(
            self.offset(),
            format!("expected '{expected}', found {found}"),
        ))
    }

    fn enter(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ConditionError::syntax(
                self.offset(),
                format!("expression nests deeper than {MAX_NESTING} levels"),
            ));
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, ConditionError> {
        self.enter()?;
        let expr = self.conditional();
        self.depth -= 1;
        expr
    }

    fn conditional(&mut self) -> Result<Expr, ConditionError> {
        let condition = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.expression()?;
        self.expect(Token::Colon)?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            let right = self.and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.relation()?;
        while self.eat(&Token::AndAnd) {
            let right = self.relation()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn relation(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::In) => BinaryOp::In,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.additive()?;
            left = binary(op, left, right);
        }
    }

    fn additive(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        let op = match self.peek_token() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Negate,
            _ => return self.member(),
        };
        self.position += 1;
        self.enter()?;
        let operand = self.unary();
        self.depth -= 1;
        let operand = operand?;

        // fold negative numeric literals
        if op == UnaryOp::Negate {
            match operand {
                Expr::Literal(Literal::Int(value)) => return Ok(Expr::Literal(Literal::Int(-value))),
                Expr::Literal(Literal::Double(value)) => {
                    return Ok(Expr::Literal(Literal::Double(-value)))
                }
                _ => {}
            }
        }
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn member(&mut self) -> Result<Expr, ConditionError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let field = self.identifier()?;
                if self.eat(&Token::LParen) {
                    let args = self.arguments(Token::RParen)?;
                    expr = Expr::Call {
                        function: field,
                        target: Some(Box::new(expr)),
                        args,
                    };
                } else {
                    expr = Expr::Select {
                        operand: Box::new(expr),
                        field,
                    };
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.expression()?;
                self.expect(Token::RBracket)?;
                expr = Expr::Index {
                    operand: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn identifier(&mut self) -> Result<String, ConditionError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            Some(other) => Err(ConditionError::syntax(
                offset,
                format!("expected field name, found '{other}'"),
            )),
            None => Err(ConditionError::syntax(offset, "expected field name, found end of input")),
        }
    }

    fn arguments(&mut self, close: Token) -> Result<Vec<Expr>, ConditionError> {
        let mut args = Vec::new();
        if self.eat(&close) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&close) {
                return Ok(args);
            }
            self.expect(Token::Comma)?;
        }
    }

    fn primary(&mut self) -> Result<Expr, ConditionError> {
        let offset = self.offset();
        let Some(token) = self.advance() else {
            return Err(ConditionError::syntax(offset, "unexpected end of input"));
        };

        match token {
            Token::Int(value) => Ok(Expr::Literal(Literal::Int(value))),
            Token::Double(value) => Ok(Expr::Literal(Literal::Double(value))),
            Token::Str(value) => Ok(Expr::Literal(Literal::String(value))),
            Token::True => Ok(Expr::Literal(Literal::Bool(true))),
            Token::False => Ok(Expr::Literal(Literal::Bool(false))),
            Token::Null => Ok(Expr::Literal(Literal::Null)),
            Token::Ident(name) => {
                if !self.eat(&Token::LParen) {
                    return Ok(Expr::Ident(name));
                }
                let mut args = self.arguments(Token::RParen)?;
                if name != "has" {
                    return Ok(Expr::Call {
                        function: name,
                        target: None,
                        args,
                    });
                }
                match (args.pop(), args.is_empty()) {
                    (Some(Expr::Select { operand, field }), true) => Ok(Expr::Has { operand, field }),
                    _ => Err(ConditionError::syntax(
                        offset,
                        "has() takes a single field selection such as has(input.field)",
                    )),
                }
            }
            Token::LParen => {
                let expr = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => Ok(Expr::List(self.arguments(Token::RBracket)?)),
            Token::LBrace => self.map_literal(),
            other => Err(ConditionError::syntax(
                offset,
                format!("unexpected token '{other}'"),
            )),
        }
    }

    fn map_literal(&mut self) -> Result<Expr, ConditionError> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Map(entries));
        }
        loop {
            let key = self.expression()?;
            self.expect(Token::Colon)?;
            let value = self.expression()?;
            entries.push((key, value));
            if self.eat(&Token::RBrace) {
                return Ok(Expr::Map(entries));
            }
            self.expect(Token::Comma)?;
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.to_string())
    }

    fn select(operand: Expr, field: &str) -> Expr {
        Expr::Select {
            operand: Box::new(operand),
            field: field.to_string(),
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("a || b && c").unwrap();
        assert_eq!(
            expr,
            binary(BinaryOp::Or, ident("a"), binary(BinaryOp::And, ident("b"), ident("c")))
        );
    }

    #[test]
    fn parses_member_chains_and_calls() {
        let expr = parse("input.items[0].name.startsWith('a')").unwrap();
        let Expr::Call { function, target, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(function, "startsWith");
        assert_eq!(args, vec![Expr::Literal(Literal::String("a".into()))]);
        assert_eq!(target.unwrap().path().as_deref(), Some("input.items[0].name"));
    }

    #[test]
    fn parses_has_macro_and_ternary() {
        let expr = parse("has(input.user) ? 1 : -2").unwrap();
        assert_eq!(
            expr,
            Expr::Conditional {
                condition: Box::new(Expr::Has {
                    operand: Box::new(ident("input")),
                    field: "user".into(),
                }),
                then: Box::new(Expr::Literal(Literal::Int(1))),
                otherwise: Box::new(Expr::Literal(Literal::Int(-2))),
            }
        );
        assert!(parse("has(input)").is_err());
    }

    #[test]
    fn parses_collection_literals() {
        let expr = parse("input.tier in ['gold', 'silver'] && {'a': 1}.a == 1").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
        assert_eq!(parse("[]").unwrap(), Expr::List(Vec::new()));
        assert_eq!(
            parse("input.a.b").unwrap(),
            select(select(ident("input"), "a"), "b")
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            parse("input.category ==").unwrap_err(),
            ConditionError::syntax(17, "unexpected end of input")
        );
        assert!(matches!(parse("(a"), Err(ConditionError::Syntax { .. })));
        assert!(matches!(parse("a b"), Err(ConditionError::Syntax { offset: 2, .. })));
        assert!(matches!(parse("   "), Err(ConditionError::Syntax { offset: 0, .. })));
    }

    #[test]
    fn limits_nesting() {
        let deep = format!("{}1{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(matches!(parse(&deep), Err(ConditionError::Syntax { .. })));
        let fine = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert!(parse(&fine).is_ok());
    }
}
