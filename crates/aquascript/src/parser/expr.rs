//! Expression parsing: precedence climbing from `or` down to primaries.
//!
//! Precedence (lowest to highest), per spec.md §4.2:
//! `or` < `and` < equality (`== !=`) < relational (`< > <= >= in`)
//! < additive (`+ -`) < multiplicative (`* / %`) < power (`**`, right-assoc)
//! < unary (`- not`) < postfix (call / index / attr).

use crate::ast::{BinOp, Expr, FStringSegment, UnOp};
use crate::errors::ParseError;
use crate::token::{FStringPart, TokenKind};

use super::Parser;

impl Parser {
    pub(super) fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_lambda_or_or()
    }

    fn parse_lambda_or_or(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Lambda) {
            let mut params = Vec::new();
            if !self.check(&TokenKind::Colon) {
                loop {
                    params.push(self.expect_ident()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(&TokenKind::Colon, "':'")?;
            let body = self.parse_expression()?;
            return Ok(Expr::Lambda { params, body: Box::new(body) });
        }
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary { op: BinOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary { op: BinOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.eat(&TokenKind::EqEq) {
                BinOp::Eq
            } else if self.eat(&TokenKind::NotEq) {
                BinOp::Ne
            } else {
                break;
            };
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.eat(&TokenKind::Lt) {
                BinOp::Lt
            } else if self.eat(&TokenKind::Gt) {
                BinOp::Gt
            } else if self.eat(&TokenKind::LtEq) {
                BinOp::Le
            } else if self.eat(&TokenKind::GtEq) {
                BinOp::Ge
            } else if self.eat(&TokenKind::In) {
                BinOp::In
            } else {
                break;
            };
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.eat(&TokenKind::Plus) {
                BinOp::Add
            } else if self.eat(&TokenKind::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_power()?;
        loop {
            let op = if self.eat(&TokenKind::Star) {
                BinOp::Mul
            } else if self.eat(&TokenKind::Slash) {
                BinOp::Div
            } else if self.eat(&TokenKind::Percent) {
                BinOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_power()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    /// `**` is right-associative: `2 ** 3 ** 2 == 2 ** (3 ** 2)`.
    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_unary()?;
        if self.eat(&TokenKind::StarStar) {
            let rhs = self.parse_power()?;
            return Ok(Expr::Binary { op: BinOp::Pow, lhs: Box::new(lhs), rhs: Box::new(rhs) });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Minus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnOp::Neg, expr: Box::new(expr) });
        }
        if self.eat(&TokenKind::Plus) {
            // Unary plus is a no-op, elided per spec.
            return self.parse_unary();
        }
        if self.eat(&TokenKind::Not) {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnOp::Not, expr: Box::new(expr) });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RParen, "')'")?;
                expr = Expr::Call { callee: Box::new(expr), args };
            } else if self.eat(&TokenKind::Dot) {
                let name = self.expect_ident()?;
                expr = Expr::Attr { object: Box::new(expr), name };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                expr = Expr::Index { object: Box::new(expr), index: Box::new(index) };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let kind = self.peek_kind().clone();
        match kind {
            TokenKind::Number(text) => {
                self.advance();
                if text.contains('.') {
                    text.parse::<f64>().map(Expr::Float).map_err(|_| self.error("invalid float literal"))
                } else {
                    text.parse::<i64>().map(Expr::Int).map_err(|_| self.error("invalid integer literal"))
                }
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::FString(parts) => {
                self.advance();
                let mut segments = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        FStringPart::Literal(text) => segments.push(FStringSegment::Literal(text)),
                        FStringPart::Expr(text) => {
                            let expr = super::parse_expr_text(&text)?;
                            segments.push(FStringSegment::Expr(expr));
                        }
                    }
                }
                Ok(Expr::FString(segments))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::Nil)
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            TokenKind::LParen => {
                self.advance();
                if self.eat(&TokenKind::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_expression()?;
                if self.eat(&TokenKind::Comma) {
                    let mut items = vec![first];
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            items.push(self.parse_expression()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                    Ok(Expr::Tuple(items))
                } else {
                    self.expect(&TokenKind::RParen, "')'")?;
                    Ok(first)
                }
            }
            TokenKind::LBracket => self.parse_list_or_comprehension(),
            TokenKind::LBrace => self.parse_dict_literal(),
            other => Err(self.error(format!("unexpected token {other:?} in expression"))),
        }
    }

    fn parse_list_or_comprehension(&mut self) -> Result<Expr, ParseError> {
        self.advance(); // '['
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.parse_expression()?;
        if self.check(&TokenKind::For) {
            self.advance();
            let var = self.expect_ident()?;
            self.expect(&TokenKind::In, "'in'")?;
            let iterable = self.parse_expression()?;
            let cond = if self.eat(&TokenKind::If) { Some(Box::new(self.parse_expression()?)) } else { None };
            self.expect(&TokenKind::RBracket, "']'")?;
            return Ok(Expr::ListComp { element: Box::new(first), var, iterable: Box::new(iterable), cond });
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break; // trailing comma
            }
            items.push(self.parse_expression()?);
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Expr::List(items))
    }

    fn parse_dict_literal(&mut self) -> Result<Expr, ParseError> {
        self.advance(); // '{'
        let mut entries = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = self.parse_expression()?;
                self.expect(&TokenKind::Colon, "':'")?;
                let value = self.parse_expression()?;
                entries.push((key, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                if self.check(&TokenKind::RBrace) {
                    break; // trailing comma
                }
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Expr::Dict(entries))
    }
}
