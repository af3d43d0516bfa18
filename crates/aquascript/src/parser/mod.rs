//! Hand-written recursive-descent parser, tokens → AST.
//!
//! Every compound statement accepts both block styles uniformly: a `{`
//! starts a brace block; otherwise a `:` is expected, followed by
//! `NEWLINE INDENT ... DEDENT`. `NEWLINE`/`COMMENT` are skipped between
//! statements wherever they may appear.

mod expr;

use crate::ast::*;
use crate::errors::{ParseError, Position};
use crate::lexer;
use crate::token::{Token, TokenKind};

/// Parses a full token stream into a sequence of top-level statements.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, ParseError> {
    Parser::new(tokens).parse_program()
}

/// Re-lexes and re-parses a single expression substring, for f-string
/// segments captured verbatim by the lexer.
pub fn parse_expr_text(text: &str) -> Result<Expr, ParseError> {
    let tokens = lexer::lex(text).map_err(|e| ParseError::new(e.message, e.at))?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    Ok(expr)
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ---- token plumbing -------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn pos_here(&self) -> Position {
        let t = self.peek();
        Position::new(t.line, t.column)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek_kind())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {other:?}"))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.pos_here())
    }

    fn skip_trivia(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Comment) {
            self.advance();
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    // ---- program / blocks ------------------------------------------------

    fn parse_program(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        self.skip_trivia();
        while !self.at_eof() {
            stmts.push(self.parse_statement()?);
            self.skip_trivia();
        }
        Ok(stmts)
    }

    /// Parses a block body in either brace or indentation form, per the
    /// compound-statement rule in spec.md §4.2.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.eat(&TokenKind::LBrace) {
            let mut stmts = Vec::new();
            self.skip_trivia();
            while !self.check(&TokenKind::RBrace) && !self.at_eof() {
                stmts.push(self.parse_statement()?);
                self.skip_trivia();
            }
            self.expect(&TokenKind::RBrace, "'}'")?;
            Ok(stmts)
        } else {
            self.expect(&TokenKind::Colon, "':' or '{'")?;
            self.skip_trivia();
            self.expect(&TokenKind::Indent, "indented block")?;
            let mut stmts = Vec::new();
            self.skip_trivia();
            while !self.check(&TokenKind::Dedent) && !self.at_eof() {
                stmts.push(self.parse_statement()?);
                self.skip_trivia();
            }
            self.expect(&TokenKind::Dedent, "dedent")?;
            Ok(stmts)
        }
    }

    // ---- statements -------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.pos_here();
        let kind = match self.peek_kind().clone() {
            TokenKind::Func => self.parse_func_def().map(StmtKind::FuncDef)?,
            TokenKind::Var => self.parse_var_decl()?,
            TokenKind::Class => self.parse_class_def().map(StmtKind::ClassDef)?,
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::Repeat => self.parse_repeat_while()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Switch => self.parse_switch()?,
            TokenKind::Import | TokenKind::From => self.parse_import().map(StmtKind::Import)?,
            TokenKind::Return => {
                self.advance();
                let value = if matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                StmtKind::Return(value)
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Try => self.parse_try()?,
            TokenKind::Throw => {
                self.advance();
                StmtKind::Throw(self.parse_expression()?)
            }
            _ => self.parse_expr_or_assignment_statement()?,
        };
        self.skip_statement_terminator();
        Ok(Stmt::new(kind, pos))
    }

    /// A statement is terminated by a NEWLINE (consumed here) or, inside a
    /// brace block, simply by the next `}`/statement start. We consume at
    /// most one NEWLINE; callers' `skip_trivia` absorbs the rest.
    fn skip_statement_terminator(&mut self) {
        if matches!(self.peek_kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn parse_type_annotation_if_present(&mut self) -> Result<(), ParseError> {
        if self.eat(&TokenKind::Colon) {
            // Type annotations are accepted and discarded (no compile-time enforcement).
            self.parse_type_name()?;
        }
        Ok(())
    }

    fn parse_type_name(&mut self) -> Result<(), ParseError> {
        self.expect_ident()?;
        Ok(())
    }

    fn parse_var_decl(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // 'var'
        let name = self.expect_ident()?;
        self.parse_type_annotation_if_present()?;
        let value = if self.eat(&TokenKind::Eq) { Some(self.parse_expression()?) } else { None };
        Ok(StmtKind::VarDecl { name, value })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let name = self.expect_ident()?;
                self.parse_type_annotation_if_present()?;
                params.push(Param { name });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        if self.eat(&TokenKind::Arrow) {
            self.parse_type_name()?;
        }
        Ok(params)
    }

    fn parse_func_def(&mut self) -> Result<FuncDef, ParseError> {
        self.advance(); // 'func'
        let name = self.expect_ident()?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(FuncDef { name, params, body })
    }

    fn parse_class_def(&mut self) -> Result<ClassDef, ParseError> {
        self.advance(); // 'class'
        let name = self.expect_ident()?;
        let parent = if self.eat(&TokenKind::Colon) {
            if matches!(self.peek_kind(), TokenKind::Ident(_)) {
                Some(self.expect_ident()?)
            } else {
                // Plain `class Foo:` without a parent uses the colon as the block marker;
                // put it back by treating this as "no parent" and re-opening a block.
                self.pos -= 1;
                None
            }
        } else {
            None
        };
        let body = self.parse_block_after_optional_colon(parent.is_some())?;
        let mut methods = Vec::new();
        for stmt in body {
            match stmt.kind {
                StmtKind::FuncDef(f) => methods.push(f),
                _ => return Err(ParseError::new("class body may only contain method definitions", stmt.pos)),
            }
        }
        Ok(ClassDef { name, parent, methods })
    }

    /// Helper for class bodies: if a parent name was already consumed along
    /// with its `:`, the block is indentation-style by construction (the
    /// colon is gone); otherwise parse a normal block (brace or indent).
    fn parse_block_after_optional_colon(&mut self, colon_consumed: bool) -> Result<Vec<Stmt>, ParseError> {
        if colon_consumed {
            self.skip_trivia();
            self.expect(&TokenKind::Indent, "indented class body")?;
            let mut stmts = Vec::new();
            self.skip_trivia();
            while !self.check(&TokenKind::Dedent) && !self.at_eof() {
                stmts.push(self.parse_statement()?);
                self.skip_trivia();
            }
            self.expect(&TokenKind::Dedent, "dedent")?;
            Ok(stmts)
        } else {
            self.parse_block()
        }
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // 'if'
        let mut branches = Vec::new();
        let cond = self.parse_expression()?;
        let body = self.parse_block()?;
        branches.push((cond, body));
        let mut else_branch = None;
        loop {
            if self.eat(&TokenKind::Elif) {
                let cond = self.parse_expression()?;
                let body = self.parse_block()?;
                branches.push((cond, body));
            } else if self.eat(&TokenKind::Else) {
                if matches!(self.peek_kind(), TokenKind::If) {
                    // `else if` is accepted as an alias for `elif`.
                    self.advance();
                    let cond = self.parse_expression()?;
                    let body = self.parse_block()?;
                    branches.push((cond, body));
                } else {
                    else_branch = Some(self.parse_block()?);
                    break;
                }
            } else {
                break;
            }
        }
        Ok(StmtKind::If { branches, else_branch })
    }

    fn parse_while(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // 'while'
        let cond = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(StmtKind::While { cond, body })
    }

    fn parse_repeat_while(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // 'repeat'
        let body = self.parse_block()?;
        self.expect(&TokenKind::While, "'while'")?;
        let cond = self.parse_expression()?;
        Ok(StmtKind::RepeatWhile { body, cond })
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // 'for'
        let var = self.expect_ident()?;
        self.expect(&TokenKind::In, "'in'")?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(StmtKind::For { var, iterable, body })
    }

    fn parse_case_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.skip_trivia();
        let mut body = Vec::new();
        if self.eat(&TokenKind::Indent) {
            self.skip_trivia();
            while !self.check(&TokenKind::Dedent) && !self.at_eof() {
                body.push(self.parse_statement()?);
                self.skip_trivia();
            }
            self.expect(&TokenKind::Dedent, "dedent")?;
        }
        Ok(body)
    }

    fn parse_switch(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // 'switch'
        let scrutinee = self.parse_expression()?;
        let brace = self.eat(&TokenKind::LBrace);
        if !brace {
            self.expect(&TokenKind::Colon, "':' or '{'")?;
        }
        self.skip_trivia();
        if !brace {
            self.expect(&TokenKind::Indent, "indented switch body")?;
        }
        let mut cases = Vec::new();
        let mut default = None;
        loop {
            self.skip_trivia();
            if brace && self.check(&TokenKind::RBrace) {
                break;
            }
            if !brace && (self.check(&TokenKind::Dedent) || self.at_eof()) {
                break;
            }
            if self.eat(&TokenKind::Case) {
                let value = self.parse_expression()?;
                self.expect(&TokenKind::Colon, "':'")?;
                let body = self.parse_case_body()?;
                cases.push(CaseArm { value, body });
            } else if self.eat(&TokenKind::Default) {
                self.expect(&TokenKind::Colon, "':'")?;
                default = Some(self.parse_case_body()?);
            } else {
                break;
            }
        }
        if brace {
            self.expect(&TokenKind::RBrace, "'}'")?;
        } else {
            self.expect(&TokenKind::Dedent, "dedent")?;
        }
        Ok(StmtKind::Switch { scrutinee, cases, default })
    }

    fn parse_import(&mut self) -> Result<ImportSpec, ParseError> {
        if self.eat(&TokenKind::From) {
            let module = self.expect_ident()?;
            self.expect(&TokenKind::Import, "'import'")?;
            let mut items = vec![self.expect_ident()?];
            while self.eat(&TokenKind::Comma) {
                items.push(self.expect_ident()?);
            }
            Ok(ImportSpec { module, items: Some(items) })
        } else {
            self.expect(&TokenKind::Import, "'import'")?;
            let mut module = self.expect_ident()?;
            while self.eat(&TokenKind::Dot) {
                if self.eat(&TokenKind::LParen) {
                    let mut items = vec![self.expect_ident()?];
                    while self.eat(&TokenKind::Comma) {
                        items.push(self.expect_ident()?);
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                    return Ok(ImportSpec { module, items: Some(items) });
                }
                module.push('.');
                module.push_str(&self.expect_ident()?);
            }
            Ok(ImportSpec { module, items: None })
        }
    }

    fn parse_try(&mut self) -> Result<StmtKind, ParseError> {
        let try_pos = self.pos_here();
        self.advance(); // 'try'
        let body = self.parse_block()?;
        let mut catches = Vec::new();
        while self.check(&TokenKind::Catch) {
            catches.push(self.parse_catch_clause()?);
        }
        let finally = if self.eat(&TokenKind::Finally) { Some(self.parse_block()?) } else { None };
        if catches.is_empty() && finally.is_none() {
            return Err(ParseError::new("try statement must have at least one catch or finally clause", try_pos));
        }
        Ok(StmtKind::Try { body, catches, finally })
    }

    fn parse_catch_clause(&mut self) -> Result<CatchClause, ParseError> {
        self.advance(); // 'catch'
        let mut exception_type = None;
        let mut binding = None;
        if let TokenKind::Ident(_) = self.peek_kind().clone() {
            let first = self.expect_ident()?;
            if self.eat(&TokenKind::As) {
                exception_type = Some(first);
                binding = Some(self.expect_ident()?);
            } else {
                binding = Some(first);
            }
        }
        let body = self.parse_block()?;
        Ok(CatchClause { exception_type, binding, body })
    }

    // ---- expression statements / assignment discrimination ----------------

    fn parse_expr_or_assignment_statement(&mut self) -> Result<StmtKind, ParseError> {
        let lhs = self.parse_expression()?;
        if self.eat(&TokenKind::Eq) {
            let value = self.parse_expression()?;
            return match lhs {
                Expr::Ident(name) => Ok(StmtKind::Assign { name, value }),
                Expr::Attr { object, name } => Ok(StmtKind::AttrAssign { object: *object, name, value }),
                Expr::Index { object, index } => {
                    Ok(StmtKind::IndexAssign { object: *object, index: *index, value })
                }
                _ => Err(self.error("invalid assignment target")),
            };
        }
        Ok(StmtKind::Expr(lhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_source(src: &str) -> Vec<Stmt> {
        let tokens = lexer::lex(src).expect("source lexes");
        parse(tokens).expect("source parses")
    }

    #[test]
    fn empty_source_parses_to_no_statements() {
        assert!(parse_source("").is_empty());
        assert!(parse_source("\n\n  \n").is_empty());
    }

    #[test]
    fn trailing_commas_are_accepted_in_every_bracketed_literal() {
        let stmts = parse_source("var xs = [1, 2, 3,]\nvar d = {\"a\": 1,}\nvar t = (1, 2,)");
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn deeply_nested_brace_blocks_parse() {
        let depth = 120;
        let mut src = String::new();
        for i in 0..depth {
            src.push_str(&"    ".repeat(i));
            src.push_str(&format!("if true {{\n"));
        }
        src.push_str(&"    ".repeat(depth));
        src.push_str("print(1)\n");
        for i in (0..depth).rev() {
            src.push_str(&"    ".repeat(i));
            src.push_str("}\n");
        }
        let stmts = parse_source(&src);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn deeply_nested_indent_blocks_parse() {
        let depth = 120;
        let mut src = String::new();
        for i in 0..depth {
            src.push_str(&"    ".repeat(i));
            src.push_str("if true:\n");
        }
        src.push_str(&"    ".repeat(depth));
        src.push_str("print(1)\n");
        let stmts = parse_source(&src);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn function_without_explicit_return_parses() {
        let stmts = parse_source("func noop():\n    var x = 1\n");
        match &stmts[0].kind {
            StmtKind::FuncDef(def) => assert_eq!(def.body.len(), 1),
            other => panic!("expected a function definition, got {other:?}"),
        }
    }
}
