//! Source text → token stream.
//!
//! Tracks indentation width as a stack (tabs count as 4 columns, per spec),
//! emitting `INDENT`/`DEDENT` at the start of non-blank lines and a single
//! trailing run of `DEDENT`s plus `EOF` at end of input. F-strings are
//! segmented here into literal/expression parts; the expression text is
//! kept verbatim for the parser to re-lex and re-parse.

use crate::errors::{LexError, Position};
use crate::token::{FStringPart, Token, TokenKind};

const TAB_WIDTH: u32 = 4;

/// Lexes `source` into a flat token stream, including synthetic
/// `INDENT`/`DEDENT`/`NEWLINE`/`EOF` tokens.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: Vec<char>,
    src: &'a str,
    pos: usize,
    line: u32,
    column: u32,
    indents: Vec<u32>,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            src: source,
            pos: 0,
            line: 1,
            column: 1,
            indents: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while !self.is_eof() {
            if self.at_line_start {
                self.handle_line_start()?;
                if self.is_eof() {
                    break;
                }
            }
            self.lex_token()?;
        }
        self.finish()
    }

    fn finish(mut self) -> Result<Vec<Token>, LexError> {
        // Emit a trailing NEWLINE if the file doesn't end with one, so the
        // parser always sees a statement terminator.
        if let Some(last) = self.tokens.last() {
            if !matches!(last.kind, TokenKind::Newline) {
                self.tokens.push(Token::new(TokenKind::Newline, "", self.line, self.column));
            }
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, "", self.line, self.column));
        }
        self.tokens.push(Token::new(TokenKind::Eof, "", self.line, self.column));
        Ok(self.tokens)
    }

    /// Computes the leading indentation width of the current line and emits
    /// INDENT/DEDENT tokens, skipping blank and comment-only lines.
    fn handle_line_start(&mut self) -> Result<(), LexError> {
        loop {
            let start = self.pos;
            let mut width = 0u32;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => {
                        width += 1;
                        self.advance();
                    }
                    '\t' => {
                        width += TAB_WIDTH;
                        self.advance();
                    }
                    _ => break,
                }
            }
            match self.peek() {
                None => {
                    self.pos = start;
                    self.at_line_start = false;
                    return Ok(());
                }
                Some('\n' | '\r') => {
                    // Blank line: consume the newline, re-enter line-start.
                    self.consume_newline();
                    continue;
                }
                Some('#') => {
                    self.skip_comment();
                    if matches!(self.peek(), Some('\n' | '\r')) {
                        self.consume_newline();
                        continue;
                    }
                    self.at_line_start = false;
                    return Ok(());
                }
                Some(_) => {
                    self.apply_indent(width);
                    self.at_line_start = false;
                    return Ok(());
                }
            }
        }
    }

    fn apply_indent(&mut self, width: u32) {
        let top = *self.indents.last().unwrap();
        if width > top {
            self.indents.push(width);
            self.tokens.push(Token::new(TokenKind::Indent, "", self.line, self.column));
        } else if width < top {
            while *self.indents.last().unwrap() > width {
                self.indents.pop();
                self.tokens.push(Token::new(TokenKind::Dedent, "", self.line, self.column));
            }
        }
    }

    fn consume_newline(&mut self) {
        if self.peek() == Some('\r') {
            self.advance();
        }
        if self.peek() == Some('\n') {
            self.advance();
        }
        self.line += 1;
        self.column = 1;
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                break;
            }
            self.advance();
        }
    }

    fn lex_token(&mut self) -> Result<(), LexError> {
        let Some(c) = self.peek() else { return Ok(()) };
        match c {
            ' ' | '\t' => {
                self.advance();
                Ok(())
            }
            '\n' | '\r' => {
                let (line, column) = (self.line, self.column);
                self.consume_newline();
                self.tokens.push(Token::new(TokenKind::Newline, "", line, column));
                self.at_line_start = true;
                Ok(())
            }
            '#' => {
                let (line, column) = (self.line, self.column);
                self.skip_comment();
                self.tokens.push(Token::new(TokenKind::Comment, "", line, column));
                Ok(())
            }
            '0'..='9' => self.lex_number(),
            '"' | '\'' => self.lex_string(c),
            'f' if matches!(self.peek_at(1), Some('"' | '\'')) => self.lex_fstring(),
            c if c.is_alphabetic() || c == '_' => self.lex_ident(),
            _ => self.lex_operator(),
        }
    }

    fn lex_number(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !seen_dot && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit()) {
                seen_dot = true;
                self.advance();
            } else {
                break;
            }
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        self.tokens.push(Token::new(TokenKind::Number(lexeme.clone()), lexeme, line, column));
        Ok(())
    }

    fn lex_string(&mut self, quote: char) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string literal", line, column)),
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    out.push(self.read_escape()?);
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
        self.tokens.push(Token::new(TokenKind::Str(out.clone()), out, line, column));
        Ok(())
    }

    fn read_escape(&mut self) -> Result<char, LexError> {
        let Some(c) = self.peek() else {
            return Err(self.error("unterminated escape sequence", self.line, self.column));
        };
        self.advance();
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            other => other,
        })
    }

    /// Segments an f-string into literal and `{expr}` parts, tracking
    /// balanced braces inside each expression segment.
    fn lex_fstring(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // 'f'
        let Some(quote) = self.peek() else {
            return Err(self.error("unterminated f-string", line, column));
        };
        self.advance(); // opening quote
        let mut parts = Vec::new();
        let mut literal = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated f-string literal", line, column)),
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    literal.push(self.read_escape()?);
                }
                Some('{') => {
                    if !literal.is_empty() {
                        parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                    }
                    self.advance();
                    let expr = self.read_fstring_expr()?;
                    parts.push(FStringPart::Expr(expr));
                }
                Some(c) => {
                    literal.push(c);
                    self.advance();
                }
            }
        }
        if !literal.is_empty() {
            parts.push(FStringPart::Literal(literal));
        }
        self.tokens.push(Token::new(TokenKind::FString(parts), String::new(), line, column));
        Ok(())
    }

    /// Reads the raw text of a `{ ... }` expression segment, balancing
    /// nested braces so an inner `{}` (e.g. a dict literal) doesn't
    /// terminate the segment early.
    fn read_fstring_expr(&mut self) -> Result<String, LexError> {
        let (line, column) = (self.line, self.column);
        let mut depth = 1u32;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated f-string expression", line, column)),
                Some('{') => {
                    depth += 1;
                    out.push('{');
                    self.advance();
                }
                Some('}') => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                    out.push('}');
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
        Ok(out)
    }

    fn lex_ident(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let kind = TokenKind::keyword(&lexeme).unwrap_or_else(|| TokenKind::Ident(lexeme.clone()));
        self.tokens.push(Token::new(kind, lexeme, line, column));
        Ok(())
    }

    fn lex_operator(&mut self) -> Result<(), LexError> {
        let (line, column) = (self.line, self.column);
        let two: Option<&str> = match (self.peek(), self.peek_at(1)) {
            (Some('*'), Some('*')) => Some("**"),
            (Some('='), Some('=')) => Some("=="),
            (Some('!'), Some('=')) => Some("!="),
            (Some('<'), Some('=')) => Some("<="),
            (Some('>'), Some('=')) => Some(">="),
            (Some('-'), Some('>')) => Some("->"),
            _ => None,
        };
        if let Some(op) = two {
            let kind = match op {
                "**" => TokenKind::StarStar,
                "==" => TokenKind::EqEq,
                "!=" => TokenKind::NotEq,
                "<=" => TokenKind::LtEq,
                ">=" => TokenKind::GtEq,
                "->" => TokenKind::Arrow,
                _ => unreachable!(),
            };
            self.advance();
            self.advance();
            self.tokens.push(Token::new(kind, op, line, column));
            return Ok(());
        }

        let c = self.peek().expect("checked by caller");
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => TokenKind::Eq,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            other => return Err(self.error(format!("unexpected character '{other}'"), line, column)),
        };
        self.advance();
        self.tokens.push(Token::new(kind, c.to_string(), line, column));
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if c.is_some() {
            self.pos += 1;
            self.column += 1;
        }
        c
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn error(&self, message: impl Into<String>, line: u32, column: u32) -> LexError {
        let _ = self.src;
        LexError::new(message, Position::new(line, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_source_lexes_to_eof_only() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn indentation_tracks_nested_blocks() {
        let src = "if True:\n    var x = 1\n    if True:\n        var y = 2\nvar z = 3\n";
        let k = kinds(src);
        let indents = k.iter().filter(|t| matches!(t, TokenKind::Indent)).count();
        let dedents = k.iter().filter(|t| matches!(t, TokenKind::Dedent)).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
    }

    #[test]
    fn fstring_segments_literal_and_expr() {
        let k = kinds("f\"hello {name}!\"");
        match &k[0] {
            TokenKind::FString(parts) => {
                assert_eq!(
                    parts,
                    &vec![
                        FStringPart::Literal("hello ".to_owned()),
                        FStringPart::Expr("name".to_owned()),
                        FStringPart::Literal("!".to_owned()),
                    ]
                );
            }
            other => panic!("expected f-string, got {other:?}"),
        }
    }

    #[test]
    fn nested_braces_in_fstring_expr_are_balanced() {
        let k = kinds("f\"{ {1: 2} }\"");
        match &k[0] {
            TokenKind::FString(parts) => {
                assert_eq!(parts, &vec![FStringPart::Expr(" {1: 2} ".to_owned())]);
            }
            other => panic!("expected f-string, got {other:?}"),
        }
    }

    #[test]
    fn multi_char_operators_win_over_single_char() {
        let k = kinds("a ** b == c != d <= e >= f -> g");
        assert!(k.contains(&TokenKind::StarStar));
        assert!(k.contains(&TokenKind::EqEq));
        assert!(k.contains(&TokenKind::NotEq));
        assert!(k.contains(&TokenKind::LtEq));
        assert!(k.contains(&TokenKind::GtEq));
        assert!(k.contains(&TokenKind::Arrow));
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        assert!(lex("\"abc").is_err());
    }
}
