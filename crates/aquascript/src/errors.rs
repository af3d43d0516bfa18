//! Crate-wide error types.
//!
//! Each pipeline stage (lex, parse, codegen, load, runtime) owns its error
//! type. [`AquaError`] aggregates them so callers that drive the whole
//! pipeline (the CLIs, tests, embedders) can propagate a single type with
//! `?` while still being able to match on the originating stage.

use std::fmt;

use crate::vm::RuntimeError;

/// A source position, used by every compile-time error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// An error raised while turning source text into tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub at: Position,
}

impl LexError {
    #[must_use]
    pub fn new(message: impl Into<String>, at: Position) -> Self {
        Self { message: message.into(), at }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lex error at {}: {}", self.at, self.message)
    }
}

impl std::error::Error for LexError {}

/// An error raised while turning tokens into an AST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub at: Position,
}

impl ParseError {
    #[must_use]
    pub fn new(message: impl Into<String>, at: Position) -> Self {
        Self { message: message.into(), at }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}: {}", self.at, self.message)
    }
}

impl std::error::Error for ParseError {}

/// An error raised while lowering an AST to bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenError {
    pub message: String,
    pub at: Position,
}

impl CodegenError {
    #[must_use]
    pub fn new(message: impl Into<String>, at: Position) -> Self {
        Self { message: message.into(), at }
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "codegen error at {}: {}", self.at, self.message)
    }
}

impl std::error::Error for CodegenError {}

/// An error raised while deserializing a bytecode container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub message: String,
}

impl LoadError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load error: {}", self.message)
    }
}

impl std::error::Error for LoadError {}

/// The top-level error type covering every pipeline stage.
///
/// Keeping parse/compile/load/runtime failures distinct lets callers
/// (CLIs, embedders) choose how to report each without string matching.
#[derive(Debug, Clone)]
pub enum AquaError {
    Lex(LexError),
    Parse(ParseError),
    Codegen(CodegenError),
    Load(LoadError),
    Runtime(RuntimeError),
}

impl fmt::Display for AquaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(e) => write!(f, "{e}"),
            Self::Parse(e) => write!(f, "{e}"),
            Self::Codegen(e) => write!(f, "{e}"),
            Self::Load(e) => write!(f, "{e}"),
            Self::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AquaError {}

impl From<LexError> for AquaError {
    fn from(e: LexError) -> Self {
        Self::Lex(e)
    }
}

impl From<ParseError> for AquaError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<CodegenError> for AquaError {
    fn from(e: CodegenError) -> Self {
        Self::Codegen(e)
    }
}

impl From<LoadError> for AquaError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<RuntimeError> for AquaError {
    fn from(e: RuntimeError) -> Self {
        Self::Runtime(e)
    }
}
