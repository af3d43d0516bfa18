//! Uniform diagnostic rendering for lex/parse/codegen failures (A1 in
//! SPEC_FULL.md), shared by the `aquac` and `aquavm` binaries so both
//! report a compile-time error the same way: `<path>:<line>:<column>:
//! <kind> error: <message>`.

use std::fmt;

use crate::errors::{AquaError, CodegenError, LexError, ParseError, Position};

/// One compile-time failure, ready to print against a source file path.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: &'static str,
    pub message: String,
    pub at: Position,
}

impl Diagnostic {
    #[must_use]
    pub fn from_lex(e: &LexError) -> Self {
        Self { kind: "lex", message: e.message.clone(), at: e.at }
    }

    #[must_use]
    pub fn from_parse(e: &ParseError) -> Self {
        Self { kind: "parse", message: e.message.clone(), at: e.at }
    }

    #[must_use]
    pub fn from_codegen(e: &CodegenError) -> Self {
        Self { kind: "codegen", message: e.message.clone(), at: e.at }
    }

    /// Renders a compile-time error out of an [`AquaError`], if it is one
    /// (runtime and load errors have no source position to report here).
    #[must_use]
    pub fn from_aqua_error(err: &AquaError) -> Option<Self> {
        match err {
            AquaError::Lex(e) => Some(Self::from_lex(e)),
            AquaError::Parse(e) => Some(Self::from_parse(e)),
            AquaError::Codegen(e) => Some(Self::from_codegen(e)),
            AquaError::Load(_) | AquaError::Runtime(_) => None,
        }
    }

    /// Formats the diagnostic against `path`, e.g.
    /// `script.aqua:3:5: parse error: expected ':' or '{'`.
    #[must_use]
    pub fn render(&self, path: &str) -> String {
        format!("{path}:{}: {} error: {}", self.at, self.kind, self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} error: {}", self.at, self.kind, self.message)
    }
}
