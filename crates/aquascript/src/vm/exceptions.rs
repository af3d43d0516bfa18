//! Exception unwinding: `TRY_BEGIN`/`TRY_END`/`CATCH_BEGIN`/`CATCH_END`/
//! `FINALLY_BEGIN`/`FINALLY_END`/`THROW`/`RERAISE`, per spec.md §4.5.
//!
//! The compiler (§4.3) always emits a try statement as:
//!
//! ```text
//! TRY_BEGIN
//!   <body>
//! TRY_END  -> T                      ; pops this try's handler, jumps to T
//! CATCH_BEGIN type_1
//!   <bind-or-pop>  <body>  JUMP -> T
//! CATCH_END                         ; dead on the matched path (JUMP skips it)
//! CATCH_BEGIN type_2
//!   ...
//! T:
//! [FINALLY_BEGIN <body> FINALLY_END]
//! ```
//!
//! `TRY_END`'s already-patched jump target doubles as the boundary of the
//! catch chain, so a handler's layout — where each catch clause starts and
//! ends, and where `finally` (if any) begins — is fully recoverable by a
//! linear scan from the `TRY_BEGIN` site. We do that scan once, when
//! `TRY_BEGIN` executes, rather than at compile time (spec.md §4.5 permits
//! either).

use std::fmt;

use crate::bytecode::{Instruction, Opcode};
use crate::value::Value;

use super::Vm;

/// The exception currently propagating, if any.
#[derive(Debug, Clone)]
pub struct CurrentException {
    /// The value bound by a matching `catch` clause. For a thrown class
    /// instance this is the instance itself; for a primitive (e.g. a
    /// thrown string) it is that primitive, unwrapped — so `catch e` then
    /// `"prefix: " + e` works without an extra unwrap step.
    pub value: Value,
    /// The name matched against `catch TypeName`.
    pub type_name: String,
}

/// One `catch` clause's layout within its enclosing instruction list.
#[derive(Debug, Clone)]
struct CatchClauseSite {
    /// Constant-pool index of the clause's type name (or the index of the
    /// `Nil` constant, for a catch-all).
    type_const: i64,
    /// Index of the bind/pop instruction immediately after `CATCH_BEGIN`.
    bind_pc: usize,
}

/// A `try` statement's resolved layout, kept on the handler stack while
/// its body (and any nested calls) execute.
#[derive(Debug, Clone)]
struct HandlerSite {
    /// Call-frame depth (`self.frames.len()`) when this try was entered.
    frame_depth: usize,
    /// Operand-stack depth when this try was entered.
    stack_depth: usize,
    clauses: Vec<CatchClauseSite>,
    finally_pc: Option<usize>,
}

/// Public call-stack frame metadata captured at throw time, for a fatal
/// error's traceback (spec.md §7: "call-stack listing `frame-name at
/// instruction N`, newest frame first").
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub name: String,
    pub pc: usize,
}

/// A fatal, uncaught runtime error.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
    /// Newest frame first.
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    #[must_use]
    pub fn new(message: impl Into<String>, trace: Vec<TraceFrame>) -> Self {
        Self { message: message.into(), trace }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "runtime error: {}", self.message)?;
        for frame in &self.trace {
            writeln!(f, "  at {} instruction {}", frame.name, frame.pc)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// The VM's exception-handling state: the stack of active `try` handlers
/// plus whatever exception is currently unwound (if any).
#[derive(Debug, Default)]
pub(super) struct ExceptionState {
    handlers: Vec<HandlerSite>,
    pub(super) pending: Option<CurrentException>,
}

impl Vm {
    /// Drops any handlers that belonged to a frame deeper than `depth`,
    /// called when a frame returns without running its `TRY_END` (e.g. a
    /// `return` inside a `try` body). Those handlers are out of scope the
    /// moment their owning frame is gone.
    pub(super) fn discard_handlers_above(&mut self, depth: usize) {
        self.exceptions.handlers.retain(|h| h.frame_depth <= depth);
    }

    /// Finds the instruction index of the `close` opcode matching the
    /// `open`/`close` pair that began at `start` (the instruction right
    /// after the opening one), using a depth counter local to that one
    /// opcode pair. Both `TRY_BEGIN`/`TRY_END` and `CATCH_BEGIN`/
    /// `CATCH_END` are independently balanced this way even when
    /// interleaved or nested.
    fn find_matching(instrs: &[Instruction], start: usize, open: Opcode, close: Opcode) -> usize {
        let mut depth = 1i32;
        let mut i = start;
        loop {
            let op = instrs[i].op;
            if op == open {
                depth += 1;
            } else if op == close {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            i += 1;
        }
    }

    /// Resolves a `TRY_BEGIN` at `try_begin_pc` into its full layout and
    /// pushes the resulting handler.
    pub(super) fn op_try_begin(&mut self, try_begin_pc: usize) {
        let instrs = self.current_instructions().to_vec();
        let try_end_pc = Self::find_matching(&instrs, try_begin_pc + 1, Opcode::TryBegin, Opcode::TryEnd);
        let resume_at = instrs[try_end_pc].operand as usize;

        let mut clauses = Vec::new();
        let mut pos = try_end_pc + 1;
        while pos < resume_at {
            debug_assert_eq!(instrs[pos].op, Opcode::CatchBegin);
            let type_const = instrs[pos].operand;
            let bind_pc = pos + 1;
            let catch_end_pc = Self::find_matching(&instrs, pos + 1, Opcode::CatchBegin, Opcode::CatchEnd);
            clauses.push(CatchClauseSite { type_const, bind_pc });
            pos = catch_end_pc + 1;
        }
        let finally_pc = if resume_at < instrs.len() && instrs[resume_at].op == Opcode::FinallyBegin {
            Some(resume_at)
        } else {
            None
        };

        self.exceptions.handlers.push(HandlerSite {
            frame_depth: self.frames.len(),
            stack_depth: self.stack.len(),
            clauses,
            finally_pc,
        });
    }

    /// `TRY_END`: the try body completed with no exception pending. Pop
    /// this try's handler (it's no longer in scope) and jump to `target`,
    /// skipping the catch chain entirely.
    pub(super) fn op_try_end(&mut self, target: i64) {
        self.exceptions.handlers.pop();
        self.set_pc(target as usize);
    }

    /// Reached only if control somehow falls onto a `CATCH_BEGIN` outside
    /// the jump-driven dispatch below (it shouldn't, in well-formed
    /// compiled code) — treated as a no-op so the dispatch table stays
    /// total.
    pub(super) fn op_catch_begin(&mut self) {}

    pub(super) fn op_catch_end(&mut self) {
        self.exceptions.pending = None;
    }

    pub(super) fn op_finally_begin(&mut self) {}

    /// `FINALLY_END`: if an exception is still pending (this try's catch
    /// chain didn't match, or there was none), keep propagating to an
    /// outer handler; otherwise this was a normal `finally` after a
    /// handled (or absent) exception, so just fall through.
    pub(super) fn op_finally_end(&mut self) -> Result<(), RuntimeError> {
        if self.exceptions.pending.is_some() {
            self.propagate()?;
        }
        Ok(())
    }

    /// `THROW`: pop the thrown value, wrap it as the current exception if
    /// it isn't already an exception-shaped value, and begin unwinding.
    pub(super) fn op_throw(&mut self) -> Result<(), RuntimeError> {
        let value = self.pop();
        let type_name = self.exception_type_name(&value);
        self.exceptions.pending = Some(CurrentException { value, type_name });
        self.propagate()
    }

    /// `RERAISE`: re-propagate whatever exception is currently active.
    /// Not emitted by this crate's compiler (no surface syntax reaches
    /// it), but included for completeness against spec.md §4.5's opcode
    /// set.
    pub(super) fn op_reraise(&mut self) -> Result<(), RuntimeError> {
        if self.exceptions.pending.is_some() {
            self.propagate()
        } else {
            Err(self.fatal("RERAISE with no active exception"))
        }
    }

    /// Derives the type name used for `catch TypeName` matching: a thrown
    /// class instance reports its (dynamic) class name, an existing
    /// `Value::Exception` reports its carried type name, and anything
    /// else reports its `type()` name (e.g. `"str"`).
    fn exception_type_name(&self, value: &Value) -> String {
        match value {
            Value::Exception(exc) => exc.type_name.clone(),
            Value::Instance(inst) => self.classes.get(inst.borrow().class).name.clone(),
            other => other.type_name().to_string(),
        }
    }

    /// The core unwinding loop, shared by `THROW` and a `FINALLY_END` that
    /// finds an exception still pending. Pops handlers until one matches,
    /// runs any intervening `finally` blocks, and either resumes at a
    /// matching catch clause's bind instruction or returns a fatal error.
    fn propagate(&mut self) -> Result<(), RuntimeError> {
        loop {
            let Some(handler) = self.exceptions.handlers.pop() else {
                let exc = self.exceptions.pending.take().expect("propagate called with no pending exception");
                return Err(self.fatal_uncaught(&exc));
            };

            self.frames.truncate(handler.frame_depth);
            self.stack.truncate(handler.stack_depth);

            let pending = self.exceptions.pending.as_ref().expect("propagate called with no pending exception");
            let matched = handler.clauses.iter().find(|c| self.clause_matches(c.type_const, &pending.type_name));

            if let Some(clause) = matched {
                let value = self.exceptions.pending.take().unwrap().value;
                self.stack.push(value);
                self.set_pc(clause.bind_pc);
                return Ok(());
            }

            if let Some(finally_pc) = handler.finally_pc {
                self.set_pc(finally_pc);
                return Ok(());
            }
            // No match and no finally: keep unwinding to the next outer handler.
        }
    }

    /// Does `type_const` (a constant-pool index, or the `Nil` constant for
    /// a catch-all) match the propagating exception's type name? Class
    /// instances also match any ancestor class name.
    fn clause_matches(&self, type_const: i64, type_name: &str) -> bool {
        match &self.code.constants[type_const as usize] {
            crate::bytecode::Constant::Nil => true,
            crate::bytecode::Constant::Str(expected) => {
                expected == type_name || self.classes.id_by_name(type_name).is_some_and(|id| self.classes.is_or_inherits(id, expected))
            }
            _ => false,
        }
    }

    fn fatal_uncaught(&self, exc: &CurrentException) -> RuntimeError {
        self.fatal(format!("uncaught exception: {}: {}", exc.type_name, exc.value))
    }
}
