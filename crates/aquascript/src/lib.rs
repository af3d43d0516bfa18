//! AquaScript: lexer, parser, code generator, bytecode container, and
//! stack-based virtual machine.
//!
//! The pipeline is [`lexer::lex`] → [`parser::parse`] → [`bytecode::compile`]
//! → [`bytecode::container::serialize`]/[`bytecode::container::deserialize`]
//! → [`vm::Vm`]. [`compile_source`] and [`run_code`] wire the two ends of
//! that pipeline together for the common case; the stages remain public so
//! an embedder can, for example, compile once and run the result many times,
//! or inspect the AST between parsing and codegen.

pub mod ast;
pub mod bytecode;
pub mod diagnostics;
pub mod errors;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod value;
pub mod vm;

pub use bytecode::Code;
pub use errors::AquaError;
pub use value::Value;
pub use vm::Vm;

/// Runs the full front end: lex, parse, and lower `source` to a [`Code`].
pub fn compile_source(source: &str) -> Result<Code, AquaError> {
    let tokens = lexer::lex(source)?;
    let program = parser::parse(tokens)?;
    let code = bytecode::compile(&program)?;
    Ok(code)
}

/// Compiles and immediately executes `source` on a fresh [`Vm`].
pub fn run_source(source: &str) -> Result<(), AquaError> {
    let code = compile_source(source)?;
    Vm::new(code).run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Runs `source` and returns everything written through `print`.
    fn run_and_capture(source: &str) -> String {
        let code = compile_source(source).expect("source compiles");
        let buf: Rc<RefCell<Vec<u8>>> = Rc::default();
        struct Sink(Rc<RefCell<Vec<u8>>>);
        impl std::io::Write for Sink {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.borrow_mut().extend_from_slice(data);
                Ok(data.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut vm = Vm::new(code).with_output(Box::new(Sink(buf.clone())));
        vm.run().expect("program runs to completion");
        String::from_utf8(buf.borrow().clone()).expect("valid utf-8 output")
    }

    #[test]
    fn scenario_arithmetic() {
        assert_eq!(run_and_capture("print(1 + 2 * 3)"), "7\n");
    }

    #[test]
    fn scenario_recursive_fibonacci() {
        let src = "func f(n): if n <= 1: return n\n    return f(n-1) + f(n-2)\nprint(f(10))";
        assert_eq!(run_and_capture(src), "55\n");
    }

    #[test]
    fn scenario_for_loop_accumulation() {
        let src = "var xs = [1,2,3]\nvar s = 0\nfor x in xs: s = s + x\nprint(s)";
        assert_eq!(run_and_capture(src), "6\n");
    }

    #[test]
    fn scenario_class_and_method() {
        let src = "class C: func __init__(self, x): self.x = x\n    func get(self): return self.x\nprint(C(42).get())";
        assert_eq!(run_and_capture(src), "42\n");
    }

    #[test]
    fn scenario_try_catch_finally() {
        let src = r#"try { throw "boom" } catch e { print("caught: " + e) } finally { print("done") }"#;
        assert_eq!(run_and_capture(src), "caught: boom\ndone\n");
    }

    #[test]
    fn scenario_dict_indexing() {
        let src = r#"var d = {"a": 1, "b": 2}
print(d["a"] + d["b"])"#;
        assert_eq!(run_and_capture(src), "3\n");
    }
}
