//! `aquac <source.aqua> [-o out.acode] [-v]` — compiles AquaScript source
//! to a bytecode container file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use aquascript::diagnostics::Diagnostic;
use aquascript::{bytecode, lexer, parser};

struct Args {
    source: PathBuf,
    out: Option<PathBuf>,
    verbose: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut source = None;
    let mut out = None;
    let mut verbose = false;
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" => {
                let path = iter.next().ok_or("'-o' requires a path argument")?;
                out = Some(PathBuf::from(path));
            }
            "-v" | "--verbose" => verbose = true,
            other if source.is_none() => source = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument: '{other}'")),
        }
    }
    let source = source.ok_or("usage: aquac <source.aqua> [-o out.acode] [-v]")?;
    Ok(Args { source, out, verbose })
}

fn default_output_path(source: &Path) -> PathBuf {
    source.with_extension("acode")
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let source_text = match fs::read_to_string(&args.source) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: could not read '{}': {e}", args.source.display());
            return ExitCode::FAILURE;
        }
    };

    let path_str = args.source.display().to_string();
    let start = Instant::now();

    let tokens = match lexer::lex(&source_text) {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("{}", Diagnostic::from_lex(&e).render(&path_str));
            return ExitCode::FAILURE;
        }
    };
    if args.verbose {
        eprintln!("lexed {} tokens in {:?}", tokens.len(), start.elapsed());
    }

    let lex_done = Instant::now();
    let program = match parser::parse(tokens) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", Diagnostic::from_parse(&e).render(&path_str));
            return ExitCode::FAILURE;
        }
    };
    if args.verbose {
        eprintln!("parsed {} statements in {:?}", program.len(), lex_done.elapsed());
    }

    let parse_done = Instant::now();
    let code = match bytecode::compile(&program) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", Diagnostic::from_codegen(&e).render(&path_str));
            return ExitCode::FAILURE;
        }
    };
    if args.verbose {
        eprintln!(
            "generated {} instruction(s), {} function(s) in {:?}",
            code.instructions.len(),
            code.functions.len(),
            parse_done.elapsed()
        );
    }

    let codegen_done = Instant::now();
    let bytes = bytecode::container::serialize(&code);
    let out_path = args.out.unwrap_or_else(|| default_output_path(&args.source));
    if let Err(e) = fs::write(&out_path, &bytes) {
        eprintln!("error: could not write '{}': {e}", out_path.display());
        return ExitCode::FAILURE;
    }
    if args.verbose {
        eprintln!("serialized {} bytes to '{}' in {:?}", bytes.len(), out_path.display(), codegen_done.elapsed());
        eprintln!("total: {:?}", start.elapsed());
    }

    ExitCode::SUCCESS
}
