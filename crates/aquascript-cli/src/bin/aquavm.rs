//! `aquavm <file.acode> [--debug] [--no-stats]` — loads and runs a
//! compiled AquaScript bytecode container to completion.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use aquascript::bytecode::container;
use aquascript::Vm;

struct Args {
    file: PathBuf,
    debug: bool,
    no_stats: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut file = None;
    let mut debug = false;
    let mut no_stats = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--debug" => debug = true,
            "--no-stats" => no_stats = true,
            other if file.is_none() => file = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument: '{other}'")),
        }
    }
    let file = file.ok_or("usage: aquavm <file.acode> [--debug] [--no-stats]")?;
    Ok(Args { file, debug, no_stats })
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let bytes = match fs::read(&args.file) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("error: could not read '{}': {e}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    let code = match container::deserialize(&bytes) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut vm = Vm::new(code);
    vm.set_debug(args.debug);

    let start = Instant::now();
    let result = vm.run();
    let elapsed = start.elapsed();

    if let Err(e) = result {
        eprintln!("{e}");
        if args.debug {
            eprint_debug_tail(&vm);
        }
        return ExitCode::FAILURE;
    }

    if !args.no_stats {
        let stats = vm.stats();
        eprintln!(
            "instructions: {} | calls: {} | peak stack depth: {} | peak call depth: {} | elapsed: {elapsed:?}",
            stats.instructions_executed, stats.function_calls, stats.peak_stack_depth, stats.peak_call_depth,
        );
    }

    ExitCode::SUCCESS
}

/// `--debug`'s extra failure output: the tail of the operand stack and the
/// globals array, per spec.md §7.
fn eprint_debug_tail(vm: &Vm) {
    eprintln!("stack (top 10): {:?}", vm.stack_tail(10));
    eprintln!("globals: {:?}", vm.globals_snapshot());
}
