//! ZAM Virtual Machine entry point.
//!
//! Behavior summary:
//! - With `-h/--help`, print usage.
//! - With `-v/--version`, print the VM version.
//! - With `-o FILE`, load `FILE`, apply the APPLY/RETURN -> APPTERM peephole
//!   rewrite, then run it.
//! - With `FILE` alone, load and run it as written.
//!
//! Exit codes follow §6 of the design doc: 0 on a clean `STOP`, 2 on a
//! missing file or a load-time error, 1 on a runtime fault or an uncaught
//! `RAISE`.

use std::env;
use std::fs;
use std::process;

use zam_vm::program::Program;
use zam_vm::vm;

/// Human-facing version string, printed by `-v/--version`.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Construct the help/usage text shown for `-h/--help`.
fn usage() -> String {
    format!(
        r#"ZAM Virtual Machine v{0}

Usage:
    zam [-o] FILE

Arguments:
    FILE
        Path to a program in the ZAM textual bytecode format.

Options:
    -o
        Apply the APPLY/RETURN -> APPTERM peephole rewrite before running.
    -h, --help
        Show this help message and exit.
    -v, --version
        Show the VM version."#,
        VERSION
    )
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("{}", usage());
        process::exit(2);
    }

    if args[1] == "-h" || args[1] == "--help" {
        println!("{}", usage());
        return;
    }

    if args[1] == "-v" || args[1] == "--version" {
        println!("zam-vm v{}", VERSION);
        return;
    }

    let (optimize, path) = if args[1] == "-o" {
        match args.get(2) {
            Some(path) => (true, path),
            None => {
                eprintln!("{}", usage());
                process::exit(2);
            }
        }
    } else {
        (false, &args[1])
    };

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}: {}", path, e);
            process::exit(2);
        }
    };

    let program = match Program::load(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };
    let program = if optimize {
        program.peephole_optimize()
    } else {
        program
    };

    match vm::run(&program) {
        Ok(result) => println!("{}", result.display()),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
