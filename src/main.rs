mod debugger;
mod repl;

use std::env;
use std::ffi::CString;
use std::path::Path;
use std::process;

use anyhow::{Context, Result};
use log::{error, info, LevelFilter};
use nix::sys::ptrace;
use nix::unistd::{execv, fork, ForkResult};

use debugger::core::Debugger;
use repl::Repl;

/// RUSTDBG - Linux-only, Rust-based, source-level native debugger
fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("rustdbg", LevelFilter::Debug)
        .format_timestamp_secs()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    let target_program = match args[1].as_str() {
        "-v" | "--version" => {
            println!("RUSTDBG v{}", env!("CARGO_PKG_VERSION"));
            process::exit(0);
        }
        "-h" | "--help" => {
            print_usage(&args[0]);
            process::exit(0);
        }
        arg => arg.to_string(),
    };

    if !Path::new(&target_program).exists() {
        error!("Target program not found: {}", target_program);
        process::exit(1);
    }

    match unsafe { fork() }.context("failed to fork debuggee")? {
        ForkResult::Child => {
            if let Err(err) = execute_debuggee(&target_program) {
                eprintln!("failed to start target: {:#}", err);
                process::exit(1);
            }
            unreachable!("exec returned without error");
        }
        ForkResult::Parent { child } => {
            info!("spawned target {} as pid {}", target_program, child);
            let debugger = Debugger::new(&target_program, child)?;
            Repl::new(debugger).run()
        }
    }
}

/// Mark the child traceable and exec the target with no arguments.
fn execute_debuggee(path: &str) -> Result<()> {
    ptrace::traceme().context("failed to mark child as traceable")?;
    let program = CString::new(path).context("target path contains a NUL byte")?;
    execv(&program, &[program.clone()]).context("failed to exec target")?;
    Ok(())
}

/// Print usage information
fn print_usage(program_name: &str) {
    println!("RUSTDBG - Linux-only, Rust-based, source-level native debugger");
    println!("Usage: {} [options] program", program_name);
    println!();
    println!("Options:");
    println!("  -h, --help     Display this help message");
    println!("  -v, --version  Display version information");
    println!();
    println!("Type 'help' at the prompt for the command list.");
}
