//! RUSTDBG - Linux-only, Rust-based, source-level native debugger
//!
//! This library provides the core functionality of the RUSTDBG debugger:
//! breakpoint patching, ptrace process control, load-address translation,
//! DWARF symbolication, and the stepping state machine. It can be used as
//! a standalone binary or as a library for testing.

pub mod debugger;
pub mod repl;

/// Re-export key types for easier access in tests
pub use debugger::core::Debugger;
pub use debugger::error::DebuggerError;
pub use repl::{parse_command, Command, Location, Repl};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Initialize the logging system
pub fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .filter_module("rustdbg", level)
        .format_timestamp_secs()
        .init();
}
