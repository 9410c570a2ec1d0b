use thiserror::Error;

/// Recoverable failures reported to the operator.
///
/// Anything not covered here (ptrace failures, wait failures, a missing
/// target binary) propagates as a plain `anyhow` error and ends the session.
#[derive(Debug, Error)]
pub enum DebuggerError {
    /// No symbol table entry or subprogram matches the requested name
    #[error("no symbol named '{0}'")]
    SymbolNotFound(String),

    /// No subprogram range contains the address
    #[error("no function contains address 0x{0:x}")]
    FunctionNotFound(u64),

    /// The address has no associated line-table entry
    #[error("no line entry for address 0x{0:x}")]
    LineNotFound(u64),

    /// No statement boundary at the requested source line
    #[error("no code at {file}:{line}")]
    LineAddressNotFound { file: String, line: u64 },

    /// Register name not present in the descriptor table
    #[error("unknown register '{0}'")]
    UnknownRegister(String),

    /// DWARF register number not present in the descriptor table
    #[error("unknown DWARF register number {0}")]
    UnknownDwarfRegister(u16),

    /// A location expression kind the evaluator does not implement
    #[error("unsupported location expression for variable '{0}'")]
    UnsupportedLocation(String),

    /// The source file recorded in the line table could not be read
    #[error("failed to read source file {0}")]
    SourceUnavailable(String),

    /// Malformed address or value, expected 0x-prefixed hexadecimal
    #[error("failed to parse '{0}', expected format: 0xADDRESS")]
    InvalidAddress(String),

    /// Command word matched no known command
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Command word is a prefix of more than one command
    #[error("ambiguous command '{0}'")]
    AmbiguousCommand(String),

    /// Command was given too few arguments
    #[error("insufficient arguments, usage: {0}")]
    MissingArgument(&'static str),

    /// An execution command was issued after the target exited
    #[error("the target process is not running")]
    TargetExited,
}
