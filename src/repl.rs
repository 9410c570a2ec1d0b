use anyhow::Result;
use log::error;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::debugger::core::Debugger;
use crate::debugger::error::DebuggerError;
use crate::debugger::registers;

/// Parsed operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Continue,
    BreakpointSet(Location),
    BreakpointRemove(u64),
    RegisterDump,
    RegisterRead(String),
    RegisterWrite(String, u64),
    MemoryRead(u64),
    MemoryWrite(u64, u64),
    SymbolLookup(String),
    Step,
    Next,
    Finish,
    StepInstruction,
    Backtrace,
    Variables,
    Help,
    Quit,
}

/// Breakpoint target accepted by `breakpoint set`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Runtime address
    Address(u64),
    /// Source position, resolved through the line table
    Line { file: String, line: u64 },
    /// Function name, resolved past its prologue
    Function(String),
}

const COMMANDS: &[&str] = &[
    "backtrace",
    "breakpoint",
    "continue",
    "finish",
    "help",
    "lookup",
    "memory",
    "next",
    "quit",
    "register",
    "step",
    "stepi",
    "symbol",
    "variables",
];

/// Match a word against candidates by unambiguous prefix.
///
/// An exact match always wins, so `step` is never shadowed by `stepi`.
fn match_word<'a>(word: &str, candidates: &[&'a str]) -> Result<&'a str, DebuggerError> {
    if let Some(exact) = candidates.iter().find(|c| **c == word) {
        return Ok(exact);
    }
    let matches: Vec<&str> = candidates
        .iter()
        .copied()
        .filter(|c| !word.is_empty() && c.starts_with(word))
        .collect();
    match matches.as_slice() {
        [single] => Ok(single),
        [] => Err(DebuggerError::UnknownCommand(word.to_string())),
        _ => Err(DebuggerError::AmbiguousCommand(word.to_string())),
    }
}

/// Parse a 0x-prefixed hexadecimal address or value.
pub fn parse_address(text: &str) -> Result<u64, DebuggerError> {
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| DebuggerError::InvalidAddress(text.to_string()))?;
    u64::from_str_radix(digits, 16).map_err(|_| DebuggerError::InvalidAddress(text.to_string()))
}

/// Parse a breakpoint target: address, file:line, or function name.
fn parse_location(text: &str) -> Result<Location, DebuggerError> {
    if text.starts_with("0x") {
        return Ok(Location::Address(parse_address(text)?));
    }
    if let Some((file, line)) = text.rsplit_once(':') {
        if let Ok(line) = line.parse::<u64>() {
            return Ok(Location::Line {
                file: file.to_string(),
                line,
            });
        }
    }
    Ok(Location::Function(text.to_string()))
}

/// Parse one operator input line into a command.
pub fn parse_command(line: &str) -> Result<Command, DebuggerError> {
    let mut tokens = line.split_whitespace();
    let head = tokens
        .next()
        .ok_or_else(|| DebuggerError::UnknownCommand(String::new()))?;

    match match_word(head, COMMANDS)? {
        "continue" => Ok(Command::Continue),
        "breakpoint" => {
            let sub = tokens
                .next()
                .ok_or(DebuggerError::MissingArgument("breakpoint <set|remove> ..."))?;
            match match_word(sub, &["set", "remove"])? {
                "set" => {
                    let target = tokens.next().ok_or(DebuggerError::MissingArgument(
                        "breakpoint set <0xADDR|file:line|function>",
                    ))?;
                    Ok(Command::BreakpointSet(parse_location(target)?))
                }
                "remove" => {
                    let target = tokens
                        .next()
                        .ok_or(DebuggerError::MissingArgument("breakpoint remove <0xADDR>"))?;
                    Ok(Command::BreakpointRemove(parse_address(target)?))
                }
                _ => unreachable!(),
            }
        }
        "register" => {
            let sub = tokens
                .next()
                .ok_or(DebuggerError::MissingArgument("register <dump|read|write> ..."))?;
            match match_word(sub, &["dump", "read", "write"])? {
                "dump" => Ok(Command::RegisterDump),
                "read" => {
                    let name = tokens
                        .next()
                        .ok_or(DebuggerError::MissingArgument("register read <name>"))?;
                    Ok(Command::RegisterRead(name.to_string()))
                }
                "write" => {
                    let name = tokens
                        .next()
                        .ok_or(DebuggerError::MissingArgument("register write <name> <0xVALUE>"))?;
                    let value = tokens
                        .next()
                        .ok_or(DebuggerError::MissingArgument("register write <name> <0xVALUE>"))?;
                    Ok(Command::RegisterWrite(name.to_string(), parse_address(value)?))
                }
                _ => unreachable!(),
            }
        }
        "memory" => {
            let sub = tokens
                .next()
                .ok_or(DebuggerError::MissingArgument("memory <read|write> ..."))?;
            match match_word(sub, &["read", "write"])? {
                "read" => {
                    let address = tokens
                        .next()
                        .ok_or(DebuggerError::MissingArgument("memory read <0xADDR>"))?;
                    Ok(Command::MemoryRead(parse_address(address)?))
                }
                "write" => {
                    let address = tokens
                        .next()
                        .ok_or(DebuggerError::MissingArgument("memory write <0xADDR> <0xVALUE>"))?;
                    let value = tokens
                        .next()
                        .ok_or(DebuggerError::MissingArgument("memory write <0xADDR> <0xVALUE>"))?;
                    Ok(Command::MemoryWrite(parse_address(address)?, parse_address(value)?))
                }
                _ => unreachable!(),
            }
        }
        "symbol" | "lookup" => {
            let name = tokens
                .next()
                .ok_or(DebuggerError::MissingArgument("symbol <name>"))?;
            Ok(Command::SymbolLookup(name.to_string()))
        }
        "step" => Ok(Command::Step),
        "next" => Ok(Command::Next),
        "finish" => Ok(Command::Finish),
        "stepi" => Ok(Command::StepInstruction),
        "backtrace" => Ok(Command::Backtrace),
        "variables" => Ok(Command::Variables),
        "help" => Ok(Command::Help),
        "quit" => Ok(Command::Quit),
        _ => unreachable!(),
    }
}

/// Interactive command loop driving one debug session.
pub struct Repl {
    debugger: Debugger,
}

impl Repl {
    pub fn new(debugger: Debugger) -> Self {
        Self { debugger }
    }

    /// Read and dispatch commands until quit, end-of-input, or a fatal
    /// process-control failure.
    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new()?;
        loop {
            match editor.readline("rustdbg> ") {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(line);
                    match parse_command(line) {
                        Ok(Command::Quit) => break,
                        Ok(command) => {
                            if let Err(err) = self.dispatch(command) {
                                // Lookup and input errors are recoverable;
                                // anything else is a process-control failure
                                // and ends the session.
                                if err.downcast_ref::<DebuggerError>().is_some() {
                                    eprintln!("error: {}", err);
                                } else {
                                    error!("fatal: {:#}", err);
                                    return Err(err);
                                }
                            }
                        }
                        Err(err) => eprintln!("error: {}", err),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Continue => self.debugger.continue_execution(),
            Command::BreakpointSet(location) => {
                let address = match location {
                    Location::Address(address) => self.debugger.set_breakpoint(address)?,
                    Location::Line { file, line } => {
                        self.debugger.set_breakpoint_at_line(&file, line)?
                    }
                    Location::Function(name) => self.debugger.set_breakpoint_at_function(&name)?,
                };
                println!("Breakpoint set at 0x{:x}", address);
                Ok(())
            }
            Command::BreakpointRemove(address) => {
                self.debugger.remove_breakpoint(address)?;
                println!("Breakpoint removed from 0x{:x}", address);
                Ok(())
            }
            Command::RegisterDump => {
                self.debugger.ensure_running()?;
                for (name, value) in registers::dump_registers(self.debugger.pid())? {
                    println!("{:<8} 0x{:016x}", name, value);
                }
                Ok(())
            }
            Command::RegisterRead(name) => {
                self.debugger.ensure_running()?;
                let reg = registers::register_by_name(&name)?;
                let value = registers::read_register(self.debugger.pid(), reg)?;
                println!("0x{:016x}", value);
                Ok(())
            }
            Command::RegisterWrite(name, value) => {
                self.debugger.ensure_running()?;
                let reg = registers::register_by_name(&name)?;
                registers::write_register(self.debugger.pid(), reg, value)
            }
            Command::MemoryRead(address) => {
                let value = self.debugger.read_memory(address)?;
                println!("0x{:016x}", value);
                Ok(())
            }
            Command::MemoryWrite(address, value) => self.debugger.write_memory(address, value),
            Command::SymbolLookup(name) => {
                let matches = self.debugger.lookup_symbol(&name);
                if matches.is_empty() {
                    return Err(DebuggerError::SymbolNotFound(name).into());
                }
                for symbol in matches {
                    println!("{}", symbol);
                }
                Ok(())
            }
            Command::Step => self.debugger.step_in(),
            Command::Next => self.debugger.step_over(),
            Command::Finish => self.debugger.step_out(),
            Command::StepInstruction => {
                self.debugger.single_step_instruction_with_breakpoint_check()?;
                self.debugger.print_source_at_pc()
            }
            Command::Backtrace => self.debugger.print_backtrace(),
            Command::Variables => {
                for variable in self.debugger.read_variables()? {
                    println!("{}", variable);
                }
                Ok(())
            }
            Command::Help => {
                print_help();
                Ok(())
            }
            // Quit is handled by the loop
            Command::Quit => Ok(()),
        }
    }
}

fn print_help() {
    println!("Commands (unambiguous prefixes accepted):");
    println!("  breakpoint set <0xADDR|file:line|function>");
    println!("  breakpoint remove <0xADDR>");
    println!("  register dump | read <name> | write <name> <0xVALUE>");
    println!("  memory read <0xADDR> | write <0xADDR> <0xVALUE>");
    println!("  symbol <name>");
    println!("  continue | step | next | finish | stepi");
    println!("  backtrace | variables");
    println!("  help | quit");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_command_words() {
        assert_eq!(parse_command("continue").unwrap(), Command::Continue);
        assert_eq!(parse_command("backtrace").unwrap(), Command::Backtrace);
        assert_eq!(parse_command("variables").unwrap(), Command::Variables);
        assert_eq!(parse_command("finish").unwrap(), Command::Finish);
    }

    #[test]
    fn test_unambiguous_prefixes() {
        assert_eq!(parse_command("c").unwrap(), Command::Continue);
        assert_eq!(parse_command("ba").unwrap(), Command::Backtrace);
        assert_eq!(parse_command("n").unwrap(), Command::Next);
        assert_eq!(parse_command("f").unwrap(), Command::Finish);
        assert_eq!(parse_command("v").unwrap(), Command::Variables);
    }

    #[test]
    fn test_exact_match_beats_longer_candidates() {
        // "step" is both a command and a prefix of "stepi"
        assert_eq!(parse_command("step").unwrap(), Command::Step);
        assert_eq!(parse_command("stepi").unwrap(), Command::StepInstruction);
    }

    #[test]
    fn test_ambiguous_prefix_is_rejected() {
        assert!(matches!(
            parse_command("b 0x1040"),
            Err(DebuggerError::AmbiguousCommand(_))
        ));
        assert!(matches!(
            parse_command("ste"),
            Err(DebuggerError::AmbiguousCommand(_))
        ));
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            parse_command("foobar"),
            Err(DebuggerError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_breakpoint_set_address() {
        assert_eq!(
            parse_command("breakpoint set 0x1040").unwrap(),
            Command::BreakpointSet(Location::Address(0x1040))
        );
        // subcommand prefixes work too
        assert_eq!(
            parse_command("br s 0x1040").unwrap(),
            Command::BreakpointSet(Location::Address(0x1040))
        );
    }

    #[test]
    fn test_breakpoint_set_file_line() {
        assert_eq!(
            parse_command("breakpoint set main.c:12").unwrap(),
            Command::BreakpointSet(Location::Line {
                file: "main.c".to_string(),
                line: 12
            })
        );
    }

    #[test]
    fn test_breakpoint_set_function() {
        assert_eq!(
            parse_command("breakpoint set main").unwrap(),
            Command::BreakpointSet(Location::Function("main".to_string()))
        );
    }

    #[test]
    fn test_breakpoint_remove() {
        assert_eq!(
            parse_command("breakpoint remove 0x1040").unwrap(),
            Command::BreakpointRemove(0x1040)
        );
    }

    #[test]
    fn test_malformed_address_is_rejected() {
        assert!(matches!(
            parse_command("breakpoint set 0xzz"),
            Err(DebuggerError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_command("memory read 1040"),
            Err(DebuggerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_missing_arguments() {
        assert!(matches!(
            parse_command("breakpoint set"),
            Err(DebuggerError::MissingArgument(_))
        ));
        assert!(matches!(
            parse_command("register write rax"),
            Err(DebuggerError::MissingArgument(_))
        ));
        assert!(matches!(
            parse_command("memory write 0x1040"),
            Err(DebuggerError::MissingArgument(_))
        ));
    }

    #[test]
    fn test_register_commands() {
        assert_eq!(parse_command("register dump").unwrap(), Command::RegisterDump);
        assert_eq!(
            parse_command("register read rax").unwrap(),
            Command::RegisterRead("rax".to_string())
        );
        assert_eq!(
            parse_command("register write rax 0x2a").unwrap(),
            Command::RegisterWrite("rax".to_string(), 0x2a)
        );
    }

    #[test]
    fn test_memory_commands() {
        assert_eq!(
            parse_command("memory read 0x1040").unwrap(),
            Command::MemoryRead(0x1040)
        );
        assert_eq!(
            parse_command("memory write 0x1040 0xff").unwrap(),
            Command::MemoryWrite(0x1040, 0xff)
        );
    }

    #[test]
    fn test_symbol_lookup_spellings() {
        assert_eq!(
            parse_command("symbol main").unwrap(),
            Command::SymbolLookup("main".to_string())
        );
        assert_eq!(
            parse_command("lookup main").unwrap(),
            Command::SymbolLookup("main".to_string())
        );
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x1040").unwrap(), 0x1040);
        assert_eq!(parse_address("0xdeadbeef").unwrap(), 0xdead_beef);
        assert!(parse_address("1040").is_err());
        assert!(parse_address("0x").is_err());
        assert!(parse_address("0xgg").is_err());
    }
}
