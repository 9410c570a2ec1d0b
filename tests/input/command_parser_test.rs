use rustdbg::{parse_command, Command, DebuggerError, Location};
use test_case::test_case;

#[test_case("continue" ; "full word")]
#[test_case("cont" ; "long prefix")]
#[test_case("c" ; "single letter")]
fn test_continue_prefixes(input: &str) {
    assert_eq!(parse_command(input).unwrap(), Command::Continue);
}

#[test_case("breakpoint set 0x1040" ; "full words")]
#[test_case("break set 0x1040" ; "command prefix")]
#[test_case("br s 0x1040" ; "both prefixed")]
fn test_breakpoint_at_address(input: &str) {
    assert_eq!(
        parse_command(input).unwrap(),
        Command::BreakpointSet(Location::Address(0x1040))
    );
}

#[test_case("breakpoint set main" => Location::Function("main".to_string()) ; "function name")]
#[test_case("breakpoint set main.c:12" => Location::Line { file: "main.c".to_string(), line: 12 } ; "file and line")]
#[test_case("breakpoint set 0xdeadbeef" => Location::Address(0xdead_beef) ; "hex address")]
fn test_breakpoint_locations(input: &str) -> Location {
    match parse_command(input).unwrap() {
        Command::BreakpointSet(location) => location,
        other => panic!("expected a breakpoint set command, got {:?}", other),
    }
}

#[test_case("b 0x1040" ; "breakpoint vs backtrace")]
#[test_case("ste" ; "step vs stepi")]
#[test_case("s" ; "step stepi symbol")]
fn test_ambiguous_prefixes(input: &str) {
    assert!(matches!(
        parse_command(input),
        Err(DebuggerError::AmbiguousCommand(_))
    ));
}

#[test_case("" ; "empty line")]
#[test_case("frobnicate" ; "unknown word")]
#[test_case("continueee" ; "overlong word")]
fn test_unknown_commands(input: &str) {
    assert!(matches!(
        parse_command(input),
        Err(DebuggerError::UnknownCommand(_))
    ));
}

#[test_case("breakpoint set" ; "no location")]
#[test_case("breakpoint remove" ; "no address")]
#[test_case("register read" ; "no register")]
#[test_case("register write rax" ; "no value")]
#[test_case("memory read" ; "no read address")]
#[test_case("memory write 0x1040" ; "no write value")]
#[test_case("symbol" ; "no symbol name")]
fn test_insufficient_arguments(input: &str) {
    assert!(matches!(
        parse_command(input),
        Err(DebuggerError::MissingArgument(_))
    ));
}

#[test_case("breakpoint set 0x" ; "empty digits")]
#[test_case("breakpoint remove 0xzz" ; "bad digits")]
#[test_case("memory read 1040" ; "missing prefix")]
#[test_case("register write rip 2a" ; "bare value")]
fn test_malformed_addresses(input: &str) {
    assert!(matches!(
        parse_command(input),
        Err(DebuggerError::InvalidAddress(_))
    ));
}

#[test]
fn test_execution_commands() {
    assert_eq!(parse_command("step").unwrap(), Command::Step);
    assert_eq!(parse_command("stepi").unwrap(), Command::StepInstruction);
    assert_eq!(parse_command("next").unwrap(), Command::Next);
    assert_eq!(parse_command("finish").unwrap(), Command::Finish);
}

#[test]
fn test_inspection_commands() {
    assert_eq!(parse_command("backtrace").unwrap(), Command::Backtrace);
    assert_eq!(parse_command("variables").unwrap(), Command::Variables);
    assert_eq!(
        parse_command("register dump").unwrap(),
        Command::RegisterDump
    );
}

#[test]
fn test_whitespace_is_insignificant() {
    assert_eq!(
        parse_command("  memory   read   0x1040  ").unwrap(),
        Command::MemoryRead(0x1040)
    );
}
