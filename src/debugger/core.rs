use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use nix::unistd::Pid;
use object::{Object, ObjectKind};

use crate::debugger::address::AddressSpace;
use crate::debugger::breakpoint::Breakpoint;
use crate::debugger::dwarf::DebugInfo;
use crate::debugger::error::DebuggerError;
use crate::debugger::process::{StopEvent, TracedProcess};
use crate::debugger::registers::{self, Register};
use crate::debugger::source;
use crate::debugger::symbols::{Symbol, SymbolIndex};
use crate::debugger::variables::{self, Variable};

/// One debug session: a traced process, its debug information, and the
/// breakpoint table, tied together by the session's address translation.
///
/// The control loop is strictly synchronous: every resume is immediately
/// followed by a blocking wait, so the debugger and the target alternate
/// between running and stopped.
pub struct Debugger {
    /// Path to the target binary
    target_path: String,
    /// Ptrace handle on the traced process
    process: TracedProcess,
    /// Static<->runtime translation, fixed for the session
    address_space: AddressSpace,
    /// DWARF query surface
    debug_info: DebugInfo,
    /// ELF symbol tables, name-indexed
    symbols: SymbolIndex,
    /// Operator-visible breakpoints plus temporaries, by runtime address
    breakpoints: HashMap<u64, Breakpoint>,
    /// Cleared once the target exits or is killed
    running: bool,
}

impl Debugger {
    /// Attach to a freshly spawned traced process.
    ///
    /// Blocks until the target's first stop, then loads debug information
    /// and discovers the load offset.
    pub fn new(target_path: &str, pid: Pid) -> Result<Self> {
        let data = fs::read(target_path)
            .with_context(|| format!("failed to read target binary {}", target_path))?;
        let object = object::File::parse(&*data)
            .with_context(|| format!("failed to parse target binary {}", target_path))?;
        let relocatable = object.kind() == ObjectKind::Dynamic;
        let debug_info = DebugInfo::load(&object)?;
        let symbols = SymbolIndex::load(&object);
        debug!("indexed {} symbols from {}", symbols.len(), target_path);

        let process = TracedProcess::new(pid);
        process.wait_for_launch()?;
        let address_space = AddressSpace::discover(pid, relocatable)?;
        info!(
            "attached to pid {} (load offset 0x{:x})",
            pid,
            address_space.offset()
        );

        Ok(Self {
            target_path: target_path.to_string(),
            process,
            address_space,
            debug_info,
            symbols,
            breakpoints: HashMap::new(),
            running: true,
        })
    }

    /// Get the traced process id
    pub fn pid(&self) -> Pid {
        self.process.pid()
    }

    /// Get the path of the target binary
    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    /// Check if the target is still alive
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Fail with `TargetExited` unless the target is still alive.
    pub fn ensure_running(&self) -> Result<()> {
        if !self.running {
            return Err(DebuggerError::TargetExited.into());
        }
        Ok(())
    }

    fn get_pc(&self) -> Result<u64> {
        registers::read_register(self.process.pid(), Register::Rip)
    }

    /// Current program counter translated into the debug-info space.
    fn offset_pc(&self) -> Result<u64> {
        Ok(self.address_space.to_static(self.get_pc()?))
    }

    // ---- breakpoints ------------------------------------------------

    /// Plant an enabled breakpoint at a runtime address.
    pub fn set_breakpoint(&mut self, address: u64) -> Result<u64> {
        self.ensure_running()?;
        if self.breakpoints.contains_key(&address) {
            warn!("breakpoint at 0x{:x} already exists", address);
            return Ok(address);
        }
        let mut breakpoint = Breakpoint::new(self.process.pid(), address);
        breakpoint.enable()?;
        self.breakpoints.insert(address, breakpoint);
        debug!("set breakpoint at 0x{:x}", address);
        Ok(address)
    }

    /// Plant a breakpoint past the prologue of a named function.
    pub fn set_breakpoint_at_function(&mut self, name: &str) -> Result<u64> {
        let static_addr = self.debug_info.address_of_function(name)?;
        self.set_breakpoint(self.address_space.to_runtime(static_addr))
    }

    /// Plant a breakpoint at a statement boundary of `file:line`.
    pub fn set_breakpoint_at_line(&mut self, file: &str, line: u64) -> Result<u64> {
        let static_addr = self.debug_info.address_of_line(file, line)?;
        self.set_breakpoint(self.address_space.to_runtime(static_addr))
    }

    /// Restore the original byte and drop the breakpoint.
    pub fn remove_breakpoint(&mut self, address: u64) -> Result<()> {
        match self.breakpoints.remove(&address) {
            Some(mut breakpoint) => {
                if breakpoint.is_enabled() && self.running {
                    breakpoint.disable()?;
                }
                debug!("removed breakpoint at 0x{:x}", address);
                Ok(())
            }
            None => {
                warn!("no breakpoint at 0x{:x}", address);
                Ok(())
            }
        }
    }

    /// Get the number of breakpoints currently in the table
    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.len()
    }

    // ---- execution --------------------------------------------------

    /// Resume the target until its next stop.
    pub fn continue_execution(&mut self) -> Result<()> {
        self.ensure_running()?;
        self.step_over_breakpoint()?;
        self.process.resume()?;
        self.wait_for_stop()
    }

    /// Execute the patched-over instruction when stopped on a breakpoint.
    ///
    /// Disable, single-step, re-enable; must run before every resume so
    /// the trap opcode itself is never executed.
    fn step_over_breakpoint(&mut self) -> Result<()> {
        let pc = self.get_pc()?;
        let on_breakpoint = self
            .breakpoints
            .get(&pc)
            .map_or(false, Breakpoint::is_enabled);
        if !on_breakpoint {
            return Ok(());
        }
        if let Some(bp) = self.breakpoints.get_mut(&pc) {
            bp.disable()?;
        }
        self.process.single_step()?;
        self.wait_after_step()?;
        if self.running {
            if let Some(bp) = self.breakpoints.get_mut(&pc) {
                bp.enable()?;
            }
        }
        Ok(())
    }

    /// Execute exactly one instruction.
    pub fn single_step_instruction(&mut self) -> Result<()> {
        self.ensure_running()?;
        self.process.single_step()?;
        self.wait_after_step()
    }

    /// Execute one instruction, stepping through a breakpoint if the
    /// program counter sits on one.
    pub fn single_step_instruction_with_breakpoint_check(&mut self) -> Result<()> {
        self.ensure_running()?;
        let pc = self.get_pc()?;
        if self.breakpoints.contains_key(&pc) {
            self.step_over_breakpoint()
        } else {
            self.single_step_instruction()
        }
    }

    /// Step until the source line under the program counter changes.
    pub fn step_in(&mut self) -> Result<()> {
        self.ensure_running()?;
        let line = self.debug_info.line_entry_containing(self.offset_pc()?)?.line;
        while self.debug_info.line_entry_containing(self.offset_pc()?)?.line == line {
            self.single_step_instruction_with_breakpoint_check()?;
            if !self.running {
                return Ok(());
            }
        }
        self.print_source_at_pc()
    }

    /// Run until the current function returns to its caller.
    ///
    /// Reads the return address through the frame-pointer chain and
    /// continues to a breakpoint planted there, removing it afterwards if
    /// it was this call's own.
    pub fn step_out(&mut self) -> Result<()> {
        self.ensure_running()?;
        let frame_pointer = registers::read_register(self.process.pid(), Register::Rbp)?;
        let return_address = self.process.read_word(frame_pointer + 8)?;
        let planted = !self.breakpoints.contains_key(&return_address);
        if planted {
            self.set_breakpoint(return_address)?;
        }
        self.continue_execution()?;
        if planted {
            self.remove_breakpoint(return_address)?;
        }
        Ok(())
    }

    /// Step over the current source line without entering calls.
    ///
    /// Plants temporary breakpoints on every other line of the current
    /// function plus the caller's return address, resumes once, then
    /// removes everything it planted regardless of which one was hit.
    pub fn step_over(&mut self) -> Result<()> {
        self.ensure_running()?;
        let pc = self.offset_pc()?;
        let function = self.debug_info.function_containing(pc)?;
        let start_entry = self.debug_info.line_entry_containing(pc)?;

        let mut planted = Vec::new();
        let entries = self
            .debug_info
            .line_entries_in_range(function.low_pc, function.high_pc)?;
        for entry in entries {
            if entry.address == start_entry.address {
                continue;
            }
            let runtime = self.address_space.to_runtime(entry.address);
            if self.breakpoints.contains_key(&runtime) {
                continue;
            }
            self.set_breakpoint(runtime)?;
            planted.push(runtime);
        }

        let frame_pointer = registers::read_register(self.process.pid(), Register::Rbp)?;
        let return_address = self.process.read_word(frame_pointer + 8)?;
        if !self.breakpoints.contains_key(&return_address) {
            self.set_breakpoint(return_address)?;
            planted.push(return_address);
        }

        self.continue_execution()?;

        for address in planted {
            self.remove_breakpoint(address)?;
        }
        Ok(())
    }

    /// Block until the next stop and report it to the operator.
    fn wait_for_stop(&mut self) -> Result<()> {
        match self.process.wait_for_stop()? {
            StopEvent::BreakpointHit { address } => {
                println!("Hit breakpoint at address 0x{:x}", address);
                self.print_source_at_pc()?;
            }
            StopEvent::SingleStepDone => {}
            StopEvent::SignalDelivered(signal) => {
                println!("Got signal {}", signal);
            }
            StopEvent::Exited(code) => {
                self.running = false;
                println!("Process {} exited with status {}", self.process.pid(), code);
            }
            StopEvent::Terminated(signal) => {
                self.running = false;
                println!("Process {} terminated by signal {}", self.process.pid(), signal);
            }
        }
        Ok(())
    }

    /// Wait out an internal single-step.
    ///
    /// Suppresses the breakpoint-hit notification (the step is invisible
    /// to the operator) but still reports signals and process death.
    fn wait_after_step(&mut self) -> Result<()> {
        match self.process.wait_for_stop()? {
            StopEvent::SignalDelivered(signal) => {
                println!("Got signal {}", signal);
            }
            StopEvent::Exited(code) => {
                self.running = false;
                println!("Process {} exited with status {}", self.process.pid(), code);
            }
            StopEvent::Terminated(signal) => {
                self.running = false;
                println!("Process {} terminated by signal {}", self.process.pid(), signal);
            }
            StopEvent::BreakpointHit { .. } | StopEvent::SingleStepDone => {}
        }
        Ok(())
    }

    // ---- inspection -------------------------------------------------

    /// Print the source window around the current stop location.
    pub fn print_source_at_pc(&self) -> Result<()> {
        let entry = self.debug_info.line_entry_containing(self.offset_pc()?)?;
        source::print_source(&entry.path, entry.line, source::DEFAULT_CONTEXT)
    }

    /// Walk the frame-pointer chain and print one line per frame.
    ///
    /// Stops once the resolved function is the program's entry function.
    /// Assumes the target keeps frame pointers; this is not a CFI unwinder.
    pub fn print_backtrace(&self) -> Result<()> {
        self.ensure_running()?;
        let mut current = self.debug_info.function_containing(self.offset_pc()?)?;
        println!("frame #0: 0x{:x} {}", current.low_pc, current.name);

        let mut frame_pointer = registers::read_register(self.process.pid(), Register::Rbp)?;
        let mut return_address = self.process.read_word(frame_pointer + 8)?;
        let mut frame_number = 1;
        while current.name != "main" {
            current = self
                .debug_info
                .function_containing(self.address_space.to_static(return_address))?;
            println!("frame #{}: 0x{:x} {}", frame_number, current.low_pc, current.name);
            frame_number += 1;
            frame_pointer = self.process.read_word(frame_pointer)?;
            return_address = self.process.read_word(frame_pointer + 8)?;
        }
        Ok(())
    }

    /// Read every variable of the function containing the program counter.
    pub fn read_variables(&self) -> Result<Vec<Variable>> {
        self.ensure_running()?;
        variables::read_variables(
            &self.debug_info,
            &self.process,
            &self.address_space,
            self.offset_pc()?,
        )
    }

    /// Read one machine word of target memory.
    pub fn read_memory(&self, address: u64) -> Result<u64> {
        self.ensure_running()?;
        self.process.read_word(address)
    }

    /// Write one machine word of target memory.
    pub fn write_memory(&self, address: u64, value: u64) -> Result<()> {
        self.ensure_running()?;
        self.process.write_word(address, value)
    }

    /// Find every ELF symbol with the given name.
    pub fn lookup_symbol(&self, name: &str) -> Vec<&Symbol> {
        self.symbols.lookup(name)
    }
}
