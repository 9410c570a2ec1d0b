use anyhow::{bail, Context, Result};
use libc::c_int;
use log::debug;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use crate::debugger::registers::{self, Register};

// SIGTRAP si_code values (asm-generic/siginfo.h)
const SI_KERNEL: c_int = 128;
const TRAP_BRKPT: c_int = 1;
const TRAP_TRACE: c_int = 2;

/// Why the traced process stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopEvent {
    /// A planted breakpoint trapped; the program counter has been rewound
    /// to the patched instruction's address
    BreakpointHit { address: u64 },
    /// A single instruction finished executing
    SingleStepDone,
    /// Some other signal was delivered to the target
    SignalDelivered(Signal),
    /// The target exited with a status code
    Exited(i32),
    /// The target was killed by a signal
    Terminated(Signal),
}

/// Thin wrapper over the ptrace control surface for one traced process.
///
/// Every operation is fallible; the session treats a failed syscall as
/// fatal. Resuming and waiting strictly alternate: each resume is followed
/// by a blocking wait before the next command is processed.
#[derive(Debug, Clone, Copy)]
pub struct TracedProcess {
    pid: Pid,
}

impl TracedProcess {
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    /// Get the process id of the traced process
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Resume the target until its next stop.
    pub fn resume(&self) -> Result<()> {
        ptrace::cont(self.pid, None).context("failed to resume target")?;
        Ok(())
    }

    /// Execute exactly one instruction in the target.
    pub fn single_step(&self) -> Result<()> {
        ptrace::step(self.pid, None).context("failed to single-step target")?;
        Ok(())
    }

    /// Read one machine word of target memory.
    pub fn read_word(&self, address: u64) -> Result<u64> {
        let word = ptrace::read(self.pid, address as ptrace::AddressType)
            .with_context(|| format!("failed to read memory at 0x{:x}", address))?;
        Ok(word as u64)
    }

    /// Write one machine word of target memory.
    pub fn write_word(&self, address: u64, value: u64) -> Result<()> {
        ptrace::write(self.pid, address as ptrace::AddressType, value as i64)
            .with_context(|| format!("failed to write memory at 0x{:x}", address))?;
        Ok(())
    }

    /// Block until the initial exec-stop after spawning the target.
    ///
    /// The debug session begins only once this stop has been observed.
    pub fn wait_for_launch(&self) -> Result<()> {
        waitpid(self.pid, None).context("failed to wait for target launch")?;
        Ok(())
    }

    /// Block until the target stops, then classify the stop.
    ///
    /// A breakpoint trap reports at `pc - 1` (the byte after the trap
    /// opcode); the program counter is rewound here so every address the
    /// caller sees is the patched instruction's own.
    pub fn wait_for_stop(&self) -> Result<StopEvent> {
        let status = waitpid(self.pid, None).context("failed to wait for target stop")?;
        match status {
            WaitStatus::Exited(_, code) => Ok(StopEvent::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Ok(StopEvent::Terminated(signal)),
            WaitStatus::Stopped(_, Signal::SIGTRAP) => self.classify_trap(),
            WaitStatus::Stopped(_, signal) => Ok(StopEvent::SignalDelivered(signal)),
            other => bail!("unexpected wait status: {:?}", other),
        }
    }

    fn classify_trap(&self) -> Result<StopEvent> {
        let info = ptrace::getsiginfo(self.pid).context("failed to read trap siginfo")?;
        match info.si_code {
            TRAP_BRKPT | SI_KERNEL => {
                let address = registers::read_register(self.pid, Register::Rip)? - 1;
                registers::write_register(self.pid, Register::Rip, address)?;
                Ok(StopEvent::BreakpointHit { address })
            }
            TRAP_TRACE => Ok(StopEvent::SingleStepDone),
            code => {
                debug!("unhandled SIGTRAP si_code {}", code);
                Ok(StopEvent::SignalDelivered(Signal::SIGTRAP))
            }
        }
    }
}
