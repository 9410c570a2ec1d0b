use anyhow::{Context, Result};
use libc::user_regs_struct;
use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::debugger::error::DebuggerError;

/// x86-64 general purpose register identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rdi,
    Rsi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rip,
    Rflags,
    Cs,
    OrigRax,
    FsBase,
    GsBase,
    Fs,
    Gs,
    Ss,
    Ds,
    Es,
}

/// Ties a register to its DWARF register number and CLI-facing name
pub struct RegisterDescriptor {
    /// Register identifier
    pub reg: Register,
    /// DWARF register number, `None` for registers DWARF cannot express
    pub dwarf: Option<u16>,
    /// Name as written by the operator and printed in dumps
    pub name: &'static str,
}

/// One descriptor per register, ordered to match `user_regs_struct`.
///
/// The ordering is the canonical dump order; access goes through the
/// named-field accessors below, never through positional offsets.
pub const REGISTER_DESCRIPTORS: [RegisterDescriptor; 27] = [
    RegisterDescriptor { reg: Register::R15, dwarf: Some(15), name: "r15" },
    RegisterDescriptor { reg: Register::R14, dwarf: Some(14), name: "r14" },
    RegisterDescriptor { reg: Register::R13, dwarf: Some(13), name: "r13" },
    RegisterDescriptor { reg: Register::R12, dwarf: Some(12), name: "r12" },
    RegisterDescriptor { reg: Register::Rbp, dwarf: Some(6), name: "rbp" },
    RegisterDescriptor { reg: Register::Rbx, dwarf: Some(3), name: "rbx" },
    RegisterDescriptor { reg: Register::R11, dwarf: Some(11), name: "r11" },
    RegisterDescriptor { reg: Register::R10, dwarf: Some(10), name: "r10" },
    RegisterDescriptor { reg: Register::R9, dwarf: Some(9), name: "r9" },
    RegisterDescriptor { reg: Register::R8, dwarf: Some(8), name: "r8" },
    RegisterDescriptor { reg: Register::Rax, dwarf: Some(0), name: "rax" },
    RegisterDescriptor { reg: Register::Rcx, dwarf: Some(2), name: "rcx" },
    RegisterDescriptor { reg: Register::Rdx, dwarf: Some(1), name: "rdx" },
    RegisterDescriptor { reg: Register::Rsi, dwarf: Some(4), name: "rsi" },
    RegisterDescriptor { reg: Register::Rdi, dwarf: Some(5), name: "rdi" },
    RegisterDescriptor { reg: Register::OrigRax, dwarf: None, name: "orig_rax" },
    RegisterDescriptor { reg: Register::Rip, dwarf: None, name: "rip" },
    RegisterDescriptor { reg: Register::Cs, dwarf: Some(51), name: "cs" },
    RegisterDescriptor { reg: Register::Rflags, dwarf: Some(49), name: "eflags" },
    RegisterDescriptor { reg: Register::Rsp, dwarf: Some(7), name: "rsp" },
    RegisterDescriptor { reg: Register::Ss, dwarf: Some(52), name: "ss" },
    RegisterDescriptor { reg: Register::FsBase, dwarf: Some(58), name: "fs_base" },
    RegisterDescriptor { reg: Register::GsBase, dwarf: Some(59), name: "gs_base" },
    RegisterDescriptor { reg: Register::Ds, dwarf: Some(53), name: "ds" },
    RegisterDescriptor { reg: Register::Es, dwarf: Some(50), name: "es" },
    RegisterDescriptor { reg: Register::Fs, dwarf: Some(54), name: "fs" },
    RegisterDescriptor { reg: Register::Gs, dwarf: Some(55), name: "gs" },
];

/// Read one register's slot out of a register snapshot.
fn register_slot(regs: &user_regs_struct, reg: Register) -> u64 {
    match reg {
        Register::Rax => regs.rax,
        Register::Rbx => regs.rbx,
        Register::Rcx => regs.rcx,
        Register::Rdx => regs.rdx,
        Register::Rdi => regs.rdi,
        Register::Rsi => regs.rsi,
        Register::Rbp => regs.rbp,
        Register::Rsp => regs.rsp,
        Register::R8 => regs.r8,
        Register::R9 => regs.r9,
        Register::R10 => regs.r10,
        Register::R11 => regs.r11,
        Register::R12 => regs.r12,
        Register::R13 => regs.r13,
        Register::R14 => regs.r14,
        Register::R15 => regs.r15,
        Register::Rip => regs.rip,
        Register::Rflags => regs.eflags,
        Register::Cs => regs.cs,
        Register::OrigRax => regs.orig_rax,
        Register::FsBase => regs.fs_base,
        Register::GsBase => regs.gs_base,
        Register::Fs => regs.fs,
        Register::Gs => regs.gs,
        Register::Ss => regs.ss,
        Register::Ds => regs.ds,
        Register::Es => regs.es,
    }
}

/// Overwrite one register's slot in a register snapshot.
fn set_register_slot(regs: &mut user_regs_struct, reg: Register, value: u64) {
    match reg {
        Register::Rax => regs.rax = value,
        Register::Rbx => regs.rbx = value,
        Register::Rcx => regs.rcx = value,
        Register::Rdx => regs.rdx = value,
        Register::Rdi => regs.rdi = value,
        Register::Rsi => regs.rsi = value,
        Register::Rbp => regs.rbp = value,
        Register::Rsp => regs.rsp = value,
        Register::R8 => regs.r8 = value,
        Register::R9 => regs.r9 = value,
        Register::R10 => regs.r10 = value,
        Register::R11 => regs.r11 = value,
        Register::R12 => regs.r12 = value,
        Register::R13 => regs.r13 = value,
        Register::R14 => regs.r14 = value,
        Register::R15 => regs.r15 = value,
        Register::Rip => regs.rip = value,
        Register::Rflags => regs.eflags = value,
        Register::Cs => regs.cs = value,
        Register::OrigRax => regs.orig_rax = value,
        Register::FsBase => regs.fs_base = value,
        Register::GsBase => regs.gs_base = value,
        Register::Fs => regs.fs = value,
        Register::Gs => regs.gs = value,
        Register::Ss => regs.ss = value,
        Register::Ds => regs.ds = value,
        Register::Es => regs.es = value,
    }
}

/// Read a single register from the traced process.
///
/// Takes a full register-set snapshot and extracts the requested slot.
pub fn read_register(pid: Pid, reg: Register) -> Result<u64> {
    let regs = ptrace::getregs(pid).context("failed to read register set")?;
    Ok(register_slot(&regs, reg))
}

/// Write a single register in the traced process.
///
/// Snapshot, overwrite the one slot, restore the full set.
pub fn write_register(pid: Pid, reg: Register, value: u64) -> Result<()> {
    let mut regs = ptrace::getregs(pid).context("failed to read register set")?;
    set_register_slot(&mut regs, reg, value);
    ptrace::setregs(pid, regs).context("failed to write register set")?;
    Ok(())
}

/// Look up a register by its CLI-facing name
pub fn register_by_name(name: &str) -> Result<Register, DebuggerError> {
    REGISTER_DESCRIPTORS
        .iter()
        .find(|rd| rd.name == name)
        .map(|rd| rd.reg)
        .ok_or_else(|| DebuggerError::UnknownRegister(name.to_string()))
}

/// Get a register's CLI-facing name
pub fn register_name(reg: Register) -> &'static str {
    REGISTER_DESCRIPTORS
        .iter()
        .find(|rd| rd.reg == reg)
        .map(|rd| rd.name)
        .expect("every register has a descriptor")
}

/// Look up a register by its DWARF register number.
///
/// Registers DWARF cannot express (rip, orig_rax) are never matched.
pub fn register_by_dwarf_number(number: u16) -> Result<Register, DebuggerError> {
    REGISTER_DESCRIPTORS
        .iter()
        .find(|rd| rd.dwarf == Some(number))
        .map(|rd| rd.reg)
        .ok_or(DebuggerError::UnknownDwarfRegister(number))
}

/// Snapshot all registers in descriptor-table order.
pub fn dump_registers(pid: Pid) -> Result<Vec<(&'static str, u64)>> {
    let regs = ptrace::getregs(pid).context("failed to read register set")?;
    Ok(REGISTER_DESCRIPTORS
        .iter()
        .map(|rd| (rd.name, register_slot(&regs, rd.reg)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed_regs() -> user_regs_struct {
        // user_regs_struct is plain-old-data, all-zero is a valid snapshot
        unsafe { std::mem::zeroed() }
    }

    #[test]
    fn test_descriptor_table_shape() {
        assert_eq!(REGISTER_DESCRIPTORS.len(), 27);
        // Dump order mirrors the raw snapshot layout
        assert_eq!(REGISTER_DESCRIPTORS[0].name, "r15");
        assert_eq!(REGISTER_DESCRIPTORS[16].name, "rip");
        assert_eq!(REGISTER_DESCRIPTORS[26].name, "gs");
    }

    #[test]
    fn test_register_slot_reads_named_fields() {
        let mut regs = zeroed_regs();
        regs.rax = 0x1;
        regs.rip = 0x2;
        regs.rbp = 0x3;
        regs.r15 = 0x4;
        regs.eflags = 0x5;
        assert_eq!(register_slot(&regs, Register::Rax), 0x1);
        assert_eq!(register_slot(&regs, Register::Rip), 0x2);
        assert_eq!(register_slot(&regs, Register::Rbp), 0x3);
        assert_eq!(register_slot(&regs, Register::R15), 0x4);
        assert_eq!(register_slot(&regs, Register::Rflags), 0x5);
    }

    #[test]
    fn test_set_register_slot_round_trip() {
        let mut regs = zeroed_regs();
        for rd in &REGISTER_DESCRIPTORS {
            set_register_slot(&mut regs, rd.reg, 0xfeed);
            assert_eq!(register_slot(&regs, rd.reg), 0xfeed);
        }
    }

    #[test]
    fn test_register_by_name() {
        assert_eq!(register_by_name("rax").unwrap(), Register::Rax);
        assert_eq!(register_by_name("fs_base").unwrap(), Register::FsBase);
        assert_eq!(register_by_name("eflags").unwrap(), Register::Rflags);
        assert!(matches!(
            register_by_name("xmm0"),
            Err(DebuggerError::UnknownRegister(_))
        ));
    }

    #[test]
    fn test_register_name_round_trip() {
        for rd in &REGISTER_DESCRIPTORS {
            assert_eq!(register_by_name(rd.name).unwrap(), rd.reg);
            assert_eq!(register_name(rd.reg), rd.name);
        }
    }

    #[test]
    fn test_register_by_dwarf_number() {
        assert_eq!(register_by_dwarf_number(0).unwrap(), Register::Rax);
        assert_eq!(register_by_dwarf_number(6).unwrap(), Register::Rbp);
        assert_eq!(register_by_dwarf_number(7).unwrap(), Register::Rsp);
        assert_eq!(register_by_dwarf_number(58).unwrap(), Register::FsBase);
        // 16 is the x86-64 return-address column, not a physical register
        assert!(matches!(
            register_by_dwarf_number(16),
            Err(DebuggerError::UnknownDwarfRegister(16))
        ));
    }

    #[test]
    fn test_rip_has_no_dwarf_number() {
        // The instruction pointer is not expressible as a DWARF register
        assert!(REGISTER_DESCRIPTORS
            .iter()
            .all(|rd| rd.reg != Register::Rip || rd.dwarf.is_none()));
        assert!((0..=u16::from(u8::MAX))
            .filter_map(|n| register_by_dwarf_number(n).ok())
            .all(|reg| reg != Register::Rip));
    }
}
