use anyhow::{Context, Result};
use nix::sys::ptrace;
use nix::unistd::Pid;

/// Single-byte trap opcode (int3 on x86-64).
pub const TRAP_OPCODE: u8 = 0xCC;

/// Replace the low byte of a machine word with the trap opcode.
fn patch_word(word: u64) -> u64 {
    (word & !0xff) | u64::from(TRAP_OPCODE)
}

/// Put a previously saved low byte back into a machine word.
fn restore_word(word: u64, saved: u8) -> u64 {
    (word & !0xff) | u64::from(saved)
}

/// A software breakpoint patched into the traced process's code image.
///
/// The underlying memory primitive only transfers full words, so both
/// `enable` and `disable` are word-granularity read-modify-write cycles
/// that touch a single byte.
#[derive(Debug)]
pub struct Breakpoint {
    /// Traced process the patch is applied to
    pid: Pid,
    /// Runtime address of the patched instruction
    address: u64,
    /// Is the trap opcode currently in place?
    enabled: bool,
    /// Byte displaced by the trap opcode while enabled
    saved_byte: u8,
}

impl Breakpoint {
    /// Create a disabled breakpoint for the given runtime address.
    pub fn new(pid: Pid, address: u64) -> Self {
        Self {
            pid,
            address,
            enabled: false,
            saved_byte: 0,
        }
    }

    /// Get the runtime address of the breakpoint
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Check if the trap opcode is currently planted
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get the byte the trap opcode displaced
    pub fn saved_byte(&self) -> u8 {
        self.saved_byte
    }

    /// Plant the trap opcode, saving the byte it displaces.
    ///
    /// Callers must only enable a disabled breakpoint.
    pub fn enable(&mut self) -> Result<()> {
        let word = self.read_word()?;
        self.saved_byte = (word & 0xff) as u8;
        self.write_word(patch_word(word))?;
        self.enabled = true;
        Ok(())
    }

    /// Restore the displaced byte, removing the trap opcode.
    ///
    /// Callers must only disable an enabled breakpoint.
    pub fn disable(&mut self) -> Result<()> {
        let word = self.read_word()?;
        self.write_word(restore_word(word, self.saved_byte))?;
        self.enabled = false;
        Ok(())
    }

    fn read_word(&self) -> Result<u64> {
        let word = ptrace::read(self.pid, self.address as ptrace::AddressType)
            .with_context(|| format!("failed to read word at 0x{:x}", self.address))?;
        Ok(word as u64)
    }

    fn write_word(&self, word: u64) -> Result<()> {
        ptrace::write(self.pid, self.address as ptrace::AddressType, word as i64)
            .with_context(|| format!("failed to write word at 0x{:x}", self.address))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_word_sets_trap_opcode() {
        let word = 0x1122_3344_5566_7788u64;
        let patched = patch_word(word);
        assert_eq!(patched & 0xff, u64::from(TRAP_OPCODE));
        assert_eq!(patched & !0xff, word & !0xff);
    }

    #[test]
    fn test_restore_word_round_trip() {
        let word = 0xdead_beef_cafe_f00du64;
        let saved = (word & 0xff) as u8;
        let patched = patch_word(word);
        assert_eq!(restore_word(patched, saved), word);
    }

    #[test]
    fn test_patch_is_byte_granular() {
        // Only the low byte may differ after a patch/restore cycle
        for word in [0u64, u64::MAX, 0x0102_0304_0506_0708] {
            assert_eq!(patch_word(word) >> 8, word >> 8);
            assert_eq!(restore_word(patch_word(word), 0xab) >> 8, word >> 8);
        }
    }

    #[test]
    fn test_new_breakpoint_is_disabled() {
        let bp = Breakpoint::new(Pid::from_raw(1), 0x1040);
        assert_eq!(bp.address(), 0x1040);
        assert!(!bp.is_enabled());
        assert_eq!(bp.saved_byte(), 0);
    }
}
