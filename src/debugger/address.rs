use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::debug;
use nix::unistd::Pid;
use proc_maps::get_process_maps;

/// Strategy for discovering the runtime base address of the traced module.
///
/// Kept behind a trait so the default heuristic can be swapped for a more
/// robust mechanism (auxiliary vector, path matching) without touching the
/// stepping or symbolication logic.
pub trait OffsetStrategy {
    fn discover(&self, pid: Pid) -> Result<u64>;
}

/// Default heuristic: the base of the first region in the process memory
/// map, after a short delay to let the mapping settle.
///
/// Assumes the target is position-independent and its primary module is
/// mapped first. Known-fragile; see `OffsetStrategy`.
pub struct FirstRegionStrategy {
    settle_delay: Duration,
}

impl FirstRegionStrategy {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }
}

impl Default for FirstRegionStrategy {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl OffsetStrategy for FirstRegionStrategy {
    fn discover(&self, pid: Pid) -> Result<u64> {
        thread::sleep(self.settle_delay);
        let maps = get_process_maps(pid.as_raw())
            .with_context(|| format!("failed to read memory map of pid {}", pid))?;
        let first = maps
            .first()
            .ok_or_else(|| anyhow!("memory map of pid {} is empty", pid))?;
        Ok(first.start() as u64)
    }
}

/// Static<->runtime address translation for one debug session.
///
/// The offset is discovered once after the target's first stop and held
/// immutable for the session's lifetime. Every address crossing the
/// debug-info boundary is translated through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    offset: u64,
}

impl AddressSpace {
    /// Create a translation with a known load offset.
    pub fn with_offset(offset: u64) -> Self {
        Self { offset }
    }

    /// Discover the load offset for a freshly stopped target.
    ///
    /// Non-relocatable executables are linked at their runtime addresses,
    /// so their offset is zero and no discovery runs.
    pub fn discover(pid: Pid, relocatable: bool) -> Result<Self> {
        if !relocatable {
            return Ok(Self::with_offset(0));
        }
        Self::discover_with(&FirstRegionStrategy::default(), pid)
    }

    /// Discover the load offset with an explicit strategy.
    pub fn discover_with(strategy: &dyn OffsetStrategy, pid: Pid) -> Result<Self> {
        let offset = strategy.discover(pid)?;
        debug!("discovered load offset 0x{:x} for pid {}", offset, pid);
        Ok(Self::with_offset(offset))
    }

    /// Get the load offset
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Translate a static (link-time) address to its runtime address
    pub fn to_runtime(&self, static_addr: u64) -> u64 {
        static_addr + self.offset
    }

    /// Translate a runtime address back to its static address
    pub fn to_static(&self, runtime_addr: u64) -> u64 {
        runtime_addr - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_offset_is_identity() {
        let space = AddressSpace::with_offset(0);
        assert_eq!(space.to_runtime(0x1040), 0x1040);
        assert_eq!(space.to_static(0x1040), 0x1040);
    }

    #[test]
    fn test_translation_directions() {
        let space = AddressSpace::with_offset(0x5555_5555_4000);
        assert_eq!(space.to_runtime(0x1025), 0x5555_5555_5025);
        assert_eq!(space.to_static(0x5555_5555_5025), 0x1025);
    }

    proptest! {
        #[test]
        fn test_translation_is_a_bijection(offset in 0u64..=1 << 47, addr in 0u64..=1 << 47) {
            let space = AddressSpace::with_offset(offset);
            prop_assert_eq!(space.to_static(space.to_runtime(addr)), addr);
            prop_assert_eq!(space.to_runtime(space.to_static(addr + offset)), addr + offset);
        }
    }
}
