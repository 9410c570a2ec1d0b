use proptest::prelude::*;
use rustdbg::debugger::address::AddressSpace;

#[test]
fn test_scenario_line_breakpoint_translation() {
    // line 12 of main.c maps to static 0x1025; with the module loaded at
    // 0x5000 the planted address must be 0x1025 + offset
    let space = AddressSpace::with_offset(0x5000);
    assert_eq!(space.to_runtime(0x1025), 0x6025);
}

#[test]
fn test_non_pie_offset_is_zero() {
    let space = AddressSpace::with_offset(0);
    assert_eq!(space.to_runtime(0x40_1000), 0x40_1000);
    assert_eq!(space.to_static(0x40_1000), 0x40_1000);
}

proptest! {
    #[test]
    fn test_round_trip_over_session(offset in 0u64..=1 << 47, addr in 0u64..=1 << 47) {
        // the offset is fixed for a session; translation must be a bijection
        let space = AddressSpace::with_offset(offset);
        prop_assert_eq!(space.to_static(space.to_runtime(addr)), addr);
    }
}
