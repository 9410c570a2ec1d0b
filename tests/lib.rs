//! RUSTDBG Test Suite
//!
//! Entry point for the integration tests. These exercise the crate's
//! public surface without a live traced process: command parsing, address
//! translation, and source rendering.

// Input validation tests
#[cfg(test)]
mod input;

// Address translation tests
#[cfg(test)]
mod translation;
