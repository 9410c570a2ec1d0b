use std::fmt;

use anyhow::Result;
use gimli::{EvaluationResult, Location, Value};

use crate::debugger::address::AddressSpace;
use crate::debugger::dwarf::{DebugInfo, Reader, VariableDie};
use crate::debugger::error::DebuggerError;
use crate::debugger::process::TracedProcess;
use crate::debugger::registers::{self, Register};

/// Where a variable's value was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableLocation {
    /// A runtime memory address
    Address(u64),
    /// A general purpose register
    Register(Register),
}

/// A named variable with its resolved location and current value
#[derive(Debug, Clone)]
pub struct Variable {
    /// Variable name
    pub name: String,
    /// Resolved storage location
    pub location: VariableLocation,
    /// Machine word read from the location
    pub value: u64,
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            VariableLocation::Address(address) => {
                write!(f, "{} (0x{:x}) = 0x{:x}", self.name, address, self.value)
            }
            VariableLocation::Register(reg) => {
                write!(f, "{} ({}) = 0x{:x}", self.name, registers::register_name(reg), self.value)
            }
        }
    }
}

/// Read every variable of the function containing `pc`.
///
/// `pc` is a static address; locations and values come from the live
/// target through its registers and memory.
pub fn read_variables(
    info: &DebugInfo,
    process: &TracedProcess,
    space: &AddressSpace,
    pc: u64,
) -> Result<Vec<Variable>> {
    let mut variables = Vec::new();
    for die in info.variables_at(pc)? {
        let location = evaluate_location(&die, process, space)?;
        let value = match location {
            VariableLocation::Address(address) => process.read_word(address)?,
            VariableLocation::Register(reg) => registers::read_register(process.pid(), reg)?,
        };
        variables.push(Variable {
            name: die.name,
            location,
            value,
        });
    }
    Ok(variables)
}

/// Drive a location expression to completion.
///
/// The evaluation context supplies register values (through the DWARF
/// register map), memory words, the frame base (rbp, matching the
/// frame-pointer stack model), and load-offset relocation. Any result
/// other than a plain address or register is unsupported.
fn evaluate_location(
    die: &VariableDie,
    process: &TracedProcess,
    space: &AddressSpace,
) -> Result<VariableLocation> {
    let mut eval = die.expression.clone().evaluation(die.encoding);
    let mut step = eval.evaluate()?;
    loop {
        match step {
            EvaluationResult::Complete => break,
            EvaluationResult::RequiresRegister { register, .. } => {
                let reg = registers::register_by_dwarf_number(register.0)?;
                let value = registers::read_register(process.pid(), reg)?;
                step = eval.resume_with_register(Value::Generic(value))?;
            }
            EvaluationResult::RequiresFrameBase => {
                let frame_base = registers::read_register(process.pid(), Register::Rbp)?;
                step = eval.resume_with_frame_base(frame_base)?;
            }
            EvaluationResult::RequiresMemory { address, .. } => {
                let word = process.read_word(address)?;
                step = eval.resume_with_memory(Value::Generic(word))?;
            }
            EvaluationResult::RequiresRelocatedAddress(address) => {
                step = eval.resume_with_relocated_address(space.to_runtime(address))?;
            }
            _ => return Err(DebuggerError::UnsupportedLocation(die.name.clone()).into()),
        }
    }
    let pieces = eval.result();
    let piece: &gimli::Piece<Reader> = pieces
        .first()
        .ok_or_else(|| DebuggerError::UnsupportedLocation(die.name.clone()))?;
    match piece.location {
        Location::Address { address } => Ok(VariableLocation::Address(address)),
        Location::Register { register } => Ok(VariableLocation::Register(
            registers::register_by_dwarf_number(register.0)?,
        )),
        _ => Err(DebuggerError::UnsupportedLocation(die.name.clone()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_display_at_address() {
        let var = Variable {
            name: "counter".into(),
            location: VariableLocation::Address(0x7ffd_1000),
            value: 0x2a,
        };
        assert_eq!(var.to_string(), "counter (0x7ffd1000) = 0x2a");
    }

    #[test]
    fn test_variable_display_in_register() {
        let var = Variable {
            name: "i".into(),
            location: VariableLocation::Register(Register::Rbx),
            value: 0x5,
        };
        assert_eq!(var.to_string(), "i (rbx) = 0x5");
    }
}
