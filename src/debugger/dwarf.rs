use std::borrow::Cow;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Result};
use gimli::Reader as _;
use gimli::{AttributeValue, Unit};
use object::{Object, ObjectSection};

use crate::debugger::error::DebuggerError;

/// Reference-counted section reader, so the DWARF store owns its data
/// without borrowing from the parsed file.
pub type Reader = gimli::EndianRcSlice<gimli::RunTimeEndian>;

/// A subprogram resolved from an address
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    /// Function name, synthetic if the DIE carries none
    pub name: String,
    /// Static entry address
    pub low_pc: u64,
    /// Static end address (exclusive)
    pub high_pc: u64,
}

/// One line-table row resolved to a source position
#[derive(Debug, Clone)]
pub struct LineEntry {
    /// Full path of the source file
    pub path: PathBuf,
    /// 1-based source line
    pub line: u64,
    /// Static address of the row
    pub address: u64,
}

/// A variable DIE with its location expression, ready for evaluation
pub struct VariableDie {
    /// Variable name
    pub name: String,
    /// DWARF location expression
    pub expression: gimli::Expression<Reader>,
    /// Encoding of the defining compilation unit
    pub encoding: gimli::Encoding,
}

/// Read-only DWARF query surface for the target binary.
///
/// All addresses going in and out of this type are static (link-time)
/// addresses; callers translate through the session's `AddressSpace`.
pub struct DebugInfo {
    dwarf: gimli::Dwarf<Reader>,
}

impl DebugInfo {
    /// Load every DWARF section of a parsed object file.
    pub fn load(object: &object::File) -> Result<Self> {
        let endian = if object.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };
        let load_section = |id: gimli::SectionId| -> Result<Reader, gimli::Error> {
            let data = object
                .section_by_name(id.name())
                .and_then(|section| section.uncompressed_data().ok())
                .unwrap_or(Cow::Borrowed(&[][..]));
            Ok(gimli::EndianRcSlice::new(Rc::from(&*data), endian))
        };
        let dwarf = gimli::Dwarf::load(load_section)?;
        Ok(Self { dwarf })
    }

    /// Find the function whose range contains a static address.
    ///
    /// Scans compilation units containing the address, then their
    /// subprogram entries; entries without range information are skipped.
    pub fn function_containing(&self, pc: u64) -> Result<FunctionInfo> {
        let mut units = self.dwarf.units();
        while let Some(header) = units.next()? {
            let unit = self.dwarf.unit(header)?;
            if !self.unit_contains(&unit, pc)? {
                continue;
            }
            let mut entries = unit.entries();
            while let Some((_, entry)) = entries.next_dfs()? {
                if entry.tag() != gimli::DW_TAG_subprogram {
                    continue;
                }
                let Some((low_pc, high_pc)) = self.entry_pc_range(&unit, entry)? else {
                    continue;
                };
                if pc >= low_pc && pc < high_pc {
                    let name = self
                        .entry_name(&unit, entry)?
                        .unwrap_or_else(|| format!("func_{:x}", low_pc));
                    return Ok(FunctionInfo { name, low_pc, high_pc });
                }
            }
        }
        Err(DebuggerError::FunctionNotFound(pc).into())
    }

    /// Find the line-table entry covering a static address.
    pub fn line_entry_containing(&self, pc: u64) -> Result<LineEntry> {
        let mut units = self.dwarf.units();
        while let Some(header) = units.next()? {
            let unit = self.dwarf.unit(header)?;
            if !self.unit_contains(&unit, pc)? {
                continue;
            }
            let Some(program) = unit.line_program.clone() else {
                continue;
            };
            let file_header = program.header().clone();
            // Floor entry: the last row at or below pc
            let mut candidate: Option<(u64, u64, u64)> = None;
            let mut rows = program.rows();
            while let Some((_, row)) = rows.next_row()? {
                if row.end_sequence() || row.address() > pc {
                    continue;
                }
                let Some(line) = row.line() else {
                    continue;
                };
                if candidate.map_or(true, |(addr, _, _)| row.address() >= addr) {
                    candidate = Some((row.address(), line.get(), row.file_index()));
                }
            }
            if let Some((address, line, file_index)) = candidate {
                let path = self.file_path(&unit, &file_header, file_index)?;
                return Ok(LineEntry { path, line, address });
            }
        }
        Err(DebuggerError::LineNotFound(pc).into())
    }

    /// Find the static address of a function's first post-prologue line.
    ///
    /// Takes the line-table entry *after* the one at the function's entry
    /// address, so a breakpoint lands past the prologue.
    pub fn address_of_function(&self, name: &str) -> Result<u64> {
        let mut units = self.dwarf.units();
        while let Some(header) = units.next()? {
            let unit = self.dwarf.unit(header)?;
            let mut entries = unit.entries();
            while let Some((_, entry)) = entries.next_dfs()? {
                if entry.tag() != gimli::DW_TAG_subprogram {
                    continue;
                }
                if self.entry_name(&unit, entry)?.as_deref() != Some(name) {
                    continue;
                }
                let Some((low_pc, _)) = self.entry_pc_range(&unit, entry)? else {
                    continue;
                };
                return self.skip_prologue(&unit, low_pc);
            }
        }
        Err(DebuggerError::SymbolNotFound(name.to_string()).into())
    }

    /// Find the static address of a statement boundary at `file:line`.
    ///
    /// Units are matched by suffix against their recorded source path.
    pub fn address_of_line(&self, file: &str, line: u64) -> Result<u64> {
        let mut units = self.dwarf.units();
        while let Some(header) = units.next()? {
            let unit = self.dwarf.unit(header)?;
            let Some(unit_name) = &unit.name else {
                continue;
            };
            if !unit_name.to_string_lossy()?.ends_with(file) {
                continue;
            }
            let Some(program) = unit.line_program.clone() else {
                continue;
            };
            let mut rows = program.rows();
            while let Some((_, row)) = rows.next_row()? {
                if row.end_sequence() || !row.is_stmt() {
                    continue;
                }
                if row.line().map(|l| l.get()) == Some(line) {
                    return Ok(row.address());
                }
            }
        }
        Err(DebuggerError::LineAddressNotFound { file: file.to_string(), line }.into())
    }

    /// Collect every line-table entry within a static address range.
    pub fn line_entries_in_range(&self, low: u64, high: u64) -> Result<Vec<LineEntry>> {
        let mut result = Vec::new();
        let mut units = self.dwarf.units();
        while let Some(header) = units.next()? {
            let unit = self.dwarf.unit(header)?;
            if !self.unit_contains(&unit, low)? {
                continue;
            }
            let Some(program) = unit.line_program.clone() else {
                continue;
            };
            let file_header = program.header().clone();
            let mut rows = program.rows();
            while let Some((_, row)) = rows.next_row()? {
                if row.end_sequence() || row.address() < low || row.address() >= high {
                    continue;
                }
                let Some(line) = row.line() else {
                    continue;
                };
                let path = self.file_path(&unit, &file_header, row.file_index())?;
                result.push(LineEntry {
                    path,
                    line: line.get(),
                    address: row.address(),
                });
            }
        }
        Ok(result)
    }

    /// Collect the variable DIEs of the function containing a static address.
    pub fn variables_at(&self, pc: u64) -> Result<Vec<VariableDie>> {
        let mut units = self.dwarf.units();
        while let Some(header) = units.next()? {
            let unit = self.dwarf.unit(header)?;
            if !self.unit_contains(&unit, pc)? {
                continue;
            }
            let mut entries = unit.entries();
            while let Some((_, entry)) = entries.next_dfs()? {
                if entry.tag() != gimli::DW_TAG_subprogram {
                    continue;
                }
                let Some((low_pc, high_pc)) = self.entry_pc_range(&unit, entry)? else {
                    continue;
                };
                if pc < low_pc || pc >= high_pc {
                    continue;
                }
                return self.collect_variables(&unit, entry.offset());
            }
        }
        Err(DebuggerError::FunctionNotFound(pc).into())
    }

    fn collect_variables(
        &self,
        unit: &Unit<Reader>,
        function: gimli::UnitOffset,
    ) -> Result<Vec<VariableDie>> {
        let mut variables = Vec::new();
        let mut tree = unit.entries_tree(Some(function))?;
        let root = tree.root()?;
        let mut children = root.children();
        while let Some(child) = children.next()? {
            let entry = child.entry();
            if entry.tag() != gimli::DW_TAG_variable {
                continue;
            }
            let Some(name) = self.entry_name(unit, entry)? else {
                continue;
            };
            let Some(AttributeValue::Exprloc(expression)) =
                entry.attr_value(gimli::DW_AT_location)?
            else {
                continue;
            };
            variables.push(VariableDie {
                name,
                expression,
                encoding: unit.encoding(),
            });
        }
        Ok(variables)
    }

    /// Check whether a compilation unit's address ranges contain `pc`.
    fn unit_contains(&self, unit: &Unit<Reader>, pc: u64) -> Result<bool> {
        let mut ranges = self.dwarf.unit_ranges(unit)?;
        while let Some(range) = ranges.next()? {
            if range.begin <= pc && pc < range.end {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Read a DIE's low/high pc pair, skipping entries without one.
    fn entry_pc_range(
        &self,
        unit: &Unit<Reader>,
        entry: &gimli::DebuggingInformationEntry<Reader>,
    ) -> Result<Option<(u64, u64)>> {
        let low_pc = match entry.attr_value(gimli::DW_AT_low_pc)? {
            Some(value) => match self.dwarf.attr_address(unit, value)? {
                Some(address) => address,
                None => return Ok(None),
            },
            None => return Ok(None),
        };
        let high_pc = match entry.attr_value(gimli::DW_AT_high_pc)? {
            // high_pc is most often encoded as an offset from low_pc
            Some(AttributeValue::Udata(size)) => low_pc + size,
            Some(value) => match self.dwarf.attr_address(unit, value)? {
                Some(address) => address,
                None => return Ok(None),
            },
            None => return Ok(None),
        };
        Ok(Some((low_pc, high_pc)))
    }

    fn entry_name(
        &self,
        unit: &Unit<Reader>,
        entry: &gimli::DebuggingInformationEntry<Reader>,
    ) -> Result<Option<String>> {
        match entry.attr_value(gimli::DW_AT_name)? {
            Some(value) => {
                let name = self.dwarf.attr_string(unit, value)?;
                Ok(Some(name.to_string_lossy()?.into_owned()))
            }
            None => Ok(None),
        }
    }

    /// Advance past the line-table entry at a function's entry address.
    fn skip_prologue(&self, unit: &Unit<Reader>, entry_pc: u64) -> Result<u64> {
        let Some(program) = unit.line_program.clone() else {
            return Ok(entry_pc);
        };
        let mut seen_entry = false;
        let mut rows = program.rows();
        while let Some((_, row)) = rows.next_row()? {
            if row.end_sequence() {
                continue;
            }
            if seen_entry && row.address() > entry_pc {
                return Ok(row.address());
            }
            if row.address() == entry_pc {
                seen_entry = true;
            }
        }
        Ok(entry_pc)
    }

    /// Compose the full source path of a line-table file entry.
    fn file_path(
        &self,
        unit: &Unit<Reader>,
        header: &gimli::LineProgramHeader<Reader>,
        file_index: u64,
    ) -> Result<PathBuf> {
        let Some(file) = header.file(file_index) else {
            bail!("line-table file index {} out of range", file_index);
        };
        let mut path = PathBuf::new();
        if let Some(comp_dir) = &unit.comp_dir {
            path.push(comp_dir.to_string_lossy()?.as_ref());
        }
        if let Some(dir_attr) = file.directory(header) {
            let dir = self.dwarf.attr_string(unit, dir_attr)?;
            let dir = dir.to_string_lossy()?;
            if dir.starts_with('/') {
                path = PathBuf::from(dir.as_ref());
            } else {
                path.push(dir.as_ref());
            }
        }
        let name = self.dwarf.attr_string(unit, file.path_name())?;
        path.push(name.to_string_lossy()?.as_ref());
        Ok(path)
    }
}
