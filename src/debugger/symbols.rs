use std::fmt;

use object::{Object, ObjectSymbol};

/// ELF symbol classification, the subset the lookup command reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// No type (e.g. an absolute symbol)
    NoType,
    /// Data object
    Object,
    /// Function entry point
    Func,
    /// Symbol associated with a section
    Section,
    /// Source file associated with the object
    File,
}

impl SymbolKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoType => "notype",
            Self::Object => "object",
            Self::Func => "func",
            Self::Section => "section",
            Self::File => "file",
        }
    }

    fn from_object(kind: object::SymbolKind) -> Self {
        match kind {
            object::SymbolKind::Text => Self::Func,
            object::SymbolKind::Data => Self::Object,
            object::SymbolKind::Section => Self::Section,
            object::SymbolKind::File => Self::File,
            _ => Self::NoType,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A symbol-table entry from the target binary
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Symbol classification
    pub kind: SymbolKind,
    /// Symbol name
    pub name: String,
    /// Static value address
    pub address: u64,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} 0x{:x}", self.name, self.kind, self.address)
    }
}

/// Name-indexed view over the binary's static and dynamic symbol tables.
///
/// Built once at session start; a name may match in both tables and every
/// match is reported.
pub struct SymbolIndex {
    symbols: Vec<Symbol>,
}

impl SymbolIndex {
    /// Collect the symbols of both symbol-table sections.
    pub fn load(object: &object::File) -> Self {
        let mut symbols = Vec::new();
        for sym in object.symbols().chain(object.dynamic_symbols()) {
            if let Ok(name) = sym.name() {
                if name.is_empty() {
                    continue;
                }
                symbols.push(Symbol {
                    kind: SymbolKind::from_object(sym.kind()),
                    name: name.to_string(),
                    address: sym.address(),
                });
            }
        }
        Self { symbols }
    }

    /// Find every symbol whose name matches exactly.
    pub fn lookup(&self, name: &str) -> Vec<&Symbol> {
        self.symbols.iter().filter(|sym| sym.name == name).collect()
    }

    /// Get the number of indexed symbols
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check if the index holds no symbols
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> SymbolIndex {
        SymbolIndex {
            symbols: vec![
                Symbol { kind: SymbolKind::Func, name: "main".into(), address: 0x1040 },
                Symbol { kind: SymbolKind::Object, name: "counter".into(), address: 0x4010 },
                // same name in the dynamic table as well
                Symbol { kind: SymbolKind::Func, name: "main".into(), address: 0x1040 },
            ],
        }
    }

    #[test]
    fn test_lookup_returns_all_matches() {
        let index = sample_index();
        assert_eq!(index.lookup("main").len(), 2);
        assert_eq!(index.lookup("counter").len(), 1);
        assert!(index.lookup("missing").is_empty());
    }

    #[test]
    fn test_symbol_display_format() {
        let sym = Symbol { kind: SymbolKind::Func, name: "main".into(), address: 0x1040 };
        assert_eq!(sym.to_string(), "main func 0x1040");
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(SymbolKind::NoType.as_str(), "notype");
        assert_eq!(SymbolKind::Object.as_str(), "object");
        assert_eq!(SymbolKind::Func.as_str(), "func");
        assert_eq!(SymbolKind::Section.as_str(), "section");
        assert_eq!(SymbolKind::File.as_str(), "file");
    }

    #[test]
    fn test_kind_from_object() {
        assert_eq!(SymbolKind::from_object(object::SymbolKind::Text), SymbolKind::Func);
        assert_eq!(SymbolKind::from_object(object::SymbolKind::Data), SymbolKind::Object);
        assert_eq!(SymbolKind::from_object(object::SymbolKind::Unknown), SymbolKind::NoType);
    }
}
