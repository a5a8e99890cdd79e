//! Symbol resolution.
//!
//! RTOS awareness only needs a handful of global addresses. They come from any
//! [`SymbolProvider`]; [`SymbolManager`] reads them from the firmware ELF.

use crate::config::KernelLayout;
use anyhow::{Context, Result};
use object::{Object, ObjectSymbol};
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::Path;

/// Resolves global symbol names to target addresses.
pub trait SymbolProvider {
    fn lookup_symbol(&self, name: &str) -> Option<u64>;
}

impl<H: BuildHasher> SymbolProvider for HashMap<String, u64, H> {
    fn lookup_symbol(&self, name: &str) -> Option<u64> {
        self.get(name).copied()
    }
}

impl<S: SymbolProvider + ?Sized> SymbolProvider for &S {
    fn lookup_symbol(&self, name: &str) -> Option<u64> {
        (**self).lookup_symbol(name)
    }
}

/// Manager for the firmware ELF symbol table.
pub struct SymbolManager {
    elf_data: Option<Vec<u8>>,
}

impl SymbolManager {
    pub fn new() -> Self {
        Self { elf_data: None }
    }

    /// Load symbols from an ELF file.
    pub fn load_elf(&mut self, path: &Path) -> Result<()> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read ELF file {}", path.display()))?;
        self.load_elf_bytes(data)?;
        log::info!("Loaded symbols from {}", path.display());
        Ok(())
    }

    /// Load symbols from an in-memory ELF image.
    pub fn load_elf_bytes(&mut self, data: Vec<u8>) -> Result<()> {
        object::File::parse(&*data).context("Failed to parse ELF")?;
        self.elf_data = Some(data);
        Ok(())
    }

    pub fn has_symbols(&self) -> bool {
        self.elf_data.is_some()
    }

    pub fn elf_data(&self) -> Option<&[u8]> {
        self.elf_data.as_deref()
    }
}

impl SymbolProvider for SymbolManager {
    /// Lookup a symbol address by name from the ELF symbol table.
    fn lookup_symbol(&self, name: &str) -> Option<u64> {
        let data = self.elf_data.as_ref()?;
        let obj = object::File::parse(&**data).ok()?;

        obj.symbols()
            .find(|symbol| symbol.name().is_ok_and(|sym_name| sym_name == name))
            .map(|symbol| symbol.address())
    }
}

impl Default for SymbolManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Addresses of the kernel globals the thread provider reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSymbols {
    /// Base of the TCB array.
    pub tcb_table: u64,
    /// Address of the pointer to the running TCB.
    pub current_task: u64,
}

impl KernelSymbols {
    /// Resolve both required symbols. `None` if either is missing.
    pub fn resolve(symbols: &dyn SymbolProvider, layout: &KernelLayout) -> Option<Self> {
        let tcb_table = symbols.lookup_symbol(&layout.table_symbol);
        let current_task = symbols.lookup_symbol(&layout.current_task_symbol);
        match (tcb_table, current_task) {
            (Some(tcb_table), Some(current_task)) => Some(Self {
                tcb_table,
                current_task,
            }),
            _ => {
                log::debug!(
                    "missing kernel symbols: {}={:?} {}={:?}",
                    layout.table_symbol,
                    tcb_table,
                    layout.current_task_symbol,
                    current_task
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_manager_initial_state() {
        let mgr = SymbolManager::new();
        assert!(!mgr.has_symbols());
        assert!(mgr.elf_data().is_none());
        assert!(mgr.lookup_symbol("tcb_tbl").is_none());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut mgr = SymbolManager::new();
        assert!(mgr.load_elf_bytes(vec![0u8; 16]).is_err());
        assert!(!mgr.has_symbols());
    }

    #[test]
    fn test_resolve_kernel_symbols() {
        let layout = KernelLayout::default();
        let mut map = HashMap::new();
        map.insert("tcb_tbl".to_string(), 0x2000_0100);
        assert!(KernelSymbols::resolve(&map, &layout).is_none());

        map.insert("cur_task".to_string(), 0x2000_0000);
        let syms = KernelSymbols::resolve(&map, &layout).unwrap();
        assert_eq!(syms.tcb_table, 0x2000_0100);
        assert_eq!(syms.current_task, 0x2000_0000);
    }
}
