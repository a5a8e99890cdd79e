//! Kernel layout configuration.
//!
//! The defaults are the TryKernel ABI constants. A host debugging a kernel built
//! with a different task limit can load an override from JSON.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on `max_tasks`; every slot costs two target reads per rebuild.
pub const MAX_TASK_SLOTS: u32 = 256;

/// Where TryKernel keeps its task table and how a TCB is laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelLayout {
    /// Symbol naming the TCB array.
    pub table_symbol: String,
    /// Symbol naming the pointer to the running TCB.
    pub current_task_symbol: String,
    /// Number of TCB slots (`CNF_MAX_TSKID`).
    pub max_tasks: u32,
    /// Size of one TCB in bytes.
    pub tcb_stride: u32,
    pub stack_pointer_offset: u32,
    pub state_offset: u32,
    pub priority_offset: u32,
}

impl Default for KernelLayout {
    fn default() -> Self {
        Self {
            table_symbol: "tcb_tbl".to_string(),
            current_task_symbol: "cur_task".to_string(),
            max_tasks: 32,
            tcb_stride: 64,
            stack_pointer_offset: 0,
            state_offset: 12,
            priority_offset: 20,
        }
    }
}

impl KernelLayout {
    /// Parse a layout from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let layout: Self = serde_json::from_str(json).context("Failed to parse kernel layout")?;
        layout.validate()?;
        Ok(layout)
    }

    /// Load a layout from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read kernel layout {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_symbol.is_empty() || self.current_task_symbol.is_empty() {
            bail!("kernel layout symbol names must not be empty");
        }
        if self.max_tasks == 0 || self.max_tasks > MAX_TASK_SLOTS {
            bail!(
                "kernel layout task count {} outside 1..={MAX_TASK_SLOTS}",
                self.max_tasks
            );
        }
        let last_field = self
            .stack_pointer_offset
            .max(self.state_offset)
            .max(self.priority_offset);
        match last_field.checked_add(4) {
            Some(field_end) if field_end <= self.tcb_stride => Ok(()),
            _ => bail!(
                "TCB stride {} does not cover field at offset {last_field}",
                self.tcb_stride
            ),
        }
    }

    /// Base address of TCB slot `index` in a table starting at `table`.
    ///
    /// Wraps at the top of the address space instead of overflowing.
    pub fn tcb_address(&self, table: u64, index: u32) -> u64 {
        table.wrapping_add(u64::from(index) * u64::from(self.tcb_stride))
    }
}
