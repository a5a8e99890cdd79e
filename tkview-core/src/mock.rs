//! In-memory target for exercising RTOS awareness without hardware.

use crate::target::{TargetAccess, TargetError, TargetResult};
use std::collections::{HashMap, HashSet};

/// A sparse byte-addressable memory plus a core register file.
///
/// Unwritten memory reads as zero. Individual words can be marked as
/// faulting to simulate unmapped or not-yet-initialized RAM.
#[derive(Debug, Default)]
pub struct MockTarget {
    data: HashMap<u64, u8>,
    registers: HashMap<u16, u32>,
    faults: HashSet<u64>,
    run_token: u64,
}

impl MockTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_word_32(&mut self, addr: u64, val: u32) {
        for (addr, byte) in (addr..).zip(val.to_le_bytes()) {
            self.data.insert(addr, byte);
        }
    }

    pub fn set_register(&mut self, register: u16, value: u32) {
        self.registers.insert(register, value);
    }

    /// Make every access touching the 4-byte word at `addr` fault.
    pub fn fault_word(&mut self, addr: u64) {
        self.faults.extend(addr..addr + 4);
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Simulate a resume/halt cycle.
    pub fn bump_run_token(&mut self) {
        self.run_token += 1;
    }
}

impl TargetAccess for MockTarget {
    fn read_word_32(&mut self, address: u64) -> TargetResult<u32> {
        let mut b = [0u8; 4];
        for (addr, byte) in (address..).zip(b.iter_mut()) {
            if self.faults.contains(&addr) {
                return Err(TargetError::TransferFault { address: addr });
            }
            *byte = self.data.get(&addr).copied().unwrap_or(0);
        }
        Ok(u32::from_le_bytes(b))
    }

    fn read_core_reg(&mut self, register: u16) -> TargetResult<u32> {
        Ok(self.registers.get(&register).copied().unwrap_or(0))
    }

    fn run_token(&self) -> u64 {
        self.run_token
    }
}
