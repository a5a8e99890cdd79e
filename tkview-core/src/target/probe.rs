//! probe-rs backed target access.

use super::{TargetAccess, TargetError, TargetResult};
use probe_rs::{Core, MemoryInterface, RegisterId};

/// Adapts an attached probe-rs [`Core`] to [`TargetAccess`].
///
/// probe-rs has no notion of a run token, so the host hands in its own resume
/// counter when it builds the adapter for a halt.
pub struct CoreTarget<'a, 'probe> {
    core: &'a mut Core<'probe>,
    run_token: u64,
}

impl<'a, 'probe> CoreTarget<'a, 'probe> {
    pub fn new(core: &'a mut Core<'probe>) -> Self {
        Self { core, run_token: 0 }
    }

    /// Attach the host's resume counter.
    #[must_use]
    pub fn with_run_token(mut self, run_token: u64) -> Self {
        self.run_token = run_token;
        self
    }
}

impl TargetAccess for CoreTarget<'_, '_> {
    fn read_word_32(&mut self, address: u64) -> TargetResult<u32> {
        self.core.read_word_32(address).map_err(|e| {
            log::trace!("read_word_32 @ 0x{address:08x} failed: {e}");
            TargetError::TransferFault { address }
        })
    }

    fn read_core_reg(&mut self, register: u16) -> TargetResult<u32> {
        let value: u64 = self.core.read_core_reg(RegisterId(register))?;
        Ok(value as u32)
    }

    fn run_token(&self) -> u64 {
        self.run_token
    }
}
