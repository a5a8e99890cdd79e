//! Target access module.
//!
//! The RTOS layer never talks to a probe directly. Everything it needs from the
//! target goes through [`TargetAccess`], which the host implements on top of its
//! live connection (see [`probe::CoreTarget`] for the probe-rs adapter).

#[cfg(feature = "hardware")]
pub mod probe;

#[cfg(feature = "hardware")]
pub use probe::CoreTarget;

use thiserror::Error;

/// Abstract Cortex-M register numbers, in the numbering used by the debug
/// core register selector (DCRSR.REGSEL).
pub mod regs {
    pub const R0: u16 = 0;
    pub const R1: u16 = 1;
    pub const R2: u16 = 2;
    pub const R3: u16 = 3;
    pub const R4: u16 = 4;
    pub const R5: u16 = 5;
    pub const R6: u16 = 6;
    pub const R7: u16 = 7;
    pub const R8: u16 = 8;
    pub const R9: u16 = 9;
    pub const R10: u16 = 10;
    pub const R11: u16 = 11;
    pub const R12: u16 = 12;
    pub const SP: u16 = 13;
    pub const LR: u16 = 14;
    pub const PC: u16 = 15;
    pub const XPSR: u16 = 16;
    pub const MSP: u16 = 17;
    pub const PSP: u16 = 18;
}

/// Mask selecting the IPSR (active exception number) bits of xPSR.
pub const IPSR_MASK: u32 = 0x1FF;

/// Errors raised by a single target access.
#[derive(Debug, Error)]
pub enum TargetError {
    /// A memory transfer faulted (unmapped address, target mid-reset, ...).
    #[error("transfer fault at 0x{address:08x}")]
    TransferFault { address: u64 },

    /// A core register could not be read.
    #[error("failed to read core register {register}")]
    Register { register: u16 },

    /// Any other error reported by the probe layer.
    #[cfg(feature = "hardware")]
    #[error(transparent)]
    Probe(#[from] probe_rs::Error),
}

/// Convenience alias for target access results.
pub type TargetResult<T> = Result<T, TargetError>;

/// Read access to a live target: memory and core registers.
pub trait TargetAccess {
    /// Read a single 32-bit little-endian word.
    fn read_word_32(&mut self, address: u64) -> TargetResult<u32>;

    /// Read a core register by its abstract number (see [`regs`]).
    fn read_core_reg(&mut self, register: u16) -> TargetResult<u32>;

    /// Number of the exception currently being serviced, 0 in thread mode.
    fn exception_number(&mut self) -> TargetResult<u32> {
        Ok(self.read_core_reg(regs::XPSR)? & IPSR_MASK)
    }

    /// Counter bumped by the host each time the target resumes.
    ///
    /// Thread snapshots built under one token are stale under any other.
    fn run_token(&self) -> u64 {
        0
    }
}

impl<T: TargetAccess + ?Sized> TargetAccess for &mut T {
    fn read_word_32(&mut self, address: u64) -> TargetResult<u32> {
        (**self).read_word_32(address)
    }

    fn read_core_reg(&mut self, register: u16) -> TargetResult<u32> {
        (**self).read_core_reg(register)
    }

    fn exception_number(&mut self) -> TargetResult<u32> {
        (**self).exception_number()
    }

    fn run_token(&self) -> u64 {
        (**self).run_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTarget;

    #[test]
    fn test_exception_number_masks_xpsr() {
        let mut target = MockTarget::new();
        target.set_register(regs::XPSR, 0x2100_0003);
        assert_eq!(target.exception_number().unwrap(), 3);

        target.set_register(regs::XPSR, 0x0100_0000);
        assert_eq!(target.exception_number().unwrap(), 0);
    }

    #[test]
    fn test_target_error_display() {
        let err = TargetError::TransferFault { address: 0x2000_0000 };
        assert_eq!(err.to_string(), "transfer fault at 0x20000000");
        let err = TargetError::Register { register: regs::PSP };
        assert_eq!(err.to_string(), "failed to read core register 18");
    }

    #[test]
    fn test_mutable_reference_forwards_reads() {
        fn first_word(mut target: impl TargetAccess) -> (u64, TargetResult<u32>) {
            (target.run_token(), target.read_word_32(0x2000_0000))
        }

        let mut target = MockTarget::new();
        target.set_word_32(0x2000_0000, 0x1234_5678);
        target.bump_run_token();
        let (token, word) = first_word(&mut target);
        assert_eq!(token, 1);
        assert_eq!(word.unwrap(), 0x1234_5678);
    }
}
