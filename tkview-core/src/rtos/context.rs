//! Register context reconstruction for TryKernel tasks.
//!
//! A switched-out task's registers live on its own stack in two layers. From
//! the saved stack pointer upwards:
//!
//! ```text
//! sp + 0x00  r8  r9  r10 r11  r4  r5  r6  r7      pushed by the dispatcher
//! sp + 0x20  r0  r1  r2  r3   r12 lr  pc  xpsr    pushed by exception entry
//! sp + 0x40  caller stack
//! ```
//!
//! Both layers are always present, whether or not the task was ever
//! interrupted, so decoding never special-cases either one.

use super::thread::{read_saved_stack_pointer, Thread, ThreadKind};
use crate::target::{regs, TargetAccess, TargetResult};

/// Bytes occupied by both saved layers.
pub const SAVED_FRAME_SIZE: u32 = 64;

/// Extra word between a switched-out task's frame and its live stack.
pub const DISPATCHER_SP_ADJUST: u32 = 4;

/// Byte offset from the saved stack pointer for each register number.
/// `None` marks registers that are not saved on the task stack.
const REGISTER_OFFSETS: [Option<u32>; 17] = [
    Some(32), // r0
    Some(36), // r1
    Some(40), // r2
    Some(44), // r3
    Some(16), // r4
    Some(20), // r5
    Some(24), // r6
    Some(28), // r7
    Some(0),  // r8
    Some(4),  // r9
    Some(8),  // r10
    Some(12), // r11
    Some(48), // r12
    None,     // sp, derived from the frame address
    Some(52), // lr
    Some(56), // pc
    Some(60), // xpsr
];

/// Stack offset of `register`, if the save convention stores it.
pub fn stack_offset(register: u16) -> Option<u32> {
    REGISTER_OFFSETS.get(usize::from(register)).copied().flatten()
}

/// Where a single read request gets its values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterSource {
    /// The thread owns the core right now: read the live registers.
    Live,
    /// Decode the frame saved at `sp`.
    Stack { sp: u32, in_exception: bool },
}

#[derive(Debug, Clone, Copy)]
enum Owner {
    HandlerMode,
    Task {
        base: u64,
        current_task: u64,
        stack_pointer_address: u64,
    },
}

/// Register view of one thread.
#[derive(Debug)]
pub struct ThreadContext {
    owner: Owner,
}

impl ThreadContext {
    pub fn new(thread: &Thread) -> Self {
        let owner = match (thread.kind(), thread.stack_pointer_address()) {
            (ThreadKind::Task { base, .. }, Some(stack_pointer_address)) => Owner::Task {
                base,
                current_task: thread.current_task_address(),
                stack_pointer_address,
            },
            _ => Owner::HandlerMode,
        };
        Self { owner }
    }

    /// Decide how the next read is served.
    ///
    /// A task that is current while an exception is active is decoded from the
    /// live PSP, which points at the frame the exception just pushed.
    pub fn register_source(&self, target: &mut dyn TargetAccess) -> TargetResult<RegisterSource> {
        let Owner::Task {
            base,
            current_task,
            stack_pointer_address,
        } = self.owner
        else {
            return Ok(RegisterSource::Live);
        };

        let is_current = u64::from(target.read_word_32(current_task)?) == base;
        let in_exception = is_current && target.exception_number()? > 0;

        if is_current && !in_exception {
            return Ok(RegisterSource::Live);
        }

        let sp = if in_exception {
            target.read_core_reg(regs::PSP)?
        } else {
            read_saved_stack_pointer(target, stack_pointer_address)
        };

        Ok(RegisterSource::Stack { sp, in_exception })
    }

    /// Read `registers`, returning one value per requested register.
    pub fn read_core_registers(
        &self,
        target: &mut dyn TargetAccess,
        registers: &[u16],
    ) -> TargetResult<Vec<u32>> {
        match self.register_source(target)? {
            RegisterSource::Live => registers
                .iter()
                .map(|&reg| target.read_core_reg(reg))
                .collect(),
            RegisterSource::Stack { sp, in_exception } => registers
                .iter()
                .map(|&reg| decode_register(target, sp, in_exception, reg))
                .collect(),
        }
    }
}

/// Value of `register` for a frame saved at `sp`.
///
/// Registers the convention does not save are read live. A faulting stack
/// read yields 0 for that register only.
pub fn decode_register(
    target: &mut dyn TargetAccess,
    sp: u32,
    in_exception: bool,
    register: u16,
) -> TargetResult<u32> {
    if register == regs::SP {
        let frame_end = sp.wrapping_add(SAVED_FRAME_SIZE);
        return Ok(if in_exception {
            frame_end
        } else {
            frame_end.wrapping_add(DISPATCHER_SP_ADJUST)
        });
    }

    match stack_offset(register) {
        Some(offset) => {
            let addr = u64::from(sp) + u64::from(offset);
            Ok(target.read_word_32(addr).unwrap_or_else(|e| {
                log::debug!("register {register} unreadable on stack: {e}");
                0
            }))
        }
        None => target.read_core_reg(register),
    }
}
