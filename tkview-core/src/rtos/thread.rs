//! Thread snapshots.

use super::context::ThreadContext;
use super::ThreadInfo;
use crate::config::KernelLayout;
use crate::symbols::KernelSymbols;
use crate::target::{TargetAccess, TargetResult};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;

/// Identity of the synthetic "Handler mode" thread.
pub const HANDLER_MODE_THREAD_ID: u64 = 2;

/// TryKernel task state, as stored in the TCB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    NonExist,
    Ready,
    Wait,
    Dormant,
    Running,
    Unknown(u32),
}

impl ThreadState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::NonExist,
            1 => Self::Ready,
            2 => Self::Wait,
            8 => Self::Dormant,
            128 => Self::Running,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonExist => f.write_str("NONEXIST"),
            Self::Ready => f.write_str("READY"),
            Self::Wait => f.write_str("WAIT"),
            Self::Dormant => f.write_str("DORMANT"),
            Self::Running => f.write_str("RUNNING"),
            Self::Unknown(raw) => write!(f, "UNKNOWN({raw})"),
        }
    }
}

/// What backs a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    /// A TCB slot in the kernel's task table.
    Task { base: u64, index: u32 },
    /// The core is servicing an exception; no TCB involved.
    HandlerMode,
}

/// One entry of a thread snapshot.
///
/// Built once per rebuild and never updated afterwards; a newer target state
/// produces a new set of `Thread`s.
#[derive(Debug)]
pub struct Thread {
    id: u64,
    name: String,
    priority: u32,
    state: Option<ThreadState>,
    kind: ThreadKind,
    current_task: u64,
    stack_pointer_offset: u32,
    context: OnceCell<ThreadContext>,
}

impl Thread {
    /// Read the TCB at slot `index`. Fails if the state or priority word faults.
    pub fn read_task(
        target: &mut dyn TargetAccess,
        symbols: &KernelSymbols,
        layout: &KernelLayout,
        index: u32,
    ) -> TargetResult<Self> {
        let base = layout.tcb_address(symbols.tcb_table, index);
        let state = target.read_word_32(base.wrapping_add(u64::from(layout.state_offset)))?;
        let priority = target.read_word_32(base.wrapping_add(u64::from(layout.priority_offset)))?;

        Ok(Self {
            id: base,
            name: format!("task{index}"),
            priority,
            state: Some(ThreadState::from_raw(state)),
            kind: ThreadKind::Task { base, index },
            current_task: symbols.current_task,
            stack_pointer_offset: layout.stack_pointer_offset,
            context: OnceCell::new(),
        })
    }

    /// The synthetic thread standing for exception handler execution.
    pub fn handler_mode() -> Self {
        Self {
            id: HANDLER_MODE_THREAD_ID,
            name: "Handler mode".to_string(),
            priority: 0,
            state: None,
            kind: ThreadKind::HandlerMode,
            current_task: 0,
            stack_pointer_offset: 0,
            context: OnceCell::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Task state; `None` for the handler mode thread.
    pub fn state(&self) -> Option<ThreadState> {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ThreadState) {
        self.state = Some(state);
    }

    pub fn kind(&self) -> ThreadKind {
        self.kind
    }

    pub fn is_handler_mode(&self) -> bool {
        self.kind == ThreadKind::HandlerMode
    }

    pub fn description(&self) -> String {
        match self.state {
            Some(state) => format!("{state}; Priority {}", self.priority),
            None => String::new(),
        }
    }

    /// Whether the kernel's current-task pointer names this thread right now.
    ///
    /// The handler mode thread is current whenever an exception is active.
    pub fn is_current(&self, target: &mut dyn TargetAccess) -> TargetResult<bool> {
        match self.kind {
            ThreadKind::Task { base, .. } => {
                Ok(u64::from(target.read_word_32(self.current_task)?) == base)
            }
            ThreadKind::HandlerMode => Ok(target.exception_number()? > 0),
        }
    }

    pub(crate) fn current_task_address(&self) -> u64 {
        self.current_task
    }

    /// Address of the TCB word holding this thread's saved stack pointer.
    pub fn stack_pointer_address(&self) -> Option<u64> {
        match self.kind {
            ThreadKind::Task { base, .. } => {
                Some(base.wrapping_add(u64::from(self.stack_pointer_offset)))
            }
            ThreadKind::HandlerMode => None,
        }
    }

    /// Saved stack pointer from the TCB, 0 if it cannot be read.
    pub fn stack_pointer(&self, target: &mut dyn TargetAccess) -> u32 {
        self.stack_pointer_address()
            .map_or(0, |addr| read_saved_stack_pointer(target, addr))
    }

    /// Register context, built on first use.
    pub fn context(&self) -> &ThreadContext {
        self.context.get_or_init(|| ThreadContext::new(self))
    }

    /// Read registers through this thread's context.
    pub fn read_core_registers(
        &self,
        target: &mut dyn TargetAccess,
        registers: &[u16],
    ) -> TargetResult<Vec<u32>> {
        self.context().read_core_registers(target, registers)
    }

    /// Serializable summary for the host UI.
    pub fn info(&self, target: &mut dyn TargetAccess) -> ThreadInfo {
        ThreadInfo {
            id: self.id,
            name: self.name.clone(),
            priority: self.priority,
            state: self.state,
            description: self.description(),
            is_current: self.is_current(target).unwrap_or(false),
        }
    }
}

/// Read the saved stack pointer word at `addr`, 0 if the transfer faults.
pub(crate) fn read_saved_stack_pointer(target: &mut dyn TargetAccess, addr: u64) -> u32 {
    target.read_word_32(addr).unwrap_or_else(|e| {
        log::debug!("Transfer error while reading thread's stack pointer @ 0x{addr:08x}: {e}");
        0
    })
}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Thread id=0x{:x} name={}>", self.id, self.name)
    }
}
