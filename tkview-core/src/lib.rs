//! tkview core - TryKernel RTOS awareness.
//!
//! Discovers the tasks of a TryKernel target from its TCB table and rebuilds
//! each switched-out task's registers from its saved stack, so a debugger can
//! present kernel tasks as threads.
//!
//! The in-memory [`mock::MockTarget`] is only built for this crate's tests or
//! with the `test-util` feature.

// Register values are 32-bit; probe-rs hands them out widened to u64.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]

pub mod config;
pub mod diagnostics;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod rtos;
pub mod session;
pub mod symbols;
pub mod target;

// Re-export commonly used types
pub use config::KernelLayout;
pub use diagnostics::{DiagnosticSink, LogSink, RecordingSink};
pub use rtos::{detect_rtos, RtosAware, Thread, ThreadInfo, ThreadState, TryKernel};
pub use session::{RtosSession, TargetEvent};
pub use symbols::{KernelSymbols, SymbolManager, SymbolProvider};
pub use target::{TargetAccess, TargetError, TargetResult};
