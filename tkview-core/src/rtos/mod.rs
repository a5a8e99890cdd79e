//! RTOS awareness.
//!
//! A provider turns kernel data structures in target memory into a set of
//! [`Thread`]s whose registers the debugger can inspect like real threads.

pub mod context;
pub mod thread;
pub mod trykernel;

pub use context::{RegisterSource, ThreadContext};
pub use thread::{Thread, ThreadKind, ThreadState, HANDLER_MODE_THREAD_ID};
pub use trykernel::TryKernel;

use crate::config::KernelLayout;
use crate::diagnostics::DiagnosticSink;
use crate::session::TargetEvent;
use crate::symbols::SymbolProvider;
use crate::target::TargetAccess;
use serde::{Deserialize, Serialize};

/// Summary of a thread for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: u64,
    pub name: String,
    pub priority: u32,
    pub state: Option<ThreadState>,
    pub description: String,
    pub is_current: bool,
}

/// The thread-level view a debugger front end consumes.
///
/// Every query is a no-op (empty list, `None`, `false`) while the provider is
/// not enabled.
pub trait RtosAware: Send {
    fn name(&self) -> &str;

    /// Resolve the kernel symbols. Returns `false` if the kernel is not present.
    fn init(&mut self, symbols: &dyn SymbolProvider) -> bool;

    /// Symbols resolved and the kernel's task table initialized.
    fn is_enabled(&self, target: &mut dyn TargetAccess) -> bool;

    /// Drop the cached thread snapshot.
    fn invalidate(&mut self);

    fn get_threads(&mut self, target: &mut dyn TargetAccess) -> Vec<&Thread>;

    fn get_thread(&mut self, target: &mut dyn TargetAccess, id: u64) -> Option<&Thread>;

    fn current_thread(&mut self, target: &mut dyn TargetAccess) -> Option<&Thread>;

    fn is_valid_thread_id(&mut self, target: &mut dyn TargetAccess, id: u64) -> bool;

    fn current_thread_id(&mut self, target: &mut dyn TargetAccess) -> Option<u64>;

    /// React to a target state change reported by the host.
    ///
    /// Both reset and reprogramming leave any cached snapshot meaningless.
    fn handle_event(&mut self, _event: TargetEvent) {
        self.invalidate();
    }
}

/// Pick and initialize a provider for the kernel found in `symbols`.
pub fn detect_rtos(
    symbols: &dyn SymbolProvider,
    layout: &KernelLayout,
    sink: Box<dyn DiagnosticSink>,
) -> Option<Box<dyn RtosAware>> {
    if symbols.lookup_symbol(&layout.table_symbol).is_some() {
        let mut provider = TryKernel::new(layout.clone(), sink);
        if provider.init(symbols) {
            return Some(Box::new(provider));
        }
    }
    None
}
