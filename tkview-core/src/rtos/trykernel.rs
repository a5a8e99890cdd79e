//! TryKernel thread provider.
//!
//! TryKernel keeps every task in a fixed array of TCBs (`tcb_tbl`) and points
//! `cur_task` at the running one. A snapshot is rebuilt by scanning the whole
//! table; there are no lists to walk.

use super::thread::{Thread, ThreadState, HANDLER_MODE_THREAD_ID};
use super::RtosAware;
use crate::config::KernelLayout;
use crate::diagnostics::DiagnosticSink;
use crate::session::TargetEvent;
use crate::symbols::{KernelSymbols, SymbolProvider};
use crate::target::TargetAccess;
use indexmap::IndexMap;
use log::Level;

/// One built thread set and the run token it was built under.
struct Snapshot {
    run_token: u64,
    threads: IndexMap<u64, Thread>,
}

/// Thread registry for a TryKernel target.
pub struct TryKernel {
    layout: KernelLayout,
    symbols: Option<KernelSymbols>,
    snapshot: Option<Snapshot>,
    sink: Box<dyn DiagnosticSink>,
}

impl TryKernel {
    pub fn new(layout: KernelLayout, sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            layout,
            symbols: None,
            snapshot: None,
            sink,
        }
    }

    pub fn layout(&self) -> &KernelLayout {
        &self.layout
    }

    pub fn symbols(&self) -> Option<&KernelSymbols> {
        self.symbols.as_ref()
    }

    /// Whether a snapshot is cached, stale or not.
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Whether the kernel has initialized its task table.
    ///
    /// Reads as `false` rather than failing while RAM is still unreadable,
    /// which is normal right after reset or programming.
    pub fn is_running(&self, target: &mut dyn TargetAccess) -> bool {
        let Some(symbols) = &self.symbols else {
            return false;
        };
        match target.read_word_32(symbols.tcb_table) {
            Ok(word) => word != 0,
            Err(e) => {
                self.sink.emit(
                    Level::Warn,
                    format_args!(
                        "TryKernel: read running state failed, target memory might not be initialized yet ({e})"
                    ),
                );
                false
            }
        }
    }

    /// Scan the TCB table and replace the snapshot.
    ///
    /// A slot whose TCB cannot be read is skipped; the rest of the table is
    /// still scanned.
    pub fn rebuild(&mut self, target: &mut dyn TargetAccess) {
        let Some(symbols) = self.symbols else {
            self.snapshot = None;
            return;
        };
        self.sink
            .emit(Level::Debug, format_args!("TryKernel: building thread list"));

        let current = match target.read_word_32(symbols.current_task) {
            Ok(ptr) => Some(u64::from(ptr)),
            Err(e) => {
                self.sink.emit(
                    Level::Warn,
                    format_args!("TryKernel: cannot read current task pointer: {e}"),
                );
                None
            }
        };

        let mut threads = IndexMap::new();
        for index in 0..self.layout.max_tasks {
            let base = self.layout.tcb_address(symbols.tcb_table, index);
            let mut thread = match Thread::read_task(target, &symbols, &self.layout, index) {
                Ok(thread) => thread,
                Err(e) => {
                    self.sink.emit(
                        Level::Debug,
                        format_args!("TransferError while examining thread 0x{base:08x}: {e}"),
                    );
                    continue;
                }
            };

            if thread.state() == Some(ThreadState::NonExist) {
                continue;
            }
            self.sink.emit(
                Level::Debug,
                format_args!(
                    "TryKernel: thread 0x{base:08x} ({}) state: {}",
                    thread.name(),
                    thread.description()
                ),
            );
            if current == Some(base) {
                thread.set_state(ThreadState::Running);
            }
            threads.insert(thread.id(), thread);
        }

        match target.exception_number() {
            Ok(exception) if exception > 0 => {
                self.sink.emit(
                    Level::Debug,
                    format_args!("TryKernel: creating handler mode thread (exception {exception})"),
                );
                let thread = Thread::handler_mode();
                threads.insert(thread.id(), thread);
            }
            Ok(_) => {}
            Err(e) => self.sink.emit(
                Level::Warn,
                format_args!("TryKernel: cannot read exception status: {e}"),
            ),
        }

        self.snapshot = Some(Snapshot {
            run_token: target.run_token(),
            threads,
        });
    }

    /// Rebuild if there is no snapshot or it predates the last resume.
    pub fn update_threads(&mut self, target: &mut dyn TargetAccess) {
        let stale = self
            .snapshot
            .as_ref()
            .is_none_or(|s| s.run_token != target.run_token());
        if stale {
            self.rebuild(target);
        }
    }

    /// Value of the kernel's current-task pointer, ignoring exceptions.
    pub fn actual_current_thread_id(&self, target: &mut dyn TargetAccess) -> Option<u64> {
        let symbols = self.symbols.as_ref()?;
        match target.read_word_32(symbols.current_task) {
            Ok(ptr) => Some(u64::from(ptr)),
            Err(e) => {
                self.sink.emit(
                    Level::Debug,
                    format_args!("TryKernel: cannot read current task pointer: {e}"),
                );
                None
            }
        }
    }

    fn threads(&self) -> Option<&IndexMap<u64, Thread>> {
        self.snapshot.as_ref().map(|s| &s.threads)
    }
}

impl RtosAware for TryKernel {
    fn name(&self) -> &str {
        "TryKernel"
    }

    fn init(&mut self, symbols: &dyn SymbolProvider) -> bool {
        self.symbols = KernelSymbols::resolve(symbols, &self.layout);
        match &self.symbols {
            Some(syms) => {
                self.sink.emit(
                    Level::Info,
                    format_args!(
                        "TryKernel: initialized. tcb_tbl=0x{:08x} cur_task=0x{:08x}",
                        syms.tcb_table, syms.current_task
                    ),
                );
                true
            }
            None => {
                self.sink.emit(
                    Level::Warn,
                    format_args!("TryKernel: failed to find TryKernel symbols"),
                );
                false
            }
        }
    }

    fn is_enabled(&self, target: &mut dyn TargetAccess) -> bool {
        self.symbols.is_some() && self.is_running(target)
    }

    fn invalidate(&mut self) {
        self.snapshot = None;
    }

    fn get_threads(&mut self, target: &mut dyn TargetAccess) -> Vec<&Thread> {
        if !self.is_enabled(target) {
            return Vec::new();
        }
        self.update_threads(target);
        self.threads()
            .map_or_else(Vec::new, |threads| threads.values().collect())
    }

    fn get_thread(&mut self, target: &mut dyn TargetAccess, id: u64) -> Option<&Thread> {
        if !self.is_enabled(target) {
            return None;
        }
        self.update_threads(target);
        self.threads()?.get(&id)
    }

    fn current_thread(&mut self, target: &mut dyn TargetAccess) -> Option<&Thread> {
        if !self.is_enabled(target) {
            return None;
        }
        self.update_threads(target);
        let id = self.current_thread_id(target)?;
        self.threads()?.get(&id)
    }

    fn is_valid_thread_id(&mut self, target: &mut dyn TargetAccess, id: u64) -> bool {
        self.get_thread(target, id).is_some()
    }

    fn current_thread_id(&mut self, target: &mut dyn TargetAccess) -> Option<u64> {
        if !self.is_enabled(target) {
            return None;
        }
        match target.exception_number() {
            Ok(exception) if exception > 0 => Some(HANDLER_MODE_THREAD_ID),
            Ok(_) => self.actual_current_thread_id(target),
            Err(e) => {
                self.sink.emit(
                    Level::Debug,
                    format_args!("TryKernel: cannot read exception status: {e}"),
                );
                None
            }
        }
    }

    fn handle_event(&mut self, event: TargetEvent) {
        self.sink.emit(
            Level::Debug,
            format_args!("TryKernel: invalidating threads list: {event:?}"),
        );
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use crate::mock::MockTarget;
    use crate::target::regs;
    use std::collections::HashMap;

    const TABLE: u64 = 0x2000_0100;
    const CUR: u64 = 0x2000_0000;

    fn slot(index: u64) -> u64 {
        TABLE + index * 64
    }

    fn write_tcb(mock: &mut MockTarget, index: u64, sp: u32, state: u32, priority: u32) {
        mock.set_word_32(slot(index), sp);
        mock.set_word_32(slot(index) + 12, state);
        mock.set_word_32(slot(index) + 20, priority);
    }

    fn provider() -> (TryKernel, RecordingSink) {
        let sink = RecordingSink::new();
        let mut rtos = TryKernel::new(KernelLayout::default(), Box::new(sink.clone()));
        let mut syms = HashMap::new();
        syms.insert("tcb_tbl".to_string(), TABLE);
        syms.insert("cur_task".to_string(), CUR);
        assert!(rtos.init(&syms));
        (rtos, sink)
    }

    fn ids(threads: &[&Thread]) -> Vec<u64> {
        threads.iter().map(|t| t.id()).collect()
    }

    #[test]
    fn test_running_slot_and_nonexist_filtering() {
        let mut mock = MockTarget::new();
        write_tcb(&mut mock, 0, 0x2000_4000, 1, 1);
        write_tcb(&mut mock, 1, 0x2000_5000, 2, 5);
        write_tcb(&mut mock, 2, 0x2000_6000, 0, 9);
        mock.set_word_32(CUR, slot(0) as u32);

        let (mut rtos, _) = provider();
        let threads = rtos.get_threads(&mut mock);
        assert_eq!(ids(&threads), vec![slot(0), slot(1)]);
        assert_eq!(threads[0].state(), Some(ThreadState::Running));
        assert_eq!(threads[1].state(), Some(ThreadState::Wait));
        assert_eq!(threads[1].name(), "task1");
    }

    #[test]
    fn test_exception_adds_handler_mode_thread() {
        let mut mock = MockTarget::new();
        write_tcb(&mut mock, 0, 0x2000_4000, 1, 1);
        write_tcb(&mut mock, 1, 0x2000_5000, 1, 5);
        mock.set_word_32(CUR, slot(1) as u32);
        mock.set_register(regs::XPSR, 3);

        let (mut rtos, sink) = provider();
        let threads = rtos.get_threads(&mut mock);
        assert_eq!(threads.len(), 3);
        assert_eq!(threads[1].state(), Some(ThreadState::Running));
        assert!(threads[2].is_handler_mode());
        assert!(sink.contains(Level::Debug, "creating handler mode thread"));

        assert_eq!(rtos.current_thread_id(&mut mock), Some(HANDLER_MODE_THREAD_ID));
        assert_eq!(rtos.actual_current_thread_id(&mut mock), Some(slot(1)));
        assert!(rtos.current_thread(&mut mock).unwrap().is_handler_mode());
    }

    #[test]
    fn test_faulting_slot_is_skipped() {
        let mut mock = MockTarget::new();
        write_tcb(&mut mock, 0, 0x2000_4000, 1, 1);
        write_tcb(&mut mock, 1, 0x2000_5000, 2, 2);
        write_tcb(&mut mock, 2, 0x2000_6000, 8, 3);
        mock.fault_word(slot(1) + 20);

        let (mut rtos, sink) = provider();
        let threads = rtos.get_threads(&mut mock);
        assert_eq!(ids(&threads), vec![slot(0), slot(2)]);
        assert!(sink.contains(Level::Debug, "TransferError while examining thread 0x20000140"));
    }

    #[test]
    fn test_unmatched_current_pointer_marks_nothing_running() {
        let mut mock = MockTarget::new();
        write_tcb(&mut mock, 0, 0x2000_4000, 1, 1);
        write_tcb(&mut mock, 1, 0x2000_5000, 2, 2);
        mock.set_word_32(CUR, 0x2000_0FFF);

        let (mut rtos, _) = provider();
        let threads = rtos.get_threads(&mut mock);
        assert!(threads.iter().all(|t| t.state() != Some(ThreadState::Running)));
        assert!(rtos.current_thread(&mut mock).is_none());
    }

    #[test]
    fn test_unreadable_current_pointer_still_lists_threads() {
        let mut mock = MockTarget::new();
        write_tcb(&mut mock, 0, 0x2000_4000, 1, 1);
        mock.fault_word(CUR);

        let (mut rtos, sink) = provider();
        assert_eq!(rtos.get_threads(&mut mock).len(), 1);
        assert!(sink.contains(Level::Warn, "current task pointer"));
    }

    #[test]
    fn test_is_running_checks_table_base() {
        let mut mock = MockTarget::new();
        let (mut rtos, sink) = provider();
        assert!(!rtos.is_running(&mut mock));
        assert!(rtos.get_threads(&mut mock).is_empty());
        assert!(rtos.get_thread(&mut mock, slot(0)).is_none());
        assert_eq!(rtos.current_thread_id(&mut mock), None);

        mock.fault_word(TABLE);
        assert!(!rtos.is_running(&mut mock));
        assert!(sink.contains(Level::Warn, "might not be initialized"));

        mock.clear_faults();
        write_tcb(&mut mock, 0, 0x2000_4000, 1, 1);
        assert!(rtos.is_running(&mut mock));
    }

    #[test]
    fn test_lookup_and_validity() {
        let mut mock = MockTarget::new();
        write_tcb(&mut mock, 0, 0x2000_4000, 1, 1);
        write_tcb(&mut mock, 4, 0x2000_5000, 2, 7);

        let (mut rtos, _) = provider();
        let t = rtos.get_thread(&mut mock, slot(4)).unwrap();
        assert_eq!(t.name(), "task4");
        assert_eq!(t.priority(), 7);
        assert!(rtos.is_valid_thread_id(&mut mock, slot(0)));
        assert!(!rtos.is_valid_thread_id(&mut mock, slot(1)));
        assert!(!rtos.is_valid_thread_id(&mut mock, HANDLER_MODE_THREAD_ID));
    }

    #[test]
    fn test_snapshot_reused_until_run_token_changes() {
        let mut mock = MockTarget::new();
        write_tcb(&mut mock, 0, 0x2000_4000, 1, 1);

        let (mut rtos, _) = provider();
        assert_eq!(rtos.get_threads(&mut mock).len(), 1);

        // New task appears while halted: cached snapshot still served.
        write_tcb(&mut mock, 1, 0x2000_5000, 1, 1);
        assert_eq!(rtos.get_threads(&mut mock).len(), 1);

        mock.bump_run_token();
        assert_eq!(rtos.get_threads(&mut mock).len(), 2);
    }

    #[test]
    fn test_events_invalidate_snapshot() {
        let mut mock = MockTarget::new();
        write_tcb(&mut mock, 0, 0x2000_4000, 1, 1);

        let (mut rtos, sink) = provider();
        rtos.get_threads(&mut mock);
        assert!(rtos.has_snapshot());

        rtos.handle_event(TargetEvent::PostReset);
        assert!(!rtos.has_snapshot());
        assert!(sink.contains(Level::Debug, "PostReset"));

        write_tcb(&mut mock, 3, 0x2000_5000, 1, 1);
        assert_eq!(rtos.get_threads(&mut mock).len(), 2);

        rtos.handle_event(TargetEvent::PostFlashProgram);
        assert!(!rtos.has_snapshot());
    }

    #[test]
    fn test_missing_symbols_disable_provider() {
        let mut mock = MockTarget::new();
        write_tcb(&mut mock, 0, 0x2000_4000, 1, 1);
        let sink = RecordingSink::new();
        let mut rtos = TryKernel::new(KernelLayout::default(), Box::new(sink.clone()));
        let syms: HashMap<String, u64> = HashMap::new();

        assert!(!rtos.init(&syms));
        assert!(sink.contains(Level::Warn, "failed to find TryKernel symbols"));
        assert!(!rtos.is_enabled(&mut mock));
        assert!(rtos.get_threads(&mut mock).is_empty());
        assert!(rtos.current_thread(&mut mock).is_none());
        assert!(!rtos.is_valid_thread_id(&mut mock, slot(0)));

        rtos.rebuild(&mut mock);
        assert!(!rtos.has_snapshot());
    }

    #[test]
    fn test_custom_layout_limits_scan() {
        let mut mock = MockTarget::new();
        for i in 0..6 {
            write_tcb(&mut mock, i, 0x2000_4000, 1, 1);
        }
        let layout = KernelLayout {
            max_tasks: 4,
            ..KernelLayout::default()
        };
        let mut rtos = TryKernel::new(layout, Box::new(RecordingSink::new()));
        let mut syms = HashMap::new();
        syms.insert("tcb_tbl".to_string(), TABLE);
        syms.insert("cur_task".to_string(), CUR);
        assert!(rtos.init(&syms));
        assert_eq!(rtos.get_threads(&mut mock).len(), 4);
    }
}
