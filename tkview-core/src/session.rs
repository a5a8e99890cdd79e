//! RTOS session module.
//!
//! Ties a target, the detected RTOS provider and the host's target-state
//! notifications together. Notifications arrive over a channel and are applied
//! before the next query, so the host may post them from wherever it learns
//! about a reset or a reflash.

use crate::config::KernelLayout;
use crate::diagnostics::DiagnosticSink;
use crate::rtos::{detect_rtos, RtosAware, ThreadInfo};
use crate::symbols::SymbolProvider;
use crate::target::{TargetAccess, TargetResult};
use crossbeam_channel::{Receiver, Sender};

/// Target state changes that invalidate thread snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEvent {
    /// The target was reset.
    PostReset,
    /// New firmware was written to flash.
    PostFlashProgram,
}

/// A target plus its RTOS view.
pub struct RtosSession<T: TargetAccess> {
    target: T,
    rtos: Option<Box<dyn RtosAware>>,
    event_tx: Sender<TargetEvent>,
    event_rx: Receiver<TargetEvent>,
}

impl<T: TargetAccess> RtosSession<T> {
    /// Session without RTOS awareness; every thread query is empty.
    pub fn new(target: T) -> Self {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        Self {
            target,
            rtos: None,
            event_tx,
            event_rx,
        }
    }

    /// Detect the kernel from `symbols` and attach a provider if one fits.
    pub fn attach(
        target: T,
        symbols: &dyn SymbolProvider,
        layout: &KernelLayout,
        sink: Box<dyn DiagnosticSink>,
    ) -> Self {
        let mut session = Self::new(target);
        session.rtos = detect_rtos(symbols, layout, sink);
        match &session.rtos {
            Some(rtos) => log::info!("RTOS awareness initialized: {}", rtos.name()),
            None => log::info!("No supported RTOS found, thread view disabled"),
        }
        session
    }

    /// Use an already initialized provider.
    pub fn with_provider(target: T, rtos: Box<dyn RtosAware>) -> Self {
        let mut session = Self::new(target);
        session.rtos = Some(rtos);
        session
    }

    /// Channel the host posts [`TargetEvent`]s on.
    pub fn event_sender(&self) -> Sender<TargetEvent> {
        self.event_tx.clone()
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn rtos_name(&self) -> Option<&str> {
        self.rtos.as_deref().map(RtosAware::name)
    }

    fn apply_events(&mut self) {
        for event in self.event_rx.try_iter() {
            if let Some(rtos) = self.rtos.as_mut() {
                rtos.handle_event(event);
            }
        }
    }

    pub fn is_enabled(&mut self) -> bool {
        self.apply_events();
        match self.rtos.as_ref() {
            Some(rtos) => rtos.is_enabled(&mut self.target),
            None => false,
        }
    }

    pub fn threads(&mut self) -> Vec<ThreadInfo> {
        self.apply_events();
        let Some(rtos) = self.rtos.as_mut() else {
            return Vec::new();
        };
        let target = &mut self.target;
        rtos.get_threads(target)
            .into_iter()
            .map(|t| t.info(target))
            .collect()
    }

    pub fn thread(&mut self, id: u64) -> Option<ThreadInfo> {
        self.apply_events();
        let rtos = self.rtos.as_mut()?;
        let target = &mut self.target;
        rtos.get_thread(target, id).map(|t| t.info(target))
    }

    pub fn current_thread(&mut self) -> Option<ThreadInfo> {
        self.apply_events();
        let rtos = self.rtos.as_mut()?;
        let target = &mut self.target;
        rtos.current_thread(target).map(|t| t.info(target))
    }

    pub fn current_thread_id(&mut self) -> Option<u64> {
        self.apply_events();
        let rtos = self.rtos.as_mut()?;
        rtos.current_thread_id(&mut self.target)
    }

    pub fn is_valid_thread_id(&mut self, id: u64) -> bool {
        self.apply_events();
        match self.rtos.as_mut() {
            Some(rtos) => rtos.is_valid_thread_id(&mut self.target, id),
            None => false,
        }
    }

    /// Read registers as seen by thread `id`. `Ok(None)` for an unknown id.
    pub fn read_thread_registers(
        &mut self,
        id: u64,
        registers: &[u16],
    ) -> TargetResult<Option<Vec<u32>>> {
        self.apply_events();
        let Some(rtos) = self.rtos.as_mut() else {
            return Ok(None);
        };
        let target = &mut self.target;
        match rtos.get_thread(target, id) {
            Some(thread) => thread.read_core_registers(target, registers).map(Some),
            None => Ok(None),
        }
    }
}
