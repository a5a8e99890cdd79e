//! Attach to a TryKernel target and print its threads with their saved PC/SP.
//!
//! Usage: thread_dump <chip> <firmware.elf>

use probe_rs::probe::list::Lister;
use probe_rs::Permissions;
use std::path::PathBuf;
use std::time::Duration;
use tkview_core::target::{regs, CoreTarget};
use tkview_core::{KernelLayout, LogSink, RtosSession, SymbolManager};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(chip), Some(elf)) = (args.next(), args.next()) else {
        eprintln!("usage: thread_dump <chip> <firmware.elf>");
        return Ok(());
    };

    let mut symbols = SymbolManager::new();
    symbols.load_elf(&PathBuf::from(elf))?;

    let lister = Lister::new();
    let probes = lister.list_all();
    if probes.is_empty() {
        println!("No probes found");
        return Ok(());
    }

    let probe = probes[0].open()?;
    let mut session = probe.attach(chip.as_str(), Permissions::default())?;
    let mut core = session.core(0)?;
    core.halt(Duration::from_millis(100))?;

    let mut rtos = RtosSession::attach(
        CoreTarget::new(&mut core),
        &symbols,
        &KernelLayout::default(),
        Box::new(LogSink),
    );

    if !rtos.is_enabled() {
        println!("TryKernel not running on target");
        return Ok(());
    }

    for thread in rtos.threads() {
        let values = rtos
            .read_thread_registers(thread.id, &[regs::PC, regs::SP])?
            .unwrap_or_default();
        let marker = if thread.is_current { "*" } else { " " };
        println!(
            "{} 0x{:08x} {:<14} {:<24} pc={:08x?} sp={:08x?}",
            marker,
            thread.id,
            thread.name,
            thread.description,
            values.first(),
            values.get(1)
        );
    }

    Ok(())
}
