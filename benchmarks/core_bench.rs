//! Benchmarks for the TCB scan and saved-context decoding.

#![allow(clippy::cast_possible_truncation)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use tkview_core::mock::MockTarget;
use tkview_core::target::regs;
use tkview_core::{KernelLayout, LogSink, RtosAware, TryKernel};

const TABLE: u64 = 0x2000_0400;
const CUR: u64 = 0x2000_0010;

fn populated_target() -> MockTarget {
    let mut mock = MockTarget::new();
    for i in 0..32u64 {
        let base = TABLE + i * 64;
        mock.set_word_32(base, 0x2000_8000 + i as u32 * 0x200);
        mock.set_word_32(base + 12, if i % 3 == 0 { 2 } else { 1 });
        mock.set_word_32(base + 20, i as u32);
    }
    mock.set_word_32(CUR, TABLE as u32);
    mock
}

fn provider() -> TryKernel {
    let mut syms = HashMap::new();
    syms.insert("tcb_tbl".to_string(), TABLE);
    syms.insert("cur_task".to_string(), CUR);
    let mut rtos = TryKernel::new(KernelLayout::default(), Box::new(LogSink));
    rtos.init(&syms);
    rtos
}

fn bench_rebuild(c: &mut Criterion) {
    let mut mock = populated_target();
    let mut rtos = provider();
    c.bench_function("tcb_table_rebuild", |b| {
        b.iter(|| {
            rtos.rebuild(&mut mock);
            black_box(rtos.get_threads(&mut mock).len());
        })
    });
}

fn bench_context_decode(c: &mut Criterion) {
    let mut mock = populated_target();
    let mut rtos = provider();
    let all: Vec<u16> = (regs::R0..=regs::XPSR).collect();
    c.bench_function("saved_context_decode", |b| {
        b.iter(|| {
            if let Some(thread) = rtos.get_thread(&mut mock, TABLE + 64) {
                let _ = black_box(thread.read_core_registers(&mut mock, &all));
            }
        })
    });
}

criterion_group!(benches, bench_rebuild, bench_context_decode);
criterion_main!(benches);
