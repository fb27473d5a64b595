use std::{cell::RefCell, hint::black_box, rc::Rc};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use gc_probe::{ChurnBuffer, DirectCollectorTrigger, GcProbe, MemoryPressure, ProbeOptions};
use gc_probe_heap::{Gc, Heap};

fn fill_heap(heap: &mut Heap, objects: usize) -> Vec<Gc<u64>> {
    (0..objects as u64).map(|i| heap.alloc(i).unwrap()).collect()
}

fn churn_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn_buffer");
    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut buffer = ChurnBuffer::new();
            b.iter(|| {
                buffer.apply(black_box(size));
                buffer.reset();
            });
        });
    }
    group.finish();
}

fn heap_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_collect");
    for objects in [100usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("garbage", objects), &objects, |b, &objects| {
            let mut heap = Heap::new();
            b.iter(|| {
                fill_heap(&mut heap, objects);
                black_box(heap.collect())
            });
        });

        group.bench_with_input(BenchmarkId::new("rooted", objects), &objects, |b, &objects| {
            let mut heap = Heap::new();
            for object in fill_heap(&mut heap, objects) {
                heap.root(object);
            }
            b.iter(|| black_box(heap.collect()));
        });
    }
    group.finish();
}

fn probe_direct(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    c.bench_function("probe_direct_weak_cleared", |b| {
        let heap = Rc::new(RefCell::new(Heap::new()));
        let trigger = DirectCollectorTrigger::new(heap.clone());
        let mut probe = GcProbe::new(trigger, ProbeOptions::default());

        b.iter(|| {
            let weak = {
                let mut heap = heap.borrow_mut();
                let object = heap.alloc(String::from("target")).unwrap();
                heap.downgrade(object)
            };
            let achieved = probe.try_to_achieve(|| heap.borrow().is_cleared(&weak));
            black_box(runtime.block_on(achieved))
        });
    });
}

criterion_group!(benches, churn_buffer, heap_collect, probe_direct);
criterion_main!(benches);
