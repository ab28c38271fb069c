//! Benchmarks for change notification
//!
//! Run with: cargo bench -p tether-core --bench notify

use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tether_core::bind::ValueSubscriber;
use tether_core::config::BindingConfig;
use tether_core::container::StateNotifier;
use tether_core::host::{BuildContext, Component, RebuildQueue};

// =============================================================================
// Notifier fan-out
// =============================================================================

fn bench_set_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("notifier/set_state");

    for listeners in [1_usize, 8, 64] {
        group.throughput(Throughput::Elements(listeners as u64));
        let notifier = StateNotifier::new(0_u64);
        let _subscriptions: Vec<_> = (0..listeners)
            .map(|_| notifier.add_listener(|v| { black_box(*v); }, false))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("listeners", listeners),
            &notifier,
            |b, notifier| b.iter(|| notifier.update(|v| v.wrapping_add(1))),
        );
    }

    group.finish();
}

// =============================================================================
// Subscriber render after change
// =============================================================================

fn bench_subscriber_render(c: &mut Criterion) {
    let queue = Rc::new(RebuildQueue::new());
    let root = BuildContext::root(queue.clone(), BindingConfig::default());
    let counter = Rc::new(StateNotifier::new(0_u64));
    let mut view: ValueSubscriber<_, String> =
        ValueSubscriber::new(counter.clone(), |_, v: &u64, _| format!("count {v}"));
    view.mount(&root);

    c.bench_function("subscriber/change_then_render", |b| {
        b.iter(|| {
            counter.update(|v| v.wrapping_add(1));
            black_box(view.render());
            queue.drain();
        })
    });
}

criterion_group!(benches, bench_set_state, bench_subscriber_render);
criterion_main!(benches);
