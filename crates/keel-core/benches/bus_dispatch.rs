//! 总线热路径基准：一次发布到 N 个订阅者的分发成本。

use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use keel_core::bus::{Bus, Envelope, Header, Inbox, PublishFlags};
use keel_core::catalog::{self, Body, EstimatedState};
use keel_core::time::SystemClock;

fn publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_publish");
    for subscribers in [1usize, 4, 16] {
        let bus = Bus::new(0x10, Arc::new(SystemClock::new()));
        let inboxes: Vec<Inbox> = (0..subscribers)
            .map(|i| Inbox::new(&format!("sink-{i}"), 1024))
            .collect();
        for inbox in &inboxes {
            bus.subscribe(inbox, &[catalog::ESTIMATED_STATE]);
        }
        group.bench_function(format!("fanout-{subscribers}"), |b| {
            b.iter(|| {
                bus.publish(
                    Envelope {
                        header: Header::default(),
                        body: Body::EstimatedState(EstimatedState::default()),
                    },
                    PublishFlags::default(),
                    None,
                );
                for inbox in &inboxes {
                    while inbox.try_pop().is_some() {}
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, publish_fanout);
criterion_main!(benches);
