//! 总线投递契约：对 (发布者, 订阅者, 类型) 三元组 FIFO、独立收件箱互不反压、
//! 溢出可观测。跨线程场景用真实时钟与真实线程。

use std::sync::Arc;
use std::time::Duration;

use keel_core::bus::{Bus, Envelope, Header, Inbox, PublishFlags};
use keel_core::catalog::{self, Body, DesiredHeading};
use keel_core::time::SystemClock;

fn heading(value: f64) -> Envelope {
    Envelope {
        header: Header::default(),
        body: Body::DesiredHeading(DesiredHeading { value }),
    }
}

#[test]
fn per_pair_fifo_is_preserved() {
    let bus = Bus::new(0x10, Arc::new(SystemClock::new()));
    let inbox = Inbox::new("consumer", 1024);
    bus.subscribe(&inbox, &[catalog::DESIRED_HEADING]);

    for i in 0..100 {
        bus.publish(heading(i as f64), PublishFlags::default(), None);
    }
    for i in 0..100 {
        let env = inbox.wait(Duration::from_millis(100)).expect("message lost");
        match &env.body {
            Body::DesiredHeading(h) => assert_eq!(h.value, i as f64),
            other => panic!("unexpected body {other:?}"),
        }
    }
}

#[test]
fn slow_subscriber_does_not_backpressure_fast_one() {
    let bus = Bus::new(0x10, Arc::new(SystemClock::new()));
    let slow = Inbox::new("slow", 4);
    let fast = Inbox::new("fast", 1024);
    bus.subscribe(&slow, &[catalog::DESIRED_HEADING]);
    bus.subscribe(&fast, &[catalog::DESIRED_HEADING]);

    for i in 0..64 {
        bus.publish(heading(i as f64), PublishFlags::default(), None);
    }
    // 快消费者一封不丢。
    let mut received = 0;
    while fast.try_pop().is_some() {
        received += 1;
    }
    assert_eq!(received, 64);
    // 慢消费者丢了消息，但丢失是可观测的。
    assert_eq!(slow.len(), 4);
    assert_eq!(slow.take_overflow(), 60);
}

#[test]
fn concurrent_publishers_keep_per_publisher_order() {
    let bus = Bus::new(0x10, Arc::new(SystemClock::new()));
    let inbox = Inbox::new("consumer", 8192);
    bus.subscribe(&inbox, &[catalog::DESIRED_HEADING]);

    let mut handles = Vec::new();
    for publisher in 0..4u16 {
        let bus = bus.clone();
        handles.push(std::thread::spawn(move || {
            for seq in 0..200 {
                // 用整数编码 (publisher, seq)，消费端按发布者还原序列。
                let value = f64::from(publisher) * 1000.0 + seq as f64;
                bus.publish(heading(value), PublishFlags::default(), None);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut last_seq = [-1i64; 4];
    let mut total = 0;
    while let Some(env) = inbox.try_pop() {
        let Body::DesiredHeading(h) = &env.body else {
            panic!("unexpected body");
        };
        let publisher = (h.value / 1000.0).floor() as usize;
        let seq = (h.value % 1000.0) as i64;
        assert!(seq > last_seq[publisher], "per-publisher order violated");
        last_seq[publisher] = seq;
        total += 1;
    }
    assert_eq!(total, 800);
}
