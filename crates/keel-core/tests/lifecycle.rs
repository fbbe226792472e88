//! 任务生命周期契约：获取期退避重试、实体降级、处理器 panic 不伤发布方、
//! 周期任务按频率走拍。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use keel_core::bus::{Bus, Envelope, Inbox};
use keel_core::catalog::{self, Body, EntityState, Heartbeat};
use keel_core::config::Config;
use keel_core::entity::EntityHealth;
use keel_core::param::ParamBinder;
use keel_core::shared::SharedServices;
use keel_core::task::{RetryPolicy, Schedule, Task, TaskContext, TaskError, TaskSettings, spawn};
use keel_core::time::SystemClock;
use keel_core::{EntityRegistry, ParamError};

struct Flaky {
    failures_left: Arc<AtomicU32>,
    ticks: Arc<AtomicU32>,
    frequency: f64,
}

impl Task for Flaky {
    fn schedule(&self) -> Schedule {
        Schedule::periodic(self.frequency)
    }

    fn declare_parameters(&mut self, binder: &mut ParamBinder) -> Result<(), ParamError> {
        binder
            .param("Frequency", &mut self.frequency)
            .defaults("50.0")
            .minimum(0.1)
            .commit()
    }

    fn on_resource_acquisition(&mut self, _ctx: &mut TaskContext) -> Result<(), TaskError> {
        if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(TaskError::RestartNeeded {
                delay: Duration::from_millis(20),
            })
        } else {
            Ok(())
        }
    }

    fn on_tick(&mut self, _ctx: &mut TaskContext) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }
}

fn settings(name: &str, bus: &Bus) -> TaskSettings {
    TaskSettings::new(
        name,
        bus.clone(),
        Arc::new(SystemClock::new()),
        Arc::new(Config::new()),
        Arc::new(EntityRegistry::new()),
        SharedServices::new(),
    )
}

#[test]
fn acquisition_retries_with_backoff_and_degrades_entity() {
    let bus = Bus::new(0x10, Arc::new(SystemClock::new()));
    let probe = Inbox::new("probe", 256);
    bus.subscribe(&probe, &[catalog::ENTITY_STATE]);

    let ticks = Arc::new(AtomicU32::new(0));
    let task = Flaky {
        failures_left: Arc::new(AtomicU32::new(2)),
        ticks: ticks.clone(),
        frequency: 50.0,
    };
    let handle = spawn(task, settings("Flaky", &bus)).unwrap();

    // 两次 FAULT 上报后任务转入 NORMAL 并开始走拍。
    let mut states = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if let Some(env) = probe.wait(Duration::from_millis(50)) {
            if let Body::EntityState(EntityState { state, .. }) = &env.body {
                states.push(*state);
                if *state == EntityHealth::Normal {
                    break;
                }
            }
        }
    }
    handle.stop();
    handle.join();

    assert!(states.iter().filter(|s| **s == EntityHealth::Fault).count() >= 2);
    assert_eq!(states.last(), Some(&EntityHealth::Normal));
    assert!(ticks.load(Ordering::SeqCst) > 0, "periodic body never ran");
}

#[test]
fn bounded_retry_gives_up_with_failure() {
    let bus = Bus::new(0x10, Arc::new(SystemClock::new()));
    let probe = Inbox::new("probe", 256);
    bus.subscribe(&probe, &[catalog::ENTITY_STATE]);

    let task = Flaky {
        failures_left: Arc::new(AtomicU32::new(u32::MAX)),
        ticks: Arc::new(AtomicU32::new(0)),
        frequency: 50.0,
    };
    let mut cfg = settings("Doomed", &bus);
    cfg.retry = RetryPolicy { max_attempts: 3 };
    let handle = spawn(task, cfg).unwrap();

    let mut saw_failure = false;
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline && !saw_failure {
        if let Some(env) = probe.wait(Duration::from_millis(50)) {
            if let Body::EntityState(EntityState { state, .. }) = &env.body {
                saw_failure = *state == EntityHealth::Failure;
            }
        }
    }
    handle.join();
    assert!(saw_failure, "task never reported FAILURE");
}

struct Panicky;

impl Task for Panicky {
    fn schedule(&self) -> Schedule {
        Schedule::EventDriven {
            poll: Duration::from_millis(20),
        }
    }

    fn subscriptions(&self) -> Vec<keel_core::MessageId> {
        vec![catalog::HEARTBEAT]
    }

    fn on_envelope(&mut self, _ctx: &mut TaskContext, _env: &Envelope) {
        panic!("handler defect");
    }
}

#[test]
fn handler_panic_is_contained() {
    let bus = Bus::new(0x10, Arc::new(SystemClock::new()));
    let handle = spawn(Panicky, settings("Panicky", &bus)).unwrap();

    // 给任务时间完成订阅，再连续投两封：第二封证明线程没有死。
    std::thread::sleep(Duration::from_millis(100));
    for _ in 0..2 {
        bus.publish(
            Envelope {
                header: Default::default(),
                body: Body::Heartbeat(Heartbeat),
            },
            Default::default(),
            None,
        );
        std::thread::sleep(Duration::from_millis(50));
    }
    handle.stop();
    handle.join();
}
