//! # maneuver：机动框架
//!
//! ## 设计背景（Why）
//! - 全进程同一时刻至多一个机动任务在指挥载具；准入走进程级互斥锁的
//!   “try-lock + 500 ms 退避轮询”协议，拿不到就在自己的线程上等；
//! - 机动的生命周期对外只有三种信号：EXECUTING（带 ETA）、DONE、ERROR，
//!   统一经 `ManeuverControlState` 汇报给监督者。
//!
//! ## 行为契约（What）
//! - [`ManeuverCore::engage`] 阻塞直到取得机动权或任务停机；对已持有者幂等；
//! - `StopManeuver` 到达时若本机动持锁则释放并撤销激活；
//! - 信号方法不改内部状态，可在任意钩子里调用。

use std::time::Duration;

use keel_core::bus::Envelope;
use keel_core::catalog::{
    self, Body, ManeuverControlState, ManeuverState, MessageId,
};
use keel_core::param::{ParamBinder, ParamError, Units};
use keel_core::task::{Schedule, Task, TaskContext};
use keel_core::time::Countdown;

/// 机动锁准入的轮询退避。
pub const LOCK_RETRY: Duration = Duration::from_millis(500);

/// 机动任务的公共骨架：锁准入与生命周期信号。
#[derive(Debug)]
pub struct ManeuverCore {
    owner: String,
    engaged: bool,
}

impl ManeuverCore {
    pub fn new(owner: &str) -> Self {
        ManeuverCore {
            owner: owner.to_owned(),
            engaged: false,
        }
    }

    pub fn engaged(&self) -> bool {
        self.engaged
    }

    /// 取得机动权：try-lock 失败则睡 500 ms 再试，停机时放弃。
    pub fn engage(&mut self, ctx: &TaskContext) -> bool {
        loop {
            if ctx.shared().maneuver_lock.try_acquire(&self.owner) {
                self.engaged = true;
                return true;
            }
            if ctx.stopping() {
                return false;
            }
            tracing::debug!(owner = %self.owner, "maneuver lock busy, backing off");
            std::thread::sleep(LOCK_RETRY);
        }
    }

    /// 释放机动权（幂等）。
    pub fn disengage(&mut self, ctx: &TaskContext) {
        if self.engaged {
            ctx.shared().maneuver_lock.release(&self.owner);
            self.engaged = false;
        }
    }

    pub fn signal_progress(&self, ctx: &TaskContext, eta: u16) {
        ctx.dispatch(Body::ManeuverControlState(ManeuverControlState {
            state: ManeuverState::Executing,
            eta,
            info: String::new(),
        }));
    }

    pub fn signal_completion(&self, ctx: &TaskContext, info: &str) {
        ctx.dispatch(Body::ManeuverControlState(ManeuverControlState {
            state: ManeuverState::Done,
            eta: 0,
            info: info.to_owned(),
        }));
    }

    pub fn signal_error(&self, ctx: &TaskContext, info: &str) {
        ctx.dispatch(Body::ManeuverControlState(ManeuverControlState {
            state: ManeuverState::Error,
            eta: 0,
            info: info.to_owned(),
        }));
    }
}

/// 怠速机动任务：保持现状给定时长（0 表示无限期），到时汇报完成。
pub struct IdleTask {
    core: ManeuverCore,
    deadline: Countdown,
    frequency: f64,
}

impl IdleTask {
    pub fn new() -> Self {
        IdleTask {
            core: ManeuverCore::new("Idle"),
            deadline: Countdown::new(),
            frequency: 2.0,
        }
    }
}

impl Default for IdleTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for IdleTask {
    fn schedule(&self) -> Schedule {
        Schedule::periodic(self.frequency)
    }

    fn subscriptions(&self) -> Vec<MessageId> {
        vec![catalog::IDLE_MANEUVER, catalog::STOP_MANEUVER]
    }

    fn declare_parameters(&mut self, binder: &mut ParamBinder) -> Result<(), ParamError> {
        binder
            .param("Execution Frequency", &mut self.frequency)
            .defaults("2.0")
            .units(Units::Hertz)
            .minimum(0.5)
            .commit()
    }

    fn on_envelope(&mut self, ctx: &mut TaskContext, env: &Envelope) {
        match &env.body {
            Body::IdleManeuver(m) => {
                if !self.core.engage(ctx) {
                    return;
                }
                if m.duration > 0 {
                    self.deadline.reset(ctx.epoch(), f64::from(m.duration));
                } else {
                    self.deadline.clear();
                }
                ctx.request_activation();
                self.core.signal_progress(ctx, m.duration);
            }
            Body::StopManeuver(_) => {
                if self.core.engaged() {
                    self.core.disengage(ctx);
                    self.deadline.clear();
                    ctx.request_deactivation();
                }
            }
            _ => {}
        }
    }

    fn on_tick(&mut self, ctx: &mut TaskContext) {
        if self.core.engaged() && self.deadline.overflowed(ctx.epoch()) {
            self.deadline.clear();
            self.core.signal_completion(ctx, "idle time elapsed");
        }
    }

    fn on_deactivation(&mut self, ctx: &mut TaskContext) {
        self.core.disengage(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::catalog::{IdleManeuver, StopManeuver};
    use keel_core::config::Config;
    use keel_core::testing::TestBench;

    #[test]
    fn idle_runs_for_duration_and_completes() {
        let bench = TestBench::new();
        bench.probe(&[catalog::MANEUVER_CONTROL_STATE]);
        let mut task = IdleTask::new();
        let mut ctx = bench.context("Idle");
        bench.commission(&mut task, &mut ctx, &Config::new()).unwrap();

        bench.deliver(
            &mut task,
            &mut ctx,
            Body::IdleManeuver(IdleManeuver { duration: 5 }),
        );
        assert!(bench.shared.maneuver_lock.holder().is_some());
        let bodies = bench.drain_bodies();
        assert!(bodies.iter().any(|b| matches!(
            b,
            Body::ManeuverControlState(m) if m.state == ManeuverState::Executing
        )));

        bench.advance(4.0);
        bench.tick(&mut task, &mut ctx);
        assert!(bench.drain_bodies().is_empty());
        bench.advance(1.5);
        bench.tick(&mut task, &mut ctx);
        let bodies = bench.drain_bodies();
        assert!(bodies.iter().any(|b| matches!(
            b,
            Body::ManeuverControlState(m) if m.state == ManeuverState::Done
        )));
    }

    #[test]
    fn stop_maneuver_releases_the_lock() {
        let bench = TestBench::new();
        bench.probe(&[catalog::MANEUVER_CONTROL_STATE]);
        let mut task = IdleTask::new();
        let mut ctx = bench.context("Idle");
        bench.commission(&mut task, &mut ctx, &Config::new()).unwrap();

        bench.deliver(
            &mut task,
            &mut ctx,
            Body::IdleManeuver(IdleManeuver { duration: 0 }),
        );
        assert!(bench.shared.maneuver_lock.holder().is_some());
        bench.deliver(&mut task, &mut ctx, Body::StopManeuver(StopManeuver));
        assert!(bench.shared.maneuver_lock.holder().is_none());
    }
}
