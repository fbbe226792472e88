//! # runner：任务生命周期驱动器
//!
//! ## 设计背景（Why）
//! - 生命周期的每一步都可能失败，失败路径必须收敛：绑定期失败任务不启动，
//!   获取期瞬态失败走退避重试并把实体降到 FAULT，不可恢复失败落到 FAILURE；
//! - 处理器内的 panic 在这里被捕获：发布方永远不会因为某个订阅者的缺陷而受损。
//!
//! ## 行为契约（What）
//! - 每个任务独占一条 OS 线程；[`TaskHandle::stop`] 置协作停机标志，任务在
//!   挂起点（收件箱等待、退避睡眠、周期等待）察觉后按逆序退场；
//! - 周期任务：下一拍 = max(本拍计划时刻 + 1/F, now)；超限仅记日志；
//! - 收件箱溢出被降级为实体 FAULT 上报，溢出停止后自动回到 NORMAL。

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::bus::{Bus, Envelope, Inbox};
use crate::config::Config;
use crate::entity::{EntityHealth, EntityRegistry};
use crate::param::ParamBinder;
use crate::shared::SharedServices;
use crate::time::Clock;

use super::{Schedule, Task, TaskContext, TaskError};

/// 资源获取的重试策略。
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// 最大尝试次数；0 表示不设上限。
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_attempts: 0 }
    }
}

/// 任务装配所需的全部依赖与默认项。
pub struct TaskSettings {
    pub name: String,
    pub bus: Bus,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
    pub entities: Arc<EntityRegistry>,
    pub shared: SharedServices,
    pub inbox_capacity: usize,
    pub retry: RetryPolicy,
    /// 实体健康的周期上报间隔（秒）。
    pub entity_report_period: f64,
}

impl TaskSettings {
    pub fn new(
        name: &str,
        bus: Bus,
        clock: Arc<dyn Clock>,
        config: Arc<Config>,
        entities: Arc<EntityRegistry>,
        shared: SharedServices,
    ) -> Self {
        TaskSettings {
            name: name.to_owned(),
            bus,
            clock,
            config,
            entities,
            shared,
            inbox_capacity: 512,
            retry: RetryPolicy::default(),
            entity_report_period: 1.0,
        }
    }
}

/// 在独立线程上运行任务的句柄。
pub struct TaskHandle {
    name: String,
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 置协作停机标志；任务将在下一个挂起点察觉。
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// 等待任务线程退出。
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(task = %self.name, "task thread terminated by panic");
            }
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// 在独立 OS 线程上启动任务。
pub fn spawn<T: Task>(task: T, settings: TaskSettings) -> std::io::Result<TaskHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let name = settings.name.clone();
    let thread = std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || run(task, settings, stop_flag))?;
    Ok(TaskHandle {
        name,
        stop,
        thread: Some(thread),
    })
}

fn run<T: Task>(mut task: T, settings: TaskSettings, stop: Arc<AtomicBool>) {
    let inbox = Inbox::new(&settings.name, settings.inbox_capacity);
    let mut ctx = TaskContext::new(
        &settings.name,
        settings.bus.clone(),
        inbox,
        settings.clock.clone(),
        settings.entities.clone(),
        settings.shared.clone(),
        stop,
    );

    // 参数绑定：违例即任务不启动。
    let mut binder = ParamBinder::new(settings.config.section(&settings.name));
    if let Err(error) = task.declare_parameters(&mut binder) {
        tracing::error!(task = %ctx.name(), %error, "parameter binding failed; task will not start");
        return;
    }
    ctx.set_param_changes(binder.into_changes());
    task.on_update_parameters(&mut ctx);

    // 实体预留与解析。
    match settings.entities.reserve(ctx.name()) {
        Ok(id) => ctx.assign_entity(id),
        Err(error) => {
            tracing::error!(task = %ctx.name(), %error, "entity reservation failed");
            return;
        }
    }
    task.on_entity_reservation(&mut ctx, &settings.entities);
    if let Err(error) = task.on_entity_resolution(&mut ctx, &settings.entities) {
        tracing::error!(task = %ctx.name(), %error, "entity resolution failed; task will not start");
        return;
    }

    // 订阅在主循环前收集一次。
    let subscriptions = task.subscriptions();
    settings.bus.subscribe(ctx.inbox(), &subscriptions);

    // 资源获取：RestartNeeded 走退避重试，期间实体降到 FAULT。
    let mut attempts: u32 = 0;
    loop {
        if ctx.stopping() {
            return;
        }
        match task.on_resource_acquisition(&mut ctx) {
            Ok(()) => break,
            Err(TaskError::RestartNeeded { delay }) => {
                attempts += 1;
                if settings.retry.max_attempts > 0 && attempts >= settings.retry.max_attempts {
                    ctx.set_entity_state(EntityHealth::Failure, "resource acquisition gave up");
                    ctx.publish_entity_state();
                    tracing::error!(task = %ctx.name(), attempts, "resource acquisition gave up");
                    return;
                }
                ctx.set_entity_state(
                    EntityHealth::Fault,
                    format!("resource acquisition failed, retrying in {delay:?}"),
                );
                ctx.publish_entity_state();
                tracing::warn!(task = %ctx.name(), attempts, ?delay, "resource acquisition retry scheduled");
                sleep_with_stop(delay, &ctx);
            }
            Err(error) => {
                ctx.set_entity_state(EntityHealth::Failure, error.to_string());
                ctx.publish_entity_state();
                tracing::error!(task = %ctx.name(), %error, "resource acquisition failed");
                return;
            }
        }
    }

    if let Err(error) = task.on_resource_initialization(&mut ctx) {
        ctx.set_entity_state(EntityHealth::Failure, error.to_string());
        ctx.publish_entity_state();
        tracing::error!(task = %ctx.name(), %error, "resource initialization failed");
        task.on_resource_release(&mut ctx);
        return;
    }

    ctx.set_entity_state(EntityHealth::Normal, "active");
    ctx.publish_entity_state();
    tracing::info!(task = %ctx.name(), entity = ctx.entity(), "task entering main loop");

    match task.schedule() {
        Schedule::EventDriven { poll } => event_loop(&mut task, &mut ctx, poll, &settings),
        Schedule::Periodic { frequency } => periodic_loop(&mut task, &mut ctx, frequency, &settings),
    }

    // 逆序退场：先撤销激活，再释放资源。
    if ctx.is_active() {
        ctx.set_active(false);
        task.on_deactivation(&mut ctx);
    }
    task.on_resource_release(&mut ctx);
    tracing::info!(task = %ctx.name(), "task stopped");
}

fn event_loop<T: Task>(task: &mut T, ctx: &mut TaskContext, poll: Duration, settings: &TaskSettings) {
    let mut degraded = false;
    while !ctx.stopping() {
        if let Some(env) = ctx.inbox().wait(poll) {
            dispatch_envelope(task, ctx, &env);
            while let Some(env) = ctx.inbox().try_pop() {
                dispatch_envelope(task, ctx, &env);
            }
        }
        apply_activation(task, ctx);
        maintain(ctx, settings.entity_report_period, &mut degraded);
    }
}

fn periodic_loop<T: Task>(task: &mut T, ctx: &mut TaskContext, frequency: f64, settings: &TaskSettings) {
    let period = 1.0 / frequency.max(1e-3);
    let mut degraded = false;
    let mut next = ctx.now() + period;
    while !ctx.stopping() {
        let wait = (next - ctx.now()).clamp(0.0, 0.1);
        if let Some(env) = ctx.inbox().wait(Duration::from_secs_f64(wait)) {
            dispatch_envelope(task, ctx, &env);
            while let Some(env) = ctx.inbox().try_pop() {
                dispatch_envelope(task, ctx, &env);
            }
        }
        apply_activation(task, ctx);
        maintain(ctx, settings.entity_report_period, &mut degraded);

        let now = ctx.now();
        if now >= next {
            task.on_tick(ctx);
            apply_activation(task, ctx);
            let scheduled = next + period;
            if now > scheduled {
                tracing::warn!(task = %ctx.name(), late = now - scheduled, "periodic tick overrun");
                next = now;
            } else {
                next = scheduled;
            }
        }
    }
}

/// 统一的处理器分发：panic 被捕获、记日志并吞掉。
pub(crate) fn dispatch_envelope<T: Task>(task: &mut T, ctx: &mut TaskContext, env: &Arc<Envelope>) {
    let outcome = catch_unwind(AssertUnwindSafe(|| task.on_envelope(ctx, env.as_ref())));
    if outcome.is_err() {
        tracing::error!(
            task = %ctx.name(),
            msg = %env.body.name(),
            "message handler panicked; publisher unaffected"
        );
    }
}

/// 在分发间隙施加激活边沿。
pub(crate) fn apply_activation<T: Task>(task: &mut T, ctx: &mut TaskContext) {
    if let Some(wanted) = ctx.take_activation_request() {
        if wanted != ctx.is_active() {
            ctx.set_active(wanted);
            if wanted {
                task.on_activation(ctx);
            } else {
                task.on_deactivation(ctx);
            }
        }
    }
}

fn maintain(ctx: &mut TaskContext, report_period: f64, degraded: &mut bool) {
    let dropped = ctx.inbox().take_overflow();
    if dropped > 0 {
        tracing::warn!(task = %ctx.name(), dropped, "inbox overflow");
        ctx.set_entity_state(
            EntityHealth::Fault,
            format!("inbox overflowed, dropped {dropped} messages"),
        );
        *degraded = true;
    } else if *degraded && ctx.entity_health() == EntityHealth::Fault {
        ctx.set_entity_state(EntityHealth::Normal, "active");
        *degraded = false;
    }

    let now = ctx.now();
    if ctx.entity_dirty() || now - ctx.entity_last_report() >= report_period {
        ctx.publish_entity_state();
    }
}

fn sleep_with_stop(delay: Duration, ctx: &TaskContext) {
    let slice = Duration::from_millis(50);
    let mut remaining = delay;
    while !ctx.stopping() && !remaining.is_zero() {
        let nap = remaining.min(slice);
        std::thread::sleep(nap);
        remaining = remaining.saturating_sub(nap);
    }
}
