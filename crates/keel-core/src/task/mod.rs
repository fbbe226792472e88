//! # task：任务生命周期框架
//!
//! ## 核心意图（Why）
//! - 任务是生命周期受管的并发组件：构造 → 参数绑定 → 实体预留/解析 → 资源获取
//!   （可带退避重试）→ 资源初始化 → 主循环 → 资源释放；每一步都可能失败，
//!   失败的语义在 [`TaskError`] 里是类型化的值，不靠跨处理器边界抛异常；
//! - 每个任务独占一条 OS 线程；事件驱动任务阻塞在收件箱上，周期任务以
//!   “追赶但不突发”的节拍运行。
//!
//! ## 行为契约（What）
//! - 钩子默认全部为空实现；事件驱动任务至少覆写 [`Task::on_envelope`]，
//!   周期任务至少覆写 [`Task::on_tick`]；
//! - [`TaskError::RestartNeeded`] 只在资源获取期有意义：运行器把实体降到
//!   FAULT、睡过退避时延后重新进入获取；
//! - 激活边沿经 [`TaskContext::request_activation`] 申请、由运行器在两次分发
//!   之间统一施加，保证 `on_activation`/`on_deactivation` 不会在处理器内重入。

mod context;
mod runner;

pub use context::TaskContext;
pub use runner::{RetryPolicy, TaskHandle, TaskSettings, spawn};

pub(crate) use runner::apply_activation;

use std::time::Duration;

use thiserror::Error;

use crate::bus::{BusError, Envelope};
use crate::catalog::MessageId;
use crate::entity::{EntityError, EntityRegistry};
use crate::param::{ParamBinder, ParamError};

/// 任务的调度形态。
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Schedule {
    /// 事件驱动：主循环阻塞在收件箱上，最多 `poll` 后醒来检查停机标志。
    EventDriven { poll: Duration },
    /// 周期驱动：以 `frequency` Hz 调用 [`Task::on_tick`]，
    /// 下一拍 = max(本拍计划时刻 + 1/F, now)，超限记日志、不突发补偿。
    Periodic { frequency: f64 },
}

impl Schedule {
    /// 默认轮询 1 秒的事件驱动形态。
    pub fn event_driven() -> Self {
        Schedule::EventDriven {
            poll: Duration::from_secs(1),
        }
    }

    pub fn periodic(frequency: f64) -> Self {
        Schedule::Periodic { frequency }
    }
}

/// 任务域错误。
#[derive(Debug, Error)]
pub enum TaskError {
    /// 资源获取遇到瞬态故障，请在 `delay` 后重试（类型化的重启协议）。
    #[error("resource acquisition must be retried in {delay:?}")]
    RestartNeeded { delay: Duration },
    /// 不可恢复的资源故障。
    #[error("resource failure: {reason}")]
    Resource { reason: String },
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// 生命周期受管的并发组件。
///
/// # 契约说明（What）
/// - 所有钩子都在任务自己的线程上串行执行；任务状态只被该线程修改；
/// - [`Task::subscriptions`] 在主循环前收集一次；
/// - 处理器内的 panic 由运行器捕获、记日志并吞掉，发布方不受影响。
pub trait Task: Send + 'static {
    /// 调度形态；在参数绑定之后读取，因此可以由参数决定。
    fn schedule(&self) -> Schedule {
        Schedule::event_driven()
    }

    /// 需要订阅的消息 id 集合。
    fn subscriptions(&self) -> Vec<MessageId> {
        Vec::new()
    }

    /// 声明并绑定参数；每次重绑都会重新走一遍。
    fn declare_parameters(&mut self, _binder: &mut ParamBinder) -> Result<(), ParamError> {
        Ok(())
    }

    /// 参数（重）绑定完成后重算派生状态。
    fn on_update_parameters(&mut self, _ctx: &mut TaskContext) {}

    /// 预留默认实体之外的附加实体。
    fn on_entity_reservation(&mut self, _ctx: &mut TaskContext, _registry: &EntityRegistry) {}

    /// 把其他任务配置的实体标签解析为数值 id。
    ///
    /// 可选解析请捕获到 [`crate::entity::UNRESOLVED_ENTITY`] 哨兵，而不是让错误上抛。
    fn on_entity_resolution(
        &mut self,
        _ctx: &mut TaskContext,
        _registry: &EntityRegistry,
    ) -> Result<(), EntityError> {
        Ok(())
    }

    /// 获取 OS 资源；瞬态故障返回 [`TaskError::RestartNeeded`]。
    fn on_resource_acquisition(&mut self, _ctx: &mut TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    /// 资源就绪后的逻辑初始化。
    fn on_resource_initialization(&mut self, _ctx: &mut TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    /// 幂等的资源释放，任何退出路径都会走到。
    fn on_resource_release(&mut self, _ctx: &mut TaskContext) {}

    /// 激活边沿（控制器类任务使用）。
    fn on_activation(&mut self, _ctx: &mut TaskContext) {}

    fn on_deactivation(&mut self, _ctx: &mut TaskContext) {}

    /// 事件驱动主体：每封到达的信调用一次。
    fn on_envelope(&mut self, _ctx: &mut TaskContext, _env: &Envelope) {}

    /// 周期主体：按 [`Schedule::Periodic`] 的频率调用。
    fn on_tick(&mut self, _ctx: &mut TaskContext) {}
}
