//! # testing：状态机与任务的同线程测试台
//!
//! ## 设计背景（Why）
//! - 监督者与控制器的行为全部由“消息进 → 消息出”定义；测试要逐秒可控，
//!   就不能让任务真的睡在自己的线程上；
//! - 测试台把运行器的分发/激活/实体上报流程在调用方线程上重演：任务代码
//!   与生产路径完全一致，只有调度被拿掉。
//!
//! ## 契约说明（What）
//! - [`TestBench::deliver`] 直接调用 `on_envelope`，随后施加激活边沿并补发
//!   脏实体快照——与运行器在分发间隙做的一致；
//! - 探针收件箱订阅感兴趣的消息 id，[`TestBench::drain_bodies`] 取走全部发布。

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::bus::{Bus, Envelope, Header, Inbox};
use crate::catalog::{Body, MessageId};
use crate::config::Config;
use crate::entity::{EntityHealth, EntityRegistry};
use crate::param::ParamBinder;
use crate::shared::SharedServices;
use crate::task::{Task, TaskContext, TaskError, apply_activation};
use crate::time::{Clock, MockClock};

/// 测试场景里扮演“外部系统”的来源 id。
pub const PEER_SYSTEM: u16 = 0x02;

/// 同线程测试台。
pub struct TestBench {
    pub bus: Bus,
    pub clock: Arc<MockClock>,
    pub entities: Arc<EntityRegistry>,
    pub shared: SharedServices,
    probe: Inbox,
}

impl TestBench {
    pub fn new() -> Self {
        let clock = Arc::new(MockClock::new());
        let bus = Bus::new(0x01, clock.clone());
        TestBench {
            bus,
            clock,
            entities: Arc::new(EntityRegistry::new()),
            shared: SharedServices::new(),
            probe: Inbox::new("probe", 1024),
        }
    }

    /// 让探针订阅给定消息 id。
    pub fn probe(&self, ids: &[MessageId]) {
        self.bus.subscribe(&self.probe, ids);
    }

    /// 取走探针里积压的全部信封。
    pub fn drain(&self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Some(env) = self.probe.try_pop() {
            out.push((*env).clone());
        }
        out
    }

    /// 取走探针里积压的全部载荷。
    pub fn drain_bodies(&self) -> Vec<Body> {
        self.drain().into_iter().map(|e| e.body).collect()
    }

    /// 为任务构造一份独立上下文。
    pub fn context(&self, name: &str) -> TaskContext {
        let inbox = Inbox::new(name, 256);
        let mut ctx = TaskContext::new(
            name,
            self.bus.clone(),
            inbox,
            self.clock.clone(),
            self.entities.clone(),
            self.shared.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        let id = self
            .entities
            .reserve(name)
            .expect("entity id space exhausted in test bench");
        ctx.assign_entity(id);
        ctx
    }

    /// 同步跑完主循环前的全部生命周期（无退避重试，错误直接上抛）。
    pub fn commission<T: Task>(
        &self,
        task: &mut T,
        ctx: &mut TaskContext,
        config: &Config,
    ) -> Result<(), TaskError> {
        let mut binder = ParamBinder::new(config.section(ctx.name()));
        task.declare_parameters(&mut binder)?;
        ctx.set_param_changes(binder.into_changes());
        task.on_update_parameters(ctx);
        task.on_entity_reservation(ctx, &self.entities);
        task.on_entity_resolution(ctx, &self.entities)?;
        let subscriptions = task.subscriptions();
        self.bus.subscribe(ctx.inbox(), &subscriptions);
        task.on_resource_acquisition(ctx)?;
        task.on_resource_initialization(ctx)?;
        ctx.set_entity_state(EntityHealth::Normal, "active");
        Ok(())
    }

    /// 以外部系统身份投递一封信。
    pub fn deliver<T: Task>(&self, task: &mut T, ctx: &mut TaskContext, body: Body) {
        self.deliver_from(task, ctx, body, 0);
    }

    /// 指定来源实体投递（实体过滤场景）。
    pub fn deliver_from<T: Task>(
        &self,
        task: &mut T,
        ctx: &mut TaskContext,
        body: Body,
        src_ent: u8,
    ) {
        let env = Envelope {
            header: Header {
                src: PEER_SYSTEM,
                src_ent,
                time: self.clock.epoch(),
                ..Header::default()
            },
            body,
        };
        task.on_envelope(ctx, &env);
        apply_activation(task, ctx);
        self.flush_entity(ctx);
    }

    /// 触发一次周期主体。
    pub fn tick<T: Task>(&self, task: &mut T, ctx: &mut TaskContext) {
        task.on_tick(ctx);
        apply_activation(task, ctx);
        self.flush_entity(ctx);
    }

    /// 推进虚拟时钟。
    pub fn advance(&self, secs: f64) {
        self.clock.advance(secs);
    }

    fn flush_entity(&self, ctx: &mut TaskContext) {
        if ctx.entity_dirty() {
            ctx.publish_entity_state();
        }
    }
}

impl Default for TestBench {
    fn default() -> Self {
        Self::new()
    }
}
