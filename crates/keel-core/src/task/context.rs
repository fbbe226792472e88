//! # context：任务与框架之间的执行上下文
//!
//! 任务通过 [`TaskContext`] 发布消息、读时钟、报告实体健康、申请激活边沿。
//! 上下文由运行器（或测试台）构造，生命周期与任务线程一致。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bus::{BROADCAST_ENTITY, BROADCAST_SYSTEM, Bus, Envelope, Header, Inbox, PublishFlags, UNSET_SYSTEM};
use crate::catalog::{Body, EntityState};
use crate::entity::{EntityHealth, EntityRegistry, UNRESOLVED_ENTITY};
use crate::shared::SharedServices;
use crate::time::Clock;

#[derive(Debug)]
struct EntityCell {
    id: u8,
    health: EntityHealth,
    description: String,
    dirty: bool,
    last_report: f64,
}

#[derive(Debug, Default)]
struct Activation {
    active: bool,
    requested: Option<bool>,
}

/// 任务执行上下文。
pub struct TaskContext {
    name: String,
    bus: Bus,
    inbox: Inbox,
    clock: Arc<dyn Clock>,
    entities: Arc<EntityRegistry>,
    shared: SharedServices,
    stopping: Arc<AtomicBool>,
    entity: EntityCell,
    activation: Activation,
    param_changes: BTreeMap<String, bool>,
}

impl TaskContext {
    /// 由运行器或测试台构造。
    pub fn new(
        name: &str,
        bus: Bus,
        inbox: Inbox,
        clock: Arc<dyn Clock>,
        entities: Arc<EntityRegistry>,
        shared: SharedServices,
        stopping: Arc<AtomicBool>,
    ) -> Self {
        TaskContext {
            name: name.to_owned(),
            bus,
            inbox,
            clock,
            entities,
            shared,
            stopping,
            entity: EntityCell {
                id: UNRESOLVED_ENTITY,
                health: EntityHealth::Boot,
                description: String::new(),
                dirty: false,
                last_report: 0.0,
            },
            activation: Activation::default(),
            param_changes: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn shared(&self) -> &SharedServices {
        &self.shared
    }

    /// 任务默认实体的数值 id。
    pub fn entity(&self) -> u8 {
        self.entity.id
    }

    pub(crate) fn assign_entity(&mut self, id: u8) {
        self.entity.id = id;
    }

    /// 单调时间（秒）。
    pub fn now(&self) -> f64 {
        self.clock.monotonic()
    }

    /// 壁钟时间（Unix 纪元秒）。
    pub fn epoch(&self) -> f64 {
        self.clock.epoch()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// 协作停机标志；任务应在挂起点检查。
    pub fn stopping(&self) -> bool {
        self.stopping.load(Ordering::Relaxed)
    }

    /// 以本任务身份发布一封广播信。
    pub fn dispatch(&self, body: Body) {
        self.dispatch_with(body, PublishFlags::default());
    }

    pub fn dispatch_with(&self, body: Body, flags: PublishFlags) {
        let envelope = Envelope {
            header: Header {
                src: UNSET_SYSTEM,
                src_ent: self.entity.id,
                dst: BROADCAST_SYSTEM,
                dst_ent: BROADCAST_ENTITY,
                time: 0.0,
            },
            body,
        };
        self.bus.publish(envelope, flags, Some(&self.inbox));
    }

    /// 当前激活状态。
    pub fn is_active(&self) -> bool {
        self.activation.active
    }

    /// 申请激活；边沿由运行器在分发间隙统一施加。
    pub fn request_activation(&mut self) {
        self.activation.requested = Some(true);
    }

    pub fn request_deactivation(&mut self) {
        self.activation.requested = Some(false);
    }

    pub(crate) fn take_activation_request(&mut self) -> Option<bool> {
        self.activation.requested.take()
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.activation.active = active;
    }

    /// 上次绑定中给定参数是否发生了变化。
    pub fn parameter_changed(&self, name: &str) -> bool {
        self.param_changes.get(name).copied().unwrap_or(false)
    }

    pub(crate) fn set_param_changes(&mut self, changes: BTreeMap<String, bool>) {
        self.param_changes = changes;
    }

    /// 报告实体健康；实际发布由运行器按脏标志与节拍执行。
    pub fn set_entity_state(&mut self, health: EntityHealth, description: impl Into<String>) {
        let description = description.into();
        if self.entity.health != health || self.entity.description != description {
            self.entity.health = health;
            self.entity.description = description;
            self.entity.dirty = true;
        }
    }

    pub fn entity_health(&self) -> EntityHealth {
        self.entity.health
    }

    pub fn entity_description(&self) -> &str {
        &self.entity.description
    }

    /// 立即发布一份实体健康快照并清除脏标志。
    pub fn publish_entity_state(&mut self) {
        let body = Body::EntityState(EntityState {
            state: self.entity.health,
            description: self.entity.description.clone(),
        });
        self.dispatch(body);
        self.entity.dirty = false;
        self.entity.last_report = self.clock.monotonic();
    }

    pub(crate) fn entity_dirty(&self) -> bool {
        self.entity.dirty
    }

    pub(crate) fn entity_last_report(&self) -> f64 {
        self.entity.last_report
    }
}
