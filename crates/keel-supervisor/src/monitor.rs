//! # monitor：实体健康聚合
//!
//! ## 角色定位（Where）
//! - 任务运行器替每个任务周期发布 `EntityState`；本任务按来源实体 id 收拢
//!   这些快照，聚合成 `EntityMonitoringState` 喂给监督者——监督者据此仲裁
//!   ERROR 模式，自己从不直接消费散装的实体快照。
//!
//! ## 行为契约（What）
//! - ERROR 与 FAILURE 计入错误名单；BOOT/NORMAL/FAULT 计入正常名单
//!   （FAULT 是降级而非失效，不触发载具级错误）；
//! - 名单以逗号分隔的实体标签表示，标签查不到时退回数值 id；
//! - 汇总按执行频率周期发布，另在错误集合发生变化时立即发布一次。

use std::collections::BTreeMap;

use keel_core::bus::Envelope;
use keel_core::catalog::{self, Body, EntityMonitoringState, MessageId};
use keel_core::entity::EntityHealth;
use keel_core::param::{ParamBinder, ParamError, Units};
use keel_core::task::{Schedule, Task, TaskContext};

#[derive(Clone, Debug)]
struct Record {
    label: String,
    health: EntityHealth,
}

/// 实体监控聚合任务。
pub struct EntityMonitor {
    frequency: f64,
    records: BTreeMap<u8, Record>,
    last_error: Option<(String, f64)>,
    last_ecount: usize,
}

impl EntityMonitor {
    pub fn new() -> Self {
        EntityMonitor {
            frequency: 1.0,
            records: BTreeMap::new(),
            last_error: None,
            last_ecount: 0,
        }
    }

    fn is_error(health: EntityHealth) -> bool {
        matches!(health, EntityHealth::Error | EntityHealth::Failure)
    }

    fn summary(&self) -> EntityMonitoringState {
        let mut cnames = Vec::new();
        let mut enames = Vec::new();
        for record in self.records.values() {
            if Self::is_error(record.health) {
                enames.push(record.label.clone());
            } else {
                cnames.push(record.label.clone());
            }
        }
        let (last_error, last_error_time) =
            self.last_error.clone().unwrap_or((String::new(), 0.0));
        EntityMonitoringState {
            ccount: cnames.len().min(u8::MAX as usize) as u8,
            cnames: cnames.join(","),
            ecount: enames.len().min(u8::MAX as usize) as u8,
            enames: enames.join(","),
            last_error,
            last_error_time,
        }
    }

    fn publish(&mut self, ctx: &TaskContext) {
        let summary = self.summary();
        self.last_ecount = summary.ecount as usize;
        ctx.dispatch(Body::EntityMonitoringState(summary));
    }
}

impl Default for EntityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for EntityMonitor {
    fn schedule(&self) -> Schedule {
        Schedule::periodic(self.frequency)
    }

    fn subscriptions(&self) -> Vec<MessageId> {
        vec![catalog::ENTITY_STATE]
    }

    fn declare_parameters(&mut self, binder: &mut ParamBinder) -> Result<(), ParamError> {
        binder
            .param("Execution Frequency", &mut self.frequency)
            .defaults("1.0")
            .units(Units::Hertz)
            .minimum(0.1)
            .commit()
    }

    fn on_envelope(&mut self, ctx: &mut TaskContext, env: &Envelope) {
        let Body::EntityState(es) = &env.body else {
            return;
        };
        let id = env.header.src_ent;
        let label = ctx
            .entities()
            .label_of(id)
            .unwrap_or_else(|| format!("entity {id}"));
        if Self::is_error(es.state) {
            self.last_error = Some((
                format!("{label}: {}", es.description),
                env.header.time,
            ));
        }
        self.records.insert(
            id,
            Record {
                label,
                health: es.state,
            },
        );
        // 错误集合变化即时可见，不等下一拍。
        let ecount = self
            .records
            .values()
            .filter(|r| Self::is_error(r.health))
            .count();
        if ecount != self.last_ecount {
            self.publish(ctx);
        }
    }

    fn on_tick(&mut self, ctx: &mut TaskContext) {
        self.publish(ctx);
    }
}
