//! # entity：进程内功能实体与健康状态
//!
//! ## 角色定位（Why）
//! - 实体是任务内部具名的功能单元，进程内以数值 id 唯一标识；监督者按实体聚合
//!   健康状态，所有对外可见的故障都落在某个实体身上。
//!
//! ## 行为契约（What）
//! - 预留（reserve）发生在任务启动期，同名预留幂等返回同一 id；
//! - 解析（resolve）把其他任务配置的标签换成数值 id，未登记的标签是错误——
//!   允许可选解析的任务应捕获错误落到 [`UNRESOLVED_ENTITY`] 哨兵；
//! - 健康状态机取值 {BOOT, NORMAL, FAULT, ERROR, FAILURE}，由任务自报、
//!   运行器周期发布。

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 解析失败时的哨兵实体 id。
pub const UNRESOLVED_ENTITY: u8 = u8::MAX;

/// 实体健康状态。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityHealth {
    #[default]
    Boot,
    Normal,
    Fault,
    Error,
    Failure,
}

/// 实体域错误。
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("entity label `{label}` is not registered")]
    Unknown { label: String },
    #[error("entity id space exhausted")]
    Exhausted,
}

/// 进程级实体注册表：标签 → 数值 id。
#[derive(Debug, Default)]
pub struct EntityRegistry {
    labels: DashMap<String, u8>,
    next: Mutex<u8>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预留一个实体 id；同名预留幂等。
    pub fn reserve(&self, label: &str) -> Result<u8, EntityError> {
        if let Some(id) = self.labels.get(label) {
            return Ok(*id);
        }
        let mut next = self.next.lock();
        // 双检：竞争的另一线程可能刚插入同名标签。
        if let Some(id) = self.labels.get(label) {
            return Ok(*id);
        }
        if *next >= UNRESOLVED_ENTITY {
            return Err(EntityError::Exhausted);
        }
        let id = *next;
        *next += 1;
        self.labels.insert(label.to_owned(), id);
        Ok(id)
    }

    /// 把标签解析为数值 id；未登记返回错误。
    pub fn resolve(&self, label: &str) -> Result<u8, EntityError> {
        self.labels
            .get(label)
            .map(|id| *id)
            .ok_or_else(|| EntityError::Unknown {
                label: label.to_owned(),
            })
    }

    /// 可选解析：未登记落到 [`UNRESOLVED_ENTITY`]。
    pub fn resolve_or_sentinel(&self, label: &str) -> u8 {
        self.resolve(label).unwrap_or(UNRESOLVED_ENTITY)
    }

    /// 反查实体标签（诊断用途，线性扫描）。
    pub fn label_of(&self, id: u8) -> Option<String> {
        self.labels
            .iter()
            .find(|e| *e.value() == id)
            .map(|e| e.key().clone())
    }
}
