//! # bus：进程内类型化发布/订阅总线
//!
//! ## 核心意图（Why）
//! - 组件之间没有任何直接调用：每一次状态流动都是一次带来源标识与时间戳的发布；
//! - 订阅按静态消息 id 登记，分发热路径只查一次订阅表、做一次 `Arc` 克隆。
//!
//! ## 行为契约（What）
//! - [`Bus::publish`]：来源系统/实体未填写时由总线补齐，时间戳除非 `keep_time`
//!   否则盖为当前壁钟；`loop_back` 才会回投给发布者自己；
//! - 投递语义：对 (发布者, 订阅者, 类型) 三元组 FIFO；跨发布者无顺序保证；
//! - 订阅者各自持有有界收件箱（见 [`Inbox`]），发布方从不内联执行处理器；
//! - [`Bus::bind_to_list`]：按缩写名动态订阅，未知名字是致命配置错误。
//!
//! ## 风险提示（Trade-offs）
//! - 载荷以 `Arc<Envelope>` 共享而非逐订阅者深拷贝：接收方拿到的是不可变快照，
//!   语义与按值拷贝一致，代价是所有订阅者看到同一份内存。

mod inbox;

pub use inbox::Inbox;

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Body, MessageId};
use crate::time::Clock;

/// 广播目的系统。
pub const BROADCAST_SYSTEM: u16 = 0xFFFF;
/// 广播目的实体。
pub const BROADCAST_ENTITY: u8 = 0xFF;
/// “尚未填写”的来源系统哨兵值，发布时由总线替换。
pub const UNSET_SYSTEM: u16 = 0;

/// 信封头：来源/目的标识与时间戳（Unix 纪元秒）。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub src: u16,
    pub src_ent: u8,
    pub dst: u16,
    pub dst_ent: u8,
    pub time: f64,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            src: UNSET_SYSTEM,
            src_ent: BROADCAST_ENTITY,
            dst: BROADCAST_SYSTEM,
            dst_ent: BROADCAST_ENTITY,
            time: 0.0,
        }
    }
}

/// 一封在总线上流动的信。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub header: Header,
    pub body: Body,
}

/// 发布选项。
#[derive(Clone, Copy, Debug, Default)]
pub struct PublishFlags {
    /// 保留信封里已有的时间戳（转发场景）。
    pub keep_time: bool,
    /// 把消息也投回发布者自己的收件箱。
    pub loop_back: bool,
}

/// 总线错误域。
#[derive(Debug, Error)]
pub enum BusError {
    /// 订阅期出现目录之外的消息名，属于致命配置错误。
    #[error("message name `{name}` is not in the catalog")]
    UnknownMessage { name: String },
}

#[derive(Debug)]
struct Subscriber {
    shared: Arc<inbox::InboxShared>,
    /// 可选的来源实体过滤。
    src_ent: Option<u8>,
}

struct BusInner {
    system_id: u16,
    clock: Arc<dyn Clock>,
    topics: DashMap<MessageId, Vec<Subscriber>>,
}

/// 总线句柄，可廉价克隆给每个任务。
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    /// 以本机系统 id 与时钟创建总线。
    pub fn new(system_id: u16, clock: Arc<dyn Clock>) -> Self {
        Bus {
            inner: Arc::new(BusInner {
                system_id,
                clock,
                topics: DashMap::new(),
            }),
        }
    }

    /// 本机系统 id。
    pub fn system_id(&self) -> u16 {
        self.inner.system_id
    }

    /// 把收件箱登记到给定消息 id 集合上。重复登记是幂等的。
    pub fn subscribe(&self, inbox: &Inbox, ids: &[MessageId]) {
        for &id in ids {
            self.register(inbox, id, None);
        }
    }

    /// 登记订阅并附加来源实体过滤（用于重载消费者）。
    pub fn subscribe_filtered(&self, inbox: &Inbox, id: MessageId, src_ent: u8) {
        self.register(inbox, id, Some(src_ent));
    }

    /// 按缩写名动态订阅（传输类任务据此得知需要外发哪些消息）。
    pub fn bind_to_list(&self, inbox: &Inbox, names: &[&str]) -> Result<(), BusError> {
        // 先整体解析再登记，避免部分生效。
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let id = crate::catalog::lookup(name).ok_or_else(|| BusError::UnknownMessage {
                name: (*name).to_owned(),
            })?;
            ids.push(id);
        }
        self.subscribe(inbox, &ids);
        Ok(())
    }

    fn register(&self, inbox: &Inbox, id: MessageId, src_ent: Option<u8>) {
        let mut entry = self.inner.topics.entry(id).or_default();
        let exists = entry
            .iter()
            .any(|s| Arc::ptr_eq(&s.shared, &inbox.shared) && s.src_ent == src_ent);
        if !exists {
            entry.push(Subscriber {
                shared: inbox.shared.clone(),
                src_ent,
            });
        }
    }

    /// 发布一封信。
    ///
    /// # 契约说明（What）
    /// - `exclude`：发布者自己的收件箱；除非 `loop_back`，否则跳过它；
    /// - 来源系统为 [`UNSET_SYSTEM`] 时盖为本机系统 id；
    /// - 时间戳除非 `keep_time` 否则盖为 `Clock::epoch()`。
    pub fn publish(&self, mut envelope: Envelope, flags: PublishFlags, exclude: Option<&Inbox>) {
        if envelope.header.src == UNSET_SYSTEM {
            envelope.header.src = self.inner.system_id;
        }
        if !flags.keep_time {
            envelope.header.time = self.inner.clock.epoch();
        }
        let id = envelope.body.id();
        let src_ent = envelope.header.src_ent;
        let env = Arc::new(envelope);
        if let Some(subs) = self.inner.topics.get(&id) {
            for sub in subs.iter() {
                if let Some(filter) = sub.src_ent {
                    if filter != src_ent {
                        continue;
                    }
                }
                if !flags.loop_back {
                    if let Some(own) = exclude {
                        if Arc::ptr_eq(&sub.shared, &own.shared) {
                            continue;
                        }
                    }
                }
                sub.shared.push(env.clone());
            }
        }
    }
}
