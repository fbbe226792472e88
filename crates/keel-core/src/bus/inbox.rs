//! # inbox：订阅方独占的有界收件箱
//!
//! ## 核心意图（Why）
//! - 每个任务拥有独立收件箱，慢消费者不得反压发布方；
//! - 溢出必须可观测：丢弃最旧样本并累计计数，由任务运行器降级为实体 FAULT 上报，
//!   绝不静默吞掉。
//!
//! ## 行为契约（What）
//! - 单一互斥锁保护的 FIFO 队列：对同一订阅方，投递顺序即发布顺序；
//! - [`Inbox::wait`] 阻塞至有消息或超时，这是任务主循环唯一的挂起点之一；
//! - 控制系统偏好新鲜数据，容量耗尽时淘汰队首（最旧）样本。

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::Envelope;

#[derive(Debug)]
pub(crate) struct InboxShared {
    queue: Mutex<VecDeque<Arc<Envelope>>>,
    ready: Condvar,
    capacity: usize,
    overflow: AtomicU64,
}

impl InboxShared {
    /// 入队一封信；满载时淘汰最旧样本并累计溢出。
    pub(crate) fn push(&self, env: Arc<Envelope>) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.overflow.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(env);
        drop(queue);
        self.ready.notify_one();
    }
}

/// 任务侧的收件箱句柄。
#[derive(Clone, Debug)]
pub struct Inbox {
    label: Arc<str>,
    pub(crate) shared: Arc<InboxShared>,
}

impl Inbox {
    /// 以给定标签与容量创建收件箱。
    ///
    /// - **前置条件**：`capacity ≥ 1`；0 会被提升为 1。
    pub fn new(label: &str, capacity: usize) -> Self {
        Inbox {
            label: Arc::from(label),
            shared: Arc::new(InboxShared {
                queue: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
                capacity: capacity.max(1),
                overflow: AtomicU64::new(0),
            }),
        }
    }

    /// 收件箱标签（等于任务名）。
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 阻塞等待下一封信，最多 `timeout`。
    pub fn wait(&self, timeout: Duration) -> Option<Arc<Envelope>> {
        let mut queue = self.shared.queue.lock();
        if let Some(env) = queue.pop_front() {
            return Some(env);
        }
        let result = self.shared.ready.wait_for(&mut queue, timeout);
        if result.timed_out() {
            // 超时与唤醒可能竞争，最后再探一次队列。
            return queue.pop_front();
        }
        queue.pop_front()
    }

    /// 非阻塞取信。
    pub fn try_pop(&self) -> Option<Arc<Envelope>> {
        self.shared.queue.lock().pop_front()
    }

    /// 当前积压长度。
    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取走并清零溢出计数。
    pub fn take_overflow(&self) -> u64 {
        self.shared.overflow.swap(0, Ordering::Relaxed)
    }
}
