//! # shared：进程级共享资源服务
//!
//! ## 设计背景（Why）
//! - 机动互斥锁与活动控制环掩码是全进程只有一份的状态；它们以显式构造的服务
//!   对象注入各任务，绝不从静态初始化器里触碰；
//! - 锁纪律：这里的互斥锁都只在极短临界区内持有，任何调用方不得跨总线发布持锁。
//!
//! ## 契约说明（What）
//! - [`ManeuverLock`]：非递归 try-lock；准入协议是“try + 500 ms 退避轮询”，
//!   由机动框架实现，本服务只提供原子的尝试与释放；
//! - [`LoopRegistry`]：控制环位掩码以并集/差集维护，保证每一位只有一个认领者。

use std::sync::Arc;

use parking_lot::Mutex;

/// 进程级机动准入锁。
///
/// - **契约 (What)**：`try_acquire` 对同一持有者幂等；`release` 只有持有者本人
///   生效，返回是否真正释放。
#[derive(Debug, Default)]
pub struct ManeuverLock {
    owner: Mutex<Option<String>>,
}

impl ManeuverLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试取得机动权。
    pub fn try_acquire(&self, who: &str) -> bool {
        let mut owner = self.owner.lock();
        match owner.as_deref() {
            None => {
                *owner = Some(who.to_owned());
                true
            }
            Some(current) => current == who,
        }
    }

    /// 释放机动权（仅持有者生效）。
    pub fn release(&self, who: &str) -> bool {
        let mut owner = self.owner.lock();
        if owner.as_deref() == Some(who) {
            *owner = None;
            true
        } else {
            false
        }
    }

    /// 当前持有者。
    pub fn holder(&self) -> Option<String> {
        self.owner.lock().clone()
    }
}

/// 活动控制环掩码注册表。
#[derive(Debug, Default)]
pub struct LoopRegistry {
    mask: Mutex<u32>,
}

impl LoopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 并入 `bits`，返回新掩码。
    pub fn enable(&self, bits: u32) -> u32 {
        let mut mask = self.mask.lock();
        *mask |= bits;
        *mask
    }

    /// 差去 `bits`，返回新掩码。
    pub fn disable(&self, bits: u32) -> u32 {
        let mut mask = self.mask.lock();
        *mask &= !bits;
        *mask
    }

    /// 当前掩码。
    pub fn mask(&self) -> u32 {
        *self.mask.lock()
    }
}

/// 注入给每个任务的共享服务束。
#[derive(Clone, Debug)]
pub struct SharedServices {
    pub maneuver_lock: Arc<ManeuverLock>,
    pub loops: Arc<LoopRegistry>,
}

impl SharedServices {
    pub fn new() -> Self {
        SharedServices {
            maneuver_lock: Arc::new(ManeuverLock::new()),
            loops: Arc::new(LoopRegistry::new()),
        }
    }
}

impl Default for SharedServices {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maneuver_lock_single_owner() {
        let lock = ManeuverLock::new();
        assert!(lock.try_acquire("goto"));
        assert!(lock.try_acquire("goto"));
        assert!(!lock.try_acquire("loiter"));
        assert!(!lock.release("loiter"));
        assert!(lock.release("goto"));
        assert!(lock.try_acquire("loiter"));
    }

    #[test]
    fn loop_registry_union_difference() {
        let reg = LoopRegistry::new();
        assert_eq!(reg.enable(0b0110), 0b0110);
        assert_eq!(reg.enable(0b0001), 0b0111);
        assert_eq!(reg.disable(0b0010), 0b0101);
        assert_eq!(reg.mask(), 0b0101);
    }
}
