//! # time：可注入时钟与一次性倒计时
//!
//! ## 设计背景（Why）
//! - 监督者的 switch 计时、路径监视器与贴底跟踪的节流全都依赖可靠时间来源；
//!   直接读系统时钟会让这些状态机在测试里不可复现；
//! - 通过 trait 注入时钟：生产环境用 [`SystemClock`]，测试用手动推进的
//!   [`MockClock`]。
//!
//! ## 契约说明（What）
//! - `monotonic` 单调不减（秒）；`epoch` 为 Unix 纪元秒，可被时间同步权威
//!   通过 [`SystemClock::set_epoch`] 校正，重复施加同一目标值是幂等的；
//! - [`Countdown`] 是纯值对象，所有查询都显式传入 `now`，不内嵌时钟引用。

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

/// 统一的时间来源。
pub trait Clock: Send + Sync + 'static {
    /// 单调时间（秒），原点任意。
    fn monotonic(&self) -> f64;
    /// 壁钟时间（Unix 纪元秒）。
    fn epoch(&self) -> f64;
}

/// 生产时钟：`Instant` 提供单调源，`SystemTime` 加校正偏移提供纪元源。
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
    /// 时间同步权威设置的纪元校正量（秒）。
    offset: RwLock<f64>,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
            offset: RwLock::new(0.0),
        }
    }

    /// 将纪元时间校正到 `epoch`。
    ///
    /// - **契约 (What)**：只允许时间同步权威调用；以绝对目标值计算偏移，
    ///   因此对同一目标值重复施加是幂等的。
    pub fn set_epoch(&self, epoch: f64) {
        let raw = raw_epoch();
        *self.offset.write() = epoch - raw;
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

fn raw_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

impl Clock for SystemClock {
    fn monotonic(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn epoch(&self) -> f64 {
        raw_epoch() + *self.offset.read()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct MockState {
    monotonic: f64,
    epoch: f64,
}

/// 虚拟时钟：手动推进，保证状态机测试逐秒可控。
#[derive(Debug, Default)]
pub struct MockClock {
    state: Mutex<MockState>,
}

impl MockClock {
    /// 单调与纪元都从 0 起步。
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定纪元起点构造。
    pub fn with_epoch(epoch: f64) -> Self {
        MockClock {
            state: Mutex::new(MockState {
                monotonic: 0.0,
                epoch,
            }),
        }
    }

    /// 同时推进两条时间轴。
    pub fn advance(&self, secs: f64) {
        let mut state = self.state.lock();
        state.monotonic += secs;
        state.epoch += secs;
    }

    /// 直接设定纪元时间（不动单调轴）。
    pub fn set_epoch(&self, epoch: f64) {
        self.state.lock().epoch = epoch;
    }
}

impl Clock for MockClock {
    fn monotonic(&self) -> f64 {
        self.state.lock().monotonic
    }

    fn epoch(&self) -> f64 {
        self.state.lock().epoch
    }
}

/// 一次性倒计时。
///
/// # 契约说明（What）
/// - 未装载（disarmed）时 [`Countdown::overflowed`] 恒为假；
/// - [`Countdown::reset`] 以“调用时刻 + 时长”重新装载；
/// - 多个用途共享同一实例时，调用方自行保证任一时刻至多一个用途装载。
#[derive(Clone, Copy, Debug, Default)]
pub struct Countdown {
    deadline: Option<f64>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在 `now` 时刻装载 `duration` 秒。
    pub fn reset(&mut self, now: f64, duration: f64) {
        self.deadline = Some(now + duration.max(0.0));
    }

    /// 卸载。
    pub fn clear(&mut self) {
        self.deadline = None;
    }

    /// 是否处于装载状态。
    pub fn armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// 是否已到期（未装载时恒为假）。
    pub fn overflowed(&self, now: f64) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// 剩余秒数（未装载或已到期为 0）。
    pub fn remaining(&self, now: f64) -> f64 {
        self.deadline.map_or(0.0, |d| (d - now).max(0.0))
    }
}
