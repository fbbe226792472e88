#![doc = "keel-core: 无人载具（UUV/UAV）机载控制框架的运行时核心。"]
#![doc = ""]
#![doc = "== 职责边界 =="]
#![doc = "本 crate 收纳四件事：类型化进程内消息总线、任务生命周期框架（实体、参数、周期调度）、"]
#![doc = "进程级共享服务（机动互斥锁、控制环掩码、时钟），以及供各控制 crate 复用的 WGS-84 几何工具。"]
#![doc = "设备驱动、导航滤波内部与线缆序列化都是外部协作者，不在此处出现。"]
#![doc = ""]
#![doc = "== 并发模型 =="]
#![doc = "每个任务独占一条 OS 线程，通过总线收件箱阻塞等待消息；任务内部的处理器串行执行，"]
#![doc = "任务状态只被自身线程修改。发布方从不内联执行订阅方的处理器。"]
#![doc = "锁纪律：任意时刻至多持有一把互斥锁，且绝不跨总线发布持锁。"]

pub mod bus;
pub mod catalog;
pub mod config;
pub mod entity;
pub mod geo;
pub mod param;
pub mod shared;
pub mod task;
pub mod testing;
pub mod time;

pub use bus::{Bus, BusError, Envelope, Header, Inbox, PublishFlags};
pub use catalog::{Body, MessageId};
pub use config::{Config, ConfigError};
pub use entity::{EntityHealth, EntityRegistry, UNRESOLVED_ENTITY};
pub use param::{ParamBinder, ParamError, Scope, Units, Visibility};
pub use shared::{LoopRegistry, ManeuverLock, SharedServices};
pub use task::{
    RetryPolicy, Schedule, Task, TaskContext, TaskError, TaskHandle, TaskSettings, spawn,
};
pub use time::{Clock, Countdown, MockClock, SystemClock};
