//! 状态与监控域消息：导航估计、前向测距、实体健康汇总与存活信标。

use serde::{Deserialize, Serialize};

use crate::entity::EntityHealth;

/// 9 自由度导航估计，锚定在 (lat, lon, height) 的本地 ENU 坐标系。
///
/// # 契约说明（What）
/// - `lat`/`lon` 为 WGS-84 弧度，`height` 为椭球高（米）；`x`/`y`/`z` 是相对锚点的
///   北/东/下偏移（米）；
/// - `phi`/`theta`/`psi` 为姿态欧拉角（弧度），`u`/`v`/`w` 为体坐标速度，
///   `p`/`q`/`r` 为角速率，`vx`/`vy`/`vz` 为 NED 速度；
/// - `depth` 为压力深度，`alt` 为离底高度（无效时小于 0）。
///
/// # 风险提示（Trade-offs）
/// - 锚点会随估计器重置而漂移；消费方必须在锚点变化时自行重投影本地量。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimatedState {
    pub lat: f64,
    pub lon: f64,
    pub height: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub phi: f64,
    pub theta: f64,
    pub psi: f64,
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub p: f64,
    pub q: f64,
    pub r: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub depth: f64,
    pub alt: f64,
}

/// 测距有效性标记。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceValidity {
    #[default]
    Invalid,
    Valid,
}

/// 单波束测距样本（米），回声计/前视声呐驱动发布。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub value: f64,
    pub validity: DistanceValidity,
}

/// 单个实体的健康快照，来源实体 id 由信封头携带。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub state: EntityHealth,
    pub description: String,
}

/// 实体监控汇总：正常与出错实体的计数与名单（逗号分隔）。
///
/// - **契约 (What)**：`enames` 为空字符串时表示无出错实体；`last_error` 保留最近一次
///   错误文本及其时间戳，供监督者写入 `VehicleState`。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMonitoringState {
    pub ccount: u8,
    pub cnames: String,
    pub ecount: u8,
    pub enames: String,
    pub last_error: String,
    pub last_error_time: f64,
}

/// 存活信标，按固定节拍发布。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat;
