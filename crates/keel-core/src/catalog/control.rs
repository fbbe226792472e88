//! 控制基准域消息：期望路径、航迹状态、低层基准与控制环授权。

use serde::{Deserialize, Serialize};

/// 垂直基准的量纲。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZUnits {
    #[default]
    None,
    Depth,
    Altitude,
    Height,
}

/// 速度基准的量纲。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedUnits {
    #[default]
    MetersPerSecond,
    Rpm,
    Percent,
}

/// 垂直通道基准。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredZ {
    pub value: f64,
    pub z_units: ZUnits,
}

/// 速度通道基准。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredSpeed {
    pub value: f64,
    pub speed_units: SpeedUnits,
}

/// 艏向通道基准（弧度）。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredHeading {
    pub value: f64,
}

/// 期望路径：两个 WGS-84 端点、速度与可选盘旋半径。
///
/// # 契约说明（What）
/// - `flags` 按位取 [`DesiredPath::FL_START`] 等常量；未置 `FL_START` 时起点由
///   路径控制器按起点规则推断；
/// - `lradius > 0` 表示终点是盘旋圆心，旋向由 `FL_CCLOCKW` 决定；
/// - 角度一律为弧度，长度一律为米。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredPath {
    pub start_lat: f64,
    pub start_lon: f64,
    pub start_z: f64,
    pub start_z_units: ZUnits,
    pub end_lat: f64,
    pub end_lon: f64,
    pub end_z: f64,
    pub end_z_units: ZUnits,
    pub speed: f64,
    pub speed_units: SpeedUnits,
    pub lradius: f64,
    pub flags: u8,
}

impl DesiredPath {
    /// 起点字段有效。
    pub const FL_START: u8 = 0x01;
    /// 忽略起点规则，从当前位置直奔终点。
    pub const FL_DIRECT: u8 = 0x02;
    /// 逆时针盘旋。
    pub const FL_CCLOCKW: u8 = 0x04;
    /// 以当前位置为盘旋圆心。
    pub const FL_LOITER_CURR: u8 = 0x08;
    /// 不产生垂直基准。
    pub const FL_NO_Z: u8 = 0x10;
}

/// 路径控制器对外的航迹状态报告。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PathControlState {
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub lradius: f64,
    pub flags: u8,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub course_error: f64,
    pub eta: u16,
}

impl PathControlState {
    /// 已接近航迹终点（ETA 归零）。
    pub const FL_NEAR: u8 = 0x01;
    /// 正在盘旋。
    pub const FL_LOITERING: u8 = 0x02;
}

/// 控制环位掩码常量。
///
/// 每一位标识一个此刻拥有权威的控制器；启用/停用以并集/差集维护，
/// 保证任何时刻每一位只有一个认领者。
pub mod loops {
    pub const NONE: u32 = 0;
    pub const PATH: u32 = 1 << 0;
    pub const SPEED: u32 = 1 << 1;
    pub const DEPTH: u32 = 1 << 2;
    pub const ALTITUDE: u32 = 1 << 3;
    pub const YAW: u32 = 1 << 4;
    pub const TELEOPERATION: u32 = 1 << 5;
    pub const NO_OVERRIDE: u32 = 1 << 6;

    /// 垂直通道两位的并集，便于“先停用不活跃者”的翻转写法。
    pub const VERTICAL: u32 = DEPTH | ALTITUDE;
    /// 不可被错误恢复覆盖的位。
    pub const NON_OVERRIDABLE: u32 = TELEOPERATION | NO_OVERRIDE;
    pub const ALL: u32 = u32::MAX;
}

/// 控制环授权请求/授予。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlLoops {
    pub enable: bool,
    pub mask: u32,
}

/// 制动操作。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrakeOp {
    #[default]
    Stop,
    Start,
}

/// 制动指令。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Brake {
    pub op: BrakeOp,
}
