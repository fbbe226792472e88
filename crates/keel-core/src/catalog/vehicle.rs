//! 监督与机动域消息：载具命令与状态、机动载荷、计划控制与中止。

use serde::{Deserialize, Serialize};

use super::control::{SpeedUnits, ZUnits};
use super::{GOTO, IDLE_MANEUVER, LOITER, MessageId};

/// 直线航路点机动。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Goto {
    pub lat: f64,
    pub lon: f64,
    pub z: f64,
    pub z_units: ZUnits,
    pub speed: f64,
    pub speed_units: SpeedUnits,
}

/// 盘旋旋向。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoiterDirection {
    #[default]
    Clockwise,
    CounterClockwise,
}

/// 定点盘旋机动。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Loiter {
    pub lat: f64,
    pub lon: f64,
    pub z: f64,
    pub z_units: ZUnits,
    pub radius: f64,
    pub duration: u16,
    pub speed: f64,
    pub speed_units: SpeedUnits,
    pub direction: LoiterDirection,
}

/// 怠速机动：保持现状给定时长（0 表示无限期）。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdleManeuver {
    pub duration: u16,
}

/// 停止当前机动（幂等）。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopManeuver;

/// 内联机动载荷的 sum-type，用于 `VehicleCommand` 携带。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ManeuverSpec {
    Goto(Goto),
    Loiter(Loiter),
    Idle(IdleManeuver),
}

impl ManeuverSpec {
    /// 机动的人类可读名，用于命令回执文本。
    pub fn name(&self) -> &'static str {
        match self {
            ManeuverSpec::Goto(_) => "Goto",
            ManeuverSpec::Loiter(_) => "Loiter",
            ManeuverSpec::Idle(_) => "Idle",
        }
    }

    /// 对应机动消息的类型 id，写入 `VehicleState::maneuver_type`。
    pub fn type_id(&self) -> MessageId {
        match self {
            ManeuverSpec::Goto(_) => GOTO,
            ManeuverSpec::Loiter(_) => LOITER,
            ManeuverSpec::Idle(_) => IDLE_MANEUVER,
        }
    }

    /// 展开为可直接发布的总线载荷。
    pub fn clone_into_body(&self) -> super::Body {
        match self {
            ManeuverSpec::Goto(m) => super::Body::Goto(m.clone()),
            ManeuverSpec::Loiter(m) => super::Body::Loiter(m.clone()),
            ManeuverSpec::Idle(m) => super::Body::IdleManeuver(m.clone()),
        }
    }
}

/// 机动执行状态。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManeuverState {
    #[default]
    Executing,
    Done,
    Error,
}

/// 机动任务对监督者的生命周期汇报。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManeuverControlState {
    pub state: ManeuverState,
    pub eta: u16,
    pub info: String,
}

/// 命令报文的方向：请求或两种回执。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    #[default]
    Request,
    Success,
    Failure,
}

/// 载具级命令动词。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleAction {
    #[default]
    ExecManeuver,
    StopManeuver,
    StartCalibration,
    StopCalibration,
}

/// 载具命令：请求必有回执，`request_id` 一一对应。
///
/// # 契约说明（What）
/// - `maneuver` 仅对 `ExecManeuver` 请求有意义；
/// - `calib_time` 仅对 `StartCalibration` 请求有意义（秒）；
/// - 回执复用同一结构：`command_type` 置 Success/Failure，`info` 携带原因。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleCommand {
    pub command_type: CommandType,
    pub command: VehicleAction,
    pub request_id: u32,
    pub maneuver: Option<ManeuverSpec>,
    pub calib_time: u16,
    pub info: String,
}

/// 载具操作模式。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpMode {
    #[default]
    Service,
    Calibration,
    Error,
    Maneuver,
    External,
}

/// 监督者周期性发布的载具状态。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub op_mode: OpMode,
    pub maneuver_type: MessageId,
    pub maneuver_stime: f64,
    pub maneuver_eta: u16,
    pub flags: u8,
    pub last_error: String,
    pub last_error_time: f64,
    pub control_loops: u32,
    pub error_count: u8,
    pub error_ents: String,
}

impl VehicleState {
    /// 当前机动已完成，等待新基准。
    pub const FL_MANEUVER_DONE: u8 = 0x01;
}

/// 标定请求（秒）。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub duration: u16,
}

/// 紧急中止：清空一切控制权，回到安全模式。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abort;

/// 计划操作动词。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanOp {
    #[default]
    Start,
    Stop,
}

/// 计划控制：`FL_IGNORE_ERRORS` 启动“安全计划”实体过滤。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanControl {
    pub op: PlanOp,
    pub plan_id: String,
    pub flags: u8,
    pub info: String,
}

impl PlanControl {
    /// 计划声明可在非关键实体报错时继续执行。
    pub const FL_IGNORE_ERRORS: u8 = 0x01;
}
