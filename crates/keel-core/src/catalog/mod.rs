//! # catalog：机载消息目录
//!
//! ## 角色定位（Why）
//! - 总线上流动的一切载荷都在这里以 sum-type（[`Body`]）建模；任务按静态 16 位
//!   消息 id 订阅，分发时无需对载荷做运行期类型探查；
//! - 每个消息另有稳定缩写名（与类型同名），供传输类任务按名字动态订阅。
//!
//! ## 行为契约（What）
//! - 消息 id 一经分配即稳定：`1xx` 为状态/监控域，`4xx` 为控制基准与机动域，
//!   `5xx` 为监督与计划域；
//! - [`lookup`] 在订阅期把缩写名解析为 id，未知名字由调用方作为致命配置错误处理；
//! - 所有载荷实现 `Clone + PartialEq + serde`，发布即按值快照，接收方只读。
//!
//! ## 风险提示（Trade-offs）
//! - sum-type 意味着新增消息要改动本模块；换来的是分发热路径上零反射、零装箱。

mod control;
mod state;
mod vehicle;

pub use control::{
    Brake, BrakeOp, ControlLoops, DesiredHeading, DesiredPath, DesiredSpeed, DesiredZ,
    PathControlState, SpeedUnits, ZUnits, loops,
};
pub use state::{
    Distance, DistanceValidity, EntityMonitoringState, EntityState, EstimatedState, Heartbeat,
};
pub use vehicle::{
    Abort, Calibration, CommandType, Goto, IdleManeuver, Loiter, LoiterDirection,
    ManeuverControlState, ManeuverSpec, ManeuverState, OpMode, PlanControl, PlanOp, StopManeuver,
    VehicleAction, VehicleCommand, VehicleState,
};

use serde::{Deserialize, Serialize};

/// 稳定的 16 位消息类型 id。
pub type MessageId = u16;

pub const ENTITY_STATE: MessageId = 101;
pub const ENTITY_MONITORING_STATE: MessageId = 102;
pub const HEARTBEAT: MessageId = 103;
pub const ESTIMATED_STATE: MessageId = 110;
pub const DISTANCE: MessageId = 111;

pub const DESIRED_HEADING: MessageId = 400;
pub const DESIRED_Z: MessageId = 401;
pub const DESIRED_SPEED: MessageId = 402;
pub const DESIRED_PATH: MessageId = 406;
pub const PATH_CONTROL_STATE: MessageId = 410;
pub const BRAKE: MessageId = 413;
pub const GOTO: MessageId = 450;
pub const LOITER: MessageId = 451;
pub const IDLE_MANEUVER: MessageId = 452;
pub const STOP_MANEUVER: MessageId = 468;
pub const MANEUVER_CONTROL_STATE: MessageId = 470;

pub const VEHICLE_STATE: MessageId = 500;
pub const VEHICLE_COMMAND: MessageId = 501;
pub const CALIBRATION: MessageId = 506;
pub const CONTROL_LOOPS: MessageId = 507;
pub const ABORT: MessageId = 550;
pub const PLAN_CONTROL: MessageId = 559;

/// 总线载荷的 sum-type 表示。
///
/// # 契约说明（What）
/// - 变体名即缩写名；[`Body::id`] 与 [`lookup`] 互为镜像；
/// - 分发路径只在 id 上匹配，载荷交由任务自行 `match` 拆取。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Body {
    EntityState(EntityState),
    EntityMonitoringState(EntityMonitoringState),
    Heartbeat(Heartbeat),
    EstimatedState(EstimatedState),
    Distance(Distance),
    DesiredHeading(DesiredHeading),
    DesiredZ(DesiredZ),
    DesiredSpeed(DesiredSpeed),
    DesiredPath(DesiredPath),
    PathControlState(PathControlState),
    Brake(Brake),
    Goto(Goto),
    Loiter(Loiter),
    IdleManeuver(IdleManeuver),
    StopManeuver(StopManeuver),
    ManeuverControlState(ManeuverControlState),
    VehicleState(VehicleState),
    VehicleCommand(VehicleCommand),
    Calibration(Calibration),
    ControlLoops(ControlLoops),
    Abort(Abort),
    PlanControl(PlanControl),
}

impl Body {
    /// 返回载荷的稳定消息 id。
    pub fn id(&self) -> MessageId {
        match self {
            Body::EntityState(_) => ENTITY_STATE,
            Body::EntityMonitoringState(_) => ENTITY_MONITORING_STATE,
            Body::Heartbeat(_) => HEARTBEAT,
            Body::EstimatedState(_) => ESTIMATED_STATE,
            Body::Distance(_) => DISTANCE,
            Body::DesiredHeading(_) => DESIRED_HEADING,
            Body::DesiredZ(_) => DESIRED_Z,
            Body::DesiredSpeed(_) => DESIRED_SPEED,
            Body::DesiredPath(_) => DESIRED_PATH,
            Body::PathControlState(_) => PATH_CONTROL_STATE,
            Body::Brake(_) => BRAKE,
            Body::Goto(_) => GOTO,
            Body::Loiter(_) => LOITER,
            Body::IdleManeuver(_) => IDLE_MANEUVER,
            Body::StopManeuver(_) => STOP_MANEUVER,
            Body::ManeuverControlState(_) => MANEUVER_CONTROL_STATE,
            Body::VehicleState(_) => VEHICLE_STATE,
            Body::VehicleCommand(_) => VEHICLE_COMMAND,
            Body::Calibration(_) => CALIBRATION,
            Body::ControlLoops(_) => CONTROL_LOOPS,
            Body::Abort(_) => ABORT,
            Body::PlanControl(_) => PLAN_CONTROL,
        }
    }

    /// 返回载荷的缩写名。
    pub fn name(&self) -> &'static str {
        match self {
            Body::EntityState(_) => "EntityState",
            Body::EntityMonitoringState(_) => "EntityMonitoringState",
            Body::Heartbeat(_) => "Heartbeat",
            Body::EstimatedState(_) => "EstimatedState",
            Body::Distance(_) => "Distance",
            Body::DesiredHeading(_) => "DesiredHeading",
            Body::DesiredZ(_) => "DesiredZ",
            Body::DesiredSpeed(_) => "DesiredSpeed",
            Body::DesiredPath(_) => "DesiredPath",
            Body::PathControlState(_) => "PathControlState",
            Body::Brake(_) => "Brake",
            Body::Goto(_) => "Goto",
            Body::Loiter(_) => "Loiter",
            Body::IdleManeuver(_) => "IdleManeuver",
            Body::StopManeuver(_) => "StopManeuver",
            Body::ManeuverControlState(_) => "ManeuverControlState",
            Body::VehicleState(_) => "VehicleState",
            Body::VehicleCommand(_) => "VehicleCommand",
            Body::Calibration(_) => "Calibration",
            Body::ControlLoops(_) => "ControlLoops",
            Body::Abort(_) => "Abort",
            Body::PlanControl(_) => "PlanControl",
        }
    }
}

/// 把缩写名解析为消息 id。
///
/// - **契约 (What)**：未登记的名字返回 `None`，由订阅路径升级为致命配置错误。
pub fn lookup(name: &str) -> Option<MessageId> {
    let id = match name {
        "EntityState" => ENTITY_STATE,
        "EntityMonitoringState" => ENTITY_MONITORING_STATE,
        "Heartbeat" => HEARTBEAT,
        "EstimatedState" => ESTIMATED_STATE,
        "Distance" => DISTANCE,
        "DesiredHeading" => DESIRED_HEADING,
        "DesiredZ" => DESIRED_Z,
        "DesiredSpeed" => DESIRED_SPEED,
        "DesiredPath" => DESIRED_PATH,
        "PathControlState" => PATH_CONTROL_STATE,
        "Brake" => BRAKE,
        "Goto" => GOTO,
        "Loiter" => LOITER,
        "IdleManeuver" => IDLE_MANEUVER,
        "StopManeuver" => STOP_MANEUVER,
        "ManeuverControlState" => MANEUVER_CONTROL_STATE,
        "VehicleState" => VEHICLE_STATE,
        "VehicleCommand" => VEHICLE_COMMAND,
        "Calibration" => CALIBRATION,
        "ControlLoops" => CONTROL_LOOPS,
        "Abort" => ABORT,
        "PlanControl" => PLAN_CONTROL,
        _ => return None,
    };
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_mirrors_body_id() {
        let bodies = [
            Body::Abort(Abort),
            Body::Heartbeat(Heartbeat),
            Body::StopManeuver(StopManeuver),
            Body::Distance(Distance {
                value: 1.0,
                validity: DistanceValidity::Valid,
            }),
        ];
        for body in bodies {
            assert_eq!(lookup(body.name()), Some(body.id()));
        }
        assert_eq!(lookup("NoSuchMessage"), None);
    }

    #[test]
    fn body_roundtrips_through_json() {
        let body = Body::DesiredZ(DesiredZ {
            value: 3.0,
            z_units: ZUnits::Altitude,
        });
        let text = serde_json::to_string(&body).unwrap();
        let back: Body = serde_json::from_str(&text).unwrap();
        assert_eq!(back, body);
    }
}
