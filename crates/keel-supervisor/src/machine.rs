//! # machine：监督者的纯转换核心
//!
//! ## 设计背景（Why）
//! - 五个操作模式 {SERVICE, CALIBRATION, ERROR, MANEUVER, EXTERNAL} 的转换表
//!   是整个载具的安全边界；把它与总线隔离成纯状态机，属性测试才能对任意
//!   事件序列做全域扫描；
//! - 状态机不直接发布消息：每个事件处理器把副作用压进 [`Effect`] 列表，
//!   由外壳按序执行。
//!
//! ## 行为契约（What）
//! - 每个 `VehicleCommand` 请求恰好产生一个回执（SUCCESS 或带原因的 FAILURE）；
//!   模式不兼容的命令只回执拒绝，绝不发生非法转换；
//! - `switch` 是单次倒计时，两个用途（标定到期、机动完成后的新基准窗口）
//!   互斥装载；
//! - 不可越权环 = 遥操作位或显式 NO_OVERRIDE 位；错误恢复尝试停用控制环时
//!   不可越权环保持，若其仍然使能则进入 EXTERNAL 而非困在 ERROR；
//! - “安全计划”期间（`PlanControl START + IGNORE_ERRORS`），只有名列
//!   `safe_entities` 的实体报错才计入错误集合。

use std::collections::BTreeSet;

use keel_core::catalog::{
    CommandType, ControlLoops, EntityMonitoringState, ManeuverControlState, ManeuverSpec,
    ManeuverState, MessageId, OpMode, PlanControl, PlanOp, VehicleAction, VehicleCommand,
    VehicleState, loops,
};
use keel_core::time::Countdown;

/// 监督者的可配置面。
#[derive(Clone, Debug)]
pub struct MachineConfig {
    /// 安全计划期间错误仍然生效的实体名单。
    pub safe_entities: Vec<String>,
    /// 机动完成后等待新基准的窗口（秒）。
    pub new_reference_timeout: f64,
    /// 请求未携带时长时的默认标定时长（秒）。
    pub calibration_time: u16,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            safe_entities: Vec::new(),
            new_reference_timeout: 1.0,
            calibration_time: 10,
        }
    }
}

/// 状态机要求外壳执行的副作用。
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// 对 `VehicleCommand` 请求的回执。
    Reply {
        result: CommandType,
        command: VehicleAction,
        request_id: u32,
        info: String,
    },
    /// 幂等地停止当前机动。
    StopManeuver,
    /// 发布克隆的内联机动。
    StartManeuver(ManeuverSpec),
    /// 发布标定请求（秒）。
    Calibrate(u16),
    /// 下发怠速机动。
    Idle,
    /// 停用给定掩码的控制环。
    DisableLoops(u32),
    /// 模式已切换；外壳应立即发布一份 `VehicleState`。
    ModeChanged(OpMode),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SwitchUse {
    Calibration,
    NewReference,
}

/// 监督者状态机。所有时间参数均为 Unix 纪元秒。
#[derive(Debug)]
pub struct Machine {
    cfg: MachineConfig,
    mode: OpMode,
    maneuver_type: MessageId,
    maneuver_stime: f64,
    maneuver_eta: u16,
    maneuver_done: bool,
    in_safe_plan: bool,
    error_ents: BTreeSet<String>,
    last_error: Option<(String, f64)>,
    mask: u32,
    switch: Countdown,
    switch_use: Option<SwitchUse>,
    last_heartbeat: Option<f64>,
}

impl Machine {
    pub fn new(cfg: MachineConfig) -> Self {
        Machine {
            cfg,
            mode: OpMode::Service,
            maneuver_type: 0,
            maneuver_stime: 0.0,
            maneuver_eta: u16::MAX,
            maneuver_done: false,
            in_safe_plan: false,
            error_ents: BTreeSet::new(),
            last_error: None,
            mask: loops::NONE,
            switch: Countdown::new(),
            switch_use: None,
            last_heartbeat: None,
        }
    }

    /// 参数重绑后替换配置，保留运行状态。
    pub fn update_config(&mut self, cfg: MachineConfig) {
        self.cfg = cfg;
    }

    pub fn mode(&self) -> OpMode {
        self.mode
    }

    /// 当前控制环掩码镜像。
    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn maneuver_done(&self) -> bool {
        self.maneuver_done
    }

    pub fn in_safe_plan(&self) -> bool {
        self.in_safe_plan
    }

    pub fn error_count(&self) -> usize {
        self.error_ents.len()
    }

    pub fn last_heartbeat(&self) -> Option<f64> {
        self.last_heartbeat
    }

    fn non_overridable_active(&self) -> bool {
        self.mask & loops::NON_OVERRIDABLE != 0
    }

    fn set_mode(&mut self, mode: OpMode, out: &mut Vec<Effect>) {
        if self.mode == mode {
            return;
        }
        // 离开 MANEUVER（无论原因）即结束安全计划过滤。
        if self.mode == OpMode::Maneuver {
            self.in_safe_plan = false;
        }
        self.mode = mode;
        out.push(Effect::ModeChanged(mode));
    }

    /// 停机动、撤控制环、下怠速；不可越权环保持。
    fn reset(&mut self, out: &mut Vec<Effect>) {
        out.push(Effect::StopManeuver);
        let releasable = loops::ALL & !loops::NON_OVERRIDABLE;
        out.push(Effect::DisableLoops(releasable));
        out.push(Effect::Idle);
        self.mask &= loops::NON_OVERRIDABLE;
        self.maneuver_done = false;
        self.maneuver_eta = u16::MAX;
        self.switch.clear();
        self.switch_use = None;
    }

    /// reset 之后的去向：有错误进 ERROR（不可越权环仍使能则改进 EXTERNAL），
    /// 否则回 SERVICE。
    fn settle(&mut self, out: &mut Vec<Effect>) {
        if !self.error_ents.is_empty() {
            if self.non_overridable_active() {
                self.set_mode(OpMode::External, out);
            } else {
                self.set_mode(OpMode::Error, out);
            }
        } else {
            self.set_mode(OpMode::Service, out);
        }
    }

    fn reply(
        out: &mut Vec<Effect>,
        result: CommandType,
        cmd: &VehicleCommand,
        info: impl Into<String>,
    ) {
        out.push(Effect::Reply {
            result,
            command: cmd.command,
            request_id: cmd.request_id,
            info: info.into(),
        });
    }

    /// 消费 `VehicleCommand`；仅处理请求，回执从不缺席。
    pub fn on_vehicle_command(&mut self, now: f64, cmd: &VehicleCommand, out: &mut Vec<Effect>) {
        if cmd.command_type != CommandType::Request {
            return;
        }
        match cmd.command {
            VehicleAction::ExecManeuver => self.exec_maneuver(now, cmd, out),
            VehicleAction::StopManeuver => match self.mode {
                OpMode::Maneuver => {
                    self.reset(out);
                    self.settle(out);
                    Self::reply(out, CommandType::Success, cmd, "maneuver stopped");
                }
                OpMode::Service => {
                    Self::reply(out, CommandType::Success, cmd, "no maneuver running");
                }
                mode => {
                    Self::reply(
                        out,
                        CommandType::Failure,
                        cmd,
                        format!("cannot stop maneuvers in {mode:?} mode"),
                    );
                }
            },
            VehicleAction::StartCalibration => match self.mode {
                OpMode::Service | OpMode::Calibration => {
                    let duration = if cmd.calib_time > 0 {
                        cmd.calib_time
                    } else {
                        self.cfg.calibration_time
                    };
                    self.switch.reset(now, f64::from(duration));
                    self.switch_use = Some(SwitchUse::Calibration);
                    out.push(Effect::Calibrate(duration));
                    self.set_mode(OpMode::Calibration, out);
                    Self::reply(
                        out,
                        CommandType::Success,
                        cmd,
                        format!("calibrating for {duration} s"),
                    );
                }
                mode => {
                    Self::reply(
                        out,
                        CommandType::Failure,
                        cmd,
                        format!("cannot calibrate in {mode:?} mode"),
                    );
                }
            },
            VehicleAction::StopCalibration => {
                if self.mode == OpMode::Calibration {
                    self.switch.clear();
                    self.switch_use = None;
                    self.set_mode(OpMode::Service, out);
                    Self::reply(out, CommandType::Success, cmd, "calibration stopped");
                } else {
                    Self::reply(
                        out,
                        CommandType::Failure,
                        cmd,
                        "no calibration in progress",
                    );
                }
            }
        }
    }

    fn exec_maneuver(&mut self, now: f64, cmd: &VehicleCommand, out: &mut Vec<Effect>) {
        if !matches!(self.mode, OpMode::Service | OpMode::Maneuver) {
            Self::reply(
                out,
                CommandType::Failure,
                cmd,
                format!("maneuvers cannot start in {:?} mode", self.mode),
            );
            return;
        }
        let Some(spec) = &cmd.maneuver else {
            Self::reply(out, CommandType::Failure, cmd, "no maneuver specified");
            return;
        };
        out.push(Effect::StopManeuver);
        out.push(Effect::StartManeuver(spec.clone()));
        self.maneuver_type = spec.type_id();
        self.maneuver_stime = now;
        self.maneuver_eta = u16::MAX;
        self.maneuver_done = false;
        self.switch.clear();
        self.switch_use = None;
        self.set_mode(OpMode::Maneuver, out);
        Self::reply(
            out,
            CommandType::Success,
            cmd,
            format!("{} maneuver started", spec.name()),
        );
    }

    /// 消费机动任务的生命周期汇报。
    pub fn on_maneuver_state(
        &mut self,
        now: f64,
        mcs: &ManeuverControlState,
        out: &mut Vec<Effect>,
    ) {
        if self.mode != OpMode::Maneuver {
            return;
        }
        match mcs.state {
            ManeuverState::Executing => {
                self.maneuver_eta = mcs.eta;
            }
            ManeuverState::Done => {
                self.maneuver_eta = 0;
                if !self.maneuver_done {
                    self.maneuver_done = true;
                    self.switch.reset(now, self.cfg.new_reference_timeout);
                    self.switch_use = Some(SwitchUse::NewReference);
                }
            }
            ManeuverState::Error => {
                self.last_error = Some((mcs.info.clone(), now));
                self.reset(out);
                self.settle(out);
            }
        }
    }

    /// 周期检查：switch 到期的两个消费方。
    pub fn on_timer(&mut self, now: f64, out: &mut Vec<Effect>) {
        if !self.switch.overflowed(now) {
            return;
        }
        self.switch.clear();
        match self.switch_use.take() {
            Some(SwitchUse::Calibration) if self.mode == OpMode::Calibration => {
                self.set_mode(OpMode::Service, out);
            }
            Some(SwitchUse::NewReference) if self.mode == OpMode::Maneuver => {
                // 机动完成后窗口内没有新基准。
                self.last_error = Some(("expected new reference".to_owned(), now));
                self.reset(out);
                self.settle(out);
            }
            _ => {}
        }
    }

    /// 消费实体监控汇总，按安全计划名单过滤后仲裁模式。
    pub fn on_monitoring(
        &mut self,
        _now: f64,
        ems: &EntityMonitoringState,
        out: &mut Vec<Effect>,
    ) {
        let reported: BTreeSet<String> = ems
            .enames
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        self.error_ents = if self.in_safe_plan {
            reported
                .into_iter()
                .filter(|name| self.cfg.safe_entities.iter().any(|s| s == name))
                .collect()
        } else {
            reported
        };
        if !ems.last_error.is_empty() {
            self.last_error = Some((ems.last_error.clone(), ems.last_error_time));
        }

        let errors = !self.error_ents.is_empty();
        match self.mode {
            OpMode::Service if errors => {
                self.reset(out);
                self.settle(out);
            }
            OpMode::Maneuver if errors && !self.non_overridable_active() => {
                self.reset(out);
                self.settle(out);
            }
            OpMode::External if errors && !self.non_overridable_active() => {
                self.reset(out);
                self.settle(out);
            }
            OpMode::Error if !errors => {
                self.set_mode(OpMode::Service, out);
            }
            _ => {}
        }
    }

    /// 消费控制环授权，维护掩码镜像并仲裁 SERVICE/EXTERNAL/ERROR 边界。
    pub fn on_control_loops(&mut self, _now: f64, cl: &ControlLoops, out: &mut Vec<Effect>) {
        if cl.enable {
            self.mask |= cl.mask;
        } else {
            self.mask &= !cl.mask;
        }
        match self.mode {
            OpMode::Service => {
                // SERVICE 下没有任何机动在跑，使能必然来自外部。
                if cl.enable && self.mask != 0 {
                    self.set_mode(OpMode::External, out);
                }
            }
            OpMode::External => {
                if self.mask == 0 {
                    self.set_mode(OpMode::Service, out);
                }
            }
            OpMode::Error => {
                if cl.enable && cl.mask & loops::NON_OVERRIDABLE != 0 {
                    self.set_mode(OpMode::External, out);
                }
            }
            _ => {}
        }
    }

    /// 消费计划控制：只有带 IGNORE_ERRORS 的启动才进入安全计划。
    pub fn on_plan_control(&mut self, pc: &PlanControl) {
        match pc.op {
            PlanOp::Start => {
                self.in_safe_plan = pc.flags & PlanControl::FL_IGNORE_ERRORS != 0;
            }
            PlanOp::Stop => {
                self.in_safe_plan = false;
            }
        }
    }

    /// 紧急中止：清掉一切（包括不可越权环），一拍内收敛到 SERVICE 或 ERROR。
    pub fn on_abort(&mut self, now: f64, out: &mut Vec<Effect>) {
        self.in_safe_plan = false;
        self.last_error = Some(("aborted".to_owned(), now));
        out.push(Effect::StopManeuver);
        out.push(Effect::DisableLoops(loops::ALL));
        out.push(Effect::Idle);
        self.mask = loops::NONE;
        self.maneuver_done = false;
        self.maneuver_eta = u16::MAX;
        self.switch.clear();
        self.switch_use = None;
        if self.error_ents.is_empty() {
            self.set_mode(OpMode::Service, out);
        } else {
            self.set_mode(OpMode::Error, out);
        }
    }

    /// 存活信标：仅记录时间戳（与系统重启等命令是彼此独立的消费分支）。
    pub fn on_heartbeat(&mut self, now: f64) {
        self.last_heartbeat = Some(now);
    }

    /// 汇出当前 `VehicleState` 快照。
    pub fn vehicle_state(&self) -> VehicleState {
        let (last_error, last_error_time) = self
            .last_error
            .clone()
            .unwrap_or((String::new(), 0.0));
        VehicleState {
            op_mode: self.mode,
            maneuver_type: self.maneuver_type,
            maneuver_stime: self.maneuver_stime,
            maneuver_eta: self.maneuver_eta,
            flags: if self.maneuver_done {
                VehicleState::FL_MANEUVER_DONE
            } else {
                0
            },
            last_error,
            last_error_time,
            control_loops: self.mask,
            error_count: self.error_ents.len().min(u8::MAX as usize) as u8,
            error_ents: self
                .error_ents
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::catalog::{IdleManeuver, Loiter, LoiterDirection, SpeedUnits, ZUnits};

    fn exec_request(id: u32) -> VehicleCommand {
        VehicleCommand {
            command_type: CommandType::Request,
            command: VehicleAction::ExecManeuver,
            request_id: id,
            maneuver: Some(ManeuverSpec::Loiter(Loiter {
                lat: 0.7188,
                lon: -0.152,
                z: 2.0,
                z_units: ZUnits::Depth,
                radius: 50.0,
                duration: 0,
                speed: 1.0,
                speed_units: SpeedUnits::MetersPerSecond,
                direction: LoiterDirection::Clockwise,
            })),
            calib_time: 0,
            info: String::new(),
        }
    }

    fn reply_of(effects: &[Effect]) -> (&CommandType, &String) {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Reply { result, info, .. } => Some((result, info)),
                _ => None,
            })
            .expect("request must be replied")
    }

    #[test]
    fn exec_maneuver_from_service() {
        let mut machine = Machine::new(MachineConfig::default());
        let mut out = Vec::new();
        machine.on_vehicle_command(100.0, &exec_request(42), &mut out);
        assert_eq!(machine.mode(), OpMode::Maneuver);
        assert!(out.contains(&Effect::StopManeuver));
        assert!(matches!(
            out.iter().find(|e| matches!(e, Effect::StartManeuver(_))),
            Some(Effect::StartManeuver(ManeuverSpec::Loiter(_)))
        ));
        let (result, info) = reply_of(&out);
        assert_eq!(*result, CommandType::Success);
        assert_eq!(info, "Loiter maneuver started");
    }

    #[test]
    fn incompatible_commands_refuse_without_transition() {
        let mut machine = Machine::new(MachineConfig::default());
        let mut out = Vec::new();
        machine.on_vehicle_command(0.0, &exec_request(1), &mut out);
        out.clear();

        let calibrate = VehicleCommand {
            command: VehicleAction::StartCalibration,
            ..exec_request(2)
        };
        machine.on_vehicle_command(1.0, &calibrate, &mut out);
        let (result, _) = reply_of(&out);
        assert_eq!(*result, CommandType::Failure);
        assert_eq!(machine.mode(), OpMode::Maneuver);
    }

    #[test]
    fn done_arms_new_reference_window_once() {
        let mut machine = Machine::new(MachineConfig::default());
        let mut out = Vec::new();
        machine.on_vehicle_command(0.0, &exec_request(1), &mut out);
        out.clear();

        let done = ManeuverControlState {
            state: ManeuverState::Done,
            eta: 0,
            info: String::new(),
        };
        machine.on_maneuver_state(10.0, &done, &mut out);
        assert!(machine.maneuver_done());
        assert!(out.is_empty());

        // 窗口内换上新机动：窗口取消，模式保持 MANEUVER。
        machine.on_vehicle_command(10.5, &exec_request(2), &mut out);
        out.clear();
        machine.on_timer(12.0, &mut out);
        assert_eq!(machine.mode(), OpMode::Maneuver);
        assert!(out.is_empty());
    }

    #[test]
    fn new_reference_window_expiry_resets_to_service() {
        let mut machine = Machine::new(MachineConfig::default());
        let mut out = Vec::new();
        machine.on_vehicle_command(0.0, &exec_request(1), &mut out);
        out.clear();
        machine.on_maneuver_state(
            10.0,
            &ManeuverControlState {
                state: ManeuverState::Done,
                eta: 0,
                info: String::new(),
            },
            &mut out,
        );
        machine.on_timer(11.5, &mut out);
        assert_eq!(machine.mode(), OpMode::Service);
        assert!(out.contains(&Effect::StopManeuver));
        assert!(out.contains(&Effect::Idle));
    }

    #[test]
    fn safe_plan_filters_entity_errors() {
        let mut machine = Machine::new(MachineConfig {
            safe_entities: vec!["IMU".to_owned()],
            ..MachineConfig::default()
        });
        let mut out = Vec::new();
        machine.on_plan_control(&PlanControl {
            op: PlanOp::Start,
            plan_id: "survey".to_owned(),
            flags: PlanControl::FL_IGNORE_ERRORS,
            info: String::new(),
        });
        machine.on_vehicle_command(0.0, &exec_request(1), &mut out);
        out.clear();

        // 名单之外的实体报错被忽略。
        machine.on_monitoring(
            1.0,
            &EntityMonitoringState {
                ecount: 1,
                enames: "Sidescan".to_owned(),
                ..EntityMonitoringState::default()
            },
            &mut out,
        );
        assert_eq!(machine.mode(), OpMode::Maneuver);

        // 名单之内的实体报错仍然生效。
        machine.on_monitoring(
            2.0,
            &EntityMonitoringState {
                ecount: 1,
                enames: "IMU".to_owned(),
                ..EntityMonitoringState::default()
            },
            &mut out,
        );
        assert_eq!(machine.mode(), OpMode::Error);
        // 离开 MANEUVER 时安全计划过滤被清除。
        assert!(!machine.in_safe_plan());
    }

    #[test]
    fn abort_converges_to_service_or_error() {
        let mut machine = Machine::new(MachineConfig::default());
        let mut out = Vec::new();
        machine.on_vehicle_command(0.0, &exec_request(1), &mut out);
        machine.on_control_loops(
            0.5,
            &ControlLoops {
                enable: true,
                mask: loops::TELEOPERATION,
            },
            &mut out,
        );
        out.clear();
        machine.on_abort(1.0, &mut out);
        assert_eq!(machine.mode(), OpMode::Service);
        assert_eq!(machine.mask(), loops::NONE);
        assert!(out.contains(&Effect::DisableLoops(loops::ALL)));
    }

    #[test]
    fn idle_maneuver_spec_is_supported() {
        let mut machine = Machine::new(MachineConfig::default());
        let mut out = Vec::new();
        let cmd = VehicleCommand {
            maneuver: Some(ManeuverSpec::Idle(IdleManeuver { duration: 30 })),
            ..exec_request(9)
        };
        machine.on_vehicle_command(0.0, &cmd, &mut out);
        let (result, info) = reply_of(&out);
        assert_eq!(*result, CommandType::Success);
        assert_eq!(info, "Idle maneuver started");
    }
}
