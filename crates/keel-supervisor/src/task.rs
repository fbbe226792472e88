//! # task：监督者的总线外壳
//!
//! ## 架构定位（Where）
//! - 周期任务：每拍驱动 `switch` 计时并发布 `VehicleState`；
//! - 事件侧消费命令、计划、实体监控、机动汇报与控制环授权，逐条喂给
//!   [`Machine`]，再按序执行效果列表；
//! - 控制环掩码的进程级注册表由这里同步维护：消费到的每个 `ControlLoops`
//!   都落到 [`keel_core::LoopRegistry`]。

use keel_core::bus::Envelope;
use keel_core::catalog::{
    self, Body, Calibration, CommandType, ControlLoops, IdleManeuver, MessageId, StopManeuver,
    VehicleCommand,
};
use keel_core::param::{ParamBinder, ParamError, Scope, Units, Visibility};
use keel_core::task::{Schedule, Task, TaskContext};

use crate::machine::{Effect, Machine, MachineConfig};

#[derive(Clone, Debug)]
struct Args {
    frequency: f64,
    new_reference_timeout: f64,
    calibration_time: u16,
    safe_entities: Vec<String>,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            frequency: 2.0,
            new_reference_timeout: 1.0,
            calibration_time: 10,
            safe_entities: Vec::new(),
        }
    }
}

/// 载具监督者任务。
pub struct Supervisor {
    args: Args,
    machine: Machine,
}

impl Supervisor {
    pub fn new() -> Self {
        Supervisor {
            args: Args::default(),
            machine: Machine::new(MachineConfig::default()),
        }
    }

    /// 诊断用途的状态机只读视图。
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    fn publish_vehicle_state(&self, ctx: &TaskContext) {
        ctx.dispatch(Body::VehicleState(self.machine.vehicle_state()));
    }

    fn execute(&mut self, ctx: &mut TaskContext, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Reply {
                    result,
                    command,
                    request_id,
                    info,
                } => {
                    if result == CommandType::Failure {
                        tracing::warn!(task = %ctx.name(), request_id, %info, "command refused");
                    }
                    ctx.dispatch(Body::VehicleCommand(VehicleCommand {
                        command_type: result,
                        command,
                        request_id,
                        maneuver: None,
                        calib_time: 0,
                        info,
                    }));
                }
                Effect::StopManeuver => {
                    ctx.dispatch(Body::StopManeuver(StopManeuver));
                }
                Effect::StartManeuver(spec) => {
                    tracing::info!(task = %ctx.name(), maneuver = spec.name(), "starting maneuver");
                    ctx.dispatch(spec.clone_into_body());
                }
                Effect::Calibrate(duration) => {
                    ctx.dispatch(Body::Calibration(Calibration { duration }));
                }
                Effect::Idle => {
                    ctx.dispatch(Body::IdleManeuver(IdleManeuver { duration: 0 }));
                }
                Effect::DisableLoops(mask) => {
                    ctx.shared().loops.disable(mask);
                    ctx.dispatch(Body::ControlLoops(ControlLoops {
                        enable: false,
                        mask,
                    }));
                }
                Effect::ModeChanged(mode) => {
                    tracing::info!(task = %ctx.name(), ?mode, "vehicle mode changed");
                    self.publish_vehicle_state(ctx);
                }
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for Supervisor {
    fn schedule(&self) -> Schedule {
        Schedule::periodic(self.args.frequency)
    }

    fn subscriptions(&self) -> Vec<MessageId> {
        vec![
            catalog::VEHICLE_COMMAND,
            catalog::MANEUVER_CONTROL_STATE,
            catalog::ENTITY_MONITORING_STATE,
            catalog::CONTROL_LOOPS,
            catalog::PLAN_CONTROL,
            catalog::ABORT,
            catalog::HEARTBEAT,
        ]
    }

    fn declare_parameters(&mut self, binder: &mut ParamBinder) -> Result<(), ParamError> {
        binder
            .param("Execution Frequency", &mut self.args.frequency)
            .defaults("2.0")
            .units(Units::Hertz)
            .minimum(0.5)
            .commit()?;
        binder
            .param("New Reference Timeout", &mut self.args.new_reference_timeout)
            .defaults("1.0")
            .units(Units::Second)
            .minimum(0.1)
            .commit()?;
        binder
            .param("Default Calibration Time", &mut self.args.calibration_time)
            .defaults("10")
            .units(Units::Second)
            .minimum(1.0)
            .visibility(Visibility::User)
            .commit()?;
        binder
            .param("Safe Entities", &mut self.args.safe_entities)
            .defaults("")
            .scope(Scope::Plan)
            .commit()?;
        Ok(())
    }

    fn on_update_parameters(&mut self, _ctx: &mut TaskContext) {
        self.machine.update_config(MachineConfig {
            safe_entities: self.args.safe_entities.clone(),
            new_reference_timeout: self.args.new_reference_timeout,
            calibration_time: self.args.calibration_time,
        });
    }

    fn on_envelope(&mut self, ctx: &mut TaskContext, env: &Envelope) {
        let now = ctx.epoch();
        let mut out = Vec::new();
        match &env.body {
            Body::VehicleCommand(cmd) => self.machine.on_vehicle_command(now, cmd, &mut out),
            Body::ManeuverControlState(mcs) => self.machine.on_maneuver_state(now, mcs, &mut out),
            Body::EntityMonitoringState(ems) => self.machine.on_monitoring(now, ems, &mut out),
            Body::ControlLoops(cl) => {
                // 掩码注册表与状态机镜像同步维护。
                if cl.enable {
                    ctx.shared().loops.enable(cl.mask);
                } else {
                    ctx.shared().loops.disable(cl.mask);
                }
                self.machine.on_control_loops(now, cl, &mut out);
            }
            Body::PlanControl(pc) => self.machine.on_plan_control(pc),
            Body::Abort(_) => self.machine.on_abort(now, &mut out),
            Body::Heartbeat(_) => self.machine.on_heartbeat(now),
            _ => {}
        }
        self.execute(ctx, out);
    }

    fn on_tick(&mut self, ctx: &mut TaskContext) {
        let now = ctx.epoch();
        let mut out = Vec::new();
        self.machine.on_timer(now, &mut out);
        self.execute(ctx, out);
        self.publish_vehicle_state(ctx);
    }
}
