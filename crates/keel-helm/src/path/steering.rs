//! # steering：航向生成的多态接缝
//!
//! 路径控制器把“怎么跟线/怎么绕圈”交给 [`Steering`] 实现：框架消费统一的
//! 生命周期与 `step`/`loiter` 钩子，实现者只关心几何。默认实现是视线导引
//! （line-of-sight）：前视距离内把横向偏差折算成航向修正。

use std::f64::consts::FRAC_PI_2;

use keel_core::catalog::{Body, ControlLoops, DesiredHeading, loops};
use keel_core::geo::{bearing_and_range, normalize_angle};
use keel_core::param::{ParamBinder, ParamError, Units};
use keel_core::task::TaskContext;

use super::TrackingState;

/// 航向生成策略。
///
/// # 契约说明（What）
/// - `step` 在直线跟随时每个控制拍调用一次，`loiter` 在盘旋时调用，
///   默认退化为 `step`；
/// - `claimed_loops` 声明策略认领的控制环位，激活时自行使能、失活时由
///   控制器统一撤销；
/// - `wants_z_control` 返回 false 的策略自带垂直通道（控制器不再产生 Z 基准）。
pub trait Steering: Send + 'static {
    fn declare_parameters(&mut self, _binder: &mut ParamBinder) -> Result<(), ParamError> {
        Ok(())
    }

    fn claimed_loops(&self) -> u32 {
        loops::YAW
    }

    fn wants_z_control(&self) -> bool {
        true
    }

    /// 新航迹生效时调用一次。
    fn on_path_startup(&mut self, _ctx: &TaskContext, _state: &TrackingState) {}

    fn step(&mut self, ctx: &TaskContext, state: &TrackingState);

    fn loiter(&mut self, ctx: &TaskContext, state: &TrackingState) {
        self.step(ctx, state);
    }
}

/// 视线导引。
#[derive(Clone, Debug)]
pub struct LineOfSight {
    lookahead: f64,
}

impl LineOfSight {
    pub fn new() -> Self {
        LineOfSight { lookahead: 10.0 }
    }
}

impl Default for LineOfSight {
    fn default() -> Self {
        Self::new()
    }
}

impl Steering for LineOfSight {
    fn declare_parameters(&mut self, binder: &mut ParamBinder) -> Result<(), ParamError> {
        binder
            .param("Lookahead Distance", &mut self.lookahead)
            .defaults("10.0")
            .units(Units::Meter)
            .minimum(1.0)
            .commit()
    }

    fn on_path_startup(&mut self, ctx: &TaskContext, _state: &TrackingState) {
        ctx.dispatch(Body::ControlLoops(ControlLoops {
            enable: true,
            mask: self.claimed_loops(),
        }));
    }

    fn step(&mut self, ctx: &TaskContext, state: &TrackingState) {
        let correction = (-state.y / self.lookahead).atan();
        let heading = normalize_angle(state.bearing + correction);
        ctx.dispatch(Body::DesiredHeading(DesiredHeading { value: heading }));
    }

    fn loiter(&mut self, ctx: &TaskContext, state: &TrackingState) {
        let (to_vehicle, distance) = bearing_and_range(
            state.position.north - state.loiter_center.north,
            state.position.east - state.loiter_center.east,
        );
        let radial_error = distance - state.loiter_radius;
        let correction = (radial_error / self.lookahead).atan();
        let heading = if state.loiter_clockwise {
            to_vehicle + FRAC_PI_2 + correction
        } else {
            to_vehicle - FRAC_PI_2 - correction
        };
        ctx.dispatch(Body::DesiredHeading(DesiredHeading {
            value: normalize_angle(heading),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::catalog;
    use keel_core::config::Config;
    use keel_core::geo::Enu;
    use keel_core::testing::TestBench;

    fn state_on_track(y: f64) -> TrackingState {
        TrackingState {
            y,
            ..TrackingState::default()
        }
    }

    #[test]
    fn step_corrects_toward_track() {
        let bench = TestBench::new();
        bench.probe(&[catalog::DESIRED_HEADING]);
        let ctx = bench.context("LOS");
        let mut los = LineOfSight::new();

        // 偏在航迹左侧（y < 0）时向右修正。
        los.step(&ctx, &state_on_track(-5.0));
        let bodies = bench.drain_bodies();
        let Body::DesiredHeading(h) = &bodies[0] else {
            panic!("expected heading");
        };
        assert!(h.value > 0.0 && h.value < FRAC_PI_2);
    }

    #[test]
    fn loiter_heads_tangentially() {
        let bench = TestBench::new();
        bench.probe(&[catalog::DESIRED_HEADING]);
        let ctx = bench.context("LOS");
        let mut los = LineOfSight::new();

        // 载具在圆心正北、半径恰好：顺时针应朝正东。
        let state = TrackingState {
            position: Enu {
                north: 50.0,
                east: 0.0,
            },
            loiter_center: Enu::default(),
            loiter_radius: 50.0,
            loiter_clockwise: true,
            loitering: true,
            ..TrackingState::default()
        };
        los.loiter(&ctx, &state);
        let bodies = bench.drain_bodies();
        let Body::DesiredHeading(h) = &bodies[0] else {
            panic!("expected heading");
        };
        assert!((h.value - FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn lookahead_is_bound_from_config() {
        let cfg = Config::new();
        cfg.set("Helm", "Lookahead Distance", "25.0 m");
        let mut binder = keel_core::param::ParamBinder::new(cfg.section("Helm"));
        let mut los = LineOfSight::new();
        los.declare_parameters(&mut binder).unwrap();
        assert_eq!(los.lookahead, 25.0);
    }
}
