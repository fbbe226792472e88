//! # path：路径控制器
//!
//! ## 核心意图（Why）
//! - 把一条 `DesiredPath`（两个大地端点 + 速度 + 可选盘旋半径）翻译成低层
//!   航向/深度/高度/速度基准，并在整个跟随过程中监视纵向与横向偏差；
//! - 起点规则、盘旋入点几何与 ETA/nearby 判定都在这里闭合；垂直通道在启用
//!   贴底跟踪时全部经由 [`BottomTracker`] 改写。
//!
//! ## 行为契约（What）
//! - 非激活状态下拒绝 `DesiredPath`（实体报错），激活由 `ControlLoops` 的
//!   CL_PATH 位翻转；失活时撤销最近使用的垂直环与策略认领的环；
//! - 每条被接受的路径在下一个控制拍之前恰好发布一份带新端点的
//!   `PathControlState`；
//! - `EstimatedState` 按控制频率节流——重放同一时间戳的消息不会产生任何
//!   `ControlLoops`/`DesiredSpeed`/`Brake` 发布；
//! - 一旦 `nearby` 置位（盘旋除外），超过 `new_ref_timeout` 没有新基准即判
//!   偏差错误；监视器在刹车期间停评，纵向监视器在盘旋期间停评。

mod steering;

pub use steering::{LineOfSight, Steering};

use std::f64::consts::{FRAC_PI_2, PI};
use std::time::Duration;

use keel_core::bus::Envelope;
use keel_core::catalog::{
    self, Body, Brake, BrakeOp, ControlLoops, DesiredPath, DesiredSpeed, DesiredZ, DistanceValidity,
    EstimatedState, MessageId, PathControlState, ZUnits, loops,
};
use keel_core::entity::EntityHealth;
use keel_core::geo::{self, Enu, bearing_and_range, normalize_angle};
use keel_core::param::{ParamBinder, ParamError, Units, Visibility};
use keel_core::task::{Schedule, Task, TaskContext};
use keel_core::time::Countdown;

use crate::bottom::{BottomArgs, BottomTracker, BtState, ReferenceSink};
use crate::monitors::{
    AlongTrackArgs, AlongTrackMonitor, CrossTrackArgs, CrossTrackMonitor, MonitorVerdict,
};

/// 起点规则里“上一路径尚未结束”的滞回窗口（秒）。
const PREVIOUS_END_REUSE: f64 = 1.0;

/// 航迹框架下的即时跟踪状态，交给 [`Steering`] 与状态报告使用。
#[derive(Clone, Debug, Default)]
pub struct TrackingState {
    /// 航迹起点（锚点系 ENU，米）。
    pub start: Enu,
    /// 有效终点（盘旋时为入点，进入盘旋后改为圆心）。
    pub end: Enu,
    pub bearing: f64,
    pub length: f64,
    /// 载具当前位置（锚点系）。
    pub position: Enu,
    /// 航迹纵坐标。
    pub x: f64,
    /// 航迹横坐标。
    pub y: f64,
    pub z: f64,
    pub course: f64,
    pub speed: f64,
    pub course_error: f64,
    pub eta: f64,
    pub nearby: bool,
    pub loitering: bool,
    pub loiter_center: Enu,
    pub loiter_radius: f64,
    pub loiter_clockwise: bool,
    /// 最近一次量测的时间戳。
    pub now: f64,
}

#[derive(Clone, Debug)]
struct ActivePath {
    origin: (f64, f64),
    start_geo: (f64, f64),
    end_geo: (f64, f64),
    center_geo: Option<(f64, f64)>,
    z_units: ZUnits,
    state: TrackingState,
}

#[derive(Clone, Debug)]
struct PathArgs {
    control_frequency: f64,
    state_period: f64,
    time_factor: f64,
    course_control: bool,
    loiter_size_factor: f64,
    new_ref_timeout: f64,
    along_enabled: bool,
    along: AlongTrackArgs,
    cross_enabled: bool,
    cross: CrossTrackArgs,
}

impl Default for PathArgs {
    fn default() -> Self {
        PathArgs {
            control_frequency: 10.0,
            state_period: 1.0,
            time_factor: 5.0,
            course_control: false,
            loiter_size_factor: 0.75,
            new_ref_timeout: 5.0,
            along_enabled: true,
            along: AlongTrackArgs::default(),
            cross_enabled: true,
            cross: CrossTrackArgs::default(),
        }
    }
}

/// 贴底跟踪器的下发出口：借用任务上下文与刹车标志，仅在调用现场存在。
struct Link<'a> {
    ctx: &'a TaskContext,
    braking: &'a mut bool,
}

impl ReferenceSink for Link<'_> {
    fn dispatch_z(&mut self, z: DesiredZ) {
        self.ctx.dispatch(Body::DesiredZ(z));
    }

    fn dispatch_brake(&mut self, op: BrakeOp) {
        *self.braking = op == BrakeOp::Start;
        self.ctx.dispatch(Body::Brake(Brake { op }));
    }
}

/// 路径控制器任务，航向生成经由 [`Steering`] 接缝多态化。
pub struct PathController<S: Steering> {
    args: PathArgs,
    steering: S,
    bottom_args: BottomArgs,
    bottom_samples: u32,
    bottom: Option<BottomTracker>,
    estate: Option<EstimatedState>,
    path: Option<ActivePath>,
    prev_end: Option<(f64, f64)>,
    end_time: f64,
    braking: bool,
    z_mask: u32,
    last_step: f64,
    nearby_time: f64,
    report: Countdown,
    along: AlongTrackMonitor,
    cross: CrossTrackMonitor,
}

impl<S: Steering> PathController<S> {
    pub fn new(steering: S) -> Self {
        let args = PathArgs::default();
        PathController {
            along: AlongTrackMonitor::new(args.along),
            cross: CrossTrackMonitor::new(args.cross),
            args,
            steering,
            bottom_args: BottomArgs::default(),
            bottom_samples: 5,
            bottom: None,
            estate: None,
            path: None,
            prev_end: None,
            end_time: f64::NEG_INFINITY,
            braking: false,
            z_mask: 0,
            last_step: f64::NEG_INFINITY,
            nearby_time: f64::NEG_INFINITY,
            report: Countdown::new(),
        }
    }

    /// 诊断视图：当前航迹状态。
    pub fn tracking(&self) -> Option<&TrackingState> {
        self.path.as_ref().map(|p| &p.state)
    }

    /// 诊断视图：贴底跟踪器状态。
    pub fn bottom_state(&self) -> Option<BtState> {
        self.bottom.as_ref().map(BottomTracker::state)
    }

    fn course_of(&self, es: &EstimatedState) -> f64 {
        if self.args.course_control {
            es.vy.atan2(es.vx)
        } else {
            es.psi
        }
    }

    fn speed_of(&self, es: &EstimatedState) -> f64 {
        if self.args.course_control {
            es.vx.hypot(es.vy)
        } else {
            es.u
        }
    }

    fn z_of(units: ZUnits, es: &EstimatedState) -> f64 {
        match units {
            ZUnits::Depth => es.depth,
            ZUnits::Altitude => es.alt,
            _ => es.z,
        }
    }

    fn handle_path(&mut self, ctx: &mut TaskContext, dp: &DesiredPath, now: f64) {
        if !ctx.is_active() {
            tracing::warn!(task = %ctx.name(), "desired path while inactive");
            ctx.set_entity_state(
                EntityHealth::Error,
                "desired path rejected: path control loop inactive",
            );
            return;
        }
        let Some(es) = self.estate.clone() else {
            ctx.set_entity_state(
                EntityHealth::Error,
                "desired path rejected: no navigation estimate",
            );
            return;
        };

        let origin = (es.lat, es.lon);
        let position = Enu::new(es.x, es.y);
        let position_geo = geo::displace(es.lat, es.lon, es.x, es.y);
        let course = self.course_of(&es);

        let was_tracking = self.path.is_some();
        let was_nearby = self.path.as_ref().is_some_and(|p| p.state.nearby);

        // 起点规则：显式起点 > 直达 > 续用上一终点（1 s 滞回内且未 nearby）> 当前位置。
        let start_geo = if dp.flags & DesiredPath::FL_START != 0 {
            (dp.start_lat, dp.start_lon)
        } else if dp.flags & DesiredPath::FL_DIRECT != 0 {
            position_geo
        } else if let Some(prev) = self.prev_end {
            if !was_nearby && (was_tracking || now - self.end_time <= PREVIOUS_END_REUSE) {
                prev
            } else {
                position_geo
            }
        } else {
            position_geo
        };
        let raw_end_geo = if dp.flags & DesiredPath::FL_LOITER_CURR != 0 {
            position_geo
        } else {
            (dp.end_lat, dp.end_lon)
        };

        let start = enu_from(origin, start_geo);
        let mut end = enu_from(origin, raw_end_geo);
        let (mut bearing, mut length) =
            bearing_and_range(end.north - start.north, end.east - start.east);

        // 盘旋入点：圆心向 track_bearing ± π/2 偏移一个半径；圈内且航向朝内时翻边。
        let mut loiter_center = Enu::default();
        let mut loiter_radius = 0.0;
        let clockwise = dp.flags & DesiredPath::FL_CCLOCKW == 0;
        let mut center_geo = None;
        if dp.lradius > 0.0 {
            let center = end;
            let ref_bearing = if length < 1.0 { course } else { bearing };
            let mut side = if clockwise {
                ref_bearing - FRAC_PI_2
            } else {
                ref_bearing + FRAC_PI_2
            };
            let (to_center, dist) = position.bearing_range_to(center);
            let heading_inward = normalize_angle(course - to_center).abs() < FRAC_PI_2;
            if dist < self.args.loiter_size_factor * dp.lradius && heading_inward {
                side += PI;
            }
            end = Enu::new(
                center.north + dp.lradius * side.cos(),
                center.east + dp.lradius * side.sin(),
            );
            let (b, l) = bearing_and_range(end.north - start.north, end.east - start.east);
            bearing = b;
            length = l;
            loiter_center = center;
            loiter_radius = dp.lradius;
            center_geo = Some(raw_end_geo);
        }

        // 垂直基准：停用不活跃的垂直环、使能活跃者；贴底跟踪启用时经它改写。
        let mut enable_mask = loops::SPEED;
        let mut disable_mask = loops::NONE;
        if dp.flags & DesiredPath::FL_NO_Z == 0 && self.steering.wants_z_control() {
            let z = DesiredZ {
                value: dp.end_z,
                z_units: dp.end_z_units,
            };
            match dp.end_z_units {
                ZUnits::Depth => {
                    disable_mask |= loops::ALTITUDE;
                    enable_mask |= loops::DEPTH;
                    self.z_mask = loops::DEPTH;
                }
                ZUnits::Altitude => {
                    disable_mask |= loops::DEPTH;
                    enable_mask |= loops::ALTITUDE;
                    self.z_mask = loops::ALTITUDE;
                }
                _ => {}
            }
            if let Some(bt) = self.bottom.as_mut() {
                let mut link = Link {
                    ctx,
                    braking: &mut self.braking,
                };
                bt.set_reference(&mut link, z, dp.speed);
            } else {
                ctx.dispatch(Body::DesiredZ(z));
            }
        }
        if disable_mask != loops::NONE {
            ctx.dispatch(Body::ControlLoops(ControlLoops {
                enable: false,
                mask: disable_mask,
            }));
        }
        ctx.dispatch(Body::DesiredSpeed(DesiredSpeed {
            value: dp.speed,
            speed_units: dp.speed_units,
        }));
        ctx.dispatch(Body::ControlLoops(ControlLoops {
            enable: true,
            mask: enable_mask,
        }));

        let (x, y) = project(start, bearing, position);
        let course_error = normalize_angle(course - bearing);
        let state = TrackingState {
            start,
            end,
            bearing,
            length,
            position,
            x,
            y,
            z: Self::z_of(dp.end_z_units, &es),
            course,
            speed: self.speed_of(&es),
            course_error,
            eta: f64::from(u16::MAX),
            nearby: false,
            loitering: false,
            loiter_center,
            loiter_radius,
            loiter_clockwise: clockwise,
            now,
        };
        let end_geo_eff = geo::displace(es.lat, es.lon, end.north, end.east);
        self.path = Some(ActivePath {
            origin,
            start_geo,
            end_geo: end_geo_eff,
            center_geo,
            z_units: dp.end_z_units,
            state,
        });
        self.prev_end = Some(raw_end_geo);
        self.nearby_time = f64::NEG_INFINITY;
        self.along.reset(now, x, course_error);
        self.cross.reset();
        self.last_step = f64::NEG_INFINITY;

        let snapshot = self
            .path
            .as_ref()
            .map(|p| p.state.clone())
            .unwrap_or_default();
        self.steering.on_path_startup(ctx, &snapshot);
        self.publish_state(ctx);
        self.report.reset(now, self.args.state_period);
        tracing::info!(
            task = %ctx.name(),
            bearing,
            length,
            loiter = loiter_radius > 0.0,
            "new path accepted"
        );
    }

    fn handle_state(&mut self, ctx: &mut TaskContext, es: &EstimatedState, now: f64) {
        self.estate = Some(es.clone());
        if !ctx.is_active() {
            return;
        }
        // 控制频率节流：重放同戳消息（Δt = 0）不产生任何输出。
        if now - self.last_step < 1.0 / self.args.control_frequency {
            return;
        }
        self.last_step = now;

        if let Some(bt) = self.bottom.as_mut() {
            let mut link = Link {
                ctx,
                braking: &mut self.braking,
            };
            bt.update(&mut link, es, now);
        }

        let Some(path) = self.path.as_mut() else {
            return;
        };

        // 估计器锚点漂移：把端点重投影进新的本地系。
        if (es.lat, es.lon) != path.origin {
            path.origin = (es.lat, es.lon);
            path.state.start = enu_from(path.origin, path.start_geo);
            path.state.end = enu_from(path.origin, path.end_geo);
            if let Some(cg) = path.center_geo {
                path.state.loiter_center = enu_from(path.origin, cg);
            }
            let (b, l) = bearing_and_range(
                path.state.end.north - path.state.start.north,
                path.state.end.east - path.state.start.east,
            );
            path.state.bearing = b;
            path.state.length = l;
        }

        let position = Enu::new(es.x, es.y);
        let course = if self.args.course_control {
            es.vy.atan2(es.vx)
        } else {
            es.psi
        };
        let speed = if self.args.course_control {
            es.vx.hypot(es.vy)
        } else {
            es.u
        };

        let mut fired_nearby = false;
        let (snapshot, timeout_applies) = {
            let st = &mut path.state;
            let (x, y) = project(st.start, st.bearing, position);
            st.position = position;
            st.x = x;
            st.y = y;
            st.z = Self::z_of(path.z_units, es);
            st.course = course;
            st.speed = speed;
            st.course_error = normalize_angle(course - st.bearing);
            st.now = now;

            let errx = (st.length - st.x).abs();
            let erry = st.y.abs();
            let s = st.speed.max(1.0);
            let eta_raw = if errx <= erry && erry < 2.0 * self.args.time_factor * s {
                errx / s
            } else {
                errx.hypot(erry) / s
            };
            st.eta = (eta_raw - self.args.time_factor).clamp(0.0, f64::from(u16::MAX));

            if !st.nearby && st.eta <= 0.0 {
                st.nearby = true;
                fired_nearby = true;
            }
            if !st.loitering && st.nearby && st.loiter_radius > 0.0 {
                st.loitering = true;
                st.end = st.loiter_center;
                tracing::info!(task = %ctx.name(), radius = st.loiter_radius, "entering loiter");
            }
            (st.clone(), st.nearby && !st.loitering)
        };
        if fired_nearby {
            self.nearby_time = now;
            tracing::debug!(task = %ctx.name(), "track endpoint nearby");
        }

        // 已接近终点却迟迟等不到新基准：按偏差错误上报。
        if timeout_applies && now - self.nearby_time > self.args.new_ref_timeout {
            self.fail(ctx, now, "expected new path reference");
            return;
        }

        // 偏差监视：刹车期间不评估，盘旋期间纵向不评估。
        if !self.braking {
            if self.args.along_enabled
                && !snapshot.loitering
                && self.along.check(now, snapshot.x, snapshot.course_error)
                    == MonitorVerdict::Diverged
            {
                self.fail(ctx, now, "along-track divergence error");
                return;
            }
            if self.args.cross_enabled
                && self.cross.check(now, snapshot.y, None) == MonitorVerdict::Diverged
            {
                self.fail(ctx, now, "cross-track divergence error");
                return;
            }
        }

        if snapshot.loitering {
            self.steering.loiter(ctx, &snapshot);
        } else {
            self.steering.step(ctx, &snapshot);
        }

        if self.report.overflowed(now) {
            self.publish_state(ctx);
            self.report.reset(now, self.args.state_period);
        }
    }

    fn handle_loops(&mut self, ctx: &mut TaskContext, cl: &ControlLoops) {
        if cl.mask & loops::PATH == 0 {
            return;
        }
        if cl.enable {
            if !ctx.is_active() {
                ctx.request_activation();
            }
        } else if ctx.is_active() {
            ctx.request_deactivation();
        }
    }

    fn fail(&mut self, ctx: &mut TaskContext, now: f64, reason: &'static str) {
        tracing::error!(task = %ctx.name(), reason, "path following failed");
        ctx.set_entity_state(EntityHealth::Error, reason);
        self.path = None;
        self.end_time = now;
        self.along.reset(now, 0.0, 0.0);
        self.cross.reset();
    }

    fn publish_state(&self, ctx: &TaskContext) {
        let Some(path) = &self.path else {
            return;
        };
        let st = &path.state;
        let mut flags = 0u8;
        if st.nearby {
            flags |= PathControlState::FL_NEAR;
        }
        if st.loitering {
            flags |= PathControlState::FL_LOITERING;
        }
        let (vx, vy, vz) = self
            .estate
            .as_ref()
            .map_or((0.0, 0.0, 0.0), |e| (e.vx, e.vy, e.vz));
        ctx.dispatch(Body::PathControlState(PathControlState {
            start_lat: path.start_geo.0,
            start_lon: path.start_geo.1,
            end_lat: path.end_geo.0,
            end_lon: path.end_geo.1,
            lradius: st.loiter_radius,
            flags,
            x: st.x,
            y: st.y,
            z: st.z,
            vx,
            vy,
            vz,
            course_error: st.course_error,
            eta: st.eta.round().clamp(0.0, f64::from(u16::MAX)) as u16,
        }));
    }
}

impl<S: Steering> Task for PathController<S> {
    fn schedule(&self) -> Schedule {
        Schedule::EventDriven {
            poll: Duration::from_millis(200),
        }
    }

    fn subscriptions(&self) -> Vec<MessageId> {
        vec![
            catalog::DESIRED_PATH,
            catalog::ESTIMATED_STATE,
            catalog::CONTROL_LOOPS,
            catalog::DISTANCE,
        ]
    }

    fn declare_parameters(&mut self, binder: &mut ParamBinder) -> Result<(), ParamError> {
        binder
            .param("Control Frequency", &mut self.args.control_frequency)
            .defaults("10.0")
            .units(Units::Hertz)
            .minimum(1.0)
            .commit()?;
        binder
            .param("State Report Period", &mut self.args.state_period)
            .defaults("1.0")
            .units(Units::Second)
            .minimum(0.1)
            .commit()?;
        binder
            .param("ETA Time Factor", &mut self.args.time_factor)
            .defaults("5.0")
            .units(Units::Second)
            .minimum(0.0)
            .commit()?;
        binder
            .param("Course Control", &mut self.args.course_control)
            .defaults("false")
            .commit()?;
        binder
            .param("Loiter Size Factor", &mut self.args.loiter_size_factor)
            .defaults("0.75")
            .minimum(0.1)
            .maximum(1.0)
            .commit()?;
        binder
            .param("New Reference Timeout", &mut self.args.new_ref_timeout)
            .defaults("5.0")
            .units(Units::Second)
            .minimum(0.5)
            .commit()?;
        binder
            .param("Along-Track -- Monitor", &mut self.args.along_enabled)
            .defaults("true")
            .visibility(Visibility::User)
            .commit()?;
        binder
            .param("Along-Track -- Check Period", &mut self.args.along.period)
            .defaults("20.0")
            .units(Units::Second)
            .minimum(1.0)
            .commit()?;
        binder
            .param("Along-Track -- Minimum Speed", &mut self.args.along.min_speed)
            .defaults("0.1")
            .units(Units::MeterPerSecond)
            .minimum(0.0)
            .commit()?;
        binder
            .param("Along-Track -- Minimum Yaw", &mut self.args.along.min_yaw)
            .defaults("0.094")
            .units(Units::RadianPerSecond)
            .minimum(0.0)
            .commit()?;
        binder
            .param("Cross-Track -- Monitor", &mut self.args.cross_enabled)
            .defaults("true")
            .visibility(Visibility::User)
            .commit()?;
        binder
            .param(
                "Cross-Track -- Distance Limit",
                &mut self.args.cross.distance_limit,
            )
            .defaults("25.0")
            .units(Units::Meter)
            .minimum(1.0)
            .commit()?;
        binder
            .param("Cross-Track -- Time Limit", &mut self.args.cross.time_limit)
            .defaults("20.0")
            .units(Units::Second)
            .minimum(1.0)
            .commit()?;
        binder
            .param(
                "Cross-Track -- Nav. Unc. Factor",
                &mut self.args.cross.nav_uncertainty_factor,
            )
            .defaults("0.0")
            .minimum(0.0)
            .commit()?;
        binder
            .param("Bottom Track -- Enabled", &mut self.bottom_args.enabled)
            .defaults("false")
            .visibility(Visibility::User)
            .commit()?;
        binder
            .param(
                "Bottom Track -- Minimum Altitude",
                &mut self.bottom_args.min_altitude,
            )
            .defaults("1.0")
            .units(Units::Meter)
            .minimum(0.1)
            .commit()?;
        binder
            .param(
                "Bottom Track -- Minimum Range",
                &mut self.bottom_args.min_range,
            )
            .defaults("4.0")
            .units(Units::Meter)
            .minimum(0.5)
            .commit()?;
        binder
            .param("Bottom Track -- Safe Pitch", &mut self.bottom_args.safe_pitch)
            .defaults("0.35")
            .units(Units::Radian)
            .minimum(0.05)
            .commit()?;
        binder
            .param(
                "Bottom Track -- Depth Limit",
                &mut self.bottom_args.depth_limit,
            )
            .defaults("45.0")
            .units(Units::Meter)
            .minimum(1.0)
            .commit()?;
        binder
            .param(
                "Bottom Track -- Depth Hysteresis",
                &mut self.bottom_args.depth_hysteresis,
            )
            .defaults("0.5")
            .units(Units::Meter)
            .minimum(0.0)
            .commit()?;
        binder
            .param(
                "Bottom Track -- Depth Tolerance",
                &mut self.bottom_args.depth_tolerance,
            )
            .defaults("2.0")
            .units(Units::Meter)
            .minimum(0.0)
            .commit()?;
        binder
            .param(
                "Bottom Track -- Control Period",
                &mut self.bottom_args.control_period,
            )
            .defaults("1.0")
            .units(Units::Second)
            .minimum(0.1)
            .commit()?;
        binder
            .param("Bottom Track -- Slope Samples", &mut self.bottom_samples)
            .defaults("5")
            .minimum(1.0)
            .maximum(64.0)
            .commit()?;
        binder
            .param("Bottom Track -- Sonar Tilt", &mut self.bottom_args.sonar_tilt)
            .defaults("0.524")
            .units(Units::Radian)
            .commit()?;
        binder
            .param("Bottom Track -- Check Trend", &mut self.bottom_args.check_trend)
            .defaults("true")
            .commit()?;
        self.steering.declare_parameters(binder)
    }

    fn on_update_parameters(&mut self, _ctx: &mut TaskContext) {
        self.bottom_args.slope_samples = self.bottom_samples as usize;
        self.along.update_args(self.args.along);
        self.cross.update_args(self.args.cross);
        self.bottom = self
            .bottom_args
            .enabled
            .then(|| BottomTracker::new(self.bottom_args.clone()));
    }

    fn on_activation(&mut self, ctx: &mut TaskContext) {
        tracing::info!(task = %ctx.name(), "path control engaged");
        ctx.set_entity_state(EntityHealth::Normal, "path control engaged");
    }

    fn on_deactivation(&mut self, ctx: &mut TaskContext) {
        // 最后使用的垂直环与策略认领的环一并撤销。
        let mask = self.z_mask | self.steering.claimed_loops();
        ctx.dispatch(Body::ControlLoops(ControlLoops {
            enable: false,
            mask,
        }));
        self.z_mask = loops::NONE;
        if self.path.is_some() {
            self.end_time = ctx.epoch();
        }
        self.path = None;
        self.braking = false;
        if let Some(bt) = self.bottom.as_mut() {
            bt.reset();
        }
        tracing::info!(task = %ctx.name(), "path control idle");
        ctx.set_entity_state(EntityHealth::Normal, "path control idle");
    }

    fn on_envelope(&mut self, ctx: &mut TaskContext, env: &Envelope) {
        let now = env.header.time;
        match &env.body {
            Body::DesiredPath(dp) => self.handle_path(ctx, dp, now),
            Body::EstimatedState(es) => self.handle_state(ctx, es, now),
            Body::ControlLoops(cl) => self.handle_loops(ctx, cl),
            Body::Distance(d) => {
                if d.validity == DistanceValidity::Valid {
                    if let Some(bt) = self.bottom.as_mut() {
                        bt.on_distance(d.value);
                    }
                }
            }
            _ => {}
        }
    }
}

fn enu_from(origin: (f64, f64), point: (f64, f64)) -> Enu {
    let (north, east) = geo::displacement(origin.0, origin.1, point.0, point.1);
    Enu::new(north, east)
}

/// 把位置投影到航迹框架：x 沿航迹，y 垂直于航迹（右正）。
fn project(start: Enu, bearing: f64, position: Enu) -> (f64, f64) {
    let dn = position.north - start.north;
    let de = position.east - start.east;
    let (sb, cb) = bearing.sin_cos();
    (dn * cb + de * sb, -dn * sb + de * cb)
}
