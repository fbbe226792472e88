//! # bottom：贴底跟踪子状态机
//!
//! ## 核心意图（Why）
//! - 跟随高度基准时，地形可能在前方隆起；贴底跟踪器在父控制器与垂直通道之间
//!   插入一层保护：必要时把高度基准改写为深度基准、触发刹车，危险解除后把
//!   原始基准原样补发回去；
//! - 跟踪器不直接碰总线：所有下发经由父控制器交来的 [`ReferenceSink`] 句柄，
//!   既满足“仅父控制器激活时才可下发”的约束，也避免与父控制器互持强引用。
//!
//! ## 行为契约（What）
//! - 五个状态 {IDLE, TRACKING, DEPTH, UNSAFE, AVOIDING}；任何转换的前置门槛是
//!   “Z 基准量纲非 NONE 且期望速度为正”；
//! - 评估按 `control_period` 节流；
//! - 高度有效性带深度滞回：深度越过 `depth_tolerance` 置有效，跌破
//!   `depth_tolerance − depth_hysteresis` 置无效；
//! - AVOIDING 的进出与刹车一一配对：进入时 Brake START，恢复时 Brake STOP
//!   并补发原始 Z 基准。

use std::collections::VecDeque;

use keel_core::catalog::{BrakeOp, DesiredZ, EstimatedState, ZUnits};

/// 贴底跟踪器的下发出口，由父控制器按调用现场构造。
pub trait ReferenceSink {
    fn dispatch_z(&mut self, z: DesiredZ);
    fn dispatch_brake(&mut self, op: BrakeOp);
}

/// 跟踪器状态。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BtState {
    #[default]
    Idle,
    Tracking,
    Depth,
    Unsafe,
    Avoiding,
}

/// 强制垂直控制的原因。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Forcing {
    #[default]
    None,
    Depth,
}

/// 配置面。
#[derive(Clone, Debug)]
pub struct BottomArgs {
    pub enabled: bool,
    pub min_altitude: f64,
    pub min_range: f64,
    pub safe_pitch: f64,
    pub depth_limit: f64,
    pub depth_hysteresis: f64,
    pub depth_tolerance: f64,
    pub control_period: f64,
    pub slope_samples: usize,
    /// 前视波束相对水平面的下倾角（弧度）。
    pub sonar_tilt: f64,
    /// UNSAFE 中只有俯仰为负（仍在下压）时才跟随坡度增长重发安全深度。
    pub check_trend: bool,
}

impl Default for BottomArgs {
    fn default() -> Self {
        BottomArgs {
            enabled: false,
            min_altitude: 1.0,
            min_range: 4.0,
            safe_pitch: 0.35,
            depth_limit: 45.0,
            depth_hysteresis: 0.5,
            depth_tolerance: 2.0,
            control_period: 1.0,
            slope_samples: 5,
            sonar_tilt: 0.524,
            check_trend: true,
        }
    }
}

/// 前向测距滑动窗口与坡度估计。
#[derive(Clone, Debug, Default)]
pub struct SlopeWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SlopeWindow {
    pub fn new(capacity: usize) -> Self {
        SlopeWindow {
            samples: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, range: f64) {
        if range <= 0.0 {
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(range);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// 波束命中点相对载具的（前向距离, 垂向落差）。俯角 = tilt − theta。
    fn beam(&self, theta: f64, tilt: f64) -> Option<(f64, f64)> {
        let range = self.average()?;
        let depression = tilt - theta;
        Some((range * depression.cos(), range * depression.sin()))
    }

    /// 以当前离底高度估计前方坡度角；无样本或几何退化时取 0。
    pub fn slope_angle(&self, theta: f64, tilt: f64, alt: f64) -> f64 {
        match self.beam(theta, tilt) {
            Some((forward, drop)) if forward > 0.1 => (alt - drop).atan2(forward),
            _ => 0.0,
        }
    }

    /// 坡顶深度：命中点的绝对深度。
    pub fn top_depth(&self, theta: f64, tilt: f64, depth: f64) -> f64 {
        match self.beam(theta, tilt) {
            Some((_, drop)) => depth + drop,
            None => depth,
        }
    }
}

/// 贴底跟踪器。
#[derive(Clone, Debug)]
pub struct BottomTracker {
    args: BottomArgs,
    state: BtState,
    z_ref: Option<DesiredZ>,
    speed: f64,
    forcing: Forcing,
    slope: SlopeWindow,
    valid_altitude: bool,
    last_eval: f64,
    last_slope: f64,
    last_safe_depth: f64,
}

impl BottomTracker {
    pub fn new(args: BottomArgs) -> Self {
        let window = SlopeWindow::new(args.slope_samples);
        BottomTracker {
            args,
            state: BtState::Idle,
            z_ref: None,
            speed: 0.0,
            forcing: Forcing::None,
            slope: window,
            valid_altitude: false,
            last_eval: f64::NEG_INFINITY,
            last_slope: 0.0,
            last_safe_depth: f64::NAN,
        }
    }

    pub fn state(&self) -> BtState {
        self.state
    }

    pub fn forcing(&self) -> Forcing {
        self.forcing
    }

    /// 父控制器路过来的新 Z 基准与期望速度。
    ///
    /// 处于安全改写状态（DEPTH/UNSAFE/AVOIDING）时不透传，待恢复时补发。
    pub fn set_reference(&mut self, sink: &mut dyn ReferenceSink, z: DesiredZ, speed: f64) {
        self.z_ref = Some(z.clone());
        self.speed = speed;
        if matches!(self.state, BtState::Idle | BtState::Tracking) {
            sink.dispatch_z(z);
        }
    }

    /// 前向测距样本。
    pub fn on_distance(&mut self, range: f64) {
        self.slope.push(range);
    }

    /// 失活复位：窗口、状态与改写原因全部清空。
    pub fn reset(&mut self) {
        self.state = BtState::Idle;
        self.forcing = Forcing::None;
        self.z_ref = None;
        self.speed = 0.0;
        self.slope.clear();
        self.valid_altitude = false;
        self.last_eval = f64::NEG_INFINITY;
        self.last_slope = 0.0;
        self.last_safe_depth = f64::NAN;
    }

    /// 按 `control_period` 节流的状态机评估。
    pub fn update(&mut self, sink: &mut dyn ReferenceSink, es: &EstimatedState, now: f64) {
        let Some(z_ref) = self.z_ref.clone() else {
            return;
        };
        if z_ref.z_units == ZUnits::None || self.speed <= 0.0 {
            return;
        }
        if now - self.last_eval < self.args.control_period {
            return;
        }
        self.last_eval = now;

        // 高度有效性闩锁（深度滞回）。
        if es.depth >= self.args.depth_tolerance {
            self.valid_altitude = true;
        } else if es.depth < self.args.depth_tolerance - self.args.depth_hysteresis {
            self.valid_altitude = false;
        }
        let alt_ok = self.valid_altitude && es.alt >= 0.0;
        let range = self.slope.average();
        let slope = self.slope.slope_angle(es.theta, self.args.sonar_tilt, es.alt);
        let ranges_usable = range.is_some_and(|r| r >= self.args.min_range);

        if self.state == BtState::Idle && z_ref.z_units == ZUnits::Altitude {
            self.state = BtState::Tracking;
            tracing::debug!(valid_altitude = self.valid_altitude, "bottom tracker engaged");
        }

        match self.state {
            BtState::Idle => {}
            BtState::Tracking => {
                if z_ref.z_units == ZUnits::Depth {
                    self.state = BtState::Idle;
                    return;
                }
                if self.avoidance_needed(es, alt_ok, range) {
                    self.enter_avoiding(sink);
                    return;
                }
                if slope >= self.args.safe_pitch {
                    let safe = self.safe_depth(es, &z_ref);
                    sink.dispatch_z(DesiredZ {
                        value: safe,
                        z_units: ZUnits::Depth,
                    });
                    self.last_safe_depth = safe;
                    self.last_slope = slope;
                    self.state = BtState::Unsafe;
                    tracing::warn!(slope, safe_depth = safe, "unsafe slope ahead, forcing depth");
                    return;
                }
                if es.depth + es.alt - z_ref.value
                    > self.args.depth_limit + self.args.depth_hysteresis
                {
                    sink.dispatch_z(DesiredZ {
                        value: self.args.depth_limit,
                        z_units: ZUnits::Depth,
                    });
                    self.forcing = Forcing::Depth;
                    self.state = BtState::Depth;
                    tracing::warn!(limit = self.args.depth_limit, "depth limit reached, forcing depth");
                }
            }
            BtState::Unsafe => {
                if self.avoidance_needed(es, alt_ok, range) {
                    self.enter_avoiding(sink);
                    return;
                }
                if slope < self.args.safe_pitch && alt_ok && ranges_usable {
                    sink.dispatch_z(z_ref.clone());
                    self.state = BtState::Tracking;
                    tracing::info!("slope cleared, resuming altitude reference");
                    return;
                }
                // 坡度仍在增长且（不查趋势或仍在下压）：跟随坡顶更新安全深度。
                if slope > self.last_slope + 1e-3 && (!self.args.check_trend || es.theta < 0.0) {
                    let safe = self.safe_depth(es, &z_ref);
                    if (safe - self.last_safe_depth).abs() > 1e-3 {
                        sink.dispatch_z(DesiredZ {
                            value: safe,
                            z_units: ZUnits::Depth,
                        });
                        self.last_safe_depth = safe;
                    }
                    self.last_slope = slope;
                }
            }
            BtState::Depth => {
                // 回到限深以内即撤销改写原因。
                if es.depth + es.alt - z_ref.value
                    < self.args.depth_limit - self.args.depth_hysteresis
                {
                    self.forcing = Forcing::None;
                }
                if range.is_some_and(|r| r < self.args.min_range) {
                    self.enter_avoiding(sink);
                    return;
                }
                if z_ref.z_units == ZUnits::Altitude && self.forcing == Forcing::None {
                    sink.dispatch_z(z_ref.clone());
                    self.state = BtState::Tracking;
                } else if z_ref.z_units == ZUnits::Depth && z_ref.value < self.args.depth_limit {
                    self.forcing = Forcing::None;
                    self.state = BtState::Idle;
                }
            }
            BtState::Avoiding => {
                if slope < self.args.safe_pitch && alt_ok && es.alt >= z_ref.value {
                    sink.dispatch_brake(BrakeOp::Stop);
                    sink.dispatch_z(z_ref.clone());
                    self.state = BtState::Tracking;
                    tracing::info!("obstacle cleared, resuming altitude reference");
                }
            }
        }
    }

    fn avoidance_needed(&self, es: &EstimatedState, alt_ok: bool, range: Option<f64>) -> bool {
        (alt_ok && es.alt < self.args.min_altitude)
            || range.is_some_and(|r| r < self.args.min_range)
    }

    fn enter_avoiding(&mut self, sink: &mut dyn ReferenceSink) {
        sink.dispatch_brake(BrakeOp::Start);
        self.state = BtState::Avoiding;
        tracing::warn!("terrain too close, braking");
    }

    /// 坡顶深度减高度基准，下限 0。
    fn safe_depth(&self, es: &EstimatedState, z_ref: &DesiredZ) -> f64 {
        (self
            .slope
            .top_depth(es.theta, self.args.sonar_tilt, es.depth)
            - z_ref.value)
            .max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        zs: Vec<DesiredZ>,
        brakes: Vec<BrakeOp>,
    }

    impl ReferenceSink for Recorder {
        fn dispatch_z(&mut self, z: DesiredZ) {
            self.zs.push(z);
        }

        fn dispatch_brake(&mut self, op: BrakeOp) {
            self.brakes.push(op);
        }
    }

    fn altitude_ref(value: f64) -> DesiredZ {
        DesiredZ {
            value,
            z_units: ZUnits::Altitude,
        }
    }

    fn state_with(depth: f64, alt: f64) -> EstimatedState {
        EstimatedState {
            depth,
            alt,
            ..EstimatedState::default()
        }
    }

    fn tracker() -> BottomTracker {
        BottomTracker::new(BottomArgs {
            enabled: true,
            control_period: 1.0,
            ..BottomArgs::default()
        })
    }

    #[test]
    fn gate_requires_units_and_positive_speed() {
        let mut bt = tracker();
        let mut sink = Recorder::default();
        bt.set_reference(&mut sink, altitude_ref(3.0), 0.0);
        bt.update(&mut sink, &state_with(5.0, 0.5), 0.0);
        assert_eq!(bt.state(), BtState::Idle);
    }

    #[test]
    fn low_altitude_brakes_and_recovers() {
        let mut bt = tracker();
        let mut sink = Recorder::default();
        bt.set_reference(&mut sink, altitude_ref(3.0), 1.0);
        // 透传原始基准。
        assert_eq!(sink.zs.len(), 1);

        bt.on_distance(0.5);
        bt.update(&mut sink, &state_with(5.0, 0.8), 0.0);
        assert_eq!(bt.state(), BtState::Avoiding);
        assert_eq!(sink.brakes, vec![BrakeOp::Start]);

        // 冲淡窗口里的近距样本，使坡度恢复安全。
        for _ in 0..5 {
            bt.on_distance(30.0);
        }
        bt.update(&mut sink, &state_with(5.0, 3.2), 1.5);
        assert_eq!(bt.state(), BtState::Tracking);
        assert_eq!(sink.brakes, vec![BrakeOp::Start, BrakeOp::Stop]);
        let last = sink.zs.last().unwrap();
        assert_eq!(last.z_units, ZUnits::Altitude);
        assert_eq!(last.value, 3.0);
    }

    #[test]
    fn unsafe_slope_forces_safe_depth_then_clears() {
        let mut bt = BottomTracker::new(BottomArgs {
            enabled: true,
            min_range: 2.0,
            control_period: 1.0,
            ..BottomArgs::default()
        });
        let mut sink = Recorder::default();
        bt.set_reference(&mut sink, altitude_ref(3.0), 1.0);
        sink.zs.clear();

        // 前方 6 m 有障碍：波束落差 3 m（tilt 0.524），而离底高度 10 m。
        for _ in 0..5 {
            bt.on_distance(6.0);
        }
        let es = state_with(20.0, 10.0);
        bt.update(&mut sink, &es, 0.0);
        assert_eq!(bt.state(), BtState::Unsafe);
        let forced = sink.zs.last().unwrap();
        assert_eq!(forced.z_units, ZUnits::Depth);
        // 坡顶深度 = 20 + 6·sin(0.524) ≈ 23.0，安全深度 ≈ 23.0 − 3。
        assert!((forced.value - 20.0).abs() < 0.2, "safe depth = {}", forced.value);

        // 远处回到平缓：恢复原始高度基准。
        for _ in 0..5 {
            bt.on_distance(25.0);
        }
        bt.update(&mut sink, &es, 1.5);
        assert_eq!(bt.state(), BtState::Tracking);
        assert_eq!(sink.zs.last().unwrap().z_units, ZUnits::Altitude);
    }

    #[test]
    fn depth_limit_forces_and_releases() {
        let mut bt = BottomTracker::new(BottomArgs {
            enabled: true,
            depth_limit: 20.0,
            control_period: 1.0,
            ..BottomArgs::default()
        });
        let mut sink = Recorder::default();
        bt.set_reference(&mut sink, altitude_ref(5.0), 1.0);
        for _ in 0..5 {
            bt.on_distance(40.0);
        }

        // depth + alt − ref = 18 + 8 − 5 = 21 > 20.5。
        bt.update(&mut sink, &state_with(18.0, 8.0), 0.0);
        assert_eq!(bt.state(), BtState::Depth);
        assert_eq!(bt.forcing(), Forcing::Depth);
        let forced = sink.zs.last().unwrap();
        assert_eq!((forced.value, forced.z_units), (20.0, ZUnits::Depth));

        // 地形回落：16 + 7 − 5 = 18 < 19.5，改写原因撤销并回到高度跟踪。
        bt.update(&mut sink, &state_with(16.0, 7.0), 1.5);
        assert_eq!(bt.forcing(), Forcing::None);
        assert_eq!(bt.state(), BtState::Tracking);
        assert_eq!(sink.zs.last().unwrap().z_units, ZUnits::Altitude);
    }

    #[test]
    fn rate_limit_suppresses_reevaluation() {
        let mut bt = tracker();
        let mut sink = Recorder::default();
        bt.set_reference(&mut sink, altitude_ref(3.0), 1.0);
        bt.on_distance(0.5);
        bt.update(&mut sink, &state_with(5.0, 0.8), 0.0);
        assert_eq!(sink.brakes.len(), 1);
        // 同一评估期内重放同一量测：无新动作。
        bt.update(&mut sink, &state_with(5.0, 0.8), 0.2);
        assert_eq!(sink.brakes.len(), 1);
    }
}
