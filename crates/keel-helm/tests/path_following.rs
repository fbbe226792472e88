//! 路径控制器的跟随契约：大地投影与基准下发、状态报告恰好一次、
//! 重放同戳量测的幂等性、非激活拒绝。

use keel_core::catalog::{
    self, Body, ControlLoops, DesiredPath, EstimatedState, SpeedUnits, ZUnits, loops,
};
use keel_core::config::Config;
use keel_core::entity::EntityHealth;
use keel_core::task::TaskContext;
use keel_core::testing::TestBench;
use keel_helm::{LineOfSight, PathController};

const LAT: f64 = 0.7188;
const LON: f64 = -0.152;
/// Δlat = 1.745e-6 rad：中纬度约 11.13 m 的子午弧。
const DLAT: f64 = 1.745e-6;

fn setup(config: &Config) -> (TestBench, PathController<LineOfSight>, TaskContext) {
    let bench = TestBench::new();
    bench.probe(&[
        catalog::DESIRED_Z,
        catalog::DESIRED_SPEED,
        catalog::DESIRED_HEADING,
        catalog::CONTROL_LOOPS,
        catalog::PATH_CONTROL_STATE,
        catalog::BRAKE,
        catalog::ENTITY_STATE,
    ]);
    let mut task = PathController::new(LineOfSight::new());
    let mut ctx = bench.context("Path Controller");
    bench.commission(&mut task, &mut ctx, config).unwrap();
    (bench, task, ctx)
}

fn estimated_state() -> Body {
    Body::EstimatedState(EstimatedState {
        lat: LAT,
        lon: LON,
        u: 1.5,
        ..EstimatedState::default()
    })
}

fn northward_path() -> Body {
    Body::DesiredPath(DesiredPath {
        start_lat: LAT,
        start_lon: LON,
        end_lat: LAT + DLAT,
        end_lon: LON,
        end_z: 2.0,
        end_z_units: ZUnits::Depth,
        speed: 1.5,
        speed_units: SpeedUnits::MetersPerSecond,
        lradius: 0.0,
        flags: DesiredPath::FL_START,
        ..DesiredPath::default()
    })
}

fn activate(bench: &TestBench, task: &mut PathController<LineOfSight>, ctx: &mut TaskContext) {
    bench.deliver(
        task,
        ctx,
        Body::ControlLoops(ControlLoops {
            enable: true,
            mask: loops::PATH,
        }),
    );
    assert!(ctx.is_active());
}

#[test]
fn desired_path_projects_and_dispatches_references() {
    let (bench, mut task, mut ctx) = setup(&Config::new());
    bench.deliver(&mut task, &mut ctx, estimated_state());
    activate(&bench, &mut task, &mut ctx);
    bench.drain();

    bench.deliver(&mut task, &mut ctx, northward_path());
    let bodies = bench.drain_bodies();

    let tracking = task.tracking().expect("path must be accepted");
    assert!((tracking.length - 11.13).abs() < 0.05, "length = {}", tracking.length);
    assert!(tracking.bearing.abs() < 1e-6, "bearing = {}", tracking.bearing);

    assert!(bodies.iter().any(|b| matches!(
        b,
        Body::DesiredSpeed(s) if s.value == 1.5 && s.speed_units == SpeedUnits::MetersPerSecond
    )));
    assert!(bodies.iter().any(|b| matches!(
        b,
        Body::DesiredZ(z) if z.value == 2.0 && z.z_units == ZUnits::Depth
    )));
    // 速度环与深度环一次使能，高度环被停用。
    assert!(bodies.iter().any(|b| matches!(
        b,
        Body::ControlLoops(cl) if cl.enable && cl.mask == (loops::SPEED | loops::DEPTH)
    )));
    assert!(bodies.iter().any(|b| matches!(
        b,
        Body::ControlLoops(cl) if !cl.enable && cl.mask & loops::ALTITUDE != 0
    )));
}

#[test]
fn accepted_path_reports_state_exactly_once_before_next_tick() {
    let (bench, mut task, mut ctx) = setup(&Config::new());
    bench.deliver(&mut task, &mut ctx, estimated_state());
    activate(&bench, &mut task, &mut ctx);
    bench.drain();

    bench.deliver(&mut task, &mut ctx, northward_path());
    let states: Vec<_> = bench
        .drain_bodies()
        .into_iter()
        .filter_map(|b| match b {
            Body::PathControlState(pcs) => Some(pcs),
            _ => None,
        })
        .collect();
    assert_eq!(states.len(), 1);
    assert!((states[0].start_lat - LAT).abs() < 1e-12);
    assert!((states[0].end_lat - (LAT + DLAT)).abs() < 1e-9);
}

#[test]
fn replayed_identical_state_produces_no_actuation() {
    let (bench, mut task, mut ctx) = setup(&Config::new());
    bench.deliver(&mut task, &mut ctx, estimated_state());
    activate(&bench, &mut task, &mut ctx);
    bench.deliver(&mut task, &mut ctx, northward_path());
    bench.drain();

    bench.advance(1.0);
    bench.deliver(&mut task, &mut ctx, estimated_state());
    let first: Vec<_> = bench.drain_bodies();
    assert!(!first.is_empty(), "first measurement must steer");

    // 同一时间戳重放：控制频率节流吞掉整个处理路径。
    bench.deliver(&mut task, &mut ctx, estimated_state());
    let second = bench.drain_bodies();
    assert!(
        second.iter().all(|b| !matches!(
            b,
            Body::ControlLoops(_) | Body::DesiredSpeed(_) | Body::Brake(_) | Body::DesiredZ(_)
        )),
        "replay must not re-actuate: {second:?}"
    );
    assert!(second.is_empty());
}

#[test]
fn desired_path_is_refused_while_inactive() {
    let (bench, mut task, mut ctx) = setup(&Config::new());
    bench.deliver(&mut task, &mut ctx, estimated_state());
    bench.drain();

    bench.deliver(&mut task, &mut ctx, northward_path());
    assert!(task.tracking().is_none());
    assert_eq!(ctx.entity_health(), EntityHealth::Error);
    let bodies = bench.drain_bodies();
    assert!(bodies.iter().any(|b| matches!(
        b,
        Body::EntityState(es)
            if es.state == EntityHealth::Error && es.description.contains("inactive")
    )));
    // 被拒绝的路径不产生任何基准。
    assert!(bodies
        .iter()
        .all(|b| !matches!(b, Body::DesiredSpeed(_) | Body::DesiredZ(_))));
}

#[test]
fn deactivation_releases_vertical_and_steering_loops() {
    let (bench, mut task, mut ctx) = setup(&Config::new());
    bench.deliver(&mut task, &mut ctx, estimated_state());
    activate(&bench, &mut task, &mut ctx);
    bench.deliver(&mut task, &mut ctx, northward_path());
    bench.drain();

    bench.deliver(
        &mut task,
        &mut ctx,
        Body::ControlLoops(ControlLoops {
            enable: false,
            mask: loops::PATH,
        }),
    );
    assert!(!ctx.is_active());
    let bodies = bench.drain_bodies();
    let released = bodies
        .iter()
        .find_map(|b| match b {
            Body::ControlLoops(cl) if !cl.enable => Some(cl.mask),
            _ => None,
        })
        .expect("deactivation must release loops");
    assert!(released & loops::DEPTH != 0, "last used z loop released");
    assert!(released & loops::YAW != 0, "steering loop released");
    assert!(task.tracking().is_none());
}

#[test]
fn loiter_path_offsets_entry_point_and_enters_loiter() {
    let (bench, mut task, mut ctx) = setup(&Config::new());
    bench.deliver(&mut task, &mut ctx, estimated_state());
    activate(&bench, &mut task, &mut ctx);
    bench.drain();

    // 圆心在北 500 m，半径 50：入点在圆心两侧切线上。
    let dlat_500 = 500.0 / 6_363_000.0;
    bench.deliver(
        &mut task,
        &mut ctx,
        Body::DesiredPath(DesiredPath {
            end_lat: LAT + dlat_500,
            end_lon: LON,
            end_z: 2.0,
            end_z_units: ZUnits::Depth,
            speed: 1.0,
            speed_units: SpeedUnits::MetersPerSecond,
            lradius: 50.0,
            flags: 0,
            ..DesiredPath::default()
        }),
    );
    bench.drain();
    let tracking = task.tracking().unwrap();
    assert_eq!(tracking.loiter_radius, 50.0);
    assert!(tracking.loiter_clockwise);
    // 入点偏离圆心恰一个半径；自南向北顺时针进入时切在圆心西侧，
    // 这样入点处的顺时针切向正好还是北向。
    let dn = tracking.end.north - tracking.loiter_center.north;
    let de = tracking.end.east - tracking.loiter_center.east;
    assert!((dn.hypot(de) - 50.0).abs() < 1e-6);
    assert!((de + 50.0).abs() < 1e-6, "entry east offset = {de}");
    assert!(!tracking.loitering);
}
