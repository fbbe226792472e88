#![doc = "keel-helm: 路径控制域——期望路径到低层基准的翻译、偏差监视、贴底保护与机动框架。"]
#![doc = ""]
#![doc = "数据流：`DesiredPath` 进、`DesiredZ`/`DesiredSpeed`/`DesiredHeading`/"]
#![doc = "`PathControlState`/`Brake` 出；一切跨组件交互都走总线。路径控制器对"]
#![doc = "`ControlLoops` 的 CL_PATH 位做激活翻转；贴底跟踪器作为嵌套子状态机在"]
#![doc = "垂直通道上拦截改写；机动框架以进程级互斥锁保证全进程至多一个活动机动。"]

pub mod bottom;
pub mod maneuver;
pub mod monitors;
mod path;

pub use bottom::{BottomArgs, BottomTracker, BtState, Forcing, ReferenceSink, SlopeWindow};
pub use maneuver::{IdleTask, ManeuverCore};
pub use monitors::{
    AlongTrackArgs, AlongTrackMonitor, CrossTrackArgs, CrossTrackMonitor, MonitorVerdict,
};
pub use path::{LineOfSight, PathController, Steering, TrackingState};
