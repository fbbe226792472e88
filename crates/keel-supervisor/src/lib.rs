#![doc = "keel-supervisor: 载具操作模式的唯一事实来源。"]
#![doc = ""]
#![doc = "监督者仲裁“谁在指挥载具”：计划机动、外部越权、错误恢复。它消费"]
#![doc = "`VehicleCommand`/`PlanControl`/`EntityMonitoringState`/`Abort`/"]
#![doc = "`ManeuverControlState`/`ControlLoops`，周期性并在每次模式切换时发布"]
#![doc = "`VehicleState`，维护进程级控制环掩码。"]
#![doc = ""]
#![doc = "分层沿用影子模型手法：`machine` 是不碰总线的纯转换核心（便于属性测试"]
#![doc = "全域扫描），`task` 是执行效果列表的总线外壳。"]

pub mod machine;
pub mod monitor;
pub mod task;

pub use machine::{Effect, Machine, MachineConfig};
pub use monitor::EntityMonitor;
pub use task::Supervisor;
