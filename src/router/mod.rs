//! 步骤路由
//!
//! - dispatch：入站事件 -> 活动节点 / 命令 -> 下一个节点
//! - goto：校验结果 -> 动作集合 -> 目标节点
//! - executor：执行节点（入场方法、动作、消息、goto 链）

pub mod dispatch;
pub mod executor;
pub mod goto;

pub use dispatch::{DialogRouter, KeyFn, RouteOutcome, RouteStatus, RouterBuilder};
pub use executor::{store_answer, ExecOptions, StepExecutor};
pub use goto::{build_action_bundle, find_next_node, process_gotos};
