//! 认知层：Planner、控制循环、运行事件

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::RunEvent;
pub use loop_::{run_loop, RunSession, DEFAULT_FINISH_ACTION};
pub use planner::{Planner, RetryConfig};
