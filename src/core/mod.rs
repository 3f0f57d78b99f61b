//! 核心编排层：错误、目标与 playbook、运行状态、会话监管、编排器

pub mod builder;
pub mod error;
pub mod goal;
pub mod orchestrator;
pub mod session_supervisor;
pub mod state;

pub use builder::{create_llm_from_config, OrchestratorBuilder};
pub use error::AgentError;
pub use goal::{Goal, Playbook, RunFile};
pub use orchestrator::Orchestrator;
pub use session_supervisor::SessionSupervisor;
pub use state::{LoopLimits, LoopPhase, RunOutcome, RunState, TerminatedReason};
