//! 运行级错误类型
//!
//! 只有真正不可恢复的情况走这里（规划耗尽重试、配置错误、目标文件错误）；
//! 工具调用失败与未知动作名不是错误，由 Executor 转为失败的 ActionResult 反馈给模型。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Goal file error: {0}")]
    GoalFile(String),

    /// 历史交替顺序被破坏（Human -> Plan -> Result -> Plan ...）
    #[error("History order violation: {0}")]
    HistoryOrder(String),

    /// Planner 重试耗尽或遇到不可重试的后端错误
    #[error("Planner failed after {attempts} attempt(s): {source}")]
    PlannerExhausted {
        attempts: u32,
        #[source]
        source: LlmError,
    },
}
