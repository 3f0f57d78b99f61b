//! 运行状态：循环阶段、RunState 与最终的 RunOutcome
//!
//! RunState 只属于一个循环实例，每轮迭代修改一次，运行结束即丢弃；
//! 调用方只看 RunOutcome，无需翻历史就能知道目标是完成、放弃还是失败。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::Goal;
use crate::memory::{HistoryStore, Turn};

/// 控制循环的三个阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Planning,
    Executing,
    Done,
}

/// 运行结束原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatedReason {
    /// 模型调用了结束动作
    ExplicitFinish,
    /// 步数用尽
    BudgetExhausted,
    /// 模型本轮没有提出任何动作
    NoActionProposed,
    /// 规划重试耗尽等不可恢复错误
    FatalError,
    Cancelled,
}

impl TerminatedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminatedReason::ExplicitFinish => "explicit_finish",
            TerminatedReason::BudgetExhausted => "budget_exhausted",
            TerminatedReason::NoActionProposed => "no_action_proposed",
            TerminatedReason::FatalError => "fatal_error",
            TerminatedReason::Cancelled => "cancelled",
        }
    }

    /// 出现后 playbook 不再继续后续目标
    pub fn halts_playbook(self) -> bool {
        matches!(self, TerminatedReason::FatalError | TerminatedReason::Cancelled)
    }
}

impl std::fmt::Display for TerminatedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 循环上限（已校验）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_steps: u32,
    pub max_turns: usize,
    pub max_output_chars: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_steps: 20,
            max_turns: 12,
            max_output_chars: 2000,
        }
    }
}

/// 单次运行的可变状态
#[derive(Debug)]
pub struct RunState {
    pub goal: Goal,
    pub history: HistoryStore,
    pub steps_taken: u32,
    pub max_steps: u32,
    pub phase: LoopPhase,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(goal: Goal, max_steps: u32) -> Self {
        Self {
            goal,
            history: HistoryStore::new(),
            steps_taken: 0,
            max_steps,
            phase: LoopPhase::Planning,
            started_at: Utc::now(),
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        self.steps_taken >= self.max_steps
    }

    /// 进入 DONE 并产出结果，消耗 RunState
    pub fn finish(
        mut self,
        reason: TerminatedReason,
        summary: Option<String>,
        error: Option<String>,
    ) -> RunOutcome {
        self.phase = LoopPhase::Done;
        RunOutcome {
            run_id: self.goal.run_id.clone(),
            final_history: self.history.into_turns(),
            summary,
            terminated_reason: reason,
            steps_taken: self.steps_taken,
            started_at: self.started_at,
            finished_at: Utc::now(),
            error,
        }
    }
}

/// 一次运行的最终结果
#[derive(Clone, Debug, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub final_history: Vec<Turn>,
    /// 仅在 explicit_finish 时存在
    pub summary: Option<String>,
    pub terminated_reason: TerminatedReason,
    pub steps_taken: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 仅在 fatal_error 时存在
    pub error: Option<String>,
}
