//! 编排器：持有注册表、Planner、Executor 与循环上限，对外提供 `start_run`
//!
//! 注册表在启动时构建、之后只读，可在并发运行之间共享；每次运行各自拥有 RunState 与历史。

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, Goal, LoopLimits, Playbook, RunOutcome};
use crate::memory::ContextTrimmer;
use crate::react::{run_loop, Planner, RunEvent, RunSession, DEFAULT_FINISH_ACTION};
use crate::tools::{CapabilityRegistry, Executor};

pub struct Orchestrator {
    planner: Planner,
    executor: Executor,
    limits: LoopLimits,
    trimmer: ContextTrimmer,
    finish_action: String,
    event_tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Orchestrator {
    pub fn new(planner: Planner, executor: Executor, limits: LoopLimits) -> Result<Self, AgentError> {
        if limits.max_steps < 1 {
            return Err(AgentError::ConfigError("max_steps must be >= 1".into()));
        }
        let trimmer = ContextTrimmer::new(limits.max_turns, limits.max_output_chars)?;
        Ok(Self {
            planner,
            executor,
            limits,
            trimmer,
            finish_action: DEFAULT_FINISH_ACTION.to_string(),
            event_tx: None,
        })
    }

    pub fn with_finish_action(mut self, name: impl Into<String>) -> Self {
        self.finish_action = name.into();
        self
    }

    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        self.executor.registry()
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// 以配置的 max_steps 执行一次运行
    pub async fn start_run(&self, goal: Goal, cancel: CancellationToken) -> RunOutcome {
        self.run_with(&self.planner, goal, self.limits.max_steps, cancel)
            .await
    }

    /// 指定本次运行的最大步数；0 直接报错，不发起任何调用
    pub async fn start_run_with_steps(
        &self,
        goal: Goal,
        max_steps: u32,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        if max_steps < 1 {
            return Err(AgentError::ConfigError(format!(
                "max_steps must be >= 1, got {}",
                max_steps
            )));
        }
        Ok(self.run_with(&self.planner, goal, max_steps, cancel).await)
    }

    async fn run_with(
        &self,
        planner: &Planner,
        goal: Goal,
        max_steps: u32,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let mut session = RunSession::new(planner, &self.executor, self.trimmer, cancel)
            .with_finish_action(self.finish_action.clone());
        if let Some(tx) = &self.event_tx {
            session = session.with_event_tx(tx);
        }
        run_loop(&session, goal, max_steps).await
    }

    /// 按顺序执行 playbook 的目标；遇到 fatal_error 或 cancelled 即停止
    pub async fn run_playbook(&self, playbook: &Playbook, cancel: CancellationToken) -> Vec<RunOutcome> {
        let planner = match &playbook.persona {
            Some(persona) => self.planner.clone().with_system_prompt(persona.clone()),
            None => self.planner.clone(),
        };

        tracing::info!(playbook = %playbook.name, goals = playbook.goals.len(), "playbook started");
        let mut outcomes = Vec::with_capacity(playbook.goals.len());
        for goal in &playbook.goals {
            let outcome = self
                .run_with(&planner, goal.clone(), self.limits.max_steps, cancel.child_token())
                .await;
            let halt = outcome.terminated_reason.halts_playbook();
            outcomes.push(outcome);
            if halt {
                tracing::warn!(playbook = %playbook.name, "playbook halted");
                break;
            }
        }
        outcomes
    }

    /// 并发执行多个目标，共享只读注册表，各自拥有历史；结果顺序与输入一致
    pub async fn run_many(&self, goals: Vec<Goal>, cancel: CancellationToken) -> Vec<RunOutcome> {
        let runs = goals
            .into_iter()
            .map(|goal| self.start_run(goal, cancel.child_token()));
        join_all(runs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TerminatedReason;
    use crate::llm::{LlmError, ScriptedBackend};
    use crate::memory::ActionCall;

    fn orchestrator(backend: ScriptedBackend, limits: LoopLimits) -> Orchestrator {
        let registry = Arc::new(CapabilityRegistry::new());
        Orchestrator::new(
            Planner::new(Arc::new(backend)),
            Executor::new(registry, 5),
            limits,
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let limits = LoopLimits {
            max_turns: 0,
            ..LoopLimits::default()
        };
        let registry = Arc::new(CapabilityRegistry::new());
        let result = Orchestrator::new(
            Planner::new(Arc::new(ScriptedBackend::default())),
            Executor::new(registry, 5),
            limits,
        );
        assert!(matches!(result, Err(AgentError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_playbook_stops_on_cancel() {
        let backend = ScriptedBackend::repeating(vec![
            ActionCall::new("finish_task").with_arg("summary", "ok"),
        ]);
        let orch = orchestrator(backend, LoopLimits::default());
        let playbook = Playbook {
            name: "pb".into(),
            description: String::new(),
            persona: Some("You are terse.".into()),
            goals: vec![Goal::new("a", "first"), Goal::new("b", "second")],
        };

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcomes = orch.run_playbook(&playbook, cancel).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].terminated_reason, TerminatedReason::Cancelled);
    }

    #[tokio::test]
    async fn test_zero_step_budget_rejected() {
        let backend = Arc::new(ScriptedBackend::repeating(vec![ActionCall::new("click")]));
        let registry = Arc::new(CapabilityRegistry::new());
        let orch = Orchestrator::new(
            Planner::new(backend.clone()),
            Executor::new(registry, 5),
            LoopLimits::default(),
        )
        .unwrap();

        let result = orch
            .start_run_with_steps(Goal::new("x", "click"), 0, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AgentError::ConfigError(_))));
        assert_eq!(backend.calls(), 0);

        let outcome = orch
            .start_run_with_steps(Goal::new("x", "click"), 2, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.terminated_reason, TerminatedReason::BudgetExhausted);
        assert_eq!(outcome.steps_taken, 2);
    }

    #[tokio::test]
    async fn test_playbook_stops_on_fatal_error() {
        let backend = ScriptedBackend::with_results(vec![Err(LlmError::Auth("bad key".into()))])
            .with_fallback(vec![ActionCall::new("finish_task").with_arg("summary", "ok")]);
        let orch = orchestrator(backend, LoopLimits::default());
        let playbook = Playbook {
            name: "pb".into(),
            description: String::new(),
            persona: None,
            goals: vec![Goal::new("a", "first"), Goal::new("b", "second")],
        };

        let outcomes = orch.run_playbook(&playbook, CancellationToken::new()).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].terminated_reason, TerminatedReason::FatalError);
        assert!(outcomes[0].error.as_deref().unwrap_or("").contains("bad key"));
    }

    #[tokio::test]
    async fn test_playbook_runs_all_goals() {
        let backend = ScriptedBackend::repeating(vec![
            ActionCall::new("finish_task").with_arg("summary", "ok"),
        ]);
        let orch = orchestrator(backend, LoopLimits::default());
        let playbook = Playbook {
            name: "pb".into(),
            description: String::new(),
            persona: None,
            goals: vec![Goal::new("a", "first"), Goal::new("b", "second")],
        };
        let outcomes = orch.run_playbook(&playbook, CancellationToken::new()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| o.terminated_reason == TerminatedReason::ExplicitFinish));
    }
}
