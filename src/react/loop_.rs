//! 控制循环
//!
//! PLANNING -> (继续? -> EXECUTING -> PLANNING) -> DONE，受最大步数约束。
//! 每轮：历史 -> 裁剪视图 -> Planner -> 提出的动作 -> Executor（按顺序） -> 写回历史。
//! 取消信号在 PLANNING 开头检查；规划中途取消立即结束，执行中途取消则等当前动作完成再结束。
//! 可选 event_tx：向前端推送 StepUpdate / Planning / Proposed / ActionStarted / ActionFinished / Finished。

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, Goal, LoopPhase, RunOutcome, RunState, TerminatedReason};
use crate::llm::CapabilitySpec;
use crate::memory::{ActionCall, ContextTrimmer, Turn};
use crate::react::events::preview;
use crate::react::{Planner, RunEvent};
use crate::tools::{finish_capability_spec, Executor, FinishTaskArgs};

pub const DEFAULT_FINISH_ACTION: &str = "finish_task";

/// 单次运行的协作者
pub struct RunSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a Executor,
    pub trimmer: ContextTrimmer,
    /// 结束动作名
    pub finish_action: String,
    pub cancel_token: CancellationToken,
    pub event_tx: Option<&'a mpsc::UnboundedSender<RunEvent>>,
}

impl<'a> RunSession<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a Executor,
        trimmer: ContextTrimmer,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            planner,
            executor,
            trimmer,
            finish_action: DEFAULT_FINISH_ACTION.to_string(),
            cancel_token,
            event_tx: None,
        }
    }

    pub fn with_finish_action(mut self, name: impl Into<String>) -> Self {
        self.finish_action = name.into();
        self
    }

    pub fn with_event_tx(mut self, tx: &'a mpsc::UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send(&self, ev: RunEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

/// 执行一次运行，总是返回 RunOutcome
pub async fn run_loop(session: &RunSession<'_>, goal: Goal, max_steps: u32) -> RunOutcome {
    let run_id = goal.run_id.clone();
    tracing::info!(run_id = %run_id, max_steps, instruction = %goal.instruction, "run started");

    let mut state = RunState::new(goal, max_steps);
    let (reason, summary, error) = match drive(session, &mut state).await {
        Ok((reason, summary)) => (reason, summary, None),
        Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, "run failed");
            session.send(RunEvent::Error {
                run_id: run_id.clone(),
                text: e.to_string(),
            });
            (TerminatedReason::FatalError, None, Some(e.to_string()))
        }
    };

    tracing::info!(
        run_id = %run_id,
        reason = %reason,
        steps = state.steps_taken,
        turns = state.history.len(),
        "run finished"
    );
    session.send(RunEvent::Finished {
        run_id,
        reason,
        summary: summary.clone(),
    });
    state.finish(reason, summary, error)
}

async fn drive(
    session: &RunSession<'_>,
    state: &mut RunState,
) -> Result<(TerminatedReason, Option<String>), AgentError> {
    let run_id = state.goal.run_id.clone();
    state.history.append(Turn::human(state.goal.instruction.clone()))?;

    let mut capabilities: Vec<CapabilitySpec> = session.executor.registry().specs();
    capabilities.push(finish_capability_spec(&session.finish_action));

    loop {
        state.phase = LoopPhase::Planning;
        if session.cancel_token.is_cancelled() {
            return Ok((TerminatedReason::Cancelled, None));
        }

        session.send(RunEvent::StepUpdate {
            run_id: run_id.clone(),
            step: state.steps_taken + 1,
            max_steps: state.max_steps,
        });
        session.send(RunEvent::Planning {
            run_id: run_id.clone(),
        });

        let view = session.trimmer.trim(state.history.all());
        let planned = tokio::select! {
            biased;
            _ = session.cancel_token.cancelled() => {
                tracing::info!(run_id = %run_id, "cancelled while planning");
                return Ok((TerminatedReason::Cancelled, None));
            }
            r = session.planner.plan(&view, &capabilities) => r,
        };
        state.steps_taken += 1;
        let actions = planned?;

        if actions.is_empty() {
            tracing::warn!(run_id = %run_id, step = state.steps_taken, "planner proposed no action");
            return Ok((TerminatedReason::NoActionProposed, None));
        }

        if let Some(finish) = actions.iter().find(|a| a.name == session.finish_action) {
            let summary = finish_summary(finish);
            state.history.append(Turn::plan(vec![finish.clone()]))?;
            return Ok((TerminatedReason::ExplicitFinish, summary));
        }

        tracing::info!(
            run_id = %run_id,
            step = state.steps_taken,
            actions = ?actions.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            "plan"
        );
        session.send(RunEvent::Proposed {
            run_id: run_id.clone(),
            actions: actions.clone(),
        });
        state.history.append(Turn::plan(actions.clone()))?;

        state.phase = LoopPhase::Executing;
        let mut results = Vec::with_capacity(actions.len());
        let mut interrupted = false;
        for action in &actions {
            if session.cancel_token.is_cancelled() {
                interrupted = true;
                break;
            }
            session.send(RunEvent::ActionStarted {
                run_id: run_id.clone(),
                action: action.name.clone(),
                args: action.arguments_value(),
            });
            let result = session.executor.execute(action).await;
            session.send(RunEvent::ActionFinished {
                run_id: run_id.clone(),
                action: result.action_name.clone(),
                ok: result.ok,
                preview: preview(&result.output),
            });
            results.push(result);
        }
        state.history.append(Turn::result(results))?;

        if interrupted {
            tracing::info!(run_id = %run_id, "cancelled while executing");
            return Ok((TerminatedReason::Cancelled, None));
        }
        if state.budget_exhausted() {
            return Ok((TerminatedReason::BudgetExhausted, None));
        }
    }
}

/// 结束动作的 summary 参数；缺失时为 None
fn finish_summary(call: &ActionCall) -> Option<String> {
    serde_json::from_value::<FinishTaskArgs>(call.arguments_value())
        .ok()
        .map(|args| args.summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_summary() {
        let call = ActionCall::new("finish_task").with_arg("summary", "done");
        assert_eq!(finish_summary(&call).as_deref(), Some("done"));
        assert_eq!(finish_summary(&ActionCall::new("finish_task")), None);
    }
}
