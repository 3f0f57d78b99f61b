//! 运行过程事件：用于前端实时展示规划、动作与结果

use serde::Serialize;

use crate::core::TerminatedReason;
use crate::memory::ActionCall;

/// Observation 预览最大字符数
pub const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 步数更新（当前第几步）
    StepUpdate {
        run_id: String,
        step: u32,
        max_steps: u32,
    },
    /// 正在调用模型规划
    Planning { run_id: String },
    /// 本轮提出的动作
    Proposed {
        run_id: String,
        actions: Vec<ActionCall>,
    },
    ActionStarted {
        run_id: String,
        action: String,
        args: serde_json::Value,
    },
    /// 动作结果（预览，避免过长）
    ActionFinished {
        run_id: String,
        action: String,
        ok: bool,
        preview: String,
    },
    Finished {
        run_id: String,
        reason: TerminatedReason,
        summary: Option<String>,
    },
    Error { run_id: String, text: String },
}

pub(crate) fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        let head: String = text.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagged_json() {
        let ev = RunEvent::Finished {
            run_id: "r1".into(),
            reason: TerminatedReason::ExplicitFinish,
            summary: Some("done".into()),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "finished");
        assert_eq!(json["reason"], "explicit_finish");
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(500);
        assert_eq!(preview(&long).chars().count(), OBSERVATION_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
