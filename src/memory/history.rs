//! 运行历史：Turn / ActionCall / ActionResult 与只追加的 HistoryStore
//!
//! HistoryStore 是每次规划调用时交给模型的唯一事实来源；只提供 append，不提供删除。
//! 裁剪（见 trimmer）永远作用于快照视图，不修改这里的规范历史。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 模型提出的一次动作调用：`{name, arguments}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ActionCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    /// 追加一个参数（构造测试脚本和 mock 时使用）
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// 读取字符串参数
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    /// 参数作为 JSON 对象（交给 Capability::invoke）
    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }
}

/// 单个动作的执行结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_name: String,
    pub output: String,
    pub ok: bool,
}

impl ActionResult {
    pub fn success(action_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
            output: output.into(),
            ok: true,
        }
    }

    pub fn failure(action_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
            output: output.into(),
            ok: false,
        }
    }
}

/// 历史中的一条记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// 原始目标，永远是第 0 条
    Human { text: String },
    /// 一次模型回复中提出的动作（按提出顺序）
    Plan { proposed_actions: Vec<ActionCall> },
    /// 上一个 Plan 中被执行动作的结果（一一对应）
    Result { results: Vec<ActionResult> },
}

impl Turn {
    pub fn human(text: impl Into<String>) -> Self {
        Turn::Human { text: text.into() }
    }

    pub fn plan(proposed_actions: Vec<ActionCall>) -> Self {
        Turn::Plan { proposed_actions }
    }

    pub fn result(results: Vec<ActionResult>) -> Self {
        Turn::Result { results }
    }

    pub fn kind(&self) -> TurnKind {
        match self {
            Turn::Human { .. } => TurnKind::Human,
            Turn::Plan { .. } => TurnKind::Plan,
            Turn::Result { .. } => TurnKind::Result,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Human,
    Plan,
    Result,
}

/// 只追加的历史：Human -> Plan -> Result -> Plan -> Result -> …
///
/// append 时校验交替顺序，违反时返回 [`AgentError::HistoryOrder`]，不写入。
#[derive(Clone, Debug, Default)]
pub struct HistoryStore {
    turns: Vec<Turn>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) -> Result<(), AgentError> {
        let prev = self.last().map(Turn::kind);
        let next = turn.kind();
        let valid = matches!(
            (prev, next),
            (None, TurnKind::Human)
                | (Some(TurnKind::Human), TurnKind::Plan)
                | (Some(TurnKind::Result), TurnKind::Plan)
                | (Some(TurnKind::Plan), TurnKind::Result)
        );
        if !valid {
            return Err(AgentError::HistoryOrder(format!(
                "cannot append {:?} after {:?}",
                next, prev
            )));
        }
        self.turns.push(turn);
        Ok(())
    }

    /// 只读快照
    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    /// 目标（HumanTurn），供 Trimmer 固定
    pub fn first(&self) -> Option<&Turn> {
        self.turns.first()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 结束运行时交出所有权（RunOutcome.final_history）
    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_alternation() {
        let mut h = HistoryStore::new();
        h.append(Turn::human("click Save")).unwrap();
        h.append(Turn::plan(vec![ActionCall::new("click")])).unwrap();
        h.append(Turn::result(vec![ActionResult::success("click", "ok")]))
            .unwrap();
        h.append(Turn::plan(vec![ActionCall::new("finish_task")]))
            .unwrap();
        assert_eq!(h.len(), 4);
        assert!(matches!(h.first(), Some(Turn::Human { .. })));
    }

    #[test]
    fn test_rejects_consecutive_plans() {
        let mut h = HistoryStore::new();
        h.append(Turn::human("goal")).unwrap();
        h.append(Turn::plan(vec![])).unwrap();
        let err = h.append(Turn::plan(vec![])).unwrap_err();
        assert!(matches!(err, AgentError::HistoryOrder(_)));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn test_first_turn_must_be_human() {
        let mut h = HistoryStore::new();
        assert!(h.append(Turn::result(vec![])).is_err());
        assert!(h.is_empty());
        h.append(Turn::human("goal")).unwrap();
        assert!(h.append(Turn::human("again")).is_err());
    }

    #[test]
    fn test_action_call_json_shape() {
        let call: ActionCall =
            serde_json::from_str(r##"{"name": "click", "arguments": {"selector": "#save"}}"##)
                .unwrap();
        assert_eq!(call.str_arg("selector"), Some("#save"));
        let bare: ActionCall = serde_json::from_str(r#"{"name": "scroll"}"#).unwrap();
        assert!(bare.arguments.is_empty());
    }
}
