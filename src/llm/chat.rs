//! 对话式后端：把 Turn 历史渲染成 system / user / assistant 消息，调用 LlmClient，
//! 再从文本回复中解析出动作列表。
//!
//! 期望回复格式 `{"actions": [{"name": "...", "arguments": {...}}]}`；
//! 兼容单个 `{"tool": "...", "args": {...}}` 与顶层数组。无 JSON 的纯文本回复视为「未提出动作」。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{CapabilitySpec, LlmClient, LlmError, Message, ModelBackend, PlanRequest};
use crate::memory::{ActionCall, Turn};
use crate::tools::action_list_schema_json;

pub struct ChatBackend {
    llm: Arc<dyn LlmClient>,
}

impl ChatBackend {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}

#[async_trait]
impl ModelBackend for ChatBackend {
    async fn propose(&self, request: &PlanRequest<'_>) -> Result<Vec<ActionCall>, LlmError> {
        let messages = render_messages(request);
        let output = self.llm.complete(&messages).await?;
        let (prompt, completion, total) = self.token_usage();
        tracing::debug!(prompt, completion, total, "cumulative token usage");
        parse_llm_output(&output)
    }
}

/// 渲染完整消息列表：system（含可用动作与回复格式）+ 每条 Turn 一条消息
pub fn render_messages(request: &PlanRequest<'_>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(request.history.len() + 1);
    messages.push(Message::system(system_section(
        request.system_prompt,
        request.capabilities,
    )));
    for turn in request.history {
        messages.push(render_turn(turn));
    }
    messages
}

fn system_section(base: &str, capabilities: &[CapabilitySpec]) -> String {
    let actions = serde_json::to_string_pretty(capabilities).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{}\n\n## Available actions\n{}\n\n## Response format\n\
         Reply with one JSON object only, matching this schema:\n{}\n\
         Actions are executed in order. Use an empty list only if nothing can be done.",
        base,
        actions,
        action_list_schema_json()
    )
}

fn render_turn(turn: &Turn) -> Message {
    match turn {
        Turn::Human { text } => Message::user(format!("Goal: {}", text)),
        Turn::Plan { proposed_actions } => {
            let body = serde_json::json!({ "actions": proposed_actions });
            Message::assistant(body.to_string())
        }
        Turn::Result { results } => {
            let mut s = String::from("Observation:");
            for r in results {
                let status = if r.ok { "ok" } else { "failed" };
                s.push_str(&format!("\n- [{}] {}: {}", status, r.action_name, r.output));
            }
            Message::user(s)
        }
    }
}

/// 从模型文本中解析动作列表
pub fn parse_llm_output(output: &str) -> Result<Vec<ActionCall>, LlmError> {
    let Some(json_str) = extract_json(output.trim()) else {
        return Ok(Vec::new());
    };

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, json_str)))?;

    let items: Vec<&Value> = match &value {
        Value::Array(arr) => arr.iter().collect(),
        Value::Object(obj) => match obj.get("actions") {
            Some(Value::Array(arr)) => arr.iter().collect(),
            Some(_) => {
                return Err(LlmError::InvalidResponse(
                    "\"actions\" must be an array".to_string(),
                ))
            }
            None => vec![&value],
        },
        _ => {
            return Err(LlmError::InvalidResponse(format!(
                "expected object or array: {}",
                json_str
            )))
        }
    };

    items.into_iter().map(action_from_value).collect()
}

fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = text.find(&['{', '['][..])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn action_from_value(v: &Value) -> Result<ActionCall, LlmError> {
    let name = v
        .get("name")
        .or_else(|| v.get("tool"))
        .and_then(|n| n.as_str())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| LlmError::InvalidResponse(format!("action without name: {}", v)))?;

    let arguments = match v.get("arguments").or_else(|| v.get("args")) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        // 部分模型把参数编码成 JSON 字符串
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            _ => {
                return Err(LlmError::InvalidResponse(format!(
                    "arguments of '{}' are not an object",
                    name
                )))
            }
        },
        Some(_) => {
            return Err(LlmError::InvalidResponse(format!(
                "arguments of '{}' are not an object",
                name
            )))
        }
    };

    Ok(ActionCall {
        name: name.trim().to_string(),
        arguments,
    })
}
