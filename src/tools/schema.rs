//! 动作 JSON Schema 生成（schemars）
//!
//! - 回复格式 schema 拼入 system prompt，减少模型输出格式错误；
//! - 结束动作（finish_task）的参数 schema 与注册表能力一起暴露给模型。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::llm::CapabilitySpec;

/// 回复格式：`{"actions": [{"name": "...", "arguments": {...}}]}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionListFormat {
    /// 按顺序执行的动作；目标完成时只放一个结束动作
    pub actions: Vec<ActionCallFormat>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionCallFormat {
    /// 动作名，必须是 Available actions 中的一个
    pub name: String,
    /// 动作参数，依动作不同而不同（url、selector、text 等）
    pub arguments: Map<String, Value>,
}

/// 结束动作参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FinishTaskArgs {
    /// 对任务结果的简短总结
    pub summary: String,
}

pub fn action_list_schema_json() -> String {
    let schema = schema_for!(ActionListFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 结束动作的描述（名称可配置，默认 finish_task）
pub fn finish_capability_spec(name: &str) -> CapabilitySpec {
    let schema = schema_for!(FinishTaskArgs);
    CapabilitySpec {
        name: name.to_string(),
        description: "Call this with a summary when the user's goal has been fully accomplished."
            .to_string(),
        parameters: serde_json::to_value(schema).unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_list_schema_mentions_fields() {
        let s = action_list_schema_json();
        assert!(s.contains("actions"));
        assert!(s.contains("arguments"));
    }

    #[test]
    fn test_finish_spec_requires_summary() {
        let spec = finish_capability_spec("finish_task");
        assert_eq!(spec.name, "finish_task");
        let required = spec.parameters["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "summary"));
    }
}
