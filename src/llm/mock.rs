//! Mock 后端（测试与 dry-run 用，无需 API）
//!
//! - [`MockLlmClient`]：文本客户端，直接以配置的结束动作结束，summary 回显目标；
//! - [`ScriptedBackend`]：按脚本依次返回动作列表或错误，脚本耗尽后返回 fallback。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, ModelBackend, PlanRequest, Role};
use crate::memory::ActionCall;

/// Mock 客户端：取第一条 User 消息（目标），回复结束动作
#[derive(Debug, Clone)]
pub struct MockLlmClient {
    finish_action: String,
}

impl MockLlmClient {
    pub fn new(finish_action: impl Into<String>) -> Self {
        Self {
            finish_action: finish_action.into(),
        }
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new("finish_task")
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let goal = messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no goal)");
        let reply = serde_json::json!({
            "actions": [{
                "name": self.finish_action,
                "arguments": { "summary": format!("Mock run for {}", goal) }
            }]
        });
        Ok(reply.to_string())
    }
}

/// 脚本化后端：每次 propose 弹出一条脚本；耗尽后返回 fallback（默认空列表）
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<Vec<ActionCall>, LlmError>>>,
    fallback: Vec<ActionCall>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<ActionCall>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// 允许在脚本中混入错误（测试重试）
    pub fn with_results(script: Vec<Result<Vec<ActionCall>, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// 始终提出同一组动作
    pub fn repeating(actions: Vec<ActionCall>) -> Self {
        Self {
            fallback: actions,
            ..Self::default()
        }
    }

    pub fn with_fallback(mut self, actions: Vec<ActionCall>) -> Self {
        self.fallback = actions;
        self
    }

    /// 已被调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn propose(&self, _request: &PlanRequest<'_>) -> Result<Vec<ActionCall>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::parse_llm_output;

    #[tokio::test]
    async fn test_mock_client_finishes() {
        let out = MockLlmClient::default()
            .complete(&[Message::system("sys"), Message::user("Goal: open docs")])
            .await
            .unwrap();
        let actions = parse_llm_output(&out).unwrap();
        assert_eq!(actions[0].name, "finish_task");
        assert_eq!(actions[0].str_arg("summary"), Some("Mock run for Goal: open docs"));
    }

    #[tokio::test]
    async fn test_mock_client_uses_configured_finish_action() {
        let out = MockLlmClient::new("done")
            .complete(&[Message::user("Goal: x")])
            .await
            .unwrap();
        assert_eq!(parse_llm_output(&out).unwrap()[0].name, "done");
    }

    #[tokio::test]
    async fn test_scripted_backend_order_then_fallback() {
        let backend = ScriptedBackend::new(vec![vec![ActionCall::new("a")]])
            .with_fallback(vec![ActionCall::new("b")]);
        let request = PlanRequest {
            system_prompt: "",
            history: &[],
            capabilities: &[],
        };
        assert_eq!(backend.propose(&request).await.unwrap()[0].name, "a");
        assert_eq!(backend.propose(&request).await.unwrap()[0].name, "b");
        assert_eq!(backend.calls(), 2);
    }
}
