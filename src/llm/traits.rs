//! 模型后端抽象
//!
//! - [`LlmClient`]：文本补全（OpenAI 兼容 / Mock），只认识 system / user / assistant 消息；
//! - [`ModelBackend`]：核心循环看到的接口，`propose(裁剪后的历史) -> Vec<ActionCall>`。
//!
//! 具体用哪家模型、什么线协议，都藏在 ModelBackend 之后，核心不感知。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::memory::{ActionCall, Turn};

/// 后端错误；`is_transient` 决定 Planner 是否重试
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Rate limited (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    ApiError(String),

    /// 返回内容无法解析为动作（重新采样可能修复）
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout(_)
                | LlmError::RateLimited { .. }
                | LlmError::Network(_)
                | LlmError::ApiError(_)
                | LlmError::InvalidResponse(_)
        )
    }

    /// 按错误文本粗分类（async-openai 的错误只暴露为字符串时使用）
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("401") || lower.contains("invalid api key") || lower.contains("unauthorized") {
            LlmError::Auth(message)
        } else if lower.contains("429") || lower.contains("rate limit") {
            LlmError::RateLimited { retry_after_ms: 0 }
        } else if lower.contains("connect") || lower.contains("dns") || lower.contains("reset") {
            LlmError::Network(message)
        } else {
            LlmError::ApiError(message)
        }
    }
}

/// 单条对话消息（渲染给文本模型）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 文本补全客户端
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 累计 token 使用：(prompt, completion, total)，默认 (0, 0, 0)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 可调用动作的描述（名称、说明、参数 schema），暴露给模型
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 一次规划请求
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub system_prompt: &'a str,
    /// 已裁剪的历史视图（第 0 条为目标）
    pub history: &'a [Turn],
    /// 注册表中的全部动作 + 结束动作
    pub capabilities: &'a [CapabilitySpec],
}

/// 核心循环消费的模型后端：给出下一步动作（可能为空）
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn propose(&self, request: &PlanRequest<'_>) -> Result<Vec<ActionCall>, LlmError>;
}
