//! LLM 层：模型后端抽象与实现（OpenAI 兼容 / 对话式 JSON 协议 / Mock / 脚本化）

pub mod chat;
pub mod mock;
pub mod openai;
pub mod traits;

pub use chat::{parse_llm_output, render_messages, ChatBackend};
pub use mock::{MockLlmClient, ScriptedBackend};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{
    CapabilitySpec, LlmClient, LlmError, Message, ModelBackend, PlanRequest, Role,
};
