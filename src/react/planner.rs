//! Planner：包装一个模型后端，给出下一步动作
//!
//! 每次 plan 一次网络调用，带请求超时；可重试错误按指数退避重试（base * 2^n，封顶 max_delay），
//! 次数耗尽或遇到不可重试错误时返回 `AgentError::PlannerExhausted`，由循环以 fatal_error 结束。
//! 结束动作（finish_task）不在这里解释，原样作为普通 ActionCall 交给循环。

use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrySection;
use crate::core::AgentError;
use crate::llm::{CapabilitySpec, LlmError, ModelBackend, PlanRequest};
use crate::memory::{ActionCall, Turn};

const DEFAULT_SYSTEM_PROMPT: &str = "You are Aegis, an automation agent. Based on the user's goal and the \
observations so far, decide the next action(s) to take. When the goal is complete, call the finish action \
with a summary.";

/// 重试参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn from_section(section: &RetrySection) -> Result<Self, AgentError> {
        if section.max_attempts < 1 {
            return Err(AgentError::ConfigError(
                "llm.retry.max_attempts must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            max_attempts: section.max_attempts,
            base_delay: Duration::from_millis(section.base_delay_ms),
            max_delay: Duration::from_millis(section.max_delay_ms),
        })
    }

    /// 第 `retries_used` 次重试前的等待
    pub fn delay_for(&self, retries_used: u32) -> Duration {
        let base_ms = self.base_delay.as_millis();
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let max_ms = self.max_delay.as_millis().max(base_ms);
        let multiplier = 1u128 << retries_used.min(20);
        let ms = base_ms.saturating_mul(multiplier).min(max_ms);
        Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
    }
}

#[derive(Clone)]
pub struct Planner {
    backend: Arc<dyn ModelBackend>,
    system_prompt: String,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl Planner {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub async fn plan(
        &self,
        history: &[Turn],
        capabilities: &[CapabilitySpec],
    ) -> Result<Vec<ActionCall>, AgentError> {
        let request = PlanRequest {
            system_prompt: &self.system_prompt,
            history,
            capabilities,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(self.request_timeout, self.backend.propose(&request)).await {
                Ok(Ok(actions)) => return Ok(actions),
                Ok(Err(e)) => e,
                Err(_) => LlmError::Timeout(self.request_timeout.as_secs()),
            };

            if !err.is_transient() || attempt >= self.retry.max_attempts {
                tracing::error!(attempt, error = %err, "planner giving up");
                return Err(AgentError::PlannerExhausted {
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = match &err {
                LlmError::RateLimited { retry_after_ms } if *retry_after_ms > 0 => {
                    Duration::from_millis(*retry_after_ms).min(self.retry.max_delay)
                }
                _ => self.retry.delay_for(attempt - 1),
            };
            tracing::warn!(
                attempt,
                max_attempts = self.retry.max_attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "planner call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
