//! 编排器构建器：从 AppConfig 组装模型后端、能力提供方、策略与 Executor
//!
//! 额外的提供方在默认浏览器之后注册，同名动作后注册者生效。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator};
use crate::llm::{ChatBackend, LlmClient, MockLlmClient, ModelBackend, OpenAiClient};
use crate::react::{Planner, RetryConfig};
use crate::tools::{policy_from_config, CapabilityProvider, CapabilityRegistry, DryRunBrowser, Executor};

/// 根据配置与环境变量选择文本 LLM（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok();
    let finish = cfg.agent.finish_action.clone();

    match (provider.as_str(), api_key) {
        ("openai", Some(key)) => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
            ))
        }
        ("openai", None) => {
            tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
            Arc::new(MockLlmClient::new(finish))
        }
        ("mock", _) => Arc::new(MockLlmClient::new(finish)),
        (other, _) => {
            tracing::warn!("Unknown llm provider '{}', using Mock LLM", other);
            Arc::new(MockLlmClient::new(finish))
        }
    }
}

fn browser_provider(cfg: &AppConfig) -> Result<Arc<dyn CapabilityProvider>, AgentError> {
    let browser = &cfg.tools.browser;
    match browser.backend.to_lowercase().as_str() {
        "noop" | "dry-run" => Ok(Arc::new(DryRunBrowser::new())),
        #[cfg(feature = "browser")]
        "chrome" => Ok(Arc::new(crate::tools::ChromeBrowser::new(
            browser.headless,
            browser.max_result_chars,
        ))),
        #[cfg(not(feature = "browser"))]
        "chrome" => Err(AgentError::ConfigError(
            "tools.browser.backend = \"chrome\" requires the 'browser' feature".into(),
        )),
        other => Err(AgentError::ConfigError(format!(
            "unknown tools.browser.backend '{}'",
            other
        ))),
    }
}

pub struct OrchestratorBuilder {
    config: AppConfig,
    system_prompt: Option<String>,
    backend: Option<Arc<dyn ModelBackend>>,
    providers: Vec<Arc<dyn CapabilityProvider>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            system_prompt: None,
            backend: None,
            providers: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// 替换默认的对话式后端（测试中注入脚本化后端）
    pub fn with_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn CapabilityProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> Result<Orchestrator, AgentError> {
        let cfg = &self.config;
        let limits = cfg.loop_limits()?;
        let retry = RetryConfig::from_section(&cfg.llm.retry)?;

        let backend = match self.backend {
            Some(b) => b,
            None => Arc::new(ChatBackend::new(create_llm_from_config(cfg))),
        };
        let system_prompt = match self.system_prompt {
            Some(p) => Some(p),
            None => cfg.system_prompt()?,
        };
        let mut planner = Planner::new(backend)
            .with_retry(retry)
            .with_request_timeout(Duration::from_secs(cfg.llm.timeouts.request));
        if let Some(prompt) = system_prompt {
            planner = planner.with_system_prompt(prompt);
        }

        let mut registry = CapabilityRegistry::new();
        registry.register_provider(browser_provider(cfg)?.as_ref());
        for provider in &self.providers {
            registry.register_provider(provider.as_ref());
        }
        tracing::info!(capabilities = registry.len(), "capability registry ready");

        let mut executor = Executor::new(Arc::new(registry), cfg.tools.tool_timeout_secs);
        if let Some(policy) = policy_from_config(&cfg.policy) {
            executor = executor.with_policy(policy);
        }

        Ok(Orchestrator::new(planner, executor, limits)?
            .with_finish_action(cfg.agent.finish_action.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Goal, TerminatedReason};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_build_from_defaults() {
        let orch = OrchestratorBuilder::new(AppConfig::default()).build().unwrap();
        assert!(orch.registry().resolve("navigate").is_ok());
        assert_eq!(orch.limits().max_steps, 20);
    }

    #[tokio::test]
    async fn test_mock_provider_honours_finish_action() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        cfg.agent.finish_action = "done".into();
        cfg.agent.max_steps = 3;
        let orch = OrchestratorBuilder::new(cfg).build().unwrap();

        let outcome = orch
            .start_run(Goal::new("x", "open docs"), CancellationToken::new())
            .await;
        assert_eq!(outcome.terminated_reason, TerminatedReason::ExplicitFinish);
        assert_eq!(outcome.steps_taken, 1);
        assert_eq!(outcome.summary.as_deref(), Some("Mock run for Goal: open docs"));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut cfg = AppConfig::default();
        cfg.llm.timeouts.request = 0;
        assert!(matches!(
            OrchestratorBuilder::new(cfg).build(),
            Err(AgentError::ConfigError(_))
        ));

        let mut cfg = AppConfig::default();
        cfg.tools.tool_timeout_secs = 0;
        assert!(OrchestratorBuilder::new(cfg).build().is_err());
    }

    #[test]
    fn test_unknown_browser_backend_rejected() {
        let mut cfg = AppConfig::default();
        cfg.tools.browser.backend = "netscape".into();
        assert!(matches!(
            OrchestratorBuilder::new(cfg).build(),
            Err(AgentError::ConfigError(_))
        ));
    }

    #[test]
    fn test_persona_prompt_applied() {
        let orch = OrchestratorBuilder::new(AppConfig::default())
            .with_system_prompt("You are terse.")
            .build()
            .unwrap();
        assert_eq!(orch.planner().system_prompt(), "You are terse.");
    }
}
