//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AEGIS__*` 覆盖（双下划线表示嵌套，如 `AEGIS__AGENT__MAX_STEPS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::{AgentError, LoopLimits};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub policy: PolicySection,
}

/// [agent] 段：循环上限与上下文裁剪
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单次运行最多的 Plan/Result 步数
    pub max_steps: u32,
    /// 发给模型的历史轮数上限（含目标轮）
    pub max_turns: usize,
    /// 单条观察结果的最大字符数
    pub max_output_chars: usize,
    /// 结束动作名
    pub finish_action: String,
    /// 可选：从文件读取系统提示词
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 20,
            max_turns: 12,
            max_output_chars: 2000,
            finish_action: "finish_task".to_string(),
            system_prompt_path: None,
        }
    }
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
    pub retry: RetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: RetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次规划请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [llm.retry] 段：指数退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
        }
    }
}

/// [tools] 段：工具超时与浏览器后端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次能力调用超时（秒）
    pub tool_timeout_secs: u64,
    pub browser: BrowserSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            browser: BrowserSection::default(),
        }
    }
}

/// [tools.browser] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// noop（dry-run）/ chrome（需 feature "browser"）
    pub backend: String,
    pub headless: bool,
    pub max_result_chars: usize,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            backend: "noop".to_string(),
            headless: true,
            max_result_chars: 8000,
        }
    }
}

/// [policy] 段：两项都为空时不挂策略
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PolicySection {
    /// navigate 允许访问的域名（子域名同样放行）
    pub allowed_domains: Vec<String>,
    /// 一律拒绝的动作名
    pub denied_actions: Vec<String>,
}

impl AppConfig {
    /// 校验并取出循环上限；非法值在启动时直接报错
    pub fn loop_limits(&self) -> Result<LoopLimits, AgentError> {
        let agent = &self.agent;
        if agent.max_steps < 1 {
            return Err(AgentError::ConfigError("agent.max_steps must be >= 1".into()));
        }
        if agent.max_turns < 1 {
            return Err(AgentError::ConfigError("agent.max_turns must be >= 1".into()));
        }
        if agent.max_output_chars < 1 {
            return Err(AgentError::ConfigError(
                "agent.max_output_chars must be >= 1".into(),
            ));
        }
        if self.llm.timeouts.request < 1 {
            return Err(AgentError::ConfigError(
                "llm.timeouts.request must be >= 1".into(),
            ));
        }
        if self.tools.tool_timeout_secs < 1 {
            return Err(AgentError::ConfigError(
                "tools.tool_timeout_secs must be >= 1".into(),
            ));
        }
        if agent.finish_action.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "agent.finish_action must not be empty".into(),
            ));
        }
        Ok(LoopLimits {
            max_steps: agent.max_steps,
            max_turns: agent.max_turns,
            max_output_chars: agent.max_output_chars,
        })
    }

    /// 系统提示词：配置了文件则读文件，否则 None（用 Planner 内置提示词）
    pub fn system_prompt(&self) -> Result<Option<String>, AgentError> {
        match &self.agent.system_prompt_path {
            Some(path) => std::fs::read_to_string(path)
                .map(Some)
                .map_err(|e| AgentError::ConfigError(format!("{}: {}", path.display(), e))),
            None => Ok(None),
        }
    }
}

/// 从 config 目录加载配置，环境变量 AEGIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键；文件不存在时报错）
/// 3. 最后叠加环境变量 AEGIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AEGIS")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
