//! Aegis - 目标驱动的自主执行循环
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、目标 / playbook、运行状态、会话监管、编排器
//! - **llm**: 模型后端抽象与实现（OpenAI 兼容 / 对话式 JSON 协议 / Mock / 脚本化）
//! - **memory**: 运行历史与上下文裁剪
//! - **observability**: 日志初始化
//! - **react**: Planner（重试 + 超时）、控制循环、运行事件
//! - **tools**: 能力注册表、执行器、策略钩子、浏览器能力

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
