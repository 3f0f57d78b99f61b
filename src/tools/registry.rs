//! 能力注册表
//!
//! 所有可调用动作实现 Capability trait（name / description / parameters_schema / invoke），
//! 各适配器在启动时整体注册；同名后注册者覆盖先注册者（记录 warn），注册完成后只读、可跨运行共享。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::llm::CapabilitySpec;

/// 可调用能力：名称（动作名）、描述（供模型理解）、参数 schema、异步调用（args 为 JSON）
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, String>;
}

/// 能力提供方（浏览器、OS 脚本、视觉等适配器）：一次交出自己全部的能力
pub trait CapabilityProvider {
    fn provider_name(&self) -> &str;

    fn capabilities(&self) -> Vec<Arc<dyn Capability>>;
}

type InvokeFn = dyn Fn(Value) -> BoxFuture<'static, Result<String, String>> + Send + Sync;

/// 以闭包绑定的能力（名称 -> 函数），无需为每个动作单独定义类型
pub struct FnCapability {
    name: String,
    description: String,
    schema: Value,
    invoke: Box<InvokeFn>,
}

impl FnCapability {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            schema: serde_json::json!({ "type": "object", "properties": {}, "required": [] }),
            invoke: Box::new(move |args| Box::pin(f(args))),
        }
    }

    /// 同步闭包版本
    pub fn sync<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Result<String, String> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(name, move |args| {
            let f = Arc::clone(&f);
            async move { f(&args) }
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl Capability for FnCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn invoke(&self, args: Value) -> Result<String, String> {
        (self.invoke)(args).await
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Capability not found: {0}")]
pub struct CapabilityNotFound(pub String);

/// 扁平命名空间：按注册顺序保存，名称索引到位置
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: Vec<Arc<dyn Capability>>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一批能力；同名覆盖（保留原顺序位置）
    pub fn register(&mut self, capabilities: Vec<Arc<dyn Capability>>) {
        for cap in capabilities {
            let name = cap.name().to_string();
            match self.index.get(&name) {
                Some(&pos) => {
                    tracing::warn!(capability = %name, "capability re-registered, last registration wins");
                    self.entries[pos] = cap;
                }
                None => {
                    self.index.insert(name, self.entries.len());
                    self.entries.push(cap);
                }
            }
        }
    }

    pub fn register_one(&mut self, capability: impl Capability + 'static) {
        self.register(vec![Arc::new(capability)]);
    }

    pub fn register_provider(&mut self, provider: &dyn CapabilityProvider) {
        let caps = provider.capabilities();
        tracing::info!(
            provider = %provider.provider_name(),
            count = caps.len(),
            "registering capability provider"
        );
        self.register(caps);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Capability>, CapabilityNotFound> {
        self.index
            .get(name)
            .map(|&pos| Arc::clone(&self.entries[pos]))
            .ok_or_else(|| CapabilityNotFound(name.to_string()))
    }

    /// 按注册顺序列出全部能力
    pub fn list_all(&self) -> Vec<Arc<dyn Capability>> {
        self.entries.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|c| c.name().to_string()).collect()
    }

    /// 暴露给 Planner 的描述列表
    pub fn specs(&self) -> Vec<CapabilitySpec> {
        self.entries
            .iter()
            .map(|c| CapabilitySpec {
                name: c.name().to_string(),
                description: c.description().to_string(),
                parameters: c.parameters_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(name: &str, out: &'static str) -> Arc<dyn Capability> {
        Arc::new(FnCapability::sync(name, move |_| Ok(out.to_string())))
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut reg = CapabilityRegistry::new();
        reg.register(vec![constant("click", "generic"), constant("navigate", "nav")]);
        reg.register(vec![constant("click", "specific")]);

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.names(), vec!["click", "navigate"]);
        let out = reg
            .resolve("click")
            .unwrap()
            .invoke(Value::Null)
            .await
            .unwrap();
        assert_eq!(out, "specific");
    }

    #[test]
    fn test_resolve_unknown() {
        let reg = CapabilityRegistry::new();
        let err = reg.resolve("teleport").err().unwrap();
        assert_eq!(err, CapabilityNotFound("teleport".to_string()));
        assert_eq!(err.to_string(), "Capability not found: teleport");
    }

    #[test]
    fn test_specs_follow_registration_order() {
        let mut reg = CapabilityRegistry::new();
        reg.register_one(
            FnCapability::sync("type_text", |_| Ok(String::new()))
                .with_description("Type into an element")
                .with_schema(serde_json::json!({
                    "type": "object",
                    "properties": { "selector": { "type": "string" } },
                    "required": ["selector"]
                })),
        );
        reg.register_one(FnCapability::sync("click", |_| Ok(String::new())));
        let specs = reg.specs();
        assert_eq!(specs[0].name, "type_text");
        assert_eq!(specs[0].description, "Type into an element");
        assert_eq!(specs[0].parameters["required"][0], "selector");
        assert_eq!(specs[1].name, "click");
    }
}
