//! 动作执行器
//!
//! 持有只读的 CapabilityRegistry、单次调用超时与可选 Policy。execute 永不返回错误：
//! 未知动作、策略拒绝、调用失败、超时都转为 `ActionResult { ok: false }` 反馈给模型；
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::memory::{ActionCall, ActionResult};
use crate::tools::{CapabilityRegistry, Policy};

pub struct Executor {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
    policy: Option<Arc<dyn Policy>>,
}

impl Executor {
    pub fn new(registry: Arc<CapabilityRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            policy: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub async fn execute(&self, action: &ActionCall) -> ActionResult {
        let start = Instant::now();

        let (result, outcome) = self.dispatch(action).await;

        audit(action, &result, outcome, start.elapsed());
        result
    }

    async fn dispatch(&self, action: &ActionCall) -> (ActionResult, &'static str) {
        if let Some(policy) = &self.policy {
            if !policy.allowed(action) {
                return (
                    ActionResult::failure(
                        &action.name,
                        format!("Action '{}' denied by policy", action.name),
                    ),
                    "denied",
                );
            }
        }

        let capability = match self.registry.resolve(&action.name) {
            Ok(c) => c,
            Err(e) => {
                let output = format!(
                    "{}. Available actions: {}",
                    e,
                    self.registry.names().join(", ")
                );
                return (ActionResult::failure(&action.name, output), "not_found");
            }
        };

        match timeout(self.timeout, capability.invoke(action.arguments_value())).await {
            Ok(Ok(output)) => (ActionResult::success(&action.name, output), "ok"),
            Ok(Err(e)) => (ActionResult::failure(&action.name, format!("Error: {}", e)), "error"),
            Err(_) => (
                ActionResult::failure(
                    &action.name,
                    format!("Error: '{}' timed out after {:?}", action.name, self.timeout),
                ),
                "timeout",
            ),
        }
    }
}

fn audit(action: &ActionCall, result: &ActionResult, outcome: &str, elapsed: Duration) {
    let audit = serde_json::json!({
        "event": "action_audit",
        "action": action.name,
        "ok": result.ok,
        "outcome": outcome,
        "duration_ms": elapsed.as_millis() as u64,
        "args_preview": args_preview(&action.arguments_value()),
    });
    tracing::info!(audit = %audit.to_string(), "action");
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{DenyActions, FnCapability};

    fn registry() -> Arc<CapabilityRegistry> {
        let mut reg = CapabilityRegistry::new();
        reg.register_one(FnCapability::sync("click", |args| {
            let sel = args.get("selector").and_then(|v| v.as_str()).unwrap_or("");
            Ok(format!("clicked {}", sel))
        }));
        reg.register_one(FnCapability::sync("broken", |_| Err("element detached".to_string())));
        reg.register_one(FnCapability::new("slow", |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".to_string())
        }));
        Arc::new(reg)
    }

    #[tokio::test]
    async fn test_execute_success() {
        let exec = Executor::new(registry(), 5);
        let r = exec
            .execute(&ActionCall::new("click").with_arg("selector", "#save"))
            .await;
        assert_eq!(r, ActionResult::success("click", "clicked #save"));
    }

    #[tokio::test]
    async fn test_failure_becomes_result() {
        let exec = Executor::new(registry(), 5);
        let r = exec.execute(&ActionCall::new("broken")).await;
        assert!(!r.ok);
        assert_eq!(r.output, "Error: element detached");
    }

    #[tokio::test]
    async fn test_unknown_action_lists_available() {
        let exec = Executor::new(registry(), 5);
        let r = exec.execute(&ActionCall::new("teleport")).await;
        assert!(!r.ok);
        assert!(r.output.contains("Capability not found: teleport"));
        assert!(r.output.contains("click"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_failed_result() {
        let exec = Executor::new(registry(), 1);
        let r = exec.execute(&ActionCall::new("slow")).await;
        assert!(!r.ok);
        assert!(r.output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_policy_denial() {
        let exec = Executor::new(registry(), 5).with_policy(Arc::new(DenyActions::new(["click"])));
        let r = exec.execute(&ActionCall::new("click")).await;
        assert!(!r.ok);
        assert!(r.output.contains("denied by policy"));
    }
}
