//! 执行前策略钩子
//!
//! Executor 在调用能力前询问 `Policy::allowed`；未配置策略时全部放行。
//! 内置：按动作名拒绝、navigate 目标域名白名单，以及多策略组合（全部放行才放行）。

use std::collections::HashSet;
use std::sync::Arc;

use url::Url;

use crate::config::PolicySection;
use crate::memory::ActionCall;

pub trait Policy: Send + Sync {
    fn allowed(&self, action: &ActionCall) -> bool;
}

/// 按动作名拒绝
#[derive(Debug, Clone)]
pub struct DenyActions {
    denied: HashSet<String>,
}

impl DenyActions {
    pub fn new(denied: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            denied: denied.into_iter().map(Into::into).collect(),
        }
    }
}

impl Policy for DenyActions {
    fn allowed(&self, action: &ActionCall) -> bool {
        !self.denied.contains(&action.name)
    }
}

/// navigate 的 url 必须落在白名单域名（或其子域名）内；其它动作不受限
#[derive(Debug, Clone)]
pub struct DomainAllowlist {
    allowed_domains: HashSet<String>,
}

impl DomainAllowlist {
    pub fn new(domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed_domains: domains
                .into_iter()
                .map(|d| Into::<String>::into(d).to_lowercase())
                .collect(),
        }
    }

    fn domain_allowed(&self, host: &str) -> bool {
        self.allowed_domains
            .iter()
            .any(|d| host == d || host.ends_with(&format!(".{}", d)))
    }
}

impl Policy for DomainAllowlist {
    fn allowed(&self, action: &ActionCall) -> bool {
        if action.name != "navigate" {
            return true;
        }
        match action.str_arg("url").and_then(extract_domain) {
            Some(host) => self.domain_allowed(&host),
            None => false,
        }
    }
}

/// 组合策略：所有子策略都放行才放行
#[derive(Default, Clone)]
pub struct AllOf {
    policies: Vec<Arc<dyn Policy>>,
}

impl AllOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: impl Policy + 'static) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Policy for AllOf {
    fn allowed(&self, action: &ActionCall) -> bool {
        self.policies.iter().all(|p| p.allowed(action))
    }
}

/// 从 [policy] 段构建；两项均为空时返回 None（不设策略）
pub fn policy_from_config(section: &PolicySection) -> Option<Arc<dyn Policy>> {
    let mut all = AllOf::new();
    if !section.denied_actions.is_empty() {
        all = all.with(DenyActions::new(section.denied_actions.iter().cloned()));
    }
    if !section.allowed_domains.is_empty() {
        all = all.with(DomainAllowlist::new(section.allowed_domains.iter().cloned()));
    }
    if all.is_empty() {
        None
    } else {
        Some(Arc::new(all))
    }
}

/// 从 URL 提取域名（小写）；只接受 http / https
pub fn extract_domain(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.trim_end_matches('.').to_lowercase())
}
