//! Dry-run 浏览器：不连接真实浏览器，只记录将要执行的动作并返回描述性文本
//!
//! 与真实浏览器提供同名动作（navigate / click / type_text / press_key / scroll /
//! wait_for_element / get_page_content / extract_data），会话状态（当前 URL、动作日志）
//! 由提供方自己持有，核心循环不感知其生命周期。

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};

use crate::tools::{Capability, CapabilityProvider, FnCapability};

/// 会话状态
#[derive(Debug, Default, Clone)]
pub struct DryRunSession {
    pub current_url: Option<String>,
    /// 已执行动作（按顺序）
    pub log: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct DryRunBrowser {
    session: Arc<Mutex<DryRunSession>>,
}

impl DryRunBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前会话快照
    pub fn session(&self) -> DryRunSession {
        lock(&self.session).map(|s| s.clone()).unwrap_or_default()
    }
}

fn lock(session: &Mutex<DryRunSession>) -> Result<MutexGuard<'_, DryRunSession>, String> {
    session.lock().map_err(|e| format!("browser session poisoned: {}", e))
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing '{}'", key))
}

fn string_params(params: &[(&str, &str)]) -> Value {
    let mut properties = serde_json::Map::new();
    for (name, desc) in params {
        properties.insert(
            name.to_string(),
            json!({ "type": "string", "description": desc }),
        );
    }
    let required: Vec<&str> = params.iter().map(|(n, _)| *n).collect();
    json!({ "type": "object", "properties": properties, "required": required })
}

/// 构造一个需要已打开页面的动作
fn page_action<F>(
    session: &Arc<Mutex<DryRunSession>>,
    name: &str,
    description: &str,
    schema: Value,
    f: F,
) -> Arc<dyn Capability>
where
    F: Fn(&mut DryRunSession, &Value) -> Result<String, String> + Send + Sync + 'static,
{
    let session = Arc::clone(session);
    let action = name.to_string();
    Arc::new(
        FnCapability::sync(name, move |args| {
            let mut s = lock(&session)?;
            if s.current_url.is_none() {
                return Err("No page loaded. Use navigate first.".to_string());
            }
            let out = f(&mut s, args)?;
            tracing::info!(action = %action, "dry-run browser: {}", out);
            s.log.push(out.clone());
            Ok(out)
        })
        .with_description(description)
        .with_schema(schema),
    )
}

impl CapabilityProvider for DryRunBrowser {
    fn provider_name(&self) -> &str {
        "dry-run-browser"
    }

    fn capabilities(&self) -> Vec<Arc<dyn Capability>> {
        let nav_session = Arc::clone(&self.session);
        let navigate: Arc<dyn Capability> = Arc::new(
            FnCapability::sync("navigate", move |args| {
                let url = required_str(args, "url")?;
                let mut s = lock(&nav_session)?;
                s.current_url = Some(url.to_string());
                let out = format!("Navigated to {}", url);
                tracing::info!(url = %url, "dry-run browser: navigate");
                s.log.push(out.clone());
                Ok(out)
            })
            .with_description("Navigates the browser to a specific URL.")
            .with_schema(string_params(&[("url", "The full URL to navigate to.")])),
        );

        vec![
            navigate,
            page_action(
                &self.session,
                "click",
                "Clicks an element specified by a CSS selector.",
                string_params(&[("selector", "The CSS selector of the element.")]),
                |_, args| Ok(format!("Clicked '{}'", required_str(args, "selector")?)),
            ),
            page_action(
                &self.session,
                "type_text",
                "Types text into an element specified by a CSS selector.",
                string_params(&[
                    ("selector", "The CSS selector of the element."),
                    ("text", "The text to type."),
                ]),
                |_, args| {
                    let selector = required_str(args, "selector")?;
                    let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("");
                    Ok(format!("Typed '{}' into '{}'", text, selector))
                },
            ),
            page_action(
                &self.session,
                "press_key",
                "Simulates a single key press (e.g. 'Enter', 'ArrowDown').",
                string_params(&[("key", "The key to press.")]),
                |_, args| Ok(format!("Pressed '{}'", required_str(args, "key")?)),
            ),
            page_action(
                &self.session,
                "scroll",
                "Scrolls the page up or down.",
                string_params(&[("direction", "'up' or 'down'.")]),
                |_, args| {
                    let direction = args
                        .get("direction")
                        .and_then(|v| v.as_str())
                        .unwrap_or("down");
                    Ok(format!("Scrolled {}", direction))
                },
            ),
            page_action(
                &self.session,
                "wait_for_element",
                "Waits for an element to appear on the page.",
                string_params(&[("selector", "The CSS selector to wait for.")]),
                |_, args| Ok(format!("Waited for '{}'", required_str(args, "selector")?)),
            ),
            page_action(
                &self.session,
                "get_page_content",
                "Returns the readable text of the current page.",
                json!({ "type": "object", "properties": {}, "required": [] }),
                |s, _| {
                    Ok(format!(
                        "No-op page at {}",
                        s.current_url.as_deref().unwrap_or("about:blank")
                    ))
                },
            ),
            page_action(
                &self.session,
                "extract_data",
                "Extracts structured data from elements matching a selector.",
                json!({
                    "type": "object",
                    "properties": {
                        "selector": { "type": "string", "description": "CSS selector for the list of elements." },
                        "fields": { "type": "array", "items": { "type": "string" }, "description": "Field names to extract." },
                        "limit": { "type": "integer", "description": "Maximum number of items." }
                    },
                    "required": ["selector", "fields", "limit"]
                }),
                |_, args| {
                    let selector = required_str(args, "selector")?;
                    let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(2).min(2);
                    let fields: Vec<&str> = args
                        .get("fields")
                        .and_then(|v| v.as_array())
                        .map(|a| a.iter().filter_map(|f| f.as_str()).collect())
                        .unwrap_or_default();
                    let rows: Vec<Value> = (1..=limit)
                        .map(|i| {
                            let mut row = serde_json::Map::new();
                            for f in &fields {
                                row.insert(f.to_string(), json!(format!("Dummy {} {}", f, i)));
                            }
                            Value::Object(row)
                        })
                        .collect();
                    Ok(format!(
                        "Extracted from '{}': {}",
                        selector,
                        Value::Array(rows)
                    ))
                },
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::CapabilityRegistry;

    fn registry(browser: &DryRunBrowser) -> CapabilityRegistry {
        let mut reg = CapabilityRegistry::new();
        reg.register_provider(browser);
        reg
    }

    #[tokio::test]
    async fn test_page_actions_require_navigate() {
        let browser = DryRunBrowser::new();
        let reg = registry(&browser);
        let click = reg.resolve("click").unwrap();
        let err = click.invoke(json!({ "selector": "#save" })).await.unwrap_err();
        assert!(err.contains("navigate first"));

        reg.resolve("navigate")
            .unwrap()
            .invoke(json!({ "url": "https://example.com" }))
            .await
            .unwrap();
        let out = click.invoke(json!({ "selector": "#save" })).await.unwrap();
        assert_eq!(out, "Clicked '#save'");

        let session = browser.session();
        assert_eq!(session.current_url.as_deref(), Some("https://example.com"));
        assert_eq!(session.log.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_argument_is_error() {
        let browser = DryRunBrowser::new();
        let reg = registry(&browser);
        let err = reg.resolve("navigate").unwrap().invoke(json!({})).await.unwrap_err();
        assert_eq!(err, "Missing 'url'");
    }

    #[tokio::test]
    async fn test_extract_data_shape() {
        let browser = DryRunBrowser::new();
        let reg = registry(&browser);
        reg.resolve("navigate")
            .unwrap()
            .invoke(json!({ "url": "https://jobs.example.com" }))
            .await
            .unwrap();
        let out = reg
            .resolve("extract_data")
            .unwrap()
            .invoke(json!({ "selector": ".job", "fields": ["title"], "limit": 5 }))
            .await
            .unwrap();
        assert!(out.contains("Dummy title 1"));
        assert!(out.contains("Dummy title 2"));
    }

    #[test]
    fn test_exposes_all_actions() {
        let reg = registry(&DryRunBrowser::new());
        assert_eq!(
            reg.names(),
            vec![
                "navigate",
                "click",
                "type_text",
                "press_key",
                "scroll",
                "wait_for_element",
                "get_page_content",
                "extract_data"
            ]
        );
    }
}
