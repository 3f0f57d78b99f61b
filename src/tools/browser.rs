//! Headless Chrome 浏览器能力
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! 与 dry-run 浏览器暴露同名动作；headless_chrome 为同步 API，所有调用放在 spawn_blocking 中。
//! 浏览器与当前 Tab 由提供方持有，首次 navigate 时惰性启动。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::{json, Value};

use crate::tools::{Capability, CapabilityProvider};

#[derive(Default)]
struct ChromeSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChromeAction {
    Navigate,
    Click,
    TypeText,
    PressKey,
    Scroll,
    WaitForElement,
    GetPageContent,
    ExtractData,
}

impl ChromeAction {
    const ALL: [ChromeAction; 8] = [
        ChromeAction::Navigate,
        ChromeAction::Click,
        ChromeAction::TypeText,
        ChromeAction::PressKey,
        ChromeAction::Scroll,
        ChromeAction::WaitForElement,
        ChromeAction::GetPageContent,
        ChromeAction::ExtractData,
    ];

    fn name(self) -> &'static str {
        match self {
            ChromeAction::Navigate => "navigate",
            ChromeAction::Click => "click",
            ChromeAction::TypeText => "type_text",
            ChromeAction::PressKey => "press_key",
            ChromeAction::Scroll => "scroll",
            ChromeAction::WaitForElement => "wait_for_element",
            ChromeAction::GetPageContent => "get_page_content",
            ChromeAction::ExtractData => "extract_data",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ChromeAction::Navigate => "Navigates the browser to a specific URL.",
            ChromeAction::Click => "Clicks an element specified by a CSS selector.",
            ChromeAction::TypeText => "Types text into an element specified by a CSS selector.",
            ChromeAction::PressKey => "Simulates a single key press (e.g. 'Enter', 'ArrowDown').",
            ChromeAction::Scroll => "Scrolls the page up or down.",
            ChromeAction::WaitForElement => "Waits for an element to appear on the page.",
            ChromeAction::GetPageContent => "Returns the readable text of the current page.",
            ChromeAction::ExtractData => "Extracts structured data from elements matching a selector.",
        }
    }

    fn params(self) -> &'static [&'static str] {
        match self {
            ChromeAction::Navigate => &["url"],
            ChromeAction::Click | ChromeAction::WaitForElement => &["selector"],
            ChromeAction::TypeText => &["selector", "text"],
            ChromeAction::PressKey => &["key"],
            ChromeAction::Scroll => &["direction"],
            ChromeAction::GetPageContent => &[],
            ChromeAction::ExtractData => &["selector", "fields", "limit"],
        }
    }
}

fn param_schema(name: &str) -> Value {
    match name {
        "fields" => json!({ "type": "array", "items": { "type": "string" } }),
        "limit" => json!({ "type": "integer" }),
        _ => json!({ "type": "string" }),
    }
}

/// 在页面内收集 selector 命中的前 limit 个元素；每个字段取 `[data-field=f]` 或 `.f` 子元素的文本
fn extract_script(selector: &str, fields: &[String], limit: u64) -> String {
    let selector = Value::String(selector.to_string());
    let fields = json!(fields);
    format!(
        r#"(() => {{
  const fields = {fields};
  const rows = Array.from(document.querySelectorAll({selector})).slice(0, {limit});
  return JSON.stringify(rows.map(el => {{
    if (fields.length === 0) return {{ text: el.innerText.trim() }};
    const row = {{}};
    for (const f of fields) {{
      const node = el.querySelector('[data-field="' + f + '"]') || el.querySelector('.' + CSS.escape(f));
      row[f] = node ? node.innerText.trim() : null;
    }}
    return row;
  }}));
}})()"#,
        fields = fields,
        selector = selector,
        limit = limit,
    )
}

/// 真实浏览器提供方
#[derive(Clone)]
pub struct ChromeBrowser {
    session: Arc<Mutex<ChromeSession>>,
    headless: bool,
    max_result_chars: usize,
}

impl ChromeBrowser {
    pub fn new(headless: bool, max_result_chars: usize) -> Self {
        Self {
            session: Arc::new(Mutex::new(ChromeSession::default())),
            headless,
            max_result_chars,
        }
    }
}

impl CapabilityProvider for ChromeBrowser {
    fn provider_name(&self) -> &str {
        "chrome"
    }

    fn capabilities(&self) -> Vec<Arc<dyn Capability>> {
        ChromeAction::ALL
            .iter()
            .map(|&action| {
                Arc::new(ChromeCapability {
                    action,
                    browser: self.clone(),
                }) as Arc<dyn Capability>
            })
            .collect()
    }
}

struct ChromeCapability {
    action: ChromeAction,
    browser: ChromeBrowser,
}

fn arg(args: &Value, key: &str) -> Result<String, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing '{}'", key))
}

fn current_tab(session: &ChromeSession) -> Result<Arc<Tab>, String> {
    session
        .tab
        .clone()
        .ok_or_else(|| "No page loaded. Use navigate first.".to_string())
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text
    }
}

fn run_action(
    action: ChromeAction,
    args: &Value,
    session: &mut ChromeSession,
    headless: bool,
    max_chars: usize,
) -> Result<String, String> {
    match action {
        ChromeAction::Navigate => {
            let url = arg(args, "url")?;
            if session.browser.is_none() {
                let options = LaunchOptions::default_builder()
                    .headless(headless)
                    .build()
                    .map_err(|e| format!("Invalid launch options: {}", e))?;
                let browser = Browser::new(options)
                    .map_err(|e| format!("Chrome launch failed: {}. Install Chrome/Chromium.", e))?;
                session.browser = Some(browser);
            }
            if session.tab.is_none() {
                let tab = session
                    .browser
                    .as_ref()
                    .ok_or_else(|| "Chrome not running".to_string())?
                    .new_tab()
                    .map_err(|e| format!("Browser tab failed: {}", e))?;
                session.tab = Some(tab);
            }
            let tab = current_tab(session)?;
            tab.navigate_to(&url)
                .map_err(|e| format!("Navigate failed: {}", e))?
                .wait_until_navigated()
                .map_err(|e| format!("Page load failed: {}", e))?;
            Ok(format!("Navigated to {} (title: {})", url, tab.get_title().unwrap_or_default()))
        }
        ChromeAction::Click => {
            let selector = arg(args, "selector")?;
            current_tab(session)?
                .wait_for_element(&selector)
                .map_err(|e| format!("Element '{}' not found: {}", selector, e))?
                .click()
                .map_err(|e| format!("Click failed: {}", e))?;
            Ok(format!("Clicked '{}'", selector))
        }
        ChromeAction::TypeText => {
            let selector = arg(args, "selector")?;
            let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("");
            current_tab(session)?
                .wait_for_element(&selector)
                .map_err(|e| format!("Element '{}' not found: {}", selector, e))?
                .type_into(text)
                .map_err(|e| format!("Type failed: {}", e))?;
            Ok(format!("Typed '{}' into '{}'", text, selector))
        }
        ChromeAction::PressKey => {
            let key = arg(args, "key")?;
            current_tab(session)?
                .press_key(&key)
                .map_err(|e| format!("Key press failed: {}", e))?;
            Ok(format!("Pressed '{}'", key))
        }
        ChromeAction::Scroll => {
            let direction = args
                .get("direction")
                .and_then(|v| v.as_str())
                .unwrap_or("down")
                .to_string();
            let amount = if direction == "up" { -500 } else { 500 };
            current_tab(session)?
                .evaluate(&format!("window.scrollBy(0, {})", amount), false)
                .map_err(|e| format!("Scroll failed: {}", e))?;
            Ok(format!("Scrolled {}", direction))
        }
        ChromeAction::WaitForElement => {
            let selector = arg(args, "selector")?;
            current_tab(session)?
                .wait_for_element(&selector)
                .map_err(|e| format!("Element '{}' not found: {}", selector, e))?;
            Ok(format!("Waited for '{}'", selector))
        }
        ChromeAction::GetPageContent => {
            let content = current_tab(session)?
                .get_content()
                .map_err(|e| format!("Get content failed: {}", e))?;
            let text = html2text::from_read(content.as_bytes(), 120).unwrap_or(content);
            Ok(truncate(text, max_chars))
        }
        ChromeAction::ExtractData => {
            let selector = arg(args, "selector")?;
            let fields: Vec<String> = args
                .get("fields")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|f| f.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(10).max(1);
            let remote = current_tab(session)?
                .evaluate(&extract_script(&selector, &fields, limit), false)
                .map_err(|e| format!("Extract failed: {}", e))?;
            let rows = remote
                .value
                .as_ref()
                .and_then(|v| v.as_str())
                .unwrap_or("[]")
                .to_string();
            Ok(truncate(rows, max_chars))
        }
    }
}

#[async_trait]
impl Capability for ChromeCapability {
    fn name(&self) -> &str {
        self.action.name()
    }

    fn description(&self) -> &str {
        self.action.description()
    }

    fn parameters_schema(&self) -> Value {
        let params = self.action.params();
        let properties: serde_json::Map<String, Value> = params
            .iter()
            .map(|p| (p.to_string(), param_schema(p)))
            .collect();
        json!({ "type": "object", "properties": properties, "required": params })
    }

    async fn invoke(&self, args: Value) -> Result<String, String> {
        let action = self.action;
        let session = Arc::clone(&self.browser.session);
        let headless = self.browser.headless;
        let max_chars = self.browser.max_result_chars;

        tracing::info!(action = action.name(), "chrome action");

        tokio::task::spawn_blocking(move || {
            let mut guard = session.lock().map_err(|e| e.to_string())?;
            run_action(action, &args, &mut guard, headless, max_chars)
        })
        .await
        .map_err(|e| format!("Task join: {}", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposes_same_names_as_dry_run() {
        let names: Vec<String> = ChromeBrowser::new(true, 1000)
            .capabilities()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert!(names.contains(&"navigate".to_string()));
        assert!(names.contains(&"get_page_content".to_string()));
        assert!(names.contains(&"extract_data".to_string()));
    }

    #[test]
    fn test_extract_data_schema_types() {
        let caps = ChromeBrowser::new(true, 1000).capabilities();
        let extract = caps.iter().find(|c| c.name() == "extract_data").unwrap();
        let schema = extract.parameters_schema();
        assert_eq!(schema["properties"]["fields"]["type"], "array");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema["properties"]["selector"]["type"], "string");
    }

    #[test]
    fn test_extract_script_escapes_inputs() {
        let script = extract_script("a[href=\"x\"]", &["title".to_string()], 3);
        assert!(script.contains(r#"querySelectorAll("a[href=\"x\"]")"#));
        assert!(script.contains(r#"const fields = ["title"];"#));
        assert!(script.contains(".slice(0, 3)"));
    }

    #[tokio::test]
    async fn test_extract_without_navigate_fails() {
        let caps = ChromeBrowser::new(true, 1000).capabilities();
        let extract = caps.iter().find(|c| c.name() == "extract_data").unwrap();
        let err = extract
            .invoke(json!({ "selector": ".job", "fields": ["title"], "limit": 2 }))
            .await
            .unwrap_err();
        assert!(err.contains("navigate first"));
    }

    #[tokio::test]
    async fn test_page_action_without_navigate_fails() {
        let caps = ChromeBrowser::new(true, 1000).capabilities();
        let click = caps.iter().find(|c| c.name() == "click").unwrap();
        let err = click.invoke(json!({ "selector": "#x" })).await.unwrap_err();
        assert!(err.contains("navigate first"));
    }
}
