//! JS 执行器 - 基础设施层
//!
//! 持有会话页面，只暴露"执行 JS"和"有界等待"的能力。
//! 报表在嵌套 frame 里，frame 内的操作通过 `contentDocument` 完成。

use std::time::{Duration, Instant};

use chromiumoxide::Page;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::error::ScrapeError;
use crate::models::{DriverState, FrameChoice};

/// 有界等待的参数
#[derive(Debug, Clone, Copy)]
pub struct WaitBound {
    pub timeout: Duration,
    pub interval: Duration,
}

/// 已选定的 frame
#[derive(Debug, Clone)]
pub struct FrameHandle {
    name: String,
    pub choice: FrameChoice,
}

impl FrameHandle {
    pub fn new(name: impl Into<String>, choice: FrameChoice) -> Self {
        Self {
            name: name.into(),
            choice,
        }
    }

    /// 求值为 frame 元素的 JS 表达式
    fn element_expr(&self) -> String {
        match self.choice {
            FrameChoice::Named => named_frame_expr(&self.name),
            FrameChoice::FirstAvailable => "document.querySelector('iframe')".to_string(),
        }
    }

    /// 把 `body` 包进一个能访问 frame 文档 `doc` 的 IIFE；frame 不可用时返回 `fallback`
    pub fn scoped(&self, body: &str, fallback: &str) -> String {
        format!(
            r#"(() => {{
    const frame = {frame};
    const doc = frame ? (frame.contentDocument || (frame.contentWindow && frame.contentWindow.document)) : null;
    if (!doc) {{ return {fallback}; }}
    {body}
}})()"#,
            frame = self.element_expr(),
            fallback = fallback,
            body = body,
        )
    }
}

fn named_frame_expr(name: &str) -> String {
    let name = serde_json::to_string(name).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "Array.from(document.querySelectorAll('iframe, frame')).find(f => f.id === {name} || f.name === {name})",
        name = name
    )
}

/// 探测 frame 的脚本：命中指定名称返回 "named"，否则有 iframe 返回 "first"，都没有返回 ""
pub fn frame_lookup_js(name: &str) -> String {
    format!(
        r#"(() => {{
    if ({named}) {{ return "named"; }}
    if (document.querySelector('iframe')) {{ return "first"; }}
    return "";
}})()"#,
        named = named_frame_expr(name)
    )
}

/// JS 执行器
///
/// 职责：
/// - 持有页面
/// - 暴露 eval() 能力
/// - 提供有界轮询，超时转换为 `NavigationTimeout`
/// - 不认识学生 / 出勤记录
pub struct FrameExecutor {
    page: Page,
}

impl FrameExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 表达式并返回 JSON 结果；`undefined`/`null` 都视为 `Null`
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, ScrapeError> {
        let result = self.page.evaluate_expression(js_code.into()).await?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    /// 反复执行 `js_code`，直到返回真值
    ///
    /// 页面跳转期间执行上下文会失效，此时的脚本错误按"尚未就绪"处理
    pub async fn wait_for(&self, js_code: &str, step: DriverState, bound: WaitBound) -> Result<JsonValue, ScrapeError> {
        let started = Instant::now();
        loop {
            let remaining = bound.timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(ScrapeError::NavigationTimeout {
                    step,
                    waited: started.elapsed(),
                });
            }

            match timeout(remaining, self.eval(js_code)).await {
                Ok(Ok(value)) if is_truthy(&value) => return Ok(value),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("[{}] 轮询脚本暂不可用: {}", step, e),
                Err(_) => {}
            }

            sleep(bound.interval.min(bound.timeout.saturating_sub(started.elapsed()))).await;
        }
    }

    /// 选定报表所在的 frame
    ///
    /// 优先使用名称匹配的 frame；页面上只有其他 iframe 时，等待 `settle` 后退回第一个
    pub async fn locate_frame(&self, name: &str, bound: WaitBound, settle: Duration) -> Result<FrameHandle, ScrapeError> {
        let lookup = frame_lookup_js(name);
        let started = Instant::now();
        let mut first_seen = false;

        loop {
            let elapsed = started.elapsed();
            let remaining = bound.timeout.saturating_sub(elapsed);

            if remaining.is_zero() {
                return if first_seen {
                    Ok(FrameHandle::new(name, FrameChoice::FirstAvailable))
                } else {
                    Err(ScrapeError::NavigationTimeout {
                        step: DriverState::LocatingFrame,
                        waited: elapsed,
                    })
                };
            }

            match timeout(remaining, self.eval(lookup.as_str())).await {
                Ok(Ok(JsonValue::String(found))) if found == "named" => {
                    return Ok(FrameHandle::new(name, FrameChoice::Named));
                }
                Ok(Ok(JsonValue::String(found))) if found == "first" => {
                    first_seen = true;
                    if started.elapsed() >= settle {
                        return Ok(FrameHandle::new(name, FrameChoice::FirstAvailable));
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("[{}] 轮询脚本暂不可用: {}", DriverState::LocatingFrame, e),
                Err(_) => {}
            }

            sleep(bound.interval.min(bound.timeout.saturating_sub(started.elapsed()))).await;
        }
    }

    /// 在 frame 文档内执行 `body`
    pub async fn eval_in_frame(&self, frame: &FrameHandle, body: &str) -> Result<JsonValue, ScrapeError> {
        self.eval(frame.scoped(body, "null")).await
    }

    /// 在 frame 文档内轮询 `body`，直到返回真值
    pub async fn wait_in_frame(
        &self,
        frame: &FrameHandle,
        body: &str,
        step: DriverState,
        bound: WaitBound,
    ) -> Result<JsonValue, ScrapeError> {
        self.wait_for(&frame.scoped(body, "null"), step, bound).await
    }

    /// frame 文档的完整 HTML
    pub async fn frame_html(&self, frame: &FrameHandle) -> Result<String, ScrapeError> {
        let html = self
            .eval_in_frame(
                frame,
                "return doc.documentElement ? doc.documentElement.outerHTML : \"\";",
            )
            .await?;
        Ok(html.as_str().unwrap_or_default().to_string())
    }
}

/// 与 JS 的真值判断保持一致
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_truthy_matches_js() {
        assert!(!is_truthy(&JsonValue::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!("dashboard")));
        assert!(is_truthy(&json!({ "state": "dashboard" })));
    }

    #[test]
    fn test_named_frame_script_escapes_name() {
        let lookup = frame_lookup_js("ptifrm\"tgt");
        assert!(lookup.contains(r#"f.id === "ptifrm\"tgt""#));
    }

    #[test]
    fn test_scoped_script_uses_selected_frame() {
        let named = FrameHandle::new("ptifrmtgtframe", FrameChoice::Named).scoped("return 1;", "null");
        assert!(named.contains("\"ptifrmtgtframe\""));
        assert!(named.contains("return 1;"));

        let first = FrameHandle::new("ptifrmtgtframe", FrameChoice::FirstAvailable).scoped("return 1;", "false");
        assert!(first.contains("document.querySelector('iframe')"));
        assert!(first.contains("return false;"));
        assert!(!first.contains("ptifrmtgtframe"));
    }
}
