//! 门户驱动服务 - 业务能力层
//!
//! 用一个浏览器会话走完 登录 → 报表页 → frame → 出勤表 的流程，
//! 产出报表 frame 的 HTML。每一步都有等待上限，每个状态都通知观察者。

use async_trait::async_trait;
use chromiumoxide::Page;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::{BrowserSettings, Config, PortalConfig};
use crate::error::ScrapeError;
use crate::infrastructure::{FrameExecutor, FrameHandle, WaitBound};
use crate::models::{Credential, DriverState, JobKey, RawDocument};

/// 驱动状态的观察者
pub trait DriverObserver: Send + Sync {
    fn on_state(&self, state: DriverState);
}

impl<F> DriverObserver for F
where
    F: Fn(DriverState) + Send + Sync,
{
    fn on_state(&self, state: DriverState) {
        self(state)
    }
}

/// 报表来源
///
/// 生产环境由 [`PortalDriver`] 实现；测试里可以换成固定 HTML
#[async_trait]
pub trait ReportFetcher: Send + Sync {
    async fn fetch_report(
        &self,
        credential: &Credential,
        observer: &dyn DriverObserver,
    ) -> Result<RawDocument, ScrapeError>;
}

/// 登录结果探测脚本的返回值
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
enum LoginOutcome {
    Dashboard,
    Rejected { detail: Option<String> },
}

/// 门户驱动
pub struct PortalDriver {
    portal: PortalConfig,
    browser: BrowserSettings,
    table_id_fragment: String,
}

impl PortalDriver {
    pub fn new(config: &Config) -> Self {
        Self {
            portal: config.portal.clone(),
            browser: config.browser.clone(),
            table_id_fragment: config.extractor.table_id_fragment.clone(),
        }
    }

    fn bound(&self) -> WaitBound {
        WaitBound {
            timeout: self.portal.wait_timeout(),
            interval: self.portal.poll_interval(),
        }
    }

    async fn drive(
        &self,
        session: &BrowserSession,
        credential: &Credential,
        observer: &dyn DriverObserver,
    ) -> Result<RawDocument, ScrapeError> {
        let key = credential.key();
        let executor = FrameExecutor::new(session.page().clone());
        let bound = self.bound();

        // 登录
        self.authenticate(&executor, credential, bound).await?;
        enter(observer, &key, DriverState::Authenticated);
        info!("[学号 {}] ✓ 登录成功", key);

        // 报表页
        enter(observer, &key, DriverState::NavigatingToReport);
        self.goto(executor.page(), &self.portal.report_url, DriverState::NavigatingToReport)
            .await?;

        // 报表 frame
        enter(observer, &key, DriverState::LocatingFrame);
        let frame = executor
            .locate_frame(&self.portal.frame_name, bound, self.portal.frame_settle())
            .await?;
        debug!("[学号 {}] 报表 frame: {:?}", key, frame.choice);
        self.expand_results(&executor, &frame, bound).await?;

        // 出勤表
        enter(observer, &key, DriverState::WaitingForTable);
        let table_js = format!(
            "return !!doc.querySelector({});",
            js_string(&format!("table[id*=\"{}\"]", self.table_id_fragment))
        );
        executor
            .wait_in_frame(&frame, &table_js, DriverState::WaitingForTable, bound)
            .await?;

        let html = executor.frame_html(&frame).await?;
        enter(observer, &key, DriverState::DocumentReady);
        info!("[学号 {}] ✓ 报表已就绪 ({} 字节)", key, html.len());

        Ok(RawDocument::new(key, html, frame.choice))
    }

    async fn authenticate(
        &self,
        executor: &FrameExecutor,
        credential: &Credential,
        bound: WaitBound,
    ) -> Result<(), ScrapeError> {
        let page = executor.page();
        self.goto(page, &self.portal.login_url, DriverState::Authenticating)
            .await?;

        let username_ready = format!(
            "!!document.querySelector({})",
            js_string(&self.portal.username_selector)
        );
        executor
            .wait_for(&username_ready, DriverState::Authenticating, bound)
            .await?;

        type_into(page, &self.portal.username_selector, &credential.username).await?;
        type_into(page, &self.portal.password_selector, &credential.password).await?;

        let submit = find(page, &self.portal.submit_selector, DriverState::Authenticating).await?;
        submit.click().await?;

        let check = login_check_js(&self.portal.dashboard_selector, &self.portal.login_error_selector);
        let outcome = executor
            .wait_for(&check, DriverState::Authenticating, bound)
            .await?;

        match serde_json::from_value::<LoginOutcome>(outcome)? {
            LoginOutcome::Dashboard => Ok(()),
            LoginOutcome::Rejected { detail } => Err(ScrapeError::AuthenticationFailure(
                detail.unwrap_or_else(|| "门户未显示原因".to_string()),
            )),
        }
    }

    /// 点开结果区域；控件在等待时间内都没出现则视为页面结构不符
    async fn expand_results(
        &self,
        executor: &FrameExecutor,
        frame: &FrameHandle,
        bound: WaitBound,
    ) -> Result<(), ScrapeError> {
        let id = js_string(&self.portal.disclosure_id);
        let not_found = || ScrapeError::ElementNotFound {
            step: DriverState::LocatingFrame,
            target: self.portal.disclosure_id.clone(),
        };

        let present = format!("return !!doc.getElementById({});", id);
        match executor
            .wait_in_frame(frame, &present, DriverState::LocatingFrame, bound)
            .await
        {
            Ok(_) => {}
            Err(ScrapeError::NavigationTimeout { .. }) => return Err(not_found()),
            Err(e) => return Err(e),
        }

        let click = format!(
            "const el = doc.getElementById({}); if (!el) {{ return false; }} el.click(); return true;",
            id
        );
        match executor.eval_in_frame(frame, &click).await? {
            serde_json::Value::Bool(true) => Ok(()),
            _ => Err(not_found()),
        }
    }

    async fn goto(&self, page: &Page, url: &str, step: DriverState) -> Result<(), ScrapeError> {
        debug!("[{}] 打开 {}", step, url);
        let limit = self.portal.wait_timeout();
        match timeout(limit, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ScrapeError::NavigationTimeout {
                step,
                waited: limit,
            }),
        }
    }
}

#[async_trait]
impl ReportFetcher for PortalDriver {
    async fn fetch_report(
        &self,
        credential: &Credential,
        observer: &dyn DriverObserver,
    ) -> Result<RawDocument, ScrapeError> {
        let key = credential.key();
        enter(observer, &key, DriverState::Idle);
        enter(observer, &key, DriverState::Authenticating);

        let session = match BrowserSession::open(&self.browser).await {
            Ok(session) => session,
            Err(e) => {
                warn!("[学号 {}] ✗ 无法打开浏览器会话: {}", key, e);
                enter(observer, &key, DriverState::Failed);
                return Err(e);
            }
        };

        let result = self.drive(&session, credential, observer).await;
        session.close().await;

        if let Err(e) = &result {
            warn!("[学号 {}] ✗ 驱动失败: {}", key, e);
            enter(observer, &key, DriverState::Failed);
        }

        result
    }
}

fn enter(observer: &dyn DriverObserver, key: &JobKey, state: DriverState) {
    debug!("[学号 {}] → {}", key, state);
    observer.on_state(state);
}

async fn find(page: &Page, selector: &str, step: DriverState) -> Result<chromiumoxide::Element, ScrapeError> {
    page.find_element(selector)
        .await
        .map_err(|_| ScrapeError::ElementNotFound {
            step,
            target: selector.to_string(),
        })
}

async fn type_into(page: &Page, selector: &str, text: &str) -> Result<(), ScrapeError> {
    let element = find(page, selector, DriverState::Authenticating).await?;
    element.click().await?.type_str(text).await?;
    Ok(())
}

/// 登录后的页面判定：出现仪表盘为成功，出现错误提示为被拒绝，否则继续等待
fn login_check_js(dashboard_selector: &str, error_selector: &str) -> String {
    format!(
        r#"(() => {{
    if (document.querySelector({dashboard})) {{ return {{ state: "dashboard" }}; }}
    const err = document.querySelector({error});
    const detail = err ? (err.textContent || "").trim() : "";
    if (detail) {{ return {{ state: "rejected", detail: detail }}; }}
    return null;
}})()"#,
        dashboard = js_string(dashboard_selector),
        error = js_string(error_selector),
    )
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_login_outcome_variants() {
        assert_eq!(
            serde_json::from_value::<LoginOutcome>(json!({ "state": "dashboard" })).unwrap(),
            LoginOutcome::Dashboard
        );
        assert_eq!(
            serde_json::from_value::<LoginOutcome>(json!({ "state": "rejected", "detail": "Your User ID and/or Password are invalid." })).unwrap(),
            LoginOutcome::Rejected {
                detail: Some("Your User ID and/or Password are invalid.".to_string())
            }
        );
        assert!(serde_json::from_value::<LoginOutcome>(json!(null)).is_err());
    }

    #[test]
    fn test_login_check_script_embeds_selectors() {
        let js = login_check_js("#pthnavcontainer", "#login_error");
        assert!(js.contains(r##"document.querySelector("#pthnavcontainer")"##));
        assert!(js.contains(r##"document.querySelector("#login_error")"##));
    }

    #[test]
    fn test_closure_observer_records_states() {
        let seen = Mutex::new(Vec::new());
        let observer = |state: DriverState| seen.lock().unwrap().push(state);

        let dyn_observer: &dyn DriverObserver = &observer;
        dyn_observer.on_state(DriverState::Authenticating);
        dyn_observer.on_state(DriverState::Failed);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![DriverState::Authenticating, DriverState::Failed]
        );
    }
}
