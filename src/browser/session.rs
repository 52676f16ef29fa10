//! 浏览器会话
//!
//! 每个抓取任务独占一个会话。会话在任何退出路径上都必须释放：
//! 正常路径调用 [`BrowserSession::close`]，panic 或任务被丢弃时由 `Drop` 兜底
//! （终止事件任务，chromiumoxide 在 `Browser` 析构时结束自己启动的子进程）。

use chromiumoxide::{Browser, Page};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::{connect_to_browser, launch_browser};
use crate::config::BrowserSettings;
use crate::error::ScrapeError;

pub struct BrowserSession {
    browser: Browser,
    page: Page,
    events: JoinHandle<()>,
    /// 浏览器进程是否由本会话启动
    owned: bool,
}

impl BrowserSession {
    /// 按配置启动或连接浏览器，并打开一个空白页
    pub async fn open(settings: &BrowserSettings) -> Result<Self, ScrapeError> {
        let (browser, events, owned) = match settings.debug_port {
            Some(port) => {
                let (browser, events) = connect_to_browser(port).await?;
                (browser, events, false)
            }
            None => {
                let (browser, events) = launch_browser(settings).await?;
                (browser, events, true)
            }
        };

        // 等待浏览器状态同步
        sleep(tokio::time::Duration::from_millis(300)).await;

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                events.abort();
                return Err(e.into());
            }
        };
        debug!("会话页面已创建");

        Ok(Self {
            browser,
            page,
            events,
            owned,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 关闭页面；如果浏览器由本会话启动，一并关闭浏览器
    ///
    /// 关闭过程中的错误只记录日志，不影响任务结果
    pub async fn close(mut self) {
        if let Err(e) = self.page.clone().close().await {
            warn!("关闭页面失败: {}", e);
        }

        if self.owned {
            if let Err(e) = self.browser.close().await {
                warn!("关闭浏览器失败: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                warn!("等待浏览器退出失败: {}", e);
            }
        }

        self.events.abort();
        debug!("浏览器会话已释放");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.events.abort();
    }
}
