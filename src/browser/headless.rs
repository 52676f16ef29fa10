use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::BrowserSettings;
use crate::error::ScrapeError;

/// 启动一个独立的浏览器进程
///
/// 返回浏览器句柄和后台事件处理任务
pub async fn launch_browser(settings: &BrowserSettings) -> Result<(Browser, JoinHandle<()>), ScrapeError> {
    info!("🚀 启动浏览器 (无头: {})...", settings.headless);

    let mut builder = BrowserConfig::builder();
    builder = if settings.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(executable) = &settings.executable {
        debug!("浏览器可执行文件: {}", executable.display());
        builder = builder.chrome_executable(executable);
    }

    let config = builder
        .window_size(settings.window_width, settings.window_height)
        .args(settings.args.clone())
        .build()
        .map_err(|e| {
            error!("配置浏览器失败: {}", e);
            ScrapeError::BrowserConfig(e)
        })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let events = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    Ok((browser, events))
}
