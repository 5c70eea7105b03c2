use std::path::Path;

use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 启动有界面的浏览器并导航到指定 URL
///
/// 截图兜底需要真实窗口，所以不使用无头模式。
pub async fn launch_browser(executable: &str, url: &str) -> Result<(Browser, Page)> {
    info!("🚀 启动浏览器: {}", executable);
    debug!("目标 URL: {}", url);

    let config = BrowserConfig::builder()
        .with_head()
        .chrome_executable(Path::new(executable))
        .args(vec!["--start-maximized", "--disable-popup-blocking"])
        .build()
        .map_err(|e| {
            error!("配置浏览器失败: {}", e);
            anyhow::anyhow!("配置浏览器失败: {}", e)
        })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        anyhow::anyhow!("启动浏览器失败: {}", e)
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let page = browser.new_page(url).await.map_err(|e| {
        error!("创建页面失败: {}", e);
        anyhow::anyhow!("创建页面失败: {}", e)
    })?;

    info!("✅ 浏览器已导航到: {}", url);
    Ok((browser, page))
}
