use std::path::Path;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// 连接到已开启调试端口的浏览器，在新标签页中打开 `target_url`
pub async fn connect_to_browser_and_page(port: u16, target_url: &str) -> Result<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器连接成功");

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

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建新页面失败: {}", e);
        e
    })?;
    page.goto(target_url)
        .await
        .with_context(|| format!("导航到 {} 失败", target_url))?;
    info!("已导航到: {}", target_url);

    Ok((browser, page))
}

/// 让浏览器把下载直接保存到指定目录（不弹保存对话框）
pub async fn route_downloads(page: &Page, download_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(download_dir)
        .with_context(|| format!("无法创建下载目录: {}", download_dir.display()))?;
    let absolute = std::fs::canonicalize(download_dir)?;

    let params = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(absolute.to_string_lossy().to_string())
        .events_enabled(true)
        .build()
        .map_err(|e| anyhow::anyhow!("下载设置参数无效: {}", e))?;

    match page.execute(params).await {
        Ok(_) => info!("📥 下载目录: {}", absolute.display()),
        // 设置失败时浏览器仍可下载到默认目录，后续由 DownloadWatcher 超时兜底
        Err(e) => warn!("⚠️ 下载设置应用失败: {}", e),
    }
    Ok(())
}
