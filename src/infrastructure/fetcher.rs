//! 文档直接下载
//!
//! 复用浏览器会话的 cookie 与 User-Agent，直接请求简历 PDF 的 URL。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, USER_AGENT};
use tracing::debug;

use crate::error::{AutomationError, Result};

/// 浏览器会话凭据
#[derive(Debug, Clone, Default)]
pub struct SessionCredentials {
    pub cookies: Vec<(String, String)>,
    pub user_agent: Option<String>,
}

impl SessionCredentials {
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, credentials: &SessionCredentials) -> Result<Vec<u8>>;
}

/// reqwest 实现
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AutomationError::Config(format!("创建 HTTP 客户端失败: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, credentials: &SessionCredentials) -> Result<Vec<u8>> {
        let fetch_error = |source| AutomationError::Fetch {
            url: url.to_string(),
            source,
        };

        let mut request = self.client.get(url);
        if !credentials.cookies.is_empty() {
            request = request.header(COOKIE, credentials.cookie_header());
        }
        if let Some(ua) = &credentials.user_agent {
            request = request.header(USER_AGENT, ua);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_error)?;
        let bytes = response.bytes().await.map_err(fetch_error)?;
        debug!("下载完成: {} 字节", bytes.len());
        Ok(bytes.to_vec())
    }
}
