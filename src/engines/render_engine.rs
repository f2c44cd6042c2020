// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{EngineError, RenderEngine, RenderedPage};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::OnceCell;

// Shared browser instance, launched on first render
static BROWSER_INSTANCE: OnceCell<Browser> = OnceCell::const_new();

/// 获取或初始化共享浏览器实例
///
/// 设置了 `CHROMIUM_REMOTE_DEBUGGING_URL` 时连接远程实例，否则本地启动
pub async fn get_browser() -> Result<&'static Browser, EngineError> {
    BROWSER_INSTANCE
        .get_or_try_init(|| async {
            let remote_debugging_url = std::env::var("CHROMIUM_REMOTE_DEBUGGING_URL").ok();

            let (browser, mut handler) = if let Some(ref url) = remote_debugging_url {
                tracing::info!("Connecting to remote Chrome instance at: {}", url);
                Browser::connect(url).await.map_err(|e| {
                    EngineError::Other(format!("Failed to connect to remote Chrome: {}", e))
                })?
            } else {
                let config = BrowserConfig::builder()
                    .no_sandbox()
                    .request_timeout(Duration::from_secs(30))
                    .arg("--disable-gpu")
                    .arg("--disable-dev-shm-usage")
                    .build()
                    .map_err(EngineError::Other)?;

                Browser::launch(config)
                    .await
                    .map_err(|e| EngineError::Other(e.to_string()))?
            };

            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            Ok(browser)
        })
        .await
}

/// 浏览器渲染引擎
///
/// 基于chromiumoxide，在页面加载完成后返回 DOM 序列化结果
#[derive(Debug, Default, Clone)]
pub struct ChromiumRenderer;

#[async_trait]
impl RenderEngine for ChromiumRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, EngineError> {
        tokio::time::timeout(timeout, async {
            let browser = get_browser().await?;

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| EngineError::Other(e.to_string()))?;

            // goto waits for the load event
            page.goto(url)
                .await
                .map_err(|e| EngineError::Other(e.to_string()))?;

            let content = page
                .content()
                .await
                .map_err(|e| EngineError::Other(e.to_string()))?;

            if let Err(e) = page.close().await {
                tracing::debug!("Failed to close render page for {}: {}", url, e);
            }

            Ok(RenderedPage {
                content,
                snapshot: None,
            })
        })
        .await
        .map_err(|_| EngineError::Timeout)?
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}
