// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 超时
    #[error("Timeout")]
    Timeout,
    /// 代理配置无效
    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl EngineError {
    /// 判断错误是否可重试
    ///
    /// 超时、连接失败和读取响应体中断视为瞬时错误；证书等 TLS 错误不重试
    ///
    /// # 返回值
    ///
    /// 如果错误是可重试的则返回true，否则返回false
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::RequestFailed(e) => {
                if self.is_tls_failure() {
                    return false;
                }
                e.is_timeout()
                    || e.is_connect()
                    || e.is_body()
                    || e.is_request()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            EngineError::Timeout => true,
            EngineError::InvalidProxy(_) | EngineError::Other(_) => false,
        }
    }

    /// 错误链中是否包含 TLS/证书失败
    pub fn is_tls_failure(&self) -> bool {
        let EngineError::RequestFailed(e) = self else {
            return false;
        };
        let mut source = e.source();
        while let Some(err) = source {
            let text = err.to_string().to_lowercase();
            if text.contains("certificate") || text.contains("tls") || text.contains("handshake") {
                return true;
            }
            source = err.source();
        }
        false
    }
}

/// 抓取请求
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// 目标URL
    pub url: String,
    /// 代理地址，为空时直连
    pub proxy: Option<String>,
    /// 超时时间
    pub timeout: Duration,
    /// User-Agent
    pub user_agent: String,
}

/// 抓取响应
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP状态码
    pub status_code: u16,
    /// 响应内容
    pub content: String,
    /// 内容类型
    pub content_type: String,
    /// 跟随重定向后的最终地址
    pub final_url: String,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
}

/// 渲染结果
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 渲染后的 HTML
    pub content: String,
    /// 可选的快照引用（如截图存储位置）
    pub snapshot: Option<String>,
}

/// HTTP 抓取引擎特质
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// 执行一次抓取，不做重试
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, EngineError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}

/// 浏览器渲染引擎特质
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// 渲染页面并返回最终 HTML
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, EngineError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}
