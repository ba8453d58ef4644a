//! HTTP 客户端模块 - 位置数据的 GET/POST
//!
//! 使用 reqwest 作为底层 HTTP 客户端。失败分为三类：
//! - 传输层错误（DNS、拒绝连接、超时）→ `Transport`
//! - 非 2xx 状态码 → `Protocol`，携带原始响应体
//! - 响应体无法解析 → `Parse`
//!
//! 本模块只负责单次请求，不做重试。

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Url};
use tracing::{error, info};

use crate::config::HttpClientConfig;
use crate::error::{PositionSyncError, Result};
use crate::payload::PositionPayload;
use crate::version::SDK_VERSION;

/// 位置同步 HTTP 客户端
#[derive(Debug, Clone)]
pub struct PositionHttpClient {
    client: Client,
}

impl PositionHttpClient {
    /// 创建新的 HTTP 客户端
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| PositionSyncError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("✅ HTTP 客户端已创建");

        Ok(Self { client })
    }

    /// 拉取位置（GET）
    pub async fn get_position(&self, url: &Url) -> Result<PositionPayload> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, user_agent())
            .send()
            .await
            .map_err(|e| {
                error!("❌ GET Error: {} ({})", e, url);
                PositionSyncError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!("❌ GET Error: 读取响应失败 {} ({})", e, url);
            PositionSyncError::Transport(e.to_string())
        })?;

        if !status.is_success() {
            error!("❌ GET Error: HTTP {} ({})", status, url);
            error!("❌ Response: {}", body);
            return Err(PositionSyncError::Protocol {
                status: status.as_u16(),
                body,
            });
        }

        info!("📥 GET Success: {}", body);

        PositionPayload::from_json(&body).map_err(|e| {
            error!("❌ 解析位置数据失败: {} ({})", e, url);
            error!("❌ Response: {}", body);
            e
        })
    }

    /// 上传位置（POST，`Content-Type: application/json`）
    ///
    /// 成功时返回响应体原文，仅用于日志
    pub async fn post_position(&self, url: &Url, payload: &PositionPayload) -> Result<String> {
        let json_data = payload.to_json()?;

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, user_agent())
            .body(json_data)
            .send()
            .await
            .map_err(|e| {
                error!("❌ POST Error: {} ({})", e, url);
                PositionSyncError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "无法读取响应内容".to_string());

        if !status.is_success() {
            error!("❌ POST Error: HTTP {} ({})", status, url);
            error!("❌ Response: {}", body);
            return Err(PositionSyncError::Protocol {
                status: status.as_u16(),
                body,
            });
        }

        info!("📤 POST Success: {}", body);
        Ok(body)
    }
}

fn user_agent() -> String {
    format!("position-sync-sdk/{}", SDK_VERSION)
}
