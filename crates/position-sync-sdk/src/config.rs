//! SDK 配置
//!
//! 配置来源（后者覆盖前者）：
//! 1. `SyncConfig::default()`
//! 2. JSON 配置文件（`SyncConfig::from_json_file`）
//! 3. 环境变量（`SyncConfig::apply_env_overrides`）

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::endpoint::SyncEndpoint;
use crate::error::{PositionSyncError, Result};

/// 默认服务端地址
pub const DEFAULT_BASE_URL: &str = "http://localhost:5005/server";
/// 默认自动推送会话 ID
pub const DEFAULT_SESSION_ID: &str = "defaultGame";
/// 默认自动推送实体 ID
pub const DEFAULT_ENTITY_ID: &str = "0";
/// 默认自动推送间隔
pub const DEFAULT_AUTO_PUSH_INTERVAL: Duration = Duration::from_secs(1);
/// 自动推送间隔下限，低于此值会被抬升
pub const MIN_AUTO_PUSH_INTERVAL: Duration = Duration::from_millis(10);

pub const ENV_BASE_URL: &str = "POSITION_SYNC_BASE_URL";
pub const ENV_SESSION_ID: &str = "POSITION_SYNC_SESSION_ID";
pub const ENV_ENTITY_ID: &str = "POSITION_SYNC_ENTITY_ID";
pub const ENV_INTERVAL_MS: &str = "POSITION_SYNC_INTERVAL_MS";

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// 连接超时（秒），None 使用传输层默认值
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒），None 使用传输层默认值
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
        }
    }
}

/// 自动推送配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoPushConfig {
    /// 会话 ID
    pub session_id: String,
    /// 本地实体 ID
    pub entity_id: String,
    /// 推送间隔（毫秒）
    pub interval_ms: u64,
    /// 同时进行中的推送上限；None 表示不限制（每个 tick 都发出请求）
    pub max_in_flight: Option<usize>,
}

impl Default for AutoPushConfig {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.to_string(),
            entity_id: DEFAULT_ENTITY_ID.to_string(),
            interval_ms: DEFAULT_AUTO_PUSH_INTERVAL.as_millis() as u64,
            max_in_flight: None,
        }
    }
}

impl AutoPushConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// 位置同步 SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 服务端基础 URL，支持 `{sessionId}` / `{entityId}` 占位符
    pub base_url: String,
    /// HTTP 客户端配置
    pub http_client_config: HttpClientConfig,
    /// 自动推送配置
    pub auto_push: AutoPushConfig,
    /// 事件缓冲区大小
    pub event_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http_client_config: HttpClientConfig::default(),
            auto_push: AutoPushConfig::default(),
            event_buffer_size: 256,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// 从 JSON 文件加载，缺省字段取默认值
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PositionSyncError::Config(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;
        let config: SyncConfig = serde_json::from_str(&content).map_err(|e| {
            PositionSyncError::Config(format!("解析配置文件失败 {}: {}", path.display(), e))
        })?;
        info!("✅ 配置已加载: {}", path.display());
        Ok(config)
    }

    /// 用环境变量覆盖配置
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(session_id) = lookup(ENV_SESSION_ID) {
            self.auto_push.session_id = session_id;
        }
        if let Some(entity_id) = lookup(ENV_ENTITY_ID) {
            self.auto_push.entity_id = entity_id;
        }
        if let Some(interval) = lookup(ENV_INTERVAL_MS) {
            self.auto_push.interval_ms = interval.trim().parse().map_err(|e| {
                PositionSyncError::Config(format!(
                    "{} 不是合法的毫秒数 ({}): {}",
                    ENV_INTERVAL_MS, interval, e
                ))
            })?;
        }
        Ok(self)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        SyncEndpoint::new(self.base_url.clone())?.validate()?;
        validate_interval(self.auto_push.interval())?;
        if self.auto_push.session_id.is_empty() || self.auto_push.entity_id.is_empty() {
            return Err(PositionSyncError::Config(
                "auto_push.session_id / auto_push.entity_id must not be empty".to_string(),
            ));
        }
        if self.auto_push.max_in_flight == Some(0) {
            return Err(PositionSyncError::Config(
                "auto_push.max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(PositionSyncError::Config(
                "event_buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// 校验自动推送间隔
///
/// 零间隔直接拒绝；低于 `MIN_AUTO_PUSH_INTERVAL` 的值抬升到下限
pub fn validate_interval(interval: Duration) -> Result<Duration> {
    if interval.is_zero() {
        return Err(PositionSyncError::InvalidArgument(
            "auto push interval must be positive".to_string(),
        ));
    }
    if interval < MIN_AUTO_PUSH_INTERVAL {
        warn!(
            "⚠️ 自动推送间隔 {:?} 过小，已抬升到 {:?}",
            interval, MIN_AUTO_PUSH_INTERVAL
        );
        return Ok(MIN_AUTO_PUSH_INTERVAL);
    }
    Ok(interval)
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.config.auto_push.session_id = session_id.into();
        self
    }

    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.config.auto_push.entity_id = entity_id.into();
        self
    }

    /// 设置自动推送间隔，不足 1 毫秒的部分向上取整
    pub fn auto_push_interval(mut self, interval: Duration) -> Self {
        let millis = interval.as_nanos().div_ceil(1_000_000);
        self.config.auto_push.interval_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    pub fn max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.config.auto_push.max_in_flight = max_in_flight;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}
