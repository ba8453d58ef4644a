//! 同步端点
//!
//! 请求 URL 形如 `{base}/{sessionId}/{entityId}`。基础 URL 中如果带有
//! `{sessionId}` / `{entityId}` 占位符，则就地替换；否则两个 ID 作为路径段追加。
//! 两个 ID 都是不透明字符串，拼接时做 URL 转义。

use reqwest::Url;

use crate::error::{PositionSyncError, Result};

/// 会话 ID 占位符
pub const SESSION_ID_PLACEHOLDER: &str = "{sessionId}";
/// 实体 ID 占位符
pub const ENTITY_ID_PLACEHOLDER: &str = "{entityId}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEndpoint {
    base_url: String,
}

impl SyncEndpoint {
    /// 创建端点，仅要求基础 URL 非空
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(PositionSyncError::InvalidArgument(
                "base_url must not be empty".to_string(),
            ));
        }
        Ok(Self {
            base_url: trimmed.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 基础 URL 是否使用占位符模板
    pub fn is_template(&self) -> bool {
        self.base_url.contains(SESSION_ID_PLACEHOLDER)
            || self.base_url.contains(ENTITY_ID_PLACEHOLDER)
    }

    /// 生成 `{session_id, entity_id}` 对应的请求 URL
    ///
    /// 空 ID 以及 `.` / `..` 会被 URL 解析为路径跳转，直接拒绝
    pub fn url_for(&self, session_id: &str, entity_id: &str) -> Result<Url> {
        check_id("session_id", session_id)?;
        check_id("entity_id", entity_id)?;

        if self.is_template() {
            let raw = self
                .base_url
                .replace(SESSION_ID_PLACEHOLDER, &escape_segment(session_id)?)
                .replace(ENTITY_ID_PLACEHOLDER, &escape_segment(entity_id)?);
            return parse_url(&raw);
        }

        let mut url = parse_url(self.base_url.trim_end_matches('/'))?;
        url.path_segments_mut()
            .map_err(|_| {
                PositionSyncError::Config(format!("base_url cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .push(session_id)
            .push(entity_id);
        Ok(url)
    }

    /// 校验基础 URL 可以解析
    pub fn validate(&self) -> Result<()> {
        self.url_for("session", "0").map(|_| ())
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw)
        .map_err(|e| PositionSyncError::Config(format!("invalid base_url {}: {}", raw, e)))
}

/// ID 必须非空，且不能是点路径段（`%2e` 同样按点段解析，无法转义）
fn check_id(name: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(PositionSyncError::InvalidArgument(format!("{} must not be empty", name)));
    }
    if id == "." || id == ".." {
        return Err(PositionSyncError::InvalidArgument(format!(
            "{} must not be a dot segment: {:?}",
            name, id
        )));
    }
    Ok(())
}

/// 按路径段规则转义单个 ID
fn escape_segment(segment: &str) -> Result<String> {
    check_id("id", segment)?;
    let mut scratch = parse_url("http://escape.invalid/")?;
    if let Ok(mut segments) = scratch.path_segments_mut() {
        segments.clear().push(segment);
    }
    Ok(scratch.path().trim_start_matches('/').to_string())
}
