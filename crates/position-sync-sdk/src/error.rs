//! 错误类型
//!
//! 所有错误对单个请求而言都是终止性的：不会自动重试，也不会向上打断自动推送循环。

use crate::entity::EntityId;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PositionSyncError {
    /// 连接层失败（DNS、拒绝连接、超时）
    #[error("Transport error: {0}")]
    Transport(String),

    /// 非 2xx 响应，附带原始响应体
    #[error("Protocol error: HTTP {status} ({body})")]
    Protocol { status: u16, body: String },

    /// JSON 格式错误、字段类型不匹配、实体 ID 不是整数
    #[error("Parse error: {0}")]
    Parse(String),

    /// 拉取结果或推送请求引用了注册表中不存在的实体
    #[error("Entity index {entity_id} out of range (registry size {len})")]
    IndexOutOfRange { entity_id: EntityId, len: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl PositionSyncError {
    /// 错误类别名称，用于事件与日志
    pub fn kind(&self) -> &'static str {
        match self {
            PositionSyncError::Transport(_) => "transport",
            PositionSyncError::Protocol { .. } => "protocol",
            PositionSyncError::Parse(_) => "parse",
            PositionSyncError::IndexOutOfRange { .. } => "index_out_of_range",
            PositionSyncError::InvalidArgument(_) => "invalid_argument",
            PositionSyncError::InvalidOperation(_) => "invalid_operation",
            PositionSyncError::Config(_) => "config",
        }
    }

    /// 是否为网络请求本身的失败（传输层或协议层）
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            PositionSyncError::Transport(_) | PositionSyncError::Protocol { .. }
        )
    }
}

impl From<serde_json::Error> for PositionSyncError {
    fn from(error: serde_json::Error) -> Self {
        PositionSyncError::Parse(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PositionSyncError>;
