//! Position Sync SDK - 基于 HTTP 的实体位置同步 SDK
//!
//! 本 SDK 把本地实体的三维位置与远端位置服务保持同步：
//! - 📥 拉取：GET `{base}/{sessionId}/{entityId}`，成功后通知订阅者并移动对应实体
//! - 📤 推送：POST 同一路径，JSON 格式 `{"posX":..,"posY":..,"posZ":..}`
//! - 🔁 自动推送：按固定间隔采样位置并推送，发出即忘
//! - ⚙️ 事件系统：拉取、推送、自动推送循环的统一事件与统计
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use position_sync_sdk::{
//!     EntityRegistry, Position, SessionCoordinator, SyncClient, SyncConfig, SyncEntity,
//! };
//!
//! # struct Player;
//! # impl position_sync_sdk::PositionSource for Player {
//! #     fn position(&self) -> Option<Position> { Some(Position::ZERO) }
//! # }
//! # impl position_sync_sdk::MovementSink for Player {
//! #     fn move_to(&self, _position: Position) {}
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::builder()
//!         .base_url("http://localhost:5005/server")
//!         .build();
//!     let client = SyncClient::new(config)?;
//!
//!     let player = Arc::new(Player);
//!     let registry = EntityRegistry::new();
//!     let entity: Arc<dyn SyncEntity> = player.clone();
//!     let player_id = registry.register(entity);
//!
//!     // 拉取结果自动应用到实体
//!     let registry = Arc::new(registry);
//!     let coordinator = SessionCoordinator::new("defaultGame", client.clone(), registry);
//!     coordinator.on_start();
//!     coordinator.request_pull(player_id).await?;
//!
//!     // 每秒推送一次玩家位置
//!     client.start_auto_push("defaultGame", "0", player, Duration::from_secs(1))?;
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     client.stop_auto_push();
//!
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod entity;
pub mod error;
pub mod events;
pub mod http_client;
pub mod lifecycle;
pub mod payload;
pub mod sync_client;
pub mod version;

#[cfg(test)]
mod test_support;

// 重新导出核心类型，方便使用
pub use config::{AutoPushConfig, HttpClientConfig, SyncConfig, SyncConfigBuilder};
pub use coordinator::SessionCoordinator;
pub use endpoint::SyncEndpoint;
pub use entity::{
    sample_position, EntityId, EntityRegistry, FallbackPositionSource, MovementSink,
    PositionSource, SyncEntity,
};
pub use error::{PositionSyncError, Result};
pub use events::{EventFilter, EventManager, EventStats, SubscriptionId, SyncEvent};
pub use http_client::PositionHttpClient;
pub use lifecycle::{AutoPushLifecycleHook, LifecycleHook, LifecycleManager};
pub use payload::{Position, PositionPayload};
pub use sync_client::{PullResult, SyncClient, SyncStats};
pub use version::SDK_VERSION;
