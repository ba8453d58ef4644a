//! 自动推送生命周期 Hook
//!
//! 启动时按配置开启自动推送，退出时停止

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::entity::PositionSource;
use crate::error::Result;
use crate::lifecycle::LifecycleHook;
use crate::sync_client::SyncClient;

pub struct AutoPushLifecycleHook {
    client: SyncClient,
    position_source: Arc<dyn PositionSource>,
}

impl AutoPushLifecycleHook {
    pub fn new(client: SyncClient, position_source: Arc<dyn PositionSource>) -> Self {
        Self {
            client,
            position_source,
        }
    }
}

#[async_trait]
impl LifecycleHook for AutoPushLifecycleHook {
    async fn on_start(&self) -> Result<()> {
        if self.client.is_auto_pushing() {
            info!("[AutoPush Hook] 自动推送已在运行，跳过");
            return Ok(());
        }
        self.client
            .start_auto_push_from_config(self.position_source.clone())?;
        info!("[AutoPush Hook] ✅ 自动推送已启动");
        Ok(())
    }

    async fn on_stop(&self) -> Result<()> {
        if self.client.stop_auto_push() {
            info!("[AutoPush Hook] ✅ 自动推送已停止");
        }
        Ok(())
    }
}
