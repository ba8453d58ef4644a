//! 自动推送演示
//!
//! 本地玩家沿圆周移动并按间隔推送位置，同时周期性拉取另一个实体的位置。
//!
//! ```text
//! POSITION_SYNC_BASE_URL=http://localhost:5005/server \
//! POSITION_SYNC_INTERVAL_MS=500 \
//! cargo run --example auto_push_demo -- [config.json]
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use position_sync_sdk::{
    error::Result, AutoPushLifecycleHook, EntityRegistry, LifecycleManager, MovementSink, Position,
    PositionSource, SessionCoordinator, SyncClient, SyncConfig, SyncEntity,
};
use tracing::{info, warn};

/// 演示用实体
struct DemoEntity {
    name: &'static str,
    position: Mutex<Position>,
}

impl DemoEntity {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            position: Mutex::new(Position::ZERO),
        })
    }
}

impl PositionSource for DemoEntity {
    fn position(&self) -> Option<Position> {
        Some(*self.position.lock())
    }
}

impl MovementSink for DemoEntity {
    fn move_to(&self, position: Position) {
        info!("🎯 {} 移动到 {:?}", self.name, position);
        *self.position.lock() = position;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "position_sync_sdk=info,auto_push_demo=info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SyncConfig::from_json_file(path)?,
        None => SyncConfig::default(),
    }
    .apply_env_overrides()?;

    info!("🚀 base_url: {}, 会话: {}", config.base_url, config.auto_push.session_id);
    let session_id = config.auto_push.session_id.clone();
    let client = SyncClient::new(config)?;

    client.events().add_listener("*", |event| {
        info!("📣 {}", event.event_type());
    });

    let player = DemoEntity::new("player");
    let remote = DemoEntity::new("remote");

    let registry = EntityRegistry::new();
    let player_entity: Arc<dyn SyncEntity> = player.clone();
    let remote_entity: Arc<dyn SyncEntity> = remote.clone();
    registry.register(player_entity);
    let remote_id = registry.register(remote_entity);

    let coordinator = Arc::new(SessionCoordinator::new(
        session_id,
        client.clone(),
        Arc::new(registry),
    ));

    let mut lifecycle = LifecycleManager::new();
    lifecycle.register_hook(coordinator.clone());
    lifecycle.register_hook(Arc::new(AutoPushLifecycleHook::new(client.clone(), player.clone())));
    lifecycle.notify_start().await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let mut angle: f32 = 0.0;
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        angle += 0.1;
        *player.position.lock() = Position::new(angle.cos() * 5.0, 0.0, angle.sin() * 5.0);

        ticks += 1;
        if ticks % 20 == 0 {
            coordinator.request_pull(remote_id);
        }
    }

    if let Err(e) = lifecycle.notify_stop().await {
        warn!("⚠️ 退出时出错: {}", e);
    }
    info!("📊 {:?}", client.stats());
    Ok(())
}
