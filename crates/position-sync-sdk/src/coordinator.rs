//! 会话协调器
//!
//! 把一个会话内的实体列表和同步客户端连接起来：
//! 拉取成功后按实体 ID 找到对应实体并移动它，推送时从实体读取当前位置。

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::entity::{EntityId, EntityRegistry};
use crate::error::Result;
use crate::events::{event_builders, EventManager, SubscriptionId};
use crate::lifecycle::LifecycleHook;
use crate::payload::{Position, PositionPayload};
use crate::sync_client::SyncClient;

pub struct SessionCoordinator {
    session_id: String,
    client: SyncClient,
    entities: Arc<EntityRegistry>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl SessionCoordinator {
    pub fn new(
        session_id: impl Into<String>,
        client: SyncClient,
        entities: Arc<EntityRegistry>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            client,
            entities,
            subscription: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn client(&self) -> &SyncClient {
        &self.client
    }

    pub fn entities(&self) -> &Arc<EntityRegistry> {
        &self.entities
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// 订阅拉取结果，重复调用不会重复订阅
    ///
    /// 返回本次是否新建了订阅
    pub fn on_start(&self) -> bool {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            debug!("Session {} already subscribed", self.session_id);
            return false;
        }

        let entities = self.entities.clone();
        let events = self.client.events();
        let id = self.client.on_data_received(move |entity_id, payload| {
            // 回调里的失败只能记录，不能打断拉取流程
            let _ = apply_pull_result(&entities, &events, entity_id, payload);
        });
        *subscription = Some(id);

        info!("✅ 会话 {} 已订阅拉取结果", self.session_id);
        true
    }

    /// 取消订阅，返回之前是否已订阅
    pub fn shutdown(&self) -> bool {
        let Some(id) = self.subscription.lock().take() else {
            return false;
        };
        self.client.remove_data_received(id);
        info!("会话 {} 已取消订阅拉取结果", self.session_id);
        true
    }

    /// 拉取实体位置，结果通过订阅回调应用
    pub fn request_pull(&self, entity_id: EntityId) -> JoinHandle<()> {
        let client = self.client.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            client.pull(&session_id, &entity_id.to_string()).await;
        })
    }

    /// 把拉取结果应用到实体
    ///
    /// 实体不存在时返回 `IndexOutOfRange`，同时记录日志和 `PullResultDropped` 事件
    pub fn on_pull_result(&self, entity_id: EntityId, payload: &PositionPayload) -> Result<()> {
        apply_pull_result(&self.entities, &self.client.events(), entity_id, payload)
    }

    /// 推送实体当前位置
    ///
    /// 实体不存在时直接返回错误，不发出请求
    pub fn request_push(&self, entity_id: EntityId) -> Result<JoinHandle<()>> {
        let entity = self.entities.get(entity_id)?;
        let payload = PositionPayload::from(entity.position().unwrap_or(Position::ZERO));

        let client = self.client.clone();
        let session_id = self.session_id.clone();
        Ok(tokio::spawn(async move {
            client.push(&session_id, &entity_id.to_string(), payload).await;
        }))
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn apply_pull_result(
    entities: &EntityRegistry,
    events: &EventManager,
    entity_id: EntityId,
    payload: &PositionPayload,
) -> Result<()> {
    let entity = match entities.get(entity_id) {
        Ok(entity) => entity,
        Err(e) => {
            error!("❌ 丢弃拉取结果: {}", e);
            events.emit(event_builders::pull_result_dropped(entity_id, &e));
            return Err(e);
        }
    };

    let position = payload.position();
    entity.move_to(position);
    debug!("Entity {} moved to {:?}", entity_id, position);
    events.emit(event_builders::entity_moved(entity_id, position));
    Ok(())
}

#[async_trait]
impl LifecycleHook for SessionCoordinator {
    async fn on_start(&self) -> Result<()> {
        SessionCoordinator::on_start(self);
        Ok(())
    }

    async fn on_stop(&self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}
