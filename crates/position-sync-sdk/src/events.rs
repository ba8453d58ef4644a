//! 事件系统模块
//!
//! 两类通知机制：
//! - `DataReceivedRegistry`：拉取成功回调槽，多订阅者，按注册顺序同步调用，支持取消订阅
//! - `EventManager`：同步过程中的所有事件（拉取、推送、自动推送循环、实体移动），
//!   通过 broadcast 广播，同时支持按类型注册监听器

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::entity::EntityId;
use crate::payload::{Position, PositionPayload};

/// 当前 UTC 毫秒时间戳
pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// 拉取成功回调
pub type DataReceivedCallback = Arc<dyn Fn(EntityId, &PositionPayload) + Send + Sync>;

/// 回调订阅句柄，用于取消订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// 拉取成功回调槽
#[derive(Default)]
pub struct DataReceivedRegistry {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(SubscriptionId, DataReceivedCallback)>>,
}

impl DataReceivedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: DataReceivedCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().push((id, callback));
        debug!("Data received subscriber added: {:?}", id);
        id
    }

    /// 取消订阅，返回该句柄此前是否存在
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        before != callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    /// 按注册顺序调用所有订阅者，返回调用的数量
    ///
    /// 调用前先复制订阅者列表，回调内可以安全地订阅/取消订阅
    pub fn dispatch(&self, entity_id: EntityId, payload: &PositionPayload) -> usize {
        let snapshot: Vec<DataReceivedCallback> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in &snapshot {
            callback(entity_id, payload);
        }
        snapshot.len()
    }
}

/// 同步事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
    /// 拉取成功
    PullSucceeded {
        session_id: String,
        entity_id: EntityId,
        payload: PositionPayload,
        timestamp: u64,
    },
    /// 拉取失败（传输、协议或解析错误）
    PullFailed {
        session_id: String,
        entity_id: String,
        error_kind: String,
        error: String,
        timestamp: u64,
    },
    /// 推送成功
    PushSucceeded {
        session_id: String,
        entity_id: String,
        payload: PositionPayload,
        timestamp: u64,
    },
    /// 推送失败
    PushFailed {
        session_id: String,
        entity_id: String,
        error_kind: String,
        error: String,
        timestamp: u64,
    },
    /// 自动推送循环启动
    AutoPushStarted {
        session_id: String,
        entity_id: String,
        interval_ms: u64,
        timestamp: u64,
    },
    /// 自动推送循环停止
    AutoPushStopped {
        session_id: String,
        entity_id: String,
        timestamp: u64,
    },
    /// 自动推送发出一次请求
    AutoPushTick {
        session_id: String,
        entity_id: String,
        payload: PositionPayload,
        timestamp: u64,
    },
    /// 进行中的推送达到上限，本次 tick 跳过
    AutoPushSkipped {
        session_id: String,
        entity_id: String,
        in_flight: usize,
        timestamp: u64,
    },
    /// 实体已按拉取结果移动
    EntityMoved {
        entity_id: EntityId,
        position: Position,
        timestamp: u64,
    },
    /// 拉取结果无法应用（实体不存在）
    PullResultDropped {
        entity_id: EntityId,
        error: String,
        timestamp: u64,
    },
}

impl SyncEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::PullSucceeded { .. } => "pull_succeeded",
            SyncEvent::PullFailed { .. } => "pull_failed",
            SyncEvent::PushSucceeded { .. } => "push_succeeded",
            SyncEvent::PushFailed { .. } => "push_failed",
            SyncEvent::AutoPushStarted { .. } => "auto_push_started",
            SyncEvent::AutoPushStopped { .. } => "auto_push_stopped",
            SyncEvent::AutoPushTick { .. } => "auto_push_tick",
            SyncEvent::AutoPushSkipped { .. } => "auto_push_skipped",
            SyncEvent::EntityMoved { .. } => "entity_moved",
            SyncEvent::PullResultDropped { .. } => "pull_result_dropped",
        }
    }

    /// 获取事件关联的会话ID
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SyncEvent::PullSucceeded { session_id, .. }
            | SyncEvent::PullFailed { session_id, .. }
            | SyncEvent::PushSucceeded { session_id, .. }
            | SyncEvent::PushFailed { session_id, .. }
            | SyncEvent::AutoPushStarted { session_id, .. }
            | SyncEvent::AutoPushStopped { session_id, .. }
            | SyncEvent::AutoPushTick { session_id, .. }
            | SyncEvent::AutoPushSkipped { session_id, .. } => Some(session_id),
            SyncEvent::EntityMoved { .. } | SyncEvent::PullResultDropped { .. } => None,
        }
    }

    /// 获取事件时间戳
    pub fn timestamp(&self) -> u64 {
        match self {
            SyncEvent::PullSucceeded { timestamp, .. }
            | SyncEvent::PullFailed { timestamp, .. }
            | SyncEvent::PushSucceeded { timestamp, .. }
            | SyncEvent::PushFailed { timestamp, .. }
            | SyncEvent::AutoPushStarted { timestamp, .. }
            | SyncEvent::AutoPushStopped { timestamp, .. }
            | SyncEvent::AutoPushTick { timestamp, .. }
            | SyncEvent::AutoPushSkipped { timestamp, .. }
            | SyncEvent::EntityMoved { timestamp, .. }
            | SyncEvent::PullResultDropped { timestamp, .. } => *timestamp,
        }
    }
}

/// 事件过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// 事件类型过滤器
    pub event_types: Option<Vec<String>>,
    /// 会话ID过滤器
    pub session_ids: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    pub fn with_session_ids(mut self, session_ids: Vec<String>) -> Self {
        self.session_ids = Some(session_ids);
        self
    }

    /// 检查事件是否匹配过滤器
    pub fn matches(&self, event: &SyncEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        if let Some(ref session_ids) = self.session_ids {
            match event.session_id() {
                Some(session_id) if session_ids.iter().any(|s| s == session_id) => {}
                // 事件没有会话ID但过滤器要求有
                _ => return false,
            }
        }

        true
    }
}

/// 事件监听器类型
pub type EventListener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 监听器数量
    pub listener_count: usize,
    /// 最后事件时间
    pub last_event_time: Option<u64>,
}

/// 事件管理器
pub struct EventManager {
    sender: broadcast::Sender<SyncEvent>,
    listeners: RwLock<HashMap<String, Vec<EventListener>>>,
    stats: RwLock<EventStats>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            listeners: RwLock::new(HashMap::new()),
            stats: RwLock::new(EventStats::default()),
        }
    }

    /// 发布事件
    ///
    /// 同步调用，可以在拉取回调等非异步上下文中使用
    pub fn emit(&self, event: SyncEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            *stats.events_by_type.entry(event.event_type().to_string()).or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 会失败，属正常场景
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        let listeners: Vec<EventListener> = {
            let listeners = self.listeners.read();
            listeners
                .get(event.event_type())
                .into_iter()
                .chain(listeners.get("*"))
                .flatten()
                .cloned()
                .collect()
        };
        for listener in listeners {
            listener(&event);
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// 订阅满足过滤条件的事件
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        FilteredEventReceiver::new(self.sender.subscribe(), filter)
    }

    /// 添加事件监听器，`event_type` 为 `"*"` 时监听全部事件
    pub fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write();
        listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Arc::new(listener));

        self.stats.write().listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    /// 移除所有监听器
    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
        self.stats.write().listener_count = 0;

        info!("Cleared all event listeners");
    }

    pub fn get_stats(&self) -> EventStats {
        self.stats.read().clone()
    }

    /// 获取活跃订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 过滤事件接收器
pub struct FilteredEventReceiver {
    receiver: broadcast::Receiver<SyncEvent>,
    filter: EventFilter,
}

impl FilteredEventReceiver {
    pub fn new(receiver: broadcast::Receiver<SyncEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// 接收下一个匹配的事件
    pub async fn recv(&mut self) -> Result<SyncEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// 尝试接收事件（非阻塞）
    pub fn try_recv(&mut self) -> Result<SyncEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// 事件生成器 - 辅助函数
pub mod event_builders {
    use super::*;
    use crate::error::PositionSyncError;

    pub fn pull_succeeded(
        session_id: &str,
        entity_id: EntityId,
        payload: PositionPayload,
    ) -> SyncEvent {
        SyncEvent::PullSucceeded {
            session_id: session_id.to_string(),
            entity_id,
            payload,
            timestamp: now_millis(),
        }
    }

    pub fn pull_failed(session_id: &str, entity_id: &str, error: &PositionSyncError) -> SyncEvent {
        SyncEvent::PullFailed {
            session_id: session_id.to_string(),
            entity_id: entity_id.to_string(),
            error_kind: error.kind().to_string(),
            error: error.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn push_succeeded(
        session_id: &str,
        entity_id: &str,
        payload: PositionPayload,
    ) -> SyncEvent {
        SyncEvent::PushSucceeded {
            session_id: session_id.to_string(),
            entity_id: entity_id.to_string(),
            payload,
            timestamp: now_millis(),
        }
    }

    pub fn push_failed(session_id: &str, entity_id: &str, error: &PositionSyncError) -> SyncEvent {
        SyncEvent::PushFailed {
            session_id: session_id.to_string(),
            entity_id: entity_id.to_string(),
            error_kind: error.kind().to_string(),
            error: error.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn entity_moved(entity_id: EntityId, position: Position) -> SyncEvent {
        SyncEvent::EntityMoved {
            entity_id,
            position,
            timestamp: now_millis(),
        }
    }

    pub fn pull_result_dropped(entity_id: EntityId, error: &PositionSyncError) -> SyncEvent {
        SyncEvent::PullResultDropped {
            entity_id,
            error: error.to_string(),
            timestamp: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_data_received_dispatch_order() {
        let registry = DataReceivedRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let calls = calls.clone();
            registry.subscribe(Arc::new(move |entity_id: EntityId, payload: &PositionPayload| {
                calls.lock().push((tag, entity_id, payload.x()));
            }));
        }

        let invoked = registry.dispatch(3, &PositionPayload::new(1.5, 0.0, -2.25));
        assert_eq!(invoked, 3);
        assert_eq!(
            *calls.lock(),
            vec![("first", 3, 1.5), ("second", 3, 1.5), ("third", 3, 1.5)]
        );
    }

    #[test]
    fn test_data_received_unsubscribe() {
        let registry = DataReceivedRegistry::new();
        let counter = Arc::new(AtomicU64::new(0));

        let c = counter.clone();
        let id = registry.subscribe(Arc::new(move |_: EntityId, _: &PositionPayload| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        registry.dispatch(0, &PositionPayload::default());

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert!(registry.is_empty());

        assert_eq!(registry.dispatch(0, &PositionPayload::default()), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let registry = Arc::new(DataReceivedRegistry::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let r = registry.clone();
        let s = slot.clone();
        let id = registry.subscribe(Arc::new(move |_: EntityId, _: &PositionPayload| {
            if let Some(id) = s.lock().take() {
                r.unsubscribe(id);
            }
        }));
        *slot.lock() = Some(id);

        registry.dispatch(1, &PositionPayload::default());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_event_manager_broadcast_and_stats() {
        let manager = EventManager::new(16);
        let mut receiver = manager.subscribe();
        let mut filtered = manager.subscribe_filtered(
            EventFilter::new().with_event_types(vec!["push_succeeded".to_string()]),
        );

        manager.emit(event_builders::pull_succeeded("g1", 3, PositionPayload::new(1.0, 2.0, 3.0)));
        manager.emit(event_builders::push_succeeded("g1", "3", PositionPayload::default()));

        assert_eq!(receiver.recv().await.unwrap().event_type(), "pull_succeeded");
        assert_eq!(receiver.recv().await.unwrap().event_type(), "push_succeeded");
        assert_eq!(filtered.recv().await.unwrap().event_type(), "push_succeeded");

        let stats = manager.get_stats();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.events_by_type.get("pull_succeeded"), Some(&1));
        assert!(stats.last_event_time.is_some());
    }

    #[test]
    fn test_event_listeners() {
        let manager = EventManager::new(16);
        let typed = Arc::new(AtomicU64::new(0));
        let wildcard = Arc::new(AtomicU64::new(0));

        let t = typed.clone();
        manager.add_listener("entity_moved", move |_| {
            t.fetch_add(1, Ordering::SeqCst);
        });
        let w = wildcard.clone();
        manager.add_listener("*", move |_| {
            w.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(manager.get_stats().listener_count, 2);

        manager.emit(event_builders::entity_moved(0, Position::ZERO));
        manager.emit(event_builders::push_succeeded("g1", "0", PositionPayload::default()));

        assert_eq!(typed.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard.load(Ordering::SeqCst), 2);

        manager.clear_listeners();
        assert_eq!(manager.get_stats().listener_count, 0);
    }

    #[test]
    fn test_event_filter_session() {
        let filter = EventFilter::new().with_session_ids(vec!["g1".to_string()]);

        let in_session = event_builders::push_succeeded("g1", "0", PositionPayload::default());
        let other_session = event_builders::push_succeeded("g2", "0", PositionPayload::default());

        assert!(filter.matches(&in_session));
        assert!(!filter.matches(&other_session));
        assert!(!filter.matches(&event_builders::entity_moved(0, Position::ZERO)));
    }
}
