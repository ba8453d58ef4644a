//! 位置同步客户端
//!
//! 功能包括：
//! - 拉取（GET）实体的权威位置，成功后通知所有 `on_data_received` 订阅者
//! - 推送（POST）本地位置，发出即忘
//! - 自动推送循环：按固定间隔采样位置并推送，不等待上一次推送完成
//!
//! 所有请求失败都只记录日志并发布事件，不会向调用方或自动推送循环传播。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{validate_interval, AutoPushConfig, SyncConfig};
use crate::endpoint::SyncEndpoint;
use crate::entity::{sample_position, EntityId, PositionSource};
use crate::error::{PositionSyncError, Result};
use crate::events::{
    event_builders, now_millis, DataReceivedRegistry, EventManager, SubscriptionId, SyncEvent,
};
use crate::http_client::PositionHttpClient;
use crate::payload::PositionPayload;

/// 一次成功拉取的结果
#[derive(Debug, Clone, PartialEq)]
pub struct PullResult {
    pub entity_id: EntityId,
    pub payload: PositionPayload,
}

/// 同步统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub pulls_succeeded: u64,
    pub pulls_failed: u64,
    pub pushes_succeeded: u64,
    pub pushes_failed: u64,
    /// 当前进行中的推送数
    pub pushes_in_flight: usize,
    /// 自动推送发出的请求数
    pub auto_push_ticks: u64,
    /// 因进行中推送达到上限而跳过的 tick 数
    pub auto_push_skipped: u64,
}

#[derive(Default)]
struct SyncCounters {
    pulls_succeeded: AtomicU64,
    pulls_failed: AtomicU64,
    pushes_succeeded: AtomicU64,
    pushes_failed: AtomicU64,
    pushes_in_flight: AtomicUsize,
    auto_push_ticks: AtomicU64,
    auto_push_skipped: AtomicU64,
}

impl SyncCounters {
    fn snapshot(&self) -> SyncStats {
        SyncStats {
            pulls_succeeded: self.pulls_succeeded.load(Ordering::Relaxed),
            pulls_failed: self.pulls_failed.load(Ordering::Relaxed),
            pushes_succeeded: self.pushes_succeeded.load(Ordering::Relaxed),
            pushes_failed: self.pushes_failed.load(Ordering::Relaxed),
            pushes_in_flight: self.pushes_in_flight.load(Ordering::Relaxed),
            auto_push_ticks: self.auto_push_ticks.load(Ordering::Relaxed),
            auto_push_skipped: self.auto_push_skipped.load(Ordering::Relaxed),
        }
    }
}

/// 正在运行的自动推送循环
struct AutoPushHandle {
    session_id: String,
    entity_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// 客户端共享状态，后台任务只持有这一层
struct SyncCore {
    http: PositionHttpClient,
    endpoint: RwLock<SyncEndpoint>,
    auto_push_config: AutoPushConfig,
    data_received: DataReceivedRegistry,
    event_manager: Arc<EventManager>,
    counters: SyncCounters,
    auto_push: Mutex<Option<AutoPushHandle>>,
}

/// 用户持有的句柄；最后一个句柄释放时停止自动推送
struct ClientHandle {
    core: Arc<SyncCore>,
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.core.stop_auto_push();
    }
}

/// 位置同步客户端
///
/// 可廉价克隆，所有克隆共享同一个端点、订阅者列表和自动推送循环
#[derive(Clone)]
pub struct SyncClient {
    handle: Arc<ClientHandle>,
}

impl SyncClient {
    /// 创建客户端，配置不合法时返回错误
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let http = PositionHttpClient::new(&config.http_client_config)?;
        let endpoint = SyncEndpoint::new(config.base_url.clone())?;

        let core = Arc::new(SyncCore {
            http,
            endpoint: RwLock::new(endpoint),
            auto_push_config: config.auto_push.clone(),
            data_received: DataReceivedRegistry::new(),
            event_manager: Arc::new(EventManager::new(config.event_buffer_size)),
            counters: SyncCounters::default(),
            auto_push: Mutex::new(None),
        });

        info!("✅ 位置同步客户端已创建 (base_url: {})", config.base_url);

        Ok(Self {
            handle: Arc::new(ClientHandle { core }),
        })
    }

    fn core(&self) -> &Arc<SyncCore> {
        &self.handle.core
    }

    /// 设置服务端基础 URL
    pub fn configure(&self, base_url: impl Into<String>) -> Result<()> {
        let endpoint = SyncEndpoint::new(base_url)?;
        endpoint.validate()?;
        info!("🔧 base_url 已更新: {}", endpoint.base_url());
        *self.core().endpoint.write() = endpoint;
        Ok(())
    }

    pub fn base_url(&self) -> String {
        self.core().endpoint.read().base_url().to_string()
    }

    /// 注册拉取成功回调，按注册顺序调用
    pub fn on_data_received<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(EntityId, &PositionPayload) + Send + Sync + 'static,
    {
        self.core().data_received.subscribe(Arc::new(callback))
    }

    /// 取消拉取成功回调
    pub fn remove_data_received(&self, id: SubscriptionId) -> bool {
        self.core().data_received.unsubscribe(id)
    }

    pub fn data_received_subscribers(&self) -> usize {
        self.core().data_received.len()
    }

    /// 拉取实体位置
    ///
    /// 失败只记录日志和 `PullFailed` 事件，不调用回调
    pub async fn pull(&self, session_id: &str, entity_id: &str) {
        self.core().pull(session_id, entity_id).await
    }

    /// 拉取实体位置但不通知订阅者，失败时返回具体错误
    pub async fn fetch(&self, session_id: &str, entity_id: &str) -> Result<PullResult> {
        self.core().fetch(session_id, entity_id).await
    }

    /// 推送位置，失败只记录日志和 `PushFailed` 事件
    pub async fn push(&self, session_id: &str, entity_id: &str, payload: PositionPayload) {
        self.core().push(session_id, entity_id, payload).await
    }

    /// 推送位置，失败时返回具体错误
    pub async fn send(
        &self,
        session_id: &str,
        entity_id: &str,
        payload: PositionPayload,
    ) -> Result<()> {
        self.core().send(session_id, entity_id, &payload).await
    }

    /// 启动自动推送循环
    ///
    /// 每个 tick 采样 `position_source`（不可用时使用原点），发出一次推送，
    /// 不等待其完成。间隔为零返回 `InvalidArgument`，过小的间隔会被抬升。
    pub fn start_auto_push(
        &self,
        session_id: impl Into<String>,
        entity_id: impl Into<String>,
        position_source: Arc<dyn PositionSource>,
        interval: Duration,
    ) -> Result<()> {
        let max_in_flight = self.core().auto_push_config.max_in_flight;
        SyncCore::start_auto_push(
            self.core(),
            session_id.into(),
            entity_id.into(),
            position_source,
            interval,
            max_in_flight,
        )
    }

    /// 按配置中的会话、实体和间隔启动自动推送
    pub fn start_auto_push_from_config(
        &self,
        position_source: Arc<dyn PositionSource>,
    ) -> Result<()> {
        let config = self.core().auto_push_config.clone();
        let interval = config.interval();
        self.start_auto_push(config.session_id, config.entity_id, position_source, interval)
    }

    /// 停止自动推送循环，返回之前是否在运行
    ///
    /// 未运行时为空操作；进行中的推送会正常完成
    pub fn stop_auto_push(&self) -> bool {
        self.core().stop_auto_push()
    }

    pub fn is_auto_pushing(&self) -> bool {
        self.core()
            .auto_push
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    pub fn events(&self) -> Arc<EventManager> {
        self.core().event_manager.clone()
    }

    pub fn stats(&self) -> SyncStats {
        self.core().counters.snapshot()
    }
}

impl SyncCore {
    fn url_for(&self, session_id: &str, entity_id: &str) -> Result<reqwest::Url> {
        self.endpoint.read().url_for(session_id, entity_id)
    }

    async fn fetch(&self, session_id: &str, entity_id: &str) -> Result<PullResult> {
        let url = self.url_for(session_id, entity_id)?;
        let payload = self.http.get_position(&url).await?;
        let entity_id = parse_entity_id(entity_id)?;
        Ok(PullResult { entity_id, payload })
    }

    async fn pull(&self, session_id: &str, entity_id: &str) {
        match self.fetch(session_id, entity_id).await {
            Ok(result) => {
                self.counters.pulls_succeeded.fetch_add(1, Ordering::Relaxed);
                self.event_manager.emit(event_builders::pull_succeeded(
                    session_id,
                    result.entity_id,
                    result.payload,
                ));
                self.data_received.dispatch(result.entity_id, &result.payload);
            }
            Err(e) => {
                self.counters.pulls_failed.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️ 拉取失败 {}/{}: {}", session_id, entity_id, e);
                self.event_manager
                    .emit(event_builders::pull_failed(session_id, entity_id, &e));
            }
        }
    }

    async fn send(
        &self,
        session_id: &str,
        entity_id: &str,
        payload: &PositionPayload,
    ) -> Result<()> {
        let url = self.url_for(session_id, entity_id)?;
        self.http.post_position(&url, payload).await.map(|_| ())
    }

    async fn push(&self, session_id: &str, entity_id: &str, payload: PositionPayload) {
        self.counters.pushes_in_flight.fetch_add(1, Ordering::Relaxed);
        let result = self.send(session_id, entity_id, &payload).await;
        self.counters.pushes_in_flight.fetch_sub(1, Ordering::Relaxed);

        match result {
            Ok(()) => {
                self.counters.pushes_succeeded.fetch_add(1, Ordering::Relaxed);
                self.event_manager
                    .emit(event_builders::push_succeeded(session_id, entity_id, payload));
            }
            Err(e) => {
                self.counters.pushes_failed.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️ 推送失败 {}/{}: {}", session_id, entity_id, e);
                self.event_manager
                    .emit(event_builders::push_failed(session_id, entity_id, &e));
            }
        }
    }

    fn start_auto_push(
        core: &Arc<SyncCore>,
        session_id: String,
        entity_id: String,
        position_source: Arc<dyn PositionSource>,
        interval: Duration,
        max_in_flight: Option<usize>,
    ) -> Result<()> {
        let interval = validate_interval(interval)?;
        let url = core.url_for(&session_id, &entity_id)?;
        if max_in_flight == Some(0) {
            return Err(PositionSyncError::InvalidArgument(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        let mut auto_push = core.auto_push.lock();
        if let Some(existing) = auto_push.as_ref() {
            if !existing.task.is_finished() {
                return Err(PositionSyncError::InvalidOperation(format!(
                    "auto push already running for {}/{}",
                    existing.session_id, existing.entity_id
                )));
            }
        }

        let cancel = CancellationToken::new();
        let limiter = max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
        let task = tokio::spawn(run_auto_push_loop(
            Arc::downgrade(core),
            session_id.clone(),
            entity_id.clone(),
            position_source,
            interval,
            limiter,
            cancel.clone(),
        ));

        *auto_push = Some(AutoPushHandle {
            session_id: session_id.clone(),
            entity_id: entity_id.clone(),
            cancel,
            task,
        });
        drop(auto_push);

        info!(
            "▶️ 自动推送已启动: {} (间隔 {:?}, 并发上限 {:?})",
            url, interval, max_in_flight
        );
        core.event_manager.emit(SyncEvent::AutoPushStarted {
            session_id,
            entity_id,
            interval_ms: interval.as_millis() as u64,
            timestamp: now_millis(),
        });
        Ok(())
    }

    fn stop_auto_push(&self) -> bool {
        let Some(handle) = self.auto_push.lock().take() else {
            return false;
        };

        handle.cancel.cancel();
        info!("⏹️ 自动推送已停止: {}/{}", handle.session_id, handle.entity_id);
        self.event_manager.emit(SyncEvent::AutoPushStopped {
            session_id: handle.session_id,
            entity_id: handle.entity_id,
            timestamp: now_millis(),
        });
        true
    }

    /// 自动推送的单个 tick：采样、发出推送（不等待）
    fn auto_push_tick(
        core: &Arc<SyncCore>,
        session_id: &str,
        entity_id: &str,
        position_source: &dyn PositionSource,
        limiter: Option<&Arc<Semaphore>>,
    ) {
        let permit: Option<OwnedSemaphorePermit> = match limiter {
            Some(limiter) => match limiter.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    let in_flight = core.counters.pushes_in_flight.load(Ordering::Relaxed);
                    core.counters.auto_push_skipped.fetch_add(1, Ordering::Relaxed);
                    warn!("⚠️ 进行中的推送已达上限 ({})，跳过本次自动推送", in_flight);
                    core.event_manager.emit(SyncEvent::AutoPushSkipped {
                        session_id: session_id.to_string(),
                        entity_id: entity_id.to_string(),
                        in_flight,
                        timestamp: now_millis(),
                    });
                    return;
                }
            },
            None => None,
        };

        let payload = PositionPayload::from(sample_position(position_source));
        core.counters.auto_push_ticks.fetch_add(1, Ordering::Relaxed);

        {
            let core = core.clone();
            let session_id = session_id.to_string();
            let entity_id = entity_id.to_string();
            tokio::spawn(async move {
                let _permit = permit;
                core.push(&session_id, &entity_id, payload).await;
            });
        }

        let base_url = core.endpoint.read().base_url().to_string();
        info!("Auto POST requested to {}/{}/{}", base_url, session_id, entity_id);
        core.event_manager.emit(SyncEvent::AutoPushTick {
            session_id: session_id.to_string(),
            entity_id: entity_id.to_string(),
            payload,
            timestamp: now_millis(),
        });
    }
}

async fn run_auto_push_loop(
    weak_core: Weak<SyncCore>,
    session_id: String,
    entity_id: String,
    position_source: Arc<dyn PositionSource>,
    interval: Duration,
    limiter: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(core) = weak_core.upgrade() else {
            break;
        };
        SyncCore::auto_push_tick(
            &core,
            &session_id,
            &entity_id,
            position_source.as_ref(),
            limiter.as_ref(),
        );
    }
}

/// 严格解析实体 ID，非整数返回 `Parse`
pub fn parse_entity_id(entity_id: &str) -> Result<EntityId> {
    entity_id.parse::<EntityId>().map_err(|e| {
        PositionSyncError::Parse(format!("entity id {:?} is not an integer: {}", entity_id, e))
    })
}
