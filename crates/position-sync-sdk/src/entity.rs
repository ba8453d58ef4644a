//! 实体层接口
//!
//! SDK 不直接操作场景对象，只通过以下能力与实体层交互：
//! - `PositionSource`：读取当前位置
//! - `MovementSink`：把实体移动到新位置
//! - `EntityRegistry`：按整数 ID 索引的有序实体列表

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{PositionSyncError, Result};
use crate::payload::Position;

/// 会话内实体 ID
pub type EntityId = i32;

/// 位置源
///
/// 返回 `None` 表示当前无法取得位置（实体尚未就绪、已销毁等）
pub trait PositionSource: Send + Sync {
    fn position(&self) -> Option<Position>;
}

impl<F> PositionSource for F
where
    F: Fn() -> Option<Position> + Send + Sync,
{
    fn position(&self) -> Option<Position> {
        self()
    }
}

/// 移动接口
pub trait MovementSink: Send + Sync {
    fn move_to(&self, position: Position);
}

/// 可同步实体：既能读位置，也能被移动
pub trait SyncEntity: PositionSource + MovementSink {}

impl<T> SyncEntity for T where T: PositionSource + MovementSink {}

/// 取样位置，源不可用时返回原点
pub fn sample_position(source: &dyn PositionSource) -> Position {
    source.position().unwrap_or(Position::ZERO)
}

/// 带兜底的位置源
///
/// 依次尝试主位置源、备用位置源；都不可用时返回 `None`，由调用方决定兜底值
#[derive(Default, Clone)]
pub struct FallbackPositionSource {
    primary: Option<Arc<dyn PositionSource>>,
    fallback: Option<Arc<dyn PositionSource>>,
}

impl FallbackPositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primary(mut self, source: Arc<dyn PositionSource>) -> Self {
        self.primary = Some(source);
        self
    }

    pub fn with_fallback(mut self, source: Arc<dyn PositionSource>) -> Self {
        self.fallback = Some(source);
        self
    }
}

impl PositionSource for FallbackPositionSource {
    fn position(&self) -> Option<Position> {
        if let Some(position) = self.primary.as_ref().and_then(|s| s.position()) {
            return Some(position);
        }
        let position = self.fallback.as_ref().and_then(|s| s.position());
        if position.is_some() {
            debug!("Primary position source unavailable, using fallback");
        }
        position
    }
}

/// 实体注册表
///
/// 读写锁保护，增删实体与进行中的拉取回调互斥
#[derive(Default)]
pub struct EntityRegistry {
    entities: RwLock<Vec<Arc<dyn SyncEntity>>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: Vec<Arc<dyn SyncEntity>>) -> Self {
        Self {
            entities: RwLock::new(entities),
        }
    }

    /// 注册实体，返回分配的 ID（即列表下标）
    pub fn register(&self, entity: Arc<dyn SyncEntity>) -> EntityId {
        let mut entities = self.entities.write();
        entities.push(entity);
        (entities.len() - 1) as EntityId
    }

    /// 按 ID 查找实体，越界返回 `IndexOutOfRange`
    pub fn get(&self, entity_id: EntityId) -> Result<Arc<dyn SyncEntity>> {
        let entities = self.entities.read();
        usize::try_from(entity_id)
            .ok()
            .and_then(|index| entities.get(index).cloned())
            .ok_or(PositionSyncError::IndexOutOfRange {
                entity_id,
                len: entities.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    pub fn clear(&self) {
        self.entities.write().clear();
    }
}
