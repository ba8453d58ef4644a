//! 生命周期管理
//!
//! 宿主（游戏循环、服务进程）启动和退出时统一通知各模块：
//! 会话协调器在启动时订阅拉取结果，自动推送在启动时开始、退出时停止。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;

/// 生命周期回调 Hook
///
/// 各模块通过实现此 trait 来响应生命周期变化
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// 宿主启动时调用
    async fn on_start(&self) -> Result<()>;

    /// 宿主退出时调用
    async fn on_stop(&self) -> Result<()>;
}

/// 生命周期管理器
pub struct LifecycleManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// 注册生命周期回调 Hook
    pub fn register_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
        info!("✅ 生命周期 Hook 已注册: 当前共 {} 个", self.hooks.len());
    }

    /// 通知所有 Hook：宿主启动
    ///
    /// 按注册顺序执行，某个 Hook 失败时记录错误并继续执行其余 Hook，最后返回第一个错误
    pub async fn notify_start(&self) -> Result<()> {
        info!("🔄 通知所有模块：启动");

        let mut first_error = None;
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_start().await {
                warn!("⚠️ Hook #{} 启动失败: {}", index, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("✅ 所有模块启动完成");
                Ok(())
            }
        }
    }

    /// 通知所有 Hook：宿主退出
    ///
    /// 按注册的逆序执行，失败处理同 `notify_start`
    pub async fn notify_stop(&self) -> Result<()> {
        info!("🔄 通知所有模块：退出");

        let mut first_error = None;
        for (index, hook) in self.hooks.iter().enumerate().rev() {
            if let Err(e) = hook.on_stop().await {
                warn!("⚠️ Hook #{} 退出失败: {}", index, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("✅ 所有模块已退出");
                Ok(())
            }
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

mod auto_push_hook;
pub use auto_push_hook::AutoPushLifecycleHook;
