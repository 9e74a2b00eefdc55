//! 状态定义
//!
//! - [`LifecycleState`]：编排器的全局状态
//! - [`ModuleState`]：单个模块走到了哪一步
//! - [`StateVariable`]：带订阅者列表的全局状态变量，提交后同步通知

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::utils::{generate_id, CoreError, Result};

/// 编排器全局状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// 未加载（初始状态）
    #[default]
    NotLoaded,
    /// 已构造、已校验依赖、已计算顺序
    Resolved,
    /// 所有参与启停的模块都已启动
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::NotLoaded => write!(f, "NOT_LOADED"),
            LifecycleState::Resolved => write!(f, "RESOLVED"),
            LifecycleState::Active => write!(f, "ACTIVE"),
        }
    }
}

/// 单个模块的生命周期进度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// 已构造
    Constructed,
    /// 已初始化
    Initialized,
    /// 运行中
    Running,
}

impl ModuleState {
    /// 是否需要 deinit
    pub fn is_initialized(&self) -> bool {
        matches!(self, ModuleState::Initialized | ModuleState::Running)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Constructed => write!(f, "constructed"),
            ModuleState::Initialized => write!(f, "initialized"),
            ModuleState::Running => write!(f, "running"),
        }
    }
}

/// 一次状态变更
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// 旧状态
    pub from: LifecycleState,
    /// 新状态
    pub to: LifecycleState,
    /// 提交时间
    pub at: DateTime<Utc>,
}

/// 状态观察者
pub type StateObserver = Arc<dyn Fn(StateTransition) + Send + Sync>;

/// 带订阅者的全局状态变量
///
/// 状态先提交，再在调用 [`set`](Self::set) 的任务上依次通知观察者。
/// 通知时不持有任何锁，观察者可以回头查询状态。
#[derive(Default)]
pub struct StateVariable {
    state: RwLock<LifecycleState>,
    observers: RwLock<Vec<(String, StateObserver)>>,
}

impl StateVariable {
    /// 创建状态变量，初始为 `NotLoaded`
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前状态
    pub async fn get(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// 设置状态
    ///
    /// 状态确实发生变化时通知观察者并返回这次变更，否则返回 `None`。
    pub async fn set(&self, to: LifecycleState) -> Option<StateTransition> {
        let transition = {
            let mut state = self.state.write().await;
            if *state == to {
                return None;
            }
            let from = std::mem::replace(&mut *state, to);
            StateTransition {
                from,
                to,
                at: Utc::now(),
            }
        };

        debug!(from = %transition.from, to = %transition.to, "全局状态变更");

        let observers: Vec<StateObserver> = self
            .observers
            .read()
            .await
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(transition);
        }

        Some(transition)
    }

    /// 订阅状态变更，返回订阅 ID
    pub async fn subscribe(&self, observer: StateObserver) -> String {
        let id = generate_id();
        self.observers.write().await.push((id.clone(), observer));
        debug!(subscription_id = %id, "新增状态订阅");
        id
    }

    /// 取消订阅
    ///
    /// # Errors
    ///
    /// 订阅 ID 不存在时返回 `SubscriptionNotFound`
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        let mut observers = self.observers.write().await;
        let position = observers
            .iter()
            .position(|(id, _)| id == subscription_id)
            .ok_or_else(|| CoreError::SubscriptionNotFound(subscription_id.to_string()))?;
        observers.remove(position);
        debug!(subscription_id = %subscription_id, "取消状态订阅");
        Ok(())
    }

    /// 当前订阅数
    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }
}

impl fmt::Debug for StateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateVariable").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (StateObserver, Arc<Mutex<Vec<(LifecycleState, LifecycleState)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: StateObserver = Arc::new(move |t: StateTransition| {
            sink.lock().unwrap().push((t.from, t.to));
        });
        (observer, seen)
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::NotLoaded.to_string(), "NOT_LOADED");
        assert_eq!(LifecycleState::Resolved.to_string(), "RESOLVED");
        assert_eq!(LifecycleState::Active.to_string(), "ACTIVE");
        assert_eq!(ModuleState::Running.to_string(), "running");
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&LifecycleState::NotLoaded).unwrap();
        assert_eq!(json, "\"NOT_LOADED\"");
        assert!(ModuleState::Running.is_initialized());
        assert!(!ModuleState::Constructed.is_initialized());
    }

    #[tokio::test]
    async fn test_set_notifies_on_change() {
        let variable = StateVariable::new();
        let (observer, seen) = recorder();
        variable.subscribe(observer).await;

        let transition = variable.set(LifecycleState::Resolved).await.unwrap();
        assert_eq!(transition.from, LifecycleState::NotLoaded);
        assert_eq!(transition.to, LifecycleState::Resolved);
        assert_eq!(variable.get().await, LifecycleState::Resolved);

        // 相同状态不通知
        assert!(variable.set(LifecycleState::Resolved).await.is_none());

        variable.set(LifecycleState::Active).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (LifecycleState::NotLoaded, LifecycleState::Resolved),
                (LifecycleState::Resolved, LifecycleState::Active),
            ]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let variable = StateVariable::new();
        let (observer, seen) = recorder();
        let id = variable.subscribe(observer).await;
        assert_eq!(variable.observer_count().await, 1);

        variable.unsubscribe(&id).await.unwrap();
        variable.set(LifecycleState::Resolved).await;
        assert!(seen.lock().unwrap().is_empty());

        let err = variable.unsubscribe(&id).await.unwrap_err();
        assert!(matches!(err, CoreError::SubscriptionNotFound(_)));
    }

    #[tokio::test]
    async fn test_observer_sees_committed_state() {
        let variable = Arc::new(StateVariable::new());
        let committed = Arc::new(Mutex::new(None));

        let (v, c) = (variable.clone(), committed.clone());
        variable
            .subscribe(Arc::new(move |_: StateTransition| {
                // 通知时状态锁已释放
                *c.lock().unwrap() = v.state.try_read().ok().map(|s| *s);
            }))
            .await;

        variable.set(LifecycleState::Resolved).await;
        assert_eq!(*committed.lock().unwrap(), Some(LifecycleState::Resolved));
    }
}
