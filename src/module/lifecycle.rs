//! 生命周期驱动
//!
//! 按给定顺序依次调用模块钩子，并记录每个模块走到了哪一步：
//!
//! - 初始化和启动按激活顺序执行，遇到第一个失败立即返回
//! - 停止和反初始化按停用顺序执行，单个模块失败只记录为 [`LifecycleFault`]
//!
//! 钩子逐个 `await`，不会有两个模块的钩子同时执行。

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::registry::ModuleEntry;
use super::state::ModuleState;
use crate::utils::{CoreError, Result};

/// 生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// 初始化
    Init,
    /// 启动
    Start,
    /// 停止
    Stop,
    /// 反初始化
    Deinit,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Init => write!(f, "init"),
            LifecyclePhase::Start => write!(f, "start"),
            LifecyclePhase::Stop => write!(f, "stop"),
            LifecyclePhase::Deinit => write!(f, "deinit"),
        }
    }
}

/// 停止期间单个模块的失败记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleFault {
    /// 出错的模块
    pub module_id: String,
    /// 出错的阶段
    pub phase: LifecyclePhase,
    /// 错误描述（含错误链）
    pub error: String,
    /// 发生时间
    pub at: DateTime<Utc>,
}

impl fmt::Display for LifecycleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.phase, self.module_id, self.error)
    }
}

/// 生命周期驱动器
#[derive(Debug, Default)]
pub struct LifecycleDriver {
    /// 模块状态：module_id -> ModuleState
    states: RwLock<HashMap<String, ModuleState>>,
    /// 最近一次停止产生的失败
    faults: RwLock<Vec<LifecycleFault>>,
}

impl LifecycleDriver {
    /// 创建驱动器
    pub fn new() -> Self {
        Self::default()
    }

    /// 重置为一组刚构造的模块
    pub async fn reset<'a>(&self, module_ids: impl IntoIterator<Item = &'a str>) {
        let mut states = self.states.write().await;
        states.clear();
        for id in module_ids {
            states.insert(id.to_string(), ModuleState::Constructed);
        }
        self.faults.write().await.clear();
    }

    /// 模块状态
    pub async fn state_of(&self, module_id: &str) -> Option<ModuleState> {
        self.states.read().await.get(module_id).copied()
    }

    /// 最近一次停止产生的失败
    pub async fn faults(&self) -> Vec<LifecycleFault> {
        self.faults.read().await.clone()
    }

    async fn set_state(&self, module_id: &str, state: ModuleState) {
        self.states.write().await.insert(module_id.to_string(), state);
        debug!(module_id = %module_id, state = %state, "模块状态已更新");
    }

    /// 按激活顺序初始化并启动
    ///
    /// 已初始化的模块不会再次初始化，已运行的模块不会再次启动，
    /// 所以失败后重试只会补上还没做完的部分。
    ///
    /// # Errors
    ///
    /// 第一个失败的 init 返回 `InitFailure`，此时不会启动任何模块；
    /// 第一个失败的 start 返回 `StartFailure`，后续模块不会收到 start。
    pub async fn start_all(&self, plan: &[ModuleEntry]) -> Result<()> {
        for entry in plan {
            let module_id = entry.id();
            if self.state_of(module_id).await != Some(ModuleState::Constructed) {
                debug!(module_id = %module_id, "模块已初始化，跳过");
                continue;
            }

            let started = Instant::now();
            debug!(module_id = %module_id, phase = "init", "初始化模块");
            entry.instance.module().init().await.map_err(|source| {
                error!(module_id = %module_id, phase = "init", error = %source, "模块初始化失败");
                CoreError::InitFailure {
                    module_id: module_id.to_string(),
                    source,
                }
            })?;
            self.set_state(module_id, ModuleState::Initialized).await;
            info!(
                module_id = %module_id,
                duration_ms = started.elapsed().as_millis() as u64,
                "模块初始化完成"
            );
        }

        for entry in plan.iter().filter(|e| e.participates()) {
            let module_id = entry.id();
            if self.state_of(module_id).await == Some(ModuleState::Running) {
                debug!(module_id = %module_id, "模块已在运行中，跳过");
                continue;
            }

            let started = Instant::now();
            debug!(module_id = %module_id, phase = "start", "启动模块");
            entry.instance.module().start().await.map_err(|source| {
                error!(module_id = %module_id, phase = "start", error = %source, "模块启动失败");
                CoreError::StartFailure {
                    module_id: module_id.to_string(),
                    source,
                }
            })?;
            self.set_state(module_id, ModuleState::Running).await;
            info!(
                module_id = %module_id,
                duration_ms = started.elapsed().as_millis() as u64,
                "模块启动完成"
            );
        }

        Ok(())
    }

    /// 按停用顺序停止并反初始化
    ///
    /// `plan` 按激活顺序给出，这里逆序遍历。只停止运行中的模块，
    /// 只反初始化已初始化的模块。单个模块失败不会中断后续调用，
    /// 失败会被记录并返回。
    pub async fn stop_all(&self, plan: &[ModuleEntry]) -> Vec<LifecycleFault> {
        let mut faults = Vec::new();

        for entry in plan.iter().rev().filter(|e| e.participates()) {
            let module_id = entry.id();
            if self.state_of(module_id).await != Some(ModuleState::Running) {
                continue;
            }

            debug!(module_id = %module_id, phase = "stop", "停止模块");
            if let Err(e) = entry.instance.module().stop().await {
                error!(module_id = %module_id, phase = "stop", error = %e, "模块停止失败，继续停止其余模块");
                faults.push(Self::fault(module_id, LifecyclePhase::Stop, &e));
            }
            // 失败也视为已停止，保证后面的 deinit 照常进行
            self.set_state(module_id, ModuleState::Initialized).await;
        }

        for entry in plan.iter().rev() {
            let module_id = entry.id();
            let initialized = self
                .state_of(module_id)
                .await
                .map(|s| s.is_initialized())
                .unwrap_or(false);
            if !initialized {
                continue;
            }

            debug!(module_id = %module_id, phase = "deinit", "反初始化模块");
            if let Err(e) = entry.instance.module().deinit().await {
                error!(module_id = %module_id, phase = "deinit", error = %e, "模块反初始化失败，继续处理其余模块");
                faults.push(Self::fault(module_id, LifecyclePhase::Deinit, &e));
            }
            self.set_state(module_id, ModuleState::Constructed).await;
        }

        *self.faults.write().await = faults.clone();
        faults
    }

    fn fault(module_id: &str, phase: LifecyclePhase, error: &anyhow::Error) -> LifecycleFault {
        LifecycleFault {
            module_id: module_id.to_string(),
            phase,
            error: format!("{:#}", error),
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::descriptor::ModuleDescriptor;
    use crate::module::instance::{Module, ModuleInstance};
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Probe {
        id: String,
        journal: Journal,
        fail_on: Option<LifecyclePhase>,
    }

    impl Probe {
        fn record(&self, phase: LifecyclePhase) -> anyhow::Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:{}", phase, self.id));
            if self.fail_on == Some(phase) {
                bail!("{} 在 {} 阶段失败", self.id, phase);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Module for Probe {
        async fn init(&self) -> anyhow::Result<()> {
            self.record(LifecyclePhase::Init)
        }
        async fn start(&self) -> anyhow::Result<()> {
            self.record(LifecyclePhase::Start)
        }
        async fn stop(&self) -> anyhow::Result<()> {
            self.record(LifecyclePhase::Stop)
        }
        async fn deinit(&self) -> anyhow::Result<()> {
            self.record(LifecyclePhase::Deinit)
        }
    }

    fn entry(id: &str, journal: &Journal, fail_on: Option<LifecyclePhase>) -> ModuleEntry {
        ModuleEntry {
            descriptor: ModuleDescriptor::new(id),
            instance: ModuleInstance::new(Probe {
                id: id.to_string(),
                journal: journal.clone(),
                fail_on,
            }),
        }
    }

    async fn driver_for(plan: &[ModuleEntry]) -> LifecycleDriver {
        let driver = LifecycleDriver::new();
        driver.reset(plan.iter().map(|e| e.id())).await;
        driver
    }

    fn take(journal: &Journal) -> Vec<String> {
        std::mem::take(&mut *journal.lock().unwrap())
    }

    #[tokio::test]
    async fn test_start_then_stop_order() {
        let journal = Journal::default();
        let plan = vec![entry("a", &journal, None), entry("b", &journal, None)];
        let driver = driver_for(&plan).await;

        driver.start_all(&plan).await.unwrap();
        assert_eq!(take(&journal), vec!["init:a", "init:b", "start:a", "start:b"]);
        assert_eq!(driver.state_of("a").await, Some(ModuleState::Running));

        let faults = driver.stop_all(&plan).await;
        assert!(faults.is_empty());
        assert_eq!(take(&journal), vec!["stop:b", "stop:a", "deinit:b", "deinit:a"]);
        assert_eq!(driver.state_of("b").await, Some(ModuleState::Constructed));
    }

    #[tokio::test]
    async fn test_init_only_module() {
        let journal = Journal::default();
        let mut cfg = entry("cfg", &journal, None);
        cfg.descriptor = cfg.descriptor.init_only();
        let plan = vec![cfg, entry("app", &journal, None)];
        let driver = driver_for(&plan).await;

        driver.start_all(&plan).await.unwrap();
        assert_eq!(take(&journal), vec!["init:cfg", "init:app", "start:app"]);
        assert_eq!(driver.state_of("cfg").await, Some(ModuleState::Initialized));

        driver.stop_all(&plan).await;
        assert_eq!(take(&journal), vec!["stop:app", "deinit:app", "deinit:cfg"]);
    }

    #[tokio::test]
    async fn test_init_failure_aborts() {
        let journal = Journal::default();
        let plan = vec![
            entry("a", &journal, None),
            entry("b", &journal, Some(LifecyclePhase::Init)),
            entry("c", &journal, None),
        ];
        let driver = driver_for(&plan).await;

        let err = driver.start_all(&plan).await.unwrap_err();
        assert!(matches!(err, CoreError::InitFailure { ref module_id, .. } if module_id == "b"));
        assert_eq!(take(&journal), vec!["init:a", "init:b"]);
        assert_eq!(driver.state_of("a").await, Some(ModuleState::Initialized));
        assert_eq!(driver.state_of("b").await, Some(ModuleState::Constructed));
    }

    #[tokio::test]
    async fn test_start_failure_and_retry() {
        let journal = Journal::default();
        let plan = vec![
            entry("a", &journal, None),
            entry("b", &journal, Some(LifecyclePhase::Start)),
            entry("c", &journal, None),
        ];
        let driver = driver_for(&plan).await;

        let err = driver.start_all(&plan).await.unwrap_err();
        assert!(matches!(err, CoreError::StartFailure { ref module_id, .. } if module_id == "b"));
        assert_eq!(
            take(&journal),
            vec!["init:a", "init:b", "init:c", "start:a", "start:b"]
        );

        // 重试不会重复初始化，也不会重复启动 a
        let _ = driver.start_all(&plan).await;
        assert_eq!(take(&journal), vec!["start:b"]);
    }

    #[tokio::test]
    async fn test_stop_failure_is_recorded() {
        let journal = Journal::default();
        let plan = vec![
            entry("a", &journal, None),
            entry("b", &journal, Some(LifecyclePhase::Stop)),
            entry("c", &journal, Some(LifecyclePhase::Deinit)),
        ];
        let driver = driver_for(&plan).await;
        driver.start_all(&plan).await.unwrap();
        take(&journal);

        let faults = driver.stop_all(&plan).await;
        assert_eq!(
            take(&journal),
            vec!["stop:c", "stop:b", "stop:a", "deinit:c", "deinit:b", "deinit:a"]
        );
        assert_eq!(faults.len(), 2);
        assert_eq!(faults[0].module_id, "b");
        assert_eq!(faults[0].phase, LifecyclePhase::Stop);
        assert_eq!(faults[1].module_id, "c");
        assert_eq!(faults[1].phase, LifecyclePhase::Deinit);
        assert_eq!(driver.faults().await, faults);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let journal = Journal::default();
        let plan = vec![entry("a", &journal, None)];
        let driver = driver_for(&plan).await;

        assert!(driver.stop_all(&plan).await.is_empty());
        assert!(take(&journal).is_empty());
    }

    #[test]
    fn test_fault_display() {
        let fault = LifecycleFault {
            module_id: "db".to_string(),
            phase: LifecyclePhase::Deinit,
            error: "连接已关闭".to_string(),
            at: Utc::now(),
        };
        assert_eq!(fault.to_string(), "[deinit] db: 连接已关闭");
    }
}
