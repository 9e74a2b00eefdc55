//! 模块管理器
//!
//! 整合注册表、依赖图、生命周期驱动和全局状态，提供统一的编排接口：
//!
//! ```text
//! NOT_LOADED --load--> RESOLVED --start--> ACTIVE --stop--> RESOLVED
//!     ^                    |                  |
//!     +------ load --------+------ load ------+
//! ```
//!
//! `load`、`start`、`stop` 互斥执行。阶段执行期间再次调用（包括在模块钩子里调用）
//! 不会等待：`load`/`start` 返回 `OperationInProgress`，`stop` 记录警告后直接返回。

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use super::dependency::DependencyGraph;
use super::descriptor::{DescriptorSource, Properties};
use super::factory::{Factory, ModuleContext, ModuleFactory};
use super::instance::Module;
use super::lifecycle::{LifecycleDriver, LifecycleFault};
use super::registry::{ModuleEntry, ModuleRegistry};
use super::state::{LifecycleState, ModuleState, StateTransition, StateVariable};
use crate::utils::{generate_uuid, CoreError, Result};

/// 一次成功加载的结果，加载完成后只读
#[derive(Debug, Default)]
struct LoadedModules {
    /// 加载批次 ID
    load_id: Option<String>,
    /// 全局配置
    global: Properties,
    /// 注册表
    registry: ModuleRegistry,
    /// 按激活顺序排列的模块
    plan: Vec<ModuleEntry>,
}

/// 模块管理器
///
/// # 示例
///
/// ```rust
/// use chips_moduli::module::{LifecycleState, Module, ModuleDescriptor, ModuleFactory, ModuleManager};
///
/// #[derive(Default)]
/// struct Db;
/// impl Module for Db {}
///
/// #[derive(Default)]
/// struct Api;
/// impl Module for Api {}
///
/// # #[tokio::main]
/// # async fn main() {
/// let factory = ModuleFactory::new()
///     .with_default::<Db>("db")
///     .with_default::<Api>("api");
/// let manager = ModuleManager::new(factory);
///
/// let modules = vec![
///     ModuleDescriptor::new("api").depends_on("db"),
///     ModuleDescriptor::new("db"),
/// ];
/// manager.load(&modules).await.unwrap();
/// assert_eq!(manager.activation_order().await, vec!["db", "api"]);
///
/// manager.start().await.unwrap();
/// assert_eq!(manager.current_state().await, LifecycleState::Active);
///
/// manager.stop().await;
/// assert_eq!(manager.current_state().await, LifecycleState::Resolved);
/// # }
/// ```
pub struct ModuleManager {
    /// 模块工厂
    factory: Arc<dyn Factory>,
    /// 全局状态
    state: StateVariable,
    /// 当前加载的模块（整体替换）
    loaded: RwLock<Arc<LoadedModules>>,
    /// 生命周期驱动
    lifecycle: LifecycleDriver,
    /// 阶段锁，保证 load/start/stop 互斥
    phase_lock: Mutex<()>,
}

impl ModuleManager {
    /// 使用注册表工厂创建管理器
    pub fn new(factory: ModuleFactory) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    /// 使用自定义工厂创建管理器
    pub fn with_factory(factory: Arc<dyn Factory>) -> Self {
        Self {
            factory,
            state: StateVariable::new(),
            loaded: RwLock::new(Arc::new(LoadedModules::default())),
            lifecycle: LifecycleDriver::new(),
            phase_lock: Mutex::new(()),
        }
    }

    // ==================== 生命周期 ====================

    /// 加载模块集合
    ///
    /// 清空之前的模块，按声明顺序构造新模块，校验依赖并计算激活顺序。
    /// 在 `Active` 状态下重新加载不会停止旧模块，调用方应先调用 [`stop`](Self::stop)。
    ///
    /// # Errors
    ///
    /// `LoadSource`、`DuplicateIdentity`、`ConstructionFailure`、
    /// `MissingDependency`、`CyclicDependency`。失败后注册表为空，状态为 `NotLoaded`。
    /// 另一个阶段正在执行时返回 `OperationInProgress`。
    #[instrument(skip(self, source), fields(load_id = tracing::field::Empty))]
    pub async fn load<S>(&self, source: &S) -> Result<()>
    where
        S: DescriptorSource + ?Sized,
    {
        let _phase = self
            .phase_lock
            .try_lock()
            .map_err(|_| CoreError::OperationInProgress("load"))?;

        let load_id = generate_uuid();
        tracing::Span::current().record("load_id", load_id.as_str());

        if self.state.get().await == LifecycleState::Active {
            warn!("在 ACTIVE 状态下重新加载，旧模块不会被停止");
        }

        *self.loaded.write().await = Arc::new(LoadedModules::default());
        self.lifecycle.reset(std::iter::empty()).await;
        self.state.set(LifecycleState::NotLoaded).await;

        let loaded = match self.resolve(source, load_id).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(error_code = e.error_code(), error = %e, "模块加载失败");
                return Err(e);
            }
        };

        let module_count = loaded.plan.len();
        self.lifecycle
            .reset(loaded.plan.iter().map(ModuleEntry::id))
            .await;
        *self.loaded.write().await = Arc::new(loaded);
        self.state.set(LifecycleState::Resolved).await;

        info!(module_count, "模块加载完成");
        Ok(())
    }

    /// 加载模块集合，失败时只记录日志
    ///
    /// 返回是否加载成功。
    pub async fn load_safe<S>(&self, source: &S) -> bool
    where
        S: DescriptorSource + ?Sized,
    {
        match self.load(source).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "模块加载失败，已忽略");
                false
            }
        }
    }

    /// 读取描述、构造模块、构建依赖图
    async fn resolve<S>(&self, source: &S, load_id: String) -> Result<LoadedModules>
    where
        S: DescriptorSource + ?Sized,
    {
        let set = source
            .load_descriptors()
            .await
            .map_err(CoreError::LoadSource)?;
        debug!(module_count = set.len(), "已读取模块描述");

        let mut registry = ModuleRegistry::new();
        for descriptor in set.modules {
            if registry.is_loaded(&descriptor.id) {
                return Err(CoreError::DuplicateIdentity(descriptor.id));
            }

            let ctx = ModuleContext::new(&descriptor, &set.global_configuration);
            let instance = self.factory.construct(&ctx).await.map_err(|source| {
                CoreError::ConstructionFailure {
                    module_id: descriptor.id.clone(),
                    source,
                }
            })?;
            debug!(
                module_id = %descriptor.id,
                binding = %ctx.binding,
                type_name = instance.type_name(),
                "模块已构造"
            );
            registry.register(descriptor, instance)?;
        }

        let graph = DependencyGraph::build(
            registry
                .entries()
                .map(|e| (e.id(), e.descriptor.dependencies.as_slice())),
        )?;
        let order = graph.activation_order()?;
        debug!(order = ?order, "激活顺序已确定");

        let plan = registry.ordered(&order);
        Ok(LoadedModules {
            load_id: Some(load_id),
            global: set.global_configuration,
            registry,
            plan,
        })
    }

    /// 按激活顺序初始化并启动所有模块
    ///
    /// 已经是 `Active` 时记录警告并直接返回。
    ///
    /// # Errors
    ///
    /// - 尚未加载时返回 `InvalidState`
    /// - 任一模块初始化失败返回 `InitFailure`，启动失败返回 `StartFailure`，
    ///   此时状态保持 `Resolved`，已启动的模块不会被自动停止
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let _phase = self
            .phase_lock
            .try_lock()
            .map_err(|_| CoreError::OperationInProgress("start"))?;

        match self.state.get().await {
            LifecycleState::NotLoaded => Err(CoreError::InvalidState {
                operation: "start",
                state: LifecycleState::NotLoaded.to_string(),
            }),
            LifecycleState::Active => {
                warn!("模块已全部启动，忽略 start");
                Ok(())
            }
            LifecycleState::Resolved => {
                let loaded = self.snapshot().await;
                info!(module_count = loaded.plan.len(), "开始启动模块");

                self.lifecycle.start_all(&loaded.plan).await?;
                self.state.set(LifecycleState::Active).await;

                info!("所有模块已启动");
                Ok(())
            }
        }
    }

    /// 按停用顺序停止并反初始化所有模块
    ///
    /// 从不返回错误：单个模块的失败记录在 [`last_faults`](Self::last_faults) 中，
    /// 其余模块照常处理。在 `Resolved` 状态下调用会清理启动失败后残留的模块，
    /// 在 `NotLoaded` 状态下什么也不做。
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let Ok(_phase) = self.phase_lock.try_lock() else {
            warn!("另一个生命周期操作正在执行，忽略 stop");
            return;
        };

        if self.state.get().await == LifecycleState::NotLoaded {
            debug!("尚未加载模块，忽略 stop");
            return;
        }

        let loaded = self.snapshot().await;
        info!(module_count = loaded.plan.len(), "开始停止模块");

        let faults = self.lifecycle.stop_all(&loaded.plan).await;
        self.state.set(LifecycleState::Resolved).await;

        if faults.is_empty() {
            info!("所有模块已停止");
        } else {
            warn!(fault_count = faults.len(), "模块已停止，部分模块出错");
        }
    }

    // ==================== 查询 ====================

    async fn snapshot(&self) -> Arc<LoadedModules> {
        self.loaded.read().await.clone()
    }

    /// 按 ID 获取模块，任何状态下都可以调用
    ///
    /// # Errors
    ///
    /// 未加载时返回 `ModuleNotFound`
    pub async fn get_module(&self, module_id: &str) -> Result<Arc<dyn Module>> {
        let loaded = self.snapshot().await;
        let entry = loaded.registry.get(module_id)?;
        Ok(entry.instance.module().clone())
    }

    /// 按 ID 和具体类型获取模块
    ///
    /// # Errors
    ///
    /// 未加载时返回 `ModuleNotFound`，类型不符时返回 `TypeMismatch`
    pub async fn get_module_as<T: Module>(&self, module_id: &str) -> Result<Arc<T>> {
        let loaded = self.snapshot().await;
        let entry = loaded.registry.get(module_id)?;
        entry
            .instance
            .downcast::<T>()
            .ok_or_else(|| CoreError::TypeMismatch {
                module_id: module_id.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// 模块是否已加载
    pub async fn is_module_loaded(&self, module_id: &str) -> bool {
        self.snapshot().await.registry.is_loaded(module_id)
    }

    /// 所有模块实例（声明顺序）
    pub async fn modules(&self) -> Vec<Arc<dyn Module>> {
        self.snapshot()
            .await
            .registry
            .entries()
            .map(|e| e.instance.module().clone())
            .collect()
    }

    /// 所有模块 ID（声明顺序）
    pub async fn module_ids(&self) -> Vec<String> {
        self.snapshot().await.registry.ids()
    }

    /// 激活顺序
    pub async fn activation_order(&self) -> Vec<String> {
        self.snapshot()
            .await
            .plan
            .iter()
            .map(|e| e.id().to_string())
            .collect()
    }

    /// 停用顺序，恰为激活顺序的逆序
    pub async fn deactivation_order(&self) -> Vec<String> {
        let mut order = self.activation_order().await;
        order.reverse();
        order
    }

    /// 当前全局状态
    pub async fn current_state(&self) -> LifecycleState {
        self.state.get().await
    }

    /// 单个模块的生命周期进度
    pub async fn module_state(&self, module_id: &str) -> Option<ModuleState> {
        self.lifecycle.state_of(module_id).await
    }

    /// 全局配置
    pub async fn global_configuration(&self) -> Properties {
        self.snapshot().await.global.clone()
    }

    /// 模块配置，任何状态下都可以读取
    ///
    /// # Errors
    ///
    /// 未加载时返回 `ModuleNotFound`
    pub async fn module_properties(&self, module_id: &str) -> Result<Properties> {
        let loaded = self.snapshot().await;
        Ok(loaded.registry.get(module_id)?.descriptor.properties.clone())
    }

    /// 当前加载批次 ID
    pub async fn load_id(&self) -> Option<String> {
        self.snapshot().await.load_id.clone()
    }

    /// 最近一次停止时记录的失败
    pub async fn last_faults(&self) -> Vec<LifecycleFault> {
        self.lifecycle.faults().await
    }

    // ==================== 订阅 ====================

    /// 订阅全局状态变更，返回订阅 ID
    ///
    /// 观察者在执行状态变更的任务上同步调用，调用时不持有管理器的锁。
    pub async fn subscribe<F>(&self, observer: F) -> String
    where
        F: Fn(StateTransition) + Send + Sync + 'static,
    {
        self.state.subscribe(Arc::new(observer)).await
    }

    /// 取消订阅
    ///
    /// # Errors
    ///
    /// 订阅 ID 不存在时返回 `SubscriptionNotFound`
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        self.state.unsubscribe(subscription_id).await
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager").finish_non_exhaustive()
    }
}
