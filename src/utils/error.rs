//! 模块编排器错误类型定义
//!
//! 本模块定义了编排器中使用的所有错误类型。
//!
//! 错误按阶段分组：
//! - 加载期错误：加载失败后注册表被清空，状态回到 `NotLoaded`
//! - 启动期错误：启动失败后状态保持 `Resolved`
//! - 停止期的单模块失败不会以错误形式返回，只记录为 [`LifecycleFault`](crate::module::LifecycleFault)

use thiserror::Error;

/// 编排器核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 加载期错误 ====================
    /// 模块 ID 重复
    #[error("模块 ID 重复: '{0}'")]
    DuplicateIdentity(String),

    /// 依赖模块未声明
    #[error("模块 '{module}' 的依赖 '{dependency}' 未找到")]
    MissingDependency {
        /// 声明依赖的模块
        module: String,
        /// 未能解析的依赖 ID
        dependency: String,
    },

    /// 循环依赖
    #[error("检测到循环依赖: {}", cycle.join(" -> "))]
    CyclicDependency {
        /// 环上的模块（首尾相同）
        cycle: Vec<String>,
    },

    /// 模块构造失败
    #[error("模块构造失败: '{module_id}' - {source}")]
    ConstructionFailure {
        /// 构造失败的模块
        module_id: String,
        /// 底层原因
        #[source]
        source: anyhow::Error,
    },

    /// 模块描述来源出错（文件缺失、格式错误等）
    #[error("模块描述加载失败: {0}")]
    LoadSource(#[source] anyhow::Error),

    // ==================== 启动期错误 ====================
    /// 模块初始化失败
    #[error("模块初始化失败: '{module_id}' - {source}")]
    InitFailure {
        /// 初始化失败的模块
        module_id: String,
        /// 底层原因
        #[source]
        source: anyhow::Error,
    },

    /// 模块启动失败
    #[error("模块启动失败: '{module_id}' - {source}")]
    StartFailure {
        /// 启动失败的模块
        module_id: String,
        /// 底层原因
        #[source]
        source: anyhow::Error,
    },

    // ==================== 查询错误 ====================
    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    /// 模块类型与请求的类型不符
    #[error("模块 '{module_id}' 不是类型 {expected}")]
    TypeMismatch {
        /// 模块 ID
        module_id: String,
        /// 请求的具体类型名
        expected: &'static str,
    },

    // ==================== 编排错误 ====================
    /// 当前状态不允许该操作
    #[error("当前状态 {state} 不允许执行 {operation}")]
    InvalidState {
        /// 操作名称
        operation: &'static str,
        /// 当前状态
        state: String,
    },

    /// 另一个阶段正在执行
    #[error("另一个生命周期操作正在执行，拒绝 {0}")]
    OperationInProgress(&'static str),

    /// 订阅未找到
    #[error("订阅未找到: '{0}'")]
    SubscriptionNotFound(String),

    // ==================== 描述与配置错误 ====================
    /// 无效的模块描述
    #[error("无效的模块描述: {0}")]
    InvalidDescriptor(String),

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 日志系统初始化失败
    #[error("日志系统初始化失败: {0}")]
    LoggerInitFailed(String),

    // ==================== IO 和序列化错误 ====================
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// 编排器操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    pub const MODULE_NOT_FOUND: &str = "MODULE-001";
    pub const MODULE_DUPLICATE_IDENTITY: &str = "MODULE-002";
    pub const MODULE_MISSING_DEPENDENCY: &str = "MODULE-003";
    pub const MODULE_CYCLIC_DEPENDENCY: &str = "MODULE-004";
    pub const MODULE_CONSTRUCTION_FAILED: &str = "MODULE-005";
    pub const MODULE_INIT_FAILED: &str = "MODULE-006";
    pub const MODULE_START_FAILED: &str = "MODULE-007";
    pub const MODULE_TYPE_MISMATCH: &str = "MODULE-008";

    // 编排错误 (MODULI-xxx)
    pub const MODULI_LOAD_SOURCE: &str = "MODULI-001";
    pub const MODULI_INVALID_STATE: &str = "MODULI-002";
    pub const MODULI_BUSY: &str = "MODULI-003";
    pub const MODULI_SUBSCRIPTION_NOT_FOUND: &str = "MODULI-004";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_INVALID_DESCRIPTOR: &str = "CONFIG-001";
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-002";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::ModuleNotFound(_) => error_code::MODULE_NOT_FOUND,
            CoreError::DuplicateIdentity(_) => error_code::MODULE_DUPLICATE_IDENTITY,
            CoreError::MissingDependency { .. } => error_code::MODULE_MISSING_DEPENDENCY,
            CoreError::CyclicDependency { .. } => error_code::MODULE_CYCLIC_DEPENDENCY,
            CoreError::ConstructionFailure { .. } => error_code::MODULE_CONSTRUCTION_FAILED,
            CoreError::InitFailure { .. } => error_code::MODULE_INIT_FAILED,
            CoreError::StartFailure { .. } => error_code::MODULE_START_FAILED,
            CoreError::TypeMismatch { .. } => error_code::MODULE_TYPE_MISMATCH,
            CoreError::LoadSource(_) => error_code::MODULI_LOAD_SOURCE,
            CoreError::InvalidState { .. } => error_code::MODULI_INVALID_STATE,
            CoreError::OperationInProgress(_) => error_code::MODULI_BUSY,
            CoreError::SubscriptionNotFound(_) => error_code::MODULI_SUBSCRIPTION_NOT_FOUND,
            CoreError::InvalidDescriptor(_) => error_code::CONFIG_INVALID_DESCRIPTOR,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            _ => "UNKNOWN",
        }
    }

    /// 是否为加载期错误
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            CoreError::DuplicateIdentity(_)
                | CoreError::MissingDependency { .. }
                | CoreError::CyclicDependency { .. }
                | CoreError::ConstructionFailure { .. }
                | CoreError::LoadSource(_)
        )
    }

    /// 是否为启动期错误
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            CoreError::InitFailure { .. } | CoreError::StartFailure { .. }
        )
    }

    /// 与错误相关的模块 ID（如有）
    pub fn module_id(&self) -> Option<&str> {
        match self {
            CoreError::DuplicateIdentity(id) | CoreError::ModuleNotFound(id) => Some(id),
            CoreError::MissingDependency { module, .. } => Some(module),
            CoreError::CyclicDependency { cycle } => cycle.first().map(String::as_str),
            CoreError::ConstructionFailure { module_id, .. }
            | CoreError::InitFailure { module_id, .. }
            | CoreError::StartFailure { module_id, .. }
            | CoreError::TypeMismatch { module_id, .. } => Some(module_id),
            _ => None,
        }
    }
}
