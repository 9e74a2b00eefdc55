//! # Chips Moduli - 薯片模块编排器
//!
//! 给定一组声明式的模块描述，编排器负责：
//!
//! - **模块构造**: 通过工厂按绑定名构造模块，并注入模块配置和全局配置
//! - **依赖解析**: 检查缺失依赖和循环依赖，计算确定的激活顺序
//! - **生命周期管理**: 按激活顺序 init/start（快速失败），按逆序 stop/deinit（尽力而为）
//! - **状态通知**: `NOT_LOADED -> RESOLVED -> ACTIVE -> RESOLVED`，变更后同步通知订阅者
//! - **日志系统**: 基于 tracing 的结构化日志
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use chips_moduli::{DescriptorFile, Module, ModuleFactory, ModuleManager};
//!
//! #[derive(Default)]
//! struct Database;
//!
//! #[async_trait]
//! impl Module for Database {
//!     async fn start(&self) -> anyhow::Result<()> {
//!         tracing::info!("数据库连接已建立");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = ModuleFactory::new().with_default::<Database>("database");
//!     let manager = ModuleManager::new(factory);
//!
//!     manager.load(&DescriptorFile::new("modules.yaml")).await?;
//!     manager.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     manager.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块描述、工厂、依赖图、生命周期和管理器
//! - `core` - 应用配置
//! - `utils` - 错误类型、ID 生成和日志系统

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    DependencyGraph, DescriptorFile, DescriptorFormat, DescriptorParser, DescriptorSource, Factory,
    LifecycleFault, LifecyclePhase, LifecycleState, Module, ModuleContext, ModuleDescriptor,
    ModuleFactory, ModuleInstance, ModuleManager, ModuleSet, ModuleState, Properties,
    StateTransition,
};

pub use utils::logger::{fields, LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use utils::{error_code, generate_id, generate_uuid, CoreError, Result};

pub use crate::core::config::{CoreConfig, CoreConfigBuilder, LogConfig, ModuliConfig};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
