//! 模块编排
//!
//! 包含模块编排的核心组件：
//! - 模块生命周期接口与实例句柄
//! - 模块描述与描述来源
//! - 模块工厂
//! - 注册表
//! - 依赖图（循环检测、拓扑排序）
//! - 生命周期驱动与全局状态
//! - 模块管理器

pub mod dependency;
pub mod descriptor;
pub mod factory;
pub mod instance;
pub mod lifecycle;
pub mod manager;
pub mod parser;
pub mod registry;
pub mod state;

// 重导出常用类型
pub use dependency::DependencyGraph;
pub use descriptor::{DescriptorSource, ModuleDescriptor, ModuleSet, Properties};
pub use factory::{Factory, ModuleContext, ModuleFactory};
pub use instance::{Module, ModuleInstance};
pub use lifecycle::{LifecycleDriver, LifecycleFault, LifecyclePhase};
pub use manager::ModuleManager;
pub use parser::{DescriptorFile, DescriptorFormat, DescriptorParser};
pub use registry::{ModuleEntry, ModuleRegistry};
pub use state::{LifecycleState, ModuleState, StateObserver, StateTransition, StateVariable};
