//! 核心模块
//!
//! 包含应用配置。

pub mod config;

pub use config::{CoreConfig, CoreConfigBuilder, LogConfig, ModuliConfig};
