//! 模块描述解析器
//!
//! 从 YAML 或 JSON 文件读取 [`ModuleSet`]，并做格式层面的校验。
//! ID 是否唯一、依赖能否解析不在这里检查，它们由加载过程报告专门的错误。
//!
//! 文件格式：
//!
//! ```yaml
//! global_configuration:
//!   environment: production
//! modules:
//!   - id: config
//!     start: false
//!   - id: db
//!     implementation: postgres
//!     properties:
//!       url: postgres://localhost/app
//!     dependencies: [config]
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::module::descriptor::{DescriptorSource, ModuleSet};
use crate::utils::{CoreError, Result};

/// 描述文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFormat {
    /// YAML
    Yaml,
    /// JSON
    Json,
}

impl DescriptorFormat {
    /// 根据扩展名判断格式，`.json` 以外一律按 YAML 处理
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DescriptorFormat::Json,
            _ => DescriptorFormat::Yaml,
        }
    }
}

/// 模块描述解析器
#[derive(Debug, Clone, Default)]
pub struct DescriptorParser;

impl DescriptorParser {
    /// 从文件解析并校验
    ///
    /// # Errors
    ///
    /// - 文件不存在或无法读取时返回 IO 错误
    /// - 语法错误时返回 YAML/JSON 错误
    /// - 校验失败时返回 `InvalidDescriptor`
    pub async fn parse_file(path: &Path) -> Result<ModuleSet> {
        let content = tokio::fs::read_to_string(path).await?;
        let set = Self::parse_string(&content, DescriptorFormat::from_path(path))?;
        debug!(path = %path.display(), module_count = set.len(), "已解析模块描述文件");
        Ok(set)
    }

    /// 从字符串解析并校验
    pub fn parse_string(content: &str, format: DescriptorFormat) -> Result<ModuleSet> {
        let set: ModuleSet = match format {
            DescriptorFormat::Json => serde_json::from_str(content)?,
            DescriptorFormat::Yaml => serde_yaml::from_str(content)?,
        };
        Self::validate(&set)?;
        Ok(set)
    }

    /// 校验模块描述格式
    ///
    /// 收集所有问题后一并返回。
    pub fn validate(set: &ModuleSet) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        for (index, module) in set.modules.iter().enumerate() {
            if module.id.is_empty() {
                errors.push(format!("第 {} 个模块的 ID 不能为空", index + 1));
            } else if !Self::is_valid_module_id(&module.id) {
                errors.push(format!(
                    "模块 ID '{}' 格式无效，只允许字母、数字、下划线、连字符、点和冒号",
                    module.id
                ));
            }

            if let Some(binding) = &module.implementation {
                if binding.trim().is_empty() {
                    errors.push(format!("模块 '{}' 的实现绑定不能为空", module.id));
                }
            }

            for dependency in &module.dependencies {
                if dependency.is_empty() {
                    errors.push(format!("模块 '{}' 的依赖 ID 不能为空", module.id));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidDescriptor(errors.join("; ")))
        }
    }

    fn is_valid_module_id(id: &str) -> bool {
        id.chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
    }
}

/// 以文件作为模块描述来源
#[derive(Debug, Clone)]
pub struct DescriptorFile {
    path: PathBuf,
}

impl DescriptorFile {
    /// 创建文件来源
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DescriptorSource for DescriptorFile {
    async fn load_descriptors(&self) -> anyhow::Result<ModuleSet> {
        Ok(DescriptorParser::parse_file(&self.path).await?)
    }
}
