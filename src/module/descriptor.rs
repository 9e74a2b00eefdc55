//! 模块描述
//!
//! 描述在构造之前声明一个模块：ID、实现绑定、配置、依赖和是否参与启停。
//! 编排器只消费 [`ModuleSet`]，描述从哪里来由 [`DescriptorSource`] 决定。

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 不透明的配置块
///
/// 对编排器来说只是一个 JSON 值，模块构造时按点分路径取值。
///
/// ```rust
/// use chips_moduli::module::Properties;
/// use serde_json::json;
///
/// let props = Properties::from(json!({ "server": { "port": 8080, "hosts": ["a", "b"] } }));
/// assert_eq!(props.get::<u16>("server.port"), Some(8080));
/// assert_eq!(props.get_str("server.hosts.1"), Some("b"));
/// assert_eq!(props.get_or("server.timeout", 30u64), 30);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(Value);

impl Properties {
    /// 空配置
    pub fn empty() -> Self {
        Self(Value::Null)
    }

    /// 是否为空（null 或空对象）
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// 原始 JSON 值
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// 按点分路径查找，数组用数字下标；空路径返回根
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.0);
        }
        path.split('.').try_fold(&self.0, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// 按路径取值并反序列化为 `T`，路径不存在或类型不符时返回 `None`
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.lookup(path)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// 按路径取字符串
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.lookup(path).and_then(Value::as_str)
    }

    /// 按路径取值，失败时返回默认值
    pub fn get_or<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        self.get(path).unwrap_or(default)
    }
}

impl From<Value> for Properties {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn default_true() -> bool {
    true
}

/// 单个模块的描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// 模块 ID，在一次加载中唯一
    pub id: String,

    /// 实现绑定，缺省时使用 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,

    /// 模块配置
    #[serde(default, alias = "config")]
    pub properties: Properties,

    /// 依赖的模块 ID
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 是否参与启停阶段
    #[serde(default = "default_true")]
    pub start: bool,
}

impl ModuleDescriptor {
    /// 创建描述，无依赖、参与启停
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            implementation: None,
            properties: Properties::empty(),
            dependencies: Vec::new(),
            start: true,
        }
    }

    /// 设置实现绑定
    pub fn with_implementation(mut self, binding: impl Into<String>) -> Self {
        self.implementation = Some(binding.into());
        self
    }

    /// 追加一个依赖
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// 设置模块配置
    pub fn with_properties(mut self, properties: impl Into<Properties>) -> Self {
        self.properties = properties.into();
        self
    }

    /// 只构造和初始化，不参与启停
    pub fn init_only(mut self) -> Self {
        self.start = false;
        self
    }

    /// 工厂使用的绑定名
    pub fn binding(&self) -> &str {
        self.implementation.as_deref().unwrap_or(&self.id)
    }
}

/// 一次加载的完整模块集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleSet {
    /// 全局配置，每个模块构造时都能读取
    #[serde(default, alias = "global")]
    pub global_configuration: Properties,

    /// 模块描述，按声明顺序
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
}

impl ModuleSet {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置全局配置
    pub fn with_global(mut self, global: impl Into<Properties>) -> Self {
        self.global_configuration = global.into();
        self
    }

    /// 追加模块描述
    pub fn module(mut self, descriptor: ModuleDescriptor) -> Self {
        self.modules.push(descriptor);
        self
    }

    /// 模块数量
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl From<Vec<ModuleDescriptor>> for ModuleSet {
    fn from(modules: Vec<ModuleDescriptor>) -> Self {
        Self {
            global_configuration: Properties::empty(),
            modules,
        }
    }
}

/// 模块描述来源
///
/// 来源自身的错误（文件缺失、语法错误等）由编排器统一包装为
/// [`CoreError::LoadSource`](crate::utils::CoreError::LoadSource)。
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    /// 读取完整的模块集合
    async fn load_descriptors(&self) -> anyhow::Result<ModuleSet>;
}

#[async_trait]
impl DescriptorSource for ModuleSet {
    async fn load_descriptors(&self) -> anyhow::Result<ModuleSet> {
        Ok(self.clone())
    }
}

#[async_trait]
impl DescriptorSource for Vec<ModuleDescriptor> {
    async fn load_descriptors(&self) -> anyhow::Result<ModuleSet> {
        Ok(ModuleSet::from(self.clone()))
    }
}
