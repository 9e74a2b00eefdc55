//! 模块构造
//!
//! [`Factory`] 是编排器与构造逻辑之间的接缝。默认实现 [`ModuleFactory`]
//! 是一张在进程启动时填好的注册表：绑定名 -> 构造函数。

use std::collections::HashMap;
use std::fmt;

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::warn;

use super::descriptor::{ModuleDescriptor, Properties};
use super::instance::{Module, ModuleInstance};

/// 构造上下文
///
/// 构造函数能看到模块自身的配置和整个集合的全局配置。
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// 模块 ID
    pub id: String,
    /// 实现绑定
    pub binding: String,
    /// 模块配置
    pub properties: Properties,
    /// 全局配置
    pub global: Properties,
}

impl ModuleContext {
    /// 从描述和全局配置创建上下文
    pub fn new(descriptor: &ModuleDescriptor, global: &Properties) -> Self {
        Self {
            id: descriptor.id.clone(),
            binding: descriptor.binding().to_string(),
            properties: descriptor.properties.clone(),
            global: global.clone(),
        }
    }
}

/// 模块工厂接口
#[async_trait]
pub trait Factory: Send + Sync {
    /// 根据上下文构造模块实例
    async fn construct(&self, ctx: &ModuleContext) -> anyhow::Result<ModuleInstance>;
}

#[async_trait]
impl<F> Factory for F
where
    F: Fn(&ModuleContext) -> anyhow::Result<ModuleInstance> + Send + Sync,
{
    async fn construct(&self, ctx: &ModuleContext) -> anyhow::Result<ModuleInstance> {
        self(ctx)
    }
}

type Constructor = Box<dyn Fn(&ModuleContext) -> anyhow::Result<ModuleInstance> + Send + Sync>;

/// 基于注册表的模块工厂
///
/// ```rust
/// use chips_moduli::module::{Module, ModuleFactory};
///
/// #[derive(Default)]
/// struct Metrics;
/// impl Module for Metrics {}
///
/// struct Server { port: u16 }
/// impl Module for Server {}
///
/// let factory = ModuleFactory::new()
///     .with_default::<Metrics>("metrics")
///     .with("server", |ctx| Ok(Server { port: ctx.properties.get_or("port", 8080) }));
///
/// assert!(factory.contains("server"));
/// assert_eq!(factory.bindings(), vec!["metrics", "server"]);
/// ```
#[derive(Default)]
pub struct ModuleFactory {
    constructors: HashMap<String, Constructor>,
}

impl ModuleFactory {
    /// 创建空工厂
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册构造函数，同名绑定会被覆盖
    pub fn register<M, F>(&mut self, binding: impl Into<String>, constructor: F) -> &mut Self
    where
        M: Module,
        F: Fn(&ModuleContext) -> anyhow::Result<M> + Send + Sync + 'static,
    {
        let binding = binding.into();
        let boxed: Constructor =
            Box::new(move |ctx: &ModuleContext| constructor(ctx).map(ModuleInstance::new));
        if self.constructors.insert(binding.clone(), boxed).is_some() {
            warn!(binding = %binding, "覆盖已注册的模块实现");
        }
        self
    }

    /// 注册使用 `Default` 构造的模块
    pub fn register_default<M: Module + Default>(
        &mut self,
        binding: impl Into<String>,
    ) -> &mut Self {
        self.register(binding, |_| Ok(M::default()))
    }

    /// 链式注册
    pub fn with<M, F>(mut self, binding: impl Into<String>, constructor: F) -> Self
    where
        M: Module,
        F: Fn(&ModuleContext) -> anyhow::Result<M> + Send + Sync + 'static,
    {
        self.register(binding, constructor);
        self
    }

    /// 链式注册 `Default` 模块
    pub fn with_default<M: Module + Default>(mut self, binding: impl Into<String>) -> Self {
        self.register_default::<M>(binding);
        self
    }

    /// 是否注册了绑定
    pub fn contains(&self, binding: &str) -> bool {
        self.constructors.contains_key(binding)
    }

    /// 所有绑定名（排序后）
    pub fn bindings(&self) -> Vec<&str> {
        let mut bindings: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        bindings.sort_unstable();
        bindings
    }

    /// 已注册数量
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleFactory")
            .field("bindings", &self.bindings())
            .finish()
    }
}

#[async_trait]
impl Factory for ModuleFactory {
    async fn construct(&self, ctx: &ModuleContext) -> anyhow::Result<ModuleInstance> {
        let constructor = self
            .constructors
            .get(&ctx.binding)
            .ok_or_else(|| anyhow!("未注册的模块实现 '{}'", ctx.binding))?;
        constructor(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Plain;
    impl Module for Plain {}

    struct Configured {
        name: String,
        env: String,
    }
    impl Module for Configured {}

    fn context(id: &str, binding: Option<&str>) -> ModuleContext {
        let mut descriptor = ModuleDescriptor::new(id).with_properties(json!({ "name": "n1" }));
        if let Some(binding) = binding {
            descriptor = descriptor.with_implementation(binding);
        }
        ModuleContext::new(&descriptor, &Properties::from(json!({ "env": "prod" })))
    }

    #[tokio::test]
    async fn test_construct_registered_binding() {
        let factory = ModuleFactory::new().with("configured", |ctx| {
            Ok(Configured {
                name: ctx.properties.get_or("name", String::new()),
                env: ctx.global.get_or("env", String::new()),
            })
        });

        let instance = factory
            .construct(&context("x", Some("configured")))
            .await
            .unwrap();
        let module = instance.downcast::<Configured>().unwrap();
        assert_eq!(module.name, "n1");
        assert_eq!(module.env, "prod");
    }

    #[tokio::test]
    async fn test_construct_uses_id_without_binding() {
        let factory = ModuleFactory::new().with_default::<Plain>("plain");
        assert!(factory.construct(&context("plain", None)).await.is_ok());
    }

    #[tokio::test]
    async fn test_construct_unknown_binding() {
        let factory = ModuleFactory::new();
        let err = factory
            .construct(&context("ghost", None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_constructor_error_propagates() {
        let factory =
            ModuleFactory::new().with::<Plain, _>("broken", |_| Err(anyhow!("缺少端口配置")));
        let err = factory
            .construct(&context("broken", None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("缺少端口配置"));
    }

    #[tokio::test]
    async fn test_closure_factory() {
        let factory =
            |_: &ModuleContext| -> anyhow::Result<ModuleInstance> { Ok(ModuleInstance::new(Plain)) };
        assert!(factory.construct(&context("any", None)).await.is_ok());
    }

    #[test]
    fn test_register_overwrites() {
        let mut factory = ModuleFactory::new();
        factory.register_default::<Plain>("a");
        factory.register_default::<Plain>("a");
        assert_eq!(factory.len(), 1);
        assert!(!factory.is_empty());
    }
}
