//! 模块能力与实例句柄
//!
//! [`Module`] 是编排器唯一关心的模块契约：四个生命周期钩子。
//! [`ModuleInstance`] 同时保存 trait 对象和具体类型，便于按类型取回模块。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// 模块生命周期接口
///
/// 所有钩子默认为空操作，模块只需实现自己关心的阶段。
/// 钩子接收 `&self`，需要可变状态的模块自行使用内部可变性。
///
/// # 示例
///
/// ```rust
/// use async_trait::async_trait;
/// use chips_moduli::module::Module;
///
/// struct Cache;
///
/// #[async_trait]
/// impl Module for Cache {
///     async fn init(&self) -> anyhow::Result<()> {
///         tracing::info!("缓存预热");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// 初始化（激活顺序，快速失败）
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// 启动（激活顺序，仅参与启停的模块）
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// 停止（停用顺序，失败不中断）
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// 反初始化（停用顺序，失败不中断）
    async fn deinit(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 已构造的模块实例
///
/// 克隆代价很低，内部只是两个指向同一对象的 `Arc`。
#[derive(Clone)]
pub struct ModuleInstance {
    module: Arc<dyn Module>,
    concrete: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ModuleInstance {
    /// 包装一个具体模块
    pub fn new<M: Module>(module: M) -> Self {
        Self::from_arc(Arc::new(module))
    }

    /// 包装一个已共享的具体模块
    pub fn from_arc<M: Module>(module: Arc<M>) -> Self {
        let concrete: Arc<dyn Any + Send + Sync> = module.clone();
        let module: Arc<dyn Module> = module;
        Self {
            module,
            concrete,
            type_name: std::any::type_name::<M>(),
        }
    }

    /// 生命周期接口
    pub fn module(&self) -> &Arc<dyn Module> {
        &self.module
    }

    /// 按具体类型取回模块，类型不符时返回 `None`
    pub fn downcast<T: Module>(&self) -> Option<Arc<T>> {
        self.concrete.clone().downcast::<T>().ok()
    }

    /// 具体类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("type_name", &self.type_name)
            .finish()
    }
}
