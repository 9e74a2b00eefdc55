//! 基本使用示例
//!
//! 本示例展示了模块编排器的基本使用方法，包括：
//!
//! - 注册模块实现
//! - 加载模块描述并查看激活顺序
//! - 启动和停止模块
//! - 订阅编排器状态变更
//!
//! # 运行示例
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chips_moduli::{
    DescriptorFormat, DescriptorParser, Module, ModuleContext, ModuleFactory, ModuleManager,
};

const MODULES: &str = r#"
global_configuration:
  environment: demo
modules:
  - id: http
    implementation: server
    properties:
      port: 8080
    dependencies: [database, settings]
  - id: database
    properties:
      url: postgres://localhost/demo
      pool_size: 4
    dependencies: [settings]
  - id: settings
    start: false
"#;

/// 只需要初始化的配置模块
#[derive(Default)]
struct Settings;

#[async_trait]
impl Module for Settings {
    async fn init(&self) -> anyhow::Result<()> {
        println!("   [settings] 配置已读取");
        Ok(())
    }
}

/// 模拟数据库连接池
struct Database {
    url: String,
    pool_size: usize,
    connections: AtomicUsize,
}

impl Database {
    fn from_context(ctx: &ModuleContext) -> anyhow::Result<Self> {
        let url = ctx
            .properties
            .get_str("url")
            .ok_or_else(|| anyhow::anyhow!("database 缺少 url 配置"))?
            .to_string();
        Ok(Self {
            url,
            pool_size: ctx.properties.get_or("pool_size", 1),
            connections: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Module for Database {
    async fn start(&self) -> anyhow::Result<()> {
        self.connections.store(self.pool_size, Ordering::SeqCst);
        println!("   [database] 已连接 {} ({} 个连接)", self.url, self.pool_size);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.connections.store(0, Ordering::SeqCst);
        println!("   [database] 连接已关闭");
        Ok(())
    }
}

/// 模拟 HTTP 服务
struct Server {
    port: u16,
    environment: String,
    listening: AtomicBool,
}

#[async_trait]
impl Module for Server {
    async fn start(&self) -> anyhow::Result<()> {
        self.listening.store(true, Ordering::SeqCst);
        println!("   [http] 监听端口 {} ({})", self.port, self.environment);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.listening.store(false, Ordering::SeqCst);
        println!("   [http] 已停止监听");
        Ok(())
    }
}

/// 主函数
///
/// 演示模块编排器的基本用法。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== 模块编排器基本使用示例 ===\n");

    // -------------------------------------------------------------------------
    // 1. 注册模块实现
    // -------------------------------------------------------------------------
    println!("1. 注册模块实现...");

    let factory = ModuleFactory::new()
        .with_default::<Settings>("settings")
        .with("database", Database::from_context)
        .with("server", |ctx| {
            Ok(Server {
                port: ctx.properties.get_or("port", 80),
                environment: ctx.global.get_or("environment", "unknown".to_string()),
                listening: AtomicBool::new(false),
            })
        });
    println!("   已注册: {:?}\n", factory.bindings());

    let manager = ModuleManager::new(factory);
    manager
        .subscribe(|t| println!("   <状态> {} -> {}", t.from, t.to))
        .await;

    // -------------------------------------------------------------------------
    // 2. 加载模块描述
    // -------------------------------------------------------------------------
    println!("2. 加载模块描述...");

    let set = DescriptorParser::parse_string(MODULES, DescriptorFormat::Yaml)?;
    manager.load(&set).await?;
    println!("   激活顺序: {}", manager.activation_order().await.join(" -> "));
    println!("   停用顺序: {}\n", manager.deactivation_order().await.join(" -> "));

    // -------------------------------------------------------------------------
    // 3. 启动模块
    // -------------------------------------------------------------------------
    println!("3. 启动模块...");
    manager.start().await?;

    let database = manager.get_module_as::<Database>("database").await?;
    println!(
        "   ✅ 当前状态: {}，数据库连接数: {}\n",
        manager.current_state().await,
        database.connections.load(Ordering::SeqCst)
    );

    // -------------------------------------------------------------------------
    // 4. 停止模块
    // -------------------------------------------------------------------------
    println!("4. 停止模块...");
    manager.stop().await;

    let server = manager.get_module_as::<Server>("http").await?;
    println!(
        "   ✅ 当前状态: {}，HTTP 监听中: {}\n",
        manager.current_state().await,
        server.listening.load(Ordering::SeqCst)
    );

    // -------------------------------------------------------------------------
    // 5. 加载失败的情况
    // -------------------------------------------------------------------------
    println!("5. 加载带循环依赖的描述...");

    let cyclic = r#"{ "modules": [
        { "id": "settings", "dependencies": ["database"] },
        { "id": "database", "dependencies": ["settings"] }
    ] }"#;
    let set = DescriptorParser::parse_string(cyclic, DescriptorFormat::Json)?;
    if let Err(e) = manager.load(&set).await {
        println!("   ❌ {} [{}]", e, e.error_code());
    }
    println!("   当前状态: {}\n", manager.current_state().await);

    println!("=== 示例结束 ===");
    Ok(())
}
