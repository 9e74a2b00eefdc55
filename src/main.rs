//! Chips Moduli 命令行入口
//!
//! 用于检查模块描述文件、查看激活顺序，以及在不加载真实模块的情况下演练整个生命周期。
//!
//! # 命令概览
//!
//! - `check` - 校验描述文件（格式、重复 ID、缺失依赖、循环依赖）
//! - `order` - 打印激活顺序和停用顺序
//! - `rehearse` - 用只记录日志的模块走一遍 load/start/stop
//! - `version` - 显示版本信息
//!
//! # 使用示例
//!
//! ```bash
//! # 检查描述文件
//! chips-moduli check -f modules.yaml
//!
//! # 使用配置文件里的描述路径查看顺序
//! chips-moduli -c moduli.yaml order
//!
//! # 演练生命周期，按 Ctrl+C 后停止
//! chips-moduli -l debug rehearse -f modules.yaml --hold
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

use chips_moduli::{
    CoreConfig, DependencyGraph, DescriptorFile, DescriptorParser, LifecyclePhase, Logger,
    LoggerConfig, Module, ModuleContext, ModuleInstance, ModuleManager, ModuleSet,
};

/// Chips Moduli - 薯片模块编排器
#[derive(Parser)]
#[command(name = "chips-moduli")]
#[command(version, about = "模块依赖解析与生命周期编排", long_about = None)]
#[command(author = "Chips Team")]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "moduli.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 校验模块描述文件
    ///
    /// 检查格式、重复 ID、缺失依赖和循环依赖。
    Check {
        /// 描述文件路径（不指定则使用配置中的 descriptor_path）
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// 打印激活顺序和停用顺序
    Order {
        /// 描述文件路径（不指定则使用配置中的 descriptor_path）
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// 演练生命周期
    ///
    /// 每个模块都用一个只记录日志的替身构造，然后依次执行 load、start、stop。
    /// 模块配置中的 `rehearsal.fail_on`（init/start/stop/deinit）可以模拟该阶段失败。
    Rehearse {
        /// 描述文件路径（不指定则使用配置中的 descriptor_path）
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 启动后等待 Ctrl+C 再停止
        #[arg(long)]
        hold: bool,
    },

    /// 查看版本信息
    Version,
}

/// 演练用的替身模块
struct RehearsalModule {
    id: String,
    fail_on: Option<LifecyclePhase>,
}

impl RehearsalModule {
    fn from_context(ctx: &ModuleContext) -> anyhow::Result<Self> {
        let fail_on = match ctx.properties.get_str("rehearsal.fail_on") {
            None => None,
            Some("init") => Some(LifecyclePhase::Init),
            Some("start") => Some(LifecyclePhase::Start),
            Some("stop") => Some(LifecyclePhase::Stop),
            Some("deinit") => Some(LifecyclePhase::Deinit),
            Some(other) => bail!("未知的演练阶段 '{}'", other),
        };
        Ok(Self {
            id: ctx.id.clone(),
            fail_on,
        })
    }

    fn call(&self, phase: LifecyclePhase) -> anyhow::Result<()> {
        info!(module_id = %self.id, phase = %phase, "演练");
        if self.fail_on == Some(phase) {
            bail!("模拟 {} 阶段失败", phase);
        }
        Ok(())
    }
}

#[async_trait]
impl Module for RehearsalModule {
    async fn init(&self) -> anyhow::Result<()> {
        self.call(LifecyclePhase::Init)
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.call(LifecyclePhase::Start)
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.call(LifecyclePhase::Stop)
    }

    async fn deinit(&self) -> anyhow::Result<()> {
        self.call(LifecyclePhase::Deinit)
    }
}

/// 加载配置文件，文件不存在时使用默认配置
async fn load_config(path: &Path) -> Result<CoreConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(CoreConfig::from_file(path).await?)
    } else {
        Ok(CoreConfig::default())
    }
}

/// 确定描述文件路径
fn descriptor_path(
    file: Option<PathBuf>,
    config: &CoreConfig,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    file.or_else(|| config.moduli.descriptor_path.clone())
        .ok_or_else(|| "未指定模块描述文件，请使用 -f 或在配置中设置 moduli.descriptor_path".into())
}

/// 校验重复 ID 并构建依赖图
fn analyse(set: &ModuleSet) -> Result<DependencyGraph, Box<dyn std::error::Error>> {
    let mut seen = HashSet::new();
    for module in &set.modules {
        if !seen.insert(module.id.as_str()) {
            return Err(Box::new(chips_moduli::CoreError::DuplicateIdentity(
                module.id.clone(),
            )));
        }
    }
    Ok(DependencyGraph::from_descriptors(&set.modules)?)
}

/// 检查描述文件
async fn run_check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查模块描述文件: {}", path.display());
    println!();

    let result = match DescriptorParser::parse_file(path).await {
        Ok(set) => analyse(&set).map(|graph| (set, graph)),
        Err(e) => Err(e.into()),
    };

    match result {
        Ok((set, graph)) => {
            let init_only = set.modules.iter().filter(|m| !m.start).count();
            println!("✅ 描述文件有效！");
            println!("────────────────────────────────────────");
            println!("  模块数量:       {}", graph.len());
            println!("  依赖边数量:     {}", graph.edge_count());
            println!("  仅初始化模块:   {}", init_only);
            println!("────────────────────────────────────────");
            Ok(())
        }
        Err(e) => {
            println!("❌ 描述文件无效: {}", e);
            Err(e)
        }
    }
}

/// 打印激活顺序
async fn run_order(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let set = DescriptorParser::parse_file(path).await?;
    let graph = analyse(&set)?;
    let activation = graph.activation_order()?;

    println!();
    println!("激活顺序");
    println!("═══════════════════════════════════════");
    for (i, id) in activation.iter().enumerate() {
        let deps = graph.dependencies(id);
        if deps.is_empty() {
            println!("  {:>3}. {}", i + 1, id);
        } else {
            println!(
                "  {:>3}. {}  <- {}  (传递依赖 {} 个)",
                i + 1,
                id,
                deps.join(", "),
                graph.transitive_dependencies(id).len()
            );
        }
    }
    println!();
    println!("停用顺序");
    println!("═══════════════════════════════════════");
    println!("  {}", graph.deactivation_order()?.join(" -> "));
    println!();
    Ok(())
}

/// 演练生命周期
///
/// 配置中 `moduli.auto_start` 为 false 时只加载，不启动。
async fn run_rehearse(
    path: &Path,
    hold: bool,
    auto_start: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let factory = |ctx: &ModuleContext| -> anyhow::Result<ModuleInstance> {
        RehearsalModule::from_context(ctx).map(ModuleInstance::new)
    };
    let manager = ModuleManager::with_factory(Arc::new(factory));
    manager
        .subscribe(|t| info!(from = %t.from, to = %t.to, "编排器状态变更"))
        .await;

    manager.load(&DescriptorFile::new(path)).await?;
    println!("激活顺序: {}", manager.activation_order().await.join(" -> "));

    if !auto_start {
        println!("auto_start 已关闭，跳过启动");
        return Ok(());
    }

    if let Err(e) = manager.start().await {
        println!("❌ 启动失败: {}", e);
        warn!("清理已初始化的模块");
        manager.stop().await;
        print_faults(&manager).await;
        return Err(Box::new(e));
    }
    println!("✅ 所有模块已启动");

    if hold {
        println!("按 Ctrl+C 停止");
        signal::ctrl_c().await?;
        println!();
    }

    manager.stop().await;
    println!("✅ 所有模块已停止");
    print_faults(&manager).await;
    Ok(())
}

async fn print_faults(manager: &ModuleManager) {
    let faults = manager.last_faults().await;
    if faults.is_empty() {
        return;
    }
    println!("⚠️  停止期间出现 {} 个错误:", faults.len());
    for fault in faults {
        println!("    {}", fault);
    }
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("Chips Moduli - 薯片模块编排器");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", chips_moduli::VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        print_version();
        return Ok(());
    }

    let config = load_config(&cli.config).await?;

    let mut logger_config = LoggerConfig::from_log_config(&config.logging);
    if let Some(level) = cli.log_level {
        logger_config.level = level;
    }
    let _log_guard = Logger::init(logger_config)?;

    match cli.command {
        Commands::Check { file } => run_check(&descriptor_path(file, &config)?).await?,
        Commands::Order { file } => run_order(&descriptor_path(file, &config)?).await?,
        Commands::Rehearse { file, hold } => {
            run_rehearse(
                &descriptor_path(file, &config)?,
                hold,
                config.moduli.auto_start,
            )
            .await?
        }
        Commands::Version => {}
    }

    Ok(())
}
