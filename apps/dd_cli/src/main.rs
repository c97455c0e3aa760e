// apps/dd_cli/src/main.rs

//! DomainDrift 命令行界面
//!
//! 在单个进程内以线程模拟多 rank，运行区域分解粒子迁移。
//!
//! # 架构层级
//!
//! 本模块属于 **Layer 5: Application**：
//! - 通过 `RunConfig` 描述运行
//! - 通过 `BackendKind` 选择执行后端

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// DomainDrift 粒子迁移命令行工具
#[derive(Parser)]
#[command(name = "dd_cli")]
#[command(author = "DomainDrift Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "DomainDrift domain-decomposition particle migration", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行多 rank 迁移
    Run(commands::run::RunArgs),
    /// 显示邻居拓扑
    Topology(commands::topology::TopologyArgs),
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Topology(args) => commands::topology::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
