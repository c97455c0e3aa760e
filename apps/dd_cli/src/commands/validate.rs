// apps/dd_cli/src/commands/validate.rs

//! 配置验证命令
//!
//! 加载并校验运行配置，打印解析后的分解信息；也可以写出默认配置。

use anyhow::{Context, Result};
use clap::Args;
use dd_config::RunConfig;
use std::path::PathBuf;
use tracing::info;

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 将默认配置写入指定路径
    #[arg(long)]
    pub write_default: Option<PathBuf>,
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== DomainDrift 配置验证 ===");

    if let Some(path) = &args.write_default {
        RunConfig::default()
            .save_to_file(path)
            .with_context(|| format!("无法写入: {}", path.display()))?;
        println!("默认配置已写入: {}", path.display());
    }

    let Some(path) = &args.config else {
        if args.write_default.is_none() {
            println!("用法: dd_cli validate --config <配置文件>");
            println!("      dd_cli validate --write-default <输出路径>");
        }
        return Ok(());
    };

    let config = RunConfig::from_file(path)
        .with_context(|| format!("配置无效: {}", path.display()))?;
    let global = config.global_box()?;
    let grid = config.grid()?;

    println!("配置文件: {}", path.display());
    println!("  全局盒: {} .. {}", global.lo(), global.hi());
    println!("  周期: {:?}", global.periodic());
    println!(
        "  进程网格: {}×{}×{} ({} rank{})",
        grid.nx,
        grid.ny,
        grid.nz,
        grid.num_ranks(),
        if config.decomposition.grid.is_none() { ", 自动" } else { "" }
    );
    println!("  每 rank 粒子数: {}", config.particles.count_per_rank);
    println!("  步数: {}", config.steps);
    println!("  后端: {}", config.runtime.backend);
    println!("\n✓ 验证通过");
    Ok(())
}
