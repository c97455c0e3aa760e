// apps/dd_cli/src/commands/run.rs

//! 运行迁移命令
//!
//! 每个 rank 一个线程：在子域内撒点，然后反复施加随机位移并执行一轮迁移。
//! 结束后汇总各 rank 的粒子数与通信统计，并检查粒子总数守恒。

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use dd_comm::{
    local_cluster, CommStatsSnapshot, DomainCommunicator, DomainDecomposition, MarginCoverage,
    ParticleData, ParticleRecord, ProcessGrid, Transport,
};
use dd_config::{BackendKind, RunConfig};
use dd_foundation::{BoxDim, GridPos};
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// 运行参数
#[derive(Args)]
pub struct RunArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// rank 数
    #[arg(short, long)]
    pub ranks: Option<u32>,

    /// 进程网格，例如 `2,2,2`
    #[arg(long, value_delimiter = ',', num_args = 3)]
    pub grid: Option<Vec<u32>>,

    /// 每个 rank 的初始粒子数
    #[arg(short = 'n', long)]
    pub count: Option<u32>,

    /// 迁移步数
    #[arg(short, long)]
    pub steps: Option<u64>,

    /// 执行后端 (host, stream)
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// 随机种子
    #[arg(long)]
    pub seed: Option<u64>,

    /// 输出 JSON 报告
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// 单个 rank 的运行结果
struct RankReport {
    rank: u32,
    pos: GridPos,
    initial: usize,
    fin: usize,
    neighbors: usize,
    stats: CommStatsSnapshot,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== DomainDrift 迁移启动 ===");

    let config = build_config(&args)?;
    let global = config.global_box()?;
    let grid = config.grid()?;

    info!(
        "全局盒: {:?} .. {:?}, 周期: {:?}",
        config.domain.lo, config.domain.hi, config.domain.periodic
    );
    info!(
        "进程网格: {}×{}×{} ({} rank), 后端: {}",
        grid.nx,
        grid.ny,
        grid.nz,
        grid.num_ranks(),
        config.runtime.backend
    );

    let start = Instant::now();
    let mut reports = run_ranks(&config, global, grid)?;
    reports.sort_by_key(|r| r.rank);
    let elapsed = start.elapsed();

    print_reports(&reports);

    let initial: usize = reports.iter().map(|r| r.initial).sum();
    let fin: usize = reports.iter().map(|r| r.fin).sum();
    let total = reports
        .iter()
        .fold(CommStatsSnapshot::default(), |acc, r| acc.merge(r.stats));

    info!("=== 迁移完成 ===");
    info!("步数: {}, 耗时: {:.3} s", config.steps, elapsed.as_secs_f64());
    info!(
        "迁移粒子: 发出 {}, 收到 {}",
        total.particles_sent, total.particles_received
    );

    if let Some(path) = &args.report {
        write_report(path, &config, &reports, &total)?;
        info!("报告已写入: {}", path.display());
    }

    if initial != fin || total.particles_sent != total.particles_received {
        bail!("粒子不守恒: 初始 {initial}, 结束 {fin}");
    }
    println!("\n✓ 粒子守恒: {fin}");
    Ok(())
}

fn build_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("无法加载配置: {}", path.display()))?,
        None => RunConfig::default(),
    };

    if let Some(ranks) = args.ranks {
        config.decomposition.ranks = ranks;
        config.decomposition.grid = None;
    }
    if let Some(grid) = &args.grid {
        let [nx, ny, nz]: [u32; 3] = grid
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("--grid 需要 3 个值"))?;
        config.decomposition.grid = Some([nx, ny, nz]);
        config.decomposition.ranks = ProcessGrid::new(nx, ny, nz)?.num_ranks();
    }
    if let Some(count) = args.count {
        config.particles.count_per_rank = count;
    }
    if let Some(steps) = args.steps {
        config.steps = steps;
    }
    if let Some(backend) = args.backend {
        config.runtime.backend = backend;
    }
    if let Some(seed) = args.seed {
        config.particles.seed = seed;
    }

    config.validate().context("配置无效")?;
    Ok(config)
}

fn run_ranks(config: &RunConfig, global: BoxDim, grid: ProcessGrid) -> Result<Vec<RankReport>> {
    let transports = local_cluster(grid.num_ranks());

    thread::scope(|s| -> Result<Vec<RankReport>> {
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                let name = format!("rank-{}", t.rank());
                thread::Builder::new()
                    .name(name)
                    .spawn_scoped(s, move || run_rank(config, global, grid, t))
            })
            .collect::<std::io::Result<_>>()?;

        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| anyhow!("rank 线程崩溃"))
                    .and_then(|r| r)
            })
            .collect()
    })
}

fn run_rank<T: Transport>(
    config: &RunConfig,
    global: BoxDim,
    grid: ProcessGrid,
    transport: T,
) -> Result<RankReport> {
    let rank = transport.rank();
    let backend = config.runtime.backend.build();
    let decomp = DomainDecomposition::new(global, grid, rank)?;
    let local = decomp.local_box();

    let mut comm = DomainCommunicator::new(decomp, transport, backend.clone())?;
    if config.particles.coverage_margin > 0.0 {
        comm = comm.with_coverage(MarginCoverage {
            margin: config.particles.coverage_margin,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.particles.seed.wrapping_add(u64::from(rank)));
    let mut data = ParticleData::new(backend);
    scatter(&mut data, &local, rank, config.particles.count_per_rank, &mut rng)?;
    let initial = data.len();

    let max = local.lengths() * config.particles.max_displacement;
    for step in 0..config.steps {
        displace(&mut data, max, &mut rng)?;
        let status = comm
            .communicate(step, &mut data)
            .with_context(|| format!("rank {rank} 第 {step} 步迁移失败"))?;
        if let Some(s) = status.summary() {
            debug!(rank, step, sent = s.sent, received = s.received, local = data.len(), "步完成");
        }
    }
    comm.barrier()?;

    Ok(RankReport {
        rank,
        pos: comm.decomposition().grid_pos(),
        initial,
        fin: data.len(),
        neighbors: comm.topology().len(),
        stats: comm.stats().snapshot(),
    })
}

/// 在子域盒内均匀撒点，标签为 `rank * count + i`（配置校验保证不溢出）
fn scatter(
    data: &mut ParticleData,
    local: &BoxDim,
    rank: u32,
    count: u32,
    rng: &mut StdRng,
) -> Result<()> {
    let (lo, hi) = (local.lo(), local.hi());
    for i in 0..count {
        let p = [
            rng.gen_range(lo.x..hi.x),
            rng.gen_range(lo.y..hi.y),
            rng.gen_range(lo.z..hi.z),
        ];
        data.push(ParticleRecord::new(p, 0, rank * count + i))?;
    }
    Ok(())
}

/// 各分量在 `[-max, max]` 内随机位移
fn displace(data: &mut ParticleData, max: DVec3, rng: &mut StdRng) -> Result<()> {
    if max.cmple(DVec3::ZERO).any() {
        return Ok(());
    }
    data.with_records_mut(|recs| {
        for r in recs {
            for a in 0..3 {
                r.position[a] += rng.gen_range(-max[a]..=max[a]);
            }
        }
    })?;
    Ok(())
}

fn print_reports(reports: &[RankReport]) {
    println!(
        "\n{:>6} {:>12} {:>8} {:>8} {:>6} {:>10} {:>10}",
        "rank", "grid", "initial", "final", "nbrs", "sent", "received"
    );
    for r in reports {
        println!(
            "{:>6} {:>12} {:>8} {:>8} {:>6} {:>10} {:>10}",
            r.rank,
            r.pos.to_string(),
            r.initial,
            r.fin,
            r.neighbors,
            r.stats.particles_sent,
            r.stats.particles_received
        );
    }
}

fn write_report(
    path: &Path,
    config: &RunConfig,
    reports: &[RankReport],
    total: &CommStatsSnapshot,
) -> Result<()> {
    let ranks: Vec<_> = reports
        .iter()
        .map(|r| {
            serde_json::json!({
                "rank": r.rank,
                "grid_pos": [r.pos.i, r.pos.j, r.pos.k],
                "initial": r.initial,
                "final": r.fin,
                "neighbors": r.neighbors,
                "stats": r.stats,
            })
        })
        .collect();
    let report = serde_json::json!({
        "config": config,
        "total": total,
        "ranks": ranks,
    });
    let content = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, content)
        .with_context(|| format!("无法写入报告: {}", path.display()))?;
    Ok(())
}
