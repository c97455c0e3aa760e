// apps/dd_cli/src/commands/topology.rs

//! 邻居拓扑命令
//!
//! 打印某个网格位置合并后的邻居集合，以及每个邻居对应的方向偏移。

use anyhow::{anyhow, Result};
use clap::Args;
use dd_comm::{DomainDecomposition, NeighborTopology, ProcessGrid};
use dd_foundation::BoxDim;
use tracing::info;

/// 拓扑参数
#[derive(Args)]
pub struct TopologyArgs {
    /// 进程网格，例如 `3,3,3`
    #[arg(long, value_delimiter = ',', num_args = 3, default_value = "3,3,3")]
    pub grid: Vec<u32>,

    /// 网格位置，例如 `0,0,0`
    #[arg(long, value_delimiter = ',', num_args = 3, default_value = "0,0,0")]
    pub pos: Vec<u32>,
}

/// 执行拓扑命令
pub fn execute(args: TopologyArgs) -> Result<()> {
    let [nx, ny, nz] = triple(&args.grid, "--grid")?;
    let [i, j, k] = triple(&args.pos, "--pos")?;

    let grid = ProcessGrid::new(nx, ny, nz)?;
    let indexer = grid.indexer();
    if i >= nx || j >= ny || k >= nz {
        return Err(anyhow!("位置 ({i}, {j}, {k}) 超出网格 {nx}×{ny}×{nz}"));
    }
    let rank = indexer.index(i, j, k) as u32;

    let decomp = DomainDecomposition::new(BoxDim::cube(1.0), grid, rank)?;
    let topo = NeighborTopology::compute(&decomp);
    info!("rank {} @ {}: {} 个方向, {} 个邻居", rank, decomp.grid_pos(), topo.raw_len(), topo.len());

    println!("{:>6} {:>10}  offsets", "rank", "mask");
    for n in topo.neighbors() {
        let offsets: Vec<String> = decode_mask(n.mask)
            .into_iter()
            .map(|[dx, dy, dz]| format!("({dx:+},{dy:+},{dz:+})"))
            .collect();
        println!("{:>6} {:#010x}  {}", n.rank, n.mask, offsets.join(" "));
    }
    Ok(())
}

fn triple(values: &[u32], flag: &str) -> Result<[u32; 3]> {
    values
        .try_into()
        .map_err(|_| anyhow!("{flag} 需要 3 个值"))
}

/// 方向掩码还原为偏移列表
fn decode_mask(mask: u32) -> Vec<[i32; 3]> {
    (0..27)
        .filter(|bit| mask & (1 << bit) != 0)
        .map(|bit| [bit % 3 - 1, (bit / 3) % 3 - 1, bit / 9 - 1])
        .collect()
}
