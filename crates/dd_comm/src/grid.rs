// crates/dd_comm/src/grid.rs

//! 进程网格
//!
//! 全局盒被划分为 `nx × ny × nz` 个等大小子域，每个 rank 拥有一个。

use dd_foundation::{Axis, BoxDim, Index3D};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CommError, CommResult};

/// 进程网格形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessGrid {
    /// x 方向子域数
    pub nx: u32,
    /// y 方向子域数
    pub ny: u32,
    /// z 方向子域数
    pub nz: u32,
}

impl ProcessGrid {
    /// 创建网格形状，各方向必须至少为 1
    pub fn new(nx: u32, ny: u32, nz: u32) -> CommResult<Self> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(CommError::topology(format!(
                "进程网格各维度必须为正: {nx}×{ny}×{nz}"
            )));
        }
        if nx.checked_mul(ny).and_then(|n| n.checked_mul(nz)).is_none() {
            return Err(CommError::topology(format!(
                "进程网格 {nx}×{ny}×{nz} 的 rank 数超出 u32 范围"
            )));
        }
        Ok(Self { nx, ny, nz })
    }

    /// 单进程网格
    pub const fn single() -> Self {
        Self { nx: 1, ny: 1, nz: 1 }
    }

    /// 为 `num_ranks` 个 rank 选择内部界面面积最小的分解
    ///
    /// 面积相同时取 `nx` 较大者，再取 `ny` 较大者。
    pub fn auto(num_ranks: u32, global: &BoxDim) -> CommResult<Self> {
        if num_ranks == 0 {
            return Err(CommError::topology("rank 数必须为正"));
        }
        let l = global.lengths();

        let mut best: Option<(Self, f64)> = None;
        for nx in divisors(num_ranks) {
            for ny in divisors(num_ranks / nx) {
                let nz = num_ranks / nx / ny;
                let area = l.x * l.y * f64::from(nz - 1)
                    + l.x * l.z * f64::from(ny - 1)
                    + l.y * l.z * f64::from(nx - 1);

                let better = match best {
                    None => true,
                    Some((g, best_area)) => {
                        let tol = 1e-12 * best_area.max(1.0);
                        area < best_area - tol
                            || ((area - best_area).abs() <= tol && (nx, ny) > (g.nx, g.ny))
                    }
                };
                if better {
                    best = Some((Self { nx, ny, nz }, area));
                }
            }
        }

        let (grid, area) = best.unwrap_or((Self::single(), 0.0));
        debug!(num_ranks, nx = grid.nx, ny = grid.ny, nz = grid.nz, area, "自动进程网格");
        Ok(grid)
    }

    /// rank 总数（经 [`ProcessGrid::new`] 构造时不会溢出）
    #[inline]
    pub const fn num_ranks(&self) -> u32 {
        self.nx * self.ny * self.nz
    }

    /// 指定轴上的子域数
    #[inline]
    pub const fn extent(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.nx,
            Axis::Y => self.ny,
            Axis::Z => self.nz,
        }
    }

    /// 指定轴是否被分解（子域数大于 1）
    #[inline]
    pub const fn is_decomposed(&self, axis: Axis) -> bool {
        self.extent(axis) > 1
    }

    /// 网格线性索引器
    #[inline]
    pub const fn indexer(&self) -> Index3D {
        Index3D::new(self.nx, self.ny, self.nz)
    }
}

impl Default for ProcessGrid {
    fn default() -> Self {
        Self::single()
    }
}

fn divisors(n: u32) -> impl Iterator<Item = u32> {
    (1..=n).filter(move |d| n % d == 0)
}
