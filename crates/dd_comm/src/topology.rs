// crates/dd_comm/src/topology.rs

//! 邻居拓扑
//!
//! 枚举进程网格上的 26 个方向（面、棱、角），去掉未分解轴上的方向，
//! 再按 rank 合并：同一个 rank 可能从多个方向到达（例如网格只有 2 层时
//! `-x` 与 `+x` 指向同一个 rank），它的掩码是这些方向位的并集。
//!
//! 方向 `(dx, dy, dz)`（各分量取 -1/0/1）的位编号为
//! `((dz + 1) * 3 + (dy + 1)) * 3 + (dx + 1)`，中心 (0, 0, 0) 对应 13，不使用。

use dd_foundation::Axis;
use std::collections::BTreeMap;
use tracing::debug;

use crate::decomposition::DomainDecomposition;

/// 方向编号
#[inline]
pub const fn direction_index(dx: i32, dy: i32, dz: i32) -> u32 {
    (((dz + 1) * 3 + (dy + 1)) * 3 + (dx + 1)) as u32
}

/// 方向位
#[inline]
pub const fn direction_bit(dx: i32, dy: i32, dz: i32) -> u32 {
    1 << direction_index(dx, dy, dz)
}

/// 一个去重后的邻居
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    /// 邻居 rank
    pub rank: u32,
    /// 指向该 rank 的全部方向位
    pub mask: u32,
}

/// 合并后的邻居表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborTopology {
    neighbors: Vec<Neighbor>,
    raw_len: usize,
}

impl NeighborTopology {
    /// 根据分解计算邻居表
    ///
    /// 结果按 rank 升序排列，且不含本 rank。
    pub fn compute(decomp: &DomainDecomposition) -> Self {
        let grid = decomp.grid();
        let mut merged: BTreeMap<u32, u32> = BTreeMap::new();
        let mut raw_len = 0;

        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let offset = [dx, dy, dz];
                    if offset == [0, 0, 0] {
                        continue;
                    }
                    // 未分解的轴上不能有偏移
                    let skipped = Axis::ALL
                        .iter()
                        .any(|&axis| offset[axis.index()] != 0 && !grid.is_decomposed(axis));
                    if skipped {
                        continue;
                    }

                    raw_len += 1;
                    let rank = decomp.rank_at_offset(offset);
                    *merged.entry(rank).or_insert(0) |= direction_bit(dx, dy, dz);
                }
            }
        }

        let neighbors: Vec<Neighbor> = merged
            .into_iter()
            .map(|(rank, mask)| Neighbor { rank, mask })
            .collect();

        debug!(
            rank = decomp.rank(),
            raw = raw_len,
            unique = neighbors.len(),
            "邻居拓扑"
        );
        Self { neighbors, raw_len }
    }

    /// 去重后的邻居
    #[inline]
    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    /// 去重后的邻居数
    #[inline]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// 是否没有邻居
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// 合并前的方向数
    #[inline]
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    /// 指定 rank 的方向掩码（非邻居返回 `None`）
    pub fn mask_of(&self, rank: u32) -> Option<u32> {
        self.neighbors
            .binary_search_by_key(&rank, |n| n.rank)
            .ok()
            .map(|i| self.neighbors[i].mask)
    }

    /// 邻居 rank 列表
    pub fn ranks(&self) -> impl Iterator<Item = u32> + '_ {
        self.neighbors.iter().map(|n| n.rank)
    }
}
