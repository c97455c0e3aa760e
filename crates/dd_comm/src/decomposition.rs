// crates/dd_comm/src/decomposition.rs

//! 区域分解
//!
//! 把全局盒按 [`ProcessGrid`] 切分，记录本 rank 的网格坐标、子域盒，
//! 以及网格坐标到 rank 的映射（rank 表）。
//!
//! rank 表默认是恒等映射（网格线性索引即 rank）；也可以传入任意排列，
//! 以模拟按节点重排的 rank 布局。

use dd_foundation::{Axis, BoxDim, GridPos, Index3D};
use glam::DVec3;

use crate::error::{CommError, CommResult};
use crate::face::Face;
use crate::grid::ProcessGrid;

/// 区域分解
#[derive(Debug, Clone, PartialEq)]
pub struct DomainDecomposition {
    global_box: BoxDim,
    grid: ProcessGrid,
    indexer: Index3D,
    rank: u32,
    grid_pos: GridPos,
    /// 网格线性索引 -> rank
    cart_ranks: Vec<u32>,
}

impl DomainDecomposition {
    /// 使用恒等 rank 表创建分解
    pub fn new(global_box: BoxDim, grid: ProcessGrid, rank: u32) -> CommResult<Self> {
        let table = (0..grid.num_ranks()).collect();
        Self::with_rank_table(global_box, grid, rank, table)
    }

    /// 使用自定义 rank 表创建分解
    ///
    /// `table[idx]` 是网格线性索引 `idx` 处的 rank，必须是 `0..N` 的一个排列。
    pub fn with_rank_table(
        global_box: BoxDim,
        grid: ProcessGrid,
        rank: u32,
        table: Vec<u32>,
    ) -> CommResult<Self> {
        let grid = ProcessGrid::new(grid.nx, grid.ny, grid.nz)?;
        let n = grid.num_ranks();
        if table.len() != n as usize {
            return Err(CommError::topology(format!(
                "rank 表长度 {} 与网格大小 {n} 不符",
                table.len()
            )));
        }

        let mut seen = vec![false; n as usize];
        for &r in &table {
            if r >= n || std::mem::replace(&mut seen[r as usize], true) {
                return Err(CommError::topology(format!("rank 表不是 0..{n} 的排列")));
            }
        }

        let idx = table
            .iter()
            .position(|&r| r == rank)
            .ok_or(CommError::InvalidRank { rank, num_ranks: n })?;
        let indexer = grid.indexer();
        let grid_pos = indexer.position(idx)?;

        Ok(Self {
            global_box,
            grid,
            indexer,
            rank,
            grid_pos,
            cart_ranks: table,
        })
    }

    /// 全局盒
    #[inline]
    pub fn global_box(&self) -> &BoxDim {
        &self.global_box
    }

    /// 网格形状
    #[inline]
    pub fn grid(&self) -> ProcessGrid {
        self.grid
    }

    /// 网格索引器
    #[inline]
    pub fn indexer(&self) -> Index3D {
        self.indexer
    }

    /// 本 rank
    #[inline]
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// rank 总数
    #[inline]
    pub fn num_ranks(&self) -> u32 {
        self.grid.num_ranks()
    }

    /// 本 rank 的网格坐标
    #[inline]
    pub fn grid_pos(&self) -> GridPos {
        self.grid_pos
    }

    /// 网格坐标处的 rank
    pub fn rank_at(&self, pos: GridPos) -> CommResult<u32> {
        if !self.indexer.contains(pos) {
            return Err(CommError::topology(format!("网格坐标 {pos} 越界")));
        }
        Ok(self.cart_ranks[self.indexer.index_of(pos)])
    }

    /// 本 rank 偏移 `(dx, dy, dz)` 后的网格坐标（周期回绕）
    pub fn offset_pos(&self, offset: [i32; 3]) -> GridPos {
        let p = self.grid_pos;
        let wrap = |axis: Axis, base: u32, d: i32| {
            self.indexer.wrap(axis, i64::from(base) + i64::from(d))
        };
        GridPos::new(
            wrap(Axis::X, p.i, offset[0]),
            wrap(Axis::Y, p.j, offset[1]),
            wrap(Axis::Z, p.k, offset[2]),
        )
    }

    /// 偏移 `(dx, dy, dz)` 处的 rank
    pub fn rank_at_offset(&self, offset: [i32; 3]) -> u32 {
        // offset_pos 总在网格内
        self.cart_ranks[self.indexer.index_of(self.offset_pos(offset))]
    }

    /// 面邻居 rank
    #[inline]
    pub fn neighbor_rank(&self, face: Face) -> u32 {
        self.rank_at_offset(face.offset())
    }

    /// 该面是否需要通信（所在轴被分解）
    #[inline]
    pub fn is_communicating(&self, face: Face) -> bool {
        self.grid.is_decomposed(face.axis())
    }

    /// 本 rank 的子域盒
    pub fn local_box(&self) -> BoxDim {
        self.box_at(self.grid_pos)
    }

    /// 任意网格坐标处的子域盒
    ///
    /// 子域盒沿用全局盒的周期性标志。
    pub fn box_at(&self, pos: GridPos) -> BoxDim {
        let g = &self.global_box;
        let step = g.lengths()
            / DVec3::new(
                f64::from(self.grid.nx),
                f64::from(self.grid.ny),
                f64::from(self.grid.nz),
            );
        let fpos = DVec3::new(f64::from(pos.i), f64::from(pos.j), f64::from(pos.k));

        let lo = g.lo() + step * fpos;
        let mut hi = lo + step;
        // 最后一层与全局上界精确对齐
        for axis in Axis::ALL {
            let a = axis.index();
            if pos.get(axis) + 1 == self.grid.extent(axis) {
                hi[a] = g.hi()[a];
            }
        }
        BoxDim::new(lo, hi)
            .map(|b| b.with_periodic(g.periodic()))
            .unwrap_or(*g)
    }

    /// 包含点 `p` 的子域网格坐标（点先按全局盒回绕）
    pub fn owner_pos(&self, p: [f64; 3]) -> GridPos {
        let g = &self.global_box;
        let w = g.wrap(p);
        let coord = |axis: Axis| {
            let a = axis.index();
            let n = self.grid.extent(axis);
            let t = (w[a] - g.lo()[a]) / g.lengths()[a];
            let c = (t * f64::from(n)).floor();
            (c.max(0.0) as u32).min(n - 1)
        };
        GridPos::new(coord(Axis::X), coord(Axis::Y), coord(Axis::Z))
    }

    /// 包含点 `p` 的 rank
    pub fn owner_rank(&self, p: [f64; 3]) -> u32 {
        self.cart_ranks[self.indexer.index_of(self.owner_pos(p))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decomp(nx: u32, ny: u32, nz: u32, rank: u32) -> DomainDecomposition {
        DomainDecomposition::new(
            BoxDim::cube(8.0),
            ProcessGrid::new(nx, ny, nz).unwrap(),
            rank,
        )
        .unwrap()
    }

    #[test]
    fn test_identity_table() {
        let d = decomp(2, 2, 2, 5);
        assert_eq!(d.grid_pos(), GridPos::new(1, 0, 1));
        assert_eq!(d.rank_at(GridPos::new(1, 0, 1)).unwrap(), 5);
        assert!(d.rank_at(GridPos::new(2, 0, 0)).is_err());
    }

    #[test]
    fn test_face_neighbors_wrap() {
        let d = decomp(3, 1, 1, 0);
        assert_eq!(d.neighbor_rank(Face::East), 1);
        assert_eq!(d.neighbor_rank(Face::West), 2);
        assert!(d.is_communicating(Face::West));
        assert!(!d.is_communicating(Face::North));
        assert_eq!(d.neighbor_rank(Face::North), 0);
    }

    #[test]
    fn test_local_box_tiles_global() {
        let d = decomp(2, 2, 2, 7);
        let b = d.local_box();
        assert_eq!(b.lo(), DVec3::ZERO);
        assert_eq!(b.hi(), DVec3::splat(4.0));

        let first = d.box_at(GridPos::new(0, 0, 0));
        assert_eq!(first.lo(), DVec3::splat(-4.0));
        assert_eq!(first.hi(), DVec3::ZERO);
    }

    #[test]
    fn test_custom_rank_table() {
        let table = vec![3, 2, 1, 0];
        let d = DomainDecomposition::with_rank_table(
            BoxDim::cube(4.0),
            ProcessGrid::new(4, 1, 1).unwrap(),
            3,
            table,
        )
        .unwrap();
        assert_eq!(d.grid_pos(), GridPos::new(0, 0, 0));
        assert_eq!(d.neighbor_rank(Face::East), 2);
        assert_eq!(d.neighbor_rank(Face::West), 0);
    }

    #[test]
    fn test_invalid_tables() {
        let grid = ProcessGrid::new(2, 1, 1).unwrap();
        let b = BoxDim::cube(1.0);
        assert!(DomainDecomposition::with_rank_table(b, grid, 0, vec![0]).is_err());
        assert!(DomainDecomposition::with_rank_table(b, grid, 0, vec![0, 0]).is_err());
        assert!(DomainDecomposition::with_rank_table(b, grid, 0, vec![0, 2]).is_err());
        assert!(matches!(
            DomainDecomposition::new(b, grid, 5),
            Err(CommError::InvalidRank { rank: 5, num_ranks: 2 })
        ));
    }

    #[test]
    fn test_owner_rank() {
        let d = decomp(2, 2, 2, 0);
        assert_eq!(d.owner_rank([-1.0, -1.0, -1.0]), 0);
        assert_eq!(d.owner_rank([1.0, -1.0, -1.0]), 1);
        assert_eq!(d.owner_rank([1.0, 1.0, 1.0]), 7);
        // 越过上界的点回绕到第一层
        assert_eq!(d.owner_rank([4.5, -1.0, -1.0]), 0);
    }
}
