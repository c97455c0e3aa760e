// crates/dd_foundation/src/index.rs

//! 三维网格索引
//!
//! `Index3D` 把进程网格坐标 `(i, j, k)` 线性化为 `i + w * (j + h * k)`，
//! `GridPos` 是网格中的整数坐标。每个轴都按自身范围周期回绕。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DdError, DdResult};
use crate::geometry::Axis;

/// 网格坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    /// x 方向坐标
    pub i: u32,
    /// y 方向坐标
    pub j: u32,
    /// z 方向坐标
    pub k: u32,
}

impl GridPos {
    /// 创建网格坐标
    #[inline]
    pub const fn new(i: u32, j: u32, k: u32) -> Self {
        Self { i, j, k }
    }

    /// 指定轴的分量
    #[inline]
    pub const fn get(self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.i,
            Axis::Y => self.j,
            Axis::Z => self.k,
        }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.i, self.j, self.k)
    }
}

/// 三维线性索引器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index3D {
    w: u32,
    h: u32,
    d: u32,
}

impl Index3D {
    /// 创建索引器（各维度需为正，由调用方保证）
    #[inline]
    pub const fn new(w: u32, h: u32, d: u32) -> Self {
        Self { w, h, d }
    }

    /// 创建并校验索引器
    pub fn try_new(w: u32, h: u32, d: u32) -> DdResult<Self> {
        if w == 0 || h == 0 || d == 0 {
            return Err(DdError::invalid_input(format!(
                "网格维度必须为正: {w}x{h}x{d}"
            )));
        }
        Ok(Self { w, h, d })
    }

    /// x 方向范围
    #[inline]
    pub const fn w(&self) -> u32 {
        self.w
    }

    /// y 方向范围
    #[inline]
    pub const fn h(&self) -> u32 {
        self.h
    }

    /// z 方向范围
    #[inline]
    pub const fn d(&self) -> u32 {
        self.d
    }

    /// 指定轴的范围
    #[inline]
    pub const fn extent(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.w,
            Axis::Y => self.h,
            Axis::Z => self.d,
        }
    }

    /// 元素总数
    #[inline]
    pub const fn len(&self) -> usize {
        self.w as usize * self.h as usize * self.d as usize
    }

    /// 是否为空
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 线性索引
    #[inline]
    pub const fn index(&self, i: u32, j: u32, k: u32) -> usize {
        i as usize + self.w as usize * (j as usize + self.h as usize * k as usize)
    }

    /// 坐标的线性索引
    #[inline]
    pub const fn index_of(&self, pos: GridPos) -> usize {
        self.index(pos.i, pos.j, pos.k)
    }

    /// 线性索引还原为坐标
    pub fn position(&self, idx: usize) -> DdResult<GridPos> {
        DdError::check_index("Index3D", idx, self.len())?;
        let w = self.w as usize;
        let h = self.h as usize;
        Ok(GridPos::new(
            (idx % w) as u32,
            ((idx / w) % h) as u32,
            (idx / (w * h)) as u32,
        ))
    }

    /// 坐标是否位于网格内
    #[inline]
    pub const fn contains(&self, pos: GridPos) -> bool {
        pos.i < self.w && pos.j < self.h && pos.k < self.d
    }

    /// 沿某轴周期回绕的坐标分量
    #[inline]
    pub fn wrap(&self, axis: Axis, coord: i64) -> u32 {
        coord.rem_euclid(self.extent(axis) as i64) as u32
    }
}
