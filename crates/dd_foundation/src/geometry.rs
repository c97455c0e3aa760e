// crates/dd_foundation/src/geometry.rs

//! 正交模拟盒
//!
//! `BoxDim` 描述一个轴对齐的长方体区域（下角 `lo`、上角 `hi`）及每个轴的周期性。
//! 全局模拟盒、子域盒、覆盖盒和回绕盒都用它表示。
//!
//! 区间约定为半开区间 `[lo, hi)`：位于 `hi` 上的点属于下一个子域。

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{DdError, DdResult};

/// 坐标轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// x 轴
    X,
    /// y 轴
    Y,
    /// z 轴
    Z,
}

impl Axis {
    /// 全部坐标轴（固定顺序）
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// 分量下标
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// 轴对齐盒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxDim {
    lo: DVec3,
    hi: DVec3,
    periodic: [bool; 3],
}

impl BoxDim {
    /// 创建全周期盒
    ///
    /// 要求所有分量有限且 `lo < hi`。
    pub fn new(lo: DVec3, hi: DVec3) -> DdResult<Self> {
        if !lo.is_finite() || !hi.is_finite() {
            return Err(DdError::invalid_geometry(format!(
                "盒子角点必须为有限值: lo={lo}, hi={hi}"
            )));
        }
        if lo.cmpge(hi).any() {
            return Err(DdError::invalid_geometry(format!(
                "盒子上下界颠倒或退化: lo={lo}, hi={hi}"
            )));
        }
        Ok(Self { lo, hi, periodic: [true; 3] })
    }

    /// 以原点为中心、边长为 `l` 的立方盒
    pub fn cube(l: f64) -> Self {
        let half = DVec3::splat(0.5 * l.abs());
        Self { lo: -half, hi: half, periodic: [true; 3] }
    }

    /// 设置各轴周期性
    #[must_use]
    pub fn with_periodic(mut self, periodic: [bool; 3]) -> Self {
        self.periodic = periodic;
        self
    }

    /// 下角
    #[inline]
    pub fn lo(&self) -> DVec3 {
        self.lo
    }

    /// 上角
    #[inline]
    pub fn hi(&self) -> DVec3 {
        self.hi
    }

    /// 各轴周期性
    #[inline]
    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    /// 指定轴是否周期
    #[inline]
    pub fn is_periodic(&self, axis: Axis) -> bool {
        self.periodic[axis.index()]
    }

    /// 各轴边长
    #[inline]
    pub fn lengths(&self) -> DVec3 {
        self.hi - self.lo
    }

    /// 点是否位于 `[lo, hi)` 内
    pub fn contains(&self, p: DVec3) -> bool {
        p.cmpge(self.lo).all() && p.cmplt(self.hi).all()
    }

    /// 整体平移
    #[must_use]
    pub fn shifted(&self, delta: DVec3) -> Self {
        Self { lo: self.lo + delta, hi: self.hi + delta, periodic: self.periodic }
    }

    /// 将坐标回绕进盒内（仅周期轴）
    ///
    /// 非周期轴上的分量保持不变。
    pub fn wrap(&self, p: [f64; 3]) -> [f64; 3] {
        let mut out = p;
        for axis in Axis::ALL {
            let a = axis.index();
            if !self.periodic[a] {
                continue;
            }
            let (lo, hi) = (self.lo[a], self.hi[a]);
            let x = out[a];
            if x >= lo && x < hi {
                continue;
            }
            let len = hi - lo;
            let mut w = x - len * ((x - lo) / len).floor();
            // 舍入可能恰好落在上界
            if w >= hi {
                w = lo;
            }
            out[a] = w;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_inverted() {
        assert!(BoxDim::new(DVec3::ONE, DVec3::ZERO).is_err());
        assert!(BoxDim::new(DVec3::ZERO, DVec3::new(1.0, 0.0, 1.0)).is_err());
        assert!(BoxDim::new(DVec3::ZERO, DVec3::new(f64::NAN, 1.0, 1.0)).is_err());
        assert!(BoxDim::new(DVec3::ZERO, DVec3::ONE).is_ok());
    }

    #[test]
    fn test_cube_and_contains() {
        let b = BoxDim::cube(4.0);
        assert_eq!(b.lo(), DVec3::splat(-2.0));
        assert!(b.contains(DVec3::new(-2.0, 0.0, 1.9)));
        assert!(!b.contains(DVec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_wrap_high_and_low() {
        let b = BoxDim::cube(10.0);
        let hi = b.wrap([5.5, 0.0, 0.0]);
        assert!((hi[0] - (5.5 - 10.0)).abs() < 1e-12);
        let lo = b.wrap([0.0, -5.25, 0.0]);
        assert!((lo[1] - (-5.25 + 10.0)).abs() < 1e-12);
        // 盒内点不变
        assert_eq!(b.wrap([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_wrap_skips_non_periodic_axis() {
        let b = BoxDim::cube(10.0).with_periodic([true, false, true]);
        let p = b.wrap([6.0, 6.0, -6.0]);
        assert!((p[0] + 4.0).abs() < 1e-12);
        assert_eq!(p[1], 6.0);
        assert!((p[2] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_shifted() {
        let b = BoxDim::cube(2.0).shifted(DVec3::new(0.5, 0.0, 0.0));
        assert_eq!(b.lo().x, -0.5);
        assert_eq!(b.hi().x, 1.5);
        assert_eq!(b.lengths(), DVec3::splat(2.0));
    }
}
