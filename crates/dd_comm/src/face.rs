// crates/dd_comm/src/face.rs

//! 面方向
//!
//! 六个面按迁移轮次的固定顺序编号：`-x, +x, -y, +y, -z, +z`。
//! 面 `f` 的通信标志位为 `1 << f as u32`。

use dd_foundation::Axis;
use serde::{Deserialize, Serialize};

/// 子域的面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Face {
    /// -x
    West = 0,
    /// +x
    East = 1,
    /// -y
    South = 2,
    /// +y
    North = 3,
    /// -z
    Down = 4,
    /// +z
    Up = 5,
}

impl Face {
    /// 迁移轮次的处理顺序
    pub const ALL: [Face; 6] = [
        Face::West,
        Face::East,
        Face::South,
        Face::North,
        Face::Down,
        Face::Up,
    ];

    /// 所有面标志位的并集
    pub const ALL_BITS: u32 = 0b11_1111;

    /// 编号
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 通信标志位
    #[inline]
    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// 所在轴
    #[inline]
    pub const fn axis(self) -> Axis {
        match self {
            Face::West | Face::East => Axis::X,
            Face::South | Face::North => Axis::Y,
            Face::Down | Face::Up => Axis::Z,
        }
    }

    /// 是否为正方向
    #[inline]
    pub const fn is_positive(self) -> bool {
        matches!(self, Face::East | Face::North | Face::Up)
    }

    /// 对面
    #[inline]
    pub const fn opposite(self) -> Face {
        match self {
            Face::West => Face::East,
            Face::East => Face::West,
            Face::South => Face::North,
            Face::North => Face::South,
            Face::Down => Face::Up,
            Face::Up => Face::Down,
        }
    }

    /// 指定轴与方向上的面
    #[inline]
    pub const fn on(axis: Axis, positive: bool) -> Face {
        match (axis, positive) {
            (Axis::X, false) => Face::West,
            (Axis::X, true) => Face::East,
            (Axis::Y, false) => Face::South,
            (Axis::Y, true) => Face::North,
            (Axis::Z, false) => Face::Down,
            (Axis::Z, true) => Face::Up,
        }
    }

    /// 网格偏移 `(dx, dy, dz)`
    pub const fn offset(self) -> [i32; 3] {
        let s = if self.is_positive() { 1 } else { -1 };
        match self.axis() {
            Axis::X => [s, 0, 0],
            Axis::Y => [0, s, 0],
            Axis::Z => [0, 0, s],
        }
    }

    /// 由标志位还原面（仅单一位有效）
    pub fn from_bit(bit: u32) -> Option<Face> {
        Face::ALL.into_iter().find(|f| f.bit() == bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_bits() {
        let bits: u32 = Face::ALL.iter().map(|f| f.bit()).fold(0, |a, b| a | b);
        assert_eq!(bits, Face::ALL_BITS);
        for (i, f) in Face::ALL.iter().enumerate() {
            assert_eq!(f.index(), i);
        }
        assert_eq!(Face::ALL[0], Face::West);
        assert_eq!(Face::ALL[1], Face::East);
    }

    #[test]
    fn test_opposite_and_axis() {
        for f in Face::ALL {
            assert_eq!(f.opposite().opposite(), f);
            assert_eq!(f.opposite().axis(), f.axis());
            assert_ne!(f.opposite().is_positive(), f.is_positive());
            assert_eq!(Face::on(f.axis(), f.is_positive()), f);
            assert_eq!(Face::from_bit(f.bit()), Some(f));
        }
        assert_eq!(Face::from_bit(0b11), None);
    }

    #[test]
    fn test_offset() {
        assert_eq!(Face::East.offset(), [1, 0, 0]);
        assert_eq!(Face::South.offset(), [0, -1, 0]);
        assert_eq!(Face::Up.offset(), [0, 0, 1]);
    }
}
