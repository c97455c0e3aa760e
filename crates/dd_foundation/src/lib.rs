// crates/dd_foundation/src/lib.rs

//! DomainDrift Foundation Layer (Layer 1)
//!
//! 基础层，提供整个项目共用的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `DdError`
//! - [`memory`]: 运行时对齐的连续缓冲区 `AlignedBuffer`
//! - [`geometry`]: 正交模拟盒 `BoxDim`
//! - [`index`]: 三维网格索引 `Index3D` / `GridPos`
//!
//! # 层级架构
//!
//! ```text
//! Layer 5: dd_cli        ─> run / topology / validate
//! Layer 4: dd_config     ─> RunConfig
//! Layer 3: dd_comm       ─> DomainCommunicator, NeighborTopology
//! Layer 2: dd_runtime    ─> Backend, UnifiedArray
//! Layer 1: dd_foundation ─> BoxDim, Index3D, AlignedBuffer (本层)
//! ```
//!
//! # 示例
//!
//! ```
//! use dd_foundation::{BoxDim, Index3D};
//! use glam::DVec3;
//!
//! let global = BoxDim::cube(10.0);
//! assert_eq!(global.lengths(), DVec3::splat(10.0));
//!
//! let di = Index3D::new(2, 2, 2);
//! assert_eq!(di.index(1, 1, 1), 7);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "layer-guard")]
compile_error!("dd_foundation 是最底层，不应启用 layer-guard");

pub mod error;
pub mod geometry;
pub mod index;
pub mod memory;

/// 层级标识
pub const LAYER: u8 = 1;

// 重导出常用类型
pub use error::{DdError, DdResult};
pub use geometry::{Axis, BoxDim};
pub use index::{GridPos, Index3D};
pub use memory::{AlignedBuffer, CPU_ALIGN, GPU_ALIGN};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{DdError, DdResult};
    pub use crate::geometry::{Axis, BoxDim};
    pub use crate::index::{GridPos, Index3D};
    pub use crate::ensure;
}
