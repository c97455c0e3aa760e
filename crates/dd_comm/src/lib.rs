// crates/dd_comm/src/lib.rs

//! DomainDrift Communication Layer (Layer 3)
//!
//! 空间区域分解的通信层：计算周期进程网格上的邻居拓扑，并在每个模拟步
//! 沿六个面方向迁移越界粒子。
//!
//! # 模块概览
//!
//! - [`face`]: 六个面方向及其通信标志位
//! - [`grid`]: 进程网格形状与自动分解
//! - [`decomposition`]: 区域分解（rank 表、子域盒、面邻居）
//! - [`topology`]: 26 邻居合并拓扑
//! - [`flags`]: 粒子通信标志分类
//! - [`particles`]: 线格式粒子记录与粒子存储
//! - [`transport`]: 底层消息传输（进程内实现基于 crossbeam 通道）
//! - [`communicator`]: 迁移轮次状态机
//! - [`stats`]: 通信统计
//! - [`error`]: 通信错误类型
//!
//! # 一轮迁移
//!
//! ```text
//! for face in [-x, +x, -y, +y, -z, +z]:      (未分解的轴跳过)
//!     classify -> extract -> 交换数量 -> 交换载荷 -> rewrap -> merge
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "layer-guard")]
compile_error!("dd_comm 禁止在 Layer 2 或更低层使用");

pub mod communicator;
pub mod decomposition;
pub mod error;
pub mod face;
pub mod flags;
pub mod grid;
pub mod particles;
pub mod stats;
pub mod topology;
pub mod transport;

/// 层级标识
pub const LAYER: u8 = 3;

// 重导出核心类型
pub use communicator::{
    CoverageFn, CoverageProvider, DomainCommunicator, MarginCoverage, RoundStatus, RoundSummary,
};
pub use decomposition::DomainDecomposition;
pub use error::{CommError, CommResult};
pub use face::Face;
pub use grid::ProcessGrid;
pub use particles::{ParticleData, ParticleRecord, ParticleStore};
pub use stats::{CommStats, CommStatsSnapshot};
pub use topology::{direction_bit, direction_index, Neighbor, NeighborTopology};
pub use transport::{local_cluster, LocalTransport, MessageTag, Transport};

/// 预导入模块
pub mod prelude {
    pub use crate::communicator::{CoverageProvider, DomainCommunicator, RoundStatus};
    pub use crate::decomposition::DomainDecomposition;
    pub use crate::error::{CommError, CommResult};
    pub use crate::face::Face;
    pub use crate::grid::ProcessGrid;
    pub use crate::particles::{ParticleData, ParticleRecord, ParticleStore};
    pub use crate::transport::{local_cluster, Transport};
}
