// crates/dd_config/src/lib.rs

//! DomainDrift Config Layer (Layer 4)
//!
//! 配置层，负责运行配置的加载、校验与保存，以及执行后端的运行时选择。
//!
//! # 模块概览
//!
//! - [`backend_kind`]: BackendKind 枚举（host / stream）
//! - [`run_config`]: RunConfig 运行配置（JSON）
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 5: dd_cli        ─> uses RunConfig, BackendKind
//! Layer 4: dd_config     ─> RunConfig, BackendKind (本层)
//! Layer 3: dd_comm       ─> DomainCommunicator, ProcessGrid
//! Layer 2: dd_runtime    ─> Backend, UnifiedArray
//! Layer 1: dd_foundation
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "layer-guard")]
compile_error!("dd_config 禁止在 Layer 4 以下使用");

pub mod backend_kind;
pub mod error;
pub mod run_config;

/// 层级标识
pub const LAYER: u8 = 4;

// 重导出核心类型
pub use backend_kind::BackendKind;
pub use error::ConfigError;
pub use run_config::{DecompositionConfig, DomainConfig, ParticleConfig, RunConfig, RuntimeConfig};
