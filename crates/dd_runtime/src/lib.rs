// crates/dd_runtime/src/lib.rs

//! DomainDrift Runtime Layer (Layer 2)
//!
//! 运行时抽象层，提供执行后端和主机/设备统一内存容器。
//!
//! # 模块概览
//!
//! - [`backend`]: Backend trait、HostBackend 与 StreamBackend
//! - [`array`]: UnifiedArray 统一数组及其作用域句柄 ArrayHandle
//! - [`error`]: 运行时错误类型
//!
//! # 设计原则
//!
//! 1. **单一所有者**: 同一时刻最多存在一个 ArrayHandle，第二次获取是契约错误
//! 2. **隐式一致性**: 在设备可用的数组上请求主机访问前，先等待设备工作完成
//! 3. **能力固定**: 设备能力在构造时由后端决定，之后不可更改

#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "layer-guard")]
compile_error!("dd_runtime 禁止在 Layer 1 或更低层使用");

pub mod array;
pub mod backend;
pub mod error;

/// 层级标识
pub const LAYER: u8 = 2;

// 重导出核心类型
pub use array::{AccessMode, ArrayHandle, UnifiedArray};
pub use backend::{Backend, HostBackend, MemoryLocation, SharedBackend, StreamBackend};
pub use error::{RuntimeError, RuntimeResult};

/// Prelude 模块
pub mod prelude {
    //! 常用类型预导入
    pub use crate::{
        AccessMode, ArrayHandle, Backend, HostBackend, MemoryLocation, RuntimeError,
        RuntimeResult, SharedBackend, StreamBackend, UnifiedArray,
    };
}
