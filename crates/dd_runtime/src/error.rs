// crates/dd_runtime/src/error.rs

//! 运行时错误类型
//!
//! 区分两类错误：
//! - 契约错误（`ScopingViolation`、`AccessModeViolation`）：编程错误，调用方不应尝试恢复
//! - 普通错误（大小不匹配、基础层错误）

use dd_foundation::DdError;
use thiserror::Error;

use crate::array::AccessMode;

/// 运行时错误
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// 数组已被获取时执行了获取或结构性操作
    #[error("UnifiedArray 已被获取，无法执行 '{operation}'（ArrayHandle 作用域错误？）")]
    ScopingViolation {
        /// 被拒绝的操作
        operation: &'static str,
    },

    /// 以只读模式获取的句柄请求写访问
    #[error("访问模式 {mode:?} 不允许写入")]
    AccessModeViolation {
        /// 句柄的访问模式
        mode: AccessMode,
    },

    /// 缓冲区大小不匹配
    #[error("缓冲区大小不匹配: 期望 {expected}, 实际 {actual}")]
    BufferSizeMismatch {
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 基础层错误
    #[error(transparent)]
    Foundation(#[from] DdError),
}

impl RuntimeError {
    /// 作用域违规
    pub fn scoping(operation: &'static str) -> Self {
        Self::ScopingViolation { operation }
    }

    /// 是否为契约错误（编程错误）
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::ScopingViolation { .. } | Self::AccessModeViolation { .. }
        )
    }
}

/// 运行时结果类型
pub type RuntimeResult<T> = Result<T, RuntimeError>;
