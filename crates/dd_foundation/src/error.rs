// crates/dd_foundation/src/error.rs

//! 错误处理模块，定义基础层统一错误类型
//!
//! 提供 `DdError` 枚举和 `DdResult` 类型别名。
//!
//! # 设计原则
//!
//! 1. **层次化**: 基础层只定义几何与索引相关错误，运行时/通信错误在上层定义
//! 2. **易用性**: 提供便捷的构造方法
//! 3. **可追溯**: 上层错误通过 `#[from]` 包装本类型
//!
//! # 示例
//!
//! ```
//! use dd_foundation::error::{DdError, DdResult};
//!
//! fn check_extent(n: u32) -> DdResult<()> {
//!     if n == 0 {
//!         return Err(DdError::invalid_input("网格维度不能为零"));
//!     }
//!     Ok(())
//! }
//! assert!(check_extent(0).is_err());
//! ```

use thiserror::Error;

/// 统一结果类型
pub type DdResult<T> = Result<T, DdError>;

/// DomainDrift 基础错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DdError {
    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 数据超出范围
    #[error("数据超出范围: {field}={value}, 期望范围=[{min}, {max}]")]
    OutOfRange {
        /// 字段名
        field: &'static str,
        /// 实际值
        value: f64,
        /// 最小允许值
        min: f64,
        /// 最大允许值
        max: f64,
    },

    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 索引类别描述
        index_type: &'static str,
        /// 访问的索引
        index: usize,
        /// 上界（长度）
        len: usize,
    },

    /// 无效几何（盒子退化、上下界颠倒等）
    #[error("无效的几何: {message}")]
    InvalidGeometry {
        /// 具体错误信息
        message: String,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl DdError {
    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 数据超出范围
    pub fn out_of_range(field: &'static str, value: f64, min: f64, max: f64) -> Self {
        Self::OutOfRange {
            field,
            value,
            min,
            max,
        }
    }

    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 索引越界
    pub fn index_out_of_bounds(index_type: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            index_type,
            index,
            len,
        }
    }

    /// 无效几何
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            message: message.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl DdError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> DdResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查值是否在范围内
    #[inline]
    pub fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> DdResult<()> {
        if value < min || value > max {
            Err(Self::out_of_range(field, value, min, max))
        } else {
            Ok(())
        }
    }

    /// 检查索引是否在范围内
    #[inline]
    pub fn check_index(index_type: &'static str, index: usize, len: usize) -> DdResult<()> {
        if index >= len {
            Err(Self::index_out_of_bounds(index_type, index, len))
        } else {
            Ok(())
        }
    }
}

/// 条件不满足时提前返回错误
///
/// ```
/// use dd_foundation::{ensure, DdError, DdResult};
///
/// fn positive(v: i32) -> DdResult<i32> {
///     ensure!(v > 0, DdError::invalid_input("必须为正"));
///     Ok(v)
/// }
/// assert!(positive(-1).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err(($err).into());
        }
    };
}

// ========================================================================
// 测试
// ========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DdError::invalid_geometry("lo > hi");
        assert!(err.to_string().contains("无效的几何"));
        assert!(err.to_string().contains("lo > hi"));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let err = DdError::index_out_of_bounds("Rank", 10, 8);
        let msg = err.to_string();
        assert!(msg.contains("Rank"));
        assert!(msg.contains("10"));
        assert!(msg.contains("8"));
    }

    #[test]
    fn test_check_helpers() {
        assert!(DdError::check_size("ranks", 8, 8).is_ok());
        assert!(DdError::check_size("ranks", 8, 4).is_err());
        assert!(DdError::check_range("margin", 0.5, 0.0, 1.0).is_ok());
        assert!(DdError::check_range("margin", 1.5, 0.0, 1.0).is_err());
        assert!(DdError::check_index("Rank", 7, 8).is_ok());
        assert!(DdError::check_index("Rank", 8, 8).is_err());
    }

    #[test]
    fn test_ensure_macro() {
        fn check(value: i32) -> DdResult<()> {
            ensure!(value > 0, DdError::invalid_input("value must be positive"));
            Ok(())
        }

        assert!(check(1).is_ok());
        assert!(check(-1).is_err());
    }
}
