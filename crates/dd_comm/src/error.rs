// crates/dd_comm/src/error.rs

//! 通信层错误类型

use dd_foundation::{Axis, DdError};
use dd_runtime::RuntimeError;
use thiserror::Error;

use crate::transport::MessageTag;

/// 通信错误
#[derive(Error, Debug)]
pub enum CommError {
    /// 拓扑或分解配置错误（构造时检出）
    #[error("拓扑错误: {0}")]
    Topology(String),

    /// rank 超出范围
    #[error("无效 rank {rank}（共 {num_ranks} 个）")]
    InvalidRank {
        /// 请求的 rank
        rank: u32,
        /// rank 总数
        num_ranks: u32,
    },

    /// 覆盖盒在某个分解轴上两侧同时越过全局盒
    #[error("覆盖盒无效: {axis:?} 轴两侧同时越过全局盒")]
    InvalidCoverage {
        /// 出错的轴
        axis: Axis,
    },

    /// 收到的消息长度与接收缓冲区不符
    #[error("消息大小不匹配: 来自 rank {peer} 的 {tag:?} 期望 {expected} 字节, 实际 {actual}")]
    MessageSize {
        /// 发送方
        peer: u32,
        /// 消息标签
        tag: MessageTag,
        /// 期望字节数
        expected: usize,
        /// 实际字节数
        actual: usize,
    },

    /// 对端通道已关闭
    #[error("与 rank {peer} 的连接已断开")]
    Disconnected {
        /// 对端 rank
        peer: u32,
    },

    /// 运行时错误（数组契约等）
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// 基础层错误
    #[error(transparent)]
    Foundation(#[from] DdError),
}

impl CommError {
    /// 拓扑错误
    pub fn topology(message: impl Into<String>) -> Self {
        Self::Topology(message.into())
    }
}

/// 通信结果类型
pub type CommResult<T> = Result<T, CommError>;
