// crates/dd_config/src/backend_kind.rs

//! 运行时后端选择
//!
//! 在应用层按名称选择执行后端，构造对应的 [`SharedBackend`]。

use dd_runtime::{HostBackend, SharedBackend, StreamBackend};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// 执行后端种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// 纯主机
    #[default]
    Host,
    /// 带异步工作队列的设备后端
    Stream,
}

impl BackendKind {
    /// 后端名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Stream => "stream",
        }
    }

    /// 是否具备设备能力
    #[inline]
    pub fn is_device_capable(&self) -> bool {
        matches!(self, Self::Stream)
    }

    /// 构造共享后端
    pub fn build(&self) -> SharedBackend {
        match self {
            Self::Host => HostBackend::shared(),
            Self::Stream => Arc::new(StreamBackend::new()),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 后端名称解析错误
#[derive(Debug, Clone)]
pub struct BackendParseError(String);

impl FromStr for BackendKind {
    type Err = BackendParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "host" | "cpu" => Ok(Self::Host),
            "stream" | "device" | "gpu" => Ok(Self::Stream),
            _ => Err(BackendParseError(s.to_string())),
        }
    }
}

impl std::fmt::Display for BackendParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "无效的后端: '{}', 期望 'host' 或 'stream'", self.0)
    }
}

impl std::error::Error for BackendParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("host".parse::<BackendKind>().unwrap(), BackendKind::Host);
        assert_eq!("GPU".parse::<BackendKind>().unwrap(), BackendKind::Stream);
        assert!("tpu".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_build() {
        assert!(!BackendKind::Host.build().is_device_capable());
        assert!(BackendKind::Stream.build().is_device_capable());
        assert_eq!(BackendKind::Stream.to_string(), "stream");
    }
}
