// crates/dd_runtime/src/backend.rs

//! Backend - 执行后端抽象
//!
//! 后端决定统一数组的设备能力与存储对齐，并提供同步屏障。
//!
//! - [`HostBackend`]: 纯主机执行，同步为空操作
//! - [`StreamBackend`]: 带异步工作队列的设备后端，`synchronize` 时排空队列
//!
//! 设备能力在数组构造时读取一次，之后固定。

use dd_foundation::{CPU_ALIGN, GPU_ALIGN};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 内存位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// 主机内存 (CPU)
    Host,
    /// 设备内存（设备编号）
    Device(usize),
}

/// 执行后端 Trait
pub trait Backend: Send + Sync + fmt::Debug {
    /// 后端名称
    fn name(&self) -> &'static str;

    /// 数据的主存放位置
    fn memory_location(&self) -> MemoryLocation;

    /// 是否具备设备能力
    fn is_device_capable(&self) -> bool {
        matches!(self.memory_location(), MemoryLocation::Device(_))
    }

    /// 存储对齐（字节）
    fn allocation_align(&self) -> usize {
        if self.is_device_capable() {
            GPU_ALIGN
        } else {
            CPU_ALIGN
        }
    }

    /// 阻塞直到所有未完成的设备工作结束
    fn synchronize(&self) {}
}

/// 共享后端句柄
pub type SharedBackend = Arc<dyn Backend>;

// =============================================================================
// 主机后端
// =============================================================================

/// 纯主机后端（零大小类型）
#[derive(Debug, Clone, Copy, Default)]
pub struct HostBackend;

impl HostBackend {
    /// 创建共享句柄
    pub fn shared() -> SharedBackend {
        Arc::new(Self)
    }
}

impl Backend for HostBackend {
    fn name(&self) -> &'static str {
        "host"
    }

    fn memory_location(&self) -> MemoryLocation {
        MemoryLocation::Host
    }
}

// =============================================================================
// 流式设备后端
// =============================================================================

type Work = Box<dyn FnOnce() + Send>;

/// 带异步工作队列的设备后端
///
/// 提交的工作不会立即执行，直到 `synchronize` 被调用。这模拟了设备流上的
/// 异步内核：主机必须先同步才能看到它们的结果。
pub struct StreamBackend {
    devices: Vec<usize>,
    queue: Mutex<Vec<Work>>,
    launches: AtomicU64,
    syncs: AtomicU64,
}

impl StreamBackend {
    /// 创建单设备后端
    pub fn new() -> Self {
        Self::with_devices(vec![0])
    }

    /// 创建多设备后端
    pub fn with_devices(devices: Vec<usize>) -> Self {
        let devices = if devices.is_empty() { vec![0] } else { devices };
        Self {
            devices,
            queue: Mutex::new(Vec::new()),
            launches: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
        }
    }

    /// 活动设备编号
    pub fn devices(&self) -> &[usize] {
        &self.devices
    }

    /// 异步提交一项工作
    pub fn enqueue<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.launches.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().push(Box::new(work));
    }

    /// 未完成的工作数
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// 累计提交次数
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }

    /// 累计同步次数
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }
}

impl Default for StreamBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBackend")
            .field("devices", &self.devices)
            .field("pending", &self.pending())
            .field("syncs", &self.sync_count())
            .finish()
    }
}

impl Backend for StreamBackend {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn memory_location(&self) -> MemoryLocation {
        MemoryLocation::Device(self.devices[0])
    }

    fn synchronize(&self) {
        // 取出队列后再执行，工作内部可以继续 enqueue
        let work: Vec<Work> = std::mem::take(&mut *self.queue.lock());
        tracing::trace!(devices = self.devices.len(), pending = work.len(), "设备同步");
        for w in work {
            w();
        }
        self.syncs.fetch_add(1, Ordering::Relaxed);
    }
}
