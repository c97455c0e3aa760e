// crates/dd_runtime/src/array.rs

//! UnifiedArray - 主机/设备统一数组
//!
//! 单一所有者的连续类型化缓冲区，在主机与（可选）设备上均可见，无需显式拷贝。
//!
//! # 访问约束
//!
//! 数据只能通过 [`UnifiedArray::acquire`] 返回的 [`ArrayHandle`] 访问。句柄存活期间：
//!
//! - 再次 `acquire` 返回 [`RuntimeError::ScopingViolation`]
//! - 结构性操作（`resize`、`swap`、`take`、`assign_from`、`try_clone`）同样失败
//!
//! 这不是仲裁锁：获取从不阻塞，冲突即契约错误。句柄在任何退出路径上都会释放。
//!
//! # 布局
//!
//! - 1D: `pitch = count`, `height = 1`
//! - 2D: `pitch` 为宽度向上取整到 16 的倍数（合并访问填充），填充元素不参与逻辑寻址
//!
//! ```
//! use dd_runtime::{AccessMode, HostBackend, MemoryLocation, UnifiedArray};
//!
//! let mut arr: UnifiedArray<u32> = UnifiedArray::new(4, HostBackend::shared());
//! {
//!     let mut h = arr.acquire(MemoryLocation::Host, AccessMode::Overwrite).unwrap();
//!     h.as_mut_slice().unwrap().copy_from_slice(&[1, 2, 3, 4]);
//! }
//! arr.resize(6).unwrap();
//! assert_eq!(arr.host_to_vec().unwrap(), vec![1, 2, 3, 4, 0, 0]);
//! ```

use bytemuck::Pod;
use dd_foundation::AlignedBuffer;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::error;

use crate::backend::{MemoryLocation, SharedBackend};
use crate::error::{RuntimeError, RuntimeResult};

/// 2D 数组行宽对齐（元素数）
pub const PITCH_ALIGN: usize = 16;

/// 行宽向上取整到 [`PITCH_ALIGN`] 的倍数
#[inline]
pub const fn padded_pitch(width: usize) -> usize {
    (width + PITCH_ALIGN - 1) / PITCH_ALIGN * PITCH_ALIGN
}

/// 访问模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// 只读
    Read,
    /// 读写
    ReadWrite,
    /// 覆盖写（不关心原有内容）
    Overwrite,
}

impl AccessMode {
    /// 是否允许写入
    #[inline]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// 主机/设备统一数组
pub struct UnifiedArray<T: Pod> {
    storage: Mutex<AlignedBuffer<T>>,
    pitch: usize,
    height: usize,
    device_capable: bool,
    backend: SharedBackend,
}

impl<T: Pod> UnifiedArray<T> {
    /// 分配 1D 数组（零初始化）
    pub fn new(count: usize, backend: SharedBackend) -> Self {
        let device_capable = backend.is_device_capable();
        let storage = AlignedBuffer::zeroed(count, backend.allocation_align());
        Self {
            storage: Mutex::new(storage),
            pitch: count,
            height: 1,
            device_capable,
            backend,
        }
    }

    /// 分配 2D 数组，`pitch` 为 `width` 向上取整到 16 的倍数
    pub fn new_2d(width: usize, height: usize, backend: SharedBackend) -> Self {
        let device_capable = backend.is_device_capable();
        let pitch = padded_pitch(width);
        let storage = AlignedBuffer::zeroed(pitch * height, backend.allocation_align());
        Self {
            storage: Mutex::new(storage),
            pitch,
            height,
            device_capable,
            backend,
        }
    }

    /// 空数组（pitch = 0, height = 0）
    pub fn empty(backend: SharedBackend) -> Self {
        let mut arr = Self::new(0, backend);
        arr.height = 0;
        arr
    }

    /// 从切片构造 1D 数组
    pub fn from_slice(data: &[T], backend: SharedBackend) -> Self {
        let device_capable = backend.is_device_capable();
        let storage = AlignedBuffer::from_slice(data, backend.allocation_align());
        Self {
            storage: Mutex::new(storage),
            pitch: data.len(),
            height: 1,
            device_capable,
            backend,
        }
    }

    /// 行宽（含填充）
    #[inline]
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// 行数
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// 分配的元素总数（`pitch * height`）
    #[inline]
    pub fn num_elements(&self) -> usize {
        self.pitch * self.height
    }

    /// 是否未分配
    #[inline]
    pub fn is_null(&self) -> bool {
        self.num_elements() == 0
    }

    /// 是否存在未释放的句柄
    #[inline]
    pub fn is_acquired(&self) -> bool {
        self.storage.is_locked()
    }

    /// 是否具备设备能力（构造时固定）
    #[inline]
    pub fn is_device_capable(&self) -> bool {
        self.device_capable
    }

    /// 关联的后端
    #[inline]
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// 获取访问句柄
    ///
    /// 已被获取时返回 `ScopingViolation`。在设备可用的数组上请求主机访问时，
    /// 先等待所有未完成的设备工作。
    pub fn acquire(
        &self,
        location: MemoryLocation,
        mode: AccessMode,
    ) -> RuntimeResult<ArrayHandle<'_, T>> {
        self.check_not_acquired("acquire")?;

        // 先等待设备工作，再标记为已获取
        if location == MemoryLocation::Host && self.device_capable && !self.is_null() {
            self.backend.synchronize();
        }

        let guard = match self.storage.try_lock() {
            Some(guard) => guard,
            None => {
                error!(?location, ?mode, "UnifiedArray 重复获取");
                return Err(RuntimeError::scoping("acquire"));
            }
        };

        Ok(ArrayHandle {
            guard,
            location,
            mode,
            pitch: self.pitch,
            height: self.height,
        })
    }

    /// 以只读方式复制到主机 `Vec`
    pub fn host_to_vec(&self) -> RuntimeResult<Vec<T>> {
        let handle = self.acquire(MemoryLocation::Host, AccessMode::Read)?;
        Ok(handle.to_vec())
    }

    /// 调整为 1D 数组，保留前 `min(old, new)` 个元素
    pub fn resize(&mut self, count: usize) -> RuntimeResult<()> {
        self.check_not_acquired("resize")?;
        self.sync_device();

        let old = self.storage.get_mut();
        let mut fresh = AlignedBuffer::zeroed(count, old.align());
        let n = old.len().min(count);
        fresh[..n].copy_from_slice(&old[..n]);
        *old = fresh;

        self.pitch = count;
        self.height = 1;
        Ok(())
    }

    /// 调整为 2D 数组，逐行保留 `min(old_rows, new_rows) × min(old_pitch, new_pitch)` 前缀
    pub fn resize_2d(&mut self, width: usize, height: usize) -> RuntimeResult<()> {
        self.check_not_acquired("resize")?;
        self.sync_device();

        let pitch = padded_pitch(width);
        let old_pitch = self.pitch;
        let rows = self.height.min(height);
        let cols = old_pitch.min(pitch);

        let old = self.storage.get_mut();
        let mut fresh = AlignedBuffer::zeroed(pitch * height, old.align());
        for r in 0..rows {
            let src = r * old_pitch;
            let dst = r * pitch;
            fresh[dst..dst + cols].copy_from_slice(&old[src..src + cols]);
        }
        *old = fresh;

        self.pitch = pitch;
        self.height = height;
        Ok(())
    }

    /// 深拷贝
    pub fn try_clone(&self) -> RuntimeResult<Self> {
        self.check_not_acquired("clone")?;
        self.sync_device();
        let storage = self.locked_storage("clone")?.clone();
        Ok(Self {
            storage: Mutex::new(storage),
            pitch: self.pitch,
            height: self.height,
            device_capable: self.device_capable,
            backend: Arc::clone(&self.backend),
        })
    }

    /// 拷贝赋值：用 `rhs` 的内容替换自身
    pub fn assign_from(&mut self, rhs: &Self) -> RuntimeResult<()> {
        self.check_not_acquired("assign")?;
        rhs.check_not_acquired("assign")?;
        rhs.sync_device();

        let storage = rhs.locked_storage("assign")?.clone();
        *self.storage.get_mut() = storage;
        self.pitch = rhs.pitch;
        self.height = rhs.height;
        self.device_capable = rhs.device_capable;
        self.backend = Arc::clone(&rhs.backend);
        Ok(())
    }

    /// 移出存储，自身变为 pitch = 0, height = 0
    pub fn take(&mut self) -> RuntimeResult<Self> {
        self.check_not_acquired("take")?;

        let storage = self.storage.get_mut();
        let align = storage.align();
        let moved = std::mem::replace(storage, AlignedBuffer::empty(align));
        let out = Self {
            storage: Mutex::new(moved),
            pitch: self.pitch,
            height: self.height,
            device_capable: self.device_capable,
            backend: Arc::clone(&self.backend),
        };
        self.pitch = 0;
        self.height = 0;
        Ok(out)
    }

    /// 交换两个数组的全部内容
    pub fn swap(&mut self, other: &mut Self) -> RuntimeResult<()> {
        self.check_not_acquired("swap")?;
        other.check_not_acquired("swap")?;

        std::mem::swap(self.storage.get_mut(), other.storage.get_mut());
        std::mem::swap(&mut self.pitch, &mut other.pitch);
        std::mem::swap(&mut self.height, &mut other.height);
        std::mem::swap(&mut self.device_capable, &mut other.device_capable);
        std::mem::swap(&mut self.backend, &mut other.backend);
        Ok(())
    }

    fn check_not_acquired(&self, operation: &'static str) -> RuntimeResult<()> {
        if self.storage.is_locked() {
            error!(operation, "UnifiedArray 在已获取状态下执行结构性操作");
            return Err(RuntimeError::scoping(operation));
        }
        Ok(())
    }

    fn locked_storage(
        &self,
        operation: &'static str,
    ) -> RuntimeResult<MutexGuard<'_, AlignedBuffer<T>>> {
        self.storage
            .try_lock()
            .ok_or(RuntimeError::scoping(operation))
    }

    fn sync_device(&self) {
        if self.device_capable {
            self.backend.synchronize();
        }
    }
}

impl<T: Pod> fmt::Debug for UnifiedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnifiedArray")
            .field("pitch", &self.pitch)
            .field("height", &self.height)
            .field("acquired", &self.is_acquired())
            .field("device_capable", &self.device_capable)
            .field("backend", &self.backend.name())
            .finish()
    }
}

// =============================================================================
// 访问句柄
// =============================================================================

/// 作用域访问句柄
///
/// 析构时自动释放；也可以调用 [`ArrayHandle::release`] 显式释放。
#[derive(Debug)]
pub struct ArrayHandle<'a, T: Pod> {
    guard: MutexGuard<'a, AlignedBuffer<T>>,
    location: MemoryLocation,
    mode: AccessMode,
    pitch: usize,
    height: usize,
}

impl<'a, T: Pod> ArrayHandle<'a, T> {
    /// 访问位置
    #[inline]
    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    /// 访问模式
    #[inline]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// 行宽
    #[inline]
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// 行数
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// 可写切片；只读句柄返回 `AccessModeViolation`
    pub fn as_mut_slice(&mut self) -> RuntimeResult<&mut [T]> {
        if !self.mode.is_writable() {
            error!(mode = ?self.mode, "只读句柄请求写访问");
            return Err(RuntimeError::AccessModeViolation { mode: self.mode });
        }
        Ok(self.guard.as_mut_slice())
    }

    /// 第 `r` 行（含填充）
    pub fn row(&self, r: usize) -> &[T] {
        let start = r * self.pitch;
        &self.guard[start..start + self.pitch]
    }

    /// 第 `r` 行的可写视图
    pub fn row_mut(&mut self, r: usize) -> RuntimeResult<&mut [T]> {
        let pitch = self.pitch;
        let start = r * pitch;
        Ok(&mut self.as_mut_slice()?[start..start + pitch])
    }

    /// 显式释放
    pub fn release(self) {}
}

impl<'a, T: Pod> Deref for ArrayHandle<'a, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.guard.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dd_foundation::GPU_ALIGN;
    use crate::backend::{HostBackend, StreamBackend};

    #[test]
    fn test_padded_pitch() {
        assert_eq!(padded_pitch(0), 0);
        assert_eq!(padded_pitch(1), 16);
        assert_eq!(padded_pitch(16), 16);
        assert_eq!(padded_pitch(17), 32);
    }

    #[test]
    fn test_new_layouts() {
        let a: UnifiedArray<f32> = UnifiedArray::new(10, HostBackend::shared());
        assert_eq!((a.pitch(), a.height(), a.num_elements()), (10, 1, 10));

        let b: UnifiedArray<f32> = UnifiedArray::new_2d(5, 3, HostBackend::shared());
        assert_eq!((b.pitch(), b.height(), b.num_elements()), (16, 3, 48));

        let e: UnifiedArray<f32> = UnifiedArray::empty(HostBackend::shared());
        assert!(e.is_null());
        assert_eq!((e.pitch(), e.height()), (0, 0));
    }

    #[test]
    fn test_double_acquire_is_scoping_violation() {
        let a: UnifiedArray<u32> = UnifiedArray::new(4, HostBackend::shared());
        let h = a.acquire(MemoryLocation::Host, AccessMode::Read).unwrap();
        assert!(a.is_acquired());

        let err = a.acquire(MemoryLocation::Host, AccessMode::Read).unwrap_err();
        assert!(matches!(err, RuntimeError::ScopingViolation { operation: "acquire" }));

        h.release();
        assert!(!a.is_acquired());
        assert!(a.acquire(MemoryLocation::Device(0), AccessMode::ReadWrite).is_ok());
    }

    #[test]
    fn test_read_handle_refuses_writes() {
        let a: UnifiedArray<u32> = UnifiedArray::new(4, HostBackend::shared());
        let mut h = a.acquire(MemoryLocation::Host, AccessMode::Read).unwrap();
        assert!(matches!(
            h.as_mut_slice(),
            Err(RuntimeError::AccessModeViolation { mode: AccessMode::Read })
        ));
    }

    #[test]
    fn test_structural_ops_fail_while_acquired() {
        let mut a: UnifiedArray<u32> = UnifiedArray::new(4, HostBackend::shared());
        let mut b: UnifiedArray<u32> = UnifiedArray::new(2, HostBackend::shared());

        // 泄漏句柄，使数组保持已获取状态
        std::mem::forget(a.acquire(MemoryLocation::Host, AccessMode::ReadWrite).unwrap());

        assert!(a.try_clone().unwrap_err().is_contract_violation());
        assert!(a.resize(8).unwrap_err().is_contract_violation());
        assert!(a.resize_2d(4, 4).unwrap_err().is_contract_violation());
        assert!(a.take().unwrap_err().is_contract_violation());
        assert!(a.swap(&mut b).unwrap_err().is_contract_violation());
        assert!(b.assign_from(&a).unwrap_err().is_contract_violation());

        // 失败的操作不改变形状
        assert_eq!((a.pitch(), a.height()), (4, 1));
        assert_eq!((b.pitch(), b.height()), (2, 1));
    }

    #[test]
    fn test_take_and_swap() {
        let mut a = UnifiedArray::from_slice(&[1u32, 2, 3], HostBackend::shared());
        let mut b = a.take().unwrap();
        assert_eq!((a.pitch(), a.height()), (0, 0));
        assert!(a.is_null());
        assert_eq!(b.host_to_vec().unwrap(), vec![1, 2, 3]);

        let mut c = UnifiedArray::from_slice(&[9u32], HostBackend::shared());
        b.swap(&mut c).unwrap();
        assert_eq!(b.host_to_vec().unwrap(), vec![9]);
        assert_eq!(c.host_to_vec().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_clone_is_deep() {
        let a = UnifiedArray::from_slice(&[1u32, 2], HostBackend::shared());
        let b = a.try_clone().unwrap();
        {
            let mut h = a.acquire(MemoryLocation::Host, AccessMode::ReadWrite).unwrap();
            h.as_mut_slice().unwrap()[0] = 7;
        }
        assert_eq!(b.host_to_vec().unwrap(), vec![1, 2]);

        let mut c: UnifiedArray<u32> = UnifiedArray::empty(HostBackend::shared());
        c.assign_from(&a).unwrap();
        assert_eq!(c.host_to_vec().unwrap(), vec![7, 2]);
    }

    #[test]
    fn test_host_acquire_synchronizes_device_work() {
        let backend = Arc::new(StreamBackend::new());
        let a: UnifiedArray<u32> = UnifiedArray::new(8, backend.clone());
        assert!(a.is_device_capable());

        backend.enqueue(|| {});
        let h = a.acquire(MemoryLocation::Device(0), AccessMode::ReadWrite).unwrap();
        assert_eq!(backend.pending(), 1);
        drop(h);

        let _h = a.acquire(MemoryLocation::Host, AccessMode::Read).unwrap();
        assert_eq!(backend.pending(), 0);
        assert_eq!(backend.sync_count(), 1);
    }

    #[test]
    fn test_device_capable_storage_alignment() {
        let a: UnifiedArray<u8> = UnifiedArray::new(3, Arc::new(StreamBackend::new()));
        let h = a.acquire(MemoryLocation::Device(0), AccessMode::Read).unwrap();
        assert_eq!((h.as_ptr() as usize) % GPU_ALIGN, 0);
    }

    /// 自定义对齐的主机后端
    #[derive(Debug)]
    struct PageAligned;

    impl crate::backend::Backend for PageAligned {
        fn name(&self) -> &'static str {
            "page"
        }

        fn memory_location(&self) -> MemoryLocation {
            MemoryLocation::Host
        }

        fn allocation_align(&self) -> usize {
            4096
        }
    }

    #[test]
    fn test_storage_uses_backend_alignment() {
        let backend: SharedBackend = Arc::new(PageAligned);
        let a: UnifiedArray<u32> = UnifiedArray::new(5, backend.clone());
        let b: UnifiedArray<u32> = UnifiedArray::new_2d(3, 2, backend.clone());
        let c = UnifiedArray::from_slice(&[1u64, 2, 3], backend);
        for ptr in [
            a.acquire(MemoryLocation::Host, AccessMode::Read).unwrap().as_ptr() as usize,
            b.acquire(MemoryLocation::Host, AccessMode::Read).unwrap().as_ptr() as usize,
            c.acquire(MemoryLocation::Host, AccessMode::Read).unwrap().as_ptr() as usize,
        ] {
            assert_eq!(ptr % 4096, 0);
        }
    }

    #[test]
    fn test_rows() {
        let mut a: UnifiedArray<u16> = UnifiedArray::new_2d(3, 2, HostBackend::shared());
        {
            let mut h = a.acquire(MemoryLocation::Host, AccessMode::Overwrite).unwrap();
            h.row_mut(1).unwrap()[..3].copy_from_slice(&[4, 5, 6]);
            assert_eq!(h.row(1).len(), 16);
        }
        a.resize_2d(2, 3).unwrap();
        let h = a.acquire(MemoryLocation::Host, AccessMode::Read).unwrap();
        assert_eq!(&h.row(1)[..2], &[4, 5]);
        assert!(h.row(2).iter().all(|&v| v == 0));
    }
}
