// crates/dd_foundation/src/memory.rs

//! Memory alignment utilities.
//!
//! Provides `AlignedBuffer`, a fixed-length, zero-initialised buffer whose
//! alignment is chosen at run time. The unified array in `dd_runtime` uses it
//! as backing storage: host-only arrays align to a cache line, device-capable
//! arrays to the coalescing boundary.

use bytemuck::Pod;
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// CPU alignment (64-byte cache line / AVX-512).
pub const CPU_ALIGN: usize = 64;

/// GPU alignment (256-byte for coalesced device access).
pub const GPU_ALIGN: usize = 256;

/// 运行时对齐的定长缓冲区
///
/// 长度在构造时确定，扩容由上层通过「分配-复制-交换」完成。
#[derive(Debug)]
pub struct AlignedBuffer<T: Pod> {
    ptr: NonNull<T>,
    len: usize,
    align: usize,
}

unsafe impl<T: Pod + Send> Send for AlignedBuffer<T> {}
unsafe impl<T: Pod + Sync> Sync for AlignedBuffer<T> {}

impl<T: Pod> AlignedBuffer<T> {
    /// Create a zero-initialised buffer of `len` elements.
    ///
    /// `align` is raised to `align_of::<T>()` if smaller and must be a power of two.
    pub fn zeroed(len: usize, align: usize) -> Self {
        let align = align.max(std::mem::align_of::<T>());
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");

        if len == 0 || std::mem::size_of::<T>() == 0 {
            return Self { ptr: NonNull::dangling(), len, align };
        }

        let layout = Self::layout_for(len, align);
        // SAFETY: layout has non-zero size; T: Pod so all-zero bytes are a valid T.
        let raw = unsafe { alloc_zeroed(layout) as *mut T };
        let ptr = match NonNull::new(raw) {
            Some(p) => p,
            None => handle_alloc_error(layout),
        };

        debug_assert_eq!((ptr.as_ptr() as usize) % align, 0, "Alignment guarantee violated");

        Self { ptr, len, align }
    }

    /// Empty buffer (no allocation).
    pub fn empty(align: usize) -> Self {
        Self::zeroed(0, align)
    }

    /// Copy a slice into a freshly aligned buffer.
    pub fn from_slice(data: &[T], align: usize) -> Self {
        let mut buf = Self::zeroed(data.len(), align);
        buf.as_mut_slice().copy_from_slice(data);
        buf
    }

    /// Length in elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Empty check.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Effective byte alignment.
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Raw pointer.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Immutable slice view.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: ptr is valid for len elements (or dangling with len 0 / ZST).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mutable slice view.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn layout_for(len: usize, align: usize) -> Layout {
        let size = len
            .checked_mul(std::mem::size_of::<T>())
            .expect("AlignedBuffer capacity overflow");
        Layout::from_size_align(size, align).expect("Invalid layout")
    }
}

impl<T: Pod> Deref for AlignedBuffer<T> {
    type Target = [T];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: Pod> DerefMut for AlignedBuffer<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T: Pod> Clone for AlignedBuffer<T> {
    fn clone(&self) -> Self {
        Self::from_slice(self.as_slice(), self.align)
    }
}

impl<T: Pod> Drop for AlignedBuffer<T> {
    fn drop(&mut self) {
        if self.len == 0 || std::mem::size_of::<T>() == 0 {
            return;
        }
        let layout = Self::layout_for(self.len, self.align);
        // SAFETY: allocated in `zeroed` with exactly this layout. Pod needs no drop glue.
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_basic() {
        let mut buf: AlignedBuffer<f64> = AlignedBuffer::zeroed(10, CPU_ALIGN);
        assert_eq!(buf.len(), 10);
        assert!(buf.iter().all(|&x| x == 0.0));
        buf[3] = 1.5;
        assert!((buf[3] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_alignment() {
        let cpu: AlignedBuffer<f32> = AlignedBuffer::zeroed(100, CPU_ALIGN);
        assert_eq!((cpu.as_ptr() as usize) % 64, 0);

        let gpu: AlignedBuffer<u32> = AlignedBuffer::zeroed(100, GPU_ALIGN);
        assert_eq!((gpu.as_ptr() as usize) % 256, 0);
        assert_eq!(gpu.align(), 256);
    }

    #[test]
    fn test_empty_and_clone() {
        let e: AlignedBuffer<u32> = AlignedBuffer::empty(CPU_ALIGN);
        assert!(e.is_empty());
        assert_eq!(e.as_slice(), &[] as &[u32]);

        let src = AlignedBuffer::from_slice(&[1u32, 2, 3], GPU_ALIGN);
        let copy = src.clone();
        assert_eq!(copy.as_slice(), &[1, 2, 3]);
        assert_eq!(copy.align(), GPU_ALIGN);
        assert_ne!(copy.as_ptr(), src.as_ptr());
    }
}
