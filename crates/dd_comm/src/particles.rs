// crates/dd_comm/src/particles.rs

//! 粒子记录与粒子存储
//!
//! [`ParticleRecord`] 是迁移时在 rank 之间传输的线格式（`#[repr(C)]`，
//! 可直接按字节发送）。[`ParticleStore`] 是迁移轮次对粒子容器的全部要求；
//! [`ParticleData`] 是基于 [`UnifiedArray`] 的默认实现。

use bytemuck::{Pod, Zeroable};
use dd_foundation::BoxDim;
use dd_runtime::{AccessMode, MemoryLocation, SharedBackend, UnifiedArray};

use crate::error::CommResult;
use crate::face::Face;
use crate::flags;

/// 扩容时的最小容量
const MIN_CAPACITY: usize = 16;

/// 迁移线格式
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct ParticleRecord {
    /// 位置
    pub position: [f64; 3],
    /// 类型
    pub type_id: u32,
    /// 全局唯一标签
    pub tag: u32,
}

impl ParticleRecord {
    /// 创建记录
    #[inline]
    pub const fn new(position: [f64; 3], type_id: u32, tag: u32) -> Self {
        Self { position, type_id, tag }
    }
}

/// 可迁移的粒子容器
pub trait ParticleStore {
    /// 本地粒子数
    fn len(&self) -> usize;

    /// 是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按覆盖盒重新计算每个粒子的通信标志
    fn update_comm_flags(&mut self, coverage: &BoxDim) -> CommResult<()>;

    /// 移除标志与 `mask` 相交的粒子，写入 `out`（调整为恰好的长度），返回移除数
    ///
    /// 剩余粒子保持原有相对顺序。
    fn remove_matching(
        &mut self,
        mask: u32,
        out: &mut UnifiedArray<ParticleRecord>,
    ) -> CommResult<usize>;

    /// 追加从 `arrived_via` 方向收到的粒子，其通信标志清零
    fn add(&mut self, incoming: &[ParticleRecord], arrived_via: Face) -> CommResult<()>;
}

/// 基于统一数组的粒子容器
#[derive(Debug)]
pub struct ParticleData {
    records: UnifiedArray<ParticleRecord>,
    comm_flags: UnifiedArray<u32>,
    /// 到达方向位，本地粒子为 0
    arrival: UnifiedArray<u32>,
    len: usize,
}

impl ParticleData {
    /// 空容器
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            records: UnifiedArray::new(0, backend.clone()),
            comm_flags: UnifiedArray::new(0, backend.clone()),
            arrival: UnifiedArray::new(0, backend),
            len: 0,
        }
    }

    /// 由记录构造
    pub fn from_records(records: &[ParticleRecord], backend: SharedBackend) -> Self {
        let n = records.len();
        Self {
            records: UnifiedArray::from_slice(records, backend.clone()),
            comm_flags: UnifiedArray::new(n, backend.clone()),
            arrival: UnifiedArray::new(n, backend),
            len: n,
        }
    }

    /// 本地粒子数
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 已分配容量
    #[inline]
    pub fn capacity(&self) -> usize {
        self.records.num_elements()
    }

    /// 追加一个本地粒子
    pub fn push(&mut self, record: ParticleRecord) -> CommResult<()> {
        self.reserve(self.len + 1)?;
        let i = self.len;
        self.records
            .acquire(MemoryLocation::Host, AccessMode::ReadWrite)?
            .as_mut_slice()?[i] = record;
        self.comm_flags
            .acquire(MemoryLocation::Host, AccessMode::ReadWrite)?
            .as_mut_slice()?[i] = 0;
        self.arrival
            .acquire(MemoryLocation::Host, AccessMode::ReadWrite)?
            .as_mut_slice()?[i] = 0;
        self.len += 1;
        Ok(())
    }

    /// 当前粒子记录（主机拷贝）
    pub fn records(&self) -> CommResult<Vec<ParticleRecord>> {
        let h = self.records.acquire(MemoryLocation::Host, AccessMode::Read)?;
        Ok(h[..self.len].to_vec())
    }

    /// 在主机上就地修改本地粒子记录（例如积分位移）
    pub fn with_records_mut<R>(
        &mut self,
        f: impl FnOnce(&mut [ParticleRecord]) -> R,
    ) -> CommResult<R> {
        let n = self.len;
        let mut h = self
            .records
            .acquire(MemoryLocation::Host, AccessMode::ReadWrite)?;
        Ok(f(&mut h.as_mut_slice()?[..n]))
    }

    /// 当前通信标志（主机拷贝）
    pub fn comm_flags(&self) -> CommResult<Vec<u32>> {
        let h = self.comm_flags.acquire(MemoryLocation::Host, AccessMode::Read)?;
        Ok(h[..self.len].to_vec())
    }

    /// 每个粒子的到达方向，本地粒子为 `None`
    pub fn arrivals(&self) -> CommResult<Vec<Option<Face>>> {
        let h = self.arrival.acquire(MemoryLocation::Host, AccessMode::Read)?;
        Ok(h[..self.len].iter().map(|&bit| Face::from_bit(bit)).collect())
    }

    fn reserve(&mut self, needed: usize) -> CommResult<()> {
        let cap = self.capacity();
        if needed <= cap {
            return Ok(());
        }
        let new_cap = needed.max(cap * 2).max(MIN_CAPACITY);
        self.records.resize(new_cap)?;
        self.comm_flags.resize(new_cap)?;
        self.arrival.resize(new_cap)?;
        Ok(())
    }
}

impl ParticleStore for ParticleData {
    fn len(&self) -> usize {
        self.len
    }

    fn update_comm_flags(&mut self, coverage: &BoxDim) -> CommResult<()> {
        let n = self.len;
        let records = self.records.acquire(MemoryLocation::Host, AccessMode::Read)?;
        let mut flag_h = self
            .comm_flags
            .acquire(MemoryLocation::Host, AccessMode::Overwrite)?;
        flags::classify(&records[..n], coverage, &mut flag_h.as_mut_slice()?[..n]);
        Ok(())
    }

    fn remove_matching(
        &mut self,
        mask: u32,
        out: &mut UnifiedArray<ParticleRecord>,
    ) -> CommResult<usize> {
        let n = self.len;
        let count = {
            let flag_h = self.comm_flags.acquire(MemoryLocation::Host, AccessMode::Read)?;
            flag_h[..n].iter().filter(|&&f| f & mask != 0).count()
        };
        out.resize(count)?;

        let kept = {
            let mut rec_h = self.records.acquire(MemoryLocation::Host, AccessMode::ReadWrite)?;
            let mut flag_h = self
                .comm_flags
                .acquire(MemoryLocation::Host, AccessMode::ReadWrite)?;
            let mut arr_h = self.arrival.acquire(MemoryLocation::Host, AccessMode::ReadWrite)?;
            let mut out_h = out.acquire(MemoryLocation::Host, AccessMode::Overwrite)?;

            let recs = rec_h.as_mut_slice()?;
            let flags = flag_h.as_mut_slice()?;
            let arrival = arr_h.as_mut_slice()?;
            let sent = out_h.as_mut_slice()?;

            let (mut w, mut k) = (0, 0);
            for i in 0..n {
                if flags[i] & mask != 0 {
                    sent[k] = recs[i];
                    k += 1;
                } else {
                    recs[w] = recs[i];
                    flags[w] = flags[i];
                    arrival[w] = arrival[i];
                    w += 1;
                }
            }
            w
        };

        self.len = kept;
        Ok(count)
    }

    fn add(&mut self, incoming: &[ParticleRecord], arrived_via: Face) -> CommResult<()> {
        if incoming.is_empty() {
            return Ok(());
        }
        let start = self.len;
        let end = start + incoming.len();
        self.reserve(end)?;

        {
            let mut rec_h = self.records.acquire(MemoryLocation::Host, AccessMode::ReadWrite)?;
            rec_h.as_mut_slice()?[start..end].copy_from_slice(incoming);
            let mut flag_h = self
                .comm_flags
                .acquire(MemoryLocation::Host, AccessMode::ReadWrite)?;
            flag_h.as_mut_slice()?[start..end].fill(0);
            let mut arr_h = self.arrival.acquire(MemoryLocation::Host, AccessMode::ReadWrite)?;
            arr_h.as_mut_slice()?[start..end].fill(arrived_via.bit());
        }

        self.len = end;
        Ok(())
    }
}
