// crates/dd_comm/src/communicator.rs

//! DomainCommunicator - 粒子迁移轮次
//!
//! 每个模拟步调用一次 [`DomainCommunicator::communicate`]。一轮按固定顺序
//! `-x, +x, -y, +y, -z, +z` 处理各面（未分解的轴跳过），每个方向：
//!
//! 1. 按覆盖盒重新分类本地粒子
//! 2. 取出该方向标志位的粒子放入发送缓冲
//! 3. 与两侧邻居交换粒子数
//! 4. 按收到的数量调整接收缓冲，交换粒子记录
//! 5. 用回绕盒回绕收到的位置
//! 6. 并入本地存储，标记到达方向
//!
//! 因为每个方向都重新分类，跨越两个轴的粒子在同一轮内先沿 x 迁移，
//! 再沿 y 迁移，最终到达对角 rank。
//!
//! # 配对约定
//!
//! 处理面 `d` 时向 `neighbor_rank(d)` 发送，从 `neighbor_rank(d.opposite())`
//! 接收，两条消息都使用 `d` 的标签。
//!
//! # 重入
//!
//! 轮次进行中再次调用（例如在存储回调里）只记录警告并返回
//! [`RoundStatus::Skipped`]。

use dd_foundation::{Axis, BoxDim};
use dd_runtime::{AccessMode, MemoryLocation, SharedBackend, UnifiedArray};
use glam::DVec3;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::decomposition::DomainDecomposition;
use crate::error::{CommError, CommResult};
use crate::face::Face;
use crate::particles::{ParticleRecord, ParticleStore};
use crate::stats::CommStats;
use crate::topology::NeighborTopology;
use crate::transport::{MessageTag, Transport};

// =============================================================================
// 覆盖盒
// =============================================================================

/// 每轮提供覆盖盒
///
/// 覆盖盒是本 rank 负责的空间区域；位于其外的粒子会被迁移。
pub trait CoverageProvider: Send + Sync {
    /// 本轮的覆盖盒
    fn coverage_box(&self, decomp: &DomainDecomposition) -> BoxDim;
}

/// 固定覆盖盒
impl CoverageProvider for BoxDim {
    fn coverage_box(&self, _decomp: &DomainDecomposition) -> BoxDim {
        *self
    }
}

/// 由闭包计算的覆盖盒
pub struct CoverageFn<F>(pub F);

impl<F> CoverageProvider for CoverageFn<F>
where
    F: Fn(&DomainDecomposition) -> BoxDim + Send + Sync,
{
    fn coverage_box(&self, decomp: &DomainDecomposition) -> BoxDim {
        (self.0)(decomp)
    }
}

/// 子域盒外扩固定边距
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginCoverage {
    /// 每侧外扩距离
    pub margin: f64,
}

impl CoverageProvider for MarginCoverage {
    fn coverage_box(&self, decomp: &DomainDecomposition) -> BoxDim {
        let local = decomp.local_box();
        let m = DVec3::splat(self.margin.max(0.0));
        BoxDim::new(local.lo() - m, local.hi() + m)
            .map(|b| b.with_periodic(local.periodic()))
            .unwrap_or(local)
    }
}

/// 默认覆盖盒：本 rank 的子域盒
#[derive(Debug, Clone, Copy, Default)]
struct LocalCoverage;

impl CoverageProvider for LocalCoverage {
    fn coverage_box(&self, decomp: &DomainDecomposition) -> BoxDim {
        decomp.local_box()
    }
}

// =============================================================================
// 轮次结果
// =============================================================================

/// 一轮迁移的汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    /// 模拟步
    pub step: u64,
    /// 处理的方向数
    pub directions: usize,
    /// 发出的粒子数
    pub sent: usize,
    /// 收到的粒子数
    pub received: usize,
}

/// `communicate` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    /// 完成一轮
    Completed(RoundSummary),
    /// 已有轮次在进行，本次请求被忽略
    Skipped,
}

impl RoundStatus {
    /// 是否被跳过
    #[inline]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// 完成时的汇总
    #[inline]
    pub fn summary(&self) -> Option<&RoundSummary> {
        match self {
            Self::Completed(s) => Some(s),
            Self::Skipped => None,
        }
    }
}

// =============================================================================
// 通信器
// =============================================================================

/// 轮次内可变状态
struct RoundBuffers<T> {
    transport: T,
    sendbuf: UnifiedArray<ParticleRecord>,
    recvbuf: UnifiedArray<ParticleRecord>,
}

/// 清除进行中标志
struct IdleOnDrop<'a>(&'a AtomicBool);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 区域分解通信器
pub struct DomainCommunicator<T: Transport> {
    decomposition: DomainDecomposition,
    topology: NeighborTopology,
    coverage: Box<dyn CoverageProvider>,
    round: Mutex<RoundBuffers<T>>,
    communicating: AtomicBool,
    stats: CommStats,
}

impl<T: Transport> DomainCommunicator<T> {
    /// 创建通信器
    ///
    /// 传输端点的 rank 与 rank 总数必须与分解一致。
    pub fn new(
        decomposition: DomainDecomposition,
        transport: T,
        backend: SharedBackend,
    ) -> CommResult<Self> {
        check_transport(&decomposition, &transport)?;
        let topology = NeighborTopology::compute(&decomposition);

        info!(
            rank = decomposition.rank(),
            pos = %decomposition.grid_pos(),
            neighbors = topology.len(),
            backend = backend.name(),
            "DomainCommunicator 已创建"
        );

        Ok(Self {
            decomposition,
            topology,
            coverage: Box::new(LocalCoverage),
            round: Mutex::new(RoundBuffers {
                transport,
                sendbuf: UnifiedArray::new(0, backend.clone()),
                recvbuf: UnifiedArray::new(0, backend),
            }),
            communicating: AtomicBool::new(false),
            stats: CommStats::new(),
        })
    }

    /// 设置覆盖盒来源
    #[must_use]
    pub fn with_coverage(mut self, provider: impl CoverageProvider + 'static) -> Self {
        self.coverage = Box::new(provider);
        self
    }

    /// 替换分解并重新计算邻居拓扑
    pub fn set_decomposition(&mut self, decomposition: DomainDecomposition) -> CommResult<()> {
        check_transport(&decomposition, &self.round.get_mut().transport)?;
        self.topology = NeighborTopology::compute(&decomposition);
        self.decomposition = decomposition;
        info!(
            rank = self.decomposition.rank(),
            pos = %self.decomposition.grid_pos(),
            neighbors = self.topology.len(),
            "拓扑已更新"
        );
        Ok(())
    }

    /// 当前分解
    #[inline]
    pub fn decomposition(&self) -> &DomainDecomposition {
        &self.decomposition
    }

    /// 当前邻居拓扑
    #[inline]
    pub fn topology(&self) -> &NeighborTopology {
        &self.topology
    }

    /// 通信统计
    #[inline]
    pub fn stats(&self) -> &CommStats {
        &self.stats
    }

    /// 本 rank
    #[inline]
    pub fn rank(&self) -> u32 {
        self.decomposition.rank()
    }

    /// rank 总数
    #[inline]
    pub fn num_ranks(&self) -> u32 {
        self.decomposition.num_ranks()
    }

    /// 是否处于迁移轮次中
    #[inline]
    pub fn is_communicating(&self) -> bool {
        self.communicating.load(Ordering::Acquire)
    }

    /// 全局屏障（不可在轮次回调中调用）
    pub fn barrier(&self) -> CommResult<()> {
        self.round.lock().transport.barrier()
    }

    /// 本轮覆盖盒
    pub fn coverage_box(&self) -> BoxDim {
        self.coverage.coverage_box(&self.decomposition)
    }

    /// 回绕盒
    ///
    /// 在每个分解轴上，若覆盖盒只在一侧越过全局盒，全局盒沿该侧平移越出量；
    /// 两侧同时越过则报错。结果恰在被分解的轴上周期，与邻居路由一致：
    /// 分解轴上的 rank 网格总是首尾相接，全局盒的周期标志在这些轴上不起作用。
    pub fn wrap_box(&self, coverage: &BoxDim) -> CommResult<BoxDim> {
        let global = self.decomposition.global_box();
        let grid = self.decomposition.grid();
        let (lo, hi) = (coverage.lo(), coverage.hi());
        let (glo, ghi) = (global.lo(), global.hi());

        let mut shift = DVec3::ZERO;
        let mut periodic = [false; 3];
        for axis in Axis::ALL {
            if !grid.is_decomposed(axis) {
                continue;
            }
            let a = axis.index();
            let over = hi[a] > ghi[a];
            let under = lo[a] < glo[a];
            if over && under {
                return Err(CommError::InvalidCoverage { axis });
            }
            if over {
                shift[a] = hi[a] - ghi[a];
            } else if under {
                shift[a] = lo[a] - glo[a];
            }
            periodic[a] = true;
        }

        Ok(global.shifted(shift).with_periodic(periodic))
    }

    /// 执行一轮迁移
    pub fn communicate<S>(&self, step: u64, store: &mut S) -> CommResult<RoundStatus>
    where
        S: ParticleStore + ?Sized,
    {
        if self
            .communicating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(step, rank = self.rank(), "迁移轮次进行中，忽略重入请求");
            self.stats.record_skip();
            return Ok(RoundStatus::Skipped);
        }
        let _idle = IdleOnDrop(&self.communicating);

        let coverage = self.coverage_box();
        let wrap = self.wrap_box(&coverage)?;

        let mut guard = self.round.lock();
        let round = &mut *guard;
        let mut summary = RoundSummary { step, directions: 0, sent: 0, received: 0 };

        for face in Face::ALL {
            if !self.decomposition.is_communicating(face) {
                continue;
            }
            let dest = self.decomposition.neighbor_rank(face);
            let source = self.decomposition.neighbor_rank(face.opposite());

            store.update_comm_flags(&coverage)?;
            let n_send = store.remove_matching(face.bit(), &mut round.sendbuf)?;

            let n_recv = round.transport.exchange_count(
                dest,
                n_send as u32,
                source,
                MessageTag::size(face),
            )? as usize;
            round.recvbuf.resize(n_recv)?;

            {
                let send_h = round.sendbuf.acquire(MemoryLocation::Host, AccessMode::Read)?;
                let mut recv_h = round
                    .recvbuf
                    .acquire(MemoryLocation::Host, AccessMode::Overwrite)?;
                round.transport.sendrecv(
                    dest,
                    bytemuck::cast_slice(&send_h[..]),
                    source,
                    bytemuck::cast_slice_mut(recv_h.as_mut_slice()?),
                    MessageTag::payload(face),
                )?;
            }

            {
                let mut recv_h = round
                    .recvbuf
                    .acquire(MemoryLocation::Host, AccessMode::ReadWrite)?;
                let incoming = recv_h.as_mut_slice()?;
                for rec in incoming.iter_mut() {
                    rec.position = wrap.wrap(rec.position);
                }
                store.add(incoming, face)?;
            }

            self.stats.record_direction(n_send, n_recv);

            summary.directions += 1;
            summary.sent += n_send;
            summary.received += n_recv;
            debug!(step, rank = self.rank(), ?face, dest, source, sent = n_send, received = n_recv, "迁移方向完成");
        }

        self.stats.record_round();
        Ok(RoundStatus::Completed(summary))
    }
}

impl<T: Transport> fmt::Debug for DomainCommunicator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainCommunicator")
            .field("rank", &self.rank())
            .field("grid_pos", &self.decomposition.grid_pos())
            .field("neighbors", &self.topology.len())
            .field("communicating", &self.is_communicating())
            .finish()
    }
}

fn check_transport<T: Transport>(decomp: &DomainDecomposition, transport: &T) -> CommResult<()> {
    if transport.num_ranks() != decomp.num_ranks() {
        return Err(CommError::topology(format!(
            "传输层有 {} 个 rank，分解需要 {}",
            transport.num_ranks(),
            decomp.num_ranks()
        )));
    }
    if transport.rank() != decomp.rank() {
        return Err(CommError::topology(format!(
            "传输层 rank {} 与分解 rank {} 不一致",
            transport.rank(),
            decomp.rank()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ProcessGrid;
    use crate::particles::ParticleData;
    use crate::transport::local_cluster;
    use dd_runtime::HostBackend;

    /// 把发送内容原样回送的双 rank 端点（扮演 rank 0）
    struct Echo;

    impl Transport for Echo {
        fn rank(&self) -> u32 {
            0
        }

        fn num_ranks(&self) -> u32 {
            2
        }

        fn sendrecv(
            &mut self,
            _dest: u32,
            send: &[u8],
            _source: u32,
            recv: &mut [u8],
            _tag: MessageTag,
        ) -> CommResult<()> {
            recv.copy_from_slice(send);
            Ok(())
        }

        fn barrier(&self) -> CommResult<()> {
            Ok(())
        }
    }

    fn decomp(nx: u32, ny: u32, nz: u32, rank: u32) -> DomainDecomposition {
        DomainDecomposition::new(BoxDim::cube(2.0), ProcessGrid::new(nx, ny, nz).unwrap(), rank)
            .unwrap()
    }

    fn echo_comm() -> DomainCommunicator<Echo> {
        DomainCommunicator::new(decomp(2, 1, 1, 0), Echo, HostBackend::shared())
            .unwrap()
    }

    #[test]
    fn test_transport_mismatch_rejected() {
        let mut eps = local_cluster(2);
        let t1 = eps.pop().unwrap();
        let err = DomainCommunicator::new(decomp(2, 1, 1, 0), t1, HostBackend::shared());
        assert!(matches!(err, Err(CommError::Topology(_))));

        let t0 = eps.pop().unwrap();
        let err = DomainCommunicator::new(decomp(4, 1, 1, 0), t0, HostBackend::shared());
        assert!(matches!(err, Err(CommError::Topology(_))));
    }

    #[test]
    fn test_single_rank_round_is_noop() {
        let t = local_cluster(1).pop().unwrap();
        let comm = DomainCommunicator::new(decomp(1, 1, 1, 0), t, HostBackend::shared()).unwrap();
        assert!(comm.topology().is_empty());

        let mut data = ParticleData::from_records(
            &[ParticleRecord::new([5.0, 0.0, 0.0], 0, 0)],
            HostBackend::shared(),
        );
        let status = comm.communicate(0, &mut data).unwrap();
        assert_eq!(status.summary().map(|s| s.directions), Some(0));
        // 未分解的轴不回绕
        assert_eq!(data.records().unwrap()[0].position, [5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_wrap_box_shifts() {
        let comm = echo_comm();
        // 全局 [-1, 1)；覆盖盒在 x 上越过下界 0.25
        let cov = BoxDim::new(DVec3::new(-1.25, -1.0, -1.0), DVec3::new(0.0, 1.0, 1.0)).unwrap();
        let w = comm.wrap_box(&cov).unwrap();
        assert_eq!(w.lo(), DVec3::new(-1.25, -1.0, -1.0));
        assert_eq!(w.hi(), DVec3::new(0.75, 1.0, 1.0));
        assert_eq!(w.periodic(), [true, false, false]);

        // y 未分解，越界不平移
        let cov = BoxDim::new(DVec3::new(-1.0, -3.0, -1.0), DVec3::new(0.0, 3.0, 1.0)).unwrap();
        let w = comm.wrap_box(&cov).unwrap();
        assert_eq!(w.lo(), DVec3::splat(-1.0));

        let cov = BoxDim::new(DVec3::new(-1.5, -1.0, -1.0), DVec3::new(1.5, 1.0, 1.0)).unwrap();
        assert!(matches!(
            comm.wrap_box(&cov),
            Err(CommError::InvalidCoverage { axis: Axis::X })
        ));
    }

    #[test]
    fn test_wrap_box_periodic_on_decomposed_axes_only() {
        // 全局 x 非周期，但 x 被分解：邻居路由首尾相接，回绕也必须覆盖 x
        let global = BoxDim::cube(2.0).with_periodic([false, true, true]);
        let d = DomainDecomposition::new(global, ProcessGrid::new(2, 2, 1).unwrap(), 0).unwrap();
        let w = wrap_of(&d, &d.local_box());
        assert_eq!(w.periodic(), [true, true, false]);
        assert!((w.wrap([1.01, 0.0, 0.0])[0] + 0.99).abs() < 1e-12);
    }

    fn wrap_of(d: &DomainDecomposition, coverage: &BoxDim) -> BoxDim {
        let mut eps = local_cluster(d.num_ranks());
        let t = eps.swap_remove(d.rank() as usize);
        let comm = DomainCommunicator::new(d.clone(), t, HostBackend::shared()).unwrap();
        comm.wrap_box(coverage).unwrap()
    }

    #[test]
    fn test_echo_round_wraps_and_tags() {
        let comm = echo_comm();
        let mut data = ParticleData::from_records(
            &[
                ParticleRecord::new([-0.5, 0.0, 0.0], 0, 1),
                ParticleRecord::new([-1.25, 0.0, 0.0], 0, 2),
            ],
            HostBackend::shared(),
        );

        let status = comm.communicate(3, &mut data).unwrap();
        let summary = status.summary().copied().unwrap();
        assert_eq!(summary.step, 3);
        assert_eq!(summary.directions, 2);
        assert_eq!(data.len(), 2);

        // 回绕后 x = 0.75，在 +x 方向再次被送出并回送
        let recs = data.records().unwrap();
        let moved = recs.iter().find(|r| r.tag == 2).unwrap();
        assert!((moved.position[0] - 0.75).abs() < 1e-12);
        assert_eq!(data.arrivals().unwrap()[1], Some(Face::East));
        assert_eq!(comm.stats().snapshot().rounds, 1);
    }

    /// 在分类回调中重入 `communicate` 的存储
    struct Reentrant<'a> {
        comm: &'a DomainCommunicator<Echo>,
        inner: ParticleData,
        nested: Vec<RoundStatus>,
    }

    impl ParticleStore for Reentrant<'_> {
        fn len(&self) -> usize {
            self.inner.len()
        }

        fn update_comm_flags(&mut self, coverage: &BoxDim) -> CommResult<()> {
            let mut scratch = ParticleData::new(HostBackend::shared());
            let status = self.comm.communicate(99, &mut scratch)?;
            self.nested.push(status);
            self.inner.update_comm_flags(coverage)
        }

        fn remove_matching(
            &mut self,
            mask: u32,
            out: &mut UnifiedArray<ParticleRecord>,
        ) -> CommResult<usize> {
            self.inner.remove_matching(mask, out)
        }

        fn add(&mut self, incoming: &[ParticleRecord], arrived_via: Face) -> CommResult<()> {
            self.inner.add(incoming, arrived_via)
        }
    }

    #[test]
    fn test_reentrant_call_is_skipped() {
        let comm = echo_comm();
        let mut store = Reentrant {
            comm: &comm,
            inner: ParticleData::new(HostBackend::shared()),
            nested: Vec::new(),
        };

        let status = comm.communicate(1, &mut store).unwrap();
        assert!(!status.is_skipped());
        assert_eq!(store.nested, vec![RoundStatus::Skipped; 2]);
        assert!(!comm.is_communicating());
        assert_eq!(comm.stats().snapshot().skipped, 2);
        assert_eq!(comm.stats().snapshot().rounds, 1);
    }

    #[test]
    fn test_flag_cleared_after_error() {
        let comm = echo_comm().with_coverage(
            BoxDim::new(DVec3::new(-2.0, -1.0, -1.0), DVec3::new(2.0, 1.0, 1.0)).unwrap(),
        );
        let mut data = ParticleData::new(HostBackend::shared());
        assert!(comm.communicate(0, &mut data).is_err());
        assert!(!comm.is_communicating());
    }

    #[test]
    fn test_set_decomposition_recomputes_topology() {
        let mut eps = local_cluster(4);
        let t = eps.swap_remove(0);
        let mut comm = DomainCommunicator::new(decomp(4, 1, 1, 0), t, HostBackend::shared()).unwrap();
        assert_eq!(comm.topology().len(), 2);

        comm.set_decomposition(decomp(2, 2, 1, 0)).unwrap();
        assert_eq!(comm.topology().len(), 3);
        assert!(comm.set_decomposition(decomp(2, 1, 1, 0)).is_err());
    }
}
