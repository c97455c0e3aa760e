// crates/dd_comm/src/transport.rs

//! 消息传输
//!
//! [`Transport`] 是迁移轮次使用的最小点对点接口：带标签的
//! send-receive 配对交换，以及全局屏障。
//!
//! [`local_cluster`] 在单个进程内创建 `N` 个端点，每个 rank 一个线程，
//! 端点之间通过无界 crossbeam 通道通信。发送从不阻塞；接收按
//! `(来源, 标签)` 匹配，先到的不匹配消息暂存起来，顺序无关。

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Barrier};
use tracing::trace;

use crate::error::{CommError, CommResult};
use crate::face::Face;

/// 载荷消息标签的起始值
pub const PAYLOAD_TAG_BASE: u32 = 8;

/// 消息标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageTag(pub u32);

impl MessageTag {
    /// 某方向的计数消息
    #[inline]
    pub const fn size(face: Face) -> Self {
        Self(face as u32)
    }

    /// 某方向的载荷消息
    #[inline]
    pub const fn payload(face: Face) -> Self {
        Self(PAYLOAD_TAG_BASE + face as u32)
    }
}

/// 点对点传输
pub trait Transport: Send {
    /// 本端 rank
    fn rank(&self) -> u32;

    /// rank 总数
    fn num_ranks(&self) -> u32;

    /// 向 `dest` 发送 `send`，同时从 `source` 接收恰好 `recv.len()` 字节
    fn sendrecv(
        &mut self,
        dest: u32,
        send: &[u8],
        source: u32,
        recv: &mut [u8],
        tag: MessageTag,
    ) -> CommResult<()>;

    /// 全局屏障
    fn barrier(&self) -> CommResult<()>;

    /// 交换一个计数
    fn exchange_count(
        &mut self,
        dest: u32,
        count: u32,
        source: u32,
        tag: MessageTag,
    ) -> CommResult<u32> {
        let mut buf = [0u8; 4];
        self.sendrecv(dest, &count.to_ne_bytes(), source, &mut buf, tag)?;
        Ok(u32::from_ne_bytes(buf))
    }
}

// =============================================================================
// 进程内传输
// =============================================================================

struct Envelope {
    from: u32,
    tag: MessageTag,
    bytes: Vec<u8>,
}

/// 进程内传输端点
pub struct LocalTransport {
    rank: u32,
    outboxes: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    parked: VecDeque<Envelope>,
    barrier: Arc<Barrier>,
}

/// 创建 `num_ranks` 个互联的进程内端点，下标即 rank
pub fn local_cluster(num_ranks: u32) -> Vec<LocalTransport> {
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..num_ranks).map(|_| unbounded::<Envelope>()).unzip();
    let barrier = Arc::new(Barrier::new(num_ranks.max(1) as usize));

    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| LocalTransport {
            rank: rank as u32,
            outboxes: senders.clone(),
            inbox,
            parked: VecDeque::new(),
            barrier: Arc::clone(&barrier),
        })
        .collect()
}

impl LocalTransport {
    fn check_rank(&self, rank: u32) -> CommResult<()> {
        let num_ranks = self.num_ranks();
        if rank >= num_ranks {
            return Err(CommError::InvalidRank { rank, num_ranks });
        }
        Ok(())
    }

    fn receive(&mut self, source: u32, tag: MessageTag) -> CommResult<Vec<u8>> {
        if let Some(pos) = self
            .parked
            .iter()
            .position(|e| e.from == source && e.tag == tag)
        {
            if let Some(env) = self.parked.remove(pos) {
                return Ok(env.bytes);
            }
        }

        loop {
            let env = self
                .inbox
                .recv()
                .map_err(|_| CommError::Disconnected { peer: source })?;
            if env.from == source && env.tag == tag {
                return Ok(env.bytes);
            }
            self.parked.push_back(env);
        }
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> u32 {
        self.rank
    }

    fn num_ranks(&self) -> u32 {
        self.outboxes.len() as u32
    }

    fn sendrecv(
        &mut self,
        dest: u32,
        send: &[u8],
        source: u32,
        recv: &mut [u8],
        tag: MessageTag,
    ) -> CommResult<()> {
        self.check_rank(dest)?;
        self.check_rank(source)?;

        self.outboxes[dest as usize]
            .send(Envelope {
                from: self.rank,
                tag,
                bytes: send.to_vec(),
            })
            .map_err(|_| CommError::Disconnected { peer: dest })?;

        let bytes = self.receive(source, tag)?;
        if bytes.len() != recv.len() {
            return Err(CommError::MessageSize {
                peer: source,
                tag,
                expected: recv.len(),
                actual: bytes.len(),
            });
        }
        recv.copy_from_slice(&bytes);

        trace!(rank = self.rank, dest, source, ?tag, sent = send.len(), received = bytes.len(), "sendrecv");
        Ok(())
    }

    fn barrier(&self) -> CommResult<()> {
        self.barrier.wait();
        Ok(())
    }
}

impl fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransport")
            .field("rank", &self.rank)
            .field("num_ranks", &self.num_ranks())
            .field("parked", &self.parked.len())
            .finish()
    }
}
