// crates/dd_comm/src/stats.rs

//! 通信统计

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::particles::ParticleRecord;

/// 单条迁移记录的线格式字节数
const RECORD_BYTES: u64 = std::mem::size_of::<ParticleRecord>() as u64;

/// 迁移统计
///
/// 由轮次内部写入，任意线程可通过 [`CommStats::snapshot`] 读取。
#[derive(Debug, Default)]
pub struct CommStats {
    rounds: AtomicU64,
    skipped: AtomicU64,
    particles_sent: AtomicU64,
    particles_received: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommStatsSnapshot {
    /// 完成的轮次
    pub rounds: u64,
    /// 跳过的请求
    pub skipped: u64,
    /// 发出的粒子数
    pub particles_sent: u64,
    /// 收到的粒子数
    pub particles_received: u64,
    /// 发出的字节数
    pub bytes_sent: u64,
    /// 收到的字节数
    pub bytes_received: u64,
}

impl CommStats {
    /// 创建零值统计
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个方向的交换量
    pub(crate) fn record_direction(&self, sent: usize, received: usize) {
        self.particles_sent.fetch_add(sent as u64, Ordering::Relaxed);
        self.particles_received.fetch_add(received as u64, Ordering::Relaxed);
    }

    /// 记录一轮完成
    pub(crate) fn record_round(&self) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次被跳过的重入请求
    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// 读取快照，字节数按记录大小折算
    pub fn snapshot(&self) -> CommStatsSnapshot {
        let sent = self.particles_sent.load(Ordering::Relaxed);
        let received = self.particles_received.load(Ordering::Relaxed);
        CommStatsSnapshot {
            rounds: self.rounds.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            particles_sent: sent,
            particles_received: received,
            bytes_sent: sent * RECORD_BYTES,
            bytes_received: received * RECORD_BYTES,
        }
    }

    /// 清零
    pub fn reset(&self) {
        for c in [
            &self.rounds,
            &self.skipped,
            &self.particles_sent,
            &self.particles_received,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

impl CommStatsSnapshot {
    /// 逐项求和
    pub fn merge(self, other: Self) -> Self {
        Self {
            rounds: self.rounds + other.rounds,
            skipped: self.skipped + other.skipped,
            particles_sent: self.particles_sent + other.particles_sent,
            particles_received: self.particles_received + other.particles_received,
            bytes_sent: self.bytes_sent + other.bytes_sent,
            bytes_received: self.bytes_received + other.bytes_received,
        }
    }
}
