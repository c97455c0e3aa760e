// crates/dd_comm/src/flags.rs

//! 通信标志分类
//!
//! 粒子位置在某轴上 `>= hi` 时置该轴正面位，`< lo` 时置负面位。
//! 同一轴上两位互斥；一个粒子最多同时带三个轴的位。

use dd_foundation::{Axis, BoxDim};
use rayon::prelude::*;

use crate::face::Face;
use crate::particles::ParticleRecord;

/// 并行分类的最小批量
const PAR_THRESHOLD: usize = 4096;

/// 单个位置相对覆盖盒的通信标志
#[inline]
pub fn comm_flags_for(position: [f64; 3], coverage: &BoxDim) -> u32 {
    let (lo, hi) = (coverage.lo(), coverage.hi());
    let mut flags = 0;
    for axis in Axis::ALL {
        let a = axis.index();
        if position[a] >= hi[a] {
            flags |= Face::on(axis, true).bit();
        } else if position[a] < lo[a] {
            flags |= Face::on(axis, false).bit();
        }
    }
    flags
}

/// 批量分类，结果写入 `flags`（长度须与 `records` 相同）
pub fn classify(records: &[ParticleRecord], coverage: &BoxDim, flags: &mut [u32]) {
    debug_assert_eq!(records.len(), flags.len());
    if records.len() >= PAR_THRESHOLD {
        flags
            .par_iter_mut()
            .zip(records.par_iter())
            .for_each(|(f, r)| *f = comm_flags_for(r.position, coverage));
    } else {
        for (f, r) in flags.iter_mut().zip(records) {
            *f = comm_flags_for(r.position, coverage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn unit() -> BoxDim {
        BoxDim::new(DVec3::ZERO, DVec3::ONE).unwrap()
    }

    #[test]
    fn test_inside_is_zero() {
        assert_eq!(comm_flags_for([0.5, 0.0, 0.999], &unit()), 0);
    }

    #[test]
    fn test_boundaries() {
        let b = unit();
        assert_eq!(comm_flags_for([1.0, 0.5, 0.5], &b), Face::East.bit());
        assert_eq!(comm_flags_for([-1e-9, 0.5, 0.5], &b), Face::West.bit());
        assert_eq!(
            comm_flags_for([1.5, -0.5, 2.0], &b),
            Face::East.bit() | Face::South.bit() | Face::Up.bit()
        );
    }

    #[test]
    fn test_classify_parallel_matches_serial() {
        let b = unit();
        let records: Vec<ParticleRecord> = (0..PAR_THRESHOLD + 7)
            .map(|i| {
                let x = (i as f64 * 0.37) % 3.0 - 1.0;
                ParticleRecord::new([x, 0.5, 1.0 - x], 0, i as u32)
            })
            .collect();
        let mut flags = vec![0u32; records.len()];
        classify(&records, &b, &mut flags);

        let mut again = vec![u32::MAX; records.len()];
        classify(&records, &b, &mut again);
        assert_eq!(again, flags);

        for (r, f) in records.iter().zip(&flags) {
            assert_eq!(*f, comm_flags_for(r.position, &b));
            assert!(!(f & Face::West.bit() != 0 && f & Face::East.bit() != 0));
        }
    }
}
