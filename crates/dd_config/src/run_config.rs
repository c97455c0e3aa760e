// crates/dd_config/src/run_config.rs

//! RunConfig - 迁移运行配置
//!
//! 描述一次多 rank 迁移运行：全局盒、进程网格、粒子初始化与位移、
//! 执行后端以及步数。以 JSON 存储，缺省字段取默认值。

use dd_comm::ProcessGrid;
use dd_foundation::BoxDim;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::backend_kind::BackendKind;
use crate::error::ConfigError;

/// 运行配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// 全局模拟盒
    #[serde(default)]
    pub domain: DomainConfig,

    /// 区域分解
    #[serde(default)]
    pub decomposition: DecompositionConfig,

    /// 粒子
    #[serde(default)]
    pub particles: ParticleConfig,

    /// 运行时
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// 迁移步数
    #[serde(default = "default_steps")]
    pub steps: u64,
}

fn default_steps() -> u64 { 10 }

/// 全局盒配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// 下角
    #[serde(default = "default_lo")]
    pub lo: [f64; 3],

    /// 上角
    #[serde(default = "default_hi")]
    pub hi: [f64; 3],

    /// 各轴周期性
    #[serde(default = "default_periodic")]
    pub periodic: [bool; 3],
}

fn default_lo() -> [f64; 3] { [-5.0; 3] }
fn default_hi() -> [f64; 3] { [5.0; 3] }
fn default_periodic() -> [bool; 3] { [true; 3] }

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            lo: default_lo(),
            hi: default_hi(),
            periodic: default_periodic(),
        }
    }
}

/// 区域分解配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionConfig {
    /// rank 数
    #[serde(default = "default_ranks")]
    pub ranks: u32,

    /// 显式网格 `[nx, ny, nz]`，缺省时自动选择
    #[serde(default)]
    pub grid: Option<[u32; 3]>,
}

fn default_ranks() -> u32 { 8 }

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            ranks: default_ranks(),
            grid: None,
        }
    }
}

/// 粒子配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleConfig {
    /// 每个 rank 的初始粒子数
    #[serde(default = "default_count")]
    pub count_per_rank: u32,

    /// 随机种子
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// 每步最大位移（子域宽度的比例）
    #[serde(default = "default_max_displacement")]
    pub max_displacement: f64,

    /// 覆盖盒相对子域盒的外扩距离
    #[serde(default)]
    pub coverage_margin: f64,
}

fn default_count() -> u32 { 1000 }
fn default_seed() -> u64 { 42 }
fn default_max_displacement() -> f64 { 0.25 }

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            count_per_rank: default_count(),
            seed: default_seed(),
            max_displacement: default_max_displacement(),
            coverage_margin: 0.0,
        }
    }
}

/// 运行时配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 执行后端
    #[serde(default)]
    pub backend: BackendKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            domain: DomainConfig::default(),
            decomposition: DecompositionConfig::default(),
            particles: ParticleConfig::default(),
            runtime: RuntimeConfig::default(),
            steps: default_steps(),
        }
    }
}

impl RunConfig {
    /// 从文件加载并校验
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json(&content)
    }

    /// 从 JSON 字符串加载并校验
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }

    /// 全局盒
    pub fn global_box(&self) -> Result<BoxDim, ConfigError> {
        let lo = DVec3::from_array(self.domain.lo);
        let hi = DVec3::from_array(self.domain.hi);
        BoxDim::new(lo, hi)
            .map(|b| b.with_periodic(self.domain.periodic))
            .map_err(|e| {
                let value = format!("{:?}..{:?}", self.domain.lo, self.domain.hi);
                ConfigError::invalid("domain", value, e.to_string())
            })
    }

    /// 进程网格（显式或自动）
    pub fn grid(&self) -> Result<ProcessGrid, ConfigError> {
        let ranks = self.decomposition.ranks;
        match self.decomposition.grid {
            Some([nx, ny, nz]) => {
                let grid = ProcessGrid::new(nx, ny, nz).map_err(|e| {
                    ConfigError::invalid("decomposition.grid", format!("{nx}x{ny}x{nz}"), e.to_string())
                })?;
                if grid.num_ranks() != ranks {
                    return Err(ConfigError::invalid(
                        "decomposition.grid",
                        format!("{nx}x{ny}x{nz}"),
                        format!("网格大小 {} 与 ranks = {ranks} 不符", grid.num_ranks()),
                    ));
                }
                Ok(grid)
            }
            None => {
                let global = self.global_box()?;
                ProcessGrid::auto(ranks, &global)
                    .map_err(|e| ConfigError::invalid("decomposition.ranks", ranks, e.to_string()))
            }
        }
    }

    /// 校验配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ranks = self.decomposition.ranks;
        if ranks == 0 {
            return Err(ConfigError::invalid("decomposition.ranks", ranks, "rank 数必须为正"));
        }

        let global = self.global_box()?;
        let grid = self.grid()?;

        // 粒子标签为 `rank * count_per_rank + i`，必须落在 u32 内
        let count = self.particles.count_per_rank;
        let total = u64::from(count) * u64::from(grid.num_ranks());
        if total > u64::from(u32::MAX) {
            return Err(ConfigError::invalid(
                "particles.count_per_rank",
                count,
                format!("粒子总数 {total} 超出标签范围（{} rank）", grid.num_ranks()),
            ));
        }

        let d = self.particles.max_displacement;
        if !(0.0..1.0).contains(&d) {
            return Err(ConfigError::invalid(
                "particles.max_displacement",
                d,
                "必须在 [0, 1) 范围内（子域宽度的比例）",
            ));
        }

        // 外扩后覆盖盒不能同时越过分解轴的两侧
        let m = self.particles.coverage_margin;
        let widths = global.lengths()
            / DVec3::new(f64::from(grid.nx), f64::from(grid.ny), f64::from(grid.nz));
        if !(m >= 0.0 && m < widths.min_element()) {
            return Err(ConfigError::invalid(
                "particles.coverage_margin",
                m,
                format!("必须在 [0, {}) 范围内（最小子域宽度）", widths.min_element()),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid().unwrap(), ProcessGrid::new(2, 2, 2).unwrap());
        assert_eq!(config.runtime.backend, BackendKind::Host);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "decomposition": { "ranks": 3, "grid": [3, 1, 1] }, "runtime": { "backend": "stream" } }"#;
        let config = RunConfig::from_json(json).unwrap();
        assert_eq!(config.steps, 10);
        assert_eq!(config.particles.count_per_rank, 1000);
        assert_eq!(config.grid().unwrap(), ProcessGrid::new(3, 1, 1).unwrap());
        assert_eq!(config.runtime.backend, BackendKind::Stream);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = RunConfig::default();
        config.decomposition.ranks = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.decomposition.grid = Some([2, 2, 1]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "decomposition.grid"
        ));

        let mut config = RunConfig::default();
        config.domain.hi = [-5.0, 5.0, 5.0];
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.particles.max_displacement = 1.5;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.particles.coverage_margin = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_particle_total_must_fit_tags() {
        let mut config = RunConfig::default();
        config.particles.count_per_rank = u32::MAX / 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "particles.count_per_rank"
        ));

        config.particles.count_per_rank = u32::MAX / 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overflowing_grid_rejected() {
        let mut config = RunConfig::default();
        config.decomposition.grid = Some([65_536, 65_536, 2]);
        config.decomposition.ranks = 8;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "decomposition.grid"
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(RunConfig::from_json("{ not json"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = RunConfig::default();
        config.decomposition.grid = Some([4, 2, 1]);
        config.particles.seed = 7;
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("dd_config_{}.json", std::process::id()));
        let config = RunConfig { steps: 3, ..RunConfig::default() };
        config.save_to_file(&path).unwrap();
        let loaded = RunConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
