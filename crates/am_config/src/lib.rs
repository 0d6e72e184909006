// crates/am_config/src/lib.rs

//! AirMesh 配置层
//!
//! 所有配置在启动时构建、校验一次，之后以不可变引用传给各组件。
//! 组件内部需要随运行变化的量（例如动态加密阈值）保存在运行时状态中，
//! 而不是修改配置。
//!
//! # 示例
//!
//! ```
//! use am_config::AirMeshConfig;
//!
//! let cfg = AirMeshConfig::default();
//! cfg.validate().unwrap();
//! assert_eq!(cfg.grid.pop_grid_column, "TotalPop");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod env;
pub mod error;
pub mod grid;
pub mod output;
pub mod simulation;
pub mod sr;
pub mod units;

pub use error::ConfigError;
pub use grid::VarGridConfig;
pub use output::OutputConfig;
pub use simulation::{ConvergenceConfig, SimulationConfig, TimestepConfig};
pub use sr::SrConfig;
pub use units::EmissionUnits;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 顶层配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AirMeshConfig {
    /// 网格配置
    #[serde(default)]
    pub grid: VarGridConfig,
    /// 模拟配置
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// SR 矩阵配置
    #[serde(default)]
    pub sr: SrConfig,
    /// 输出配置
    #[serde(default)]
    pub output: OutputConfig,
    /// CTM 气象与背景场数据文件
    #[serde(default)]
    pub ctm_data: PathBuf,
    /// 排放数据文件
    #[serde(default)]
    pub emission_files: Vec<PathBuf>,
}

impl AirMeshConfig {
    /// 从 JSON 文件加载，展开路径中的环境变量，应用 `AIRMESH_` 覆盖并校验
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: AirMeshConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let lookup = |name: &str| std::env::var(name).ok();
        config.expand_paths_with(lookup);
        config.apply_env_overrides_with(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存为格式化 JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 验证全部配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        self.simulation.validate()?;
        self.sr.validate()?;
        self.output.validate()?;
        Ok(())
    }

    /// 展开所有路径字段中的环境变量
    pub fn expand_paths_with(&mut self, lookup: impl Fn(&str) -> Option<String> + Copy) {
        let expand = |p: &mut PathBuf| {
            if let Some(s) = p.to_str() {
                *p = PathBuf::from(env::expand_with(s, lookup));
            }
        };
        expand(&mut self.ctm_data);
        expand(&mut self.grid.census_file);
        expand(&mut self.grid.mortality_rate_file);
        expand(&mut self.sr.log_dir);
        expand(&mut self.sr.output_file);
        expand(&mut self.sr.inputs_file);
        expand(&mut self.output.file);
        self.emission_files.iter_mut().for_each(expand);
    }

    /// 应用 `AIRMESH_*` 环境变量覆盖
    pub fn apply_env_overrides_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::invalid(key, raw, "无法解析环境变量"))
        }
        let var = |suffix: &str| lookup(&format!("{}{suffix}", env::ENV_PREFIX));

        if let Some(v) = var("NUM_ITERATIONS") {
            self.simulation.num_iterations = parse("AIRMESH_NUM_ITERATIONS", &v)?;
        }
        if let Some(v) = var("STATIC") {
            self.simulation.static_grid = parse("AIRMESH_STATIC", &v)?;
        }
        if let Some(v) = var("EMISSION_UNITS") {
            self.simulation.emission_units = v.parse()?;
        }
        if let Some(v) = var("OUTPUT_FILE") {
            self.output.file = PathBuf::from(v);
        }
        if let Some(v) = var("OUTPUT_ALL_LAYERS") {
            self.output.all_layers = parse("AIRMESH_OUTPUT_ALL_LAYERS", &v)?;
        }
        if let Some(v) = var("SR_LOG_DIR") {
            self.sr.log_dir = PathBuf::from(v);
        }
        if let Some(v) = var("SR_OUTPUT_FILE") {
            self.sr.output_file = PathBuf::from(v);
        }
        if let Some(v) = var("SR_BEGIN") {
            self.sr.begin = parse("AIRMESH_SR_BEGIN", &v)?;
        }
        if let Some(v) = var("SR_END") {
            self.sr.end = parse("AIRMESH_SR_END", &v)?;
        }
        if let Some(v) = var("SR_RPC_PORT") {
            self.sr.rpc_port = parse("AIRMESH_SR_RPC_PORT", &v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = AirMeshConfig::default();
        cfg.simulation.num_iterations = 12;
        cfg.save_to_file(&path).unwrap();
        let loaded = AirMeshConfig::from_file(&path).unwrap();
        assert_eq!(loaded.simulation.num_iterations, 12);
        assert_eq!(loaded.grid, cfg.grid);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: AirMeshConfig =
            serde_json::from_str(r#"{"grid": {"dx": 1000.0, "dy": 1000.0}}"#).unwrap();
        assert_eq!(cfg.grid.dx, 1000.0);
        assert_eq!(cfg.grid.x_nests, vec![18, 3, 2, 2, 2, 3, 2, 2]);
        assert_eq!(cfg.sr.rpc_port, 6060);
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = AirMeshConfig::default();
        let lookup = |name: &str| match name {
            "AIRMESH_NUM_ITERATIONS" => Some("7".to_string()),
            "AIRMESH_STATIC" => Some("true".to_string()),
            "AIRMESH_EMISSION_UNITS" => Some("kg/year".to_string()),
            _ => None,
        };
        cfg.apply_env_overrides_with(lookup).unwrap();
        assert_eq!(cfg.simulation.num_iterations, 7);
        assert!(cfg.simulation.static_grid);
        assert_eq!(cfg.simulation.emission_units, EmissionUnits::KgPerYear);
    }

    #[test]
    fn test_env_override_bad_value() {
        let mut cfg = AirMeshConfig::default();
        let lookup = |name: &str| (name == "AIRMESH_SR_RPC_PORT").then(|| "port".to_string());
        assert!(cfg.apply_env_overrides_with(lookup).is_err());
    }

    #[test]
    fn test_expand_paths() {
        let mut cfg = AirMeshConfig {
            ctm_data: PathBuf::from("${DATA}/ctm.bin"),
            emission_files: vec![PathBuf::from("$DATA/emis.json")],
            ..Default::default()
        };
        cfg.expand_paths_with(|name| (name == "DATA").then(|| "/srv".to_string()));
        assert_eq!(cfg.ctm_data, PathBuf::from("/srv/ctm.bin"));
        assert_eq!(cfg.emission_files[0], PathBuf::from("/srv/emis.json"));
    }

    #[test]
    fn test_missing_output_path_rejected() {
        let mut cfg = AirMeshConfig::default();
        cfg.output.file = PathBuf::new();
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing(_))));
    }
}
