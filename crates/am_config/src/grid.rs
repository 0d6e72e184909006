// crates/am_config/src/grid.rs

//! 变分辨率网格配置
//!
//! 最外层网格为 `x_nests[0] × y_nests[0]` 个尺寸为 `dx × dy` 的单元，
//! 第 d 级嵌套把一个单元拆为 `x_nests[d] × y_nests[d]` 个子单元。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 变分辨率网格配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarGridConfig {
    /// 网格左下角 X [m]
    #[serde(default = "default_x0")]
    pub x0: f64,
    /// 网格左下角 Y [m]
    #[serde(default = "default_y0")]
    pub y0: f64,
    /// 最外层单元 X 尺寸 [m]
    #[serde(default = "default_spacing")]
    pub dx: f64,
    /// 最外层单元 Y 尺寸 [m]
    #[serde(default = "default_spacing")]
    pub dy: f64,
    /// 每级嵌套 X 方向倍数
    #[serde(default = "default_x_nests")]
    pub x_nests: Vec<usize>,
    /// 每级嵌套 Y 方向倍数
    #[serde(default = "default_y_nests")]
    pub y_nests: Vec<usize>,
    /// 允许加密的层数（层号小于该值的单元才可拆分）
    #[serde(default = "default_hi_res_layers")]
    pub hi_res_layers: usize,
    /// 人口密度阈值 [人/m²]
    #[serde(default = "default_pop_density_threshold")]
    pub pop_density_threshold: f64,
    /// 人口数阈值
    #[serde(default = "default_pop_threshold")]
    pub pop_threshold: f64,
    /// 人口加权浓度变化指标阈值（动态网格）
    #[serde(default = "default_pop_conc_threshold")]
    pub pop_conc_threshold: f64,
    /// 普查数据中的人口列
    #[serde(default = "default_census_pop_columns")]
    pub census_pop_columns: Vec<String>,
    /// 用于网格加密判据的人口列
    #[serde(default = "default_pop_grid_column")]
    pub pop_grid_column: String,
    /// 死亡率列 → 对应人口列（死亡率单位: 每 10 万人每年死亡数）
    #[serde(default = "default_mortality_rate_columns")]
    pub mortality_rate_columns: BTreeMap<String, String>,
    /// 投影定义（仅记录，坐标已在投影坐标系中）
    #[serde(default = "default_projection")]
    pub projection: String,
    /// 普查人口数据文件
    #[serde(default)]
    pub census_file: PathBuf,
    /// 基线死亡率数据文件
    #[serde(default)]
    pub mortality_rate_file: PathBuf,
}

fn default_x0() -> f64 { -2_736_000.0 }
fn default_y0() -> f64 { -2_088_000.0 }
fn default_spacing() -> f64 { 288_000.0 }
fn default_x_nests() -> Vec<usize> { vec![18, 3, 2, 2, 2, 3, 2, 2] }
fn default_y_nests() -> Vec<usize> { vec![14, 3, 2, 2, 2, 3, 2, 2] }
fn default_hi_res_layers() -> usize { 8 }
fn default_pop_density_threshold() -> f64 { 0.0055 }
fn default_pop_threshold() -> f64 { 40_000.0 }
fn default_pop_conc_threshold() -> f64 { 1.0e-9 }
fn default_pop_grid_column() -> String { "TotalPop".to_string() }
fn default_projection() -> String {
    "+proj=lcc +lat_1=33.000000 +lat_2=45.000000 +lat_0=40.000000 +lon_0=-97.000000 +x_0=0 +y_0=0 +a=6370997.000000 +b=6370997.000000 +to_meter=1"
        .to_string()
}

fn default_census_pop_columns() -> Vec<String> {
    ["TotalPop", "WhiteNoLat", "Black", "Native", "Asian", "Latino"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_mortality_rate_columns() -> BTreeMap<String, String> {
    [
        ("AllCause", "TotalPop"),
        ("WhNoLMort", "WhiteNoLat"),
        ("BlackMort", "Black"),
        ("NativeMort", "Native"),
        ("AsianMort", "Asian"),
        ("LatinoMort", "Latino"),
    ]
    .iter()
    .map(|(m, p)| (m.to_string(), p.to_string()))
    .collect()
}

impl Default for VarGridConfig {
    fn default() -> Self {
        Self {
            x0: default_x0(),
            y0: default_y0(),
            dx: default_spacing(),
            dy: default_spacing(),
            x_nests: default_x_nests(),
            y_nests: default_y_nests(),
            hi_res_layers: default_hi_res_layers(),
            pop_density_threshold: default_pop_density_threshold(),
            pop_threshold: default_pop_threshold(),
            pop_conc_threshold: default_pop_conc_threshold(),
            census_pop_columns: default_census_pop_columns(),
            pop_grid_column: default_pop_grid_column(),
            mortality_rate_columns: default_mortality_rate_columns(),
            projection: default_projection(),
            census_file: PathBuf::new(),
            mortality_rate_file: PathBuf::new(),
        }
    }
}

impl VarGridConfig {
    /// 嵌套级数
    pub fn nest_levels(&self) -> usize {
        self.x_nests.len()
    }

    /// 第 `depth` 级嵌套的单元尺寸 (dx, dy)
    pub fn cell_size_at_depth(&self, depth: usize) -> (f64, f64) {
        let fx: usize = self.x_nests.iter().skip(1).take(depth).product();
        let fy: usize = self.y_nests.iter().skip(1).take(depth).product();
        (self.dx / fx as f64, self.dy / fy as f64)
    }

    /// 网格外包范围 (min_x, min_y, max_x, max_y)
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        let nx = self.x_nests.first().copied().unwrap_or(0) as f64;
        let ny = self.y_nests.first().copied().unwrap_or(0) as f64;
        (self.x0, self.y0, self.x0 + nx * self.dx, self.y0 + ny * self.dy)
    }

    /// 人口列在普查列中的序号
    pub fn pop_index(&self, column: &str) -> Option<usize> {
        self.census_pop_columns.iter().position(|c| c == column)
    }

    /// 加密判据使用的人口列序号
    pub fn pop_grid_index(&self) -> Result<usize, ConfigError> {
        self.pop_index(&self.pop_grid_column).ok_or_else(|| {
            ConfigError::invalid(
                "grid.pop_grid_column",
                &self.pop_grid_column,
                "不在 census_pop_columns 中",
            )
        })
    }

    /// 死亡率列名与对应人口列序号，按死亡率列名排序
    pub fn mortality_pairs(&self) -> Result<Vec<(String, usize)>, ConfigError> {
        self.mortality_rate_columns
            .iter()
            .map(|(mort, pop)| {
                self.pop_index(pop).map(|i| (mort.clone(), i)).ok_or_else(|| {
                    ConfigError::invalid(
                        "grid.mortality_rate_columns",
                        format!("{mort}:{pop}"),
                        "人口列不在 census_pop_columns 中",
                    )
                })
            })
            .collect()
    }

    /// 死亡率列名（按名称排序）
    pub fn mortality_columns(&self) -> Vec<String> {
        self.mortality_rate_columns.keys().cloned().collect()
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, v) in [("grid.x0", self.x0), ("grid.y0", self.y0)] {
            if !v.is_finite() {
                return Err(ConfigError::invalid(key, v, "必须为有限值"));
            }
        }
        for (key, v) in [("grid.dx", self.dx), ("grid.dy", self.dy)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(ConfigError::invalid(key, v, "单元尺寸必须为正"));
            }
        }
        if self.x_nests.is_empty() {
            return Err(ConfigError::Missing("grid.x_nests".to_string()));
        }
        if self.x_nests.len() != self.y_nests.len() {
            return Err(ConfigError::invalid(
                "grid.y_nests",
                format!("{:?}", self.y_nests),
                format!("长度必须与 x_nests ({}) 一致", self.x_nests.len()),
            ));
        }
        if self.x_nests.iter().chain(&self.y_nests).any(|&n| n == 0) {
            return Err(ConfigError::invalid(
                "grid.x_nests/y_nests",
                format!("{:?}/{:?}", self.x_nests, self.y_nests),
                "嵌套倍数必须 ≥ 1",
            ));
        }
        for (key, v) in [
            ("grid.pop_density_threshold", self.pop_density_threshold),
            ("grid.pop_threshold", self.pop_threshold),
            ("grid.pop_conc_threshold", self.pop_conc_threshold),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(ConfigError::invalid(key, v, "阈值必须为非负有限值"));
            }
        }
        if self.census_pop_columns.is_empty() {
            return Err(ConfigError::Missing("grid.census_pop_columns".to_string()));
        }
        self.pop_grid_index()?;
        self.mortality_pairs()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let cfg = VarGridConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.nest_levels(), 8);
        assert_eq!(cfg.pop_grid_index().unwrap(), 0);
    }

    #[test]
    fn test_cell_size_at_depth() {
        let cfg = VarGridConfig::default();
        assert_eq!(cfg.cell_size_at_depth(0), (288_000.0, 288_000.0));
        assert_eq!(cfg.cell_size_at_depth(1), (96_000.0, 96_000.0));
        assert_eq!(cfg.cell_size_at_depth(2), (48_000.0, 48_000.0));
    }

    #[test]
    fn test_extent() {
        let cfg = VarGridConfig::default();
        let (x0, y0, x1, y1) = cfg.extent();
        assert_eq!(x0, -2_736_000.0);
        assert_eq!(x1 - x0, 18.0 * 288_000.0);
        assert_eq!(y1 - y0, 14.0 * 288_000.0);
    }

    #[test]
    fn test_mismatched_nests_rejected() {
        let cfg = VarGridConfig {
            y_nests: vec![2],
            ..VarGridConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_unknown_pop_column_rejected() {
        let cfg = VarGridConfig {
            pop_grid_column: "Nobody".into(),
            ..VarGridConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_mortality_pairs_sorted() {
        let cfg = VarGridConfig::default();
        let pairs = cfg.mortality_pairs().unwrap();
        assert_eq!(pairs[0], ("AllCause".to_string(), 0));
        assert_eq!(pairs.len(), 6);
    }
}
