// crates/am_config/src/simulation.rs

//! 模拟运行配置：排放单位、迭代控制、时间步长、收敛判据

use crate::error::ConfigError;
use crate::units::EmissionUnits;
use serde::{Deserialize, Serialize};

/// 模拟配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// 排放数据单位
    #[serde(default)]
    pub emission_units: EmissionUnits,

    /// 固定迭代次数；0 表示按收敛判据停止
    #[serde(default)]
    pub num_iterations: usize,

    /// 静态网格：只在初始化阶段按人口加密一次
    #[serde(default)]
    pub static_grid: bool,

    /// 动态网格变异间隔 [s]
    #[serde(default = "default_mutation_interval")]
    pub mutation_interval: f64,

    /// 时间步长控制
    #[serde(default)]
    pub timestep: TimestepConfig,

    /// 收敛判据
    #[serde(default)]
    pub convergence: ConvergenceConfig,

    /// 运行阶段迭代上限（硬性保护，可选）
    #[serde(default)]
    pub max_iterations: Option<u64>,

    /// 单元数上限；超出后动态阈值按 `threshold_growth` 放大
    #[serde(default)]
    pub max_cells: Option<usize>,

    /// 阈值放大倍数
    #[serde(default = "default_threshold_growth")]
    pub threshold_growth: f64,
}

fn default_mutation_interval() -> f64 { 3600.0 }
fn default_threshold_growth() -> f64 { 2.0 }

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            emission_units: EmissionUnits::default(),
            num_iterations: 0,
            static_grid: false,
            mutation_interval: default_mutation_interval(),
            timestep: TimestepConfig::default(),
            convergence: ConvergenceConfig::default(),
            max_iterations: None,
            max_cells: None,
            threshold_growth: default_threshold_growth(),
        }
    }
}

/// 时间步长配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestepConfig {
    /// CFL 安全系数，∈ (0, 1)
    #[serde(default = "default_safety")]
    pub safety: f64,
    /// 全场静风时的步长上限 [s]
    #[serde(default = "default_max_dt")]
    pub max_dt: f64,
    /// 运行阶段重新计算步长的间隔 [s]
    #[serde(default = "default_recompute_interval")]
    pub recompute_interval: f64,
}

fn default_safety() -> f64 { 0.5 }
fn default_max_dt() -> f64 { 3600.0 }
fn default_recompute_interval() -> f64 { 3600.0 }

impl Default for TimestepConfig {
    fn default() -> Self {
        Self {
            safety: default_safety(),
            max_dt: default_max_dt(),
            recompute_interval: default_recompute_interval(),
        }
    }
}

/// 稳态收敛判据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// 采样间隔 [s]
    #[serde(default = "default_check_interval")]
    pub check_interval: f64,
    /// 相邻采样相对变化容差
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// 连续满足容差的采样次数
    #[serde(default = "default_window")]
    pub window: usize,
    /// 网格持续未变异多久视为收敛 [s]；None 表示不启用
    #[serde(default)]
    pub stall_period: Option<f64>,
}

fn default_check_interval() -> f64 { 3600.0 }
fn default_tolerance() -> f64 { 0.005 }
fn default_window() -> usize { 2 }

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            tolerance: default_tolerance(),
            window: default_window(),
            stall_period: None,
        }
    }
}

fn positive(key: &str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, v, "必须为正的有限值"))
    }
}

impl SimulationConfig {
    /// 是否使用固定迭代次数
    pub fn fixed_iterations(&self) -> Option<usize> {
        (self.num_iterations >= 1).then_some(self.num_iterations)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("simulation.mutation_interval", self.mutation_interval)?;
        let safety = self.timestep.safety;
        if !(safety > 0.0 && safety < 1.0) {
            return Err(ConfigError::invalid(
                "simulation.timestep.safety",
                safety,
                "CFL 安全系数必须在 (0, 1) 范围内",
            ));
        }
        positive("simulation.timestep.max_dt", self.timestep.max_dt)?;
        positive("simulation.timestep.recompute_interval", self.timestep.recompute_interval)?;
        positive("simulation.convergence.check_interval", self.convergence.check_interval)?;
        positive("simulation.convergence.tolerance", self.convergence.tolerance)?;
        if self.convergence.window == 0 {
            return Err(ConfigError::invalid("simulation.convergence.window", 0, "必须 ≥ 1"));
        }
        if let Some(stall) = self.convergence.stall_period {
            positive("simulation.convergence.stall_period", stall)?;
        }
        if self.max_iterations == Some(0) {
            return Err(ConfigError::invalid("simulation.max_iterations", 0, "必须 ≥ 1"));
        }
        if self.threshold_growth <= 1.0 || !self.threshold_growth.is_finite() {
            return Err(ConfigError::invalid(
                "simulation.threshold_growth",
                self.threshold_growth,
                "必须大于 1",
            ));
        }
        Ok(())
    }
}
