// crates/am_physics/src/convergence.rs

//! 收敛判据
//!
//! - 固定迭代：第 N 次调用时返回收敛，恰好执行 N 轮
//! - 稳态：每隔 `check_interval` 模拟秒计算一次地面层
//!   Σ pop × 总PM2.5，连续 `window` 次相对变化小于 `tolerance` 即收敛；
//!   可选的停滞判据：超过 `stall_period` 未发生拆分

use crate::pipeline::{Stage, StageSignal};
use am_config::{AirMeshConfig, ConvergenceConfig};
use am_foundation::{AmError, AmResult};
use am_grid::Domain;

/// 收敛模式
#[derive(Debug, Clone, PartialEq)]
pub enum ConvergenceMode {
    /// 固定迭代次数
    FixedIterations(usize),
    /// 稳态判据
    Steady(ConvergenceConfig),
}

/// 稳态判据的滚动状态
#[derive(Debug, Clone, Default)]
struct SteadyTracker {
    last_check: Option<f64>,
    last_value: Option<f64>,
    streak: usize,
}

impl SteadyTracker {
    fn check(&mut self, domain: &Domain, cfg: &ConvergenceConfig, metric: impl FnOnce() -> f64) -> AmResult<StageSignal> {
        if let Some(stall) = cfg.stall_period {
            if domain.time - domain.mutation_clock.last_split_time >= stall {
                log::info!("{:.0}s 内未发生网格拆分，视为收敛", stall);
                return Ok(StageSignal::Converged);
            }
        }

        let due = self.last_check.map_or(true, |t| domain.time - t >= cfg.check_interval);
        if !due {
            return Ok(StageSignal::Continue);
        }
        self.last_check = Some(domain.time);

        let value = AmError::check_finite("收敛判据", metric())?;
        if let Some(old) = self.last_value {
            let change = if value == 0.0 && old == 0.0 {
                0.0
            } else {
                (value - old).abs() / value.abs()
            };
            log::debug!("t={:.0}s 收敛判据 {:.6e}, 相对变化 {:.3e}", domain.time, value, change);
            if change < cfg.tolerance {
                self.streak += 1;
            } else {
                self.streak = 0;
            }
        }
        self.last_value = Some(value);

        if self.streak >= cfg.window {
            log::info!("t={:.0}s 达到稳态 (连续 {} 次变化 < {})", domain.time, self.streak, cfg.tolerance);
            return Ok(StageSignal::Converged);
        }
        Ok(StageSignal::Continue)
    }
}

/// 地面层人口加权总 PM2.5
fn ground_exposure(domain: &Domain, pop_column: usize, pm_indices: &[usize]) -> f64 {
    domain
        .iter()
        .filter(|(_, c)| c.layer == 0)
        .map(|(_, c)| {
            let pop = c.population.get(pop_column).copied().unwrap_or(0.0);
            let pm: f64 = pm_indices.iter().map(|&i| c.cf[i]).sum();
            pop * pm
        })
        .sum()
}

/// 收敛检查阶段
#[derive(Debug, Clone)]
pub struct ConvergenceCheck {
    mode: ConvergenceMode,
    pop_column: usize,
    pm_indices: Vec<usize>,
    calls: usize,
    tracker: SteadyTracker,
}

impl ConvergenceCheck {
    /// 创建收敛检查
    ///
    /// `pop_column` 为人口列序号，`pm_indices` 为构成总 PM2.5 的物种序号。
    pub fn new(mode: ConvergenceMode, pop_column: usize, pm_indices: Vec<usize>) -> AmResult<Self> {
        if let ConvergenceMode::FixedIterations(0) = mode {
            return Err(AmError::invalid_config("simulation.num_iterations", "0", "固定迭代次数必须 ≥ 1"));
        }
        Ok(Self {
            mode,
            pop_column,
            pm_indices,
            calls: 0,
            tracker: SteadyTracker::default(),
        })
    }

    /// 地面层人口加权总 PM2.5
    pub fn metric(&self, domain: &Domain) -> f64 {
        ground_exposure(domain, self.pop_column, &self.pm_indices)
    }
}

impl Stage for ConvergenceCheck {
    fn name(&self) -> &str {
        "ConvergenceCheck"
    }

    fn apply(&mut self, domain: &mut Domain, _config: &AirMeshConfig) -> AmResult<StageSignal> {
        self.calls += 1;
        match &self.mode {
            ConvergenceMode::FixedIterations(n) => Ok(if self.calls >= *n {
                StageSignal::Converged
            } else {
                StageSignal::Continue
            }),
            ConvergenceMode::Steady(cfg) => {
                let domain: &Domain = domain;
                let (pop_column, pm_indices) = (self.pop_column, &self.pm_indices);
                self.tracker
                    .check(domain, cfg, || ground_exposure(domain, pop_column, pm_indices))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_geo::BoundingBox;
    use am_grid::{Cell, GridCriteria, SpeciesClass, SpeciesSet};
    use std::sync::Arc;

    fn domain(pm: f64) -> Domain {
        let species = Arc::new(SpeciesSet::new(&[("P", SpeciesClass::Particle)], &[]).unwrap());
        let mut d = Domain::new(
            1,
            species,
            vec!["TotalPop".into()],
            Vec::new(),
            GridCriteria { pop_conc_threshold: 1.0 },
        );
        let mut c = Cell::new(0, vec![[0, 0]], BoundingBox::new(0.0, 0.0, 1.0, 1.0), 1);
        c.dz = 1.0;
        c.population = vec![100.0];
        c.cf = vec![pm];
        d.push_cell(c).unwrap();
        d
    }

    #[test]
    fn test_fixed_iterations() {
        let mut check = ConvergenceCheck::new(ConvergenceMode::FixedIterations(3), 0, vec![0]).unwrap();
        let mut d = domain(0.0);
        let config = AirMeshConfig::default();
        assert_eq!(check.apply(&mut d, &config).unwrap(), StageSignal::Continue);
        assert_eq!(check.apply(&mut d, &config).unwrap(), StageSignal::Continue);
        assert_eq!(check.apply(&mut d, &config).unwrap(), StageSignal::Converged);
        assert!(ConvergenceCheck::new(ConvergenceMode::FixedIterations(0), 0, vec![0]).is_err());
    }

    #[test]
    fn test_steady_needs_window_consecutive_checks() {
        let cfg = ConvergenceConfig {
            check_interval: 10.0,
            tolerance: 0.01,
            window: 2,
            stall_period: None,
        };
        let mut check = ConvergenceCheck::new(ConvergenceMode::Steady(cfg), 0, vec![0]).unwrap();
        let config = AirMeshConfig::default();
        let mut d = domain(1.0);
        let mut signals = Vec::new();
        // 每次检查都落在间隔上；浓度在 t=10 后稳定
        for (t, pm) in [(0.0, 1.0), (10.0, 2.0), (15.0, 2.0), (20.0, 2.001), (30.0, 2.001)] {
            d.time = t;
            let id = d.ids()[0];
            d.cell_mut(id).unwrap().cf[0] = pm;
            signals.push(check.apply(&mut d, &config).unwrap());
        }
        assert_eq!(
            signals,
            vec![
                StageSignal::Continue,
                StageSignal::Continue,
                StageSignal::Continue,
                StageSignal::Continue,
                StageSignal::Converged,
            ]
        );
    }

    #[test]
    fn test_stall_period() {
        let cfg = ConvergenceConfig {
            stall_period: Some(100.0),
            ..ConvergenceConfig::default()
        };
        let mut check = ConvergenceCheck::new(ConvergenceMode::Steady(cfg), 0, vec![0]).unwrap();
        let config = AirMeshConfig::default();
        let mut d = domain(1.0);
        d.time = 50.0;
        assert_eq!(check.apply(&mut d, &config).unwrap(), StageSignal::Continue);
        d.time = 100.0;
        assert_eq!(check.apply(&mut d, &config).unwrap(), StageSignal::Converged);
    }
}
