// crates/am_grid/src/timestep.rs

//! 时间步长控制模块
//!
//! 基于 CFL 条件与扩散稳定性条件的自适应时间步长。
//!
//! ## 平流条件
//!
//! $$ \Delta t \leq C \cdot \min_i \frac{1}{|u_i|/\Delta x_i + |v_i|/\Delta y_i + |w_i|/\Delta z_i} $$
//!
//! 求和形式比逐轴条件更严格，保证每个轴上 `dt·|vel|/dim ≤ C < 1`。
//!
//! ## 扩散条件
//!
//! $$ \Delta t \leq \frac{0.5}{2K_{xxyy}(1/\Delta x^2 + 1/\Delta y^2) + 2K_{zz}/\Delta z^2} $$
//!
//! 所有速度与扩散系数均为零时取 `max_dt`。

use crate::cell::Cell;
use crate::domain::Domain;
use am_config::TimestepConfig;
use am_foundation::{AmError, AmResult};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

/// 单元的逆时间尺度（平流, 扩散）[1/s]
fn inverse_time_scales(cell: &Cell) -> AmResult<(f64, f64)> {
    for (axis, value) in [("x", cell.dx()), ("y", cell.dy()), ("z", cell.dz)] {
        if !(value.is_finite() && value > 0.0) {
            return Err(AmError::degenerate_cell(cell.layer, axis, value));
        }
    }
    let met = &cell.met;
    for (name, value) in [
        ("u", met.u),
        ("v", met.v),
        ("w", met.w),
        ("Kxxyy", met.kxxyy),
        ("Kzz", met.kzz),
    ] {
        AmError::check_finite(name, value)?;
    }

    let advective = met.u.abs() / cell.dx() + met.v.abs() / cell.dy() + met.w.abs() / cell.dz;
    let diffusive = 2.0
        * (2.0 * met.kxxyy.abs() * (1.0 / (cell.dx() * cell.dx()) + 1.0 / (cell.dy() * cell.dy()))
            + 2.0 * met.kzz.abs() / (cell.dz * cell.dz));
    Ok((advective, diffusive))
}

/// CFL 时间步计算器
#[derive(Debug, Clone)]
pub struct CflCalculator {
    /// 安全系数
    safety: f64,
    /// 最大时间步长
    max_dt: f64,
}

impl CflCalculator {
    /// 创建计算器
    pub fn new(config: &TimestepConfig) -> Self {
        Self {
            safety: config.safety,
            max_dt: config.max_dt,
        }
    }

    /// 计算时间步长
    pub fn compute_dt(&self, domain: &Domain) -> AmResult<f64> {
        if domain.is_empty() {
            return Ok(self.max_dt);
        }

        // 非负浮点数的位模式与数值同序，可直接用原子 fetch_max
        let max_adv = AtomicU64::new(0.0f64.to_bits());
        let max_diff = AtomicU64::new(0.0f64.to_bits());

        let cells: Vec<&Cell> = domain.iter().map(|(_, c)| c).collect();
        cells.par_iter().try_for_each(|cell| -> AmResult<()> {
            let (adv, diff) = inverse_time_scales(cell)?;
            max_adv.fetch_max(adv.to_bits(), Ordering::Relaxed);
            max_diff.fetch_max(diff.to_bits(), Ordering::Relaxed);
            Ok(())
        })?;

        let adv = f64::from_bits(max_adv.load(Ordering::Relaxed));
        let diff = f64::from_bits(max_diff.load(Ordering::Relaxed));

        let mut dt = self.max_dt;
        if adv > 0.0 {
            dt = dt.min(self.safety / adv);
        }
        if diff > 0.0 {
            dt = dt.min(1.0 / diff);
        }
        AmError::check_finite("dt", dt)
    }
}

/// 计算域的稳定时间步长
pub fn cfl_timestep(domain: &Domain, config: &TimestepConfig) -> AmResult<f64> {
    CflCalculator::new(config).compute_dt(domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Meteorology;
    use crate::domain::GridCriteria;
    use crate::species::{SpeciesClass, SpeciesSet};
    use am_geo::BoundingBox;
    use std::sync::Arc;

    fn domain_with(cells: Vec<(BoundingBox, f64, Meteorology)>) -> Domain {
        let species = Arc::new(SpeciesSet::new(&[("A", SpeciesClass::Gas)], &[]).unwrap());
        let mut domain = Domain::new(
            1,
            species,
            Vec::new(),
            Vec::new(),
            GridCriteria {
                pop_conc_threshold: 1.0,
            },
        );
        for (bounds, dz, met) in cells {
            let mut cell = Cell::new(0, vec![[0, 0]], bounds, 1);
            cell.dz = dz;
            cell.met = met;
            domain.push_cell(cell).unwrap();
        }
        domain
    }

    fn config() -> TimestepConfig {
        TimestepConfig {
            safety: 0.5,
            max_dt: 3600.0,
            recompute_interval: 3600.0,
        }
    }

    #[test]
    fn test_still_air_uses_max_dt() {
        let d = domain_with(vec![(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 5.0, Meteorology::default())]);
        assert_eq!(cfl_timestep(&d, &config()).unwrap(), 3600.0);
    }

    #[test]
    fn test_advective_bound_takes_smallest_cell() {
        let met = Meteorology {
            u: 2.0,
            v: 1.0,
            ..Default::default()
        };
        let d = domain_with(vec![
            (BoundingBox::new(0.0, 0.0, 100.0, 100.0), 50.0, met),
            (BoundingBox::new(100.0, 0.0, 110.0, 10.0), 50.0, met),
        ]);
        let dt = cfl_timestep(&d, &config()).unwrap();
        // 小单元：2/10 + 1/10 = 0.3
        assert!((dt - 0.5 / 0.3).abs() < 1e-12);
        assert!(dt * 2.0 / 10.0 <= 1.0);
    }

    #[test]
    fn test_diffusive_bound() {
        let met = Meteorology {
            kzz: 10.0,
            ..Default::default()
        };
        let d = domain_with(vec![(BoundingBox::new(0.0, 0.0, 1.0e4, 1.0e4), 10.0, met)]);
        let dt = cfl_timestep(&d, &config()).unwrap();
        // 0.5 / (2·10/100) = 2.5
        assert!((dt - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_cell_is_fatal() {
        let d = domain_with(vec![(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.0, Meteorology::default())]);
        assert!(matches!(
            cfl_timestep(&d, &config()),
            Err(AmError::DegenerateCell { axis: "z", .. })
        ));
    }

    #[test]
    fn test_non_finite_velocity_is_fatal() {
        let met = Meteorology {
            u: f64::NAN,
            ..Default::default()
        };
        let d = domain_with(vec![(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 1.0, met)]);
        assert!(matches!(cfl_timestep(&d, &config()), Err(AmError::NonFinite { .. })));
    }
}
