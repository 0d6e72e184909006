// crates/am_grid/tests/cfl_bound.rs

//! 加密后重新计算的时间步长在每个坐标轴上满足 CFL 条件

use am_config::TimestepConfig;
use am_grid::prelude::*;
use am_grid::synthetic::SyntheticScenario;
use am_grid::cfl_timestep;

#[test]
fn cfl_holds_on_every_axis_after_refinement() {
    let mut s = SyntheticScenario::small();
    s.met.w = 0.02;
    let inputs = s.inputs().unwrap();
    let emissions = Emissions::new();
    let factory = CellFactory::new(&s.config, &inputs, &emissions, s.species().unwrap()).unwrap();
    let mut domain = GridBuilder::regular(&factory).unwrap();
    let config = TimestepConfig::default();

    let dt_coarse = cfl_timestep(&domain, &config).unwrap();
    MutationEngine::new(&factory).refine_static(&mut domain).unwrap();
    let dt_fine = cfl_timestep(&domain, &config).unwrap();

    assert!(dt_fine < dt_coarse);
    for (_, cell) in domain.iter() {
        assert!(dt_fine * cell.met.u.abs() / cell.dx() <= 1.0);
        assert!(dt_fine * cell.met.v.abs() / cell.dy() <= 1.0);
        assert!(dt_fine * cell.met.w.abs() / cell.dz <= 1.0);
        assert!(dt_fine <= config.max_dt);
    }
}
