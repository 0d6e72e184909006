// crates/am_physics/tests/end_to_end.rs

//! 点源排放的动态网格端到端运行

use am_config::AirMeshConfig;
use am_geo::Point2D;
use am_grid::synthetic::SyntheticScenario;
use am_grid::Domain;
use am_physics::prelude::*;
use am_physics::TOTAL_PM25;
use std::sync::Arc;

/// 地面层 TotalPop 死亡数合计
const TOTAL_POP_DEATHS: f64 = 24.611780089715559;

fn simulation() -> (SyntheticScenario, Simulation) {
    let scenario = SyntheticScenario::small().with_layers(10);
    let mut config = AirMeshConfig {
        grid: scenario.config.clone(),
        ..AirMeshConfig::default()
    };
    config.simulation.num_iterations = 8;
    config.simulation.mutation_interval = 200.0;
    let emissions = scenario
        .point_emissions(&[("PM25", 5.0e6), ("NOx", 2.0e7)], 0)
        .unwrap();
    let sim = Simulation::new(
        config,
        Arc::new(scenario.inputs().unwrap()),
        Arc::new(emissions),
        Arc::new(LinearChemistry::default()),
    )
    .unwrap();
    (scenario, sim)
}

fn depth_at(domain: &Domain, p: Point2D) -> usize {
    let id = domain.cell_containing(0, p).unwrap();
    domain.get(id).unwrap().depth()
}

#[test]
fn point_source_run_is_deterministic_and_refined_near_source() {
    let (scenario, sim) = simulation();

    let (first, summary) = sim.run().unwrap();
    assert_eq!(summary.iterations, 8);
    assert_eq!(first.nlayers(), 10);
    // 两个加密层在 t≈250/500/750 s 三次变异中共拆分 116 次
    assert_eq!(first.layer_counts(), vec![190, 190, 16, 16, 16, 16, 16, 16, 16, 16]);
    assert_eq!(first.mutation_clock.splits, 116);
    first.validate_topology().unwrap();

    let results = sim.results(&first).unwrap();
    let deaths_name = format!("{} deaths", sim.config().grid.pop_grid_column);
    let deaths = results.total(&deaths_name).unwrap();
    assert!(
        ((deaths - TOTAL_POP_DEATHS) / TOTAL_POP_DEATHS).abs() < 1e-8,
        "deaths = {deaths}"
    );

    // 源所在单元浓度高于上风向远角
    let pm = results.get(TOTAL_PM25).unwrap();
    let ground = first.cells_in_layer(0);
    let position = |p: Point2D| {
        let id = first.cell_containing(0, p).unwrap();
        ground.iter().position(|&g| g == id).unwrap()
    };
    let corner = Point2D::new(1_000.0, 1_000.0);
    assert!(pm[position(scenario.city_center())] > 0.0);
    assert!(pm[position(scenario.city_center())] > pm[position(corner)]);

    // 源附近加密更深，远角保持粗网格
    assert!(depth_at(&first, scenario.city_center()) > depth_at(&first, corner));

    let (second, _) = sim.run().unwrap();
    assert_eq!(first.layer_counts(), second.layer_counts());
    let again = sim.results(&second).unwrap();
    assert_eq!(again.total(&deaths_name), Some(deaths));
    assert_eq!(again.get(TOTAL_PM25), Some(pm));
}
