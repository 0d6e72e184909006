// crates/am_physics/tests/iteration_count.rs

//! 迭代次数与终止方式

use am_config::AirMeshConfig;
use am_grid::synthetic::SyntheticScenario;
use am_grid::Emissions;
use am_physics::prelude::*;
use std::sync::Arc;

fn simulation(configure: impl FnOnce(&mut AirMeshConfig)) -> Simulation {
    let scenario = SyntheticScenario::small();
    let mut config = AirMeshConfig {
        grid: scenario.config.clone(),
        ..AirMeshConfig::default()
    };
    configure(&mut config);
    let emissions = scenario.point_emissions(&[("PM25", 1.0e6)], 0).unwrap();
    Simulation::new(
        config,
        Arc::new(scenario.inputs().unwrap()),
        Arc::new(emissions),
        Arc::new(LinearChemistry::default()),
    )
    .unwrap()
}

#[test]
fn fixed_iterations_run_exactly_n_times() {
    for n in [1, 4] {
        let sim = simulation(|c| {
            c.simulation.num_iterations = n;
            c.simulation.static_grid = true;
        });
        let (domain, summary) = sim.run().unwrap();
        assert_eq!(summary.iterations, n as u64);
        assert_eq!(summary.termination, Termination::Converged);
        assert!(summary.time > 0.0);
        assert!((domain.time - summary.time).abs() < 1e-9);
    }
}

#[test]
fn max_iterations_caps_steady_run() {
    let sim = simulation(|c| {
        c.simulation.num_iterations = 0;
        c.simulation.static_grid = true;
        c.simulation.max_iterations = Some(3);
    });
    let (_, summary) = sim.run().unwrap();
    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.termination, Termination::IterationLimit);
}

#[test]
fn static_grid_run_matches_static_refinement() {
    let sim = simulation(|c| {
        c.simulation.num_iterations = 2;
        c.simulation.static_grid = true;
    });
    let expected = sim.static_grid().unwrap().layer_counts();
    let (domain, _) = sim.run().unwrap();
    assert_eq!(domain.layer_counts(), expected);
}

#[test]
fn empty_emissions_leave_air_clean() {
    let scenario = SyntheticScenario::small();
    let config = AirMeshConfig {
        grid: scenario.config.clone(),
        simulation: am_config::SimulationConfig {
            num_iterations: 3,
            static_grid: true,
            ..Default::default()
        },
        ..AirMeshConfig::default()
    };
    let sim = Simulation::new(
        config,
        Arc::new(scenario.inputs().unwrap()),
        Arc::new(Emissions::new()),
        Arc::new(LinearChemistry::default()),
    )
    .unwrap();
    let (domain, _) = sim.run().unwrap();
    assert!(domain.total_mass().iter().all(|&m| m == 0.0));
}

#[test]
fn dynamic_run_starts_from_regular_grid() {
    let sim = simulation(|c| {
        c.simulation.num_iterations = 1;
        c.simulation.static_grid = false;
        c.simulation.mutation_interval = 1.0e12;
    });
    let pipeline = sim.pipeline().unwrap();
    let (init, _) = pipeline.stage_names();
    assert!(!init.contains(&"StaticRefine"));

    let (domain, summary) = sim.run().unwrap();
    assert_eq!(summary.iterations, 1);
    assert_eq!(domain.layer_counts(), vec![16, 16, 16]);
    assert_eq!(domain.mutation_clock.splits, 0);
    assert!(domain.iter().all(|(_, c)| c.depth() == 0));
}

#[test]
fn emissions_run_as_their_own_group_before_transport() {
    let sim = simulation(|c| c.simulation.static_grid = false);
    let pipeline = sim.pipeline().unwrap();
    let (init, run) = pipeline.stage_names();
    assert_eq!(init, vec!["BuildGrid", "AllocateEmissions", "SetTimestepCFL"]);
    assert_eq!(
        run,
        vec![
            "Calculations",
            "Calculations",
            "Periodic(MutateGrid)",
            "Periodic(SetTimestepCFL)",
            "ConvergenceCheck",
        ]
    );
    assert_eq!(sim.emission_calculations().kernel_names(), vec!["AddEmissionsFlux"]);
    let transport = sim.calculations().kernel_names();
    assert_eq!(transport[0], "UpwindAdvection");
    assert!(!transport.contains(&"AddEmissionsFlux"));

    let static_sim = simulation(|c| c.simulation.static_grid = true);
    let static_pipeline = static_sim.pipeline().unwrap();
    let (init, run) = static_pipeline.stage_names();
    assert_eq!(init[1], "StaticRefine");
    assert!(!run.contains(&"Periodic(MutateGrid)"));
}
