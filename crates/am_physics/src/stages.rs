// crates/am_physics/src/stages.rs

//! 网格相关阶段：构建、静态加密、排放分摊、动态变异、时间步长

use crate::pipeline::{Stage, StageSignal};
use am_config::AirMeshConfig;
use am_foundation::AmResult;
use am_grid::builder::report_uncovered_emissions;
use am_grid::{
    cfl_timestep, CellFactory, Domain, Emissions, GridBuilder, MutationEngine, PopConcMutator, SpeciesSet,
    StaticInputs,
};
use std::sync::Arc;

/// 构建规则网格（替换流水线中的模拟域）
pub struct BuildGrid {
    inputs: Arc<StaticInputs>,
    emissions: Arc<Emissions>,
    species: Arc<SpeciesSet>,
}

impl BuildGrid {
    /// 创建阶段
    pub fn new(inputs: Arc<StaticInputs>, emissions: Arc<Emissions>, species: Arc<SpeciesSet>) -> Self {
        Self {
            inputs,
            emissions,
            species,
        }
    }
}

impl Stage for BuildGrid {
    fn name(&self) -> &str {
        "BuildGrid"
    }

    fn apply(&mut self, domain: &mut Domain, config: &AirMeshConfig) -> AmResult<StageSignal> {
        let factory = CellFactory::new(&config.grid, &self.inputs, &self.emissions, Arc::clone(&self.species))?;
        *domain = GridBuilder::regular(&factory)?;
        Ok(StageSignal::Continue)
    }
}

/// 静态人口加密，直到没有单元满足判据
pub struct StaticRefine {
    inputs: Arc<StaticInputs>,
    emissions: Arc<Emissions>,
}

impl StaticRefine {
    /// 创建阶段
    pub fn new(inputs: Arc<StaticInputs>, emissions: Arc<Emissions>) -> Self {
        Self { inputs, emissions }
    }
}

impl Stage for StaticRefine {
    fn name(&self) -> &str {
        "StaticRefine"
    }

    fn apply(&mut self, domain: &mut Domain, config: &AirMeshConfig) -> AmResult<StageSignal> {
        let factory = CellFactory::new(&config.grid, &self.inputs, &self.emissions, domain.species_arc())?;
        let splits = MutationEngine::new(&factory).refine_static(domain)?;
        log::info!("静态加密完成: 拆分 {} 次, 当前每层单元数 {:?}", splits, domain.layer_counts());
        Ok(StageSignal::Continue)
    }
}

/// 按当前网格重新分摊排放
pub struct AllocateEmissions {
    emissions: Arc<Emissions>,
}

impl AllocateEmissions {
    /// 创建阶段
    pub fn new(emissions: Arc<Emissions>) -> Self {
        Self { emissions }
    }
}

impl Stage for AllocateEmissions {
    fn name(&self) -> &str {
        "AllocateEmissions"
    }

    fn apply(&mut self, domain: &mut Domain, _config: &AirMeshConfig) -> AmResult<StageSignal> {
        let species = domain.species_arc();
        self.emissions.check_species(&species)?;
        let Some(extent) = domain.extent() else {
            return Ok(StageSignal::Continue);
        };
        let emissions = &self.emissions;
        domain.for_each_cell_mut(|_, cell| {
            cell.emis_flux = emissions.flux_for(&cell.bounds, cell.layer, cell.volume(), &species, &extent)?;
            Ok(())
        })?;
        report_uncovered_emissions(domain, emissions);
        Ok(StageSignal::Continue)
    }
}

/// 动态人口-浓度变异
///
/// 发生拆分后立即重新计算时间步长。配置了 `max_cells` 且变异后单元数
/// 超过上限时，动态阈值乘以 `threshold_growth`。
pub struct MutateGrid {
    inputs: Arc<StaticInputs>,
    emissions: Arc<Emissions>,
}

impl MutateGrid {
    /// 创建阶段
    pub fn new(inputs: Arc<StaticInputs>, emissions: Arc<Emissions>) -> Self {
        Self { inputs, emissions }
    }
}

impl Stage for MutateGrid {
    fn name(&self) -> &str {
        "MutateGrid"
    }

    fn apply(&mut self, domain: &mut Domain, config: &AirMeshConfig) -> AmResult<StageSignal> {
        let factory = CellFactory::new(&config.grid, &self.inputs, &self.emissions, domain.species_arc())?;
        let mutator = PopConcMutator::from_config(&config.grid)?;
        let report = MutationEngine::new(&factory).mutate(domain, &mutator)?;
        if report.splits > 0 {
            domain.dt = cfl_timestep(domain, &config.simulation.timestep)?;
        }

        if let Some(max) = config.simulation.max_cells {
            if domain.len() > max {
                let old = domain.criteria.pop_conc_threshold;
                domain.criteria.pop_conc_threshold = old * config.simulation.threshold_growth;
                log::info!(
                    "单元数 {} 超过上限 {}，动态阈值 {:e} → {:e}",
                    domain.len(),
                    max,
                    old,
                    domain.criteria.pop_conc_threshold
                );
            }
        }
        Ok(StageSignal::Continue)
    }
}

/// 按 CFL 条件重新计算时间步长
#[derive(Debug, Clone, Copy, Default)]
pub struct SetTimestepCFL;

impl Stage for SetTimestepCFL {
    fn name(&self) -> &str {
        "SetTimestepCFL"
    }

    fn apply(&mut self, domain: &mut Domain, config: &AirMeshConfig) -> AmResult<StageSignal> {
        domain.dt = cfl_timestep(domain, &config.simulation.timestep)?;
        log::debug!("t={:.0}s 时间步长 {:.3}s", domain.time, domain.dt);
        Ok(StageSignal::Continue)
    }
}
