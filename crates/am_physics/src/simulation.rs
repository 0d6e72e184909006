// crates/am_physics/src/simulation.rs

//! 标准模拟装配
//!
//! 把配置、静态输入、排放与化学机制装配成流水线：
//!
//! - init：`BuildGrid → [StaticRefine] → AllocateEmissions → SetTimestepCFL`
//! - run：`Calculations(排放) → Calculations(输运与清除) → Periodic(MutateGrid) →
//!   Periodic(SetTimestepCFL) → ConvergenceCheck`
//!
//! 静态网格（`static_grid = true`）在 init 中做静态人口加密，run 中省略 `MutateGrid`；
//! 动态网格从规则网格出发，只由 `MutateGrid` 加密。
//! 从已有网格出发（SR 计算）时 init 只有 `AllocateEmissions → SetTimestepCFL`。

use crate::convergence::{ConvergenceCheck, ConvergenceMode};
use crate::kernels::{
    AddEmissionsFlux, Calculations, Chemistry, DryDeposition, MeanderMixing, Mixing, UpwindAdvection, WetDeposition,
};
use crate::mechanism::{total_pm_indices, Mechanism};
use crate::pipeline::{Periodic, Pipeline, RunSummary};
use crate::results::{OutputSet, Results};
use crate::stages::{AllocateEmissions, BuildGrid, MutateGrid, SetTimestepCFL, StaticRefine};
use am_config::AirMeshConfig;
use am_foundation::AmResult;
use am_grid::{CellFactory, Domain, Emissions, GridBuilder, GridCriteria, MutationEngine, SpeciesSet, StaticInputs};
use std::sync::Arc;

/// 模拟装配器
#[derive(Debug, Clone)]
pub struct Simulation {
    config: AirMeshConfig,
    inputs: Arc<StaticInputs>,
    emissions: Arc<Emissions>,
    mechanism: Arc<dyn Mechanism>,
    species: Arc<SpeciesSet>,
}

impl Simulation {
    /// 创建装配器，校验配置与排放物种
    pub fn new(
        config: AirMeshConfig,
        inputs: Arc<StaticInputs>,
        emissions: Arc<Emissions>,
        mechanism: Arc<dyn Mechanism>,
    ) -> AmResult<Self> {
        config.validate()?;
        let species = Arc::new(mechanism.species()?);
        emissions.check_species(&species)?;
        Ok(Self {
            config,
            inputs,
            emissions,
            mechanism,
            species,
        })
    }

    /// 配置
    pub fn config(&self) -> &AirMeshConfig {
        &self.config
    }

    /// 物种表
    pub fn species(&self) -> &Arc<SpeciesSet> {
        &self.species
    }

    /// 化学机制
    pub fn mechanism(&self) -> &Arc<dyn Mechanism> {
        &self.mechanism
    }

    /// 换用另一组排放（共享输入与机制）
    pub fn with_emissions(&self, emissions: Arc<Emissions>) -> AmResult<Self> {
        emissions.check_species(&self.species)?;
        Ok(Self {
            emissions,
            ..self.clone()
        })
    }

    /// 静态网格：规则网格 + 静态人口加密
    pub fn static_grid(&self) -> AmResult<Domain> {
        let factory = CellFactory::new(&self.config.grid, &self.inputs, &self.emissions, Arc::clone(&self.species))?;
        let mut domain = GridBuilder::regular(&factory)?;
        MutationEngine::new(&factory).refine_static(&mut domain)?;
        Ok(domain)
    }

    fn empty_domain(&self) -> Domain {
        Domain::new(
            0,
            Arc::clone(&self.species),
            self.config.grid.census_pop_columns.clone(),
            self.config.grid.mortality_columns(),
            GridCriteria {
                pop_conc_threshold: self.config.grid.pop_conc_threshold,
            },
        )
    }

    /// 排放计算组，先于输运单独执行
    pub fn emission_calculations(&self) -> Calculations {
        Calculations::new().with(AddEmissionsFlux)
    }

    /// 输运、清除与化学计算组
    pub fn calculations(&self) -> Calculations {
        Calculations::new()
            .with(UpwindAdvection)
            .with(Mixing)
            .with(MeanderMixing)
            .with(DryDeposition::new(&self.species))
            .with(WetDeposition)
            .with(Chemistry::new(Arc::clone(&self.mechanism)))
    }

    fn convergence(&self) -> AmResult<ConvergenceCheck> {
        let sim = &self.config.simulation;
        let mode = match sim.fixed_iterations() {
            Some(n) => ConvergenceMode::FixedIterations(n),
            None => ConvergenceMode::Steady(sim.convergence.clone()),
        };
        ConvergenceCheck::new(
            mode,
            self.config.grid.pop_grid_index()?,
            total_pm_indices(self.mechanism.as_ref(), &self.species),
        )
    }

    fn with_run_stages(&self, mut pipeline: Pipeline) -> AmResult<Pipeline> {
        let sim = &self.config.simulation;
        pipeline = pipeline
            .with_run(self.emission_calculations())
            .with_run(self.calculations());
        if !sim.static_grid {
            pipeline = pipeline.with_run(Periodic::new(
                sim.mutation_interval,
                MutateGrid::new(Arc::clone(&self.inputs), Arc::clone(&self.emissions)),
            ));
        }
        pipeline = pipeline
            .with_run(Periodic::new(sim.timestep.recompute_interval, SetTimestepCFL))
            .with_run(self.convergence()?)
            .with_max_iterations(sim.max_iterations);
        Ok(pipeline)
    }

    /// 从零开始的完整流水线
    pub fn pipeline(&self) -> AmResult<Pipeline> {
        let mut pipeline = Pipeline::new(self.empty_domain()).with_init(BuildGrid::new(
            Arc::clone(&self.inputs),
            Arc::clone(&self.emissions),
            Arc::clone(&self.species),
        ));
        if self.config.simulation.static_grid {
            pipeline = pipeline.with_init(StaticRefine::new(Arc::clone(&self.inputs), Arc::clone(&self.emissions)));
        }
        let pipeline = pipeline
            .with_init(AllocateEmissions::new(Arc::clone(&self.emissions)))
            .with_init(SetTimestepCFL);
        self.with_run_stages(pipeline)
    }

    /// 从已有网格出发的流水线
    pub fn pipeline_on(&self, base: Domain) -> AmResult<Pipeline> {
        let pipeline = Pipeline::new(base)
            .with_init(AllocateEmissions::new(Arc::clone(&self.emissions)))
            .with_init(SetTimestepCFL);
        self.with_run_stages(pipeline)
    }

    /// 执行流水线，返回最终模拟域与运行摘要
    pub fn run_pipeline(&self, mut pipeline: Pipeline) -> AmResult<(Domain, RunSummary)> {
        pipeline.init(&self.config)?;
        let summary = pipeline.run(&self.config)?;
        Ok((pipeline.into_domain(), summary))
    }

    /// 从零开始运行
    pub fn run(&self) -> AmResult<(Domain, RunSummary)> {
        self.run_pipeline(self.pipeline()?)
    }

    /// 标准输出集
    pub fn outputs(&self, domain: &Domain) -> AmResult<OutputSet> {
        OutputSet::standard(&self.config.output, &self.config.grid, self.mechanism.as_ref(), domain)
    }

    /// 提取结果
    pub fn results(&self, domain: &Domain) -> AmResult<Results> {
        Results::extract(domain, &self.outputs(domain)?, self.config.output.all_layers)
    }
}
