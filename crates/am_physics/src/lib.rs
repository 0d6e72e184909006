// crates/am_physics/src/lib.rs

//! AirMesh 物理模块
//!
//! 在 [`am_grid::Domain`] 上推进污染物浓度：排放、平流、混合、沉降与化学，
//! 以流水线阶段的形式组织。
//!
//! # 模块结构
//!
//! - [`pipeline`]: 阶段接口、周期门控、流水线
//! - [`kernels`]: 计算组与各计算核
//! - [`mechanism`]: 化学机制接口与 `LinearChemistry`
//! - [`stages`]: 网格构建、加密、排放分摊、时间步长阶段
//! - [`convergence`]: 固定迭代 / 稳态判据
//! - [`expr`]: 输出表达式
//! - [`results`]: 输出变量与结果
//! - [`simulation`]: 标准流水线装配
//!
//! # 示例
//!
//! ```no_run
//! use am_config::AirMeshConfig;
//! use am_grid::{Emissions, StaticInputs};
//! use am_physics::prelude::*;
//! use std::sync::Arc;
//!
//! let config = AirMeshConfig::from_file("airmesh.json").unwrap();
//! let inputs = Arc::new(StaticInputs::load_from_file(&config.ctm_data).unwrap());
//! let sim = Simulation::new(config, inputs, Arc::new(Emissions::new()), Arc::new(LinearChemistry::default())).unwrap();
//! let (domain, summary) = sim.run().unwrap();
//! sim.results(&domain).unwrap().save_to_file("results.json").unwrap();
//! println!("{} 次迭代", summary.iterations);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod convergence;
pub mod expr;
pub mod kernels;
pub mod mechanism;
pub mod pipeline;
pub mod results;
pub mod simulation;
pub mod stages;

pub use convergence::{ConvergenceCheck, ConvergenceMode};
pub use kernels::{Calculations, Kernel, Snapshot};
pub use mechanism::{LinearChemistry, Mechanism, TOTAL_PM25};
pub use pipeline::{Periodic, Pipeline, RunSummary, Stage, StageSignal, Termination};
pub use results::{OutputSet, Results};
pub use simulation::Simulation;

/// 预导入模块
pub mod prelude {
    pub use crate::mechanism::{LinearChemistry, Mechanism};
    pub use crate::pipeline::{Pipeline, RunSummary, Stage, StageSignal, Termination};
    pub use crate::results::Results;
    pub use crate::simulation::Simulation;
}
