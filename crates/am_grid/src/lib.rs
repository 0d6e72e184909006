// crates/am_grid/src/lib.rs

//! AirMesh 网格模块
//!
//! 变分辨率嵌套网格：每层是若干轴对齐矩形单元的无缝划分，
//! 人口密集或浓度梯度大的区域逐级细分。
//!
//! # 核心类型
//!
//! - [`Domain`]: 单元 Arena、每层空间索引、遍历序列与模拟时钟
//! - [`Cell`]: 单元状态（浓度、气象、人口、死亡率、邻接）
//! - [`CellFactory`] / [`GridBuilder`]: 单元初始化与规则网格构建
//! - [`MutationEngine`]: 静态/动态加密
//! - [`StaticInputs`]: CTM、人口、死亡率的共享输入包
//!
//! # 模块结构
//!
//! - [`cell`]: 单元、面、邻接
//! - [`domain`]: 模拟域与拓扑
//! - [`ctm`]: CTM 气象数据与采样
//! - [`census`]: 人口与死亡率分摊
//! - [`emissions`]: 排放记录与分摊
//! - [`builder`]: 单元工厂与规则网格
//! - [`mutation`]: 加密判据与变异引擎
//! - [`timestep`]: CFL 时间步长
//! - [`synthetic`]: 合成场景
//!
//! # 示例
//!
//! ```
//! use am_grid::prelude::*;
//! use am_grid::synthetic::SyntheticScenario;
//!
//! let scenario = SyntheticScenario::small();
//! let inputs = scenario.inputs().unwrap();
//! let emissions = Emissions::new();
//! let factory = CellFactory::new(&scenario.config, &inputs, &emissions, scenario.species().unwrap()).unwrap();
//! let domain = GridBuilder::regular(&factory).unwrap();
//! assert_eq!(domain.layer_counts(), vec![16, 16, 16]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod census;
pub mod cell;
pub mod ctm;
pub mod domain;
pub mod emissions;
pub mod inputs;
pub mod mutation;
pub mod species;
pub mod synthetic;
pub mod timestep;

pub use builder::{CellFactory, GridBuilder};
pub use census::{AttributeRecord, CensusData};
pub use cell::{Axis, Cell, CellId, Face, Meteorology, Neighbor, Neighbors};
pub use ctm::{CtmData, CtmGrid};
pub use domain::{Domain, GridCriteria, MutationClock};
pub use emissions::{EmisRecord, Emissions};
pub use inputs::StaticInputs;
pub use mutation::{MutationEngine, MutationReport, Mutator, PopConcMutator, PopulationMutator};
pub use species::{SpeciesClass, SpeciesSet};
pub use timestep::{cfl_timestep, CflCalculator};

/// 预导入模块
pub mod prelude {
    pub use crate::builder::{CellFactory, GridBuilder};
    pub use crate::cell::{Cell, CellId, Face, Meteorology};
    pub use crate::domain::Domain;
    pub use crate::emissions::{EmisRecord, Emissions};
    pub use crate::inputs::StaticInputs;
    pub use crate::mutation::{MutationEngine, Mutator};
    pub use crate::species::{SpeciesClass, SpeciesSet};
}
