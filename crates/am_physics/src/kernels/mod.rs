// crates/am_physics/src/kernels/mod.rs

//! 计算核
//!
//! 一个 [`Calculations`] 阶段按顺序持有若干计算核。进入阶段时先把全部单元的
//! `cf` 复制到 `ci` 并拍下邻居可见状态的快照；随后按遍历顺序逐个单元、
//! 按列表顺序逐个计算核更新该单元的 `cf`。后一个计算核看到前一个的部分更新，
//! 读取邻居时只读快照，因此结果与遍历顺序无关。

mod removal;
mod transport;

pub use removal::{AddEmissionsFlux, Chemistry, DryDeposition, WetDeposition};
pub use transport::{MeanderMixing, Mixing, UpwindAdvection};

use crate::pipeline::{Stage, StageSignal};
use am_config::AirMeshConfig;
use am_foundation::{AmError, AmResult};
use am_grid::{Cell, CellId, Domain, Meteorology};

/// 单元计算核
pub trait Kernel: Send + Sync {
    /// 名称
    fn name(&self) -> &'static str;

    /// 更新单元 `cf`
    fn apply(&self, cell: &mut Cell, snapshot: &Snapshot, dt: f64) -> AmResult<()>;
}

// ============================================================================
// 快照
// ============================================================================

/// 邻居可见状态
#[derive(Debug, Clone)]
pub struct NeighborState {
    /// 迭代开始时的浓度
    pub ci: Vec<f64>,
    /// 气象
    pub met: Meteorology,
    /// 中心坐标 (x, y, z)
    pub center: [f64; 3],
}

/// 按 Arena 槽位索引的邻居状态表
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    slots: Vec<Option<(u32, NeighborState)>>,
}

impl Snapshot {
    /// 拍摄快照
    pub fn capture(domain: &Domain) -> Self {
        let mut slots = vec![None; domain.slot_count()];
        for (id, cell) in domain.iter() {
            let c = cell.center();
            slots[id.as_usize()] = Some((
                id.generation(),
                NeighborState {
                    ci: cell.ci.clone(),
                    met: cell.met,
                    center: [c.x, c.y, cell.z_center()],
                },
            ));
        }
        Self { slots }
    }

    /// 邻居状态；句柄失效时报错
    pub fn get(&self, id: CellId) -> AmResult<&NeighborState> {
        match self.slots.get(id.as_usize()) {
            Some(Some((generation, state))) if *generation == id.generation() => Ok(state),
            _ => Err(AmError::invalid_mesh(format!("快照中不存在单元 {id:?}"))),
        }
    }
}

// ============================================================================
// 计算组
// ============================================================================

/// 计算组阶段
#[derive(Default)]
pub struct Calculations {
    kernels: Vec<Box<dyn Kernel>>,
}

impl Calculations {
    /// 空计算组
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加计算核
    pub fn with(mut self, kernel: impl Kernel + 'static) -> Self {
        self.kernels.push(Box::new(kernel));
        self
    }

    /// 计算核名称
    pub fn kernel_names(&self) -> Vec<&'static str> {
        self.kernels.iter().map(|k| k.name()).collect()
    }
}

impl Stage for Calculations {
    fn name(&self) -> &str {
        "Calculations"
    }

    fn apply(&mut self, domain: &mut Domain, _config: &AirMeshConfig) -> AmResult<StageSignal> {
        let dt = domain.dt;
        domain.for_each_cell_mut(|_, cell| {
            cell.ci.copy_from_slice(&cell.cf);
            Ok(())
        })?;
        let snapshot = Snapshot::capture(domain);
        let kernels = &self.kernels;
        domain.for_each_cell_mut(|_, cell| {
            for kernel in kernels {
                kernel.apply(cell, &snapshot, dt)?;
            }
            Ok(())
        })?;
        Ok(StageSignal::Continue)
    }
}
