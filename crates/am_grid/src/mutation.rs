// crates/am_grid/src/mutation.rs

//! 网格变异（加密）
//!
//! 两种判据：
//! - `PopulationMutator`：静态判据，人口与人口密度同时超过阈值
//! - `PopConcMutator`：动态判据，相邻单元间浓度差 × 体积和 × 人口差，
//!   以域总质量 × 地面总人口归一化
//!
//! 拆分时子单元从父单元继承浓度，重新分摊人口（并缩放到父单元总量）、
//! 死亡率、气象与排放，随后检查质量与人口守恒，再替换父单元并重建邻接。
//! 不做粗化。

use crate::builder::CellFactory;
use crate::cell::{Cell, CellId, Face};
use crate::domain::Domain;
use am_config::VarGridConfig;
use am_foundation::{AmError, AmResult};
use am_geo::BoundingBox;

/// 守恒检查的相对容差
const CONSERVATION_REL_TOL: f64 = 1.0e-8;
/// 守恒检查的绝对下限
const CONSERVATION_ABS_FLOOR: f64 = 1.0e-12;

// ============================================================================
// 判据
// ============================================================================

/// 加密判据
pub trait Mutator: Send + Sync {
    /// 判据名称
    fn name(&self) -> &'static str;

    /// 按遍历顺序返回满足判据的单元
    fn eligible(&self, domain: &Domain) -> AmResult<Vec<CellId>>;
}

/// 静态人口判据
#[derive(Debug, Clone)]
pub struct PopulationMutator {
    pop_column: usize,
    pop_threshold: f64,
    density_threshold: f64,
    hi_res_layers: usize,
}

impl PopulationMutator {
    /// 从网格配置创建
    pub fn from_config(config: &VarGridConfig) -> AmResult<Self> {
        Ok(Self {
            pop_column: config.pop_grid_index()?,
            pop_threshold: config.pop_threshold,
            density_threshold: config.pop_density_threshold,
            hi_res_layers: config.hi_res_layers,
        })
    }
}

impl Mutator for PopulationMutator {
    fn name(&self) -> &'static str {
        "PopulationMutator"
    }

    fn eligible(&self, domain: &Domain) -> AmResult<Vec<CellId>> {
        Ok(domain
            .iter()
            .filter(|(_, c)| c.layer < self.hi_res_layers)
            .filter(|(_, c)| {
                let pop = c.population.get(self.pop_column).copied().unwrap_or(0.0);
                pop > self.pop_threshold && pop / c.area() > self.density_threshold
            })
            .map(|(id, _)| id)
            .collect())
    }
}

/// 动态人口-浓度判据，阈值取自 `Domain::criteria`
#[derive(Debug, Clone)]
pub struct PopConcMutator {
    pop_column: usize,
    hi_res_layers: usize,
}

impl PopConcMutator {
    /// 从网格配置创建
    pub fn from_config(config: &VarGridConfig) -> AmResult<Self> {
        Ok(Self {
            pop_column: config.pop_grid_index()?,
            hi_res_layers: config.hi_res_layers,
        })
    }

    /// 单元的判据值（未归一化）
    fn raw_metric(&self, domain: &Domain, cell: &Cell) -> AmResult<f64> {
        let pop = |c: &Cell| c.population.get(self.pop_column).copied().unwrap_or(0.0);
        let mut sum = 0.0;
        for face in Face::LATERAL {
            for n in cell.neighbors.on(face) {
                let other = domain.get(n.id)?;
                let dc: f64 = cell
                    .cf
                    .iter()
                    .zip(&other.cf)
                    .map(|(a, b)| (a - b).abs())
                    .sum();
                sum += dc * (cell.volume() + other.volume()) * (pop(cell) - pop(other)).abs();
            }
        }
        Ok(sum)
    }
}

impl Mutator for PopConcMutator {
    fn name(&self) -> &'static str {
        "PopConcMutator"
    }

    fn eligible(&self, domain: &Domain) -> AmResult<Vec<CellId>> {
        let total_mass: f64 = domain
            .iter()
            .map(|(_, c)| c.cf.iter().map(|v| v.abs()).sum::<f64>() * c.volume())
            .sum();
        let total_pop = domain.total_population(self.pop_column);
        let norm = AmError::check_finite("PopConcMutator 归一化因子", total_mass * total_pop)?;
        if norm == 0.0 {
            return Ok(Vec::new());
        }

        let threshold = domain.criteria.pop_conc_threshold;
        let mut out = Vec::new();
        for (id, cell) in domain.iter() {
            if cell.layer >= self.hi_res_layers {
                continue;
            }
            let metric = self.raw_metric(domain, cell)? / norm;
            AmError::check_finite("PopConcMutator 判据", metric)?;
            if metric > threshold {
                out.push(id);
            }
        }
        Ok(out)
    }
}

// ============================================================================
// 变异引擎
// ============================================================================

/// 一次变异的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationReport {
    /// 被拆分的单元数
    pub splits: usize,
    /// 变异前单元数
    pub cells_before: usize,
    /// 变异后单元数
    pub cells_after: usize,
}

/// 变异引擎
#[derive(Debug, Clone, Copy)]
pub struct MutationEngine<'a> {
    factory: &'a CellFactory<'a>,
}

impl<'a> MutationEngine<'a> {
    /// 创建引擎
    pub fn new(factory: &'a CellFactory<'a>) -> Self {
        Self { factory }
    }

    /// 是否还允许拆分
    fn splittable(&self, cell: &Cell) -> bool {
        let config = self.factory.config();
        cell.layer < config.hi_res_layers && cell.depth() + 1 < config.nest_levels()
    }

    /// 按判据拆分一轮
    pub fn mutate(&self, domain: &mut Domain, mutator: &dyn Mutator) -> AmResult<MutationReport> {
        let cells_before = domain.len();
        let targets: Vec<CellId> = mutator
            .eligible(domain)?
            .into_iter()
            .filter(|&id| domain.cell(id).map_or(false, |c| self.splittable(c)))
            .collect();

        for &parent in &targets {
            let children = self.split(domain.get(parent)?)?;
            domain.replace_with_children(parent, children)?;
        }

        let report = MutationReport {
            splits: targets.len(),
            cells_before,
            cells_after: domain.len(),
        };
        domain.mutation_clock.events += 1;
        if report.splits > 0 {
            domain.mutation_clock.splits += report.splits as u64;
            domain.mutation_clock.last_split_time = domain.time;
            log::info!(
                "{}: t={:.0}s 拆分 {} 个单元, {} → {}",
                mutator.name(),
                domain.time,
                report.splits,
                report.cells_before,
                report.cells_after
            );
        } else {
            log::debug!("{}: t={:.0}s 无单元需要拆分", mutator.name(), domain.time);
        }
        Ok(report)
    }

    /// 反复应用静态判据直到没有单元需要拆分，返回总拆分数
    pub fn refine_static(&self, domain: &mut Domain) -> AmResult<usize> {
        let mutator = PopulationMutator::from_config(self.factory.config())?;
        let mut total = 0;
        loop {
            let report = self.mutate(domain, &mutator)?;
            if report.splits == 0 {
                break;
            }
            total += report.splits;
        }
        Ok(total)
    }

    /// 生成父单元的子单元并检查守恒
    pub fn split(&self, parent: &Cell) -> AmResult<Vec<Cell>> {
        let config = self.factory.config();
        let depth = parent.depth() + 1;
        let (nx, ny) = match (config.x_nests.get(depth), config.y_nests.get(depth)) {
            (Some(&nx), Some(&ny)) if nx > 0 && ny > 0 => (nx, ny),
            _ => return Err(AmError::invalid_mesh(format!("第{depth}级嵌套不存在"))),
        };
        let pb = parent.bounds;
        let edge = |lo: f64, hi: f64, k: usize, n: usize| -> f64 {
            match k {
                0 => lo,
                k if k == n => hi,
                k => lo + (hi - lo) * k as f64 / n as f64,
            }
        };

        let mut children = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let bounds = BoundingBox::new(
                    edge(pb.min_x, pb.max_x, i, nx),
                    edge(pb.min_y, pb.max_y, j, ny),
                    edge(pb.min_x, pb.max_x, i + 1, nx),
                    edge(pb.min_y, pb.max_y, j + 1, ny),
                );
                let mut index = parent.index.clone();
                index.push([i, j]);
                children.push(self.seed_child(parent, index, bounds)?);
            }
        }
        self.rescale_population(parent, &mut children);
        check_conservation(parent, &children)?;
        Ok(children)
    }

    fn seed_child(&self, parent: &Cell, index: Vec<[usize; 2]>, bounds: BoundingBox) -> AmResult<Cell> {
        let mut child = Cell::new(parent.layer, index, bounds, parent.cf.len());
        child.z_bottom = parent.z_bottom;
        child.dz = parent.dz;
        child.ci = parent.ci.clone();
        child.cf = parent.cf.clone();
        child.met = self.factory.resample_met(&bounds, parent.layer, parent.met)?;
        child.population = if self.factory.has_population() {
            self.factory.population_for(&bounds)
        } else {
            vec![0.0; parent.population.len()]
        };
        child.mortality = if self.factory.has_mortality() {
            self.factory.mortality_for(&bounds)?
        } else {
            parent.mortality.clone()
        };
        child.emis_flux = self.factory.emission_flux(&bounds, parent.layer, child.volume())?;
        Ok(child)
    }

    /// 子单元人口缩放到父单元总量；普查总和为零时按面积分配
    fn rescale_population(&self, parent: &Cell, children: &mut [Cell]) {
        let parent_area = parent.area();
        for (k, &target) in parent.population.iter().enumerate() {
            let sum: f64 = children.iter().map(|c| c.population.get(k).copied().unwrap_or(0.0)).sum();
            for child in children.iter_mut() {
                if child.population.len() <= k {
                    child.population.resize(k + 1, 0.0);
                }
                child.population[k] = if sum > 0.0 {
                    child.population[k] * target / sum
                } else {
                    target * child.area() / parent_area
                };
            }
        }
    }
}

fn conserved(before: f64, after: f64) -> bool {
    (before - after).abs() <= CONSERVATION_REL_TOL * before.abs().max(after.abs()) + CONSERVATION_ABS_FLOOR
}

/// 质量与人口守恒检查
fn check_conservation(parent: &Cell, children: &[Cell]) -> AmResult<()> {
    for s in 0..parent.cf.len() {
        let before = parent.mass(s);
        let after: f64 = children.iter().map(|c| c.mass(s)).sum();
        if !conserved(before, after) {
            return Err(AmError::conservation(format!("物种 #{s} 质量"), before, after));
        }
    }
    for (k, &before) in parent.population.iter().enumerate() {
        let after: f64 = children.iter().map(|c| c.population[k]).sum();
        if !conserved(before, after) {
            return Err(AmError::conservation(format!("人口列 #{k}"), before, after));
        }
    }
    Ok(())
}
