// crates/am_grid/src/domain.rs

//! 模拟域
//!
//! `Domain` 持有全部单元（Arena + 每层一棵 R-tree）、遍历序列、
//! 当前模拟时间与步长。遍历序列只决定迭代顺序，与物理正确性无关。
//!
//! 邻接关系的构建完全由几何决定：
//! - 侧面：同层单元共享一条边且重叠长度为正，交界面积 = 重叠长度 × 层厚
//! - 上下：相邻层单元水平投影重叠，交界面积 = 重叠面积
//!
//! 每个面上的邻居按 (min_y, min_x) 排序，保证相同输入得到相同的遍历与求和顺序。

use crate::cell::{Axis, Cell, CellId, Face, Neighbor};
use crate::species::SpeciesSet;
use am_foundation::arena::{Arena, CellTag};
use am_foundation::{AmError, AmResult};
use am_geo::{BoundingBox, BoxIndex, Point2D};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

/// 几何比较的相对容差
const GEOM_REL_TOL: f64 = 1.0e-9;

#[inline]
fn near(a: f64, b: f64) -> bool {
    (a - b).abs() <= GEOM_REL_TOL * a.abs().max(b.abs()).max(1.0)
}

#[inline]
fn close_rel(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1.0e-8 * a.abs().max(b.abs()).max(f64::MIN_POSITIVE)
}

/// 运行时可调整的加密判据（配置本身保持不变）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCriteria {
    /// 动态加密阈值
    pub pop_conc_threshold: f64,
}

/// 网格变异记录
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MutationClock {
    /// 变异事件次数（含零拆分）
    pub events: u64,
    /// 累计拆分单元数
    pub splits: u64,
    /// 最近一次发生拆分的模拟时间 [s]
    pub last_split_time: f64,
}

/// 模拟域
#[derive(Debug, Clone)]
pub struct Domain {
    cells: Arena<Cell, CellTag>,
    sequence: Vec<CellId>,
    layers: Vec<BoxIndex<CellId>>,
    species: Arc<SpeciesSet>,
    pop_columns: Vec<String>,
    mortality_columns: Vec<String>,
    /// 当前模拟时间 [s]
    pub time: f64,
    /// 当前时间步长 [s]
    pub dt: f64,
    /// 加密判据
    pub criteria: GridCriteria,
    /// 变异记录
    pub mutation_clock: MutationClock,
}

impl Domain {
    /// 创建空域
    pub fn new(
        nlayers: usize,
        species: Arc<SpeciesSet>,
        pop_columns: Vec<String>,
        mortality_columns: Vec<String>,
        criteria: GridCriteria,
    ) -> Self {
        Self {
            cells: Arena::new(),
            sequence: Vec::new(),
            layers: (0..nlayers).map(|_| BoxIndex::new()).collect(),
            species,
            pop_columns,
            mortality_columns,
            time: 0.0,
            dt: 0.0,
            criteria,
            mutation_clock: MutationClock::default(),
        }
    }

    // ========================================================================
    // 基本查询
    // ========================================================================

    /// 层数
    pub fn nlayers(&self) -> usize {
        self.layers.len()
    }

    /// 单元数
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// 是否没有单元
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 物种表
    pub fn species(&self) -> &SpeciesSet {
        &self.species
    }

    /// 物种表（共享）
    pub fn species_arc(&self) -> Arc<SpeciesSet> {
        Arc::clone(&self.species)
    }

    /// 人口列名
    pub fn pop_columns(&self) -> &[String] {
        &self.pop_columns
    }

    /// 死亡率列名
    pub fn mortality_columns(&self) -> &[String] {
        &self.mortality_columns
    }

    /// 单元
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id)
    }

    /// 可变单元
    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id)
    }

    /// 单元，句柄失效时报错
    pub fn get(&self, id: CellId) -> AmResult<&Cell> {
        self.cells
            .get(id)
            .ok_or_else(|| AmError::invalid_mesh(format!("悬垂的单元句柄 {id:?}")))
    }

    /// 遍历序列
    pub fn ids(&self) -> &[CellId] {
        &self.sequence
    }

    /// 按遍历序列迭代
    pub fn iter(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.sequence.iter().map(move |&id| (id, &self.cells[id]))
    }

    /// 按遍历序列逐个可变访问
    pub fn for_each_cell_mut<F>(&mut self, mut f: F) -> AmResult<()>
    where
        F: FnMut(CellId, &mut Cell) -> AmResult<()>,
    {
        let Self {
            cells, sequence, ..
        } = self;
        for &id in sequence.iter() {
            let cell = cells
                .get_mut(id)
                .ok_or_else(|| AmError::invalid_mesh(format!("悬垂的单元句柄 {id:?}")))?;
            f(id, cell)?;
        }
        Ok(())
    }

    /// Arena 槽位数，可用于按槽位索引的旁路表
    pub fn slot_count(&self) -> usize {
        self.cells.slot_count()
    }

    /// 某层的单元（遍历顺序）
    pub fn cells_in_layer(&self, layer: usize) -> Vec<CellId> {
        self.iter()
            .filter(|(_, c)| c.layer == layer)
            .map(|(id, _)| id)
            .collect()
    }

    /// 每层单元数
    pub fn layer_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.nlayers()];
        for (_, cell) in self.iter() {
            counts[cell.layer] += 1;
        }
        counts
    }

    /// 某个面上的邻居
    pub fn neighbors(&self, id: CellId, face: Face) -> AmResult<&[Neighbor]> {
        Ok(self.get(id)?.neighbors.on(face))
    }

    /// 两个单元的交界面积；不相邻时返回 `None`
    pub fn interface_area(&self, a: CellId, b: CellId) -> Option<f64> {
        self.cells
            .get(a)?
            .neighbors
            .iter()
            .find(|(_, n)| n.id == b)
            .map(|(_, n)| n.area)
    }

    /// 某层包含给定点的单元（半开区间；域的上/右边界上的点归属边界单元）
    pub fn cell_containing(&self, layer: usize, point: Point2D) -> Option<CellId> {
        let point_box = BoundingBox::new(point.x, point.y, point.x, point.y);
        let hits = self.layers.get(layer)?.query_intersecting(&point_box);
        hits.iter()
            .find(|(b, _)| b.contains_point_half_open(&point))
            .or_else(|| hits.iter().find(|(b, _)| b.contains_point(&point)))
            .map(|(_, &id)| id)
    }

    /// 地面层单元的外包范围；空域返回 `None`
    pub fn extent(&self) -> Option<BoundingBox> {
        self.iter()
            .filter(|(_, c)| c.layer == 0)
            .map(|(_, c)| c.bounds)
            .reduce(|acc, b| acc.merge(&b))
    }

    /// 与范围相交的同层单元
    pub fn query_layer(&self, layer: usize, bounds: &BoundingBox) -> Vec<CellId> {
        self.layers
            .get(layer)
            .map(|idx| idx.query_intersecting(bounds).into_iter().map(|(_, &id)| id).collect())
            .unwrap_or_default()
    }

    // ========================================================================
    // 汇总量（顺序求和，结果与遍历序列绑定）
    // ========================================================================

    /// 各物种总质量 [μg]
    pub fn total_mass(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.species.len()];
        for (_, cell) in self.iter() {
            let v = cell.volume();
            for (t, c) in total.iter_mut().zip(&cell.cf) {
                *t += c * v;
            }
        }
        total
    }

    /// 地面层某人口列总人口
    pub fn total_population(&self, column: usize) -> f64 {
        self.iter()
            .filter(|(_, c)| c.layer == 0)
            .map(|(_, c)| c.population.get(column).copied().unwrap_or(0.0))
            .sum()
    }

    // ========================================================================
    // 构建与变更
    // ========================================================================

    /// 追加单元（不建立邻接关系）
    pub fn push_cell(&mut self, cell: Cell) -> AmResult<CellId> {
        AmError::check_index("layer", cell.layer, self.nlayers())?;
        let bounds = cell.bounds;
        let layer = cell.layer;
        let id = self.cells.insert(cell);
        self.layers[layer].insert(bounds, id);
        self.sequence.push(id);
        Ok(id)
    }

    /// 为全部单元重建邻接关系
    pub fn link_all(&mut self) -> AmResult<()> {
        let found: Vec<(CellId, Vec<(Face, Vec<Neighbor>)>)> = self
            .sequence
            .iter()
            .map(|&id| self.find_neighbors(id).map(|n| (id, n)))
            .collect::<AmResult<_>>()?;
        for (id, lists) in found {
            let cell = &mut self.cells[id];
            for (face, list) in lists {
                cell.neighbors.set(face, list);
            }
        }
        Ok(())
    }

    /// 用子单元替换父单元：子单元插入父单元在序列中的位置，
    /// 并在两侧重建全部邻接关系。返回子单元句柄。
    pub fn replace_with_children(&mut self, parent: CellId, children: Vec<Cell>) -> AmResult<Vec<CellId>> {
        let pos = self
            .sequence
            .iter()
            .position(|&id| id == parent)
            .ok_or_else(|| AmError::invalid_mesh(format!("单元 {parent:?} 不在遍历序列中")))?;
        let parent_cell = self
            .cells
            .remove(parent)
            .ok_or_else(|| AmError::invalid_mesh(format!("悬垂的单元句柄 {parent:?}")))?;
        let layer = parent_cell.layer;
        if !self.layers[layer].remove(parent_cell.bounds, &parent) {
            return Err(AmError::invalid_mesh(format!("单元 {parent:?} 不在空间索引中")));
        }
        for old in parent_cell.neighbors.ids() {
            if let Some(n) = self.cells.get_mut(old) {
                n.neighbors.remove(parent);
            }
        }

        let mut new_ids = Vec::with_capacity(children.len());
        for child in children {
            if child.layer != layer {
                return Err(AmError::invalid_mesh("子单元必须与父单元同层"));
            }
            let bounds = child.bounds;
            let id = self.cells.insert(child);
            self.layers[layer].insert(bounds, id);
            new_ids.push(id);
        }
        let tail = self.sequence.split_off(pos + 1);
        self.sequence.pop();
        self.sequence.extend_from_slice(&new_ids);
        self.sequence.extend(tail);

        for &id in &new_ids {
            self.link_cell(id)?;
        }
        Ok(new_ids)
    }

    /// 计算单元的邻居，并把反向关系写入邻居
    fn link_cell(&mut self, id: CellId) -> AmResult<()> {
        let lists = self.find_neighbors(id)?;
        for (face, list) in &lists {
            for n in list {
                self.add_sorted(n.id, face.opposite(), Neighbor { id, area: n.area })?;
            }
        }
        let cell = &mut self.cells[id];
        for (face, list) in lists {
            cell.neighbors.set(face, list);
        }
        Ok(())
    }

    /// 向单元某个面加入邻居并保持排序
    fn add_sorted(&mut self, target: CellId, face: Face, neighbor: Neighbor) -> AmResult<()> {
        let current = self.get(target)?.neighbors.on(face);
        if current.iter().any(|n| n.id == neighbor.id) {
            return Ok(());
        }
        let mut list: Vec<Neighbor> = current.to_vec();
        list.push(neighbor);
        self.sort_neighbors(&mut list)?;
        self.cells[target].neighbors.set(face, list);
        Ok(())
    }

    fn sort_neighbors(&self, list: &mut [Neighbor]) -> AmResult<()> {
        let mut keyed: Vec<((f64, f64), Neighbor)> = list
            .iter()
            .map(|n| self.get(n.id).map(|c| ((c.bounds.min_y, c.bounds.min_x), *n)))
            .collect::<AmResult<_>>()?;
        keyed.sort_by(|a, b| a.0 .0.total_cmp(&b.0 .0).then(a.0 .1.total_cmp(&b.0 .1)));
        for (slot, (_, n)) in list.iter_mut().zip(keyed) {
            *slot = n;
        }
        Ok(())
    }

    /// 由几何查找单元各面的邻居
    fn find_neighbors(&self, id: CellId) -> AmResult<Vec<(Face, Vec<Neighbor>)>> {
        let cell = self.get(id)?;
        let b = cell.bounds;
        let layer = cell.layer;
        let mut result: Vec<(Face, Vec<(BoundingBox, Neighbor)>)> =
            Face::ALL.iter().map(|&f| (f, Vec::new())).collect();

        for (ob, &other) in self.layers[layer].query_intersecting(&b) {
            if other == id {
                continue;
            }
            let dz = cell.dz.min(self.get(other)?.dz);
            let y_overlap = b.max_y.min(ob.max_y) - b.min_y.max(ob.min_y);
            let x_overlap = b.max_x.min(ob.max_x) - b.min_x.max(ob.min_x);
            let face = if near(ob.max_x, b.min_x) && y_overlap > GEOM_REL_TOL * b.height() {
                Some((Face::West, y_overlap))
            } else if near(ob.min_x, b.max_x) && y_overlap > GEOM_REL_TOL * b.height() {
                Some((Face::East, y_overlap))
            } else if near(ob.max_y, b.min_y) && x_overlap > GEOM_REL_TOL * b.width() {
                Some((Face::South, x_overlap))
            } else if near(ob.min_y, b.max_y) && x_overlap > GEOM_REL_TOL * b.width() {
                Some((Face::North, x_overlap))
            } else {
                None
            };
            if let Some((face, length)) = face {
                result[face as usize].1.push((*ob, Neighbor { id: other, area: length * dz }));
            }
        }

        let vertical = [
            (Face::Below, layer.checked_sub(1)),
            (Face::Above, Some(layer + 1).filter(|&l| l < self.nlayers())),
        ];
        for (face, other_layer) in vertical {
            let Some(other_layer) = other_layer else { continue };
            for (ob, &other) in self.layers[other_layer].query_intersecting(&b) {
                let area = b.overlap_area(ob);
                if area > GEOM_REL_TOL * b.area() {
                    result[face as usize].1.push((*ob, Neighbor { id: other, area }));
                }
            }
        }

        Ok(result
            .into_iter()
            .map(|(face, mut list)| {
                list.sort_by(|a, b| a.0.min_y.total_cmp(&b.0.min_y).then(a.0.min_x.total_cmp(&b.0.min_x)));
                (face, list.into_iter().map(|(_, n)| n).collect())
            })
            .collect())
    }

    // ========================================================================
    // 拓扑校验
    // ========================================================================

    /// 校验网格不变量：
    /// - 序列与 Arena、空间索引一致
    /// - 邻接关系双向、面积一致、无悬垂、无重复
    /// - 每个面的交界面积之和等于整面面积（边界面为零）
    /// - 同层单元互不重叠，且覆盖该层外包矩形
    pub fn validate_topology(&self) -> AmResult<()> {
        if self.sequence.len() != self.cells.len() {
            return Err(AmError::invalid_mesh(format!(
                "遍历序列长度 {} 与单元数 {} 不一致",
                self.sequence.len(),
                self.cells.len()
            )));
        }
        let unique: HashSet<CellId> = self.sequence.iter().copied().collect();
        if unique.len() != self.sequence.len() {
            return Err(AmError::invalid_mesh("遍历序列中存在重复单元"));
        }
        let counts = self.layer_counts();
        for (layer, index) in self.layers.iter().enumerate() {
            if index.len() != counts[layer] {
                return Err(AmError::invalid_mesh(format!("第{layer}层空间索引与单元数不一致")));
            }
        }

        let cells: Vec<(CellId, &Cell)> = self.iter().collect();
        cells.par_iter().try_for_each(|&(id, cell)| self.validate_cell(id, cell))?;

        for layer in 0..self.nlayers() {
            let layer_cells: Vec<&Cell> = cells.iter().filter(|(_, c)| c.layer == layer).map(|(_, c)| *c).collect();
            let Some(first) = layer_cells.first() else { continue };
            let extent = layer_cells.iter().fold(first.bounds, |acc, c| acc.merge(&c.bounds));
            let covered: f64 = layer_cells.iter().map(|c| c.area()).sum();
            if !close_rel(covered, extent.area()) {
                return Err(AmError::invalid_mesh(format!(
                    "第{layer}层单元面积之和 {covered} 与外包面积 {} 不一致",
                    extent.area()
                )));
            }
        }
        Ok(())
    }

    fn validate_cell(&self, id: CellId, cell: &Cell) -> AmResult<()> {
        for (ob, &other) in self.layers[cell.layer].query_intersecting(&cell.bounds) {
            if other != id && cell.bounds.overlap_area(ob) > GEOM_REL_TOL * cell.area() {
                return Err(AmError::invalid_mesh(format!("单元 {id:?} 与 {other:?} 重叠")));
            }
        }
        for face in Face::ALL {
            let list = cell.neighbors.on(face);
            let mut seen = HashSet::new();
            let mut sum = 0.0;
            for n in list {
                if !seen.insert(n.id) {
                    return Err(AmError::invalid_mesh(format!("单元 {id:?} 的 {face:?} 面邻居重复")));
                }
                if !(n.area > 0.0) {
                    return Err(AmError::invalid_mesh(format!("单元 {id:?} 交界面积非正")));
                }
                let other = self
                    .cells
                    .get(n.id)
                    .ok_or_else(|| AmError::invalid_mesh(format!("单元 {id:?} 持有悬垂邻居 {:?}", n.id)))?;
                let back = other
                    .neighbors
                    .on(face.opposite())
                    .iter()
                    .find(|m| m.id == id)
                    .ok_or_else(|| AmError::invalid_mesh(format!("{id:?} → {:?} 关系不对称", n.id)))?;
                if !close_rel(back.area, n.area) {
                    return Err(AmError::invalid_mesh(format!("{id:?} ↔ {:?} 交界面积不一致", n.id)));
                }
                sum += n.area;
            }
            let boundary = match face {
                Face::Below => cell.layer == 0,
                Face::Above => cell.layer + 1 == self.nlayers(),
                _ => list.is_empty(),
            };
            let expected = if boundary { 0.0 } else { cell.face_area(face) };
            if face.axis() == Axis::Z && boundary && !list.is_empty() {
                return Err(AmError::invalid_mesh(format!("单元 {id:?} 在顶/底边界外有邻居")));
            }
            if !(close_rel(sum, expected) || (expected == 0.0 && sum == 0.0)) {
                return Err(AmError::invalid_mesh(format!(
                    "单元 {id:?} {face:?} 面交界面积之和 {sum} ≠ {expected}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CellFactory, GridBuilder};
    use crate::emissions::Emissions;
    use crate::synthetic::SyntheticScenario;

    fn regular() -> Domain {
        let scenario = SyntheticScenario::small();
        let inputs = scenario.inputs().unwrap();
        let emissions = Emissions::new();
        let factory = CellFactory::new(&scenario.config, &inputs, &emissions, scenario.species().unwrap()).unwrap();
        GridBuilder::regular(&factory).unwrap()
    }

    #[test]
    fn test_cell_containing_is_half_open() {
        let domain = regular();
        let id = domain.cell_containing(0, Point2D::new(16_000.0, 5_000.0)).unwrap();
        assert_eq!(domain.cell(id).unwrap().index, vec![[1, 0]]);

        // 域的东北角仍落在边界单元内
        let corner = domain.cell_containing(0, Point2D::new(64_000.0, 64_000.0)).unwrap();
        assert_eq!(domain.cell(corner).unwrap().index, vec![[3, 3]]);
        assert!(domain.cell_containing(0, Point2D::new(-1.0, 0.0)).is_none());
    }

    #[test]
    fn test_layers_and_mass() {
        let mut domain = regular();
        assert_eq!(domain.cells_in_layer(1).len(), 16);
        assert!(domain.cells_in_layer(7).is_empty());

        let id = domain.cells_in_layer(0)[5];
        let volume = domain.cell(id).unwrap().volume();
        domain.cell_mut(id).unwrap().cf[0] = 2.0;
        let mass = domain.total_mass();
        assert!((mass[0] - 2.0 * volume).abs() < 1e-9 * volume);
        assert!(mass[1..].iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_asymmetric_relation_is_rejected() {
        let mut domain = regular();
        let a = domain.ids()[0];
        let east = domain.neighbors(a, Face::East).unwrap()[0].id;
        domain.cell_mut(east).unwrap().neighbors.remove(a);
        assert!(domain.interface_area(east, a).is_none());
        assert!(domain.interface_area(a, east).is_some());
        assert!(matches!(domain.validate_topology(), Err(AmError::InvalidMesh { .. })));
    }

    #[test]
    fn test_duplicate_relation_is_rejected() {
        let mut domain = regular();
        let a = domain.ids()[0];
        let east = domain.neighbors(a, Face::East).unwrap()[0];
        let cell = domain.cell_mut(a).unwrap();
        let doubled = [east, east];
        cell.neighbors.set(Face::East, doubled);
        assert!(domain.validate_topology().is_err());
    }
}
