// crates/am_grid/src/cell.rs

//! 网格单元
//!
//! 单元是某一层上的轴对齐矩形柱体。邻接关系按面存放句柄列表，
//! 每条关系带有交界面面积，用于通量计算。

use am_foundation::arena::{CellTag, Idx};
use am_geo::{BoundingBox, Point2D};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// 单元句柄
pub type CellId = Idx<CellTag>;

// ============================================================================
// 面
// ============================================================================

/// 单元的六个面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    /// 西（-x）
    West,
    /// 东（+x）
    East,
    /// 南（-y）
    South,
    /// 北（+y）
    North,
    /// 下（-z）
    Below,
    /// 上（+z）
    Above,
}

/// 坐标轴
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// x
    X,
    /// y
    Y,
    /// z
    Z,
}

impl Face {
    /// 全部面
    pub const ALL: [Face; 6] = [
        Face::West,
        Face::East,
        Face::South,
        Face::North,
        Face::Below,
        Face::Above,
    ];

    /// 侧面
    pub const LATERAL: [Face; 4] = [Face::West, Face::East, Face::South, Face::North];

    /// 对面
    pub fn opposite(self) -> Self {
        match self {
            Face::West => Face::East,
            Face::East => Face::West,
            Face::South => Face::North,
            Face::North => Face::South,
            Face::Below => Face::Above,
            Face::Above => Face::Below,
        }
    }

    /// 法向所在坐标轴
    pub fn axis(self) -> Axis {
        match self {
            Face::West | Face::East => Axis::X,
            Face::South | Face::North => Axis::Y,
            Face::Below | Face::Above => Axis::Z,
        }
    }

    /// 外法向是否指向坐标正方向
    pub fn is_positive(self) -> bool {
        matches!(self, Face::East | Face::North | Face::Above)
    }

    /// 是否为侧面
    pub fn is_lateral(self) -> bool {
        self.axis() != Axis::Z
    }

    fn slot(self) -> usize {
        self as usize
    }
}

// ============================================================================
// 邻接关系
// ============================================================================

/// 一条邻接关系
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 邻居句柄
    pub id: CellId,
    /// 交界面面积 [m²]
    pub area: f64,
}

/// 单元各面的邻居列表
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    lists: [SmallVec<[Neighbor; 2]>; 6],
}

impl Neighbors {
    /// 某个面上的邻居
    pub fn on(&self, face: Face) -> &[Neighbor] {
        &self.lists[face.slot()]
    }

    /// 替换某个面上的邻居列表
    pub fn set(&mut self, face: Face, neighbors: impl IntoIterator<Item = Neighbor>) {
        self.lists[face.slot()] = neighbors.into_iter().collect();
    }

    /// 添加邻居；已存在同一句柄时返回 false
    pub fn add(&mut self, face: Face, neighbor: Neighbor) -> bool {
        let list = &mut self.lists[face.slot()];
        if list.iter().any(|n| n.id == neighbor.id) {
            return false;
        }
        list.push(neighbor);
        true
    }

    /// 从所有面上删除某个句柄，返回删除条数
    pub fn remove(&mut self, id: CellId) -> usize {
        let mut removed = 0;
        for list in &mut self.lists {
            let before = list.len();
            list.retain(|n| n.id != id);
            removed += before - list.len();
        }
        removed
    }

    /// 某个面是否为边界（无邻居）
    pub fn is_boundary(&self, face: Face) -> bool {
        self.lists[face.slot()].is_empty()
    }

    /// 遍历所有 (面, 邻居)
    pub fn iter(&self) -> impl Iterator<Item = (Face, &Neighbor)> {
        Face::ALL
            .iter()
            .flat_map(move |&face| self.lists[face.slot()].iter().map(move |n| (face, n)))
    }

    /// 全部邻居句柄（可能重复出现在不同面上）
    pub fn ids(&self) -> Vec<CellId> {
        self.iter().map(|(_, n)| n.id).collect()
    }

    /// 邻居总数
    pub fn len(&self) -> usize {
        self.lists.iter().map(|l| l.len()).sum()
    }

    /// 是否没有任何邻居
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// 气象场
// ============================================================================

/// 单元上的气象与沉降参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Meteorology {
    /// x 方向风速 [m/s]
    pub u: f64,
    /// y 方向风速 [m/s]
    pub v: f64,
    /// 垂直风速 [m/s]
    pub w: f64,
    /// 水平涡扩散系数 [m²/s]
    pub kxxyy: f64,
    /// 垂直涡扩散系数 [m²/s]
    pub kzz: f64,
    /// 湿沉降速率 [1/s]
    pub wet_dep: f64,
    /// 气相干沉降速度 [m/s]
    pub dry_dep_gas: f64,
    /// 颗粒相干沉降速度 [m/s]
    pub dry_dep_particle: f64,
}

// ============================================================================
// 单元
// ============================================================================

/// 网格单元
#[derive(Debug, Clone)]
pub struct Cell {
    /// 垂直层号，0 为地面层
    pub layer: usize,
    /// 嵌套路径：每一级的 (i, j)
    pub index: Vec<[usize; 2]>,
    /// 水平范围
    pub bounds: BoundingBox,
    /// 层底高度 [m]
    pub z_bottom: f64,
    /// 层厚 [m]
    pub dz: f64,
    /// 气象参数
    pub met: Meteorology,
    /// 本次迭代开始时的浓度 [μg/m³]
    pub ci: Vec<f64>,
    /// 当前浓度 [μg/m³]
    pub cf: Vec<f64>,
    /// 排放通量 [μg/m³/s]
    pub emis_flux: Vec<f64>,
    /// 人口（按普查人口列）
    pub population: Vec<f64>,
    /// 基线死亡率（按死亡率列，每 10 万人每年）
    pub mortality: Vec<f64>,
    /// 邻接关系
    pub neighbors: Neighbors,
}

impl Cell {
    /// 创建空单元，浓度与排放为零
    pub fn new(layer: usize, index: Vec<[usize; 2]>, bounds: BoundingBox, n_species: usize) -> Self {
        Self {
            layer,
            index,
            bounds,
            z_bottom: 0.0,
            dz: 0.0,
            met: Meteorology::default(),
            ci: vec![0.0; n_species],
            cf: vec![0.0; n_species],
            emis_flux: vec![0.0; n_species],
            population: Vec::new(),
            mortality: Vec::new(),
            neighbors: Neighbors::default(),
        }
    }

    /// x 方向尺寸 [m]
    #[inline]
    pub fn dx(&self) -> f64 {
        self.bounds.width()
    }

    /// y 方向尺寸 [m]
    #[inline]
    pub fn dy(&self) -> f64 {
        self.bounds.height()
    }

    /// 水平面积 [m²]
    #[inline]
    pub fn area(&self) -> f64 {
        self.bounds.area()
    }

    /// 体积 [m³]
    #[inline]
    pub fn volume(&self) -> f64 {
        self.area() * self.dz
    }

    /// 嵌套深度，最外层为 0
    #[inline]
    pub fn depth(&self) -> usize {
        self.index.len().saturating_sub(1)
    }

    /// 水平中心
    #[inline]
    pub fn center(&self) -> Point2D {
        self.bounds.center()
    }

    /// 层中心高度 [m]
    #[inline]
    pub fn z_center(&self) -> f64 {
        self.z_bottom + 0.5 * self.dz
    }

    /// 面的完整面积 [m²]
    pub fn face_area(&self, face: Face) -> f64 {
        match face.axis() {
            Axis::X => self.dy() * self.dz,
            Axis::Y => self.dx() * self.dz,
            Axis::Z => self.area(),
        }
    }

    /// 沿某坐标轴的尺寸 [m]
    pub fn extent(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.dx(),
            Axis::Y => self.dy(),
            Axis::Z => self.dz,
        }
    }

    /// 某物种的质量 [μg]
    #[inline]
    pub fn mass(&self, species: usize) -> f64 {
        self.cf[species] * self.volume()
    }

    /// 中心沿某轴的坐标
    pub fn center_along(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.center().x,
            Axis::Y => self.center().y,
            Axis::Z => self.z_center(),
        }
    }
}
