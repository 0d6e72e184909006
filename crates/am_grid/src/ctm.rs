// crates/am_grid/src/ctm.rs

//! CTM 规则网格气象数据
//!
//! 化学传输模式 (CTM) 输出为规则网格上的三维场，形状为 (层, y, x)。
//! 变分辨率单元通过面积加权从中取值；单元落在 CTM 网格外时退回到最近的列。
//! 只有完全无法取值（无网格、层不存在、缺少字段）时才是致命错误。

use crate::cell::Meteorology;
use am_foundation::{AmError, AmResult};
use am_geo::BoundingBox;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// x 方向风速
pub const U_AVG: &str = "UAvg";
/// y 方向风速
pub const V_AVG: &str = "VAvg";
/// 垂直风速
pub const W_AVG: &str = "WAvg";
/// 水平涡扩散系数
pub const KXXYY: &str = "Kxxyy";
/// 垂直涡扩散系数
pub const KZZ: &str = "Kzz";
/// 湿沉降速率
pub const WET_DEP: &str = "WetDep";
/// 气相干沉降速度
pub const DRY_DEP_GAS: &str = "DryDepGas";
/// 颗粒相干沉降速度
pub const DRY_DEP_PARTICLE: &str = "DryDepParticle";

/// 必需字段
pub const REQUIRED_FIELDS: [&str; 8] = [
    U_AVG,
    V_AVG,
    W_AVG,
    KXXYY,
    KZZ,
    WET_DEP,
    DRY_DEP_GAS,
    DRY_DEP_PARTICLE,
];

/// CTM 水平网格定义
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CtmGrid {
    /// 左下角 X [m]
    pub x0: f64,
    /// 左下角 Y [m]
    pub y0: f64,
    /// 网格间距 X [m]
    pub dx: f64,
    /// 网格间距 Y [m]
    pub dy: f64,
    /// X 方向网格数
    pub nx: usize,
    /// Y 方向网格数
    pub ny: usize,
}

impl CtmGrid {
    /// 第 (i, j) 列的范围
    pub fn column_bounds(&self, i: usize, j: usize) -> BoundingBox {
        let x = self.x0 + i as f64 * self.dx;
        let y = self.y0 + j as f64 * self.dy;
        BoundingBox::new(x, y, x + self.dx, y + self.dy)
    }

    fn clamp_i(&self, x: f64) -> usize {
        let i = ((x - self.x0) / self.dx).floor();
        (i.max(0.0) as usize).min(self.nx.saturating_sub(1))
    }

    fn clamp_j(&self, y: f64) -> usize {
        let j = ((y - self.y0) / self.dy).floor();
        (j.max(0.0) as usize).min(self.ny.saturating_sub(1))
    }
}

/// CTM 数据集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtmData {
    /// 水平网格
    pub grid: CtmGrid,
    /// 层界面高度 [m]，长度为层数 + 1，严格递增
    pub layer_edges: Vec<f64>,
    /// 三维字段，形状 (层, y, x)
    pub fields: BTreeMap<String, Array3<f64>>,
}

impl CtmData {
    /// 创建并校验数据集
    pub fn new(
        grid: CtmGrid,
        layer_edges: Vec<f64>,
        fields: BTreeMap<String, Array3<f64>>,
    ) -> AmResult<Self> {
        let data = Self {
            grid,
            layer_edges,
            fields,
        };
        data.validate()?;
        Ok(data)
    }

    /// 水平均匀的数据集（每层取相同气象值）
    pub fn uniform(grid: CtmGrid, layer_edges: Vec<f64>, met: Meteorology) -> AmResult<Self> {
        let nlayers = layer_edges.len().saturating_sub(1);
        let shape = (nlayers, grid.ny, grid.nx);
        let values = [
            (U_AVG, met.u),
            (V_AVG, met.v),
            (W_AVG, met.w),
            (KXXYY, met.kxxyy),
            (KZZ, met.kzz),
            (WET_DEP, met.wet_dep),
            (DRY_DEP_GAS, met.dry_dep_gas),
            (DRY_DEP_PARTICLE, met.dry_dep_particle),
        ];
        let fields = values
            .iter()
            .map(|(name, v)| (name.to_string(), Array3::from_elem(shape, *v)))
            .collect();
        Self::new(grid, layer_edges, fields)
    }

    /// 校验网格尺寸、层界面与字段形状
    pub fn validate(&self) -> AmResult<()> {
        let g = &self.grid;
        if g.nx == 0 || g.ny == 0 {
            return Err(AmError::missing_coverage("CTM", "空网格"));
        }
        if !(g.dx > 0.0 && g.dy > 0.0 && g.dx.is_finite() && g.dy.is_finite()) {
            return Err(AmError::invalid_input(format!(
                "CTM 网格间距必须为正: dx={}, dy={}",
                g.dx, g.dy
            )));
        }
        if self.layer_edges.len() < 2 {
            return Err(AmError::invalid_input("CTM 至少需要一层"));
        }
        if let Some(w) = self.layer_edges.windows(2).find(|w| !(w[1] > w[0])) {
            return Err(AmError::invalid_input(format!(
                "CTM 层界面高度必须严格递增: {} → {}",
                w[0], w[1]
            )));
        }
        let shape = [self.nlayers(), g.ny, g.nx];
        for name in REQUIRED_FIELDS {
            let field = self
                .fields
                .get(name)
                .ok_or_else(|| AmError::missing_coverage("CTM", format!("缺少字段 {name}")))?;
            if field.shape() != shape {
                return Err(AmError::invalid_input(format!(
                    "CTM 字段 {name} 形状 {:?} 与网格 {:?} 不一致",
                    field.shape(),
                    shape
                )));
            }
        }
        Ok(())
    }

    /// 层数
    pub fn nlayers(&self) -> usize {
        self.layer_edges.len().saturating_sub(1)
    }

    /// 层底高度与层厚
    pub fn layer_geometry(&self, layer: usize) -> AmResult<(f64, f64)> {
        match (self.layer_edges.get(layer), self.layer_edges.get(layer + 1)) {
            (Some(&bottom), Some(&top)) => Ok((bottom, top - bottom)),
            _ => Err(AmError::missing_coverage("CTM", format!("第{layer}层不存在"))),
        }
    }

    /// 替换或添加字段
    pub fn set_field(&mut self, name: &str, values: Array3<f64>) -> AmResult<()> {
        let shape = [self.nlayers(), self.grid.ny, self.grid.nx];
        AmError::check_size("CTM field", shape.iter().product(), values.len())?;
        if values.shape() != shape {
            return Err(AmError::invalid_input(format!("字段 {name} 形状不匹配")));
        }
        self.fields.insert(name.to_string(), values);
        Ok(())
    }

    /// 对水平范围做面积加权取值
    pub fn sample(&self, bounds: &BoundingBox, layer: usize) -> AmResult<Meteorology> {
        let weights = self.column_weights(bounds, layer)?;
        let get = |name: &str| -> AmResult<f64> {
            let field = self
                .fields
                .get(name)
                .ok_or_else(|| AmError::missing_coverage("CTM", format!("缺少字段 {name}")))?;
            let total: f64 = weights.iter().map(|&(_, _, w)| w).sum();
            let value: f64 = weights
                .iter()
                .map(|&(i, j, w)| field[[layer, j, i]] * w)
                .sum::<f64>()
                / total;
            AmError::check_finite(name, value)
        };
        Ok(Meteorology {
            u: get(U_AVG)?,
            v: get(V_AVG)?,
            w: get(W_AVG)?,
            kxxyy: get(KXXYY)?,
            kzz: get(KZZ)?,
            wet_dep: get(WET_DEP)?,
            dry_dep_gas: get(DRY_DEP_GAS)?,
            dry_dep_particle: get(DRY_DEP_PARTICLE)?,
        })
    }

    /// 与范围相交的 CTM 列及其面积权重；无相交时退回最近列（权重 1）
    fn column_weights(&self, bounds: &BoundingBox, layer: usize) -> AmResult<Vec<(usize, usize, f64)>> {
        self.layer_geometry(layer)?;
        let g = &self.grid;
        if g.nx == 0 || g.ny == 0 {
            return Err(AmError::missing_coverage("CTM", "空网格"));
        }
        let (i0, i1) = (g.clamp_i(bounds.min_x), g.clamp_i(bounds.max_x));
        let (j0, j1) = (g.clamp_j(bounds.min_y), g.clamp_j(bounds.max_y));
        let mut weights = Vec::new();
        for j in j0..=j1 {
            for i in i0..=i1 {
                let w = g.column_bounds(i, j).overlap_area(bounds);
                if w > 0.0 {
                    weights.push((i, j, w));
                }
            }
        }
        if weights.is_empty() {
            let c = bounds.center();
            if !c.is_finite() {
                return Err(AmError::missing_coverage("CTM", format!("{bounds:?}")));
            }
            weights.push((g.clamp_i(c.x), g.clamp_j(c.y), 1.0));
        }
        Ok(weights)
    }
}
