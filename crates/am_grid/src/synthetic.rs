// crates/am_grid/src/synthetic.rs

//! 合成场景
//!
//! 水平均匀的 CTM、一个城市人口斑块加均匀背景人口、全域统一的基线死亡率。
//! 用于测试、演示与 CLI 的 `synth` 子命令。

use crate::census::{AttributeRecord, CensusData};
use crate::cell::Meteorology;
use crate::ctm::{CtmData, CtmGrid};
use crate::emissions::{EmisRecord, Emissions};
use crate::inputs::StaticInputs;
use crate::species::{SpeciesClass, SpeciesSet};
use am_config::{EmissionUnits, VarGridConfig};
use am_foundation::AmResult;
use am_geo::{BoundingBox, Geometry, Point2D};
use std::sync::Arc;

/// 人口列相对总人口的比例，顺序同默认普查列
const POP_SHARES: [f64; 6] = [1.0, 0.5, 0.2, 0.05, 0.1, 0.15];

/// 合成场景描述
#[derive(Debug, Clone)]
pub struct SyntheticScenario {
    /// 网格配置
    pub config: VarGridConfig,
    /// CTM 层界面高度 [m]
    pub layer_edges: Vec<f64>,
    /// 全域气象
    pub met: Meteorology,
    /// 城市范围
    pub city: BoundingBox,
    /// 城市人口
    pub city_population: f64,
    /// 背景人口（均匀分布于全域）
    pub background_population: f64,
    /// 基线死亡率（每 10 万人每年）
    pub mortality_rate: f64,
}

impl SyntheticScenario {
    /// 4×4 粗网格（16 km），两级加密，3 层
    pub fn small() -> Self {
        let config = VarGridConfig {
            x0: 0.0,
            y0: 0.0,
            dx: 16_000.0,
            dy: 16_000.0,
            x_nests: vec![4, 2, 2],
            y_nests: vec![4, 2, 2],
            hi_res_layers: 2,
            pop_density_threshold: 1.0e-4,
            pop_threshold: 20_000.0,
            pop_conc_threshold: 1.0e-9,
            ..VarGridConfig::default()
        };
        Self {
            config,
            layer_edges: vec![0.0, 50.0, 150.0, 400.0],
            met: Meteorology {
                u: 2.0,
                v: 1.0,
                w: 0.0,
                kxxyy: 100.0,
                kzz: 5.0,
                wet_dep: 1.0e-5,
                dry_dep_gas: 0.005,
                dry_dep_particle: 0.001,
            },
            city: BoundingBox::new(16_000.0, 16_000.0, 24_000.0, 24_000.0),
            city_population: 200_000.0,
            background_population: 10_000.0,
            mortality_rate: 800.0,
        }
    }

    /// 指定层数（层厚按 50 m 起逐层加倍）
    pub fn with_layers(mut self, nlayers: usize) -> Self {
        let mut edges = vec![0.0];
        let mut dz = 50.0;
        for _ in 0..nlayers {
            let top = edges[edges.len() - 1] + dz;
            edges.push(top);
            dz *= 2.0;
        }
        self.layer_edges = edges;
        self
    }

    /// 网格外包范围
    pub fn extent(&self) -> BoundingBox {
        let (min_x, min_y, max_x, max_y) = self.config.extent();
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }

    /// 城市中心
    pub fn city_center(&self) -> Point2D {
        self.city.center()
    }

    /// 总人口
    pub fn total_population(&self) -> f64 {
        self.city_population + self.background_population
    }

    /// 简单双物种表
    pub fn species(&self) -> AmResult<Arc<SpeciesSet>> {
        let set = SpeciesSet::new(
            &[("PrimaryPM25", SpeciesClass::Particle), ("NOx", SpeciesClass::Gas)],
            &[("PM25", "PrimaryPM25"), ("NOx", "NOx")],
        )?;
        Ok(Arc::new(set))
    }

    /// 生成静态输入
    pub fn inputs(&self) -> AmResult<StaticInputs> {
        let extent = self.extent();
        let grid = CtmGrid {
            x0: self.config.x0,
            y0: self.config.y0,
            dx: self.config.dx,
            dy: self.config.dy,
            nx: self.config.x_nests.first().copied().unwrap_or(0),
            ny: self.config.y_nests.first().copied().unwrap_or(0),
        };
        let ctm = CtmData::uniform(grid, self.layer_edges.clone(), self.met)?;

        let columns = self.config.census_pop_columns.clone();
        let shares = |total: f64| -> Vec<f64> {
            (0..columns.len())
                .map(|i| total * POP_SHARES.get(i).copied().unwrap_or(0.0))
                .collect()
        };
        let population = CensusData::new(
            columns.clone(),
            vec![
                AttributeRecord {
                    geometry: rect(&self.city),
                    values: shares(self.city_population),
                },
                AttributeRecord {
                    geometry: rect(&extent),
                    values: shares(self.background_population),
                },
            ],
        )?;

        let mortality_columns = self.config.mortality_columns();
        let mortality = CensusData::new(
            mortality_columns.clone(),
            vec![AttributeRecord {
                geometry: rect(&extent),
                values: vec![self.mortality_rate; mortality_columns.len()],
            }],
        )?;

        Ok(StaticInputs::new(ctm, population, mortality))
    }

    /// 城市中心的点源排放 [μg/s]
    pub fn point_emissions(&self, rates: &[(&str, f64)], layer: usize) -> AmResult<Emissions> {
        let c = self.city_center();
        let record = EmisRecord::new(Geometry::Point(c), rates.iter().copied(), EmissionUnits::UgPerSecond)?
            .with_layer(layer);
        Ok(Emissions::from_records(vec![record]))
    }
}

fn rect(b: &BoundingBox) -> Geometry {
    Geometry::rectangle(b.min_x, b.min_y, b.max_x, b.max_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_validate() {
        let s = SyntheticScenario::small();
        let inputs = s.inputs().unwrap();
        inputs.validate().unwrap();
        assert_eq!(inputs.ctm.nlayers(), 3);
    }

    #[test]
    fn test_with_layers() {
        let s = SyntheticScenario::small().with_layers(5);
        assert_eq!(s.layer_edges, vec![0.0, 50.0, 150.0, 350.0, 750.0, 1550.0]);
    }
}
