// crates/am_grid/src/emissions.rs

//! 排放记录与分摊
//!
//! 排放速率在构造记录时换算为 μg/s。分摊到单元时按几何相交份额：
//! 点源按半开区间包含（网格东、北外边界上的点归属边界单元），线源按长度，面源按面积。
//! 与任何单元都不相交的记录贡献为零，只记录调试日志。

use crate::species::SpeciesSet;
use am_config::EmissionUnits;
use am_foundation::{AmError, AmResult};
use am_geo::{BoundingBox, BoxIndex, Geometry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 一条排放记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmisRecord {
    /// 排放几何
    pub geometry: Geometry,
    /// 排放所在层
    #[serde(default)]
    pub layer: usize,
    /// 排放名称 → 速率 [μg/s]
    pub rates: BTreeMap<String, f64>,
}

impl EmisRecord {
    /// 由原始单位的速率创建记录
    pub fn new<'a>(
        geometry: Geometry,
        rates: impl IntoIterator<Item = (&'a str, f64)>,
        units: EmissionUnits,
    ) -> AmResult<Self> {
        let factor = units.to_ug_per_s();
        let mut converted = BTreeMap::new();
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(AmError::invalid_input(format!(
                    "排放速率必须为非负有限值: {name}={value}"
                )));
            }
            converted.insert(name.to_string(), value * factor);
        }
        Ok(Self {
            geometry,
            layer: 0,
            rates: converted,
        })
    }

    /// 指定排放层
    pub fn with_layer(mut self, layer: usize) -> Self {
        self.layer = layer;
        self
    }
}

/// 排放集合，带空间索引
#[derive(Debug, Clone, Default)]
pub struct Emissions {
    records: Vec<EmisRecord>,
    index: BoxIndex<usize>,
}

impl Emissions {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 由记录批量创建
    pub fn from_records(records: Vec<EmisRecord>) -> Self {
        let mut emis = Self::new();
        for r in records {
            emis.add(r);
        }
        emis
    }

    /// 添加记录；无法求外包框的几何不进入索引，贡献为零
    pub fn add(&mut self, record: EmisRecord) {
        let i = self.records.len();
        match record.geometry.bounds() {
            Some(b) if record.geometry.is_finite() => self.index.insert(b, i),
            _ => log::debug!("排放记录 {i} 几何无效，贡献为零"),
        }
        self.records.push(record);
    }

    /// 记录数
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 全部记录
    pub fn records(&self) -> &[EmisRecord] {
        &self.records
    }

    /// 检查所有排放名称都能映射到物种
    pub fn check_species(&self, species: &SpeciesSet) -> AmResult<()> {
        for record in &self.records {
            for name in record.rates.keys() {
                species.emission_index(name)?;
            }
        }
        Ok(())
    }

    /// 单元（范围 + 层 + 体积）的排放通量 [μg/m³/s]；`extent` 为网格的水平范围
    pub fn flux_for(
        &self,
        bounds: &BoundingBox,
        layer: usize,
        volume: f64,
        species: &SpeciesSet,
        extent: &BoundingBox,
    ) -> AmResult<Vec<f64>> {
        let mut flux = vec![0.0; species.len()];
        let mut hits: Vec<usize> = self
            .index
            .query_intersecting(bounds)
            .into_iter()
            .map(|(_, &i)| i)
            .collect();
        hits.sort_unstable();
        for i in hits {
            let record = &self.records[i];
            if record.layer != layer {
                continue;
            }
            let frac = record.geometry.fraction_within(bounds, extent);
            if frac <= 0.0 {
                continue;
            }
            for (name, rate) in &record.rates {
                flux[species.emission_index(name)?] += rate * frac / volume;
            }
        }
        Ok(flux)
    }

    /// 各记录在给定单元范围集合上的份额合计，用于诊断未落入网格的排放
    pub fn coverage<'a>(
        &self,
        cells: impl IntoIterator<Item = (usize, &'a BoundingBox)>,
        extent: &BoundingBox,
    ) -> Vec<f64> {
        let mut covered = vec![0.0; self.records.len()];
        for (layer, bounds) in cells {
            for (_, &i) in self.index.query_intersecting(bounds) {
                if self.records[i].layer == layer {
                    covered[i] += self.records[i].geometry.fraction_within(bounds, extent);
                }
            }
        }
        covered
    }
}
