// crates/am_physics/src/mechanism.rs

//! 化学机制接口
//!
//! 机制决定物种表、排放映射、单元内化学步进，以及总 PM2.5 的组成。
//! 内置 `LinearChemistry`：四对气相前体物按一阶速率转化为对应颗粒物。

use am_foundation::AmResult;
use am_grid::{Meteorology, SpeciesClass, SpeciesSet};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// 化学机制
pub trait Mechanism: Send + Sync + Debug {
    /// 机制名称
    fn name(&self) -> &'static str;

    /// 物种表（含排放名称映射）
    fn species(&self) -> AmResult<SpeciesSet>;

    /// 单元内化学步进，原地更新浓度
    fn chemistry(&self, cf: &mut [f64], met: &Meteorology, dt: f64);

    /// 构成总 PM2.5 的物种
    fn total_pm_components(&self) -> Vec<&'static str>;

    /// 默认输出表达式
    fn default_outputs(&self) -> BTreeMap<String, String> {
        let mut outputs = BTreeMap::new();
        outputs.insert(TOTAL_PM25.to_string(), self.total_pm_components().join(" + "));
        outputs
    }
}

/// 总 PM2.5 输出名
pub const TOTAL_PM25: &str = "TotalPM25";

/// 一条一阶转化：气相 → 颗粒相
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    /// 气相物种
    pub gas: &'static str,
    /// 颗粒相物种
    pub particle: &'static str,
    /// 转化速率 [1/s]
    pub rate: f64,
    /// 质量换算（颗粒物分子量 / 前体物分子量）
    pub mass_ratio: f64,
}

/// 一阶气-粒转化机制
#[derive(Debug, Clone)]
pub struct LinearChemistry {
    conversions: Vec<Conversion>,
}

impl Default for LinearChemistry {
    fn default() -> Self {
        Self {
            conversions: vec![
                Conversion { gas: "VOC", particle: "SOA", rate: 1.0e-5, mass_ratio: 1.0 },
                Conversion { gas: "NH3", particle: "pNH4", rate: 2.0e-5, mass_ratio: 18.0 / 17.0 },
                Conversion { gas: "SOx", particle: "pSO4", rate: 1.0e-5, mass_ratio: 96.0 / 64.0 },
                Conversion { gas: "NOx", particle: "pNO3", rate: 2.0e-5, mass_ratio: 62.0 / 46.0 },
            ],
        }
    }
}

impl LinearChemistry {
    /// 物种顺序：各对 (气, 粒) 依次排列，最后是一次 PM2.5
    const SPECIES: [(&'static str, SpeciesClass); 9] = [
        ("VOC", SpeciesClass::Gas),
        ("SOA", SpeciesClass::Particle),
        ("NH3", SpeciesClass::Gas),
        ("pNH4", SpeciesClass::Particle),
        ("SOx", SpeciesClass::Gas),
        ("pSO4", SpeciesClass::Particle),
        ("NOx", SpeciesClass::Gas),
        ("pNO3", SpeciesClass::Particle),
        ("PrimaryPM25", SpeciesClass::Particle),
    ];

    /// 排放名称 → 物种
    const EMISSIONS: [(&'static str, &'static str); 5] = [
        ("VOC", "VOC"),
        ("NOx", "NOx"),
        ("NH3", "NH3"),
        ("SOx", "SOx"),
        ("PM25", "PrimaryPM25"),
    ];

    /// 使用自定义转化速率
    pub fn with_conversions(conversions: Vec<Conversion>) -> Self {
        Self { conversions }
    }

    /// 排放名称
    pub fn emission_names() -> impl Iterator<Item = &'static str> {
        Self::EMISSIONS.iter().map(|(e, _)| *e)
    }

    fn position(name: &str) -> Option<usize> {
        Self::SPECIES.iter().position(|(n, _)| *n == name)
    }
}

impl Mechanism for LinearChemistry {
    fn name(&self) -> &'static str {
        "LinearChemistry"
    }

    fn species(&self) -> AmResult<SpeciesSet> {
        SpeciesSet::new(&Self::SPECIES, &Self::EMISSIONS)
    }

    fn chemistry(&self, cf: &mut [f64], _met: &Meteorology, dt: f64) {
        for c in &self.conversions {
            let (Some(g), Some(p)) = (Self::position(c.gas), Self::position(c.particle)) else {
                continue;
            };
            let converted = cf[g] * (1.0 - (-c.rate * dt).exp());
            cf[g] -= converted;
            cf[p] += converted * c.mass_ratio;
        }
    }

    fn total_pm_components(&self) -> Vec<&'static str> {
        vec!["PrimaryPM25", "pNH4", "pSO4", "pNO3", "SOA"]
    }
}

/// 按物种名解析总 PM2.5 的物种序号
pub fn total_pm_indices(mechanism: &dyn Mechanism, species: &SpeciesSet) -> Vec<usize> {
    mechanism
        .total_pm_components()
        .iter()
        .filter_map(|name| species.index(name))
        .collect()
}
