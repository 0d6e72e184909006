// crates/am_grid/src/species.rs

//! 物种表
//!
//! 网格只需要知道物种数量、名称、气/粒相类别，以及排放名称到物种序号的映射；
//! 具体化学机制在 `am_physics` 中定义并生成这张表。

use am_foundation::{AmError, AmResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 物种相态（决定干沉降速度）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeciesClass {
    /// 气相
    Gas,
    /// 颗粒相
    Particle,
}

/// 物种表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSet {
    names: Vec<String>,
    classes: Vec<SpeciesClass>,
    emissions: BTreeMap<String, usize>,
}

impl SpeciesSet {
    /// 创建物种表
    ///
    /// `emissions` 为排放名称 → 物种名称。
    pub fn new(
        species: &[(&str, SpeciesClass)],
        emissions: &[(&str, &str)],
    ) -> AmResult<Self> {
        let names: Vec<String> = species.iter().map(|(n, _)| n.to_string()).collect();
        let classes = species.iter().map(|(_, c)| *c).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(AmError::invalid_input(format!("重复的物种名: {name}")));
            }
        }
        let mut map = BTreeMap::new();
        for (emis, target) in emissions {
            let idx = names
                .iter()
                .position(|n| n == target)
                .ok_or_else(|| AmError::invalid_input(format!("排放 {emis} 指向未知物种 {target}")))?;
            map.insert(emis.to_string(), idx);
        }
        Ok(Self {
            names,
            classes,
            emissions: map,
        })
    }

    /// 物种数量
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 物种名称
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 物种相态
    pub fn class(&self, i: usize) -> SpeciesClass {
        self.classes[i]
    }

    /// 按名称查找物种序号
    pub fn index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// 排放名称对应的物种序号；未知排放名称是输入错误
    pub fn emission_index(&self, emission: &str) -> AmResult<usize> {
        self.emissions
            .get(emission)
            .copied()
            .ok_or_else(|| AmError::invalid_input(format!("未知的排放物种: {emission}")))
    }

    /// 全部排放名称（排序）
    pub fn emission_names(&self) -> impl Iterator<Item = &str> {
        self.emissions.keys().map(String::as_str)
    }
}
