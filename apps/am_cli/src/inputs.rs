// apps/am_cli/src/inputs.rs

//! 输入文件加载
//!
//! - 静态输入包：`ctm_data` 指向的 bincode 文件（CTM + 人口 + 死亡率）
//! - `grid.census_file` / `grid.mortality_rate_file` 非空时以 JSON 数据集替换包内对应部分
//! - 排放文件：JSON 记录数组，速率单位为 `simulation.emission_units`

use am_config::{AirMeshConfig, EmissionUnits};
use am_geo::Geometry;
use am_grid::{CensusData, EmisRecord, Emissions, StaticInputs};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// 排放文件中的一条记录（原始单位）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEmission {
    /// 几何
    pub geometry: Geometry,
    /// 排放层
    #[serde(default)]
    pub layer: usize,
    /// 排放名称 → 速率
    pub rates: BTreeMap<String, f64>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("读取 {} 失败", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("解析 {} 失败", path.display()))
}

/// 加载静态输入
pub fn load_static_inputs(config: &AirMeshConfig) -> Result<StaticInputs> {
    let mut inputs = StaticInputs::load_from_file(&config.ctm_data)
        .with_context(|| format!("加载静态输入 {} 失败", config.ctm_data.display()))?;
    if !config.grid.census_file.as_os_str().is_empty() {
        inputs.population = read_json::<CensusData>(&config.grid.census_file)?;
    }
    if !config.grid.mortality_rate_file.as_os_str().is_empty() {
        inputs.mortality = read_json::<CensusData>(&config.grid.mortality_rate_file)?;
    }
    inputs.validate().context("静态输入校验失败")?;
    info!(
        "静态输入: {} 层 CTM, {} 个人口列, {} 个死亡率列",
        inputs.ctm.nlayers(),
        inputs.population.columns().len(),
        inputs.mortality.columns().len()
    );
    Ok(inputs)
}

/// 加载并合并全部排放文件，换算为 μg/s
pub fn load_emissions(config: &AirMeshConfig) -> Result<Emissions> {
    let units: EmissionUnits = config.simulation.emission_units;
    let mut emissions = Emissions::new();
    for path in &config.emission_files {
        let raw: Vec<RawEmission> = read_json(path)?;
        let n = raw.len();
        for r in raw {
            let rates = r.rates.iter().map(|(k, v)| (k.as_str(), *v));
            let record = EmisRecord::new(r.geometry, rates, units)
                .with_context(|| format!("{} 中的排放记录无效", path.display()))?
                .with_layer(r.layer);
            emissions.add(record);
        }
        info!("排放文件 {}: {} 条记录", path.display(), n);
    }
    Ok(emissions)
}
