// apps/am_cli/src/commands/grid.rs

//! 静态网格导出命令

use crate::inputs::load_static_inputs;
use am_config::AirMeshConfig;
use am_geo::BoundingBox;
use am_grid::Emissions;
use am_physics::prelude::*;
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 网格导出参数
#[derive(Args)]
pub struct GridArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,

    /// 输出 JSON 文件
    #[arg(short, long, default_value = "grid.json")]
    pub output: PathBuf,
}

#[derive(Serialize)]
struct ExportedCell {
    layer: usize,
    index: Vec<[usize; 2]>,
    bounds: BoundingBox,
    z_bottom: f64,
    dz: f64,
    population: f64,
}

/// 执行网格导出
pub fn execute(args: GridArgs) -> Result<()> {
    let config = AirMeshConfig::from_file(&args.config)
        .with_context(|| format!("加载配置 {} 失败", args.config.display()))?;
    let pop = config.grid.pop_grid_index()?;
    let inputs = Arc::new(load_static_inputs(&config)?);
    let sim = Simulation::new(config, inputs, Arc::new(Emissions::new()), Arc::new(LinearChemistry::default()))?;
    let domain = sim.static_grid().context("构建静态网格失败")?;

    let cells: Vec<ExportedCell> = domain
        .iter()
        .map(|(_, c)| ExportedCell {
            layer: c.layer,
            index: c.index.clone(),
            bounds: c.bounds,
            z_bottom: c.z_bottom,
            dz: c.dz,
            population: c.population.get(pop).copied().unwrap_or(0.0),
        })
        .collect();
    let json = serde_json::to_string_pretty(&cells)?;
    std::fs::write(&args.output, json).with_context(|| format!("写入 {} 失败", args.output.display()))?;
    info!("网格 {:?} 个单元/层 已写入 {}", domain.layer_counts(), args.output.display());
    Ok(())
}
