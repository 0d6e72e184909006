// apps/am_cli/src/commands/run.rs

//! 运行模拟命令

use crate::inputs::{load_emissions, load_static_inputs};
use am_config::AirMeshConfig;
use am_physics::prelude::*;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// 运行模拟参数
#[derive(Args)]
pub struct RunArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,

    /// 覆盖结果输出文件
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 覆盖固定迭代次数（0 = 按收敛判据）
    #[arg(short = 'n', long)]
    pub iterations: Option<usize>,

    /// 使用静态网格
    #[arg(long)]
    pub static_grid: bool,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== AirMesh 模拟启动 ===");
    let mut config = AirMeshConfig::from_file(&args.config)
        .with_context(|| format!("加载配置 {} 失败", args.config.display()))?;
    if let Some(n) = args.iterations {
        config.simulation.num_iterations = n;
    }
    if args.static_grid {
        config.simulation.static_grid = true;
    }
    if let Some(output) = args.output {
        config.output.file = output;
    }

    let inputs = Arc::new(load_static_inputs(&config)?);
    let emissions = Arc::new(load_emissions(&config)?);
    let sim = Simulation::new(config, inputs, emissions, Arc::new(LinearChemistry::default()))
        .context("装配模拟失败")?;
    let pipeline = sim.pipeline()?;
    let (init, run) = pipeline.stage_names();
    info!("init: {}", init.join(" → "));
    info!("run: {}", run.join(" → "));

    let start = Instant::now();
    let (domain, summary) = sim.run_pipeline(pipeline).context("模拟失败")?;
    info!(
        "=== 模拟完成: {} 次迭代, t={:.0} s, {:?}, {} 个单元, 耗时 {:.2} s ===",
        summary.iterations,
        summary.time,
        summary.termination,
        domain.len(),
        start.elapsed().as_secs_f64()
    );

    let results = sim.results(&domain).context("计算输出变量失败")?;
    for name in results.values.keys() {
        if let Some(total) = results.total(name) {
            info!("{name}: 合计 {total:.6e}");
        }
    }
    let file = &sim.config().output.file;
    results
        .save_to_file(file)
        .with_context(|| format!("写入结果 {} 失败", file.display()))?;
    info!("结果已写入 {}", file.display());
    Ok(())
}
