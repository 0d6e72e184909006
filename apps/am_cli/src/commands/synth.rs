// apps/am_cli/src/commands/synth.rs

//! 合成场景生成命令
//!
//! 写出静态输入包、城市中心点源排放文件与指向它们的配置文件。

use crate::inputs::RawEmission;
use am_config::{AirMeshConfig, EmissionUnits};
use am_geo::Geometry;
use am_grid::synthetic::SyntheticScenario;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

/// 合成场景参数
#[derive(Args)]
pub struct SynthArgs {
    /// 输出目录
    #[arg(short, long, default_value = "synthetic")]
    pub dir: PathBuf,

    /// 垂直层数
    #[arg(long, default_value_t = 3)]
    pub layers: usize,

    /// 点源 PM2.5 排放 [μg/s]
    #[arg(long, default_value_t = 1.0e6)]
    pub pm25: f64,

    /// 点源 NOx 排放 [μg/s]
    #[arg(long, default_value_t = 4.0e6)]
    pub nox: f64,
}

/// 执行合成场景生成
pub fn execute(args: SynthArgs) -> Result<()> {
    std::fs::create_dir_all(&args.dir).with_context(|| format!("创建 {} 失败", args.dir.display()))?;
    let scenario = SyntheticScenario::small().with_layers(args.layers);

    let inputs_path = args.dir.join("static_inputs.bin");
    scenario.inputs()?.save_to_file(&inputs_path)?;

    let emis_path = args.dir.join("emissions.json");
    let source = vec![RawEmission {
        geometry: Geometry::Point(scenario.city_center()),
        layer: 0,
        rates: [("PM25".to_string(), args.pm25), ("NOx".to_string(), args.nox)]
            .into_iter()
            .collect(),
    }];
    std::fs::write(&emis_path, serde_json::to_string_pretty(&source)?)?;

    let mut config = AirMeshConfig {
        grid: scenario.config.clone(),
        ctm_data: inputs_path.clone(),
        emission_files: vec![emis_path],
        ..AirMeshConfig::default()
    };
    config.simulation.emission_units = EmissionUnits::UgPerSecond;
    config.simulation.num_iterations = 50;
    config.output.file = args.dir.join("results.json");
    config.sr.inputs_file = inputs_path;
    config.sr.log_dir = args.dir.join("sr_log");
    config.sr.output_file = args.dir.join("sr.bin");
    config.sr.layers = (0..args.layers).step_by(2).collect();

    let config_path = args.dir.join("airmesh.json");
    config.save_to_file(&config_path)?;
    info!("合成场景已写入 {} （配置: {}）", args.dir.display(), config_path.display());
    Ok(())
}
