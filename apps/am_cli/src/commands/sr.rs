// apps/am_cli/src/commands/sr.rs

//! SR 矩阵构建命令

use crate::inputs::load_static_inputs;
use am_config::AirMeshConfig;
use am_physics::LinearChemistry;
use am_workflow::{Coordinator, Worker};
use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// SR 构建参数
#[derive(Args)]
pub struct SrArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,

    /// 只检查工作节点连通性
    #[arg(long)]
    pub ping: bool,
}

/// 执行 SR 构建
pub fn execute(args: SrArgs) -> Result<()> {
    let config = AirMeshConfig::from_file(&args.config)
        .with_context(|| format!("加载配置 {} 失败", args.config.display()))?;

    // 工作节点从共享路径读取静态输入
    let shared = &config.sr.inputs_file;
    if !shared.exists() {
        let inputs = load_static_inputs(&config)?;
        inputs
            .save_to_file(shared)
            .with_context(|| format!("写入共享静态输入 {} 失败", shared.display()))?;
        info!("共享静态输入已写入 {}", shared.display());
    }

    let worker = Arc::new(Worker::new(Arc::new(LinearChemistry::default())));
    let coordinator = Coordinator::from_config(config, worker).context("创建协调器失败")?;

    if args.ping {
        let mut unreachable = 0;
        for (endpoint, status) in coordinator.ping_all() {
            match status {
                Ok(()) => info!("{endpoint}: ok"),
                Err(e) => {
                    warn!("{endpoint}: {e}");
                    unreachable += 1;
                }
            }
        }
        if unreachable > 0 {
            bail!("{unreachable} 个工作节点不可达");
        }
        return Ok(());
    }

    let matrix = coordinator.build().context("SR 矩阵构建失败")?;
    info!(
        "SR 矩阵: {} 行 × {} 物种 × {} 受体",
        matrix.len(),
        matrix.species().len(),
        matrix.receptors()
    );
    Ok(())
}
