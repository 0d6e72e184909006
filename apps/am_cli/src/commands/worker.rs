// apps/am_cli/src/commands/worker.rs

//! SR 工作节点命令

use am_physics::LinearChemistry;
use am_workflow::{Worker, WorkerServer};
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

/// 工作节点参数
#[derive(Args)]
pub struct WorkerArgs {
    /// 监听地址
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// 监听端口
    #[arg(short, long, default_value_t = 6060)]
    pub port: u16,
}

/// 启动工作节点（阻塞）
pub fn execute(args: WorkerArgs) -> Result<()> {
    let worker = Arc::new(Worker::new(Arc::new(LinearChemistry::default())));
    let server = WorkerServer::bind((args.bind.as_str(), args.port), worker)
        .with_context(|| format!("绑定 {}:{} 失败", args.bind, args.port))?;
    server.serve()?;
    Ok(())
}
