// apps/am_cli/src/main.rs

//! AirMesh 命令行界面
//!
//! 可变分辨率网格空气质量模型的命令行工具。

mod commands;
mod inputs;

use clap::{Parser, Subcommand};
use tracing::Level;

/// AirMesh 空气质量模型命令行工具
#[derive(Parser)]
#[command(name = "am_cli")]
#[command(author = "AirMesh Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "AirMesh variable-resolution air quality model", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行模拟
    Run(commands::run::RunArgs),
    /// 导出静态网格
    Grid(commands::grid::GridArgs),
    /// 构建 SR 矩阵
    Sr(commands::sr::SrArgs),
    /// 启动 SR 工作节点
    Worker(commands::worker::WorkerArgs),
    /// 生成合成场景
    Synth(commands::synth::SynthArgs),
}

fn parse_level(s: &str) -> Level {
    match s.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志；tracing-log 桥接 `log` 记录
    tracing_subscriber::fmt()
        .with_max_level(parse_level(&cli.log_level))
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("日志初始化失败: {e}"))?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Grid(args) => commands::grid::execute(args),
        Commands::Sr(args) => commands::sr::execute(args),
        Commands::Worker(args) => commands::worker::execute(args),
        Commands::Synth(args) => commands::synth::execute(args),
    }
}
