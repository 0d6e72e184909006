// crates/am_config/src/sr.rs

//! 源-受体 (SR) 矩阵构建配置

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// SR 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrConfig {
    /// 分块完成标记所在目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// SR 矩阵输出文件
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    /// 共享静态输入文件（CTM、人口、死亡率）
    #[serde(default = "default_inputs_file")]
    pub inputs_file: PathBuf,
    /// 参与计算的排放层
    #[serde(default = "default_layers")]
    pub layers: Vec<usize>,
    /// 起始源行（含）
    #[serde(default)]
    pub begin: usize,
    /// 结束源行（不含）；-1 表示最后一行
    #[serde(default = "default_end")]
    pub end: i64,
    /// 工作节点 RPC 端口
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    /// 显式工作节点列表（host 或 host:port）
    #[serde(default)]
    pub nodes: Vec<String>,
    /// 存放节点列表文件路径的环境变量名
    #[serde(default = "default_node_file_env")]
    pub node_file_env: String,
    /// 单次调用超时 [s]
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 每个分块最多尝试次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 重试退避初值 [ms]
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// 重试退避上限 [ms]
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_log_dir() -> PathBuf { PathBuf::from("log") }
fn default_output_file() -> PathBuf { PathBuf::from("sr.bin") }
fn default_inputs_file() -> PathBuf { PathBuf::from("static_inputs.bin") }
fn default_layers() -> Vec<usize> { vec![0, 2, 4, 6] }
fn default_end() -> i64 { -1 }
fn default_rpc_port() -> u16 { 6060 }
fn default_node_file_env() -> String { "PBS_NODEFILE".to_string() }
fn default_timeout_secs() -> u64 { 3600 }
fn default_max_attempts() -> u32 { 3 }
fn default_backoff_base_ms() -> u64 { 1000 }
fn default_backoff_max_ms() -> u64 { 30_000 }

impl Default for SrConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            output_file: default_output_file(),
            inputs_file: default_inputs_file(),
            layers: default_layers(),
            begin: 0,
            end: default_end(),
            rpc_port: default_rpc_port(),
            nodes: Vec::new(),
            node_file_env: default_node_file_env(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl SrConfig {
    /// 调用超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 解析行范围；`end < 0` 表示到最后一行
    pub fn row_range(&self, n_rows: usize) -> Result<(usize, usize), ConfigError> {
        let end = if self.end < 0 {
            n_rows
        } else {
            usize::try_from(self.end).unwrap_or(usize::MAX)
        };
        if end > n_rows {
            return Err(ConfigError::invalid(
                "sr.end",
                self.end,
                format!("超出源行数 {n_rows}"),
            ));
        }
        if self.begin > end {
            return Err(ConfigError::invalid(
                "sr.begin",
                self.begin,
                format!("大于结束行 {end}"),
            ));
        }
        Ok((self.begin, end))
    }

    /// 第 `attempt` 次失败后的退避时长（attempt 从 1 开始）
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1_u64 << shift)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layers.is_empty() {
            return Err(ConfigError::Missing("sr.layers".to_string()));
        }
        if self.end >= 0 && (self.end as u64) < self.begin as u64 {
            return Err(ConfigError::invalid("sr.end", self.end, "必须 ≥ begin"));
        }
        if self.end < -1 {
            return Err(ConfigError::invalid("sr.end", self.end, "只允许 -1 表示最后一行"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("sr.max_attempts", 0, "必须 ≥ 1"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid("sr.timeout_secs", 0, "必须 ≥ 1"));
        }
        if self.output_file.as_os_str().is_empty() {
            return Err(ConfigError::Missing("sr.output_file".to_string()));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing("sr.log_dir".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_range_end_minus_one() {
        let cfg = SrConfig::default();
        assert_eq!(cfg.row_range(40).unwrap(), (0, 40));
    }

    #[test]
    fn test_row_range_explicit() {
        let cfg = SrConfig {
            begin: 3,
            end: 7,
            ..Default::default()
        };
        assert_eq!(cfg.row_range(40).unwrap(), (3, 7));
        assert!(cfg.row_range(5).is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let cfg = SrConfig::default();
        assert_eq!(cfg.backoff(1), Duration::from_millis(1000));
        assert_eq!(cfg.backoff(2), Duration::from_millis(2000));
        assert_eq!(cfg.backoff(3), Duration::from_millis(4000));
        assert_eq!(cfg.backoff(10), Duration::from_millis(30_000));
    }

    #[test]
    fn test_validate() {
        SrConfig::default().validate().unwrap();
        let bad = SrConfig {
            layers: vec![],
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = SrConfig {
            begin: 5,
            end: 2,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
