// crates/am_config/src/output.rs

//! 结果输出配置

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 输出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 结果文件
    #[serde(default = "default_output_file")]
    pub file: PathBuf,
    /// 输出全部层（否则只输出地面层）
    #[serde(default)]
    pub all_layers: bool,
    /// 输出变量：名称 → 表达式
    #[serde(default = "default_variables")]
    pub variables: BTreeMap<String, String>,
}

fn default_output_file() -> PathBuf { PathBuf::from("results.json") }

fn default_variables() -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert(
        "TotalPM25".to_string(),
        "PrimaryPM25 + pNH4 + pSO4 + pNO3 + SOA".to_string(),
    );
    vars.insert(
        "TotalPopD".to_string(),
        "coxHazard(loglogRR(TotalPM25), TotalPop, AllCause)".to_string(),
    );
    vars
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file: default_output_file(),
            all_layers: false,
            variables: default_variables(),
        }
    }
}

impl OutputConfig {
    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file.as_os_str().is_empty() {
            return Err(ConfigError::Missing("output.file".to_string()));
        }
        if let Some((name, _)) = self.variables.iter().find(|(_, expr)| expr.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "output.variables",
                name,
                "表达式不能为空",
            ));
        }
        Ok(())
    }
}
