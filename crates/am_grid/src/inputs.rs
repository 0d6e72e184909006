// crates/am_grid/src/inputs.rs

//! 共享静态输入
//!
//! CTM 气象、普查人口与基线死亡率合并为一个包，以 bincode 存为单个文件，
//! SR 工作节点从共享路径加载一次后只读使用。

use crate::census::CensusData;
use crate::ctm::CtmData;
use am_foundation::{AmError, AmResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// 静态输入包
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticInputs {
    /// 格式版本
    pub version: String,
    /// CTM 数据
    pub ctm: CtmData,
    /// 普查人口
    pub population: CensusData,
    /// 基线死亡率
    pub mortality: CensusData,
}

impl StaticInputs {
    /// 当前格式版本
    pub const VERSION: &'static str = "1.0.0";

    /// 组装输入包
    pub fn new(ctm: CtmData, population: CensusData, mortality: CensusData) -> Self {
        Self {
            version: Self::VERSION.to_string(),
            ctm,
            population,
            mortality,
        }
    }

    /// 保存为 bincode 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> AmResult<()> {
        let file = File::create(path.as_ref())?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, self)
            .map_err(|e| AmError::serialization(format!("静态输入保存失败: {e}")))?;
        Ok(())
    }

    /// 从 bincode 文件加载并校验
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> AmResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AmError::file_not_found(path));
        }
        let reader = BufReader::new(File::open(path)?);
        let inputs: Self = bincode::deserialize_from(reader)
            .map_err(|e| AmError::serialization(format!("静态输入读取失败: {e}")))?;
        inputs.validate()?;
        Ok(inputs)
    }

    /// 校验
    pub fn validate(&self) -> AmResult<()> {
        if self.version != Self::VERSION {
            return Err(AmError::serialization(format!(
                "静态输入版本不匹配: 期望 {}, 实际 {}",
                Self::VERSION,
                self.version
            )));
        }
        self.ctm.validate()?;
        if self.mortality.is_empty() {
            return Err(AmError::missing_coverage("mortality", "死亡率数据为空"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticScenario;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inputs.bin");
        let inputs = SyntheticScenario::small().inputs().unwrap();
        inputs.save_to_file(&path).unwrap();

        let loaded = StaticInputs::load_from_file(&path).unwrap();
        assert_eq!(loaded.version, StaticInputs::VERSION);
        assert_eq!(loaded.ctm.nlayers(), inputs.ctm.nlayers());
        assert_eq!(loaded.population.columns(), inputs.population.columns());
        assert_eq!(loaded.mortality.columns(), inputs.mortality.columns());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let r = StaticInputs::load_from_file(dir.path().join("nope.bin"));
        assert!(matches!(r, Err(AmError::FileNotFound { .. })));
    }
}
