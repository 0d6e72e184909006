// crates/am_workflow/src/matrix.rs

//! SR 矩阵
//!
//! 以 (排放层, 源行) 为键，值为各物种在全部地面受体单元上的浓度。

use crate::job::SrRow;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// 源-受体矩阵
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrMatrix {
    species: Vec<String>,
    receptors: usize,
    rows: BTreeMap<(usize, usize), Vec<Vec<f64>>>,
}

impl SrMatrix {
    /// 创建空矩阵
    pub fn new(species: Vec<String>, receptors: usize) -> Self {
        Self {
            species,
            receptors,
            rows: BTreeMap::new(),
        }
    }

    /// 物种名
    pub fn species(&self) -> &[String] {
        &self.species
    }

    /// 受体（地面单元）数
    pub fn receptors(&self) -> usize {
        self.receptors
    }

    /// 行数
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 插入一行，检查形状
    pub fn insert(&mut self, row: SrRow) -> Result<(), StorageError> {
        if row.values.len() != self.species.len()
            || row.values.iter().any(|v| v.len() != self.receptors)
        {
            return Err(StorageError::Shape(format!(
                "L{} 行 {} 期望 {}×{}",
                row.layer,
                row.row,
                self.species.len(),
                self.receptors
            )));
        }
        self.rows.insert((row.layer, row.row), row.values);
        Ok(())
    }

    /// 是否含有 (层, 行)
    pub fn contains(&self, layer: usize, row: usize) -> bool {
        self.rows.contains_key(&(layer, row))
    }

    /// 某行全部物种的受体浓度
    pub fn get(&self, layer: usize, row: usize) -> Option<&[Vec<f64>]> {
        self.rows.get(&(layer, row)).map(|v| v.as_slice())
    }

    /// 某行某物种的受体浓度
    pub fn species_row(&self, layer: usize, row: usize, species: &str) -> Option<&[f64]> {
        let s = self.species.iter().position(|n| n == species)?;
        self.rows.get(&(layer, row)).map(|v| v[s].as_slice())
    }

    /// 全部 (层, 行) 键
    pub fn keys(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows.keys().copied()
    }

    /// 保存为 bincode 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// 从 bincode 文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(reader)?)
    }
}
