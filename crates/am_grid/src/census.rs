// crates/am_grid/src/census.rs

//! 人口普查与基线死亡率矢量数据
//!
//! 两者结构相同：多边形 + 若干命名属性列。分摊方式不同：
//! - 人口是广延量：按 相交面积 / 记录面积 分摊
//! - 死亡率是强度量：按相交面积加权平均，无相交时取最近记录

use am_foundation::{AmError, AmResult};
use am_geo::{BoundingBox, BoxIndex, Geometry};
use serde::{Deserialize, Serialize};

/// 一条属性记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    /// 记录范围
    pub geometry: Geometry,
    /// 各列取值，顺序与 `CensusData::columns` 一致
    pub values: Vec<f64>,
}

#[derive(Clone, Serialize, Deserialize)]
struct CensusParts {
    columns: Vec<String>,
    records: Vec<AttributeRecord>,
}

/// 带空间索引的属性数据集
#[derive(Debug, Clone)]
pub struct CensusData {
    columns: Vec<String>,
    records: Vec<AttributeRecord>,
    /// 记录外包框 → 记录序号
    index: BoxIndex<usize>,
    /// 记录面积缓存
    areas: Vec<f64>,
}

impl Serialize for CensusData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CensusParts {
            columns: self.columns.clone(),
            records: self.records.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CensusData {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts = CensusParts::deserialize(deserializer)?;
        Self::new(parts.columns, parts.records).map_err(serde::de::Error::custom)
    }
}

impl CensusData {
    /// 创建数据集，检查每条记录的列数
    pub fn new(columns: Vec<String>, records: Vec<AttributeRecord>) -> AmResult<Self> {
        for record in &records {
            AmError::check_size("census record values", columns.len(), record.values.len())?;
        }
        let areas = records.iter().map(|r| r.geometry.measure()).collect();
        let index = BoxIndex::bulk_load(
            records
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.geometry.bounds().map(|b| (b, i)))
                .collect(),
        );
        Ok(Self {
            columns,
            records,
            index,
            areas,
        })
    }

    /// 空数据集
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            records: Vec::new(),
            index: BoxIndex::new(),
            areas: Vec::new(),
        }
    }

    /// 列名
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// 记录
    pub fn records(&self) -> &[AttributeRecord] {
        &self.records
    }

    /// 是否没有记录
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 把列名映射为列序号
    pub fn select(&self, names: &[String]) -> AmResult<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| AmError::not_found(format!("数据列 {name}")))
            })
            .collect()
    }

    /// 与范围相交的面记录：(记录序号, 相交面积)，按记录序号排序
    fn overlaps(&self, bounds: &BoundingBox) -> Vec<(usize, f64)> {
        let mut hits: Vec<(usize, f64)> = self
            .index
            .query_intersecting(bounds)
            .into_iter()
            .filter_map(|(_, &i)| {
                let a = self.records[i].geometry.intersection_measure(bounds);
                (a > 0.0 && self.areas[i] > 0.0).then_some((i, a))
            })
            .collect();
        hits.sort_by_key(|&(i, _)| i);
        hits
    }

    /// 广延量分摊（人口）：Σ value × 相交面积 / 记录面积
    ///
    /// 无相交时为零：普查数据在研究区外缺失是正常情况。
    pub fn allocate_extensive(&self, bounds: &BoundingBox, columns: &[usize]) -> Vec<f64> {
        let mut out = vec![0.0; columns.len()];
        for (i, a) in self.overlaps(bounds) {
            let frac = a / self.areas[i];
            for (o, &c) in out.iter_mut().zip(columns) {
                *o += self.records[i].values[c] * frac;
            }
        }
        out
    }

    /// 强度量分摊（死亡率）：相交面积加权平均；无相交时取最近记录
    pub fn allocate_intensive(&self, bounds: &BoundingBox, columns: &[usize]) -> AmResult<Vec<f64>> {
        let hits = self.overlaps(bounds);
        let total: f64 = hits.iter().map(|&(_, a)| a).sum();
        if total > 0.0 {
            let mut out = vec![0.0; columns.len()];
            for (i, a) in hits {
                for (o, &c) in out.iter_mut().zip(columns) {
                    *o += self.records[i].values[c] * a / total;
                }
            }
            return Ok(out);
        }
        let (_, &nearest) = self
            .index
            .nearest(&bounds.center())
            .ok_or_else(|| AmError::missing_coverage("mortality", format!("{bounds:?}")))?;
        Ok(columns
            .iter()
            .map(|&c| self.records[nearest].values[c])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> CensusData {
        CensusData::new(
            vec!["TotalPop".into(), "Black".into()],
            vec![
                AttributeRecord {
                    geometry: Geometry::rectangle(0.0, 0.0, 10.0, 10.0),
                    values: vec![100.0, 10.0],
                },
                AttributeRecord {
                    geometry: Geometry::rectangle(10.0, 0.0, 20.0, 10.0),
                    values: vec![300.0, 30.0],
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_extensive_allocation() {
        let d = data();
        let cols = d.select(&["TotalPop".to_string()]).unwrap();
        let pop = d.allocate_extensive(&BoundingBox::new(5.0, 0.0, 15.0, 10.0), &cols);
        assert!((pop[0] - 200.0).abs() < 1e-9);
        let outside = d.allocate_extensive(&BoundingBox::new(50.0, 0.0, 60.0, 10.0), &cols);
        assert_eq!(outside, vec![0.0]);
    }

    #[test]
    fn test_intensive_allocation() {
        let d = data();
        let cols = d.select(&["Black".to_string(), "TotalPop".to_string()]).unwrap();
        let v = d
            .allocate_intensive(&BoundingBox::new(5.0, 0.0, 15.0, 10.0), &cols)
            .unwrap();
        assert!((v[0] - 20.0).abs() < 1e-9);
        assert!((v[1] - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_intensive_nearest_fallback() {
        let d = data();
        let cols = d.select(&["TotalPop".to_string()]).unwrap();
        let v = d
            .allocate_intensive(&BoundingBox::new(40.0, 0.0, 50.0, 10.0), &cols)
            .unwrap();
        assert_eq!(v, vec![300.0]);
    }

    #[test]
    fn test_empty_intensive_is_fatal() {
        let d = CensusData::empty(vec!["AllCause".into()]);
        let err = d
            .allocate_intensive(&BoundingBox::new(0.0, 0.0, 1.0, 1.0), &[0])
            .unwrap_err();
        assert!(matches!(err, AmError::MissingCoverage { .. }));
    }

    #[test]
    fn test_unknown_column() {
        assert!(data().select(&["Nobody".to_string()]).is_err());
    }

    #[test]
    fn test_wrong_value_count() {
        let r = CensusData::new(
            vec!["A".into()],
            vec![AttributeRecord {
                geometry: Geometry::rectangle(0.0, 0.0, 1.0, 1.0),
                values: vec![1.0, 2.0],
            }],
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_serde_rebuilds_index() {
        let d = data();
        let bytes = bincode::serialize(&d).unwrap();
        let back: CensusData = bincode::deserialize(&bytes).unwrap();
        let cols = back.select(&["TotalPop".to_string()]).unwrap();
        let pop = back.allocate_extensive(&BoundingBox::new(0.0, 0.0, 20.0, 10.0), &cols);
        assert!((pop[0] - 400.0).abs() < 1e-9);
    }
}
