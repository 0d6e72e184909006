// crates/am_physics/src/results.rs

//! 结果输出
//!
//! 输出变量是以名称引用的表达式，可引用物种浓度、人口列、死亡率列、气象量，
//! 以及其他输出变量。编译时按依赖关系排序，循环依赖与未知名称视为配置错误。
//! 每条死亡率 → 人口映射自动生成 `"{pop} deaths"` 输出。

use crate::expr::Expr;
use crate::mechanism::{Mechanism, TOTAL_PM25};
use am_config::{OutputConfig, VarGridConfig};
use am_foundation::{AmError, AmResult};
use am_geo::BoundingBox;
use am_grid::ctm::{KXXYY, KZZ, U_AVG, V_AVG, W_AVG};
use am_grid::{Cell, Domain};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// 气象变量名
const MET_VARS: [&str; 5] = [U_AVG, V_AVG, W_AVG, KXXYY, KZZ];

// ============================================================================
// 输出变量集
// ============================================================================

/// 按依赖顺序编译好的输出变量
#[derive(Debug, Clone)]
pub struct OutputSet {
    order: Vec<(String, Expr)>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl OutputSet {
    /// 编译输出变量，`base` 为单元上可直接读取的变量名
    pub fn compile(variables: &BTreeMap<String, String>, base: &BTreeSet<String>) -> AmResult<Self> {
        let mut parsed = BTreeMap::new();
        for (name, src) in variables {
            if base.contains(name) {
                return Err(AmError::config(format!("输出变量 {name} 与内置变量重名")));
            }
            parsed.insert(name.clone(), Expr::parse(src)?);
        }

        for (name, expr) in &parsed {
            for var in expr.variables() {
                if !base.contains(&var) && !parsed.contains_key(&var) {
                    return Err(AmError::config(format!("输出变量 {name} 引用了未知变量 {var}")));
                }
            }
        }

        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut order = Vec::with_capacity(parsed.len());
        let mut path = Vec::new();
        for name in parsed.keys() {
            visit(name, &parsed, &mut marks, &mut path, &mut order)?;
        }
        Ok(Self {
            order: order
                .into_iter()
                .map(|n| {
                    let e = parsed[n].clone();
                    (n.to_string(), e)
                })
                .collect(),
        })
    }

    /// 标准输出集：机制默认输出 + 用户配置 + 健康影响
    pub fn standard(
        output: &OutputConfig,
        grid: &VarGridConfig,
        mechanism: &dyn Mechanism,
        domain: &Domain,
    ) -> AmResult<Self> {
        let mut variables = mechanism.default_outputs();
        variables.extend(output.variables.clone());
        if !variables.contains_key(TOTAL_PM25) {
            variables.insert(TOTAL_PM25.to_string(), mechanism.total_pm_components().join(" + "));
        }
        for (mort, pop_idx) in grid.mortality_pairs()? {
            let pop = &grid.census_pop_columns[pop_idx];
            variables
                .entry(format!("{pop} deaths"))
                .or_insert_with(|| format!("coxHazard(loglogRR({TOTAL_PM25}), {pop}, {mort})"));
        }
        Self::compile(&variables, &base_variables(domain))
    }

    /// 输出名（依赖顺序）
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|(n, _)| n.as_str())
    }

    /// 在单元上求值全部输出
    pub fn evaluate(&self, domain: &Domain, cell: &Cell) -> AmResult<Vec<f64>> {
        let mut values: Vec<f64> = Vec::with_capacity(self.order.len());
        for (i, (_, expr)) in self.order.iter().enumerate() {
            let done = &values;
            let lookup = |name: &str| -> Option<f64> {
                self.order[..i]
                    .iter()
                    .position(|(n, _)| n == name)
                    .map(|k| done[k])
                    .or_else(|| base_value(domain, cell, name))
            };
            let v = expr.eval(&lookup)?;
            values.push(v);
        }
        Ok(values)
    }
}

fn visit<'a>(
    name: &'a str,
    parsed: &'a BTreeMap<String, Expr>,
    marks: &mut BTreeMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    order: &mut Vec<&'a str>,
) -> AmResult<()> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            path.push(name);
            return Err(AmError::config(format!("输出变量存在循环依赖: {}", path.join(" → "))));
        }
        None => {}
    }
    marks.insert(name, Mark::Visiting);
    path.push(name);
    if let Some(expr) = parsed.get(name) {
        for var in expr.variables() {
            if let Some((key, _)) = parsed.get_key_value(var.as_str()) {
                visit(key, parsed, marks, path, order)?;
            }
        }
    }
    path.pop();
    marks.insert(name, Mark::Done);
    order.push(name);
    Ok(())
}

/// 单元上可直接读取的变量名
pub fn base_variables(domain: &Domain) -> BTreeSet<String> {
    domain
        .species()
        .names()
        .iter()
        .chain(domain.pop_columns())
        .chain(domain.mortality_columns())
        .cloned()
        .chain(MET_VARS.iter().map(|s| s.to_string()))
        .collect()
}

fn base_value(domain: &Domain, cell: &Cell, name: &str) -> Option<f64> {
    if let Some(i) = domain.species().index(name) {
        return cell.cf.get(i).copied();
    }
    if let Some(i) = domain.pop_columns().iter().position(|c| c == name) {
        return cell.population.get(i).copied();
    }
    if let Some(i) = domain.mortality_columns().iter().position(|c| c == name) {
        return cell.mortality.get(i).copied();
    }
    match name {
        n if n == U_AVG => Some(cell.met.u),
        n if n == V_AVG => Some(cell.met.v),
        n if n == W_AVG => Some(cell.met.w),
        n if n == KXXYY => Some(cell.met.kxxyy),
        n if n == KZZ => Some(cell.met.kzz),
        _ => None,
    }
}

// ============================================================================
// 结果
// ============================================================================

/// 单元描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    /// 层号
    pub layer: usize,
    /// 嵌套路径
    pub index: Vec<[usize; 2]>,
    /// 水平范围
    pub bounds: BoundingBox,
}

/// 按单元排列的输出结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    /// 模拟时间 [s]
    pub time: f64,
    /// 单元（遍历顺序）
    pub cells: Vec<CellRecord>,
    /// 输出名 → 各单元取值
    pub values: BTreeMap<String, Vec<f64>>,
}

impl Results {
    /// 从模拟域提取；`all_layers` 为假时只输出地面层
    pub fn extract(domain: &Domain, outputs: &OutputSet, all_layers: bool) -> AmResult<Self> {
        let mut cells = Vec::new();
        let mut columns: Vec<Vec<f64>> = outputs.order.iter().map(|_| Vec::new()).collect();
        for (_, cell) in domain.iter() {
            if !all_layers && cell.layer != 0 {
                continue;
            }
            let values = outputs.evaluate(domain, cell)?;
            for (col, v) in columns.iter_mut().zip(values) {
                col.push(v);
            }
            cells.push(CellRecord {
                layer: cell.layer,
                index: cell.index.clone(),
                bounds: cell.bounds,
            });
        }
        Ok(Self {
            time: domain.time,
            cells,
            values: outputs.names().map(String::from).zip(columns).collect(),
        })
    }

    /// 某输出的取值
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.values.get(name).map(|v| v.as_slice())
    }

    /// 某输出在全部单元上的和（按遍历顺序累加）
    pub fn total(&self, name: &str) -> Option<f64> {
        self.get(name).map(|v| v.iter().sum())
    }

    /// 保存为 JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> AmResult<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| AmError::serialization(format!("结果保存失败: {e}")))
    }

    /// 从 JSON 加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> AmResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AmError::file_not_found(path));
        }
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(|e| AmError::serialization(format!("结果读取失败: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BTreeSet<String> {
        ["a", "b"].iter().map(|s| s.to_string()).collect()
    }

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_dependency_order() {
        let set = OutputSet::compile(&vars(&[("z", "y * 2"), ("y", "a + b"), ("x", "z + y")]), &base()).unwrap();
        let names: Vec<&str> = set.names().collect();
        let pos = |n: &str| names.iter().position(|m| *m == n).unwrap();
        assert!(pos("y") < pos("z"));
        assert!(pos("z") < pos("x"));
    }

    #[test]
    fn test_cycle_and_unknown_are_config_errors() {
        let cyc = OutputSet::compile(&vars(&[("p", "q + 1"), ("q", "p * 2")]), &base());
        assert!(matches!(cyc, Err(AmError::Config { .. })));
        let unknown = OutputSet::compile(&vars(&[("p", "c + 1")]), &base());
        assert!(matches!(unknown, Err(AmError::Config { .. })));
        let shadow = OutputSet::compile(&vars(&[("a", "b")]), &base());
        assert!(shadow.is_err());
    }

    #[test]
    fn test_results_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let results = Results {
            time: 3600.0,
            cells: vec![CellRecord {
                layer: 0,
                index: vec![[1, 2]],
                bounds: am_geo::BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            }],
            values: [("TotalPM25".to_string(), vec![0.25])].into_iter().collect(),
        };
        results.save_to_file(&path).unwrap();
        let loaded = Results::load_from_file(&path).unwrap();
        assert_eq!(loaded, results);
        assert_eq!(loaded.total("TotalPM25"), Some(0.25));
        assert!(loaded.get("missing").is_none());
    }
}
