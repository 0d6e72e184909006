// crates/am_workflow/src/job.rs

//! 任务定义模块
//!
//! SR 构建任务的标识、分块与源行结果。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// 任务ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// 创建新的任务ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// 获取内部UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 分块：某排放层上的一段连续源行 `[begin, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkSpec {
    /// 排放层
    pub layer: usize,
    /// 起始源行（含）
    pub begin: usize,
    /// 结束源行（不含）
    pub end: usize,
}

impl ChunkSpec {
    /// 行数
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 行号迭代
    pub fn rows(&self) -> std::ops::Range<usize> {
        self.begin..self.end
    }

    /// 日志文件名主干
    pub fn stem(&self) -> String {
        format!("chunk_L{}_{}_{}", self.layer, self.begin, self.end)
    }

    /// 从日志文件名主干解析
    pub fn parse_stem(stem: &str) -> Option<Self> {
        let rest = stem.strip_prefix("chunk_L")?;
        let mut parts = rest.split('_');
        let layer = parts.next()?.parse().ok()?;
        let begin = parts.next()?.parse().ok()?;
        let end = parts.next()?.parse().ok()?;
        if parts.next().is_some() || end < begin {
            return None;
        }
        Some(Self { layer, begin, end })
    }
}

impl std::fmt::Display for ChunkSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}[{}..{})", self.layer, self.begin, self.end)
    }
}

/// 一个源行的计算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrRow {
    /// 排放层
    pub layer: usize,
    /// 源行（地面单元序号）
    pub row: usize,
    /// 受体浓度 `values[物种][地面单元]` [μg/m³]
    pub values: Vec<Vec<f64>>,
}

/// 划分分块
///
/// 扣除 `completed` 中已完成的 (层, 行)，每段剩余连续行再均分为至多
/// `workers` 块，块长相差不超过 1。
pub fn partition(
    layers: &[usize],
    begin: usize,
    end: usize,
    completed: &BTreeSet<(usize, usize)>,
    workers: usize,
) -> Vec<ChunkSpec> {
    let workers = workers.max(1);
    let mut chunks = Vec::new();
    for &layer in layers {
        let mut run_start = None;
        for row in begin..=end {
            let pending = row < end && !completed.contains(&(layer, row));
            match (pending, run_start) {
                (true, None) => run_start = Some(row),
                (false, Some(start)) => {
                    split_run(layer, start, row, workers, &mut chunks);
                    run_start = None;
                }
                _ => {}
            }
        }
    }
    chunks
}

fn split_run(layer: usize, begin: usize, end: usize, workers: usize, out: &mut Vec<ChunkSpec>) {
    let n = end - begin;
    let k = workers.min(n);
    let (base, extra) = (n / k, n % k);
    let mut start = begin;
    for i in 0..k {
        let len = base + usize::from(i < extra);
        out.push(ChunkSpec {
            layer,
            begin: start,
            end: start + len,
        });
        start += len;
    }
}
