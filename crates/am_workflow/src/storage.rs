// crates/am_workflow/src/storage.rs

//! 存储模块
//!
//! 分块日志：每个完成的分块先写 `chunk_L{层}_{起}_{止}.rows`（bincode），
//! 再写同名 `.done` 标记；进度事件逐行追加到 `progress.log`。
//! 只有带标记的分块才视为完成。

use crate::job::{ChunkSpec, SrRow};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 进度日志文件名
pub const PROGRESS_FILE: &str = "progress.log";

/// 存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 数据形状与矩阵不符
    #[error("Shape mismatch: {0}")]
    Shape(String),
}

impl From<bincode::Error> for StorageError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// 分块日志目录
#[derive(Debug)]
pub struct ChunkLog {
    dir: PathBuf,
    progress: Mutex<()>,
}

impl ChunkLog {
    /// 打开（必要时创建）日志目录
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            progress: Mutex::new(()),
        })
    }

    /// 日志目录
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// 分块结果文件
    pub fn rows_path(&self, chunk: &ChunkSpec) -> PathBuf {
        self.dir.join(format!("{}.rows", chunk.stem()))
    }

    /// 分块完成标记
    pub fn done_path(&self, chunk: &ChunkSpec) -> PathBuf {
        self.dir.join(format!("{}.done", chunk.stem()))
    }

    /// 记录完成的分块：先落盘结果，再写标记
    pub fn record(&self, chunk: &ChunkSpec, rows: &[SrRow]) -> Result<(), StorageError> {
        let mut writer = BufWriter::new(File::create(self.rows_path(chunk))?);
        bincode::serialize_into(&mut writer, rows)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::write(self.done_path(chunk), chrono::Local::now().to_rfc3339())?;
        Ok(())
    }

    /// 已完成的分块（按层、行排序）
    pub fn completed_chunks(&self) -> Result<Vec<ChunkSpec>, StorageError> {
        let mut chunks = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "done") {
                let parsed = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(ChunkSpec::parse_stem);
                match parsed {
                    Some(chunk) => chunks.push(chunk),
                    None => tracing::warn!("忽略无法识别的标记文件: {}", path.display()),
                }
            }
        }
        chunks.sort();
        Ok(chunks)
    }

    /// 读取分块结果
    pub fn load_rows(&self, chunk: &ChunkSpec) -> Result<Vec<SrRow>, StorageError> {
        let reader = BufReader::new(File::open(self.rows_path(chunk))?);
        Ok(bincode::deserialize_from(reader)?)
    }

    /// 全部已完成的源行
    pub fn completed_rows(&self) -> Result<Vec<SrRow>, StorageError> {
        let mut rows = Vec::new();
        for chunk in self.completed_chunks()? {
            rows.extend(self.load_rows(&chunk)?);
        }
        Ok(rows)
    }

    /// 追加一行进度日志
    pub fn append_progress(&self, line: &str) -> Result<(), StorageError> {
        let _guard = self.progress.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(PROGRESS_FILE))?;
        writeln!(file, "{} {}", chrono::Local::now().to_rfc3339(), line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(layer: usize, row: usize) -> SrRow {
        SrRow {
            layer,
            row,
            values: vec![vec![row as f64; 3]],
        }
    }

    #[test]
    fn test_record_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChunkLog::open(dir.path().join("log")).unwrap();
        let a = ChunkSpec { layer: 0, begin: 0, end: 2 };
        let b = ChunkSpec { layer: 2, begin: 5, end: 6 };
        log.record(&b, &[row(2, 5)]).unwrap();
        log.record(&a, &[row(0, 0), row(0, 1)]).unwrap();

        assert!(log.done_path(&a).exists());
        assert_eq!(log.completed_chunks().unwrap(), vec![a, b]);
        let rows = log.completed_rows().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], row(2, 5));
    }

    #[test]
    fn test_rows_without_marker_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChunkLog::open(dir.path()).unwrap();
        let chunk = ChunkSpec { layer: 0, begin: 0, end: 1 };
        log.record(&chunk, &[row(0, 0)]).unwrap();
        fs::remove_file(log.done_path(&chunk)).unwrap();
        assert!(log.rows_path(&chunk).exists());
        assert!(log.completed_rows().unwrap().is_empty());
    }

    #[test]
    fn test_progress_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChunkLog::open(dir.path()).unwrap();
        log.append_progress("first").unwrap();
        log.append_progress("second").unwrap();
        let text = fs::read_to_string(dir.path().join(PROGRESS_FILE)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" first"));
        assert!(lines[1].ends_with(" second"));
    }
}
