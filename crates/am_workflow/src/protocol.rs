// crates/am_workflow/src/protocol.rs

//! 工作节点协议
//!
//! 帧格式：4 字节大端长度 + bincode 负载。每次调用一帧请求、一帧响应。

use crate::job::{ChunkSpec, JobId, SrRow};
use crate::transport::TransportError;
use am_config::AirMeshConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;

/// 单帧负载上限 [字节]
pub const MAX_FRAME_LEN: u32 = 1 << 30;

/// 计算请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeRequest {
    /// 请求ID
    pub request_id: JobId,
    /// 分块
    pub chunk: ChunkSpec,
    /// 共享静态输入文件
    pub inputs_path: PathBuf,
    /// 模拟配置
    pub config: AirMeshConfig,
}

/// 请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerRequest {
    /// 计算一个分块
    Compute(ComputeRequest),
    /// 健康检查
    Ping,
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// 输入加载或网格构建失败
    Input,
    /// 模拟计算失败
    Compute,
}

/// 工作节点报告的结构化失败
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerFailure {
    /// 类别
    pub kind: FailureKind,
    /// 错误信息
    pub message: String,
}

impl std::fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// 响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerResponse {
    /// 分块结果
    Rows {
        /// 对应的请求ID
        request_id: JobId,
        /// 源行结果，按行号升序
        rows: Vec<SrRow>,
    },
    /// 计算失败
    Failure(WorkerFailure),
    /// 健康检查应答
    Pong,
}

/// 写一帧
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), TransportError> {
    let payload = bincode::serialize(message).map_err(|e| TransportError::Codec(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&n| n <= MAX_FRAME_LEN)
        .ok_or_else(|| TransportError::Codec(format!("帧过大: {} 字节", payload.len())))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// 读一帧
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, TransportError> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_LEN {
        return Err(TransportError::Codec(format!("帧过大: {len} 字节")));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    bincode::deserialize(&payload).map_err(|e| TransportError::Codec(e.to_string()))
}
