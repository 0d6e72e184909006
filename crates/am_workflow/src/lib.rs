// crates/am_workflow/src/lib.rs

//! AirMesh 工作流模块
//!
//! 分布式源-受体（SR）矩阵计算。
//!
//! # 模块结构
//!
//! - [`job`]: 任务ID、分块与划分
//! - [`protocol`]: 工作节点帧协议
//! - [`transport`]: TCP 与进程内传输
//! - [`worker`]: 工作节点与 TCP 服务
//! - [`coordinator`]: 分发、重试与矩阵汇总
//! - [`storage`]: 分块日志（断点续算）
//! - [`matrix`]: SR 矩阵
//! - [`events`]: 进度事件
//!
//! # 示例
//!
//! ```rust,ignore
//! use am_workflow::{Coordinator, Worker};
//! use am_physics::LinearChemistry;
//! use std::sync::Arc;
//!
//! let config = am_config::AirMeshConfig::from_file("airmesh.json")?;
//! let worker = Arc::new(Worker::new(Arc::new(LinearChemistry::default())));
//! let coordinator = Coordinator::from_config(config, worker)?;
//! let matrix = coordinator.build()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod events;
pub mod job;
pub mod matrix;
pub mod protocol;
pub mod storage;
pub mod transport;
pub mod worker;

// 重导出核心类型
pub use coordinator::{resolve_endpoints, Coordinator, WorkflowError};
pub use events::{EventDispatcher, EventListener, WorkflowEvent};
pub use job::{partition, ChunkSpec, JobId, SrRow};
pub use matrix::SrMatrix;
pub use protocol::{ComputeRequest, FailureKind, WorkerFailure, WorkerRequest, WorkerResponse};
pub use storage::{ChunkLog, StorageError};
pub use transport::{LocalTransport, TcpTransport, Transport, TransportError};
pub use worker::{GridSummary, Worker, WorkerServer};
