// crates/am_workflow/src/coordinator.rs

//! 协调器模块
//!
//! 把 (层, 源行) 空间划分为分块，每个端点一个分发线程从共享队列取块。
//! 失败的分块带着累加的尝试次数重新入队，失败端点按指数退避暂停；
//! 尝试次数耗尽的分块记为失败，其余分块照常完成后返回 `ChunkFailed`。

use crate::events::{EventDispatcher, LoggingListener, ProgressListener, WorkflowEvent};
use crate::job::{partition, ChunkSpec, JobId, SrRow};
use crate::matrix::SrMatrix;
use crate::protocol::{ComputeRequest, WorkerRequest, WorkerResponse};
use crate::storage::{ChunkLog, StorageError};
use crate::transport::{LocalTransport, TcpTransport, Transport, TransportError};
use crate::worker::Worker;
use am_config::{AirMeshConfig, ConfigError, SrConfig};
use am_foundation::AmError;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// 工作流错误
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 传输错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 模型错误
    #[error("Model error: {0}")]
    Model(#[from] AmError),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 响应与请求不符
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 没有可用端点
    #[error("No worker endpoints")]
    NoEndpoints,

    /// 部分分块重试耗尽
    #[error("{failed} chunk(s) failed after retries; first: {first_error}")]
    ChunkFailed {
        /// 失败分块数
        failed: usize,
        /// 第一个失败原因
        first_error: String,
    },
}

/// 解析工作节点端点
///
/// 优先级：显式节点列表 > 节点文件（环境变量 `node_file_env` 指向，按序去重）> 空（本地）。
/// 不带端口的主机名补上 `rpc_port`。
pub fn resolve_endpoints(
    sr: &SrConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Vec<String>, WorkflowError> {
    let hosts: Vec<String> = if !sr.nodes.is_empty() {
        sr.nodes.clone()
    } else if let Some(path) = lookup(&sr.node_file_env).filter(|p| !p.is_empty()) {
        let text = std::fs::read_to_string(&path)?;
        let mut seen = BTreeSet::new();
        text.lines()
            .map(str::trim)
            .filter(|h| !h.is_empty() && seen.insert(h.to_string()))
            .map(String::from)
            .collect()
    } else {
        Vec::new()
    };
    Ok(hosts
        .into_iter()
        .map(|h| if h.contains(':') { h } else { format!("{h}:{}", sr.rpc_port) })
        .collect())
}

struct Task {
    chunk: ChunkSpec,
    attempts: u32,
}

struct Queue {
    pending: VecDeque<Task>,
    in_flight: usize,
    failed: Vec<(ChunkSpec, String)>,
}

/// SR 构建协调器
pub struct Coordinator {
    config: AirMeshConfig,
    planner: Arc<Worker>,
    transports: Vec<Arc<dyn Transport>>,
    log: Arc<ChunkLog>,
    events: Arc<EventDispatcher>,
}

impl Coordinator {
    /// 用给定端点创建协调器；`planner` 用于确定源行数与物种
    pub fn new(
        config: AirMeshConfig,
        planner: Arc<Worker>,
        transports: Vec<Arc<dyn Transport>>,
    ) -> Result<Self, WorkflowError> {
        config.validate()?;
        if transports.is_empty() {
            return Err(WorkflowError::NoEndpoints);
        }
        let log = Arc::new(ChunkLog::open(&config.sr.log_dir)?);
        let events = Arc::new(EventDispatcher::new());
        events.add_listener(Arc::new(LoggingListener));
        events.add_listener(Arc::new(ProgressListener::new(Arc::clone(&log))));
        Ok(Self {
            config,
            planner,
            transports,
            log,
            events,
        })
    }

    /// 按配置解析端点；没有远程端点时使用进程内工作节点
    pub fn from_config(config: AirMeshConfig, worker: Arc<Worker>) -> Result<Self, WorkflowError> {
        let timeout = config.sr.timeout();
        let endpoints = resolve_endpoints(&config.sr, |name| std::env::var(name).ok())?;
        let transports: Vec<Arc<dyn Transport>> = if endpoints.is_empty() {
            tracing::info!("未配置工作节点，使用进程内计算");
            vec![Arc::new(LocalTransport::new("local", Arc::clone(&worker), timeout))]
        } else {
            tracing::info!("工作节点: {:?}", endpoints);
            endpoints
                .into_iter()
                .map(|e| Arc::new(TcpTransport::new(e, timeout)) as Arc<dyn Transport>)
                .collect()
        };
        Self::new(config, worker, transports)
    }

    /// 事件分发器
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// 分块日志
    pub fn log(&self) -> &ChunkLog {
        &self.log
    }

    /// 端点名
    pub fn endpoints(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.endpoint()).collect()
    }

    /// 检查全部端点
    pub fn ping_all(&self) -> Vec<(String, Result<(), TransportError>)> {
        self.transports
            .iter()
            .map(|t| (t.endpoint().to_string(), t.ping()))
            .collect()
    }

    /// 构建 SR 矩阵，跳过日志中已完成的源行，结果写入 `sr.output_file`
    pub fn build(&self) -> Result<SrMatrix, WorkflowError> {
        let started = Instant::now();
        let job_id = JobId::new();
        let sr = &self.config.sr;

        let grid = self.planner.describe(&sr.inputs_file, &self.config)?;
        let (begin, end) = sr.row_range(grid.ground_cells)?;
        if let Some(&layer) = sr.layers.iter().find(|&&l| l >= grid.nlayers) {
            return Err(ConfigError::invalid("sr.layers", layer, format!("网格只有 {} 层", grid.nlayers)).into());
        }

        let mut matrix = SrMatrix::new(grid.species, grid.ground_cells);
        let resumed = self.log.completed_rows()?;
        let resumed_rows = resumed.len();
        for row in resumed {
            matrix.insert(row)?;
        }
        let done: BTreeSet<(usize, usize)> = matrix.keys().collect();
        let chunks = partition(&sr.layers, begin, end, &done, self.transports.len());

        self.events.emit(WorkflowEvent::BuildStarted {
            job_id,
            chunks: chunks.len(),
            resumed_rows,
            endpoints: self.transports.len(),
        });

        for row in self.dispatch(job_id, chunks)? {
            matrix.insert(row)?;
        }
        matrix.save_to_file(&sr.output_file)?;

        self.events.emit(WorkflowEvent::BuildCompleted {
            job_id,
            rows: matrix.len(),
            duration_secs: started.elapsed().as_secs_f64(),
        });
        Ok(matrix)
    }

    fn dispatch(&self, job_id: JobId, chunks: Vec<ChunkSpec>) -> Result<Vec<SrRow>, WorkflowError> {
        let queue = Mutex::new(Queue {
            pending: chunks.into_iter().map(|chunk| Task { chunk, attempts: 0 }).collect(),
            in_flight: 0,
            failed: Vec::new(),
        });
        let ready = Condvar::new();
        let finished = Mutex::new(Vec::new());

        thread::scope(|s| {
            for transport in &self.transports {
                let (queue, ready, finished) = (&queue, &ready, &finished);
                s.spawn(move || self.serve_endpoint(job_id, transport.as_ref(), queue, ready, finished));
            }
        });

        let queue = queue.into_inner();
        if let Some((_, first_error)) = queue.failed.first() {
            return Err(WorkflowError::ChunkFailed {
                failed: queue.failed.len(),
                first_error: first_error.clone(),
            });
        }
        Ok(finished.into_inner())
    }

    fn serve_endpoint(
        &self,
        job_id: JobId,
        transport: &dyn Transport,
        queue: &Mutex<Queue>,
        ready: &Condvar,
        finished: &Mutex<Vec<SrRow>>,
    ) {
        let endpoint = transport.endpoint().to_string();
        loop {
            let task = {
                let mut q = queue.lock();
                loop {
                    if let Some(task) = q.pending.pop_front() {
                        q.in_flight += 1;
                        break task;
                    }
                    if q.in_flight == 0 {
                        return;
                    }
                    ready.wait(&mut q);
                }
            };

            let attempt = task.attempts + 1;
            let chunk = task.chunk;
            self.events.emit(WorkflowEvent::ChunkDispatched {
                job_id,
                chunk,
                endpoint: endpoint.clone(),
                attempt,
            });
            let started = Instant::now();
            let outcome = self.run_chunk(transport, chunk);

            let mut backoff: Option<Duration> = None;
            let event = {
                let mut q = queue.lock();
                q.in_flight -= 1;
                match outcome {
                    Ok(rows) => {
                        finished.lock().extend(rows);
                        WorkflowEvent::ChunkCompleted {
                            job_id,
                            chunk,
                            endpoint: endpoint.clone(),
                            duration_secs: started.elapsed().as_secs_f64(),
                        }
                    }
                    Err(e) if attempt >= self.config.sr.max_attempts => {
                        q.failed.push((chunk, e.to_string()));
                        WorkflowEvent::ChunkFailed {
                            job_id,
                            chunk,
                            error: e.to_string(),
                        }
                    }
                    Err(e) => {
                        q.pending.push_back(Task {
                            chunk,
                            attempts: attempt,
                        });
                        backoff = Some(self.config.sr.backoff(attempt));
                        WorkflowEvent::ChunkRetried {
                            job_id,
                            chunk,
                            endpoint: endpoint.clone(),
                            attempt,
                            error: e.to_string(),
                        }
                    }
                }
            };
            ready.notify_all();
            self.events.emit(event);
            if let Some(delay) = backoff {
                thread::sleep(delay);
            }
        }
    }

    /// 调用端点计算一个分块，校验后写入日志
    fn run_chunk(&self, transport: &dyn Transport, chunk: ChunkSpec) -> Result<Vec<SrRow>, WorkflowError> {
        let request_id = JobId::new();
        let request = WorkerRequest::Compute(ComputeRequest {
            request_id,
            chunk,
            inputs_path: self.config.sr.inputs_file.clone(),
            config: self.config.clone(),
        });
        let rows = match transport.call(&request)? {
            WorkerResponse::Rows { request_id: id, rows } if id == request_id => rows,
            WorkerResponse::Rows { .. } => {
                return Err(WorkflowError::Protocol(format!("分块 {chunk} 的响应ID不匹配")))
            }
            WorkerResponse::Failure(failure) => return Err(TransportError::Remote(failure).into()),
            WorkerResponse::Pong => return Err(WorkflowError::Protocol("计算请求收到 Pong".to_string())),
        };
        let matches = rows.len() == chunk.len()
            && rows
                .iter()
                .zip(chunk.rows())
                .all(|(r, i)| r.layer == chunk.layer && r.row == i);
        if !matches {
            return Err(WorkflowError::Protocol(format!("分块 {chunk} 的结果行与请求不符")));
        }
        self.log.record(&chunk, &rows)?;
        Ok(rows)
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("endpoints", &self.endpoints())
            .field("log_dir", &self.log.directory())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_nodes_take_precedence() {
        let sr = SrConfig {
            nodes: vec!["node1".into(), "node2:7000".into()],
            ..Default::default()
        };
        let endpoints = resolve_endpoints(&sr, |_| Some("/nonexistent".into())).unwrap();
        assert_eq!(endpoints, vec!["node1:6060".to_string(), "node2:7000".to_string()]);
    }

    #[test]
    fn test_node_file_deduplicated_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nodes");
        std::fs::write(&file, "b\na\nb\n\n a \nc\n").unwrap();
        let sr = SrConfig::default();
        let path = file.to_string_lossy().to_string();
        let endpoints = resolve_endpoints(&sr, |name| (name == "PBS_NODEFILE").then(|| path.clone())).unwrap();
        assert_eq!(endpoints, vec!["b:6060", "a:6060", "c:6060"]);
    }

    #[test]
    fn test_no_nodes_means_local() {
        let endpoints = resolve_endpoints(&SrConfig::default(), |_| None).unwrap();
        assert!(endpoints.is_empty());
    }
}
