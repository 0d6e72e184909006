// crates/am_workflow/src/transport.rs

//! 传输层
//!
//! 协调器通过 [`Transport`] 与工作节点做同步请求/响应调用。
//! 超时只让本次尝试失败，不会中止节点上正在进行的计算。

use crate::protocol::{read_frame, write_frame, WorkerFailure, WorkerRequest, WorkerResponse};
use crate::worker::Worker;
use std::io::{self, BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// 传输错误
#[derive(Debug, Error)]
pub enum TransportError {
    /// 调用超时
    #[error("Call to {endpoint} timed out after {timeout:?}")]
    Timeout {
        /// 端点
        endpoint: String,
        /// 超时时长
        timeout: Duration,
    },

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// 编解码错误
    #[error("Codec error: {0}")]
    Codec(String),

    /// 工作节点报告失败
    #[error("Worker failure: {0}")]
    Remote(WorkerFailure),

    /// 端点无法解析或已断开
    #[error("Endpoint unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    fn timed_out(self, endpoint: &str, timeout: Duration) -> Self {
        match self {
            Self::Io(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Self::Timeout {
                    endpoint: endpoint.to_string(),
                    timeout,
                }
            }
            other => other,
        }
    }
}

/// 工作节点传输
pub trait Transport: Send + Sync {
    /// 端点名
    fn endpoint(&self) -> &str;

    /// 同步调用
    fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse, TransportError>;

    /// 健康检查
    fn ping(&self) -> Result<(), TransportError> {
        match self.call(&WorkerRequest::Ping)? {
            WorkerResponse::Pong => Ok(()),
            other => Err(TransportError::Codec(format!("unexpected reply to Ping: {other:?}"))),
        }
    }
}

/// TCP 传输：每次调用一个连接
#[derive(Debug, Clone)]
pub struct TcpTransport {
    endpoint: String,
    timeout: Duration,
}

impl TcpTransport {
    /// 创建传输（`host:port`）
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    fn exchange(&self, request: &WorkerRequest) -> Result<WorkerResponse, TransportError> {
        let addr = self
            .endpoint
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::Unavailable(self.endpoint.clone()))?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        write_frame(&mut BufWriter::new(&stream), request)?;
        read_frame(&mut BufReader::new(&stream))
    }
}

impl Transport for TcpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse, TransportError> {
        self.exchange(request)
            .map_err(|e| e.timed_out(&self.endpoint, self.timeout))
    }
}

/// 进程内传输：在独立线程中调用本地工作节点
#[derive(Debug, Clone)]
pub struct LocalTransport {
    name: String,
    worker: Arc<Worker>,
    timeout: Duration,
}

impl LocalTransport {
    /// 创建进程内传输
    pub fn new(name: impl Into<String>, worker: Arc<Worker>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            worker,
            timeout,
        }
    }
}

impl Transport for LocalTransport {
    fn endpoint(&self) -> &str {
        &self.name
    }

    fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse, TransportError> {
        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(&self.worker);
        let request = request.clone();
        thread::spawn(move || {
            let _ = tx.send(worker.handle(&request));
        });
        rx.recv_timeout(self.timeout).map_err(|e| match e {
            mpsc::RecvTimeoutError::Timeout => TransportError::Timeout {
                endpoint: self.name.clone(),
                timeout: self.timeout,
            },
            mpsc::RecvTimeoutError::Disconnected => TransportError::Unavailable(self.name.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerServer;
    use am_physics::LinearChemistry;
    use std::net::TcpListener;

    fn worker() -> Arc<Worker> {
        Arc::new(Worker::new(Arc::new(LinearChemistry::default())))
    }

    #[test]
    fn test_local_ping() {
        let t = LocalTransport::new("local", worker(), Duration::from_secs(5));
        t.ping().unwrap();
        assert_eq!(t.endpoint(), "local");
    }

    #[test]
    fn test_tcp_ping() {
        let server = WorkerServer::bind("127.0.0.1:0", worker()).unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || server.serve());
        let t = TcpTransport::new(addr.to_string(), Duration::from_secs(5));
        t.ping().unwrap();
        t.ping().unwrap();
    }

    #[test]
    fn test_tcp_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(2));
        });
        let t = TcpTransport::new(addr.to_string(), Duration::from_millis(100));
        assert!(matches!(t.ping(), Err(TransportError::Timeout { .. })));
    }

    #[test]
    fn test_unreachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let t = TcpTransport::new(addr.to_string(), Duration::from_millis(500));
        assert!(t.ping().is_err());
    }
}
