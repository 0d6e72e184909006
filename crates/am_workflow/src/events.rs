// crates/am_workflow/src/events.rs

//! 事件系统模块
//!
//! SR 构建进度事件的定义和分发。

use crate::job::{ChunkSpec, JobId};
use crate::storage::ChunkLog;
use parking_lot::RwLock;
use std::sync::Arc;

/// 工作流事件
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// 构建开始
    BuildStarted {
        /// 任务ID
        job_id: JobId,
        /// 待分发分块数
        chunks: usize,
        /// 从日志恢复的源行数
        resumed_rows: usize,
        /// 端点数
        endpoints: usize,
    },
    /// 分块已分发
    ChunkDispatched {
        /// 任务ID
        job_id: JobId,
        /// 分块
        chunk: ChunkSpec,
        /// 端点
        endpoint: String,
        /// 第几次尝试（从 1 开始）
        attempt: u32,
    },
    /// 分块完成
    ChunkCompleted {
        /// 任务ID
        job_id: JobId,
        /// 分块
        chunk: ChunkSpec,
        /// 端点
        endpoint: String,
        /// 耗时 (秒)
        duration_secs: f64,
    },
    /// 分块失败，已重新入队
    ChunkRetried {
        /// 任务ID
        job_id: JobId,
        /// 分块
        chunk: ChunkSpec,
        /// 端点
        endpoint: String,
        /// 已尝试次数
        attempt: u32,
        /// 错误信息
        error: String,
    },
    /// 分块重试耗尽
    ChunkFailed {
        /// 任务ID
        job_id: JobId,
        /// 分块
        chunk: ChunkSpec,
        /// 错误信息
        error: String,
    },
    /// 构建完成
    BuildCompleted {
        /// 任务ID
        job_id: JobId,
        /// 矩阵行数
        rows: usize,
        /// 运行时长 (秒)
        duration_secs: f64,
    },
}

impl WorkflowEvent {
    /// 获取事件对应的任务ID
    pub fn job_id(&self) -> JobId {
        match self {
            Self::BuildStarted { job_id, .. }
            | Self::ChunkDispatched { job_id, .. }
            | Self::ChunkCompleted { job_id, .. }
            | Self::ChunkRetried { job_id, .. }
            | Self::ChunkFailed { job_id, .. }
            | Self::BuildCompleted { job_id, .. } => *job_id,
        }
    }

    /// 获取事件名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuildStarted { .. } => "BuildStarted",
            Self::ChunkDispatched { .. } => "ChunkDispatched",
            Self::ChunkCompleted { .. } => "ChunkCompleted",
            Self::ChunkRetried { .. } => "ChunkRetried",
            Self::ChunkFailed { .. } => "ChunkFailed",
            Self::BuildCompleted { .. } => "BuildCompleted",
        }
    }
}

impl std::fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuildStarted {
                job_id,
                chunks,
                resumed_rows,
                endpoints,
            } => write!(
                f,
                "build {job_id} started: {chunks} chunks on {endpoints} endpoints, {resumed_rows} rows resumed"
            ),
            Self::ChunkDispatched {
                chunk,
                endpoint,
                attempt,
                ..
            } => write!(f, "chunk {chunk} -> {endpoint} (attempt {attempt})"),
            Self::ChunkCompleted {
                chunk,
                endpoint,
                duration_secs,
                ..
            } => write!(f, "chunk {chunk} done on {endpoint} in {duration_secs:.2}s"),
            Self::ChunkRetried {
                chunk,
                endpoint,
                attempt,
                error,
                ..
            } => write!(f, "chunk {chunk} failed on {endpoint} (attempt {attempt}), requeued: {error}"),
            Self::ChunkFailed { chunk, error, .. } => write!(f, "chunk {chunk} gave up: {error}"),
            Self::BuildCompleted {
                job_id,
                rows,
                duration_secs,
            } => write!(f, "build {job_id} completed: {rows} rows in {duration_secs:.2}s"),
        }
    }
}

/// 事件监听器trait
pub trait EventListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: &WorkflowEvent);

    /// 获取监听器名称 (用于调试)
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// 函数式事件监听器
pub struct FnListener<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    name: String,
    handler: F,
}

impl<F> FnListener<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    /// 创建函数式监听器
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    fn on_event(&self, event: &WorkflowEvent) {
        (self.handler)(event);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 日志事件监听器
pub struct LoggingListener;

impl EventListener for LoggingListener {
    fn on_event(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::ChunkRetried { .. } | WorkflowEvent::ChunkFailed { .. } => {
                tracing::warn!("{}", event)
            }
            WorkflowEvent::ChunkDispatched { .. } => tracing::debug!("{}", event),
            _ => tracing::info!("{}", event),
        }
    }

    fn name(&self) -> &str {
        "LoggingListener"
    }
}

/// 把事件逐行追加到分块日志目录的 `progress.log`
pub struct ProgressListener {
    log: Arc<ChunkLog>,
}

impl ProgressListener {
    /// 创建进度监听器
    pub fn new(log: Arc<ChunkLog>) -> Self {
        Self { log }
    }
}

impl EventListener for ProgressListener {
    fn on_event(&self, event: &WorkflowEvent) {
        if let Err(e) = self.log.append_progress(&event.to_string()) {
            tracing::warn!("写入进度日志失败: {}", e);
        }
    }

    fn name(&self) -> &str {
        "ProgressListener"
    }
}

/// 事件分发器
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    /// 创建新的事件分发器
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// 添加监听器
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        let name = listener.name().to_string();
        self.listeners.write().push(listener);
        tracing::debug!("Added event listener: {}", name);
    }

    /// 添加函数式监听器
    pub fn add_fn_listener<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(FnListener::new(name, handler)));
    }

    /// 分发事件
    pub fn emit(&self, event: WorkflowEvent) {
        let listeners = self.listeners.read();
        tracing::trace!("Emitting event: {}", event.name());
        for listener in listeners.iter() {
            listener.on_event(&event);
        }
    }

    /// 获取监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_dispatcher() {
        let dispatcher = EventDispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        dispatcher.add_fn_listener("test", move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        let job_id = JobId::new();
        dispatcher.emit(WorkflowEvent::ChunkDispatched {
            job_id,
            chunk: ChunkSpec { layer: 0, begin: 0, end: 4 },
            endpoint: "local".into(),
            attempt: 1,
        });
        dispatcher.emit(WorkflowEvent::BuildCompleted {
            job_id,
            rows: 4,
            duration_secs: 1.0,
        });

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.listener_count(), 1);
    }

    #[test]
    fn test_progress_listener_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(ChunkLog::open(dir.path()).unwrap());
        let dispatcher = EventDispatcher::new();
        dispatcher.add_listener(Arc::new(ProgressListener::new(Arc::clone(&log))));
        let event = WorkflowEvent::ChunkFailed {
            job_id: JobId::new(),
            chunk: ChunkSpec { layer: 2, begin: 5, end: 9 },
            error: "boom".into(),
        };
        assert_eq!(event.name(), "ChunkFailed");
        dispatcher.emit(event);
        let text = std::fs::read_to_string(dir.path().join(crate::storage::PROGRESS_FILE)).unwrap();
        assert!(text.contains("chunk L2[5..9) gave up: boom"));
    }
}
