// crates/am_workflow/tests/common/mod.rs

//! SR 测试夹具

#![allow(dead_code)]

use am_config::AirMeshConfig;
use am_grid::synthetic::SyntheticScenario;
use am_physics::LinearChemistry;
use am_workflow::{LocalTransport, Transport, TransportError, Worker, WorkerRequest, WorkerResponse};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 在 `dir` 下写入静态输入，返回指向该目录的配置
pub fn config_in(dir: &Path) -> AirMeshConfig {
    let scenario = SyntheticScenario::small();
    let inputs = dir.join("inputs.bin");
    scenario.inputs().unwrap().save_to_file(&inputs).unwrap();

    let mut config = AirMeshConfig {
        grid: scenario.config.clone(),
        ..AirMeshConfig::default()
    };
    config.simulation.num_iterations = 2;
    config.sr.inputs_file = inputs;
    config.sr.log_dir = dir.join("log");
    config.sr.output_file = dir.join("sr.bin");
    config.sr.layers = vec![0, 1];
    config.sr.begin = 0;
    config.sr.end = 6;
    config.sr.timeout_secs = 120;
    config.sr.backoff_base_ms = 1;
    config.sr.backoff_max_ms = 4;
    config
}

pub fn worker() -> Arc<Worker> {
    Arc::new(Worker::new(Arc::new(LinearChemistry::default())))
}

pub fn local(name: &str, worker: &Arc<Worker>) -> LocalTransport {
    LocalTransport::new(name, Arc::clone(worker), Duration::from_secs(120))
}

/// 计数并按条件注入失败的传输
pub struct Scripted<F> {
    inner: LocalTransport,
    pub calls: AtomicUsize,
    fail_when: F,
}

impl<F> Scripted<F>
where
    F: Fn(usize, &WorkerRequest) -> bool + Send + Sync,
{
    pub fn new(inner: LocalTransport, fail_when: F) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_when,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> Transport for Scripted<F>
where
    F: Fn(usize, &WorkerRequest) -> bool + Send + Sync,
{
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if (self.fail_when)(n, request) {
            return Err(TransportError::Timeout {
                endpoint: self.endpoint().to_string(),
                timeout: Duration::from_millis(1),
            });
        }
        self.inner.call(request)
    }
}
