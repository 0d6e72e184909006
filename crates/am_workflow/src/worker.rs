// crates/am_workflow/src/worker.rs

//! 工作节点
//!
//! 每个源行运行一次流水线：在地面单元 r 的形心、排放层 L 放置各排放物种
//! 1 μg/s 的单位排放，从缓存的静态网格出发迭代，记录地面层各物种的 `cf`。
//! SR 计算始终使用静态网格，保证所有源行共享同一组受体单元。

use crate::job::SrRow;
use crate::protocol::{read_frame, write_frame, ComputeRequest, FailureKind, WorkerFailure, WorkerRequest, WorkerResponse};
use crate::transport::TransportError;
use am_config::{AirMeshConfig, EmissionUnits, VarGridConfig};
use am_foundation::{AmError, AmResult};
use am_geo::{Geometry, Point2D};
use am_grid::{Domain, EmisRecord, Emissions, SpeciesSet, StaticInputs};
use am_physics::{Mechanism, Simulation};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// 静态网格概要
#[derive(Debug, Clone, PartialEq)]
pub struct GridSummary {
    /// 地面单元数（源行数与受体数）
    pub ground_cells: usize,
    /// 层数
    pub nlayers: usize,
    /// 物种名
    pub species: Vec<String>,
}

#[derive(Debug)]
struct Cached {
    inputs: Arc<StaticInputs>,
    base: Option<(VarGridConfig, Arc<Domain>)>,
}

/// SR 工作节点
#[derive(Debug)]
pub struct Worker {
    mechanism: Arc<dyn Mechanism>,
    cache: Mutex<HashMap<PathBuf, Cached>>,
}

impl Worker {
    /// 创建工作节点
    pub fn new(mechanism: Arc<dyn Mechanism>) -> Self {
        Self {
            mechanism,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 处理一个请求
    pub fn handle(&self, request: &WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::Ping => WorkerResponse::Pong,
            WorkerRequest::Compute(req) => match self.compute(req) {
                Ok(rows) => WorkerResponse::Rows {
                    request_id: req.request_id,
                    rows,
                },
                Err(failure) => {
                    tracing::warn!("分块 {} 失败: {}", req.chunk, failure);
                    WorkerResponse::Failure(failure)
                }
            },
        }
    }

    /// SR 计算专用配置：强制静态网格
    fn sr_config(config: &AirMeshConfig) -> AirMeshConfig {
        let mut config = config.clone();
        config.simulation.static_grid = true;
        config
    }

    fn simulation(&self, inputs: Arc<StaticInputs>, config: &AirMeshConfig) -> AmResult<Simulation> {
        Simulation::new(
            Self::sr_config(config),
            inputs,
            Arc::new(Emissions::new()),
            Arc::clone(&self.mechanism),
        )
    }

    /// 取缓存的静态输入；未缓存时在锁外加载
    fn inputs(&self, path: &Path) -> AmResult<Arc<StaticInputs>> {
        if let Some(entry) = self.cache.lock().get(path) {
            return Ok(Arc::clone(&entry.inputs));
        }
        let started = Instant::now();
        let inputs = StaticInputs::load_from_file(path)?;
        inputs.validate()?;
        tracing::info!("已加载静态输入 {} ({:.2?})", path.display(), started.elapsed());
        let mut cache = self.cache.lock();
        let entry = cache.entry(path.to_path_buf()).or_insert_with(|| Cached {
            inputs: Arc::new(inputs),
            base: None,
        });
        Ok(Arc::clone(&entry.inputs))
    }

    /// 加载（或取缓存的）静态输入与静态网格
    ///
    /// 缓存锁只在查表与写回时持有，加载与建网格在锁外进行。
    fn prepare(&self, path: &Path, config: &AirMeshConfig) -> AmResult<(Simulation, Arc<Domain>)> {
        let inputs = self.inputs(path)?;
        let simulation = self.simulation(Arc::clone(&inputs), config)?;
        let cached = self.cache.lock().get(path).and_then(|entry| match &entry.base {
            Some((grid, base)) if *grid == config.grid && Arc::ptr_eq(&entry.inputs, &inputs) => Some(Arc::clone(base)),
            _ => None,
        });
        if let Some(base) = cached {
            return Ok((simulation, base));
        }

        let base = Arc::new(simulation.static_grid()?);
        tracing::info!("静态网格: {:?} 个单元/层", base.layer_counts());
        if let Some(entry) = self.cache.lock().get_mut(path) {
            if Arc::ptr_eq(&entry.inputs, &inputs) {
                entry.base = Some((config.grid.clone(), Arc::clone(&base)));
            }
        }
        Ok((simulation, base))
    }

    /// 静态网格概要
    pub fn describe(&self, inputs_path: &Path, config: &AirMeshConfig) -> AmResult<GridSummary> {
        let (simulation, base) = self.prepare(inputs_path, config)?;
        Ok(GridSummary {
            ground_cells: base.cells_in_layer(0).len(),
            nlayers: base.nlayers(),
            species: simulation.species().names().to_vec(),
        })
    }

    /// 计算一个分块
    pub fn compute(&self, request: &ComputeRequest) -> Result<Vec<SrRow>, WorkerFailure> {
        let input_failure = |e: AmError| WorkerFailure {
            kind: FailureKind::Input,
            message: e.to_string(),
        };
        let (simulation, base) = self
            .prepare(&request.inputs_path, &request.config)
            .map_err(input_failure)?;

        let chunk = request.chunk;
        let ground = base.cells_in_layer(0);
        if chunk.end > ground.len() || chunk.layer >= base.nlayers() {
            return Err(input_failure(AmError::invalid_input(format!(
                "分块 {chunk} 超出网格: {} 个地面单元, {} 层",
                ground.len(),
                base.nlayers()
            ))));
        }

        let started = Instant::now();
        let mut rows = Vec::with_capacity(chunk.len());
        for row in chunk.rows() {
            let center = base.get(ground[row]).map_err(input_failure)?.center();
            let values = source_row(&simulation, &base, center, chunk.layer).map_err(|e| WorkerFailure {
                kind: FailureKind::Compute,
                message: format!("行 {row}: {e}"),
            })?;
            rows.push(SrRow {
                layer: chunk.layer,
                row,
                values,
            });
            tracing::debug!("源行 L{} #{} 完成", chunk.layer, row);
        }
        tracing::info!("分块 {} 完成 ({:.2?})", chunk, started.elapsed());
        Ok(rows)
    }
}

/// 单位排放：每个排放物种 1 μg/s
fn unit_emissions(species: &SpeciesSet, at: Point2D, layer: usize) -> AmResult<Emissions> {
    let rates: Vec<(&str, f64)> = species.emission_names().map(|name| (name, 1.0)).collect();
    let record = EmisRecord::new(Geometry::Point(at), rates, EmissionUnits::UgPerSecond)?.with_layer(layer);
    Ok(Emissions::from_records(vec![record]))
}

fn source_row(simulation: &Simulation, base: &Domain, at: Point2D, layer: usize) -> AmResult<Vec<Vec<f64>>> {
    let emissions = unit_emissions(simulation.species(), at, layer)?;
    let run = simulation.with_emissions(Arc::new(emissions))?;
    let pipeline = run.pipeline_on(base.clone())?;
    let (domain, _) = run.run_pipeline(pipeline)?;

    let ground = domain.cells_in_layer(0);
    (0..domain.species().len())
        .map(|s| {
            ground
                .iter()
                .map(|&id| Ok(domain.get(id)?.cf[s]))
                .collect::<AmResult<Vec<f64>>>()
        })
        .collect()
}

// ============================================================
// TCP 服务
// ============================================================

/// 工作节点 TCP 服务：每个连接处理一帧请求
#[derive(Debug)]
pub struct WorkerServer {
    listener: TcpListener,
    worker: Arc<Worker>,
}

impl WorkerServer {
    /// 绑定地址
    pub fn bind(addr: impl ToSocketAddrs, worker: Arc<Worker>) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            worker,
        })
    }

    /// 实际监听地址
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 持续接受连接
    pub fn serve(&self) -> io::Result<()> {
        tracing::info!("工作节点监听 {}", self.local_addr()?);
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let worker = Arc::clone(&self.worker);
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &worker) {
                            tracing::warn!("连接处理失败: {}", e);
                        }
                    });
                }
                Err(e) => tracing::warn!("接受连接失败: {}", e),
            }
        }
        Ok(())
    }
}

fn handle_connection(stream: TcpStream, worker: &Worker) -> Result<(), TransportError> {
    let request: WorkerRequest = read_frame(&mut BufReader::new(&stream))?;
    let response = worker.handle(&request);
    write_frame(&mut BufWriter::new(&stream), &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ChunkSpec, JobId};
    use am_grid::synthetic::SyntheticScenario;
    use am_physics::LinearChemistry;

    fn setup() -> (tempfile::TempDir, PathBuf, AirMeshConfig) {
        let dir = tempfile::tempdir().unwrap();
        let scenario = SyntheticScenario::small();
        let path = dir.path().join("inputs.bin");
        scenario.inputs().unwrap().save_to_file(&path).unwrap();
        let mut config = AirMeshConfig {
            grid: scenario.config.clone(),
            ..AirMeshConfig::default()
        };
        config.simulation.num_iterations = 2;
        (dir, path, config)
    }

    fn request(path: &Path, config: &AirMeshConfig, chunk: ChunkSpec) -> ComputeRequest {
        ComputeRequest {
            request_id: JobId::new(),
            chunk,
            inputs_path: path.to_path_buf(),
            config: config.clone(),
        }
    }

    #[test]
    fn test_describe_static_grid() {
        let (_dir, path, config) = setup();
        let worker = Worker::new(Arc::new(LinearChemistry::default()));
        let summary = worker.describe(&path, &config).unwrap();
        assert_eq!(summary.nlayers, 3);
        assert_eq!(summary.ground_cells, 22);
        assert_eq!(summary.species.len(), 9);
    }

    #[test]
    fn test_compute_rows() {
        let (_dir, path, config) = setup();
        let worker = Worker::new(Arc::new(LinearChemistry::default()));
        let chunk = ChunkSpec { layer: 0, begin: 3, end: 5 };
        let rows = worker.compute(&request(&path, &config, chunk)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 3);
        assert_eq!(rows[1].row, 4);
        for row in &rows {
            assert_eq!(row.values.len(), 9);
            assert!(row.values.iter().all(|v| v.len() == 22));
            // 一次 PM2.5 在源单元处为正
            let pm = row.values[8][row.row];
            assert!(pm > 0.0);
        }
    }

    #[test]
    fn test_out_of_range_chunk_is_input_failure() {
        let (_dir, path, config) = setup();
        let worker = Worker::new(Arc::new(LinearChemistry::default()));
        let chunk = ChunkSpec { layer: 0, begin: 20, end: 30 };
        let failure = worker.compute(&request(&path, &config, chunk)).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Input);

        let missing = request(&path.with_file_name("missing.bin"), &config, ChunkSpec { layer: 0, begin: 0, end: 1 });
        match worker.handle(&WorkerRequest::Compute(missing)) {
            WorkerResponse::Failure(f) => assert_eq!(f.kind, FailureKind::Input),
            other => panic!("期望失败响应: {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_prepare_shares_cache() {
        let (_dir, path, config) = setup();
        let worker = Worker::new(Arc::new(LinearChemistry::default()));
        let summaries: Vec<GridSummary> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| worker.describe(&path, &config).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(summaries.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(worker.cache.lock().len(), 1);

        // 缓存命中时复用同一静态网格；网格配置变化时重建
        let (_, first) = worker.prepare(&path, &config).unwrap();
        let (_, again) = worker.prepare(&path, &config).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        let mut coarse = config.clone();
        coarse.grid.hi_res_layers = 0;
        let (_, rebuilt) = worker.prepare(&path, &coarse).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.layer_counts(), vec![16, 16, 16]);
    }
}
