// crates/am_physics/src/pipeline.rs

//! 模拟流水线
//!
//! 流水线持有模拟域与两组阶段：
//! - init：构建前按顺序执行一次
//! - run：按顺序反复执行，每轮结束后 `time += dt`
//!
//! 任一阶段返回 [`StageSignal::Converged`] 时，本轮剩余阶段照常执行，
//! 随后结束循环；也可设置硬性迭代上限。

use am_config::AirMeshConfig;
use am_foundation::{AmError, AmResult};
use am_grid::Domain;
use serde::{Deserialize, Serialize};

/// 阶段返回信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSignal {
    /// 继续
    Continue,
    /// 已收敛，结束运行
    Converged,
}

/// 流水线阶段
pub trait Stage: Send {
    /// 阶段名称
    fn name(&self) -> &str;

    /// 执行阶段
    fn apply(&mut self, domain: &mut Domain, config: &AirMeshConfig) -> AmResult<StageSignal>;
}

// ============================================================================
// 周期执行
// ============================================================================

/// 周期门控：距上次执行的模拟时间达到间隔时才执行内部阶段
pub struct Periodic {
    interval: f64,
    last_run: f64,
    name: String,
    inner: Box<dyn Stage>,
}

impl Periodic {
    /// 包装阶段
    pub fn new(interval: f64, inner: impl Stage + 'static) -> Self {
        let name = format!("Periodic({})", inner.name());
        Self {
            interval,
            last_run: 0.0,
            name,
            inner: Box::new(inner),
        }
    }
}

impl Stage for Periodic {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&mut self, domain: &mut Domain, config: &AirMeshConfig) -> AmResult<StageSignal> {
        if domain.time - self.last_run < self.interval {
            return Ok(StageSignal::Continue);
        }
        self.last_run = domain.time;
        self.inner.apply(domain, config)
    }
}

// ============================================================================
// 流水线
// ============================================================================

/// 结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// 收敛判据触发
    Converged,
    /// 达到迭代上限
    IterationLimit,
}

/// 运行摘要
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// 执行的迭代数
    pub iterations: u64,
    /// 结束时的模拟时间 [s]
    pub time: f64,
    /// 结束原因
    pub termination: Termination,
}

/// 模拟流水线
pub struct Pipeline {
    domain: Domain,
    init: Vec<Box<dyn Stage>>,
    run: Vec<Box<dyn Stage>>,
    max_iterations: Option<u64>,
    initialized: bool,
}

impl Pipeline {
    /// 创建流水线
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            init: Vec::new(),
            run: Vec::new(),
            max_iterations: None,
            initialized: false,
        }
    }

    /// 追加 init 阶段
    pub fn with_init(mut self, stage: impl Stage + 'static) -> Self {
        self.init.push(Box::new(stage));
        self
    }

    /// 追加 run 阶段
    pub fn with_run(mut self, stage: impl Stage + 'static) -> Self {
        self.run.push(Box::new(stage));
        self
    }

    /// 设置迭代上限
    pub fn with_max_iterations(mut self, max: Option<u64>) -> Self {
        self.max_iterations = max;
        self
    }

    /// 模拟域
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// 取出模拟域
    pub fn into_domain(self) -> Domain {
        self.domain
    }

    /// 阶段名称（init, run）
    pub fn stage_names(&self) -> (Vec<&str>, Vec<&str>) {
        (
            self.init.iter().map(|s| s.name()).collect(),
            self.run.iter().map(|s| s.name()).collect(),
        )
    }

    /// 执行全部 init 阶段（只执行一次）
    pub fn init(&mut self, config: &AirMeshConfig) -> AmResult<()> {
        if self.initialized {
            return Err(AmError::internal("流水线已初始化"));
        }
        for stage in &mut self.init {
            log::debug!("init 阶段: {}", stage.name());
            stage.apply(&mut self.domain, config)?;
        }
        self.initialized = true;
        Ok(())
    }

    /// 反复执行 run 阶段直到收敛或达到迭代上限
    pub fn run(&mut self, config: &AirMeshConfig) -> AmResult<RunSummary> {
        if !self.initialized {
            self.init(config)?;
        }
        if self.max_iterations.is_none() && self.run.is_empty() {
            return Err(AmError::invalid_input("没有 run 阶段也没有迭代上限，流水线无法结束"));
        }

        let mut iterations = 0u64;
        let termination = loop {
            if self.max_iterations.map_or(false, |max| iterations >= max) {
                break Termination::IterationLimit;
            }
            let mut converged = false;
            for stage in &mut self.run {
                if stage.apply(&mut self.domain, config)? == StageSignal::Converged {
                    converged = true;
                }
            }
            self.domain.time += self.domain.dt;
            iterations += 1;
            if converged {
                break Termination::Converged;
            }
        };

        let summary = RunSummary {
            iterations,
            time: self.domain.time,
            termination,
        };
        log::info!(
            "运行结束: {} 次迭代, t={:.0}s, {:?}, {} 个单元",
            summary.iterations,
            summary.time,
            summary.termination,
            self.domain.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_grid::{GridCriteria, SpeciesClass, SpeciesSet};
    use std::sync::Arc;

    fn empty_domain() -> Domain {
        let species = Arc::new(SpeciesSet::new(&[("A", SpeciesClass::Gas)], &[]).unwrap());
        Domain::new(1, species, Vec::new(), Vec::new(), GridCriteria { pop_conc_threshold: 1.0 })
    }

    struct SetDt(f64);

    impl Stage for SetDt {
        fn name(&self) -> &str {
            "SetDt"
        }
        fn apply(&mut self, domain: &mut Domain, _: &AirMeshConfig) -> AmResult<StageSignal> {
            domain.dt = self.0;
            Ok(StageSignal::Continue)
        }
    }

    struct Counter(Arc<std::sync::atomic::AtomicUsize>);

    impl Stage for Counter {
        fn name(&self) -> &str {
            "Counter"
        }
        fn apply(&mut self, _: &mut Domain, _: &AirMeshConfig) -> AmResult<StageSignal> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(StageSignal::Continue)
        }
    }

    #[test]
    fn test_iteration_limit_and_time_advance() {
        let config = AirMeshConfig::default();
        let mut p = Pipeline::new(empty_domain())
            .with_init(SetDt(10.0))
            .with_run(SetDt(10.0))
            .with_max_iterations(Some(5));
        let summary = p.run(&config).unwrap();
        assert_eq!(summary.iterations, 5);
        assert_eq!(summary.termination, Termination::IterationLimit);
        assert_eq!(p.domain().time, 50.0);
    }

    #[test]
    fn test_periodic_gating() {
        let config = AirMeshConfig::default();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut p = Pipeline::new(empty_domain())
            .with_init(SetDt(10.0))
            .with_run(Periodic::new(30.0, Counter(Arc::clone(&count))))
            .with_max_iterations(Some(10));
        p.run(&config).unwrap();
        // t = 30, 60, 90
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn test_init_runs_once() {
        let config = AirMeshConfig::default();
        let mut p = Pipeline::new(empty_domain()).with_max_iterations(Some(1));
        p.init(&config).unwrap();
        assert!(p.init(&config).is_err());
        p.run(&config).unwrap();
    }
}
