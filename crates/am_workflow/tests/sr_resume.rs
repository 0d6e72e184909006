// crates/am_workflow/tests/sr_resume.rs

//! 断点续算与重试

mod common;

use am_workflow::{ChunkSpec, Coordinator, Transport, WorkerRequest, WorkflowError};
use std::sync::Arc;

#[test]
fn restart_dispatches_only_missing_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    let worker = common::worker();

    let transports: Vec<Arc<dyn Transport>> = vec![
        Arc::new(common::local("a", &worker)),
        Arc::new(common::local("b", &worker)),
    ];
    let coordinator = Coordinator::new(config.clone(), Arc::clone(&worker), transports).unwrap();
    let full = coordinator.build().unwrap();
    let chunks = coordinator.log().completed_chunks().unwrap();
    assert_eq!(chunks.len(), 4);

    // 删除两个不相邻分块的完成标记
    let lost = [
        ChunkSpec { layer: 0, begin: 0, end: 3 },
        ChunkSpec { layer: 1, begin: 3, end: 6 },
    ];
    for chunk in &lost {
        assert!(chunks.contains(chunk));
        std::fs::remove_file(coordinator.log().done_path(chunk)).unwrap();
    }

    let counting = Arc::new(common::Scripted::new(common::local("c", &worker), |_, _| false));
    let restarted = Coordinator::new(config, Arc::clone(&worker), vec![counting.clone() as Arc<dyn Transport>])
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(counting.calls(), lost.len());
    assert_eq!(restarted, full);
}

#[test]
fn failed_attempts_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    let worker = common::worker();

    // 前两次调用失败，第三次尝试成功
    let flaky = Arc::new(common::Scripted::new(common::local("flaky", &worker), |n, _| n < 2));
    let coordinator = Coordinator::new(config.clone(), Arc::clone(&worker), vec![flaky.clone() as Arc<dyn Transport>]).unwrap();

    let retries = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&retries);
    coordinator.events().add_fn_listener("retries", move |e| {
        if e.name() == "ChunkRetried" {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let matrix = coordinator.build().unwrap();
    assert_eq!(matrix.len(), 12);
    assert_eq!(retries.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(flaky.calls(), 2 + 2);

    let progress = std::fs::read_to_string(config.sr.log_dir.join("progress.log")).unwrap();
    assert!(progress.contains("requeued"));
}

#[test]
fn exhausted_chunks_fail_after_others_finish() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::config_in(dir.path());
    config.sr.max_attempts = 2;
    let worker = common::worker();

    // 第 1 层的分块永远失败
    let broken = Arc::new(common::Scripted::new(common::local("broken", &worker), |_, req| {
        matches!(req, WorkerRequest::Compute(c) if c.chunk.layer == 1)
    }));
    let coordinator = Coordinator::new(config.clone(), Arc::clone(&worker), vec![broken.clone() as Arc<dyn Transport>]).unwrap();

    match coordinator.build() {
        Err(WorkflowError::ChunkFailed { failed, .. }) => assert_eq!(failed, 1),
        other => panic!("期望 ChunkFailed: {other:?}"),
    }
    assert_eq!(broken.calls(), 1 + 2);
    assert_eq!(
        coordinator.log().completed_chunks().unwrap(),
        vec![ChunkSpec { layer: 0, begin: 0, end: 6 }]
    );
    assert!(!config.sr.output_file.exists());
}
