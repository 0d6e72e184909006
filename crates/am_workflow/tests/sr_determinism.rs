// crates/am_workflow/tests/sr_determinism.rs

//! 串行与并行构建得到完全相同的 SR 矩阵

mod common;

use am_workflow::{Coordinator, SrMatrix, Transport};
use std::sync::Arc;

#[test]
fn serial_and_parallel_builds_are_identical() {
    let serial_dir = tempfile::tempdir().unwrap();
    let config = common::config_in(serial_dir.path());
    let worker = common::worker();
    let serial = Coordinator::new(
        config.clone(),
        Arc::clone(&worker),
        vec![Arc::new(common::local("w0", &worker)) as Arc<dyn Transport>],
    )
    .unwrap()
    .build()
    .unwrap();

    let parallel_dir = tempfile::tempdir().unwrap();
    let mut parallel_config = common::config_in(parallel_dir.path());
    parallel_config.sr.inputs_file = config.sr.inputs_file.clone();
    let transports: Vec<Arc<dyn Transport>> = (0..3)
        .map(|i| Arc::new(common::local(&format!("w{i}"), &common::worker())) as Arc<dyn Transport>)
        .collect();
    let coordinator = Coordinator::new(parallel_config.clone(), common::worker(), transports).unwrap();
    let parallel = coordinator.build().unwrap();

    assert_eq!(serial.len(), 12);
    assert_eq!(serial.receptors(), 22);
    assert_eq!(serial, parallel);

    // 并行构建分为 2 层 × 3 块
    assert_eq!(coordinator.log().completed_chunks().unwrap().len(), 6);

    let saved = SrMatrix::load_from_file(&parallel_config.sr.output_file).unwrap();
    assert_eq!(saved, parallel);
}

#[test]
fn source_row_peaks_near_its_own_cell() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::config_in(dir.path());
    config.sr.layers = vec![0];
    let worker = common::worker();
    let matrix = Coordinator::from_config(config, Arc::clone(&worker))
        .unwrap()
        .build()
        .unwrap();

    for row in 0..6 {
        let pm = matrix.species_row(0, row, "PrimaryPM25").unwrap();
        assert!(pm[row] > 0.0);
        assert!(pm.iter().all(|&c| c >= 0.0 && c <= pm[row]));
    }
}
