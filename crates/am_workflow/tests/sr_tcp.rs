// crates/am_workflow/tests/sr_tcp.rs

//! 经 TCP 工作节点的完整构建

mod common;

use am_workflow::{Coordinator, TcpTransport, Transport, WorkerServer};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn tcp_workers_match_local_build() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::config_in(dir.path());
    config.sr.end = 4;

    let mut transports: Vec<Arc<dyn Transport>> = Vec::new();
    for _ in 0..2 {
        let server = WorkerServer::bind("127.0.0.1:0", common::worker()).unwrap();
        let addr = server.local_addr().unwrap();
        std::thread::spawn(move || server.serve());
        transports.push(Arc::new(TcpTransport::new(addr.to_string(), Duration::from_secs(120))));
    }
    let remote = Coordinator::new(config.clone(), common::worker(), transports).unwrap();
    for (endpoint, status) in remote.ping_all() {
        assert!(status.is_ok(), "{endpoint} 不可达");
    }
    let over_tcp = remote.build().unwrap();

    let local_dir = tempfile::tempdir().unwrap();
    let mut local_config = config.clone();
    local_config.sr.log_dir = local_dir.path().join("log");
    local_config.sr.output_file = local_dir.path().join("sr.bin");
    let worker = common::worker();
    let local = Coordinator::new(
        local_config,
        Arc::clone(&worker),
        vec![Arc::new(common::local("local", &worker)) as Arc<dyn Transport>],
    )
    .unwrap()
    .build()
    .unwrap();

    assert_eq!(over_tcp.len(), 8);
    assert_eq!(over_tcp, local);
}
