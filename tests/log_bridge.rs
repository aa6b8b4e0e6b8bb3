//! 传输层日志桥接的集成测试。
//! Integration test for the transport log bridge.

pub mod common;

use common::harness::{WAIT, init_tracing};
use std::{io::Write, sync::Arc};
use zk_session::{
    Client, ClientConfig, logging::TransportLogBridge, transport::MemoryTransport,
};

#[test]
fn test_transport_log_lines_are_forwarded_until_shutdown() {
    init_tracing();
    let bridge = TransportLogBridge::start().unwrap();
    let transport = MemoryTransport::new().with_log_sink(bridge.sink());
    let client = Client::new(Arc::new(transport.clone()), ClientConfig::default()).unwrap();

    client.connect(Some(WAIT)).unwrap();
    client.stop();

    let mut late = bridge.sink();
    // One line on open, one on close.
    assert_eq!(bridge.shutdown(), 2);
    assert!(late.write_all(b"0:ZOO_INFO@after shutdown\n").is_err());
}
