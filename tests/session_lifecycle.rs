//! 会话生命周期集成测试：连接、断线、过期、停止与重启。
//! Session lifecycle integration tests: connect, disconnect, expiry, stop and restart.

pub mod common;

use common::harness::{StateRecorder, TestCluster, WAIT};
use std::{
    sync::{Arc, mpsc},
    time::Duration,
};
use zk_session::{
    Client, ClientConfig, ConnectionState, Error,
    handler::{Callback, Event},
    protocol::{EventType, KeeperState, SessionId, WatchedEvent},
    transport::{MemoryTransport, RawEvent},
};

#[test]
fn test_connect_reaches_connected_and_notifies_listeners() {
    let cluster = TestCluster::new();
    let recorder = StateRecorder::attach(&cluster.client);
    assert_eq!(cluster.client.state(), ConnectionState::Lost);
    assert!(!cluster.client.connected());

    cluster.client.connect(Some(WAIT)).unwrap();
    recorder.expect(ConnectionState::Connected);
    assert!(cluster.client.connected());
    assert_eq!(cluster.client.state(), ConnectionState::Connected);
    assert!(cluster.client.client_id().is_some());
    assert!(!cluster.client.connection_timed_out());
}

#[test]
fn test_connect_when_already_connected_is_a_no_op() {
    let cluster = TestCluster::new().connected();
    let handle = cluster.handle();
    assert_eq!(cluster.transport.opened_sessions(), 1);

    assert!(cluster.client.connect_async().unwrap().is_none());
    cluster.client.connect(Some(WAIT)).unwrap();
    assert_eq!(cluster.transport.opened_sessions(), 1);
    assert_eq!(cluster.handle(), handle);
}

#[test]
fn test_expiry_moves_to_lost_and_reconnects() {
    let cluster = TestCluster::new();
    let first = StateRecorder::attach(&cluster.client);
    let second = StateRecorder::attach(&cluster.client);
    let cluster = cluster.connected();
    first.expect(ConnectionState::Connected);
    second.expect(ConnectionState::Connected);
    let expired = cluster.handle();

    assert!(cluster.transport.expire_session(expired));

    for recorder in [&first, &second] {
        recorder.expect(ConnectionState::Lost);
        recorder.expect(ConnectionState::Connected);
    }
    cluster.settle();
    assert!(first.drain().is_empty(), "LOST is reported exactly once");
    assert_eq!(cluster.transport.opened_sessions(), 2);
    assert_ne!(cluster.handle(), expired);
    assert!(cluster.client.connected());
}

#[test]
fn test_stop_from_lost_listener_prevents_reconnect() {
    let cluster = TestCluster::new().connected();
    let client = cluster.client.clone();
    let stopper = cluster.client.add_listener(move |state| {
        if state == ConnectionState::Lost {
            client.stop();
        }
    });
    let recorder = StateRecorder::attach(&cluster.client);

    assert!(cluster.transport.expire_session(cluster.handle()));
    recorder.expect(ConnectionState::Lost);
    cluster.settle();

    assert!(recorder.drain().is_empty());
    assert_eq!(cluster.transport.opened_sessions(), 1);
    assert!(!cluster.client.connected());
    assert!(cluster.client.session_handle().is_none());
    assert_eq!(cluster.client.exists("/", None), Err(Error::Stopped));
    assert!(cluster.client.remove_listener(stopper));
}

#[test]
fn test_stop_while_lost_listeners_run_prevents_reconnect() {
    let cluster = TestCluster::new().connected();
    let (entered_tx, entered_rx) = mpsc::channel();
    let gate = Event::new();
    let release = gate.clone();
    cluster.client.add_listener(move |state| {
        if state == ConnectionState::Lost {
            let _ = entered_tx.send(());
            release.wait(Some(WAIT));
        }
    });

    assert!(cluster.transport.expire_session(cluster.handle()));
    entered_rx.recv_timeout(WAIT).unwrap();
    cluster.client.stop();
    gate.set();
    cluster.settle();

    assert_eq!(cluster.transport.opened_sessions(), 1);
    assert!(!cluster.client.connected());
    assert_eq!(cluster.client.state(), ConnectionState::Lost);
}

#[test]
fn test_stop_before_expiry_is_processed_prevents_reconnect() {
    let cluster = TestCluster::new();
    let recorder = StateRecorder::attach(&cluster.client);
    let cluster = cluster.connected();
    recorder.expect(ConnectionState::Connected);

    // Park the handler so the expiry is delivered but not yet processed.
    let gate = Event::new();
    let hold = gate.clone();
    cluster
        .client
        .handler()
        .dispatch_callback(Callback::session(move || {
            hold.wait(Some(WAIT));
        }));
    assert!(cluster.transport.expire_session(cluster.handle()));
    assert!(cluster.transport.flush(WAIT));

    cluster.client.stop();
    recorder.expect(ConnectionState::Lost);
    gate.set();
    cluster.settle();

    assert!(recorder.drain().is_empty());
    assert_eq!(cluster.transport.opened_sessions(), 1);
    assert!(!cluster.client.connected());
}

#[test]
fn test_auth_failure_is_treated_like_expiry() {
    let cluster = TestCluster::new();
    let recorder = StateRecorder::attach(&cluster.client);
    let cluster = cluster.connected();
    recorder.expect(ConnectionState::Connected);

    assert!(cluster.transport.fail_auth(cluster.handle()));
    recorder.expect(ConnectionState::Lost);
    recorder.expect(ConnectionState::Connected);
    assert_eq!(cluster.transport.opened_sessions(), 2);
}

#[test]
fn test_disconnect_suspends_without_duplicate_notifications() {
    let cluster = TestCluster::new();
    let recorder = StateRecorder::attach(&cluster.client);
    let cluster = cluster.connected();
    recorder.expect(ConnectionState::Connected);
    let handle = cluster.handle();

    assert!(cluster.transport.disconnect(handle));
    recorder.expect(ConnectionState::Suspended);
    assert!(cluster.transport.disconnect(handle));
    cluster.settle();
    assert!(recorder.drain().is_empty());
    assert!(!cluster.client.connected());

    // The session survives a dropped connection, so the handle is kept.
    assert_eq!(cluster.client.get("/", None), Err(Error::ConnectionLoss));
    assert_eq!(cluster.handle(), handle);

    assert!(cluster.transport.reconnect(handle));
    recorder.expect(ConnectionState::Connected);
    assert!(cluster.client.get("/", None).is_ok());
    assert_eq!(cluster.transport.opened_sessions(), 1);
}

#[test]
fn test_events_from_superseded_handle_are_ignored() {
    let cluster = TestCluster::new();
    let recorder = StateRecorder::attach(&cluster.client);
    let cluster = cluster.connected();
    recorder.expect(ConnectionState::Connected);
    let old = cluster.handle();

    cluster.client.restart().unwrap();
    recorder.expect(ConnectionState::Lost);
    recorder.expect(ConnectionState::Connected);
    let current = cluster.handle();
    assert_ne!(old, current);

    assert!(
        cluster
            .transport
            .inject_event(RawEvent::session(old, KeeperState::ExpiredSession))
    );
    cluster.settle();
    assert!(recorder.drain().is_empty());
    assert_eq!(cluster.client.state(), ConnectionState::Connected);
    assert_eq!(cluster.handle(), current);
    assert_eq!(cluster.transport.opened_sessions(), 2);
}

#[test]
fn test_stop_fails_operations_without_reaching_transport() {
    let cluster = TestCluster::new().connected();
    cluster
        .client
        .create("/stopped", "v", None, Default::default())
        .unwrap();

    cluster.client.stop();
    assert_eq!(cluster.client.state(), ConnectionState::Lost);
    assert!(cluster.client.session_handle().is_none());
    assert!(cluster.client.client_id().is_none());

    let submitted = cluster.transport.submitted_requests();
    let pending = cluster.client.get_async("/stopped", None).unwrap();
    assert_eq!(pending.peek(), Some(Err(Error::Stopped)));
    assert_eq!(cluster.client.get("/stopped", None), Err(Error::Stopped));
    assert_eq!(cluster.transport.submitted_requests(), submitted);
}

#[test]
fn test_operations_before_connect_report_stopped() {
    let cluster = TestCluster::new();
    assert_eq!(cluster.client.exists("/", None), Err(Error::Stopped));
    assert_eq!(cluster.transport.submitted_requests(), 0);
}

#[test]
fn test_session_events_after_stop_are_ignored() {
    let cluster = TestCluster::new();
    let recorder = StateRecorder::attach(&cluster.client);
    let cluster = cluster.connected();
    recorder.expect(ConnectionState::Connected);
    let handle = cluster.handle();

    cluster.client.stop();
    recorder.expect(ConnectionState::Lost);
    cluster
        .transport
        .inject_event(RawEvent::session(handle, KeeperState::Connected));
    cluster.settle();
    assert!(recorder.drain().is_empty());
    assert!(!cluster.client.connected());
}

#[test]
fn test_restart_after_stop_reconnects() {
    let cluster = TestCluster::new().connected();
    cluster.client.stop();
    cluster.client.restart().unwrap();
    assert!(cluster.client.connected());
    assert!(cluster.client.exists("/", None).unwrap().is_some());
}

#[test]
fn test_connect_timeout_sets_flag_and_keeps_trying() {
    let cluster = TestCluster::new();
    let recorder = StateRecorder::attach(&cluster.client);
    cluster.transport.set_auto_connect(false);

    assert_eq!(
        cluster.client.connect(Some(Duration::from_millis(50))),
        Err(Error::Timeout)
    );
    assert!(cluster.client.connection_timed_out());
    assert!(!cluster.client.connected());
    assert_eq!(cluster.client.exists("/", None), Err(Error::ConnectionLoss));

    assert!(cluster.transport.reconnect(cluster.handle()));
    recorder.expect(ConnectionState::Connected);
    assert!(cluster.client.connected());
}

#[test]
fn test_panicking_listener_does_not_block_others() {
    let cluster = TestCluster::new();
    cluster.client.add_listener(|_| panic!("listener failure"));
    let recorder = StateRecorder::attach(&cluster.client);
    let cluster = cluster.connected();
    recorder.expect(ConnectionState::Connected);

    cluster.transport.disconnect(cluster.handle());
    recorder.expect(ConnectionState::Suspended);
}

#[test]
fn test_removed_listener_stops_receiving() {
    let cluster = TestCluster::new();
    let recorder = StateRecorder::attach(&cluster.client);
    assert!(cluster.client.remove_listener(recorder.id));
    let cluster = cluster.connected();
    cluster.settle();
    assert!(recorder.drain().is_empty());
}

#[test]
fn test_default_watcher_sees_session_events() {
    common::harness::init_tracing();
    let transport = MemoryTransport::new();
    let (tx, rx) = mpsc::channel();
    let client = Client::builder(Arc::new(transport.clone()))
        .watcher(move |event| {
            let _ = tx.send(event);
        })
        .build()
        .unwrap();

    client.connect(Some(WAIT)).unwrap();
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        WatchedEvent::new(EventType::Session, KeeperState::Connected, "")
    );

    let handle = client.session_handle().unwrap();
    transport.disconnect(handle);
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        WatchedEvent::new(EventType::Session, KeeperState::Connecting, "")
    );
}

#[test]
fn test_resumes_prior_session() {
    let cluster = TestCluster::new().connected();
    let id = cluster.client.client_id().unwrap();

    let resumed = Client::new(
        Arc::new(cluster.transport.clone()),
        ClientConfig::default().with_client_id(id.clone()),
    )
    .unwrap();
    resumed.connect(Some(WAIT)).unwrap();
    assert_eq!(resumed.client_id(), Some(id));
}

#[test]
fn test_unknown_prior_session_falls_back_to_new_session() {
    let cluster = TestCluster::with_config(ClientConfig::default().with_client_id(SessionId {
        id: 42,
        password: vec![1, 2, 3],
    }));

    cluster.client.connect(Some(WAIT)).unwrap();
    assert_eq!(cluster.transport.opened_sessions(), 2);
    let id = cluster.client.client_id().unwrap();
    assert_ne!(id.id, 42);
}

#[test]
fn test_ephemeral_nodes_vanish_with_the_session() {
    let cluster = TestCluster::new().connected();
    cluster
        .client
        .create(
            "/lease",
            "",
            None,
            zk_session::protocol::CreateMode::EPHEMERAL,
        )
        .unwrap();
    let other = cluster.another_client();
    other.connect(Some(WAIT)).unwrap();
    assert!(other.exists("/lease", None).unwrap().is_some());

    cluster.client.stop();
    assert!(cluster.transport.flush(WAIT));
    assert_eq!(other.exists("/lease", None), Ok(None));
}

#[test]
fn test_dropping_client_releases_its_handler() {
    let cluster = TestCluster::new().connected();
    let old = cluster.handle();
    cluster.client.restart().unwrap();
    cluster.settle();
    let handler = Arc::downgrade(cluster.client.handler());

    let TestCluster { transport, client } = cluster;
    drop(client);
    assert!(transport.flush(WAIT));

    assert!(handler.upgrade().is_none());
    assert!(!transport.inject_event(RawEvent::session(old, KeeperState::Connected)));
}
