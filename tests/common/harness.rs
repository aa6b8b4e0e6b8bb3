//! tests/common/harness.rs
#![allow(dead_code)]

use std::sync::{
    Arc, Once,
    mpsc::{self, Receiver, RecvTimeoutError},
};
use std::time::Duration;
use zk_session::{
    Client, ClientConfig, ConnectionState, ListenerId, protocol::SessionHandle,
    transport::MemoryTransport,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "zk_session=debug,zookeeper=info".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// An in-memory service plus one client talking to it.
pub struct TestCluster {
    pub transport: MemoryTransport,
    pub client: Client,
}

impl TestCluster {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        init_tracing();
        let transport = MemoryTransport::new();
        let client = Client::new(Arc::new(transport.clone()), config).unwrap();
        Self { transport, client }
    }

    /// A second client on the same service.
    pub fn another_client(&self) -> Client {
        Client::new(Arc::new(self.transport.clone()), ClientConfig::default()).unwrap()
    }

    pub fn connected(self) -> Self {
        self.client.connect(Some(WAIT)).unwrap();
        self
    }

    pub fn handle(&self) -> SessionHandle {
        self.client.session_handle().unwrap()
    }

    /// Waits until everything queued on the transport and the client's
    /// handler so far has run.
    pub fn settle(&self) {
        assert!(self.transport.flush(WAIT));
        let done = self.client.handler().event_object();
        let signal = done.clone();
        self.client
            .handler()
            .dispatch_callback(zk_session::handler::Callback::session(move || signal.set()));
        assert!(done.wait(Some(WAIT)));
    }
}

/// Records every state transition a listener sees.
pub struct StateRecorder {
    pub id: ListenerId,
    rx: Receiver<ConnectionState>,
}

impl StateRecorder {
    pub fn attach(client: &Client) -> Self {
        let (tx, rx) = mpsc::channel();
        let id = client.add_listener(move |state| {
            let _ = tx.send(state);
        });
        Self { id, rx }
    }

    pub fn next(&self) -> Option<ConnectionState> {
        match self.rx.recv_timeout(WAIT) {
            Ok(state) => Some(state),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn expect(&self, expected: ConnectionState) {
        assert_eq!(self.next(), Some(expected));
    }

    /// Everything recorded so far, without waiting.
    pub fn drain(&self) -> Vec<ConnectionState> {
        self.rx.try_iter().collect()
    }
}
