#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The client-side session layer for a ZooKeeper-style coordination service.
//! ZooKeeper 风格协调服务的客户端会话层。
//!
//! The [`Client`] turns a callback-driven [`Transport`](transport::Transport)
//! into a session with tracked connection state, one-shot watches and
//! [`AsyncResult`]-based operations. Every transport callback is re-scheduled
//! on a [`Handler`](handler::Handler) so user code never runs on the
//! transport's thread.
//!
//! [`Client`] 把基于回调的 [`Transport`](transport::Transport) 封装为一个会话：
//! 跟踪连接状态、提供一次性监视以及基于 [`AsyncResult`] 的操作。每个传输回调都会被
//! 重新调度到 [`Handler`](handler::Handler) 上，因此用户代码永远不会在传输线程上运行。

pub mod async_result;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod protocol;
pub mod retry;
pub mod transport;

pub use async_result::AsyncResult;
pub use client::{Client, ClientBuilder, ConnectionState, ListenerId, Watcher};
pub use config::{ClientConfig, RetryConfig};
pub use error::{Error, Result};
pub use retry::Retry;
