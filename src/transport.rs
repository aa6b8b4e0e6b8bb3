//! 传输层边界。
//! The transport boundary.
//!
//! This module only defines the interface the session layer talks to: opening
//! and closing sessions, submitting requests, and the shapes of the callbacks
//! the transport fires back. A transport delivers every callback on a thread
//! of its own choosing; the session layer never assumes which.
//!
//! 本模块仅定义会话层所使用的接口：打开与关闭会话、提交请求，以及传输层回调的形态。
//! 传输层在自己选择的线程上投递每一个回调；会话层从不假定是哪个线程。

pub mod memory;

pub use memory::MemoryTransport;

use crate::protocol::{
    Acl, CreateMode, EventType, KeeperState, RawStat, SessionHandle, SessionId, StatusCode,
    Version,
};
use bytes::Bytes;
use std::{fmt::Debug, sync::Arc, time::Duration};
use thiserror::Error;

/// A raw event as the transport reports it, before any filtering.
/// 传输层上报的原始事件，尚未经过任何过滤。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub handle: SessionHandle,
    pub event_type: EventType,
    pub state: KeeperState,
    pub path: String,
}

impl RawEvent {
    pub fn session(handle: SessionHandle, state: KeeperState) -> Self {
        Self {
            handle,
            event_type: EventType::Session,
            state,
            path: String::new(),
        }
    }
}

/// Callback fired for session events or watch notifications. May be called
/// many times and from any thread.
///
/// 会话事件或监视通知的回调。可能被多次调用，且可能来自任意线程。
pub type EventCallback = Arc<dyn Fn(RawEvent) + Send + Sync + 'static>;

/// One low-level request.
/// 一个底层请求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    AddAuth {
        scheme: String,
        credential: Bytes,
    },
    Create {
        path: String,
        data: Bytes,
        acl: Vec<Acl>,
        mode: CreateMode,
    },
    Exists {
        path: String,
    },
    GetData {
        path: String,
    },
    GetChildren {
        path: String,
    },
    SetData {
        path: String,
        data: Bytes,
        version: Version,
    },
    Delete {
        path: String,
        version: Version,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::AddAuth { .. } => "add_auth",
            Request::Create { .. } => "create",
            Request::Exists { .. } => "exists",
            Request::GetData { .. } => "get",
            Request::GetChildren { .. } => "get_children",
            Request::SetData { .. } => "set",
            Request::Delete { .. } => "delete",
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Request::AddAuth { .. } => None,
            Request::Create { path, .. }
            | Request::Exists { path }
            | Request::GetData { path }
            | Request::GetChildren { path }
            | Request::SetData { path, .. }
            | Request::Delete { path, .. } => Some(path),
        }
    }

    /// Whether a watch may be registered alongside this request.
    /// 该请求是否可以同时注册监视。
    pub fn accepts_watch(&self) -> bool {
        matches!(
            self,
            Request::Exists { .. } | Request::GetData { .. } | Request::GetChildren { .. }
        )
    }
}

/// A single result value.
/// 单个结果值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyValue {
    Path(String),
    Children(Vec<String>),
    Stat(RawStat),
}

/// The result carried by a completion, tagged by arity.
/// 完成回调携带的结果，按元数打标签。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    None,
    Value(ReplyValue),
    ValueWithStat(Bytes, RawStat),
}

/// The continuation a transport invokes exactly once when a submitted request completes.
///
/// 提交的请求完成时，传输层恰好调用一次的延续对象。
pub trait CompletionSink: Send + 'static {
    fn complete(self: Box<Self>, status: StatusCode, reply: Reply);
}

/// Reasons a transport refuses a call outright.
/// 传输层直接拒绝调用的原因。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The handle is closed or was never issued.
    /// 句柄已关闭或从未分配。
    #[error("invalid session handle")]
    InvalidHandle,

    #[error("the request does not accept a watch")]
    WatchNotSupported,

    #[error("transport failure: {0}")]
    Other(String),
}

/// The native client boundary.
///
/// `submit` either returns `Ok(())` and later invokes `completion` exactly
/// once, or returns an error and never invokes it.
///
/// 原生客户端边界。
///
/// `submit` 要么返回 `Ok(())` 并在之后恰好调用一次 `completion`，
/// 要么返回错误且永不调用它。
pub trait Transport: Send + Sync + Debug + 'static {
    /// Opens a new session, optionally resuming `prior`. Session events for
    /// the returned handle are delivered to `session_callback`.
    ///
    /// 打开一个新会话，可选地恢复 `prior`。返回句柄的会话事件会投递给 `session_callback`。
    fn open(
        &self,
        hosts: &str,
        session_timeout: Duration,
        prior: Option<&SessionId>,
        session_callback: EventCallback,
    ) -> Result<SessionHandle, TransportError>;

    /// Releases the handle's resources.
    /// 释放句柄的资源。
    fn close(&self, handle: SessionHandle) -> Result<(), TransportError>;

    /// The server-side identity of the session behind `handle`, if known.
    /// `handle` 背后会话的服务端身份（若已知）。
    fn session_id(&self, handle: SessionHandle) -> Option<SessionId>;

    /// Submits one request.
    /// 提交一个请求。
    fn submit(
        &self,
        handle: SessionHandle,
        request: Request,
        watch: Option<EventCallback>,
        completion: Box<dyn CompletionSink>,
    ) -> Result<(), TransportError>;
}
