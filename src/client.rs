//! 面向用户的会话客户端。
//! The user-facing session client.
//!
//! [`Client`] owns one logical session with the coordination service. It
//! tracks the transport handle through the connection state machine in
//! [`state`], routes every transport callback through the configured
//! [`Handler`], and exposes each operation twice: an `_async` form returning an
//! [`AsyncResult`] immediately and a blocking form waiting on it.
//!
//! [`Client`] 拥有与协调服务之间的一个逻辑会话。它通过 [`state`] 中的连接状态机跟踪
//! 传输句柄，把每一个传输回调交给配置的 [`Handler`]，并以两种形式暴露每个操作：
//! 立即返回 [`AsyncResult`] 的 `_async` 形式，以及在其上等待的阻塞形式。

pub mod dispatch;
pub mod listeners;
mod ops;
pub mod state;

pub use dispatch::Watcher;
pub use listeners::{ListenerId, StateListener};
pub use state::ConnectionState;

use crate::{
    async_result::AsyncResult,
    config::ClientConfig,
    error::{Error, Result},
    handler::{Event, Handler, SequentialHandler},
    protocol::{
        Acl, CreateMode, NodeStat, SessionHandle, SessionId, Version, WatchedEvent, validate_path,
    },
    retry::Retry,
    transport::{EventCallback, RawEvent, Request, Transport, TransportError},
};
use bytes::Bytes;
use dispatch::{wrap_session_callback, wrap_watch_callback};
use listeners::ListenerRegistry;
use ops::{Continuation, Decoder};
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::{debug, info, warn};

/// Receives every session event the state machine accepts.
/// 接收状态机所接受的每一个会话事件。
pub type DefaultWatcher = Arc<dyn Fn(WatchedEvent) + Send + Sync + 'static>;

/// The current transport handle and the identity to resume on the next open.
/// 当前的传输句柄，以及下次打开时要恢复的会话身份。
pub(crate) struct SessionSlot {
    handle: Option<SessionHandle>,
    resume: Option<SessionId>,
}

/// State shared between the facade and the session callback.
///
/// The session slot and `state` are written only by the state machine
/// (`client::state`); operations only read the handle.
///
/// 门面与会话回调之间共享的状态。
///
/// 会话槽位与 `state` 只由状态机（`client::state`）写入；操作只读取句柄。
pub(crate) struct ClientInner {
    transport: Arc<dyn Transport>,
    handler: Arc<dyn Handler>,
    config: ClientConfig,
    watcher: Option<DefaultWatcher>,
    session: Mutex<SessionSlot>,
    state: Mutex<ConnectionState>,
    live: Event,
    stopped: Event,
    connection_timed_out: AtomicBool,
    listeners: ListenerRegistry,
    needs_namespace: AtomicBool,
    retry: Retry,
    /// Handed to every `Transport::open`; holds the client only weakly.
    /// 传给每一次 `Transport::open`；只弱引用客户端。
    session_callback: EventCallback,
}

impl ClientInner {
    /// The error an operation fails with when there is no usable handle.
    /// 没有可用句柄时操作失败所返回的错误。
    fn no_handle_error(&self) -> Error {
        if self.stopped.is_set() {
            Error::Stopped
        } else {
            Error::ConnectionLoss
        }
    }

    /// Hands `request` to the transport with the current handle. Never blocks
    /// and never touches the session slot beyond reading it.
    ///
    /// 使用当前句柄把 `request` 交给传输层。从不阻塞，除读取外不触碰会话槽位。
    fn call<T>(
        &self,
        request: Request,
        watch: Option<Watcher>,
        decode: Decoder<T>,
    ) -> AsyncResult<T>
    where
        T: Clone + Send + 'static,
    {
        let result = Arc::clone(&self.handler).async_result();
        self.submit_into(request, watch, &result, decode);
        result
    }

    fn submit_into<T>(
        &self,
        request: Request,
        watch: Option<Watcher>,
        result: &AsyncResult<T>,
        decode: Decoder<T>,
    ) where
        T: Clone + Send + 'static,
    {
        let Some(handle) = self.session.lock().handle else {
            result.set_exception(self.no_handle_error());
            return;
        };
        let op = request.name();
        let watch = watch.map(|w| wrap_watch_callback(Arc::clone(&self.handler), w));
        let completion = Box::new(Continuation::new(result.clone(), decode));
        match self.transport.submit(handle, request, watch, completion) {
            Ok(()) => {}
            Err(TransportError::InvalidHandle) => {
                // Superseded between reading the handle and submitting.
                debug!(?handle, op, "Handle no longer valid at submit");
                result.set_exception(self.no_handle_error());
            }
            Err(e) => {
                result.set_exception(Error::Transport(e.to_string()));
            }
        }
    }

    /// Like [`call`](Self::call), but creates the namespace first if still
    /// pending. Never blocks: the request is chained onto the namespace
    /// creation and submitted from its done-callback.
    ///
    /// 与 [`call`](Self::call) 相同，但若命名空间尚未创建则先创建它。从不阻塞：
    /// 请求被串接在命名空间创建之后，并在其完成回调中提交。
    fn issue<T>(
        self: &Arc<Self>,
        request: Request,
        watch: Option<Watcher>,
        decode: Decoder<T>,
    ) -> AsyncResult<T>
    where
        T: Clone + Send + 'static,
    {
        let Some(namespace) = self.pending_namespace() else {
            return self.call(request, watch, decode);
        };
        let result = Arc::clone(&self.handler).async_result();
        let sink = result.clone();
        let inner = Arc::clone(self);
        self.ensure_path_chain(namespace)
            .add_done_callback(move |ensured| match ensured.peek() {
                Some(Ok(())) => {
                    if inner.needs_namespace.swap(false, Ordering::SeqCst) {
                        debug!(namespace = ?inner.config.namespace, "Namespace ensured");
                    }
                    inner.submit_into(request, watch, &sink, decode);
                }
                Some(Err(e)) => {
                    sink.set_exception(e);
                }
                None => {}
            });
        result
    }

    fn pending_namespace(&self) -> Option<&str> {
        if self.needs_namespace.load(Ordering::SeqCst) {
            self.config.namespace.as_deref()
        } else {
            None
        }
    }

    /// Creates each missing component of `path`, outermost first. Each step is
    /// submitted from the previous step's done-callback.
    ///
    /// 从外到内创建 `path` 中每个缺失的路径段。每一步都在上一步的完成回调中提交。
    fn ensure_path_chain(self: &Arc<Self>, path: &str) -> AsyncResult<()> {
        let mut prefixes = Vec::new();
        let mut current = String::with_capacity(path.len());
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            prefixes.push(current.clone());
        }
        let result = Arc::clone(&self.handler).async_result();
        self.ensure_step(Arc::new(prefixes), 0, result.clone());
        result
    }

    fn ensure_step(
        self: &Arc<Self>,
        prefixes: Arc<Vec<String>>,
        index: usize,
        result: AsyncResult<()>,
    ) {
        let Some(path) = prefixes.get(index).cloned() else {
            result.set(());
            return;
        };
        let inner = Arc::clone(self);
        self.call(Request::Exists { path: path.clone() }, None, ops::decode_exists)
            .add_done_callback(move |exists| match exists.peek() {
                Some(Ok(Some(_))) => inner.ensure_step(prefixes, index + 1, result),
                Some(Ok(None)) => {
                    let create = Request::Create {
                        path,
                        data: Bytes::new(),
                        acl: Acl::open_unsafe(),
                        mode: CreateMode::PERSISTENT,
                    };
                    let next = Arc::clone(&inner);
                    inner
                        .call(create, None, ops::decode_path)
                        .add_done_callback(move |created| match created.peek() {
                            Some(Ok(_)) | Some(Err(Error::NodeExists)) => {
                                next.ensure_step(prefixes, index + 1, result)
                            }
                            Some(Err(e)) => {
                                result.set_exception(e);
                            }
                            None => {}
                        });
                }
                Some(Err(e)) => {
                    result.set_exception(e);
                }
                None => {}
            });
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(handle) = self.session.get_mut().handle.take() {
            if let Err(e) = self.transport.close(handle) {
                debug!(?handle, error = %e, "Close on drop failed");
            }
        }
    }
}

/// Builds a [`Client`] with a custom handler or default watcher.
///
/// 构建带有自定义处理器或默认监视器的 [`Client`]。
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    handler: Option<Arc<dyn Handler>>,
    watcher: Option<DefaultWatcher>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs every callback on `handler` instead of a fresh [`SequentialHandler`].
    /// 在 `handler` 上运行所有回调，而不是新建一个 [`SequentialHandler`]。
    pub fn handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn watcher<F>(mut self, watcher: F) -> Self
    where
        F: Fn(WatchedEvent) + Send + Sync + 'static,
    {
        self.watcher = Some(Arc::new(watcher));
        self
    }

    /// Validates the configuration and starts the handler. Does not connect.
    /// 校验配置并启动处理器。不会发起连接。
    pub fn build(self) -> Result<Client> {
        let config = self.config.validate()?;
        let handler: Arc<dyn Handler> = match self.handler {
            Some(handler) => handler,
            None => Arc::new(SequentialHandler::new()?),
        };
        handler.start()?;

        let live = handler.event_object();
        let stopped = handler.event_object();
        stopped.set();
        let retry = Retry::new(config.max_retries, config.retry.clone());
        let needs_namespace = config.namespace.is_some();
        debug!(
            hosts = %config.hosts,
            namespace = ?config.namespace,
            handler = handler.name(),
            "Client created"
        );
        let weak_handler = Arc::downgrade(&handler);
        Ok(Client {
            inner: Arc::new_cyclic(|weak: &Weak<ClientInner>| ClientInner {
                session_callback: wrap_session_callback(weak_handler, {
                    let weak = weak.clone();
                    move |event: RawEvent| {
                        if let Some(inner) = weak.upgrade() {
                            inner.handle_session_event(event);
                        }
                    }
                }),
                transport: self.transport,
                handler,
                session: Mutex::new(SessionSlot {
                    handle: None,
                    resume: config.client_id.clone(),
                }),
                config,
                watcher: self.watcher,
                state: Mutex::new(ConnectionState::Lost),
                live,
                stopped,
                connection_timed_out: AtomicBool::new(false),
                listeners: ListenerRegistry::new(),
                needs_namespace: AtomicBool::new(needs_namespace),
                retry,
            }),
        })
    }
}

/// A session with the coordination service.
///
/// Cheap to clone; clones share the session. The client starts `Lost` and
/// stopped; call [`connect`](Self::connect) to open a session.
///
/// 与协调服务之间的一个会话。
///
/// 克隆开销很小，克隆体共享同一会话。客户端初始为 `Lost` 且处于停止状态；
/// 调用 [`connect`](Self::connect) 打开会话。
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("hosts", &self.inner.config.hosts)
            .field("namespace", &self.inner.config.namespace)
            .field("state", &self.state())
            .field("handle", &self.session_handle())
            .finish()
    }
}

impl Client {
    pub fn builder(transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder {
            transport,
            config: ClientConfig::default(),
            handler: None,
            watcher: None,
        }
    }

    /// A client with the default handler and no default watcher.
    /// 使用默认处理器且没有默认监视器的客户端。
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self> {
        Self::builder(transport).config(config).build()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether the session is established.
    /// 会话是否已建立。
    pub fn connected(&self) -> bool {
        self.inner.live.is_set()
    }

    /// The server-side identity of the current session, if there is a handle.
    /// 当前会话的服务端身份（若存在句柄）。
    pub fn client_id(&self) -> Option<SessionId> {
        let handle = self.session_handle()?;
        self.inner.transport.session_id(handle)
    }

    pub fn session_handle(&self) -> Option<SessionHandle> {
        self.inner.session.lock().handle
    }

    pub fn namespace(&self) -> Option<&str> {
        self.inner.config.namespace.as_deref()
    }

    /// Whether the last [`connect`](Self::connect) gave up waiting.
    /// 上一次 [`connect`](Self::connect) 是否因等待超时而放弃。
    pub fn connection_timed_out(&self) -> bool {
        self.inner.connection_timed_out.load(Ordering::SeqCst)
    }

    pub fn retry(&self) -> &Retry {
        &self.inner.retry
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.inner.handler
    }

    /// Registers a function called with every connection state transition.
    /// Listeners run on the handler and must not block.
    ///
    /// 注册一个在每次连接状态转换时调用的函数。监听器在处理器上运行，不得阻塞。
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Starts connecting. Returns `None` when already connected, otherwise an
    /// event that is set once the session reaches `Connected`.
    ///
    /// 开始连接。已连接时返回 `None`，否则返回一个在会话到达 `Connected` 时被设置的事件。
    pub fn connect_async(&self) -> Result<Option<Event>> {
        self.inner.connect_async()
    }

    /// Connects and waits up to `timeout` for the session.
    ///
    /// On timeout the attempt keeps going in the background,
    /// [`connection_timed_out`](Self::connection_timed_out) is set and
    /// `Error::Timeout` is returned.
    ///
    /// 连接并最多等待 `timeout`。超时后连接尝试仍在后台继续，
    /// 设置 [`connection_timed_out`](Self::connection_timed_out) 并返回 `Error::Timeout`。
    pub fn connect(&self, timeout: Option<Duration>) -> Result<()> {
        let Some(live) = self.connect_async()? else {
            return Ok(());
        };
        if live.wait(timeout) {
            return Ok(());
        }
        self.inner.connection_timed_out.store(true, Ordering::SeqCst);
        warn!(?timeout, hosts = %self.inner.config.hosts, "Timed out waiting for session");
        Err(self.inner.handler.timeout_error())
    }

    /// Stops the session. Later operations fail with `Error::Stopped`.
    /// 停止会话。之后的操作会以 `Error::Stopped` 失败。
    pub fn stop(&self) {
        info!(handle = ?self.session_handle(), "Stopping client");
        self.inner.stopped.set();
        self.inner.safe_close();
    }

    /// Closes the current session and connects again, blocking until connected.
    /// 关闭当前会话并重新连接，阻塞直到连接成功。
    pub fn restart(&self) -> Result<()> {
        info!(handle = ?self.session_handle(), "Restarting client");
        self.inner.safe_close();
        self.inner.stopped.clear();
        self.connect(None)
    }

    pub fn add_auth_async(
        &self,
        scheme: impl Into<String>,
        credential: impl Into<Bytes>,
    ) -> Result<AsyncResult<()>> {
        let request = Request::AddAuth {
            scheme: scheme.into(),
            credential: credential.into(),
        };
        Ok(self.inner.call(request, None, ops::decode_unit))
    }

    /// Sends credentials for this session.
    /// 为本会话发送认证凭据。
    pub fn add_auth(&self, scheme: impl Into<String>, credential: impl Into<Bytes>) -> Result<()> {
        self.add_auth_async(scheme, credential)?.get(None)
    }

    /// Creates a node. `acl` defaults to the open ACL.
    /// Resolves with the real path, which differs from `path` for sequential nodes.
    ///
    /// 创建节点。`acl` 默认为开放 ACL。以实际路径完成；对于顺序节点，实际路径与 `path` 不同。
    pub fn create_async(
        &self,
        path: &str,
        value: impl Into<Bytes>,
        acl: Option<Vec<Acl>>,
        mode: CreateMode,
    ) -> Result<AsyncResult<String>> {
        validate_path(path)?;
        let request = Request::Create {
            path: path.to_string(),
            data: value.into(),
            acl: acl.unwrap_or_else(Acl::open_unsafe),
            mode,
        };
        Ok(self.inner.issue(request, None, ops::decode_path))
    }

    pub fn create(
        &self,
        path: &str,
        value: impl Into<Bytes>,
        acl: Option<Vec<Acl>>,
        mode: CreateMode,
    ) -> Result<String> {
        self.create_async(path, value, acl, mode)?.get(None)
    }

    /// Resolves with the node's stat, or `None` if it does not exist.
    /// `watch` fires once on the next change, creation included.
    ///
    /// 以节点的 stat 完成；节点不存在时为 `None`。`watch` 在下一次变化（包括创建）时触发一次。
    pub fn exists_async(
        &self,
        path: &str,
        watch: Option<Watcher>,
    ) -> Result<AsyncResult<Option<NodeStat>>> {
        validate_path(path)?;
        let request = Request::Exists {
            path: path.to_string(),
        };
        Ok(self.inner.issue(request, watch, ops::decode_exists))
    }

    pub fn exists(&self, path: &str, watch: Option<Watcher>) -> Result<Option<NodeStat>> {
        self.exists_async(path, watch)?.get(None)
    }

    pub fn get_async(
        &self,
        path: &str,
        watch: Option<Watcher>,
    ) -> Result<AsyncResult<(Bytes, NodeStat)>> {
        validate_path(path)?;
        let request = Request::GetData {
            path: path.to_string(),
        };
        Ok(self.inner.issue(request, watch, ops::decode_data))
    }

    /// The node's value and stat.
    /// 节点的值与 stat。
    pub fn get(&self, path: &str, watch: Option<Watcher>) -> Result<(Bytes, NodeStat)> {
        self.get_async(path, watch)?.get(None)
    }

    pub fn get_children_async(
        &self,
        path: &str,
        watch: Option<Watcher>,
    ) -> Result<AsyncResult<Vec<String>>> {
        validate_path(path)?;
        let request = Request::GetChildren {
            path: path.to_string(),
        };
        Ok(self.inner.issue(request, watch, ops::decode_children))
    }

    /// Names of the node's children, not full paths.
    /// 节点子节点的名称，而非完整路径。
    pub fn get_children(&self, path: &str, watch: Option<Watcher>) -> Result<Vec<String>> {
        self.get_children_async(path, watch)?.get(None)
    }

    /// Writes `data` if the node's version matches. Resolves with the new stat.
    /// 若节点版本匹配则写入 `data`。以新的 stat 完成。
    pub fn set_async(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        version: Version,
    ) -> Result<AsyncResult<NodeStat>> {
        validate_path(path)?;
        let request = Request::SetData {
            path: path.to_string(),
            data: data.into(),
            version,
        };
        Ok(self.inner.issue(request, None, ops::decode_stat))
    }

    pub fn set(&self, path: &str, data: impl Into<Bytes>, version: Version) -> Result<NodeStat> {
        self.set_async(path, data, version)?.get(None)
    }

    pub fn delete_async(&self, path: &str, version: Version) -> Result<AsyncResult<()>> {
        validate_path(path)?;
        let request = Request::Delete {
            path: path.to_string(),
            version,
        };
        Ok(self.inner.issue(request, None, ops::decode_unit))
    }

    pub fn delete(&self, path: &str, version: Version) -> Result<()> {
        self.delete_async(path, version)?.get(None)
    }

    /// Creates every missing node along `path` with an empty value and the
    /// open ACL. Existing nodes are left alone.
    ///
    /// 沿 `path` 以空值和开放 ACL 创建每个缺失的节点。已存在的节点保持不变。
    pub fn ensure_path_async(&self, path: &str) -> Result<AsyncResult<()>> {
        validate_path(path)?;
        let Some(namespace) = self.inner.pending_namespace() else {
            return Ok(self.inner.ensure_path_chain(path));
        };
        let result = Arc::clone(&self.inner.handler).async_result();
        let sink = result.clone();
        let inner = Arc::clone(&self.inner);
        let path = path.to_string();
        self.inner
            .ensure_path_chain(namespace)
            .add_done_callback(move |ensured| match ensured.peek() {
                Some(Ok(())) => {
                    inner.needs_namespace.store(false, Ordering::SeqCst);
                    inner
                        .ensure_path_chain(&path)
                        .add_done_callback(move |done| {
                            if let Some(outcome) = done.peek() {
                                sink.resolve(outcome);
                            }
                        });
                }
                Some(Err(e)) => {
                    sink.set_exception(e);
                }
                None => {}
            });
        Ok(result)
    }

    pub fn ensure_path(&self, path: &str) -> Result<()> {
        self.ensure_path_async(path)?.get(None)
    }
}
