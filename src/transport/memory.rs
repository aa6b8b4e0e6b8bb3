//! 进程内的内存传输实现。
//! An in-process, in-memory transport.
//!
//! `MemoryTransport` keeps a complete node tree (versions, ACLs, ephemeral and
//! sequential nodes, one-shot watches) and behaves like a native client: every
//! callback is delivered on a dedicated transport thread, never on the
//! caller's. It also exposes controls to simulate disconnects, session expiry,
//! authentication failure and latent events from superseded handles.
//!
//! `MemoryTransport` 维护完整的节点树（版本、ACL、临时与顺序节点、一次性监视），
//! 行为与原生客户端一致：每个回调都在专用的传输线程上投递，从不在调用者线程上执行。
//! 它还提供模拟断线、会话过期、认证失败以及来自已被替换句柄的延迟事件的控制接口。

use super::{
    CompletionSink, EventCallback, RawEvent, Reply, ReplyValue, Request, Transport,
    TransportError,
};
use crate::{
    handler::Event,
    logging::LogSink,
    protocol::{
        Acl, CreateMode, EventType, KeeperState, Permissions, RawStat, SessionHandle, SessionId,
        StatusCode, Version,
    },
};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    io::Write,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

type Delivery = Box<dyn FnOnce() + Send + 'static>;
type Firing = (EventCallback, RawEvent);
type OpResult = std::result::Result<(Reply, Vec<Firing>), StatusCode>;
type RetiredCallback = Weak<dyn Fn(RawEvent) + Send + Sync + 'static>;

struct Node {
    data: Bytes,
    acl: Vec<Acl>,
    stat: RawStat,
    children: BTreeSet<String>,
}

struct Watch {
    handle: SessionHandle,
    callback: EventCallback,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<String, Node>,
    zxid: i64,
    data_watches: HashMap<String, Vec<Watch>>,
    child_watches: HashMap<String, Vec<Watch>>,
}

struct ServerSession {
    password: Vec<u8>,
    auth: Vec<(String, String)>,
}

#[derive(Clone, Copy)]
struct Connection {
    session_id: i64,
    state: KeeperState,
}

struct Shared {
    tree: Mutex<Tree>,
    server_sessions: Mutex<HashMap<i64, ServerSession>>,
    connections: DashMap<SessionHandle, Connection>,
    callbacks: DashMap<SessionHandle, EventCallback>,
    /// Session callbacks of closed handles, held weakly for latent events.
    retired: DashMap<SessionHandle, RetiredCallback>,
    next_handle: AtomicU64,
    auto_connect: AtomicBool,
    submitted: AtomicUsize,
    opened: AtomicUsize,
    delivery_tx: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    log: Mutex<Option<LogSink>>,
}

/// An in-memory coordination service plus native-client emulation.
///
/// Clones share the same tree and sessions.
///
/// 内存中的协调服务及原生客户端模拟。克隆体共享同一棵树和同一组会话。
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("connections", &self.shared.connections.len())
            .field("submitted", &self.submitted_requests())
            .finish()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Splits `/a/b` into (`/a`, `b`). `None` for the root.
fn split_path(path: &str) -> Option<(&str, &str)> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { "/" } else { &path[..idx] };
    Some((parent, &path[idx + 1..]))
}

fn allowed(node: &Node, perm: Permissions, auth: &[(String, String)]) -> bool {
    node.acl.iter().any(|entry| {
        entry.perms.contains(perm)
            && ((entry.scheme == "world" && entry.id == "anyone")
                || auth
                    .iter()
                    .any(|(scheme, id)| *scheme == entry.scheme && *id == entry.id))
    })
}

impl Tree {
    fn new() -> Self {
        let mut tree = Tree::default();
        tree.nodes.insert(
            "/".to_string(),
            Node {
                data: Bytes::new(),
                acl: Acl::open_unsafe(),
                stat: RawStat::default(),
                children: BTreeSet::new(),
            },
        );
        tree
    }

    fn next_zxid(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn fire(watches: Option<Vec<Watch>>, event_type: EventType, path: &str) -> Vec<Firing> {
        watches
            .unwrap_or_default()
            .into_iter()
            .map(|w| {
                let event = RawEvent {
                    handle: w.handle,
                    event_type,
                    state: KeeperState::Connected,
                    path: path.to_string(),
                };
                (w.callback, event)
            })
            .collect()
    }

    fn trigger_data(&mut self, path: &str, event_type: EventType) -> Vec<Firing> {
        Self::fire(self.data_watches.remove(path), event_type, path)
    }

    fn trigger_child(&mut self, path: &str, event_type: EventType) -> Vec<Firing> {
        Self::fire(self.child_watches.remove(path), event_type, path)
    }

    fn watch_data(&mut self, path: &str, handle: SessionHandle, watch: Option<EventCallback>) {
        if let Some(callback) = watch {
            self.data_watches
                .entry(path.to_string())
                .or_default()
                .push(Watch { handle, callback });
        }
    }

    fn watch_children(&mut self, path: &str, handle: SessionHandle, watch: Option<EventCallback>) {
        if let Some(callback) = watch {
            self.child_watches
                .entry(path.to_string())
                .or_default()
                .push(Watch { handle, callback });
        }
    }

    fn create(
        &mut self,
        path: &str,
        data: Bytes,
        acl: Vec<Acl>,
        mode: CreateMode,
        owner: i64,
        auth: &[(String, String)],
    ) -> OpResult {
        if acl.is_empty() {
            return Err(StatusCode::InvalidAcl);
        }
        let (parent, name) = split_path(path).ok_or(StatusCode::NodeExists)?;
        if name.is_empty() && !mode.sequential {
            return Err(StatusCode::BadArguments);
        }
        let parent_node = self.nodes.get(parent).ok_or(StatusCode::NoNode)?;
        if parent_node.stat.ephemeral_owner != 0 {
            return Err(StatusCode::NoChildrenForEphemerals);
        }
        if !allowed(parent_node, Permissions::CREATE, auth) {
            return Err(StatusCode::NoAuth);
        }
        let real_path = if mode.sequential {
            format!("{path}{:010}", parent_node.stat.cversion)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&real_path) {
            return Err(StatusCode::NodeExists);
        }

        let zxid = self.next_zxid();
        let now = now_ms();
        let stat = RawStat {
            czxid: zxid,
            mzxid: zxid,
            pzxid: zxid,
            ctime: now,
            mtime: now,
            ephemeral_owner: if mode.ephemeral { owner } else { 0 },
            data_length: data.len() as i32,
            ..RawStat::default()
        };
        self.nodes.insert(
            real_path.clone(),
            Node {
                data,
                acl,
                stat,
                children: BTreeSet::new(),
            },
        );
        let real_name = real_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.insert(real_name);
            parent_node.stat.cversion += 1;
            parent_node.stat.num_children += 1;
            parent_node.stat.pzxid = zxid;
        }

        let mut firings = self.trigger_data(&real_path, EventType::Created);
        firings.extend(self.trigger_child(parent, EventType::Child));
        Ok((Reply::Value(ReplyValue::Path(real_path)), firings))
    }

    fn delete(&mut self, path: &str, version: Version, auth: &[(String, String)]) -> OpResult {
        let (parent, name) = split_path(path).ok_or(StatusCode::BadArguments)?;
        let node = self.nodes.get(path).ok_or(StatusCode::NoNode)?;
        if !version.matches(node.stat.version) {
            return Err(StatusCode::BadVersion);
        }
        if !node.children.is_empty() {
            return Err(StatusCode::NotEmpty);
        }
        if let Some(parent_node) = self.nodes.get(parent) {
            if !allowed(parent_node, Permissions::DELETE, auth) {
                return Err(StatusCode::NoAuth);
            }
        }
        Ok((Reply::None, self.remove_node(path, parent, name)))
    }

    fn remove_node(&mut self, path: &str, parent: &str, name: &str) -> Vec<Firing> {
        self.nodes.remove(path);
        let zxid = self.next_zxid();
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.remove(name);
            parent_node.stat.cversion += 1;
            parent_node.stat.num_children -= 1;
            parent_node.stat.pzxid = zxid;
        }
        let mut firings = self.trigger_data(path, EventType::Deleted);
        firings.extend(self.trigger_child(path, EventType::Deleted));
        firings.extend(self.trigger_child(parent, EventType::Child));
        firings
    }

    fn exists(&mut self, path: &str, handle: SessionHandle, watch: Option<EventCallback>) -> OpResult {
        self.watch_data(path, handle, watch);
        match self.nodes.get(path) {
            Some(node) => Ok((Reply::Value(ReplyValue::Stat(node.stat)), Vec::new())),
            None => Err(StatusCode::NoNode),
        }
    }

    fn get_data(
        &mut self,
        path: &str,
        handle: SessionHandle,
        watch: Option<EventCallback>,
        auth: &[(String, String)],
    ) -> OpResult {
        let node = self.nodes.get(path).ok_or(StatusCode::NoNode)?;
        if !allowed(node, Permissions::READ, auth) {
            return Err(StatusCode::NoAuth);
        }
        let reply = Reply::ValueWithStat(node.data.clone(), node.stat);
        self.watch_data(path, handle, watch);
        Ok((reply, Vec::new()))
    }

    fn get_children(
        &mut self,
        path: &str,
        handle: SessionHandle,
        watch: Option<EventCallback>,
        auth: &[(String, String)],
    ) -> OpResult {
        let node = self.nodes.get(path).ok_or(StatusCode::NoNode)?;
        if !allowed(node, Permissions::READ, auth) {
            return Err(StatusCode::NoAuth);
        }
        let children = node.children.iter().cloned().collect();
        self.watch_children(path, handle, watch);
        Ok((Reply::Value(ReplyValue::Children(children)), Vec::new()))
    }

    fn set_data(
        &mut self,
        path: &str,
        data: Bytes,
        version: Version,
        auth: &[(String, String)],
    ) -> OpResult {
        let zxid = self.zxid + 1;
        let node = self.nodes.get_mut(path).ok_or(StatusCode::NoNode)?;
        if !version.matches(node.stat.version) {
            return Err(StatusCode::BadVersion);
        }
        if !allowed(node, Permissions::WRITE, auth) {
            return Err(StatusCode::NoAuth);
        }
        node.stat.data_length = data.len() as i32;
        node.data = data;
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.mtime = now_ms();
        let stat = node.stat;
        self.zxid = zxid;
        let firings = self.trigger_data(path, EventType::Changed);
        Ok((Reply::Value(ReplyValue::Stat(stat)), firings))
    }

    fn remove_ephemerals(&mut self, session_id: i64) -> Vec<Firing> {
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.stat.ephemeral_owner == session_id)
            .map(|(path, _)| path.clone())
            .collect();
        let mut firings = Vec::new();
        for path in owned {
            if let Some((parent, name)) = split_path(&path) {
                let (parent, name) = (parent.to_string(), name.to_string());
                firings.extend(self.remove_node(&path, &parent, &name));
            }
        }
        firings
    }

    fn watchers_of(&self, handle: SessionHandle) -> Vec<EventCallback> {
        self.data_watches
            .values()
            .chain(self.child_watches.values())
            .flatten()
            .filter(|w| w.handle == handle)
            .map(|w| Arc::clone(&w.callback))
            .collect()
    }

    fn clear_watches(&mut self, handle: SessionHandle) {
        for watches in self
            .data_watches
            .values_mut()
            .chain(self.child_watches.values_mut())
        {
            watches.retain(|w| w.handle != handle);
        }
    }
}

impl MemoryTransport {
    /// Creates an empty tree (only `/`) and starts the transport thread.
    /// 创建一棵空树（仅有 `/`）并启动传输线程。
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
        let spawned = thread::Builder::new()
            .name("zk-memory-transport".to_string())
            .spawn(move || {
                while let Some(delivery) = rx.blocking_recv() {
                    delivery();
                }
                trace!("Memory transport thread exiting");
            });
        let delivery_tx = match spawned {
            Ok(_) => Some(tx),
            Err(e) => {
                warn!(error = %e, "Failed to spawn memory transport thread");
                None
            }
        };
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(Tree::new()),
                server_sessions: Mutex::new(HashMap::new()),
                connections: DashMap::new(),
                callbacks: DashMap::new(),
                retired: DashMap::new(),
                next_handle: AtomicU64::new(1),
                auto_connect: AtomicBool::new(true),
                submitted: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
                delivery_tx: Mutex::new(delivery_tx),
                log: Mutex::new(None),
            }),
        }
    }

    /// Writes native-style log lines (`ZOO_<LEVEL>@<message>`) to `sink`.
    /// 将原生风格的日志行（`ZOO_<LEVEL>@<message>`）写入 `sink`。
    pub fn with_log_sink(self, sink: LogSink) -> Self {
        *self.shared.log.lock() = Some(sink);
        self
    }

    /// When disabled, new sessions stay in `Connecting` until [`reconnect`](Self::reconnect).
    /// 关闭后，新会话会停留在 `Connecting`，直到调用 [`reconnect`](Self::reconnect)。
    pub fn set_auto_connect(&self, enabled: bool) {
        self.shared.auto_connect.store(enabled, Ordering::SeqCst);
    }

    /// Number of requests that reached the transport.
    /// 到达传输层的请求数量。
    pub fn submitted_requests(&self) -> usize {
        self.shared.submitted.load(Ordering::SeqCst)
    }

    /// Number of sessions opened so far.
    /// 迄今已打开的会话数量。
    pub fn opened_sessions(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn node_data(&self, path: &str) -> Option<(Bytes, RawStat)> {
        self.shared
            .tree
            .lock()
            .nodes
            .get(path)
            .map(|node| (node.data.clone(), node.stat))
    }

    /// Simulates a dropped connection: the session survives but is `Connecting`.
    /// 模拟连接断开：会话仍然存在，但处于 `Connecting` 状态。
    pub fn disconnect(&self, handle: SessionHandle) -> bool {
        self.transition(handle, KeeperState::Connecting)
    }

    /// Re-establishes a dropped or pending connection.
    /// 重新建立断开或挂起的连接。
    pub fn reconnect(&self, handle: SessionHandle) -> bool {
        self.transition(handle, KeeperState::Connected)
    }

    /// Expires the session behind `handle`, removing its ephemeral nodes.
    /// 使 `handle` 背后的会话过期，并删除其临时节点。
    pub fn expire_session(&self, handle: SessionHandle) -> bool {
        self.transition(handle, KeeperState::ExpiredSession)
    }

    pub fn fail_auth(&self, handle: SessionHandle) -> bool {
        self.transition(handle, KeeperState::AuthFailed)
    }

    /// Delivers `event` to whichever session callback was registered for its
    /// handle, even if that handle has since been closed. A closed handle's
    /// callback is only reachable while its owner still holds it.
    ///
    /// 将 `event` 投递给其句柄注册的会话回调，即使该句柄已经关闭。
    /// 已关闭句柄的回调仅在其所有者仍持有它时可达。
    pub fn inject_event(&self, event: RawEvent) -> bool {
        let live = self
            .shared
            .callbacks
            .get(&event.handle)
            .map(|entry| Arc::clone(entry.value()));
        let callback = match live.or_else(|| {
            self.shared
                .retired
                .get(&event.handle)
                .and_then(|entry| entry.value().upgrade())
        }) {
            Some(callback) => callback,
            None => return false,
        };
        self.deliver(Box::new(move || callback(event)));
        true
    }

    /// Blocks until everything queued on the transport thread so far has been delivered.
    /// 阻塞直到传输线程上目前排队的所有内容都已投递。
    pub fn flush(&self, timeout: Duration) -> bool {
        let done = Event::new();
        let signal = done.clone();
        self.deliver(Box::new(move || signal.set()));
        done.wait(Some(timeout))
    }

    fn deliver(&self, delivery: Delivery) {
        let guard = self.shared.delivery_tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(delivery).is_err() {
                    warn!("Memory transport thread is gone, dropping delivery");
                }
            }
            None => warn!("Memory transport has no delivery thread"),
        }
    }

    fn log(&self, level: &str, message: &str) {
        if let Some(sink) = self.shared.log.lock().as_mut() {
            let line = format!("{}:ZOO_{level}@{message}\n", now_ms());
            if let Err(e) = sink.write_all(line.as_bytes()) {
                debug!(error = %e, "Dropping transport log line");
            }
        }
    }

    fn auth_for(&self, session_id: i64) -> Vec<(String, String)> {
        self.shared
            .server_sessions
            .lock()
            .get(&session_id)
            .map(|s| s.auth.clone())
            .unwrap_or_default()
    }

    fn transition(&self, handle: SessionHandle, state: KeeperState) -> bool {
        let connection = match self.shared.connections.get_mut(&handle) {
            Some(mut entry) => {
                if entry.state.is_terminal() {
                    return false;
                }
                entry.state = state;
                *entry
            }
            None => return false,
        };
        let mut firings = Vec::new();
        if state == KeeperState::ExpiredSession {
            self.shared
                .server_sessions
                .lock()
                .remove(&connection.session_id);
            firings = self
                .shared
                .tree
                .lock()
                .remove_ephemerals(connection.session_id);
            self.log(
                "WARN",
                &format!("session 0x{:x} has expired", connection.session_id),
            );
        }
        if !firings.is_empty() {
            self.deliver(Box::new(move || {
                for (callback, event) in firings {
                    callback(event);
                }
            }));
        }
        self.emit_session(handle, state);
        true
    }

    /// Session events go to the session callback and, like a native client,
    /// to every watch the handle still has registered.
    fn emit_session(&self, handle: SessionHandle, state: KeeperState) {
        let callback = match self.shared.callbacks.get(&handle) {
            Some(entry) => Arc::clone(entry.value()),
            None => return,
        };
        let watchers = {
            let mut tree = self.shared.tree.lock();
            let watchers = tree.watchers_of(handle);
            if state.is_terminal() {
                tree.clear_watches(handle);
            }
            watchers
        };
        let event = RawEvent::session(handle, state);
        self.deliver(Box::new(move || {
            callback(event.clone());
            for watcher in watchers {
                watcher(event.clone());
            }
        }));
    }

    fn execute(
        &self,
        handle: SessionHandle,
        session_id: i64,
        request: Request,
        watch: Option<EventCallback>,
    ) -> OpResult {
        let auth = self.auth_for(session_id);
        if let Request::AddAuth { scheme, credential } = request {
            let credential = String::from_utf8_lossy(&credential).into_owned();
            let mut sessions = self.shared.server_sessions.lock();
            let session = sessions
                .get_mut(&session_id)
                .ok_or(StatusCode::SessionExpired)?;
            if !session
                .auth
                .iter()
                .any(|(s, c)| *s == scheme && *c == credential)
            {
                session.auth.push((scheme, credential));
            }
            return Ok((Reply::None, Vec::new()));
        }

        let mut tree = self.shared.tree.lock();
        match request {
            Request::AddAuth { .. } => Ok((Reply::None, Vec::new())),
            Request::Create {
                path,
                data,
                acl,
                mode,
            } => tree.create(&path, data, acl, mode, session_id, &auth),
            Request::Exists { path } => tree.exists(&path, handle, watch),
            Request::GetData { path } => tree.get_data(&path, handle, watch, &auth),
            Request::GetChildren { path } => tree.get_children(&path, handle, watch, &auth),
            Request::SetData {
                path,
                data,
                version,
            } => tree.set_data(&path, data, version, &auth),
            Request::Delete { path, version } => tree.delete(&path, version, &auth),
        }
    }

    fn end_session(&self, session_id: i64) {
        let still_used = self
            .shared
            .connections
            .iter()
            .any(|entry| entry.value().session_id == session_id);
        if still_used {
            return;
        }
        if self
            .shared
            .server_sessions
            .lock()
            .remove(&session_id)
            .is_none()
        {
            return;
        }
        let firings = self.shared.tree.lock().remove_ephemerals(session_id);
        if !firings.is_empty() {
            self.deliver(Box::new(move || {
                for (callback, event) in firings {
                    callback(event);
                }
            }));
        }
    }
}

impl Transport for MemoryTransport {
    fn open(
        &self,
        hosts: &str,
        session_timeout: Duration,
        prior: Option<&SessionId>,
        session_callback: EventCallback,
    ) -> Result<SessionHandle, TransportError> {
        if hosts.trim().is_empty() {
            return Err(TransportError::Other("no hosts to connect to".to_string()));
        }
        let handle = SessionHandle(self.shared.next_handle.fetch_add(1, Ordering::SeqCst));
        self.shared.callbacks.insert(handle, session_callback);

        let (session_id, state) = {
            let mut sessions = self.shared.server_sessions.lock();
            match prior {
                Some(prior) => match sessions.get(&prior.id) {
                    Some(session) if session.password == prior.password => {
                        (prior.id, KeeperState::Connected)
                    }
                    _ => (prior.id, KeeperState::ExpiredSession),
                },
                None => {
                    let mut rng = rand::rng();
                    let mut id = rng.random_range(1..i64::MAX);
                    while sessions.contains_key(&id) {
                        id = rng.random_range(1..i64::MAX);
                    }
                    let password: Vec<u8> = (0..16).map(|_| rng.random()).collect();
                    sessions.insert(
                        id,
                        ServerSession {
                            password,
                            auth: Vec::new(),
                        },
                    );
                    (id, KeeperState::Connected)
                }
            }
        };

        let initial = if state == KeeperState::Connected
            && !self.shared.auto_connect.load(Ordering::SeqCst)
        {
            KeeperState::Connecting
        } else {
            state
        };
        self.shared.connections.insert(
            handle,
            Connection {
                session_id,
                state: initial,
            },
        );
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        self.log(
            "INFO",
            &format!(
                "initiating session 0x{session_id:x} to {hosts}, timeout={}ms",
                session_timeout.as_millis()
            ),
        );
        debug!(?handle, session_id, ?initial, "Memory transport opened session");
        if initial != KeeperState::Connecting {
            self.emit_session(handle, initial);
        }
        Ok(handle)
    }

    fn close(&self, handle: SessionHandle) -> Result<(), TransportError> {
        let (_, connection) = self
            .shared
            .connections
            .remove(&handle)
            .ok_or(TransportError::InvalidHandle)?;
        self.shared.tree.lock().clear_watches(handle);
        if let Some((_, callback)) = self.shared.callbacks.remove(&handle) {
            self.shared
                .retired
                .retain(|_, retired| retired.strong_count() > 0);
            self.shared.retired.insert(handle, Arc::downgrade(&callback));
        }
        if !connection.state.is_terminal() {
            self.end_session(connection.session_id);
        }
        self.log(
            "INFO",
            &format!("closing session 0x{:x}", connection.session_id),
        );
        debug!(?handle, "Memory transport closed handle");
        Ok(())
    }

    fn session_id(&self, handle: SessionHandle) -> Option<SessionId> {
        let connection = *self.shared.connections.get(&handle)?;
        self.shared
            .server_sessions
            .lock()
            .get(&connection.session_id)
            .map(|session| SessionId {
                id: connection.session_id,
                password: session.password.clone(),
            })
    }

    fn submit(
        &self,
        handle: SessionHandle,
        request: Request,
        watch: Option<EventCallback>,
        completion: Box<dyn CompletionSink>,
    ) -> Result<(), TransportError> {
        let connection = match self.shared.connections.get(&handle) {
            Some(entry) => *entry,
            None => return Err(TransportError::InvalidHandle),
        };
        if watch.is_some() && !request.accepts_watch() {
            return Err(TransportError::WatchNotSupported);
        }
        self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        trace!(?handle, op = request.name(), path = ?request.path(), "Memory transport request");

        let outcome = match connection.state {
            KeeperState::Connected => {
                self.execute(handle, connection.session_id, request, watch)
            }
            KeeperState::ExpiredSession => Err(StatusCode::SessionExpired),
            KeeperState::AuthFailed => Err(StatusCode::AuthFailed),
            KeeperState::Connecting | KeeperState::Associating => {
                Err(StatusCode::ConnectionLoss)
            }
        };
        let (status, reply, firings) = match outcome {
            Ok((reply, firings)) => (StatusCode::Ok, reply, firings),
            Err(status) => (status, Reply::None, Vec::new()),
        };
        self.deliver(Box::new(move || {
            for (callback, event) in firings {
                callback(event);
            }
            completion.complete(status, reply);
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    struct Capture(std_mpsc::Sender<(StatusCode, Reply)>);

    impl CompletionSink for Capture {
        fn complete(self: Box<Self>, status: StatusCode, reply: Reply) {
            let _ = self.0.send((status, reply));
        }
    }

    fn noop_callback() -> EventCallback {
        Arc::new(|_| {})
    }

    fn call(
        transport: &MemoryTransport,
        handle: SessionHandle,
        request: Request,
    ) -> (StatusCode, Reply) {
        let (tx, rx) = std_mpsc::channel();
        transport
            .submit(handle, request, None, Box::new(Capture(tx)))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    fn create(path: &str, mode: CreateMode) -> Request {
        Request::Create {
            path: path.to_string(),
            data: Bytes::from_static(b"x"),
            acl: Acl::open_unsafe(),
            mode,
        }
    }

    #[test]
    fn test_sequential_nodes_get_increasing_suffix() {
        let transport = MemoryTransport::new();
        let handle = transport
            .open("mem", Duration::from_secs(10), None, noop_callback())
            .unwrap();
        call(&transport, handle, create("/q", CreateMode::PERSISTENT));
        let mode = CreateMode {
            ephemeral: false,
            sequential: true,
        };
        let (_, first) = call(&transport, handle, create("/q/item-", mode));
        let (_, second) = call(&transport, handle, create("/q/item-", mode));
        assert_eq!(
            first,
            Reply::Value(ReplyValue::Path("/q/item-0000000000".to_string()))
        );
        assert_eq!(
            second,
            Reply::Value(ReplyValue::Path("/q/item-0000000001".to_string()))
        );
    }

    #[test]
    fn test_close_removes_ephemeral_nodes() {
        let transport = MemoryTransport::new();
        let handle = transport
            .open("mem", Duration::from_secs(10), None, noop_callback())
            .unwrap();
        call(&transport, handle, create("/eph", CreateMode::EPHEMERAL));
        assert!(transport.node_data("/eph").is_some());
        transport.close(handle).unwrap();
        assert!(transport.node_data("/eph").is_none());
        assert_eq!(transport.close(handle), Err(TransportError::InvalidHandle));
    }

    #[test]
    fn test_close_releases_session_callback() {
        let transport = MemoryTransport::new();
        let callback = noop_callback();
        let weak = Arc::downgrade(&callback);
        let handle = transport
            .open("mem", Duration::from_secs(10), None, callback.clone())
            .unwrap();
        transport.close(handle).unwrap();
        assert!(transport.flush(Duration::from_secs(5)));
        assert_eq!(Arc::strong_count(&callback), 1);

        // Latent events still reach a callback its owner keeps alive.
        assert!(transport.inject_event(RawEvent::session(handle, KeeperState::Connected)));
        assert!(transport.flush(Duration::from_secs(5)));
        drop(callback);
        assert!(weak.upgrade().is_none());
        assert!(!transport.inject_event(RawEvent::session(handle, KeeperState::Connected)));
    }

    #[test]
    fn test_requests_fail_with_connection_loss_while_disconnected() {
        let transport = MemoryTransport::new();
        let handle = transport
            .open("mem", Duration::from_secs(10), None, noop_callback())
            .unwrap();
        transport.disconnect(handle);
        let (status, _) = call(
            &transport,
            handle,
            Request::Exists {
                path: "/".to_string(),
            },
        );
        assert_eq!(status, StatusCode::ConnectionLoss);
    }

    #[test]
    fn test_resuming_unknown_session_reports_expiry() {
        let transport = MemoryTransport::new();
        let (tx, rx) = std_mpsc::channel();
        let callback: EventCallback = Arc::new(move |event| {
            let _ = tx.send(event.state);
        });
        let prior = SessionId {
            id: 42,
            password: vec![1, 2, 3],
        };
        transport
            .open("mem", Duration::from_secs(10), Some(&prior), callback)
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            KeeperState::ExpiredSession
        );
    }

    #[test]
    fn test_acl_denies_unauthenticated_reads() {
        let transport = MemoryTransport::new();
        let handle = transport
            .open("mem", Duration::from_secs(10), None, noop_callback())
            .unwrap();
        let acl = vec![Acl::new(Permissions::ALL, "digest", "user:secret")];
        let (status, _) = call(
            &transport,
            handle,
            Request::Create {
                path: "/locked".to_string(),
                data: Bytes::new(),
                acl,
                mode: CreateMode::PERSISTENT,
            },
        );
        assert_eq!(status, StatusCode::Ok);

        let get = Request::GetData {
            path: "/locked".to_string(),
        };
        assert_eq!(call(&transport, handle, get.clone()).0, StatusCode::NoAuth);
        call(
            &transport,
            handle,
            Request::AddAuth {
                scheme: "digest".to_string(),
                credential: Bytes::from_static(b"user:secret"),
            },
        );
        assert_eq!(call(&transport, handle, get).0, StatusCode::Ok);
    }
}
