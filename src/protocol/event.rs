//! 会话状态与监视事件。
//! Session states and watch events.

/// Low-level session state reported by the transport.
/// 传输层报告的底层会话状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeeperState {
    /// The session identity was rejected; all ephemeral nodes are gone.
    /// 会话身份被拒绝；所有临时节点都已消失。
    ExpiredSession,
    /// Authentication failed. Unrecoverable for this session.
    /// 认证失败。该会话不可恢复。
    AuthFailed,
    /// Attempting to establish a connection.
    /// 正在尝试建立连接。
    Connecting,
    Associating,
    Connected,
}

impl KeeperState {
    pub fn code(self) -> i32 {
        match self {
            KeeperState::ExpiredSession => -112,
            KeeperState::AuthFailed => -113,
            KeeperState::Connecting => 1,
            KeeperState::Associating => 2,
            KeeperState::Connected => 3,
        }
    }

    /// Whether this state invalidates the session for good.
    /// 该状态是否使会话永久失效。
    pub fn is_terminal(self) -> bool {
        matches!(self, KeeperState::ExpiredSession | KeeperState::AuthFailed)
    }
}

/// The kind of change a raw event reports.
/// 原始事件所报告的变更类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A node has been created.
    /// 节点已创建。
    Created,
    /// A node has been deleted.
    /// 节点已删除。
    Deleted,
    /// The data of a node has changed.
    /// 节点数据已变更。
    Changed,
    /// A child was added or removed. Says nothing about child data.
    /// 子节点被添加或移除。与子节点的数据无关。
    Child,
    /// Session plumbing. Never reaches user watch functions.
    /// 会话内部事件。永远不会传递给用户的监视函数。
    Session,
    NotWatching,
}

impl EventType {
    pub fn code(self) -> i32 {
        match self {
            EventType::Created => 1,
            EventType::Deleted => 2,
            EventType::Changed => 3,
            EventType::Child => 4,
            EventType::Session => -1,
            EventType::NotWatching => -2,
        }
    }
}

/// A change a watch function responds to.
///
/// 监视函数所响应的一次变更。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub event_type: EventType,
    pub state: KeeperState,
    pub path: String,
}

impl WatchedEvent {
    pub fn new(event_type: EventType, state: KeeperState, path: impl Into<String>) -> Self {
        Self {
            event_type,
            state,
            path: path.into(),
        }
    }
}
