//! 节点元数据。
//! Node metadata.
//!
//! `RawStat` is what the transport reports. `NodeStat` is the typed view the
//! operation facade hands to callers; it is only ever derived from a `RawStat`.
//!
//! `RawStat` 是传输层上报的原始结构。`NodeStat` 是操作门面交给调用者的类型化视图，
//! 只能从 `RawStat` 派生。

/// The stat record exactly as the transport reports it.
/// 传输层上报的原始 stat 记录。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawStat {
    pub czxid: i64,
    pub mzxid: i64,
    /// Milliseconds since the epoch.
    pub ctime: i64,
    /// Milliseconds since the epoch.
    pub mtime: i64,
    pub version: i32,
    pub cversion: i32,
    pub aversion: i32,
    /// Owning session id, or 0 for persistent nodes.
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
    pub pzxid: i64,
}

/// Immutable snapshot of a node's metadata.
///
/// 节点元数据的不可变快照。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat {
    raw: RawStat,
}

impl From<RawStat> for NodeStat {
    fn from(raw: RawStat) -> Self {
        Self { raw }
    }
}

impl NodeStat {
    /// The number of changes to the data of this node.
    /// 该节点数据的变更次数。
    pub fn version(&self) -> i32 {
        self.raw.version
    }

    /// The number of changes to the ACL of this node.
    /// 该节点 ACL 的变更次数。
    pub fn acl_version(&self) -> i32 {
        self.raw.aversion
    }

    /// The number of changes to the children of this node.
    /// 该节点子节点的变更次数。
    pub fn children_version(&self) -> i32 {
        self.raw.cversion
    }

    /// Creation time in seconds since the epoch.
    /// 创建时间，自纪元起的秒数。
    pub fn created(&self) -> f64 {
        self.raw.ctime as f64 / 1000.0
    }

    /// Last modification time in seconds since the epoch.
    /// 最后修改时间，自纪元起的秒数。
    pub fn last_modified(&self) -> f64 {
        self.raw.mtime as f64 / 1000.0
    }

    /// The owning session id if the node is ephemeral, otherwise `None`.
    /// 若为临时节点则返回所属会话 id，否则为 `None`。
    pub fn owner_session_id(&self) -> Option<i64> {
        match self.raw.ephemeral_owner {
            0 => None,
            owner => Some(owner),
        }
    }

    pub fn creation_transaction_id(&self) -> i64 {
        self.raw.czxid
    }

    pub fn last_modified_transaction_id(&self) -> i64 {
        self.raw.mzxid
    }

    /// The transaction id of the last change to this node's children.
    pub fn children_transaction_id(&self) -> i64 {
        self.raw.pzxid
    }

    pub fn data_length(&self) -> i32 {
        self.raw.data_length
    }

    pub fn children_count(&self) -> i32 {
        self.raw.num_children
    }

    /// The underlying record.
    pub fn raw(&self) -> &RawStat {
        &self.raw
    }
}
