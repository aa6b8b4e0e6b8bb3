//! 协议层值类型：会话句柄、事件、节点元数据、ACL 与状态码。
//! Protocol-level value types: session handles, events, node metadata, ACLs and status codes.

pub mod acl;
pub mod event;
pub mod stat;
pub mod status;

pub use acl::{Acl, Permissions};
pub use event::{EventType, KeeperState, WatchedEvent};
pub use stat::{NodeStat, RawStat};
pub use status::StatusCode;

use crate::error::{Error, Result};

/// Rejects paths that do not start with `/`.
/// 拒绝不以 `/` 开头的路径。
pub fn validate_path(path: &str) -> Result<()> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "invalid path '{path}', must start with /"
        )))
    }
}

/// Opaque identifier for one transport session.
///
/// A transport hands out a fresh handle on every `open`; handles are compared,
/// never mutated.
///
/// 单个传输会话的不透明标识。
///
/// 传输层在每次 `open` 时分配一个新的句柄；句柄只做比较，从不修改。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

/// Server-side session identity, usable to resume a prior session.
/// 服务端会话身份，可用于恢复之前的会话。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId {
    pub id: i64,
    pub password: Vec<u8>,
}

/// Node creation flags.
/// 节点创建标志。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateMode {
    pub ephemeral: bool,
    pub sequential: bool,
}

impl CreateMode {
    pub const PERSISTENT: CreateMode = CreateMode {
        ephemeral: false,
        sequential: false,
    };
    pub const EPHEMERAL: CreateMode = CreateMode {
        ephemeral: true,
        sequential: false,
    };

    /// Native flag bits (`EPHEMERAL = 1`, `SEQUENCE = 2`).
    /// 原生标志位（`EPHEMERAL = 1`，`SEQUENCE = 2`）。
    pub fn flags(self) -> i32 {
        let mut flags = 0;
        if self.ephemeral {
            flags |= 1;
        }
        if self.sequential {
            flags |= 2;
        }
        flags
    }
}

/// Expected node version for conditional writes.
/// 条件写入时期望的节点版本。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Version {
    /// Matches whatever version the node currently has (`-1` on the wire).
    /// 匹配节点当前的任意版本（线上表示为 `-1`）。
    #[default]
    Any,
    Exact(i32),
}

impl Version {
    pub fn as_raw(self) -> i32 {
        match self {
            Version::Any => -1,
            Version::Exact(v) => v,
        }
    }

    pub fn matches(self, actual: i32) -> bool {
        match self {
            Version::Any => true,
            Version::Exact(v) => v == actual,
        }
    }
}

impl From<i32> for Version {
    fn from(raw: i32) -> Self {
        if raw == -1 {
            Version::Any
        } else {
            Version::Exact(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mode_flags() {
        assert_eq!(CreateMode::PERSISTENT.flags(), 0);
        assert_eq!(CreateMode::EPHEMERAL.flags(), 1);
        let mode = CreateMode {
            ephemeral: true,
            sequential: true,
        };
        assert_eq!(mode.flags(), 3);
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/a/b").is_ok());
        assert!(matches!(validate_path("a/b"), Err(Error::Configuration(_))));
        assert!(validate_path("").is_err());
    }

    #[test]
    fn test_version_sentinel() {
        assert_eq!(Version::from(-1), Version::Any);
        assert_eq!(Version::Any.as_raw(), -1);
        assert!(Version::Any.matches(42));
        assert!(Version::Exact(5).matches(5));
        assert!(!Version::Exact(3).matches(5));
    }
}
