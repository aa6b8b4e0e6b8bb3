//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use crate::protocol::StatusCode;
use thiserror::Error;

/// The primary error type for the session layer.
/// 会话层的主要错误类型。
///
/// `Error` is `Clone` because a resolved [`AsyncResult`](crate::AsyncResult)
/// hands the same outcome to every waiter.
///
/// `Error` 实现了 `Clone`，因为一个已完成的 `AsyncResult` 会把同一个结果交给所有等待者。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid construction or call arguments. Always raised synchronously.
    /// 无效的构造参数或调用参数。总是同步返回。
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The client was intentionally stopped; call `connect` before issuing commands.
    /// 客户端已被主动停止；在发出命令之前需要先调用 `connect`。
    #[error("the client is stopped, call connect before running commands that talk to the server")]
    Stopped,

    /// No live session handle exists but the client was not stopped. Callers should retry.
    /// 当前没有有效的会话句柄，但客户端并未被停止。调用者应当重试。
    #[error("connection loss")]
    ConnectionLoss,

    /// A blocking wait exceeded its deadline. The underlying result stays unresolved.
    /// 阻塞等待超过了截止时间。底层结果仍保持未完成。
    #[error("timed out waiting for result")]
    Timeout,

    /// The node does not exist.
    /// 节点不存在。
    #[error("node does not exist")]
    NoNode,

    /// The node already exists.
    /// 节点已存在。
    #[error("node already exists")]
    NodeExists,

    /// The expected version does not match the node's version.
    /// 期望的版本与节点版本不匹配。
    #[error("version conflict")]
    BadVersion,

    /// Not authenticated for this operation.
    /// 无权执行该操作。
    #[error("not authenticated")]
    NoAuth,

    /// The node has children.
    /// 节点存在子节点。
    #[error("node has children")]
    NotEmpty,

    /// Ephemeral nodes may not have children.
    /// 临时节点不能拥有子节点。
    #[error("ephemeral nodes may not have children")]
    NoChildrenForEphemerals,

    #[error("invalid ACL specified")]
    InvalidAcl,

    #[error("client authentication failed")]
    AuthFailed,

    #[error("session expired")]
    SessionExpired,

    #[error("session moved to another server")]
    SessionMoved,

    #[error("invalid arguments")]
    BadArguments,

    #[error("operation timeout")]
    OperationTimeout,

    #[error("error while marshalling or unmarshalling data")]
    MarshallingError,

    #[error("operation is unimplemented")]
    Unimplemented,

    #[error("invalid handle state")]
    InvalidState,

    #[error("invalid callback specified")]
    InvalidCallback,

    #[error("server is closing")]
    Closing,

    #[error("runtime inconsistency found")]
    RuntimeInconsistency,

    #[error("data inconsistency found")]
    DataInconsistency,

    #[error("system error")]
    SystemError,

    #[error("api error")]
    ApiError,

    #[error("no server responses to process")]
    Nothing,

    /// A status code this layer does not know.
    /// 本层未知的状态码。
    #[error("unknown error code {0}")]
    Unknown(i32),

    /// The transport answered with a reply shape that does not match the operation.
    /// 传输层返回的应答形态与操作不匹配。
    #[error("unexpected reply, expected {expected}")]
    UnexpectedReply { expected: &'static str },

    /// The transport refused a call for a reason other than a missing handle.
    /// 传输层因句柄缺失以外的原因拒绝了调用。
    #[error("transport error: {0}")]
    Transport(String),
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Decodes a non-OK transport status into its error kind.
    ///
    /// `StatusCode::Ok` has no error counterpart and decodes to
    /// `Error::Unknown(0)`; callers check for success first.
    ///
    /// 将非 OK 的传输状态码解码为对应的错误类型。
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::Ok => Error::Unknown(0),
            StatusCode::SystemError => Error::SystemError,
            StatusCode::RuntimeInconsistency => Error::RuntimeInconsistency,
            StatusCode::DataInconsistency => Error::DataInconsistency,
            StatusCode::ConnectionLoss => Error::ConnectionLoss,
            StatusCode::MarshallingError => Error::MarshallingError,
            StatusCode::Unimplemented => Error::Unimplemented,
            StatusCode::OperationTimeout => Error::OperationTimeout,
            StatusCode::BadArguments => Error::BadArguments,
            StatusCode::InvalidState => Error::InvalidState,
            StatusCode::ApiError => Error::ApiError,
            StatusCode::NoNode => Error::NoNode,
            StatusCode::NoAuth => Error::NoAuth,
            StatusCode::BadVersion => Error::BadVersion,
            StatusCode::NoChildrenForEphemerals => Error::NoChildrenForEphemerals,
            StatusCode::NodeExists => Error::NodeExists,
            StatusCode::NotEmpty => Error::NotEmpty,
            StatusCode::SessionExpired => Error::SessionExpired,
            StatusCode::InvalidCallback => Error::InvalidCallback,
            StatusCode::InvalidAcl => Error::InvalidAcl,
            StatusCode::AuthFailed => Error::AuthFailed,
            StatusCode::Closing => Error::Closing,
            StatusCode::Nothing => Error::Nothing,
            StatusCode::SessionMoved => Error::SessionMoved,
            StatusCode::Unknown(code) => Error::Unknown(code),
        }
    }

    /// Whether a retry policy should try the operation again.
    /// 重试策略是否应当再次尝试该操作。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConnectionLoss | Error::OperationTimeout)
    }
}

impl From<StatusCode> for Error {
    fn from(status: StatusCode) -> Self {
        Error::from_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_decode_to_specific_kinds() {
        assert_eq!(Error::from_status(StatusCode::NoNode), Error::NoNode);
        assert_eq!(Error::from_status(StatusCode::BadVersion), Error::BadVersion);
        assert_eq!(
            Error::from_status(StatusCode::from_code(-4)),
            Error::ConnectionLoss
        );
        assert_eq!(
            Error::from_status(StatusCode::from_code(-999)),
            Error::Unknown(-999)
        );
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(Error::ConnectionLoss.is_retryable());
        assert!(Error::OperationTimeout.is_retryable());
        assert!(!Error::NoNode.is_retryable());
        assert!(!Error::Stopped.is_retryable());
    }
}
