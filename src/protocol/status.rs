//! 传输层完成回调中的状态码。
//! Status codes carried by transport completion callbacks.

/// A completion status as reported by the transport.
/// 传输层报告的完成状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    SystemError,
    RuntimeInconsistency,
    DataInconsistency,
    ConnectionLoss,
    MarshallingError,
    Unimplemented,
    OperationTimeout,
    BadArguments,
    InvalidState,
    ApiError,
    NoNode,
    NoAuth,
    BadVersion,
    NoChildrenForEphemerals,
    NodeExists,
    NotEmpty,
    SessionExpired,
    InvalidCallback,
    InvalidAcl,
    AuthFailed,
    Closing,
    Nothing,
    SessionMoved,
    Unknown(i32),
}

impl StatusCode {
    /// Maps a native integer code onto a status.
    /// 将原生整数状态码映射为状态。
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => StatusCode::Ok,
            -1 => StatusCode::SystemError,
            -2 => StatusCode::RuntimeInconsistency,
            -3 => StatusCode::DataInconsistency,
            -4 => StatusCode::ConnectionLoss,
            -5 => StatusCode::MarshallingError,
            -6 => StatusCode::Unimplemented,
            -7 => StatusCode::OperationTimeout,
            -8 => StatusCode::BadArguments,
            -9 => StatusCode::InvalidState,
            -100 => StatusCode::ApiError,
            -101 => StatusCode::NoNode,
            -102 => StatusCode::NoAuth,
            -103 => StatusCode::BadVersion,
            -108 => StatusCode::NoChildrenForEphemerals,
            -110 => StatusCode::NodeExists,
            -111 => StatusCode::NotEmpty,
            -112 => StatusCode::SessionExpired,
            -113 => StatusCode::InvalidCallback,
            -114 => StatusCode::InvalidAcl,
            -115 => StatusCode::AuthFailed,
            -116 => StatusCode::Closing,
            -117 => StatusCode::Nothing,
            -118 => StatusCode::SessionMoved,
            other => StatusCode::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::SystemError => -1,
            StatusCode::RuntimeInconsistency => -2,
            StatusCode::DataInconsistency => -3,
            StatusCode::ConnectionLoss => -4,
            StatusCode::MarshallingError => -5,
            StatusCode::Unimplemented => -6,
            StatusCode::OperationTimeout => -7,
            StatusCode::BadArguments => -8,
            StatusCode::InvalidState => -9,
            StatusCode::ApiError => -100,
            StatusCode::NoNode => -101,
            StatusCode::NoAuth => -102,
            StatusCode::BadVersion => -103,
            StatusCode::NoChildrenForEphemerals => -108,
            StatusCode::NodeExists => -110,
            StatusCode::NotEmpty => -111,
            StatusCode::SessionExpired => -112,
            StatusCode::InvalidCallback => -113,
            StatusCode::InvalidAcl => -114,
            StatusCode::AuthFailed => -115,
            StatusCode::Closing => -116,
            StatusCode::Nothing => -117,
            StatusCode::SessionMoved => -118,
            StatusCode::Unknown(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}
