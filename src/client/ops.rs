//! 完成回调的延续对象与应答解码。
//! Completion continuations and reply decoding.
//!
//! The transport completes each request with a status and a [`Reply`] tagged
//! by arity. [`normalize`] maps that onto no-value / value / value-plus-stat,
//! converting the raw stat into a [`NodeStat`]; each operation then extracts
//! its own typed result.
//!
//! 传输层以状态码和按元数打标签的 [`Reply`] 完成每个请求。[`normalize`] 将其映射为
//! 无值 / 单值 / 值加 stat 三种形态，并把原始 stat 转换为 [`NodeStat`]；
//! 每个操作再从中提取自己的类型化结果。

use crate::{
    async_result::AsyncResult,
    error::{Error, Result},
    protocol::{NodeStat, StatusCode},
    transport::{CompletionSink, Reply, ReplyValue},
};
use bytes::Bytes;

/// A decoder turning one completion into an operation's typed result.
/// 把一次完成回调转换为操作的类型化结果的解码器。
pub(crate) type Decoder<T> = fn(StatusCode, Reply) -> Result<T>;

/// A normalized successful completion.
/// 规范化后的成功完成结果。
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Nothing,
    Value(ReplyValue),
    ValueWithStat(Bytes, NodeStat),
}

/// The generic completion adapter: any non-OK status becomes the matching error.
/// 通用的完成适配器：任何非 OK 状态都会转换为对应的错误。
pub(crate) fn normalize(status: StatusCode, reply: Reply) -> Result<Outcome> {
    if !status.is_ok() {
        return Err(Error::from_status(status));
    }
    Ok(match reply {
        Reply::None => Outcome::Nothing,
        Reply::Value(value) => Outcome::Value(value),
        Reply::ValueWithStat(data, stat) => Outcome::ValueWithStat(data, NodeStat::from(stat)),
    })
}

/// Typed result sink handed to the transport as its completion.
///
/// 作为完成回调交给传输层的类型化结果接收器。
pub(crate) struct Continuation<T> {
    sink: AsyncResult<T>,
    decode: Decoder<T>,
}

impl<T: Clone + Send + 'static> Continuation<T> {
    pub(crate) fn new(sink: AsyncResult<T>, decode: Decoder<T>) -> Self {
        Self { sink, decode }
    }
}

impl<T: Clone + Send + 'static> CompletionSink for Continuation<T> {
    fn complete(self: Box<Self>, status: StatusCode, reply: Reply) {
        let outcome = (self.decode)(status, reply);
        self.sink.resolve(outcome);
    }
}

pub(crate) fn decode_unit(status: StatusCode, reply: Reply) -> Result<()> {
    match normalize(status, reply)? {
        Outcome::Nothing => Ok(()),
        _ => Err(Error::UnexpectedReply {
            expected: "no value",
        }),
    }
}

pub(crate) fn decode_path(status: StatusCode, reply: Reply) -> Result<String> {
    match normalize(status, reply)? {
        Outcome::Value(ReplyValue::Path(path)) => Ok(path),
        _ => Err(Error::UnexpectedReply { expected: "path" }),
    }
}

pub(crate) fn decode_stat(status: StatusCode, reply: Reply) -> Result<NodeStat> {
    match normalize(status, reply)? {
        Outcome::Value(ReplyValue::Stat(stat)) => Ok(NodeStat::from(stat)),
        _ => Err(Error::UnexpectedReply { expected: "stat" }),
    }
}

/// A missing node is a successful answer to an existence check.
/// 对于存在性检查，节点不存在是一个成功的答复。
pub(crate) fn decode_exists(status: StatusCode, reply: Reply) -> Result<Option<NodeStat>> {
    if status == StatusCode::NoNode {
        return Ok(None);
    }
    decode_stat(status, reply).map(Some)
}

pub(crate) fn decode_data(status: StatusCode, reply: Reply) -> Result<(Bytes, NodeStat)> {
    match normalize(status, reply)? {
        Outcome::ValueWithStat(data, stat) => Ok((data, stat)),
        _ => Err(Error::UnexpectedReply {
            expected: "value and stat",
        }),
    }
}

pub(crate) fn decode_children(status: StatusCode, reply: Reply) -> Result<Vec<String>> {
    match normalize(status, reply)? {
        Outcome::Value(ReplyValue::Children(children)) => Ok(children),
        _ => Err(Error::UnexpectedReply {
            expected: "children",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RawStat;

    fn raw(version: i32) -> RawStat {
        RawStat {
            version,
            ..RawStat::default()
        }
    }

    #[test]
    fn test_normalize_by_arity() {
        assert_eq!(normalize(StatusCode::Ok, Reply::None), Ok(Outcome::Nothing));
        assert_eq!(
            normalize(
                StatusCode::Ok,
                Reply::Value(ReplyValue::Path("/a".to_string()))
            ),
            Ok(Outcome::Value(ReplyValue::Path("/a".to_string())))
        );
        assert_eq!(
            normalize(
                StatusCode::Ok,
                Reply::ValueWithStat(Bytes::from_static(b"v"), raw(2))
            ),
            Ok(Outcome::ValueWithStat(
                Bytes::from_static(b"v"),
                NodeStat::from(raw(2))
            ))
        );
    }

    #[test]
    fn test_non_ok_status_becomes_error() {
        assert_eq!(
            decode_stat(StatusCode::BadVersion, Reply::None),
            Err(Error::BadVersion)
        );
        assert_eq!(
            decode_data(StatusCode::NoNode, Reply::None),
            Err(Error::NoNode)
        );
    }

    #[test]
    fn test_exists_treats_missing_node_as_success() {
        assert_eq!(decode_exists(StatusCode::NoNode, Reply::None), Ok(None));
        assert_eq!(
            decode_exists(StatusCode::Ok, Reply::Value(ReplyValue::Stat(raw(1)))),
            Ok(Some(NodeStat::from(raw(1))))
        );
        assert_eq!(
            decode_exists(StatusCode::NoAuth, Reply::None),
            Err(Error::NoAuth)
        );
    }

    #[test]
    fn test_mismatched_reply_shape_is_reported() {
        assert_eq!(
            decode_children(StatusCode::Ok, Reply::None),
            Err(Error::UnexpectedReply {
                expected: "children"
            })
        );
    }
}
