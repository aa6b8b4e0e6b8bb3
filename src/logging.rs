//! 传输层原生日志到 `tracing` 的桥接。
//! Bridges native transport log lines into `tracing`.
//!
//! Native clients write their own log lines (`<prefix>:ZOO_<LEVEL>@<message>`)
//! to a stream. Instead of redirecting that stream through process-wide
//! state, a `TransportLogBridge` is constructed explicitly, hands out
//! [`LogSink`] writers, and is torn down with [`TransportLogBridge::shutdown`].
//!
//! 原生客户端会把自己的日志行（`<prefix>:ZOO_<LEVEL>@<message>`）写到某个流中。
//! 这里不通过进程级全局状态重定向该流，而是显式构造 `TransportLogBridge`，
//! 由它分发 [`LogSink`] 写入端，并通过 [`TransportLogBridge::shutdown`] 显式销毁。

use crate::error::{Error, Result};
use std::{
    io::{self, Write},
    thread::{self, JoinHandle},
};
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, trace, warn};

/// Target under which forwarded lines are emitted.
/// 转发日志行所使用的 target。
pub const TRANSPORT_LOG_TARGET: &str = "zookeeper";

enum Message {
    Line(String),
    Shutdown,
}

/// A parsed native log line.
/// 解析后的原生日志行。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord<'a> {
    pub level: Level,
    pub message: &'a str,
}

/// Parses `<prefix>:ZOO_<LEVEL>@<message>`. Lines without `@`, or with an
/// unknown level, are reported at INFO with the whole line as message.
///
/// 解析 `<prefix>:ZOO_<LEVEL>@<message>`。不含 `@` 或级别未知的行以 INFO 级别上报，
/// 整行作为消息。
pub fn parse_line(line: &str) -> LogRecord<'_> {
    let line = line.trim();
    let Some((head, message)) = line.split_once('@') else {
        return LogRecord {
            level: Level::INFO,
            message: line,
        };
    };
    let level = match head.rsplit(':').next() {
        Some("ZOO_ERROR") => Level::ERROR,
        Some("ZOO_WARN") => Level::WARN,
        Some("ZOO_INFO") => Level::INFO,
        Some("ZOO_DEBUG") => Level::DEBUG,
        _ => {
            return LogRecord {
                level: Level::INFO,
                message: line,
            };
        }
    };
    LogRecord { level, message }
}

fn emit(record: LogRecord<'_>) {
    let message = record.message;
    if record.level == Level::ERROR {
        error!(target: TRANSPORT_LOG_TARGET, "{message}");
    } else if record.level == Level::WARN {
        warn!(target: TRANSPORT_LOG_TARGET, "{message}");
    } else if record.level == Level::INFO {
        info!(target: TRANSPORT_LOG_TARGET, "{message}");
    } else if record.level == Level::DEBUG {
        debug!(target: TRANSPORT_LOG_TARGET, "{message}");
    } else {
        trace!(target: TRANSPORT_LOG_TARGET, "{message}");
    }
}

/// A writer handed to the transport. Bytes are split into lines and forwarded.
///
/// 交给传输层的写入端。字节会按行切分并转发。
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<Message>,
    pending: Vec<u8>,
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim_end().to_string();
            if line.is_empty() {
                continue;
            }
            self.tx
                .send(Message::Line(line))
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The running bridge: a reader thread that re-emits lines through `tracing`.
///
/// 运行中的桥接：一个通过 `tracing` 重新输出日志行的读取线程。
#[derive(Debug)]
pub struct TransportLogBridge {
    tx: mpsc::UnboundedSender<Message>,
    thread: Option<JoinHandle<usize>>,
}

impl TransportLogBridge {
    /// Starts the reader thread.
    /// 启动读取线程。
    pub fn start() -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let thread = thread::Builder::new()
            .name("zk-session-log".to_string())
            .spawn(move || {
                let mut forwarded = 0;
                while let Some(message) = rx.blocking_recv() {
                    match message {
                        Message::Line(line) => {
                            emit(parse_line(&line));
                            forwarded += 1;
                        }
                        Message::Shutdown => break,
                    }
                }
                forwarded
            })
            .map_err(|e| Error::Configuration(format!("failed to spawn log bridge: {e}")))?;
        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    /// A new writer feeding this bridge.
    /// 一个向本桥接写入的新写入端。
    pub fn sink(&self) -> LogSink {
        LogSink {
            tx: self.tx.clone(),
            pending: Vec::new(),
        }
    }

    /// Forwards everything already written, stops the reader thread and
    /// returns how many lines were forwarded. Sinks fail with `BrokenPipe` afterwards.
    ///
    /// 转发所有已写入的内容，停止读取线程，并返回转发的行数。之后写入端会以 `BrokenPipe` 失败。
    pub fn shutdown(mut self) -> usize {
        self.stop()
    }

    fn stop(&mut self) -> usize {
        let _ = self.tx.send(Message::Shutdown);
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| {
                error!("Transport log bridge thread panicked");
                0
            }),
            None => 0,
        }
    }
}

impl Drop for TransportLogBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
