//! 连接状态机。
//! The connection state machine.
//!
//! All writes to the session handle and the connection state funnel through
//! this module: the session-event handler with its stop-aware reconnect,
//! `connect_async`, and `safe_close` (used by `stop`/`restart`). The handle lock is always taken before the
//! state lock, and listeners are notified only after both are released.
//!
//! 对会话句柄和连接状态的所有写操作都经过本模块：会话事件处理函数及其感知停止的重连、`connect_async`
//! 以及 `safe_close`（由 `stop`/`restart` 使用）。总是先获取句柄锁再获取状态锁，
//! 并且只在两把锁都释放之后才通知监听器。

use super::{ClientInner, SessionSlot};
use crate::{
    error::{Error, Result},
    handler::Event,
    protocol::{EventType, KeeperState, WatchedEvent},
    transport::RawEvent,
};
use tracing::{debug, error, info, trace, warn};

/// High level connection state, as seen by listeners.
///
/// 监听器所看到的高层连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// The session is confirmed dead. Ephemeral nodes must be recreated
    /// once a new session is established. Also the initial state.
    /// 会话已确认失效。新会话建立后需要重新创建临时节点。也是初始状态。
    Lost,
    /// The connection dropped but the session may still be recovered.
    /// 连接已断开，但会话仍可能恢复。
    Suspended,
    /// The connection is alive and well.
    /// 连接正常。
    Connected,
}

impl ClientInner {
    /// Sets the current state. Returns `false` for a transition to the same state.
    /// Callers hold the session lock.
    ///
    /// 设置当前状态。转换到相同状态时返回 `false`。调用者持有会话锁。
    fn set_state(&self, new_state: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state == new_state {
            return false;
        }
        info!(from = ?*state, to = ?new_state, "Connection state transition");
        *state = new_state;
        true
    }

    /// Handles one session callback. Runs on the handler, never on the transport thread.
    ///
    /// 处理一次会话回调。在处理器上运行，从不在传输线程上运行。
    pub(super) fn handle_session_event(&self, event: RawEvent) {
        let mut session = self.session.lock();
        if session.handle != Some(event.handle) {
            drop(session);
            debug!(handle = ?event.handle, state = ?event.state, "Discarding event from superseded session");
            // Latent callback from a previous connection.
            if let Err(e) = self.transport.close(event.handle) {
                trace!(handle = ?event.handle, error = %e, "Stale handle already released");
            }
            return;
        }
        if self.stopped.is_set() {
            trace!(handle = ?event.handle, "Ignoring session event after stop");
            return;
        }

        let mut reconnect = false;
        let changed = if event.event_type == EventType::Session {
            let target = match event.state {
                KeeperState::Connected => {
                    self.live.set();
                    ConnectionState::Connected
                }
                KeeperState::ExpiredSession | KeeperState::AuthFailed => {
                    self.live.clear();
                    session.handle = None;
                    // The identity is no longer valid; never try to resume it again.
                    session.resume = None;
                    reconnect = true;
                    ConnectionState::Lost
                }
                KeeperState::Connecting | KeeperState::Associating => {
                    self.live.clear();
                    ConnectionState::Suspended
                }
            };
            self.set_state(target).then_some(target)
        } else {
            None
        };
        drop(session);

        if let Some(state) = changed {
            self.listeners.notify(state);
        }
        if reconnect {
            if let Err(e) = self.transport.close(event.handle) {
                trace!(handle = ?event.handle, error = %e, "Expired handle already released");
            }
            warn!(handle = ?event.handle, state = ?event.state, "Session lost, reconnecting");
            if let Err(e) = self.reconnect() {
                error!(error = %e, "Failed to initiate reconnect");
            }
        }
        if let Some(watcher) = &self.watcher {
            watcher(WatchedEvent::new(event.event_type, event.state, event.path));
        }
    }

    /// Drops and closes the current handle, if any, and moves to `Lost`.
    /// 丢弃并关闭当前句柄（若存在），并转换到 `Lost`。
    pub(super) fn safe_close(&self) {
        let (closed, changed) = {
            let mut session = self.session.lock();
            match session.handle.take() {
                Some(handle) => {
                    self.live.clear();
                    (Some(handle), self.set_state(ConnectionState::Lost))
                }
                None => (None, false),
            }
        };
        if let Some(handle) = closed {
            if let Err(e) = self.transport.close(handle) {
                // Corrupt session or otherwise disconnected.
                debug!(?handle, error = %e, "Close of session handle failed");
            }
        }
        if changed {
            self.listeners.notify(ConnectionState::Lost);
        }
    }

    /// Opens a new session unless already connected. Returns the event that is
    /// set once `Connected` is reached, or `None` when already connected.
    ///
    /// 除非已连接，否则打开一个新会话。返回在到达 `Connected` 时被设置的事件；
    /// 若已连接则返回 `None`。
    pub(super) fn connect_async(&self) -> Result<Option<Event>> {
        if self.live.is_set() {
            return Ok(None);
        }
        self.safe_close();
        self.stopped.clear();

        let mut session = self.session.lock();
        if session.handle.is_none() {
            self.open_session(&mut session)?;
        }
        Ok(Some(self.live.clone()))
    }

    /// Replaces a lost session. Unlike [`connect_async`](Self::connect_async)
    /// this never clears `stopped`: a stop issued at any point before the
    /// session lock is taken wins.
    ///
    /// 替换已丢失的会话。与 [`connect_async`](Self::connect_async) 不同，它从不清除
    /// `stopped`：在获取会话锁之前任何时刻发出的停止都会生效。
    fn reconnect(&self) -> Result<()> {
        let mut session = self.session.lock();
        if self.stopped.is_set() {
            debug!("Client stopped, not reconnecting");
            return Ok(());
        }
        if session.handle.is_some() {
            return Ok(());
        }
        self.open_session(&mut session)
    }

    /// Opens a transport session and records its handle. The caller holds the
    /// session lock across `open` so events for the new handle wait until it
    /// is recorded.
    ///
    /// 打开传输会话并记录其句柄。调用者在 `open` 期间持有会话锁，
    /// 因此新句柄的事件会等到句柄被记录之后才处理。
    fn open_session(&self, session: &mut SessionSlot) -> Result<()> {
        let handle = self
            .transport
            .open(
                &self.config.hosts,
                self.config.session_timeout,
                session.resume.as_ref(),
                self.session_callback.clone(),
            )
            .map_err(|e| Error::Transport(e.to_string()))?;
        session.handle = Some(handle);
        info!(
            ?handle,
            hosts = %self.config.hosts,
            resumed = session.resume.is_some(),
            "Session opened"
        );
        Ok(())
    }
}
