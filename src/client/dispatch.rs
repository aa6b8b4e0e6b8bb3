//! 回调分发引擎：把传输层的原始回调包装为会话回调与监视回调。
//! Callback dispatch engine: wraps raw transport callbacks into session and watch callbacks.
//!
//! Both wrappers run on the transport thread and do nothing but build a
//! [`Callback`] record and hand it to the handler. The session wrapper forwards
//! every event, since only the state machine decides relevance. The watch
//! wrapper drops session plumbing and fires the user function at most once.
//!
//! 两个包装器都运行在传输线程上，只负责构建 [`Callback`] 记录并交给处理器。
//! 会话包装器转发每一个事件，因为只有状态机决定其相关性。
//! 监视包装器丢弃会话内部事件，并且最多触发一次用户函数。

use crate::{
    handler::{Callback, Handler},
    protocol::{EventType, WatchedEvent},
    transport::{EventCallback, RawEvent},
};
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{Arc, Weak},
};
use tracing::trace;

/// A one-shot user watch function.
///
/// 一次性的用户监视函数。
pub struct Watcher {
    func: Box<dyn FnOnce(WatchedEvent) + Send + 'static>,
}

impl Watcher {
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce(WatchedEvent) + Send + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }

    fn fire(self, event: WatchedEvent) {
        (self.func)(event)
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Watcher")
    }
}

/// Wraps the state machine's session handler so it runs on `handler`.
///
/// The transport may keep the wrapper after the session is closed, so it only
/// holds the handler weakly. Events arriving after the handler is gone are
/// dropped.
///
/// 包装状态机的会话处理函数，使其在 `handler` 上运行。
///
/// 会话关闭后传输层可能仍保留该包装器，因此它只弱引用处理器。
/// 处理器释放后到达的事件会被丢弃。
pub(crate) fn wrap_session_callback<F>(handler: Weak<dyn Handler>, func: F) -> EventCallback
where
    F: Fn(RawEvent) + Send + Sync + 'static,
{
    let func = Arc::new(func);
    Arc::new(move |event: RawEvent| {
        let Some(handler) = handler.upgrade() else {
            trace!(handle = ?event.handle, state = ?event.state, "Handler gone, session event dropped");
            return;
        };
        let func = Arc::clone(&func);
        handler.dispatch_callback(Callback::session(move || func(event)));
    })
}

/// Wraps a user watch so it never sees session events and fires at most once.
/// 包装用户监视，使其永远不会收到会话事件，且最多触发一次。
pub(crate) fn wrap_watch_callback(handler: Arc<dyn Handler>, watcher: Watcher) -> EventCallback {
    let slot = Arc::new(Mutex::new(Some(watcher)));
    Arc::new(move |event: RawEvent| {
        if event.event_type == EventType::Session {
            trace!(handle = ?event.handle, state = ?event.state, "Session event withheld from watch");
            return;
        }
        let Some(watcher) = slot.lock().take() else {
            return;
        };
        let watched = WatchedEvent::new(event.event_type, event.state, event.path);
        handler.dispatch_callback(Callback::watch(move || watcher.fire(watched)));
    })
}
