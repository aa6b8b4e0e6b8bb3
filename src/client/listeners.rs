//! 连接状态监听器注册表。
//! Registry of connection-state listeners.

use super::state::ConnectionState;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::error;

/// A function invoked with every accepted connection-state transition.
/// 每次被接受的连接状态转换都会调用的函数。
pub type StateListener = Arc<dyn Fn(ConnectionState) + Send + Sync + 'static>;

/// Identifies a registered listener for later removal.
/// 标识已注册的监听器，用于之后移除。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The set of state listeners.
///
/// A listener that panics is logged and skipped; it stays registered and
/// never stops the remaining listeners from running.
///
/// 状态监听器集合。
///
/// 发生 panic 的监听器会被记录并跳过；它仍然保持注册，且不会阻止其余监听器运行。
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<ListenerId, StateListener>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners_count", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: StateListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().insert(id, listener);
        id
    }

    /// Returns whether the listener was registered.
    /// 返回该监听器此前是否已注册。
    pub fn remove(&self, id: ListenerId) -> bool {
        self.listeners.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every listener with `state`. The lock is not held while
    /// listeners run, so they may add or remove listeners.
    ///
    /// 以 `state` 调用每个监听器。监听器运行期间不持有锁，因此它们可以添加或移除监听器。
    pub fn notify(&self, state: ConnectionState) {
        let snapshot: Vec<StateListener> = self.listeners.lock().values().cloned().collect();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
                error!(?state, "Error in connection state listener");
            }
        }
    }
}
