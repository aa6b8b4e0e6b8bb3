//! 单次赋值的异步结果。
//! A single-assignment asynchronous result.
//!
//! Every operation allocates one `AsyncResult`, hands a clone of it to the
//! transport completion, and returns another clone to the caller. The result
//! is resolved exactly once, with a value or with an error. The first
//! resolution wins; any later `set`/`set_exception` is ignored and reports
//! `false`.
//!
//! 每个操作分配一个 `AsyncResult`，把一份克隆交给传输层的完成回调，另一份返回给调用者。
//! 结果只会被完成一次：成功值或错误。以第一次完成为准；之后的 `set`/`set_exception`
//! 会被忽略并返回 `false`。

use crate::{
    error::{Error, Result},
    handler::{Callback, Handler},
};
use parking_lot::{Condvar, Mutex};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Notify;

type DoneCallback<T> = Box<dyn FnOnce(&AsyncResult<T>) + Send + 'static>;

struct Slot<T> {
    outcome: Option<Result<T>>,
    callbacks: Vec<DoneCallback<T>>,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
    notify: Notify,
    handler: Arc<dyn Handler>,
}

/// A write-once container for the outcome of one call.
///
/// Clones share the same slot. Any number of threads may block on it, and
/// tokio tasks may await it with [`AsyncResult::wait_async`].
///
/// 单次调用结果的一次性写入容器。
///
/// 克隆体共享同一个槽位。任意数量的线程可以阻塞等待它，tokio 任务可以通过
/// [`AsyncResult::wait_async`] 等待它。
pub struct AsyncResult<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.slot.lock();
        let state = match &slot.outcome {
            None => "pending",
            Some(Ok(_)) => "value",
            Some(Err(_)) => "error",
        };
        f.debug_struct("AsyncResult")
            .field("state", &state)
            .field("handler", &self.inner.handler.name())
            .finish()
    }
}

impl<T: Clone + Send + 'static> AsyncResult<T> {
    /// Creates an unresolved result whose done-callbacks run on `handler`.
    /// 创建一个未完成的结果，其完成回调在 `handler` 上运行。
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    outcome: None,
                    callbacks: Vec::new(),
                }),
                cond: Condvar::new(),
                notify: Notify::new(),
                handler,
            }),
        }
    }

    /// Resolves with a value. Returns `false` if already resolved.
    /// 以成功值完成。若已完成则返回 `false`。
    pub fn set(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolves with an error. Returns `false` if already resolved.
    /// 以错误完成。若已完成则返回 `false`。
    pub fn set_exception(&self, error: Error) -> bool {
        self.resolve(Err(error))
    }

    /// Resolves with either outcome. Returns `false` if already resolved.
    /// 以任一结果完成。若已完成则返回 `false`。
    pub fn resolve(&self, outcome: Result<T>) -> bool {
        let callbacks = {
            let mut slot = self.inner.slot.lock();
            if slot.outcome.is_some() {
                return false;
            }
            slot.outcome = Some(outcome);
            self.inner.cond.notify_all();
            std::mem::take(&mut slot.callbacks)
        };
        self.inner.notify.notify_waiters();
        for callback in callbacks {
            self.schedule(callback);
        }
        true
    }

    pub fn ready(&self) -> bool {
        self.inner.slot.lock().outcome.is_some()
    }

    /// Whether the result resolved with a value. `false` while pending.
    /// 结果是否以成功值完成。未完成时为 `false`。
    pub fn successful(&self) -> bool {
        matches!(self.inner.slot.lock().outcome, Some(Ok(_)))
    }

    /// The outcome if resolved, without blocking.
    /// 若已完成则返回结果，不阻塞。
    pub fn peek(&self) -> Option<Result<T>> {
        self.inner.slot.lock().outcome.clone()
    }

    /// Blocks until resolved or `timeout` elapses, then returns the value or
    /// the stored error. An elapsed timeout yields the handler's
    /// [`timeout_error`](Handler::timeout_error) (`Error::Timeout` by default)
    /// and leaves the result unresolved.
    ///
    /// 阻塞直到完成或 `timeout` 到期，然后返回成功值或存储的错误。
    /// 超时返回处理器的 [`timeout_error`](Handler::timeout_error)（默认为 `Error::Timeout`），
    /// 且结果保持未完成。
    pub fn get(&self, timeout: Option<Duration>) -> Result<T> {
        let mut slot = self.inner.slot.lock();
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(outcome) = &slot.outcome {
                return outcome.clone();
            }
            match deadline {
                None => self.inner.cond.wait(&mut slot),
                Some(deadline) => {
                    if self.inner.cond.wait_until(&mut slot, deadline).timed_out()
                        && slot.outcome.is_none()
                    {
                        return Err(self.inner.handler.timeout_error());
                    }
                }
            }
        }
    }

    /// Blocks until resolved or `timeout` elapses without raising.
    /// Returns whether resolution occurred.
    ///
    /// 阻塞直到完成或 `timeout` 到期，不返回错误。返回是否已完成。
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let _ = self.get(timeout);
        self.ready()
    }

    /// Awaits resolution from an async context.
    /// 在异步上下文中等待完成。
    pub async fn wait_async(&self) -> Result<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(outcome) = self.peek() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Attaches a callback run on the handler once the result resolves.
    /// If already resolved it is scheduled immediately.
    ///
    /// 附加一个在结果完成后于处理器上运行的回调。若已完成则立即调度。
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&AsyncResult<T>) + Send + 'static,
    {
        let callback: DoneCallback<T> = Box::new(callback);
        {
            let mut slot = self.inner.slot.lock();
            if slot.outcome.is_none() {
                slot.callbacks.push(callback);
                return;
            }
        }
        self.schedule(callback);
    }

    fn schedule(&self, callback: DoneCallback<T>) {
        let result = self.clone();
        self.inner
            .handler
            .dispatch_callback(Callback::completion(move || callback(&result)));
    }
}
