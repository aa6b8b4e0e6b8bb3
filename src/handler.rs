//! 回调处理器抽象。
//! The callback handler abstraction.
//!
//! The transport delivers raw callbacks on a thread the application does not
//! own. A `Handler` takes those callbacks as [`Callback`] records and runs them
//! on its own worker context, so user code never executes on the transport
//! thread.
//!
//! 传输层在应用程序不拥有的线程上投递原始回调。`Handler` 以 [`Callback`] 记录的形式
//! 接收这些回调，并在自己的工作上下文中执行，因此用户代码永远不会在传输线程上运行。

pub mod event;
pub mod sequential;

pub use event::Event;
pub use sequential::SequentialHandler;

use crate::{
    async_result::AsyncResult,
    error::{Error, Result},
};
use std::{fmt, sync::Arc};

/// The flavor of a scheduled callback.
/// 被调度回调的种类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// Internal session event driving the connection state machine.
    /// 驱动连接状态机的内部会话事件。
    Session,
    /// User-facing, one-shot watch notification.
    /// 面向用户的一次性监视通知。
    Watch,
    /// A done-callback attached to an `AsyncResult`.
    /// 附加在 `AsyncResult` 上的完成回调。
    Completion,
}

/// A transient unit of work handed to a handler's scheduler and consumed once.
///
/// 交给处理器调度器的一次性工作单元，只会被消费一次。
pub struct Callback {
    kind: CallbackKind,
    func: Box<dyn FnOnce() + Send + 'static>,
}

impl Callback {
    pub fn new<F>(kind: CallbackKind, func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            kind,
            func: Box::new(func),
        }
    }

    pub fn session<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(CallbackKind::Session, func)
    }

    pub fn watch<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(CallbackKind::Watch, func)
    }

    pub fn completion<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(CallbackKind::Completion, func)
    }

    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    /// Consumes the record and runs it on the calling thread.
    /// 消费该记录并在调用线程上执行。
    pub fn run(self) {
        (self.func)()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("kind", &self.kind).finish()
    }
}

/// Supplies synchronization primitives and a dispatch mechanism for callbacks.
///
/// Implementations decide where callbacks run (thread pool, dedicated
/// thread, cooperative loop). Callbacks of kind `Session` and `Watch` must be
/// executed in the order they were dispatched.
///
/// 提供同步原语以及回调的分发机制。
///
/// 具体实现决定回调在哪里运行（线程池、专用线程或协作式循环）。
/// `Session` 与 `Watch` 类回调必须按分发顺序执行。
///
/// Results bound to a handler are built through [`async_result`], an inherent
/// method on `dyn Handler`, since a generic constructor would make the trait
/// unusable as `Arc<dyn Handler>`. Waits on those results that give up report
/// [`timeout_error`](Handler::timeout_error).
///
/// 与处理器绑定的结果通过 `dyn Handler` 上的固有方法 [`async_result`] 创建，
/// 因为泛型构造方法会使该 trait 无法以 `Arc<dyn Handler>` 形式使用。
/// 在这些结果上等待超时时返回 [`timeout_error`](Handler::timeout_error)。
///
/// [`async_result`]: #method.async_result
pub trait Handler: Send + Sync + 'static {
    /// A short name used in logs.
    /// 用于日志的简短名称。
    fn name(&self) -> &'static str;

    /// Starts the worker context. Idempotent.
    /// 启动工作上下文。幂等。
    fn start(&self) -> Result<()>;

    /// Stops the worker context after draining what was already queued.
    /// 在处理完已排队的回调后停止工作上下文。
    fn stop(&self);

    /// A settable, clearable, waitable flag.
    /// 可设置、可清除、可等待的标志。
    fn event_object(&self) -> Event {
        Event::new()
    }

    /// Schedules a callback for execution outside the caller's thread.
    /// 调度回调在调用者线程之外执行。
    fn dispatch_callback(&self, callback: Callback);

    /// The error a bounded wait returns when it elapses. Distinct from every
    /// error a call itself can resolve with.
    ///
    /// 有界等待到期时返回的错误。与调用本身可能完成的任何错误都不同。
    fn timeout_error(&self) -> Error {
        Error::Timeout
    }
}

impl dyn Handler {
    /// An unresolved [`AsyncResult`] whose done-callbacks run on this handler.
    /// 一个未完成的 [`AsyncResult`]，其完成回调在此处理器上运行。
    pub fn async_result<T>(self: Arc<Self>) -> AsyncResult<T>
    where
        T: Clone + Send + 'static,
    {
        AsyncResult::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::mpsc, time::Duration};

    #[test]
    fn test_async_result_runs_done_callbacks_on_handler() {
        let handler: Arc<dyn Handler> = Arc::new(SequentialHandler::new().unwrap());
        handler.start().unwrap();
        let result = Arc::clone(&handler).async_result::<u32>();
        assert!(!result.ready());

        let (tx, rx) = mpsc::channel();
        result.add_done_callback(move |r| {
            let name = std::thread::current().name().map(str::to_string);
            let _ = tx.send((r.peek(), name));
        });
        assert!(result.set(3));

        let (outcome, thread) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, Some(Ok(3)));
        assert_ne!(thread, std::thread::current().name().map(str::to_string));
        handler.stop();
    }

    #[test]
    fn test_elapsed_wait_reports_timeout_error() {
        let handler: Arc<dyn Handler> = Arc::new(SequentialHandler::new().unwrap());
        assert_eq!(handler.timeout_error(), Error::Timeout);

        let result = Arc::clone(&handler).async_result::<u32>();
        assert_eq!(
            result.get(Some(Duration::from_millis(10))),
            Err(handler.timeout_error())
        );
        assert!(!result.wait(Some(Duration::from_millis(10))));
    }
}
