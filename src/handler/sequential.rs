//! 基于专用线程的顺序处理器。
//! A sequential handler backed by dedicated threads.
//!
//! Two workers are used: one for session and watch callbacks, one for
//! completion callbacks. A slow done-callback therefore never delays session
//! processing, while session and watch callbacks keep their delivery order.
//!
//! 使用两个工作线程：一个处理会话与监视回调，一个处理完成回调。
//! 因此缓慢的完成回调不会拖延会话处理，而会话与监视回调保持投递顺序。

use super::{Callback, CallbackKind, Handler};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    thread::{self, JoinHandle},
};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

type Queue = mpsc::UnboundedSender<Callback>;

#[derive(Default)]
struct Workers {
    callback_tx: Option<Queue>,
    completion_tx: Option<Queue>,
    threads: Vec<JoinHandle<()>>,
}

/// Runs callbacks on dedicated threads, one at a time per queue.
///
/// 在专用线程上运行回调，每个队列一次只执行一个。
pub struct SequentialHandler {
    workers: Mutex<Workers>,
}

impl std::fmt::Debug for SequentialHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let workers = self.workers.lock();
        f.debug_struct("SequentialHandler")
            .field("running", &workers.callback_tx.is_some())
            .field("threads", &workers.threads.len())
            .finish()
    }
}

impl SequentialHandler {
    /// Creates a handler whose workers are already running.
    /// 创建一个工作线程已在运行的处理器。
    pub fn new() -> Result<Self> {
        let handler = Self {
            workers: Mutex::new(Workers::default()),
        };
        handler.start()?;
        Ok(handler)
    }

    pub fn is_running(&self) -> bool {
        self.workers.lock().callback_tx.is_some()
    }

    fn spawn_worker(name: &str) -> Result<(Queue, JoinHandle<()>)> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Callback>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                trace!(worker = %thread_name, "Handler worker started");
                while let Some(callback) = rx.blocking_recv() {
                    let kind = callback.kind();
                    if catch_unwind(AssertUnwindSafe(|| callback.run())).is_err() {
                        error!(worker = %thread_name, ?kind, "Callback panicked");
                    }
                }
                trace!(worker = %thread_name, "Handler worker exiting");
            })
            .map_err(|e| Error::Configuration(format!("failed to spawn handler worker: {e}")))?;
        Ok((tx, handle))
    }
}

impl Handler for SequentialHandler {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.callback_tx.is_some() {
            return Ok(());
        }
        let (callback_tx, callback_thread) = Self::spawn_worker("zk-session-callbacks")?;
        let (completion_tx, completion_thread) = Self::spawn_worker("zk-session-completions")?;
        workers.callback_tx = Some(callback_tx);
        workers.completion_tx = Some(completion_tx);
        workers.threads = vec![callback_thread, completion_thread];
        debug!("Sequential handler started");
        Ok(())
    }

    fn stop(&self) {
        let threads = {
            let mut workers = self.workers.lock();
            // Dropping the senders lets each worker drain its queue and exit.
            // 丢弃发送端后，每个工作线程会处理完队列并退出。
            workers.callback_tx = None;
            workers.completion_tx = None;
            std::mem::take(&mut workers.threads)
        };
        let current = thread::current().id();
        for handle in threads {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("Handler worker terminated abnormally");
            }
        }
        debug!("Sequential handler stopped");
    }

    fn dispatch_callback(&self, callback: Callback) {
        let workers = self.workers.lock();
        let queue = match callback.kind() {
            CallbackKind::Completion => workers.completion_tx.as_ref(),
            CallbackKind::Session | CallbackKind::Watch => workers.callback_tx.as_ref(),
        };
        match queue {
            Some(tx) => {
                if let Err(rejected) = tx.send(callback) {
                    warn!(kind = ?rejected.0.kind(), "Handler queue closed, dropping callback");
                }
            }
            None => warn!(kind = ?callback.kind(), "Handler is stopped, dropping callback"),
        }
    }
}

impl Drop for SequentialHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, mpsc as std_mpsc};
    use std::time::Duration;

    #[test]
    fn test_callbacks_run_in_dispatch_order() {
        let handler = SequentialHandler::new().unwrap();
        let (tx, rx) = std_mpsc::channel();
        for i in 0..50 {
            let tx = tx.clone();
            let kind = if i % 2 == 0 {
                CallbackKind::Session
            } else {
                CallbackKind::Watch
            };
            handler.dispatch_callback(Callback::new(kind, move || tx.send(i).unwrap()));
        }
        let seen: Vec<i32> = (0..50)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_callback_does_not_kill_worker() {
        let handler = SequentialHandler::new().unwrap();
        let (tx, rx) = std_mpsc::channel();
        handler.dispatch_callback(Callback::watch(|| panic!("boom")));
        handler.dispatch_callback(Callback::watch(move || tx.send("after").unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "after");
    }

    #[test]
    fn test_callbacks_never_run_on_dispatching_thread() {
        let handler = SequentialHandler::new().unwrap();
        let caller = thread::current().id();
        let (tx, rx) = std_mpsc::channel();
        handler.dispatch_callback(Callback::completion(move || {
            tx.send(thread::current().id()).unwrap()
        }));
        let ran_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(ran_on, caller);
    }

    #[test]
    fn test_stop_drains_queue_and_is_restartable() {
        let handler = Arc::new(SequentialHandler::new().unwrap());
        let (tx, rx) = std_mpsc::channel();
        let tx2 = tx.clone();
        handler.dispatch_callback(Callback::session(move || tx.send(1).unwrap()));
        handler.stop();
        assert!(!handler.is_running());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

        handler.start().unwrap();
        handler.dispatch_callback(Callback::session(move || tx2.send(2).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
    }
}
