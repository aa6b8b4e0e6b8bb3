//! 可等待的事件标志。
//! A waitable event flag.

use parking_lot::{Condvar, Mutex};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
struct EventInner {
    flag: Mutex<bool>,
    cond: Condvar,
}

/// A boolean flag that threads can block on until it is set.
///
/// Clones share the same flag.
///
/// 一个布尔标志，线程可以阻塞等待直到它被设置。克隆体共享同一个标志。
#[derive(Debug, Clone, Default)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every waiter.
    /// 设置标志并唤醒所有等待者。
    pub fn set(&self) {
        let mut flag = self.inner.flag.lock();
        *flag = true;
        self.inner.cond.notify_all();
    }

    pub fn clear(&self) {
        *self.inner.flag.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.inner.flag.lock()
    }

    /// Blocks until the flag is set or `timeout` elapses.
    /// Returns whether the flag was set.
    ///
    /// 阻塞直到标志被设置或 `timeout` 到期。返回标志是否已被设置。
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut flag = self.inner.flag.lock();
        match timeout {
            None => {
                while !*flag {
                    self.inner.cond.wait(&mut flag);
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*flag {
                    if self.inner.cond.wait_until(&mut flag, deadline).timed_out() {
                        return *flag;
                    }
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out_when_never_set() {
        let event = Event::new();
        assert!(!event.wait(Some(Duration::from_millis(20))));
        assert!(!event.is_set());
    }

    #[test]
    fn test_set_wakes_waiter_on_other_thread() {
        let event = Event::new();
        let setter = event.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            setter.set();
        });
        assert!(event.wait(Some(Duration::from_secs(5))));
        handle.join().unwrap();
    }

    #[test]
    fn test_clear_resets_flag() {
        let event = Event::new();
        event.set();
        assert!(event.wait(None));
        event.clear();
        assert!(!event.is_set());
    }
}
