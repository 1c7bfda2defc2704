//! Edge-triggered notifiers built on the progressive-backoff wait.
//!
//! Two variants with deliberately different semantics, exposed under
//! distinct names because mixing them up loses or duplicates wakeups:
//!
//! - [`SpinCondvar`]: a boolean flag. Consecutive notifies without an
//!   intervening wait coalesce into one; one waiter wakes per transition.
//! - [`SpinSemaphore`]: a counter. No notify is ever lost; k notifies wake
//!   at most k waiters.
//!
//! 基于渐进退避等待构建的边沿触发通知器。
//! 两个语义刻意不同的变体，以不同的名字暴露：
//! - [`SpinCondvar`]：布尔标志。未被消费的连续 notify 合并为一次。
//! - [`SpinSemaphore`]：计数器。notify 绝不丢失。

use crate::backoff;
use crate::sync::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A mutex-free condition variable with progressive backoff.
///
/// Functionality is similar to `std::sync::Condvar`, but without a mutex,
/// which makes it usable for synchronizing with a real-time thread where
/// blocking system calls are off the table. Waiting burns a bounded amount
/// of CPU before falling back to short bounded sleeps.
///
/// Edge-triggered: [`notify()`](SpinCondvar::notify) sets a flag and
/// [`wait()`](SpinCondvar::wait) consumes it with a compare-and-swap, so
/// notifies that arrive while nobody consumes coalesce, and exactly one
/// waiter wins each flag transition.
///
/// 带渐进退避的无互斥锁条件变量。
/// 功能近似 `std::sync::Condvar`，但不需要互斥锁，因而可用于与实时线程
/// 同步。边沿触发：`notify()` 置位标志，`wait()` 用 CAS 消费它，
/// 未被消费的通知会合并，每次标志翻转恰有一个等待者胜出。
#[derive(Debug, Default)]
pub struct SpinCondvar {
    flag: AtomicBool,
}

impl SpinCondvar {
    pub fn new() -> Self {
        SpinCondvar {
            flag: AtomicBool::new(false),
        }
    }

    /// Signals the condition. Non-blocking; safe to call from a real-time
    /// thread.
    /// 发出信号。非阻塞；可从实时线程调用。
    #[inline]
    pub fn notify(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Blocks until a notify is consumed.
    /// 阻塞直到消费掉一次通知。
    pub fn wait(&self) {
        backoff::wait_until(|| self.try_consume());
    }

    /// Blocks while `pred()` returns true. The internal flag is not
    /// consulted.
    /// 当 `pred()` 返回 true 时持续阻塞。不查询内部标志。
    pub fn wait_while<P: FnMut() -> bool>(&self, mut pred: P) {
        backoff::wait_until(|| !pred());
    }

    /// Like [`wait()`](SpinCondvar::wait), giving up after `timeout`.
    /// Returns `true` if notified, `false` on timeout.
    /// 同 `wait()`，但超过 `timeout` 后放弃。被通知返回 `true`，
    /// 超时返回 `false`。
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }

    /// Like [`wait()`](SpinCondvar::wait), giving up at `deadline`.
    /// Returns `true` if notified, `false` on timeout.
    /// 同 `wait()`，但到 `deadline` 后放弃。
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut timed_out = false;
        backoff::wait_until(|| {
            if Instant::now() >= deadline {
                timed_out = true;
                return true;
            }
            self.try_consume()
        });
        !timed_out
    }

    #[inline]
    fn try_consume(&self) -> bool {
        self.flag
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// A counting notifier with progressive backoff.
///
/// [`notify()`](SpinSemaphore::notify) increments a counter;
/// [`wait()`](SpinSemaphore::wait) backoff-waits until it can decrement a
/// positive count. No notify is lost: k notifies wake at most k waiters.
/// A waiter that loses the decrement race simply keeps waiting.
///
/// 带渐进退避的计数通知器。
/// `notify()` 递增计数器；`wait()` 退避等待，直到成功将正计数减一。
/// 通知绝不丢失：k 次 notify 至多唤醒 k 个等待者。
/// 在减一竞争中落败的等待者继续等待。
#[derive(Debug, Default)]
pub struct SpinSemaphore {
    count: AtomicU64,
}

impl SpinSemaphore {
    pub fn new() -> Self {
        SpinSemaphore {
            count: AtomicU64::new(0),
        }
    }

    /// Adds one wakeup. Non-blocking; safe to call from a real-time thread.
    /// 增加一次唤醒。非阻塞；可从实时线程调用。
    #[inline]
    pub fn notify(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Blocks until one wakeup is consumed.
    /// 阻塞直到消费掉一次唤醒。
    pub fn wait(&self) {
        backoff::wait_until(|| self.try_acquire());
    }

    /// Blocks while `pred()` returns true. The counter is not consulted.
    /// 当 `pred()` 返回 true 时持续阻塞。不查询计数器。
    pub fn wait_while<P: FnMut() -> bool>(&self, mut pred: P) {
        backoff::wait_until(|| !pred());
    }

    /// Like [`wait()`](SpinSemaphore::wait), giving up after `timeout`.
    /// Returns `true` if a wakeup was consumed, `false` on timeout.
    /// 同 `wait()`，但超过 `timeout` 后放弃。
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }

    /// Like [`wait()`](SpinSemaphore::wait), giving up at `deadline`.
    /// Returns `true` if a wakeup was consumed, `false` on timeout.
    /// 同 `wait()`，但到 `deadline` 后放弃。
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut timed_out = false;
        backoff::wait_until(|| {
            if Instant::now() >= deadline {
                timed_out = true;
                return true;
            }
            self.try_acquire()
        });
        !timed_out
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        let observed = self.count.load(Ordering::SeqCst);
        observed > 0
            && self
                .count
                .compare_exchange(observed, observed - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }
}
