//! Progressive-backoff waiting on a predicate.
//!
//! Compared to a naive `while !pred() {}` spin, the progressive schedule
//! keeps wakeup latency low for short waits while preventing a long wait
//! from burning a core: it escalates from tight checks through increasingly
//! long pause bursts, and finally sleeps in bounded, doubling intervals.
//!
//! 对谓词的渐进退避等待。
//! 相比朴素的 `while !pred() {}` 自旋，渐进调度在短等待时保持低唤醒延迟，
//! 同时防止长等待烧掉整个核心：它从紧密检查逐步升级到越来越长的 pause
//! 突发，最终以有界的、倍增的间隔进入休眠。

use crate::pause::{pause, PAUSE_NANOS};
use std::thread;
use std::time::Duration;

/// Duration of the first sleep in the sleep phase, in nanoseconds.
pub const DEFAULT_MIN_SLEEP_NS: u64 = 1_000_000;
/// Ceiling for the doubling sleep duration, in nanoseconds.
pub const DEFAULT_MAX_SLEEP_NS: u64 = 5_000_000;
/// Spin budget before the wait starts sleeping, in nanoseconds.
pub const DEFAULT_SLEEP_THRESHOLD_NS: u64 = 1_000_000;

// Spin schedule per platform: iterations of pred() with no pause, then
// (pauses per check, checks) bursts. Counts are sized so the whole spin
// portion stays around a millisecond of wall time.
// 各平台的自旋调度表：先做若干次无 pause 的 pred() 检查，
// 然后是（每次检查的 pause 数，检查次数）突发。

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
const TIGHT_CHECKS: u32 = 5;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
const SPIN_SCHEDULE: &[(u64, u64)] = &[(1, 10), (10, 50), (500, 20)];

// wfe is three orders of magnitude longer than an x86 pause, so the
// schedule stops one burst earlier.
#[cfg(all(target_arch = "aarch64", not(feature = "arm-isb")))]
const TIGHT_CHECKS: u32 = 2;
#[cfg(all(target_arch = "aarch64", not(feature = "arm-isb")))]
const SPIN_SCHEDULE: &[(u64, u64)] = &[(1, 10), (10, 25)];

// isb is ~10 ns; scale the burst sizes to match the x86 wall times.
#[cfg(all(target_arch = "aarch64", feature = "arm-isb"))]
const TIGHT_CHECKS: u32 = 5;
#[cfg(all(target_arch = "aarch64", feature = "arm-isb"))]
const SPIN_SCHEDULE: &[(u64, u64)] = &[(4, 10), (35, 50), (1750, 20)];

/// Blocks the current thread until `pred` returns true, with the default
/// schedule (~1 ms of progressive spinning, then sleeps doubling from
/// 1 ms up to 5 ms).
///
/// `pred` is invoked on the calling thread and must be cheap and
/// side-effect-safe under repeated evaluation: on return it has evaluated
/// to true at least once. The wait itself never allocates, never takes a
/// lock, and makes no blocking system call other than the sleep-phase
/// `thread::sleep`. A panic from `pred` propagates unchanged.
///
/// There is no deadline awareness here. A timed wait is expressed by
/// wrapping the predicate so that it also returns true once a deadline has
/// passed, and telling the two outcomes apart in the wrapper.
///
/// 阻塞当前线程直到 `pred` 返回 true，使用默认调度
/// （约 1 ms 的渐进自旋，然后以从 1 ms 倍增到 5 ms 的间隔休眠）。
/// `pred` 在调用线程上执行，必须廉价且可安全地被重复求值。
/// 等待本身绝不分配内存、绝不取锁，除休眠阶段的 `thread::sleep`
/// 之外不做任何阻塞系统调用。
#[inline]
pub fn wait_until<P: FnMut() -> bool>(pred: P) {
    wait_until_tuned::<DEFAULT_MIN_SLEEP_NS, DEFAULT_MAX_SLEEP_NS, DEFAULT_SLEEP_THRESHOLD_NS, P>(
        pred,
    )
}

/// [`wait_until`] with compile-time tuning.
///
/// `MIN_SLEEP_NS` is the first sleep duration, `MAX_SLEEP_NS` the ceiling
/// the doubling saturates at, and `SLEEP_THRESHOLD_NS` caps the estimated
/// time spent spinning before the wait starts sleeping.
///
/// 带编译期调参的 [`wait_until`]。
pub fn wait_until_tuned<
    const MIN_SLEEP_NS: u64,
    const MAX_SLEEP_NS: u64,
    const SLEEP_THRESHOLD_NS: u64,
    P: FnMut() -> bool,
>(
    mut pred: P,
) {
    // phase 1: tight checks, no pause
    for _ in 0..TIGHT_CHECKS {
        if pred() {
            return;
        }
    }

    // phases 2-4: pause bursts, accounted against the spin budget
    let mut spun_ns: u64 = 0;
    'spin: for &(pauses, checks) in SPIN_SCHEDULE {
        for _ in 0..checks {
            if pred() {
                return;
            }
            for _ in 0..pauses {
                pause();
            }
            spun_ns += pauses * PAUSE_NANOS;
            if spun_ns >= SLEEP_THRESHOLD_NS {
                break 'spin;
            }
        }
    }

    // phase 5: bounded sleeps, doubling up to the ceiling, then saturating
    let mut sleep_ns = MIN_SLEEP_NS;
    loop {
        if pred() {
            return;
        }
        thread::sleep(Duration::from_nanos(sleep_ns));
        sleep_ns = (sleep_ns * 2).min(MAX_SLEEP_NS);
    }
}
