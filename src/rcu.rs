use crate::reader::ReadGuard;
use crate::state::{ReaderSlot, FIRST_EPOCH, NO_SNAPSHOT};
use crate::sync::{AtomicPtr, AtomicU64, AtomicUsize, Mutex, Ordering};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use thread_local::ThreadLocal;

/// A value retired by a publish, tagged with the epoch current at retire
/// time. The list stays epoch-ordered because the tag is taken under the
/// zombie-list lock.
/// 被发布操作退休的值，打上退休时的当前纪元标签。
type Zombie<T> = (u64, Box<T>);

/// A single-slot container with wait-free reads and concurrent writers.
///
/// `RcuCell<T>` stores one instance of `T` and lets any number of threads
/// read it wait-free while other threads replace it. An overwritten value
/// is not freed on the spot: it moves onto a zombie list tagged with a
/// monotonically increasing epoch, and is destroyed by a later call to
/// [`reclaim()`](RcuCell::reclaim) once no open read scope can still be
/// holding it.
///
/// The principle is RCU with two twists: reclamation is per cell rather
/// than in a process-global domain, and it never happens behind your back.
/// The user calls `reclaim()` explicitly, e.g. on a timer, from whichever
/// thread is convenient.
///
/// Guarantees:
/// - readers are wait-free and never block writers;
/// - writers may block other writers and the reclaimer (they share the
///   zombie-list lock), never readers;
/// - a read scope observes exactly one value for its whole extent.
///
/// Each thread that reads from a cell claims one of `MAX_THREADS`
/// pre-allocated reader records on first use and keeps it for the life of
/// the cell. A thread past the capacity panics; raise `MAX_THREADS` if
/// that ever fires.
///
/// ```compile_fail
/// use rtsync::RcuCell;
///
/// let cell = RcuCell::<i32>::new(1);
/// // the cell cannot be duplicated
/// let dup = cell.clone();
/// ```
///
/// 带免等待读和并发写的单槽容器。
/// `RcuCell<T>` 存储一个 `T` 实例，允许任意多线程免等待地读取它，
/// 同时其他线程可以替换它。被覆盖的值不会就地释放：它进入按单调递增
/// 纪元打标的僵尸列表，在之后的 [`reclaim()`](RcuCell::reclaim) 调用中、
/// 当没有任何打开的读作用域还可能持有它时被销毁。
/// 其原理是 RCU，但有两点不同：回收按单元格进行而非进程级全局域，
/// 并且绝不自动发生：用户需要显式调用 `reclaim()`（例如定时调用）。
/// 每个读取过该单元格的线程在首次使用时占据 `MAX_THREADS` 个预分配
/// 读者记录之一，并保留到单元格生命周期结束。超过容量会 panic。
pub struct RcuCell<T, const MAX_THREADS: usize = 128> {
    /// The current value. Never null between construction and drop.
    /// 当前值。从构造到销毁绝不为空。
    value: AtomicPtr<T>,
    /// Monotonic epoch counter; 0 is reserved, see `state::NO_SNAPSHOT`.
    /// 单调纪元计数器；0 被保留。
    epoch: AtomicU64,
    slots: Box<[ReaderSlot<T>]>,
    /// Next free reader-table index.
    /// 下一个空闲的读者表下标。
    registrations: AtomicUsize,
    /// Per-thread binding to a reader-table index, scoped to this cell.
    /// 线程到读者表下标的绑定，作用域限于本单元格。
    binding: ThreadLocal<usize>,
    zombies: Mutex<Vec<Zombie<T>>>,
}

// SAFETY: the raw value pointer owns a heap T that only moves between the
// slot, the zombie list and the destructor, all serialized by the atomics
// and the zombie-list lock. The Cells inside each ReaderSlot are only ever
// touched by the one thread bound to that slot; concurrent threads read
// nothing but the slot's atomic min_epoch.
unsafe impl<T: Send, const MAX_THREADS: usize> Send for RcuCell<T, MAX_THREADS> {}
unsafe impl<T: Send + Sync, const MAX_THREADS: usize> Sync for RcuCell<T, MAX_THREADS> {}

impl<T, const MAX_THREADS: usize> RcuCell<T, MAX_THREADS> {
    /// Creates a cell containing `value`.
    /// 创建一个包含 `value` 的单元格。
    pub fn new(value: T) -> Self {
        let slots = (0..MAX_THREADS).map(|_| ReaderSlot::new()).collect();
        RcuCell {
            value: AtomicPtr::new(Box::into_raw(Box::new(value))),
            epoch: AtomicU64::new(FIRST_EPOCH),
            slots,
            registrations: AtomicUsize::new(0),
            binding: ThreadLocal::new(),
            zombies: Mutex::new(Vec::new()),
        }
    }

    /// Opens a read scope and returns a guard for the current snapshot.
    ///
    /// Wait-free: a bounded number of this thread's own steps, independent
    /// of writers and the reclaimer. Scopes may nest; nested guards reuse
    /// the outer snapshot. The first call on a thread claims that thread's
    /// reader record.
    ///
    /// # Panics
    ///
    /// If this thread is the `MAX_THREADS + 1`-th to ever read from this
    /// cell.
    ///
    /// 打开一个读作用域并返回当前快照的守卫。
    /// 免等待：只需本线程有界的步骤数，与写者和回收器无关。
    /// 作用域可嵌套；嵌套守卫复用外层快照。
    /// 线程首次调用会占据该线程的读者记录；超出容量会 panic。
    #[inline]
    pub fn read(&self) -> ReadGuard<'_, T> {
        ReadGuard::open(self.reader_slot(), &self.epoch, &self.value)
    }

    /// Returns a copy of the current value.
    ///
    /// Wait-free if `T::clone` is.
    ///
    /// 返回当前值的一个拷贝。若 `T::clone` 免等待则此操作免等待。
    #[inline]
    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.read().clone()
    }

    /// Atomically replaces the current value, retiring the old one onto the
    /// zombie list.
    ///
    /// Allocates once. May block other writers and the reclaimer on the
    /// zombie-list lock; never blocks readers. The retired value is *not*
    /// freed here, only by a later [`reclaim()`](RcuCell::reclaim).
    ///
    /// 原子地替换当前值，将旧值退休到僵尸列表。
    /// 分配一次内存。可能在僵尸列表锁上阻塞其他写者和回收器；
    /// 绝不阻塞读者。旧值不在此处释放，只由之后的 `reclaim()` 释放。
    pub fn publish(&self, value: T) {
        self.exchange_and_retire(Box::new(value));
    }

    /// Opens a write scope: a mutable copy of the current value that is
    /// published atomically when the guard drops.
    ///
    /// Useful to modify a single field of a larger value. The copy is made
    /// under a fresh read scope, so a concurrent reclaim cannot free the
    /// value mid-copy.
    ///
    /// 打开一个写作用域：当前值的可变拷贝，在守卫 drop 时被原子发布。
    /// 适合只修改较大值中的某个字段。拷贝在一个新的读作用域下进行，
    /// 因此并发回收不会在拷贝途中释放该值。
    pub fn write(&self) -> WriteGuard<'_, T, MAX_THREADS>
    where
        T: Clone,
    {
        WriteGuard {
            cell: self,
            new_value: Some(Box::new(self.snapshot())),
            reclaim_on_drop: false,
            _not_send_sync: PhantomData,
        }
    }

    /// Like [`write()`](RcuCell::write), but additionally runs
    /// [`reclaim()`](RcuCell::reclaim) after publishing on drop.
    ///
    /// 与 [`write()`](RcuCell::write) 相同，但在 drop 发布之后额外执行
    /// 一次 [`reclaim()`](RcuCell::reclaim)。
    pub fn write_reclaim(&self) -> WriteGuard<'_, T, MAX_THREADS>
    where
        T: Clone,
    {
        WriteGuard {
            cell: self,
            new_value: Some(Box::new(self.snapshot())),
            reclaim_on_drop: true,
            _not_send_sync: PhantomData,
        }
    }

    /// Destroys every retired value no longer referenced by any open read
    /// scope.
    ///
    /// Scans the whole reader table once for the minimum epoch among open
    /// scopes, then frees every zombie retired strictly before it. A reader
    /// that closes its scope during the scan only makes the decision more
    /// conservative: an entry that could have been freed survives until the
    /// next call.
    ///
    /// May block writers and other reclaimers; never blocks readers.
    ///
    /// Value destructors are expected not to panic. If one does, the panic
    /// propagates to the caller: the zombie-list lock is released (it does
    /// not poison) and the cell stays usable, but the reclamation pass is
    /// cut short.
    ///
    /// 销毁所有不再被任何打开的读作用域引用的已退休值。
    /// 对读者表整体扫描一次，求打开作用域中的最小纪元，然后释放所有
    /// 严格早于它退休的僵尸。扫描期间关闭作用域的读者只会让判定更保守：
    /// 本可释放的条目会留到下一次调用。
    /// 可能阻塞写者和其他回收器；绝不阻塞读者。
    /// 值的析构不应 panic。一旦发生，panic 会传播给调用者：僵尸列表锁
    /// 被释放（不会毒化），单元格仍然可用，但本次回收提前结束。
    pub fn reclaim(&self) {
        let mut zombies = self.zombies.lock();
        if zombies.is_empty() {
            return;
        }

        let mut min_active = u64::MAX;
        for slot in self.slots.iter() {
            let epoch = slot.min_epoch.load(Ordering::SeqCst);
            if epoch != NO_SNAPSHOT && epoch < min_active {
                min_active = epoch;
            }
        }

        // A zombie retired at epoch e is still needed iff some open scope
        // observed an epoch <= e. With no open scope, everything goes.
        // 退休于纪元 e 的僵尸仍被需要，当且仅当某个打开的作用域观察到的
        // 纪元 <= e。没有打开的作用域时，全部释放。
        zombies.retain(|zombie| zombie.0 >= min_active);
    }

    fn exchange_and_retire(&self, new_value: Box<T>) {
        let old = self.value.swap(Box::into_raw(new_value), Ordering::SeqCst);

        let mut zombies = self.zombies.lock();
        // The epoch increment happens inside the lock so zombies are
        // strictly epoch-ordered even with concurrent writers.
        // 纪元递增发生在锁内，因此即使写者并发，僵尸也严格按纪元有序。
        let retired_at = self.epoch.fetch_add(1, Ordering::SeqCst);
        // SAFETY: `old` came from Box::into_raw in new() or a previous
        // exchange; ownership moves from the slot to the zombie list here.
        zombies.push((retired_at, unsafe { Box::from_raw(old) }));
    }

    /// This thread's reader record, claimed on first use.
    /// 本线程的读者记录，首次使用时占据。
    fn reader_slot(&self) -> &ReaderSlot<T> {
        let index = *self.binding.get_or(|| {
            let id = self.registrations.fetch_add(1, Ordering::Relaxed);
            assert!(
                id < MAX_THREADS,
                "RcuCell reader table exhausted: this cell supports at most \
                 {} reader threads; raise MAX_THREADS",
                MAX_THREADS
            );
            id
        });
        &self.slots[index]
    }

    #[cfg(test)]
    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn zombie_count(&self) -> usize {
        self.zombies.lock().len()
    }
}

impl<T: Default, const MAX_THREADS: usize> Default for RcuCell<T, MAX_THREADS> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, const MAX_THREADS: usize> std::fmt::Debug for RcuCell<T, MAX_THREADS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcuCell")
            .field("value", &self.value.load(Ordering::Relaxed))
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T, const MAX_THREADS: usize> Drop for RcuCell<T, MAX_THREADS> {
    /// Drains the zombie list unconditionally and frees the current value.
    ///
    /// At drop time no guard can be alive (they borrow the cell), so every
    /// retired value and the published one are safe to free.
    ///
    /// 无条件清空僵尸列表并释放当前值。
    /// drop 时不可能有存活的守卫（它们借用单元格），因此所有退休值和
    /// 当前发布的值都可以安全释放。
    fn drop(&mut self) {
        self.zombies.lock().clear();

        let ptr = self.value.load(Ordering::Relaxed);
        if !ptr.is_null() {
            // SAFETY: exclusive access; the pointer was produced by
            // Box::into_raw and nothing else can free it.
            unsafe {
                drop(Box::from_raw(ptr));
            }
        }
    }
}

/// Scoped write access: a mutable copy of the cell's value, published
/// atomically when the guard drops.
///
/// Like [`ReadGuard`](crate::ReadGuard) it is `!Send`/`!Sync` and neither
/// cloneable nor copyable. Dropping the guard runs the same publish path as
/// [`RcuCell::publish`]; the variant from
/// [`write_reclaim()`](RcuCell::write_reclaim) then also reclaims.
///
/// ```compile_fail
/// use rtsync::{RcuCell, WriteGuard};
///
/// let cell = RcuCell::<i32>::new(1);
/// let writer = cell.write();
/// // cloning reaches the value through Deref, never duplicates the handle
/// let dup: WriteGuard<'_, i32, 128> = writer.clone();
/// ```
///
/// 带作用域的写访问：单元格值的可变拷贝，在守卫 drop 时被原子发布。
/// 与 [`ReadGuard`](crate::ReadGuard) 一样，它是 `!Send`/`!Sync` 的，
/// 不可克隆也不可复制。
#[must_use]
pub struct WriteGuard<'a, T, const MAX_THREADS: usize> {
    cell: &'a RcuCell<T, MAX_THREADS>,
    new_value: Option<Box<T>>,
    reclaim_on_drop: bool,
    _not_send_sync: PhantomData<*const T>,
}

impl<T, const MAX_THREADS: usize> Deref for WriteGuard<'_, T, MAX_THREADS> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Some until drop
        self.new_value.as_deref().unwrap()
    }
}

impl<T, const MAX_THREADS: usize> DerefMut for WriteGuard<'_, T, MAX_THREADS> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Some until drop
        self.new_value.as_deref_mut().unwrap()
    }
}

impl<T, const MAX_THREADS: usize> Drop for WriteGuard<'_, T, MAX_THREADS> {
    fn drop(&mut self) {
        if let Some(new_value) = self.new_value.take() {
            self.cell.exchange_and_retire(new_value);
            if self.reclaim_on_drop {
                self.cell.reclaim();
            }
        }
    }
}
