use crate::state::{ReaderSlot, NO_SNAPSHOT};
use crate::sync::{AtomicPtr, AtomicU64, Ordering};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr;

/// Scoped, wait-free read access to the value inside an
/// [`RcuCell`](crate::RcuCell).
///
/// While the guard is alive, the snapshot it dereferences to stays exactly
/// the same value and stays valid, no matter how many times writers publish
/// or the reclaimer runs. Guards on one thread may nest; a nested guard
/// reuses the outer snapshot, so the outermost scope decides what the
/// thread sees.
///
/// The guard is `!Send` and `!Sync`: it stands for *this thread's* entry in
/// the reader table, and it must not be cloned or handed to another thread.
/// Dropping it closes the scope and, once the outermost guard is gone,
/// lets the reclaimer free values retired since the scope opened.
///
/// ```compile_fail
/// use rtsync::RcuCell;
///
/// let cell = RcuCell::<i32>::new(1);
/// let guard = cell.read();
/// // a read scope cannot leave its thread
/// std::thread::spawn(move || assert_eq!(*guard, 1));
/// ```
///
/// ```compile_fail
/// use rtsync::{RcuCell, ReadGuard};
///
/// let cell = RcuCell::<i32>::new(1);
/// let guard = cell.read();
/// // cloning reaches the value through Deref, never duplicates the handle
/// let dup: ReadGuard<'_, i32> = guard.clone();
/// ```
///
/// 对 [`RcuCell`](crate::RcuCell) 内的值的带作用域、免等待的读访问。
/// 守卫存活期间，它解引用到的快照保持不变且始终有效，无论写者发布多少次
/// 或回收器运行多少次。同一线程上的守卫可以嵌套；嵌套守卫复用外层快照，
/// 因此最外层作用域决定该线程看到的内容。
/// 该守卫是 `!Send` 和 `!Sync` 的：它代表*当前线程*在读者表中的条目，
/// 不可克隆、不可交给其他线程。
#[must_use]
pub struct ReadGuard<'a, T> {
    slot: &'a ReaderSlot<T>,
    // ties the guard to its thread
    // 将守卫绑定到其线程
    _not_send_sync: PhantomData<*const T>,
}

impl<'a, T> ReadGuard<'a, T> {
    /// Opens a read scope on `slot`.
    ///
    /// The order matters: the epoch is published into `min_epoch` *before*
    /// the value pointer is loaded, both sequentially consistent. A writer
    /// that retires the loaded value afterwards necessarily tags the zombie
    /// with an epoch at least as large as the one stored here, so the
    /// reclaimer keeps the snapshot alive for as long as the scope is open.
    ///
    /// 在 `slot` 上打开一个读作用域。
    /// 顺序是关键：先将纪元发布到 `min_epoch`，*之后*再加载值指针，
    /// 两者都用顺序一致性。之后使该值退休的写者必然给僵尸打上不小于
    /// 此处所存纪元的标签，因此回收器会在作用域打开期间保持快照存活。
    pub(crate) fn open(
        slot: &'a ReaderSlot<T>,
        epoch: &AtomicU64,
        value: &AtomicPtr<T>,
    ) -> ReadGuard<'a, T> {
        let depth = slot.depth.get();
        if depth == 0 {
            let observed = epoch.load(Ordering::SeqCst);
            debug_assert_ne!(observed, NO_SNAPSHOT);
            slot.min_epoch.store(observed, Ordering::SeqCst);

            let ptr = value.load(Ordering::SeqCst);
            debug_assert!(!ptr.is_null());
            slot.value_read.set(ptr as *const T);
        }
        slot.depth.set(depth + 1);

        ReadGuard {
            slot,
            _not_send_sync: PhantomData,
        }
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        let ptr = self.slot.value_read.get();
        debug_assert!(!ptr.is_null());
        // SAFETY: value_read was loaded from the value slot after min_epoch
        // was published, so the pointee cannot be reclaimed before this
        // thread's outermost guard drops and resets min_epoch to 0.
        unsafe { &*ptr }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        let depth = self.slot.depth.get();
        debug_assert!(depth > 0);
        if depth == 1 {
            // Last guard on this thread: clear the cached pointer, then
            // make the slot visible to the reclaimer as idle.
            // 此线程上的最后一个守卫：清掉缓存指针，再让回收器看到空闲。
            self.slot.value_read.set(ptr::null());
            self.slot.min_epoch.store(NO_SNAPSHOT, Ordering::SeqCst);
        }
        self.slot.depth.set(depth - 1);
    }
}
