use crate::sync::{AtomicU64, Cell};
use std::ptr;

/// Epoch value meaning "this reader holds no snapshot".
/// 表示"该读者未持有快照"的纪元值。
pub(crate) const NO_SNAPSHOT: u64 = 0;

/// The epoch a cell starts at. 0 is reserved for [`NO_SNAPSHOT`].
/// 单元格的起始纪元。0 保留给 [`NO_SNAPSHOT`]。
pub(crate) const FIRST_EPOCH: u64 = 1;

/// One pre-allocated record per reader thread.
///
/// Cache-aligned to prevent false sharing between readers. `min_epoch` is
/// the only field other threads ever look at; `value_read` and `depth` are
/// owned by the thread the slot is bound to.
///
/// 每个读者线程一个预分配的记录。
/// 缓存对齐以防止读者之间的伪共享。`min_epoch` 是其他线程唯一会读取的
/// 字段；`value_read` 和 `depth` 归绑定到该槽位的线程所有。
#[repr(align(64))]
pub(crate) struct ReaderSlot<T> {
    /// Epoch observed when the outermost read scope opened, or NO_SNAPSHOT.
    /// 最外层读作用域打开时观察到的纪元，或 NO_SNAPSHOT。
    pub(crate) min_epoch: AtomicU64,
    /// Value pointer cached at scope entry. Valid while min_epoch != 0.
    /// 作用域进入时缓存的值指针。在 min_epoch != 0 期间有效。
    pub(crate) value_read: Cell<*const T>,
    /// Read-scope reentrancy depth.
    /// 读作用域的重入深度。
    pub(crate) depth: Cell<usize>,
}

impl<T> ReaderSlot<T> {
    pub(crate) fn new() -> Self {
        ReaderSlot {
            min_epoch: AtomicU64::new(NO_SNAPSHOT),
            value_read: Cell::new(ptr::null()),
            depth: Cell::new(0),
        }
    }
}
