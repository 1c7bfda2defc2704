//! 测试模块入口与共享测试工具

mod concurrent_tests;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-test instance bookkeeping. Counters are owned by the factory rather
/// than being globals so parallel test execution cannot interfere.
/// 每个测试独立的实例计数。计数器归工厂所有而非全局，
/// 以免并行执行的测试互相干扰。
pub(crate) struct CountedFactory {
    created: Arc<AtomicUsize>,
    alive: Arc<AtomicUsize>,
}

/// A value that tracks how many instances of it exist.
/// `index` records creation order within its factory.
/// 追踪自身存活实例数的值。`index` 记录其在工厂内的创建顺序。
pub(crate) struct Counted {
    pub(crate) index: usize,
    created: Arc<AtomicUsize>,
    alive: Arc<AtomicUsize>,
}

impl CountedFactory {
    pub(crate) fn new() -> Self {
        CountedFactory {
            created: Arc::new(AtomicUsize::new(0)),
            alive: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn make(&self) -> Counted {
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        self.alive.fetch_add(1, Ordering::SeqCst);
        Counted {
            index,
            created: Arc::clone(&self.created),
            alive: Arc::clone(&self.alive),
        }
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn alive(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Clone for Counted {
    /// 克隆算一次新实例，但保留原 index。
    fn clone(&self) -> Self {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.alive.fetch_add(1, Ordering::SeqCst);
        Counted {
            index: self.index,
            created: Arc::clone(&self.created),
            alive: Arc::clone(&self.alive),
        }
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}
