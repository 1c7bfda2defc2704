//! 并发测试模块
//! 测试读者、写者与回收器并行运行时的正确性

use super::CountedFactory;
use crate::RcuCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 测试1: 读者不阻塞写者
#[test]
fn test_reader_does_not_block_writer() {
    let cell = Arc::new(RcuCell::<i32>::new(42));

    let has_read_scope = Arc::new(AtomicBool::new(false));
    let give_up_read_scope = Arc::new(AtomicBool::new(false));
    let cell_updated = Arc::new(AtomicBool::new(false));

    let reader = {
        let cell = Arc::clone(&cell);
        let has_read_scope = Arc::clone(&has_read_scope);
        let give_up_read_scope = Arc::clone(&give_up_read_scope);
        let cell_updated = Arc::clone(&cell_updated);

        thread::spawn(move || {
            let guard = cell.read();
            has_read_scope.store(true, Ordering::SeqCst);

            while !give_up_read_scope.load(Ordering::SeqCst) {
                thread::yield_now();
            }

            // 写者在作用域打开期间完成了 publish
            assert!(cell_updated.load(Ordering::SeqCst));
            // 此处必须仍然读到旧值
            assert_eq!(*guard, 42);
        })
    };

    let writer = {
        let cell = Arc::clone(&cell);
        let has_read_scope = Arc::clone(&has_read_scope);
        let cell_updated = Arc::clone(&cell_updated);

        thread::spawn(move || {
            while !has_read_scope.load(Ordering::SeqCst) {
                thread::yield_now();
            }

            // 读作用域打开时执行，不会被阻塞
            cell.publish(43);
            cell_updated.store(true, Ordering::SeqCst);
        })
    };

    while !cell_updated.load(Ordering::SeqCst) {
        thread::yield_now();
    }

    give_up_read_scope.store(true, Ordering::SeqCst);
    reader.join().unwrap();
    writer.join().unwrap();

    assert_eq!(cell.snapshot(), 43);
}

/// 测试2: 并发读写绝不观察到撕裂的结构体
#[test]
fn test_readers_never_observe_torn_struct() {
    #[derive(Clone)]
    struct Pair {
        a: usize,
        c: usize,
    }

    let cell = Arc::new(RcuCell::<Pair>::new(Pair { a: 0, c: 0 }));
    let stop = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..4 {
        let cell = Arc::clone(&cell);
        let stop = Arc::clone(&stop);

        readers.push(thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let guard = cell.read();
                // 两个字段总是一起发布，任何观察都必须一致
                assert_eq!(guard.a, guard.c);
            }
        }));
    }

    let writer = {
        let cell = Arc::clone(&cell);
        thread::spawn(move || {
            for i in 0..2000usize {
                cell.publish(Pair { a: i, c: i });
                if i % 64 == 0 {
                    cell.reclaim();
                }
            }
        })
    };

    writer.join().unwrap();
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    cell.reclaim();
    let last = cell.snapshot();
    assert_eq!(last.a, 1999);
    assert_eq!(last.c, 1999);
}

/// 测试3: 读者、写者与回收器全部并行运行
#[test]
fn test_reads_writes_and_reclaim_run_concurrently() {
    let cell = Arc::new(RcuCell::<String>::new(String::from("0")));
    let stop = Arc::new(AtomicBool::new(false));

    const NUM_READERS: usize = 20;
    const NUM_WRITERS: usize = 2;

    let mut readers = Vec::new();
    for _ in 0..NUM_READERS {
        let cell = Arc::clone(&cell);
        let stop = Arc::clone(&stop);

        readers.push(thread::spawn(move || {
            let mut last = String::new();
            while !stop.load(Ordering::Relaxed) {
                let guard = cell.read();
                last = guard.clone();
            }
            last
        }));
    }

    let mut writers = Vec::new();
    for _ in 0..NUM_WRITERS {
        let cell = Arc::clone(&cell);
        let stop = Arc::clone(&stop);

        writers.push(thread::spawn(move || {
            loop {
                for i in 0..1000 {
                    cell.publish(i.to_string());
                }
                if stop.load(Ordering::Relaxed) {
                    break;
                }
            }
        }));
    }

    let reclaimer = {
        let cell = Arc::clone(&cell);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                cell.reclaim();
            }
        })
    };

    thread::sleep(Duration::from_millis(100));
    stop.store(true, Ordering::Relaxed);

    // 每个读者都观察到了某个被写入的值
    for reader in readers {
        let last = reader.join().unwrap();
        assert!(!last.is_empty());
    }
    for writer in writers {
        writer.join().unwrap();
    }
    reclaimer.join().unwrap();

    // 两个写者都以内层循环的最后一个值 "999" 收尾
    assert_eq!(cell.snapshot(), "999");

    cell.reclaim();
    assert_eq!(cell.zombie_count(), 0);
}

/// 测试4: 大量并发只读访问
#[test]
fn test_high_concurrency_reads() {
    let cell = Arc::new(RcuCell::<i32>::new(42));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let cell = Arc::clone(&cell);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                let guard = cell.read();
                assert_eq!(*guard, 42);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

/// 测试5: 并发写者之间纪元依然严格递增
#[test]
fn test_concurrent_writers_epoch_order() {
    let cell = Arc::new(RcuCell::<u64>::new(0));

    const WRITERS: usize = 4;
    const PUBLISHES: usize = 50;

    let mut handles = Vec::new();
    for w in 0..WRITERS {
        let cell = Arc::clone(&cell);
        handles.push(thread::spawn(move || {
            for i in 0..PUBLISHES {
                cell.publish((w * PUBLISHES + i) as u64);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // 每次 publish 恰好推进一个纪元
    assert_eq!(cell.current_epoch(), 1 + (WRITERS * PUBLISHES) as u64);
    assert_eq!(cell.zombie_count(), WRITERS * PUBLISHES);

    cell.reclaim();
    assert_eq!(cell.zombie_count(), 0);
}

/// 测试6: 带实例计数的混合压力，结束后不泄漏
#[test]
fn test_mixed_stress_no_leaks() {
    let factory = CountedFactory::new();

    {
        let cell: Arc<RcuCell<_>> = Arc::new(RcuCell::new(factory.make()));
        let stop = Arc::new(AtomicBool::new(false));
        let reads_done = Arc::new(AtomicUsize::new(0));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cell = Arc::clone(&cell);
            let stop = Arc::clone(&stop);
            let reads_done = Arc::clone(&reads_done);

            readers.push(thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let guard = cell.read();
                    let _ = guard.index;
                    reads_done.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }

        let reclaimer = {
            let cell = Arc::clone(&cell);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    cell.reclaim();
                    thread::yield_now();
                }
            })
        };

        for _ in 0..500 {
            cell.publish(factory.make());
        }

        stop.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }
        reclaimer.join().unwrap();

        assert!(reads_done.load(Ordering::Relaxed) > 0);
        assert_eq!(factory.created(), 501);
        // cell 在此 drop，清空一切
    }

    assert_eq!(factory.alive(), 0);
}
