use concurrent_shardmap::{ConcurrentMap, ShardMap, ShardMapBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_inserts() {
    let map = Arc::new(ShardMap::new());
    let mut handles = vec![];

    // Spawn 10 threads, each inserting 100 items
    for thread_id in 0..10 {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..100 {
                let key = format!("thread_{}_key_{}", thread_id, i);
                map.insert(key, i);
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.len(), 1000);
}

#[test]
fn test_concurrent_reads() {
    let map = Arc::new(ShardMap::new());

    for i in 0..100 {
        map.insert(format!("key_{}", i), i);
    }

    let mut handles = vec![];

    // Spawn 20 threads, each reading all items
    for _ in 0..20 {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..100 {
                let key = format!("key_{}", i);
                assert_eq!(map.at(&key), Ok(i));
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_one_winner_per_contended_insert() {
    const THREADS: usize = 8;
    const KEYS: usize = 200;

    let map: Arc<ShardMap<usize, usize>> = Arc::new(
        ShardMapBuilder::new()
            .shard_count(4)
            .unwrap()
            .build()
            .unwrap(),
    );
    let barrier = Arc::new(Barrier::new(THREADS));
    let mut handles = vec![];

    for thread_id in 0..THREADS {
        let map = Arc::clone(&map);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            (0..KEYS)
                .filter(|&key| map.insert(key, thread_id))
                .collect::<Vec<_>>()
        }));
    }

    let won: Vec<Vec<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Every key has exactly one winner, and the stored value is the winner's.
    let total_wins: usize = won.iter().map(|keys| keys.len()).sum();
    assert_eq!(total_wins, KEYS);
    for (thread_id, keys) in won.iter().enumerate() {
        for key in keys {
            assert_eq!(map.at(key), Ok(thread_id));
        }
    }
    assert_eq!(map.len(), KEYS);
}

#[test]
fn test_one_winner_on_unsharded_map() {
    let map: Arc<ConcurrentMap<&str, usize>> = Arc::new(ConcurrentMap::new());
    let winners = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|id| {
            let map = Arc::clone(&map);
            let winners = Arc::clone(&winners);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                if map.insert("contended", id) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(map.len(), 1);
}

#[test]
fn test_concurrent_insert_or_assign_no_duplicates() {
    let map: Arc<ShardMap<u32, u32>> = Arc::new(ShardMap::new());
    let mut handles = vec![];

    for thread_id in 0..8 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..500 {
                map.insert_or_assign(i % 50, thread_id);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(map.len(), 50);
}

#[test]
fn test_whole_map_ops_during_writes() {
    let map: Arc<ShardMap<u64, u64>> = Arc::new(ShardMap::new());
    let mut handles = vec![];

    for thread_id in 0..4u64 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..1000 {
                let key = thread_id * 1000 + i;
                map.insert(key, key);
                if i % 3 == 0 {
                    map.erase(&key);
                }
            }
        }));
    }

    // Readers of whole-map state see torn but valid views.
    for _ in 0..2 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                let len = map.len();
                assert!(len <= 4000);
                let snapshot = map.snapshot();
                assert!(snapshot.iter().all(|(k, v)| k == v));
                let _ = map.load_factor();
                let _ = map.is_empty();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // 334 of every 1000 keys were erased per writer.
    assert_eq!(map.len(), 4 * 666);
}

#[test]
fn test_opposing_swaps_do_not_deadlock() {
    let a: Arc<ShardMap<u32, u32>> = Arc::new((0..100).map(|i| (i, i)).collect());
    let b: Arc<ShardMap<u32, u32>> = Arc::new((100..150).map(|i| (i, i)).collect());
    let mut handles = vec![];

    for round in 0..4 {
        let a = Arc::clone(&a);
        let b = Arc::clone(&b);
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                if round % 2 == 0 {
                    a.swap(&b).unwrap();
                } else {
                    b.swap(&a).unwrap();
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Swapping preserves the combined contents.
    let mut sizes = [a.len(), b.len()];
    sizes.sort();
    assert_eq!(sizes, [50, 100]);
}

#[test]
fn test_opposing_merges_do_not_deadlock() {
    let a: Arc<ShardMap<u32, u32>> = Arc::new((0..500).map(|i| (i, i)).collect());
    let b: Arc<ShardMap<u32, u32>> = Arc::new((250..750).map(|i| (i, i + 1)).collect());

    let left = {
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        thread::spawn(move || a.merge(&b))
    };
    let right = {
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        thread::spawn(move || b.merge(&a))
    };
    left.join().unwrap();
    right.join().unwrap();

    // Entries only ever move, so nothing is lost or duplicated.
    assert_eq!(a.len() + b.len(), 1000);
    let union: std::collections::HashSet<u32> = a
        .snapshot()
        .keys()
        .chain(b.snapshot().keys())
        .copied()
        .collect();
    assert_eq!(union.len(), 750);
}

#[test]
fn test_concurrent_clear_and_insert() {
    let map: Arc<ShardMap<u32, u32>> = Arc::new(ShardMap::new());
    let mut handles = vec![];

    for _ in 0..2 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                map.clear();
            }
        }));
    }
    for thread_id in 0..4 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..1000 {
                map.insert(thread_id * 1000 + i, i);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(map.len() <= 4000);
}
