use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stratum::SkipList;

#[test]
fn test_new_skip_list() {
    let index: SkipList<i64, u64> = SkipList::new(false);
    assert_eq!(index.len(), 0);
    assert!(index.is_empty());
    assert!(index.iter().is_end());
}

#[test]
fn test_get_value_on_empty() {
    let index: SkipList<i64, u64> = SkipList::new(false);
    let mut rows = Vec::new();
    index.get_value(&7, &mut rows);
    assert!(rows.is_empty());
    assert!(!index.delete(&7, &1));
}

#[test]
fn test_insert_lookup_delete_round_trip() {
    let index: SkipList<i32, String> = SkipList::new(false);

    assert!(index.insert(5, "a".to_string()));
    assert!(index.insert(5, "b".to_string()));
    assert!(index.insert(3, "c".to_string()));
    assert_eq!(index.len(), 3);

    let mut rows = Vec::new();
    index.get_value(&5, &mut rows);
    assert_eq!(rows, vec!["a".to_string(), "b".to_string()]);

    assert!(index.delete(&5, &"a".to_string()));

    rows.clear();
    index.get_value(&5, &mut rows);
    assert_eq!(rows, vec!["b".to_string()]);

    let footprint_before = index.memory_footprint();
    assert!(index.need_garbage_collection());
    index.perform_garbage_collection();
    assert!(!index.need_garbage_collection());
    assert!(index.memory_footprint() < footprint_before);
}

#[test]
fn test_unique_keys_reject_duplicate_key() {
    let index: SkipList<i32, String> = SkipList::new(true);

    assert!(index.insert(7, "x".to_string()));
    assert!(!index.insert(7, "y".to_string()));

    let mut rows = Vec::new();
    index.get_value(&7, &mut rows);
    assert_eq!(rows, vec!["x".to_string()]);
}

#[test]
fn test_multi_map_rejects_duplicate_pair() {
    let index: SkipList<i32, String> = SkipList::new(false);

    assert!(index.insert(7, "x".to_string()));
    assert!(index.insert(7, "y".to_string()));
    assert!(!index.insert(7, "x".to_string()));
    assert_eq!(index.len(), 2);
}

#[test]
fn test_unique_key_reusable_after_delete() {
    let index: SkipList<i32, String> = SkipList::new(true);

    assert!(index.insert(1, "old".to_string()));
    assert!(index.delete(&1, &"old".to_string()));
    assert!(index.insert(1, "new".to_string()));

    let mut rows = Vec::new();
    index.get_value(&1, &mut rows);
    assert_eq!(rows, vec!["new".to_string()]);
}

#[test]
fn test_range_scan_with_iterator() {
    let index: SkipList<i32, String> = SkipList::new(false);
    for (key, row) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
        assert!(index.insert(key, row.to_string()));
    }

    let visited: Vec<(i32, String)> = index.iter_from(&2).collect();
    assert_eq!(
        visited,
        vec![
            (2, "b".to_string()),
            (3, "c".to_string()),
            (4, "d".to_string()),
        ]
    );
}

#[test]
fn test_full_iteration_in_key_order() {
    let index: SkipList<u64, u64> = SkipList::new(false);
    // Insert out of order to make sure the iterator sorts by key, not by age.
    for key in [42, 7, 19, 3, 99, 56, 23, 71] {
        assert!(index.insert(key, key * 10));
    }

    let visited: Vec<(u64, u64)> = index.iter().collect();
    let keys: Vec<u64> = visited.iter().map(|(key, _)| *key).collect();
    assert_eq!(keys, vec![3, 7, 19, 23, 42, 56, 71, 99]);
    for (key, row) in visited {
        assert_eq!(row, key * 10);
    }
}

#[test]
fn test_iterator_manual_cursor() {
    let index: SkipList<i32, u64> = SkipList::new(false);
    index.insert(1, 100);
    index.insert(2, 200);

    let mut cursor = index.iter();
    assert!(!cursor.is_end());
    assert_eq!(cursor.entry(), Some((&1, &100)));
    cursor.advance();
    assert_eq!(cursor.entry(), Some((&2, &200)));
    cursor.advance();
    assert!(cursor.is_end());
    assert_eq!(cursor.entry(), None);
    // Advancing at the end is a no-op.
    cursor.advance();
    assert!(cursor.is_end());
}

#[test]
fn test_iterator_comparisons() {
    let index: SkipList<i32, u64> = SkipList::new(false);
    index.insert(1, 10);
    index.insert(2, 20);

    let at_one = index.iter_from(&1);
    let at_two = index.iter_from(&2);
    let end_a = index.iter_from(&9);
    let end_b = index.iter_from(&9);

    assert!(at_one < at_two);
    assert!(at_one != at_two);
    assert!(end_a == end_b);
    // An end iterator sorts after every non-end iterator.
    assert!(at_two < end_a);
    assert!(end_a > at_one);
}

#[test]
fn test_values_returned_in_insertion_order() {
    let index: SkipList<i32, u64> = SkipList::new(false);
    for row in [5, 1, 4, 2, 9] {
        assert!(index.insert(8, row));
    }

    let mut rows = Vec::new();
    index.get_value(&8, &mut rows);
    assert_eq!(rows, vec![5, 1, 4, 2, 9]);
}

#[test]
fn test_delete_is_idempotent() {
    let index: SkipList<i32, u64> = SkipList::new(false);
    index.insert(4, 40);

    assert!(index.delete(&4, &40));
    assert!(!index.delete(&4, &40));
    assert!(index.is_empty());
}

#[test]
fn test_delete_requires_exact_pair() {
    let index: SkipList<i32, u64> = SkipList::new(false);
    index.insert(4, 40);

    assert!(!index.delete(&4, &41));
    assert!(!index.delete(&5, &40));
    assert_eq!(index.len(), 1);
}

#[test]
fn test_conditional_insert() {
    let index: SkipList<i32, u64> = SkipList::new(false);
    assert!(index.insert(11, 1));

    // An existing value satisfies the predicate: nothing is inserted.
    let mut satisfied = false;
    assert!(!index.conditional_insert(11, 2, |row| *row == 1, &mut satisfied));
    assert!(satisfied);

    // Nothing satisfies: the insert goes through.
    let mut satisfied = true;
    assert!(index.conditional_insert(11, 3, |_| false, &mut satisfied));
    assert!(!satisfied);

    let mut rows = Vec::new();
    index.get_value(&11, &mut rows);
    assert_eq!(rows, vec![1, 3]);
}

#[test]
fn test_conditional_insert_still_rejects_duplicates() {
    let index: SkipList<i32, u64> = SkipList::new(false);
    assert!(index.insert(11, 1));

    // Predicate misses but the exact pair already exists.
    let mut satisfied = false;
    assert!(!index.conditional_insert(11, 1, |_| false, &mut satisfied));
    assert!(!satisfied);
}

#[test]
fn test_concurrent_inserters_disjoint_keys() {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 1000;

    let index: Arc<SkipList<u64, u64>> = Arc::new(SkipList::new(false));
    let mut workers = Vec::new();
    for t in 0..THREADS {
        let index = index.clone();
        workers.push(thread::spawn(move || {
            for key in (t * PER_THREAD)..((t + 1) * PER_THREAD) {
                assert!(index.insert(key, key + 1));
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(index.len(), (THREADS * PER_THREAD) as usize);
    let visited: Vec<(u64, u64)> = index.iter().collect();
    assert_eq!(visited.len(), (THREADS * PER_THREAD) as usize);
    for (expected, (key, row)) in visited.iter().enumerate() {
        assert_eq!(*key, expected as u64);
        assert_eq!(*row, key + 1);
    }
}

#[test]
fn test_concurrent_insert_delete_same_key() {
    const ROUNDS: u64 = 1000;
    const KEY: u64 = 42;

    let index: Arc<SkipList<u64, u64>> = Arc::new(SkipList::new(false));

    let inserter = {
        let index = index.clone();
        thread::spawn(move || {
            for row in 0..ROUNDS {
                assert!(index.insert(KEY, row));
            }
        })
    };
    let deleter = {
        let index = index.clone();
        thread::spawn(move || {
            for row in 0..ROUNDS {
                // Each pair is inserted exactly once, so spin until it lands.
                while !index.delete(&KEY, &row) {
                    thread::yield_now();
                }
            }
        })
    };
    inserter.join().unwrap();
    deleter.join().unwrap();

    let mut rows = Vec::new();
    index.get_value(&KEY, &mut rows);
    assert!(rows.is_empty());
    assert_eq!(index.len(), 0);
    assert!(index.iter().is_end());

    index.perform_garbage_collection();
    assert!(!index.need_garbage_collection());
}

#[test]
fn test_concurrent_deleters_single_winner() {
    const THREADS: usize = 8;

    let index: Arc<SkipList<u64, u64>> = Arc::new(SkipList::new(false));
    assert!(index.insert(5, 50));

    let mut workers = Vec::new();
    for _ in 0..THREADS {
        let index = index.clone();
        workers.push(thread::spawn(move || index.delete(&5, &50)));
    }
    let wins = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(wins, 1);
    assert!(index.is_empty());
}

#[test]
fn test_stress_concurrent_operations() {
    const THREADS: usize = 8;
    const OPS_PER_THREAD: usize = 2000;
    const KEY_RANGE: u64 = 100;

    let index: Arc<SkipList<u64, u64>> = Arc::new(SkipList::new(false));

    let mut workers = Vec::new();
    for t in 0..THREADS {
        let index = index.clone();
        workers.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(t as u64);
            for _ in 0..OPS_PER_THREAD {
                let key = rng.random_range(0..KEY_RANGE);
                match rng.random_range(0..4) {
                    0 => {
                        index.insert(key, key);
                    }
                    1 => {
                        index.delete(&key, &key);
                    }
                    2 => {
                        let mut rows = Vec::new();
                        index.get_value(&key, &mut rows);
                        // Only the (key, key) pair is ever inserted, so at
                        // most one live value can exist.
                        assert!(rows.len() <= 1);
                        if let Some(row) = rows.first() {
                            assert_eq!(*row, key);
                        }
                    }
                    3 => {
                        let keys: Vec<u64> = index.iter_from(&key).map(|(k, _)| k).collect();
                        for window in keys.windows(2) {
                            assert!(window[0] <= window[1]);
                        }
                    }
                    _ => unreachable!(),
                }
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    // Quiescent checks: iteration is sorted, and since only (key, key) pairs
    // are ever inserted, no key appears twice.
    let visited: Vec<(u64, u64)> = index.iter().collect();
    for window in visited.windows(2) {
        assert!(window[0].0 < window[1].0);
    }
    for (key, row) in &visited {
        assert_eq!(row, key);
    }

    index.perform_garbage_collection();
    assert!(!index.need_garbage_collection());
}
