use test_utils::*;

#[test]
fn test_remove_from_single_leaf() {
    let mut map = create_map_4();
    map.insert(1, "one".to_string()).unwrap();
    map.insert(2, "two".to_string()).unwrap();

    assert_eq!(map.remove(&1), Some("one".to_string()));
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&1), None);
    assert_eq!(map.get(&2), Some(&"two".to_string()));
    assert_invariants(&map, "single leaf remove");
}

#[test]
fn test_remove_absent_key_returns_none() {
    let mut map = create_map_4();
    map.insert(1, "one".to_string()).unwrap();

    assert_eq!(map.remove(&2), None);
    assert_eq!(map.len(), 1);
    assert_invariants(&map, "absent remove");

    // absent keys beyond and below every stored key
    for i in 1..=30 {
        map.insert(i, format!("v{}", i)).unwrap();
    }
    assert_eq!(map.remove(&0), None);
    assert_eq!(map.remove(&31), None);
    assert_invariants(&map, "absent remove, deep tree");
}

#[test]
fn test_scattered_removals_hold_invariants() {
    let mut map = create_map_16();
    for i in 1..=100 {
        map.insert(i, format!("v{}", i)).unwrap();
    }

    let mut remaining = 100usize;
    for k in [50, 25, 75, 1, 100, 51, 49] {
        assert_eq!(map.remove(&k), Some(format!("v{}", k)));
        remaining -= 1;
        assert_eq!(map.len(), remaining);
        assert_eq!(map.get(&k), None);
        assert_invariants(&map, &format!("after removing {}", k));
    }

    let keys: Vec<i32> = map.keys().copied().collect();
    assert_eq!(keys.len(), remaining);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_root_collapses_back_to_leaf() {
    let mut map = create_map_4();
    for i in 1..=40 {
        map.insert(i, format!("v{}", i)).unwrap();
    }
    // three levels: root, internal blocks, leaves
    assert!(!map.is_leaf_root());
    assert!(map.leaf_count() > 4);

    for i in 1..=37 {
        assert_eq!(map.remove(&i), Some(format!("v{}", i)));
        assert_invariants(&map, &format!("shrinking, removed {}", i));
    }

    assert_eq!(map.len(), 3);
    assert!(map.is_leaf_root());
    assert_eq!(map.leaf_count(), 1);
    let keys: Vec<i32> = map.keys().copied().collect();
    assert_eq!(keys, vec![38, 39, 40]);
}

#[test]
fn test_remove_everything_in_insertion_order() {
    let mut map = create_map_4();
    for i in 1..=50 {
        map.insert(i, format!("v{}", i)).unwrap();
    }
    for i in 1..=50 {
        assert_eq!(map.remove(&i), Some(format!("v{}", i)));
        assert_invariants(&map, &format!("ascending removal {}", i));
    }
    assert_eq!(map.len(), 0);
    assert!(map.is_leaf_root());
    assert!(map.begin().at_end());
}

#[test]
fn test_remove_everything_in_reverse_order() {
    let mut map = create_map_4();
    for i in 1..=50 {
        map.insert(i, format!("v{}", i)).unwrap();
    }
    for i in (1..=50).rev() {
        assert_eq!(map.remove(&i), Some(format!("v{}", i)));
        assert_invariants(&map, &format!("descending removal {}", i));
    }
    assert_eq!(map.len(), 0);
    assert!(map.is_leaf_root());
}

#[test]
fn test_remove_alternating_ends() {
    // drains both spines, forcing borrows from either sibling and merges
    let mut map = create_map_4();
    for i in 1..=60 {
        map.insert(i, format!("v{}", i)).unwrap();
    }
    let mut lo = 1;
    let mut hi = 60;
    while lo <= hi {
        assert_eq!(map.remove(&lo), Some(format!("v{}", lo)));
        assert_invariants(&map, &format!("removed low {}", lo));
        lo += 1;
        if lo > hi {
            break;
        }
        assert_eq!(map.remove(&hi), Some(format!("v{}", hi)));
        assert_invariants(&map, &format!("removed high {}", hi));
        hi -= 1;
    }
    assert_eq!(map.len(), 0);
}

// ============================================================================
// SUCCESSOR CURSOR
// ============================================================================

#[test]
fn test_remove_iter_successor_within_leaf() {
    let mut map = create_map_16();
    for i in 1..=10 {
        map.insert(i, format!("v{}", i)).unwrap();
    }
    let (value, cursor) = map.remove_iter(&5).unwrap();
    assert_eq!(value, "v5");
    assert_eq!(*cursor.key(), 6);
}

#[test]
fn test_remove_iter_successor_hops_to_next_leaf() {
    // with capacity 4 the keys spread over many leaves, so removing
    // 1..=19 in order repeatedly drains leaf tails and forces the
    // successor cursor to hop across the chain
    let mut map = create_map_4();
    for i in 1..=20 {
        map.insert(i, format!("v{}", i)).unwrap();
    }
    assert!(map.leaf_count() >= 5);

    for k in 1..=19 {
        let (_, cursor) = map.remove_iter(&k).unwrap();
        assert_eq!(*cursor.key(), k + 1, "successor of removed {}", k);
        assert_invariants(&map, &format!("successor walk, removed {}", k));
    }
}

#[test]
fn test_remove_iter_of_last_entry_is_end() {
    let mut map = create_map_4();
    for i in 1..=20 {
        map.insert(i, format!("v{}", i)).unwrap();
    }
    let (value, cursor) = map.remove_iter(&20).unwrap();
    assert_eq!(value, "v20");
    assert!(cursor.at_end());

    let mut map2 = create_map_4();
    map2.insert(1, "one".to_string()).unwrap();
    let (_, cursor) = map2.remove_iter(&1).unwrap();
    assert!(cursor.at_end());
    assert!(cursor.at_begin());
}

#[test]
fn test_lookup_after_removing_block_maxima() {
    // removing a leaf's greatest key leaves its separator in place; lookups
    // and ordered iteration must still work
    let mut map = create_map_4();
    for i in 1..=32 {
        map.insert(i, format!("v{}", i)).unwrap();
    }
    let leaf_count = map.leaf_count();
    assert!(leaf_count >= 8);

    // delete every fourth key; with capacity 4 this hits block tails
    for k in (4..=32).step_by(4) {
        assert_eq!(map.remove(&k), Some(format!("v{}", k)));
        assert_invariants(&map, &format!("removed multiple-of-4 {}", k));
    }
    for k in 1..=32 {
        let expect_present = k % 4 != 0;
        assert_eq!(map.contains_key(&k), expect_present, "key {}", k);
    }
    let keys: Vec<i32> = map.keys().copied().collect();
    let expected: Vec<i32> = (1..=32).filter(|k| k % 4 != 0).collect();
    assert_eq!(keys, expected);
}
