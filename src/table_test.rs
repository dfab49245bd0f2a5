use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::{SystemTime, UNIX_EPOCH};

use proptest::prelude::*;
use rand::prelude::random;
use rand::seq::SliceRandom;
use rand::{rngs::SmallRng, SeedableRng};

use crate::empty::Empty;
use crate::error::Error;
use crate::table::OrderedTable;

#[test]
fn test_id() {
    let table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    assert_eq!(table.id(), "test-table".to_string());
}

#[test]
fn test_len() {
    let table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    assert_eq!(table.len(), 0);
    assert!(table.is_empty());
}

#[test]
fn test_load_from() {
    let table = OrderedTable::load_from("test-table", (0..10).map(|k| (k, k * 10)));
    assert_eq!(table.len(), 10);
    for key in 0..10 {
        assert_eq!(table.get(&key), Some(key * 10));
    }
    assert!(table.validate().is_ok());

    // last value wins on a repeated key.
    let table = OrderedTable::load_from("test-table", vec![(1, 10), (1, 20)]);
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(&1), Some(20));
}

#[test]
fn test_create() {
    let mut table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    for key in [2, 1, 3, 6, 5, 4, 8, 0, 9, 7].iter() {
        assert!(table.create(*key, 10).is_ok());
    }
    assert_eq!(table.len(), 10);
    assert!(table.validate().is_ok());

    // error case, value stays untouched.
    assert_eq!(table.create(7, 20), Err(Error::OverwriteKey));
    assert_eq!(table.get(&7), Some(10));
    assert_eq!(table.len(), 10);
    assert!(table.validate().is_ok());
}

#[test]
fn test_set() {
    let mut table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    let mut model: BTreeMap<i64, i64> = BTreeMap::new();

    for key in [2, 1, 3, 6, 5, 4, 8, 0, 9, 7].iter() {
        assert_eq!(table.set(*key, key * 10), model.insert(*key, key * 10));
    }
    assert_eq!(table.len(), 10);
    assert!(table.validate().is_ok());

    for key in 0..10 {
        assert_eq!(table.get(&key), model.get(&key).cloned());
    }
    let pairs: Vec<(i64, i64)> = model.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq!(table.pairs(), pairs);
    assert_eq!(table.iter().collect::<Vec<(i64, i64)>>(), pairs);
}

// overwriting an existing key must not change the shape of the tree.
#[test]
fn test_set_overwrite() {
    let mut table: OrderedTable<i64, &str> = OrderedTable::new("test-table");
    assert_eq!(table.set(10, "a"), None);
    assert_eq!(table.set(10, "b"), Some("a"));
    assert_eq!(table.get(&10), Some("b"));
    assert_eq!(table.len(), 1);
    assert!(table.validate().is_ok());
}

#[test]
fn test_delete() {
    let mut table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    for key in [2, 1, 3, 6, 5, 4, 8, 0, 9, 7].iter() {
        table.set(*key, 100);
    }

    // delete a missing key is a no-op, not an error.
    assert_eq!(table.delete(&10), None);
    assert_eq!(table.len(), 10);
    assert!(table.validate().is_ok());

    // delete every entry, validating the invariants along the way.
    for key in 0..10 {
        assert_eq!(table.delete(&key), Some(100));
        assert!(table.validate().is_ok());
    }
    assert_eq!(table.len(), 0);
    assert!(table.iter().next().is_none());
}

#[test]
fn test_delete_min_drain() {
    let mut keys: Vec<i64> = (0..100).collect();
    keys.shuffle(&mut SmallRng::seed_from_u64(make_seed()));

    let mut table = OrderedTable::load_from("test-table", keys.into_iter().map(|k| (k, k * 2)));
    for expected in 0..100 {
        assert_eq!(table.delete_min(), Ok((expected, expected * 2)));
        assert!(table.validate().is_ok());
    }
    assert_eq!(table.delete_min(), Err(Error::EmptyTable));
}

// the max-side path must mirror the min-side path exactly.
#[test]
fn test_delete_max_drain() {
    let mut keys: Vec<i64> = (0..100).collect();
    keys.shuffle(&mut SmallRng::seed_from_u64(make_seed()));

    let mut table = OrderedTable::load_from("test-table", keys.into_iter().map(|k| (k, k * 2)));
    for expected in (0..100).rev() {
        assert_eq!(table.delete_max(), Ok((expected, expected * 2)));
        assert!(table.validate().is_ok());
    }
    assert_eq!(table.delete_max(), Err(Error::EmptyTable));
}

#[test]
fn test_empty_table() {
    let mut table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    assert_eq!(table.get(&42), None);
    assert!(!table.contains(&42));
    assert_eq!(table.min(), Err(Error::EmptyTable));
    assert_eq!(table.max(), Err(Error::EmptyTable));
    assert_eq!(table.floor(&42), Err(Error::EmptyTable));
    assert_eq!(table.ceiling(&42), Err(Error::EmptyTable));
    assert_eq!(table.delete_min(), Err(Error::EmptyTable));
    assert_eq!(table.delete_max(), Err(Error::EmptyTable));
    assert_eq!(table.select(0), Err(Error::InvalidRank(0)));
    assert_eq!(table.delete(&42), None);
    assert!(table.validate().is_ok());
}

#[test]
fn test_ordered_queries() {
    let mut table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    for key in [5, 3, 8, 1, 4, 7, 9].iter() {
        table.set(*key, 0);
    }
    assert_eq!(table.min(), Ok(1));
    assert_eq!(table.max(), Ok(9));
    assert_eq!(table.rank(&7), 4);
    assert_eq!(table.select(4), Ok(7));
    assert!(table.validate().is_ok());
}

#[test]
fn test_floor_ceiling() {
    let table = OrderedTable::load_from("test-table", vec![(10, 0), (20, 0), (30, 0)]);
    assert_eq!(table.floor(&10), Ok(10));
    assert_eq!(table.floor(&25), Ok(20));
    assert_eq!(table.floor(&35), Ok(30));
    assert_eq!(table.floor(&5), Err(Error::NoSuchKey));
    assert_eq!(table.ceiling(&30), Ok(30));
    assert_eq!(table.ceiling(&25), Ok(30));
    assert_eq!(table.ceiling(&5), Ok(10));
    assert_eq!(table.ceiling(&35), Err(Error::NoSuchKey));
}

#[test]
fn test_rank_select() {
    let mut keys: Vec<i64> = (0..256).map(|k| k * 3).collect();
    keys.shuffle(&mut SmallRng::seed_from_u64(make_seed()));
    let table = OrderedTable::load_from("test-table", keys.iter().map(|&k| (k, k)));

    for rank in 0..table.len() {
        let key = table.select(rank).unwrap();
        assert_eq!(table.rank(&key), rank);
    }
    // rank of an absent key counts the keys below it.
    assert_eq!(table.rank(&1), 1);
    assert_eq!(table.rank(&-1), 0);
    assert_eq!(table.rank(&10_000), table.len());
    // out of range rank.
    assert_eq!(table.select(table.len()), Err(Error::InvalidRank(256)));
}

#[test]
fn test_height_bound() {
    let mut table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    for key in 1..=7 {
        table.set(key, key);
    }
    // 2·log2(n+1) links for n = 7.
    assert!(table.height() <= 6, "height {}", table.height());
    assert!(table.validate().is_ok());

    let mut table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    for key in 0..1023 {
        table.set(key, key);
    }
    assert!(table.height() <= 21, "height {}", table.height());
    let stats = table.validate().unwrap();
    assert_eq!(stats.entries(), 1023);
    assert!(stats.blacks().unwrap() > 0);
    assert!(stats.depths().unwrap().max() <= 21);
}

#[test]
fn test_range_after_delete() {
    let mut table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    for key in 1..=5 {
        table.set(key, key);
    }
    assert_eq!(table.delete(&3), Some(3));
    assert_eq!(table.keys(&1, &5), vec![1, 2, 4, 5]);
    assert!(table.validate().is_ok());
}

#[test]
fn test_delete_missing_is_noop() {
    let mut table = OrderedTable::load_from("test-table", (0..10).map(|k| (k, k)));
    assert_eq!(table.delete(&99), None);
    assert_eq!(table.len(), 10);
    assert!(table.validate().is_ok());
}

#[test]
fn test_keys_and_pairs() {
    let table = OrderedTable::load_from("test-table", (0..10).map(|k| (k * 2, k)));
    let all: Vec<i64> = (0..10).map(|k| k * 2).collect();
    assert_eq!(table.keys(&0, &18), all);
    assert_eq!(table.keys(&3, &9), vec![4, 6, 8]);
    assert_eq!(table.keys(&5, &5), Vec::<i64>::new());
    assert_eq!(table.pairs_range(&3, &9), vec![(4, 2), (6, 3), (8, 4)]);
    assert_eq!(table.pairs().len(), 10);
}

#[test]
fn test_size_of_range() {
    let table = OrderedTable::load_from("test-table", (0..10).map(|k| (k * 2, k)));
    assert_eq!(table.size_of_range(&0, &18), 10);
    assert_eq!(table.size_of_range(&2, &16), 8);
    assert_eq!(table.size_of_range(&1, &17), 8); // both endpoints absent
    assert_eq!(table.size_of_range(&5, &5), 0);
    assert_eq!(table.size_of_range(&18, &0), 0); // lo > hi
    assert_eq!(table.size_of_range(&-10, &100), 10);
}

#[test]
fn test_range_bounds() {
    let table = OrderedTable::load_from("test-table", (0..10).map(|k| (k, k * 10)));

    let keys = |pairs: Vec<(i64, i64)>| pairs.into_iter().map(|(k, _)| k).collect::<Vec<i64>>();
    assert_eq!(keys(table.range(3..7).collect()), vec![3, 4, 5, 6]);
    assert_eq!(keys(table.range(3..=7).collect()), vec![3, 4, 5, 6, 7]);
    assert_eq!(
        keys(table.range::<i64, _>(..).collect()),
        (0..10).collect::<Vec<i64>>()
    );
    assert_eq!(keys(table.range(8..).collect()), vec![8, 9]);
    assert_eq!(keys(table.range(..2).collect()), vec![0, 1]);
    assert_eq!(keys(table.range(3..=7).rev().collect()), vec![7, 6, 5, 4, 3]);
    assert_eq!(keys(table.range(20..).collect()), Vec::<i64>::new());
}

#[test]
fn test_random() {
    let mut rng = SmallRng::seed_from_u64(make_seed());

    let table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    assert_eq!(table.random(&mut rng), None);

    let table = OrderedTable::load_from("test-table", (0..1000).map(|k| (k, k * 10)));
    for _ in 0..10_000 {
        let (key, value) = table.random(&mut rng).unwrap();
        assert!((0..1000).contains(&key));
        assert_eq!(value, key * 10);
    }
}

#[test]
fn test_key_only_table() {
    let mut table: OrderedTable<i64, Empty> = OrderedTable::new("test-set");
    for key in [3, 1, 2].iter() {
        table.set(*key, Empty);
    }
    assert!(table.contains(&2));
    assert_eq!(table.min(), Ok(1));
    assert_eq!(table.keys(&1, &3), vec![1, 2, 3]);
}

#[test]
fn test_crud() {
    let size = 200_i64;
    let mut table: OrderedTable<i64, i64> = OrderedTable::new("test-table");
    let mut model: BTreeMap<i64, i64> = BTreeMap::new();

    for i in 0..5_000 {
        let key: i64 = (random::<i64>() % size).abs();
        let value: i64 = random();
        match (random::<i64>() % 3).abs() {
            0 => {
                assert_eq!(table.set(key, value), model.insert(key, value));
            }
            1 => {
                assert_eq!(table.delete(&key), model.remove(&key));
            }
            2 => {
                assert_eq!(table.get(&key), model.get(&key).cloned());
            }
            op => panic!("unreachable {}", op),
        };

        assert_eq!(table.len(), model.len());
        if i % 10 == 0 {
            assert!(table.validate().is_ok());
        }
    }
    assert!(table.validate().is_ok());

    let pairs: Vec<(i64, i64)> = model.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq!(table.pairs(), pairs);

    // ranges and reverses against the model.
    for _ in 0..1_000 {
        let (low, high) = random_low_high(size);
        let expected: Vec<(i64, i64)> = model
            .iter()
            .filter(|(k, _)| within_bounds(**k, &low, &high))
            .map(|(k, v)| (*k, *v))
            .collect();

        let found: Vec<(i64, i64)> = table.range((low, high)).collect();
        assert_eq!(found, expected, "range {:?} {:?}", low, high);

        let mut reversed: Vec<(i64, i64)> = table.range((low, high)).rev().collect();
        reversed.reverse();
        assert_eq!(reversed, expected, "reverse {:?} {:?}", low, high);
    }

    // rank and size_of_range stay consistent with the model.
    for _ in 0..1_000 {
        let a = (random::<i64>() % size).abs();
        let b = (random::<i64>() % size).abs();
        let (lo, hi) = (a.min(b), a.max(b));
        assert_eq!(table.size_of_range(&lo, &hi), model.range(lo..=hi).count());
        assert_eq!(table.rank(&lo), model.range(..lo).count());
    }
}

proptest! {
    #[test]
    fn prop_rank_select_inverse(keys in prop::collection::btree_set(0_i64..10_000, 0..200_usize)) {
        let table = OrderedTable::load_from("prop-table", keys.iter().map(|&k| (k, k)));
        for (rank, key) in keys.iter().enumerate() {
            prop_assert_eq!(table.rank(key), rank);
            prop_assert_eq!(table.select(rank).unwrap(), *key);
        }
        prop_assert!(table.validate().is_ok());
    }

    #[test]
    fn prop_invariants_after_mixed_ops(
        sets in prop::collection::vec((0_i64..500, 0_i64..1_000), 1..100_usize),
        dels in prop::collection::vec(0_i64..500, 1..100_usize),
    ) {
        let mut table: OrderedTable<i64, i64> = OrderedTable::new("prop-table");
        let mut model: BTreeMap<i64, i64> = BTreeMap::new();
        for (key, value) in sets {
            prop_assert_eq!(table.set(key, value), model.insert(key, value));
        }
        for key in dels {
            prop_assert_eq!(table.delete(&key), model.remove(&key));
        }
        prop_assert!(table.validate().is_ok());
        let pairs: Vec<(i64, i64)> = model.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(table.pairs(), pairs);
    }

    // inserting a key then deleting it restores the original key set.
    #[test]
    fn prop_delete_round_trip(
        keys in prop::collection::btree_set(0_i64..1_000, 1..50_usize),
        extra in 1_000_i64..2_000,
    ) {
        let mut table = OrderedTable::load_from("prop-table", keys.iter().map(|&k| (k, k)));
        let before: Vec<i64> = table.keys(&i64::MIN, &i64::MAX);
        table.set(extra, extra);
        prop_assert_eq!(table.delete(&extra), Some(extra));
        prop_assert!(table.validate().is_ok());
        prop_assert_eq!(table.keys(&i64::MIN, &i64::MAX), before);
    }
}

fn within_bounds(key: i64, low: &Bound<i64>, high: &Bound<i64>) -> bool {
    let lo_ok = match low {
        Bound::Included(lo) => key >= *lo,
        Bound::Excluded(lo) => key > *lo,
        Bound::Unbounded => true,
    };
    let hi_ok = match high {
        Bound::Included(hi) => key <= *hi,
        Bound::Excluded(hi) => key < *hi,
        Bound::Unbounded => true,
    };
    lo_ok && hi_ok
}

fn random_low_high(size: i64) -> (Bound<i64>, Bound<i64>) {
    let low = (random::<i64>() % size).abs();
    let high = (random::<i64>() % size).abs();
    let low = match random::<u8>() % 3 {
        0 => Bound::Included(low),
        1 => Bound::Excluded(low),
        2 => Bound::Unbounded,
        _ => unreachable!(),
    };
    let high = match random::<u8>() % 3 {
        0 => Bound::Included(high),
        1 => Bound::Excluded(high),
        2 => Bound::Unbounded,
        _ => unreachable!(),
    };
    (low, high)
}

fn make_seed() -> u64 {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
    elapsed.as_nanos() as u64
}
