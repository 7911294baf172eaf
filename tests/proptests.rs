use concurrent_shardmap::{ShardMap, ShardMapBuilder};
use proptest::prelude::*;
use std::collections::HashMap as ModelMap;

fn with_shards(shard_count: usize) -> ShardMap<u16, u32> {
    ShardMapBuilder::new()
        .shard_count(shard_count)
        .unwrap()
        .build()
        .unwrap()
}

// Model the map against std's HashMap: insert / insert_or_assign / erase / extract.
proptest! {
    #[test]
    fn prop_matches_model(
        shard_count in 1usize..=9,
        ops in proptest::collection::vec((0u8..=3u8, 0u16..64, any::<u32>()), 1..200),
    ) {
        let map = with_shards(shard_count);
        let mut model: ModelMap<u16, u32> = ModelMap::new();

        for (op, key, value) in ops {
            match op {
                0 => {
                    let fresh = !model.contains_key(&key);
                    model.entry(key).or_insert(value);
                    prop_assert_eq!(map.insert(key, value), fresh);
                }
                1 => {
                    let fresh = model.insert(key, value).is_none();
                    prop_assert_eq!(map.insert_or_assign(key, value), fresh);
                }
                2 => {
                    let expected = usize::from(model.remove(&key).is_some());
                    prop_assert_eq!(map.erase(&key), expected);
                }
                3 => {
                    let expected = model.remove_entry(&key);
                    prop_assert_eq!(map.extract(&key), expected);
                }
                _ => unreachable!(),
            }

            // Never more entries than distinct keys, and lookups agree.
            prop_assert_eq!(map.len(), model.len());
            prop_assert_eq!(map.get(&key), model.get(&key).copied());
        }
    }

    #[test]
    fn prop_routing_stable_under_other_writes(
        shard_count in 1usize..=16,
        key in any::<u16>(),
        others in proptest::collection::vec(any::<u16>(), 0..100),
    ) {
        let map = with_shards(shard_count);
        map.insert(key, 7);
        let index = map.shard_index(&key);

        for other in others.into_iter().filter(|o| *o != key) {
            map.insert_or_assign(other, 1);
            if other % 2 == 0 {
                map.erase(&other);
            }
        }

        prop_assert_eq!(map.shard_index(&key), index);
        prop_assert_eq!(map.at(&key), Ok(7));
    }

    #[test]
    fn prop_snapshot_is_disjoint_union(
        shard_count in 1usize..=16,
        keys in proptest::collection::hash_set(any::<u16>(), 0..300),
    ) {
        let map = with_shards(shard_count);
        for key in &keys {
            map.insert(*key, u32::from(*key));
        }

        let snapshot = map.snapshot();
        prop_assert_eq!(snapshot.len(), keys.len());
        prop_assert_eq!(map.shard_loads().iter().sum::<usize>(), keys.len());
        for key in &keys {
            prop_assert_eq!(snapshot.get(key), Some(&u32::from(*key)));
        }
    }

    #[test]
    fn prop_extract_then_insert_restores(
        keys in proptest::collection::hash_set(any::<u16>(), 1..100),
        pick in any::<prop::sample::Index>(),
    ) {
        let map = with_shards(5);
        for key in &keys {
            map.insert(*key, u32::from(*key) * 3);
        }
        let keys: Vec<u16> = keys.into_iter().collect();
        let key = keys[pick.index(keys.len())];
        let before = map.snapshot();

        let (k, v) = map.extract(&key).unwrap();
        prop_assert!(map.insert(k, v));

        prop_assert_eq!(map.len(), before.len());
        prop_assert_eq!(map.at(&key), Ok(u32::from(key) * 3));
        prop_assert_eq!(map.snapshot(), before);
    }

    #[test]
    fn prop_merge_never_overwrites_target(
        target_keys in proptest::collection::hash_set(0u16..100, 0..60),
        source_keys in proptest::collection::hash_set(0u16..100, 0..60),
    ) {
        let target = with_shards(4);
        let source = with_shards(6);
        for key in &target_keys {
            target.insert(*key, 1);
        }
        for key in &source_keys {
            source.insert(*key, 2);
        }

        let moved = target.merge(&source);
        prop_assert_eq!(moved, source_keys.difference(&target_keys).count());

        for key in target_keys.intersection(&source_keys) {
            prop_assert_eq!(target.at(key), Ok(1));
            prop_assert_eq!(source.at(key), Ok(2));
        }
        for key in source_keys.difference(&target_keys) {
            prop_assert_eq!(target.at(key), Ok(2));
            prop_assert!(!source.contains_key(key));
        }
        prop_assert_eq!(source.len(), target_keys.intersection(&source_keys).count());
    }
}
