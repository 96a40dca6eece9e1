use std::collections::HashMap;

use crate::{derive_key, store::select_shard};

const SHARDS: [&str; 3] = ["10.0.0.1:6379", "10.0.0.2:6379", "10.0.0.3:6379"];

#[test]
fn single_shard_owns_every_key() {
    for identity in ["a", "b", "c"] {
        let key = derive_key("", identity);
        assert_eq!(select_shard(["only:6379"], &key), 0);
    }
}

#[test]
fn selection_ignores_shard_order() {
    let reversed: Vec<&str> = SHARDS.iter().rev().copied().collect();

    for i in 0..100 {
        let key = derive_key("g", &format!("client-{i}"));
        let owner = SHARDS[select_shard(SHARDS, &key)];
        let owner_reversed = reversed[select_shard(reversed.iter().copied(), &key)];
        assert_eq!(owner, owner_reversed);
    }
}

#[test]
fn keys_spread_over_all_shards() {
    let mut per_shard: HashMap<usize, usize> = HashMap::new();

    for i in 0..3000 {
        let key = derive_key("g", &format!("client-{i}"));
        *per_shard.entry(select_shard(SHARDS, &key)).or_default() += 1;
    }

    assert_eq!(per_shard.len(), SHARDS.len());
    for count in per_shard.values() {
        assert!(*count > 700, "unbalanced ring: {per_shard:?}");
    }
}

#[test]
fn removing_a_shard_only_moves_its_keys() {
    let remaining = [SHARDS[0], SHARDS[2]];

    for i in 0..500 {
        let key = derive_key("g", &format!("client-{i}"));
        let before = SHARDS[select_shard(SHARDS, &key)];
        let after = remaining[select_shard(remaining, &key)];

        if before != SHARDS[1] {
            assert_eq!(before, after);
        }
    }
}
