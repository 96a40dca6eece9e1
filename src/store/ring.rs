use sha2::{Digest, Sha256};

/// Pick the shard owning `key` by rendezvous hashing.
///
/// Every shard gets a weight derived from its name and the key; the heaviest
/// wins. The result depends only on the shard names and the key, so fleet
/// members configured with the same shards agree without coordination, and
/// removing one shard only moves the keys it owned.
pub(crate) fn select_shard<'a>(shards: impl IntoIterator<Item = &'a str>, key: &str) -> usize {
    shards
        .into_iter()
        .enumerate()
        .max_by_key(|(_, shard)| shard_weight(shard, key))
        .map(|(index, _)| index)
        .unwrap_or(0)
}

fn shard_weight(shard: &str, key: &str) -> u64 {
    let digest = Sha256::new()
        .chain_update(shard.as_bytes())
        .chain_update([0u8])
        .chain_update(key.as_bytes())
        .finalize();

    let mut weight = [0u8; 8];
    weight.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(weight)
}
