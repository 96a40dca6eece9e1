mod runtime;

mod test_common_validation;
mod test_registry;
mod test_shard_ring;
