use std::{fmt, ops::Deref, sync::Arc};

use sha2::{Digest, Sha256};

const KEY_PREFIX: &str = "ratelimit";

/// Store key of one caller identity within one limiter group.
///
/// Laid out as `ratelimit.<group>.<hex sha256 of identity>`. The hash part has
/// a fixed length and never contains a `.`, so two keys can only be equal when
/// both group and identity hash are equal; an ungrouped key (`ratelimit..<h>`)
/// never collides with a grouped one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateKey(Arc<str>);

impl Deref for RateKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded SHA-256 of `identity`.
pub(crate) fn hash_identity(identity: &str) -> String {
    hex::encode(Sha256::digest(identity.as_bytes()))
}

/// Derive the store key for `identity` within `group`.
///
/// Pure and deterministic: every fleet member derives the same key for the
/// same input, and the raw identity never reaches the store.
pub fn derive_key(group: &str, identity: &str) -> RateKey {
    let key = format!("{KEY_PREFIX}.{group}.{}", hash_identity(identity));
    RateKey(Arc::from(key))
}
