//! Key layout of the inbox database. Indexed keys use big-endian u64
//! suffixes so lexicographic iteration is numeric iteration.

pub const DELAYED_MESSAGE_PREFIX: &[u8] = b"d";
pub const BATCH_META_PREFIX: &[u8] = b"s";
pub const DELAYED_SEQUENCED_PREFIX: &[u8] = b"q";

pub const DELAYED_COUNT_KEY: &[u8] = b"_delayedCount";
pub const BATCH_COUNT_KEY: &[u8] = b"_batchCount";
pub const SCHEMA_VERSION_KEY: &[u8] = b"_schemaVersion";

pub const CURRENT_SCHEMA_VERSION: u64 = 1;

pub fn uint64_to_key(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}

pub fn db_key(prefix: &[u8], index: u64) -> Vec<u8> {
    let mut v = Vec::with_capacity(prefix.len() + 8);
    v.extend_from_slice(prefix);
    v.extend_from_slice(&uint64_to_key(index));
    v
}
