//! Hash Slot Calculation
//!
//! Every key maps onto one of 16384 slots (Redis-compatible) via CRC32.
//! Keys are opaque bytes; the hash-tag braces are matched bytewise.

/// Total number of hash slots in the cluster
pub const SLOT_COUNT: u16 = 16384;

/// Calculate the hash slot for a key.
///
/// Supports Redis hash tags: if the key contains a `{tag}` section, only the
/// tag content is hashed, so related keys can be pinned to the same slot for
/// multi-key operations.
pub fn hash_slot(key: &[u8]) -> u16 {
    (crc32fast::hash(hash_tag(key)) % SLOT_COUNT as u32) as u16
}

/// Extract the effective hash input for a key.
///
/// Only the first `{…}` pair counts. An empty tag (`{}`) or a missing `}`
/// falls back to the whole key.
fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        if let Some(close) = key[open + 1..].iter().position(|&b| b == b'}') {
            if close > 0 {
                return &key[open + 1..open + 1 + close];
            }
        }
    }
    key
}
