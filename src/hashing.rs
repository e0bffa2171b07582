use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::{Block, Vote};

/// Every block field except `hash`.
#[derive(Serialize)]
struct BlockContents<'a> {
    index: u64,
    timestamp: &'a str,
    votes: &'a [Vote],
    proof: u64,
    previous_hash: &'a str,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Canonical encoding of a block minus its `hash` field.
///
/// The contents go through `serde_json::Value` first: its object map is
/// ordered by key, so the encoding is independent of struct field order and
/// of how the block value was put together.
pub fn canonical_bytes(block: &Block) -> Vec<u8> {
    let contents = BlockContents {
        index: block.index,
        timestamp: &block.timestamp,
        votes: &block.votes,
        proof: block.proof,
        previous_hash: &block.previous_hash,
    };
    // Only strings and integers reach the serializer, which cannot fail.
    let value = serde_json::to_value(contents).unwrap_or_default();
    value.to_string().into_bytes()
}

/// Hex SHA-256 of the canonical encoding of `block`, ignoring `block.hash`.
pub fn hash_block(block: &Block) -> String {
    sha256_hex(&canonical_bytes(block))
}
