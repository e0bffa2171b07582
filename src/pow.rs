//! Proof-of-work over the previous block's proof value.
//!
//! A proof `p` is accepted after `q` when the hex SHA-256 of the decimal
//! rendering of `p² - q²` starts with [`DIFFICULTY`] zero characters.

use crate::hashing::sha256_hex;

/// Leading `'0'` hex digits required. Fixed for the lifetime of a chain.
pub const DIFFICULTY: usize = 4;

/// Decimal rendering of `proof² - previous_proof²`, sign included.
///
/// Squares of `u64` values always fit in `u128`, so the difference is exact.
fn square_difference(previous_proof: u64, proof: u64) -> String {
    let previous = u128::from(previous_proof) * u128::from(previous_proof);
    let current = u128::from(proof) * u128::from(proof);
    if current >= previous {
        (current - previous).to_string()
    } else {
        format!("-{}", previous - current)
    }
}

fn proof_digest(previous_proof: u64, proof: u64) -> String {
    sha256_hex(square_difference(previous_proof, proof).as_bytes())
}

fn meets_difficulty(digest: &str) -> bool {
    digest.len() >= DIFFICULTY && digest.bytes().take(DIFFICULTY).all(|b| b == b'0')
}

/// Checks the predicate between two consecutive proofs. Shared by local
/// mining, chain validation and blocks received from peers.
pub fn validate_proof(previous_proof: u64, proof: u64) -> bool {
    meets_difficulty(&proof_digest(previous_proof, proof))
}

/// Linear search starting at `previous_proof + 1`.
///
/// There is no timeout: the search only ends when the predicate holds. Past
/// `u64::MAX` it wraps to 0 and keeps going.
pub fn find_proof(previous_proof: u64) -> u64 {
    let mut proof = previous_proof.wrapping_add(1);
    while !validate_proof(previous_proof, proof) {
        proof = proof.wrapping_add(1);
    }
    proof
}
