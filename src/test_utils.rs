use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::ledger::{genesis_block, next_block};
use crate::models::{Block, Vote};
use crate::pow::find_proof;

const CACHED_BLOCKS: usize = 4;

/// A valid chain of genesis plus `blocks` mined blocks, each carrying at
/// least one vote from a distinct voter.
///
/// Proof search is the slow part, so one chain is mined per test binary and
/// prefixes of it are handed out.
pub fn mined_chain(blocks: usize) -> Vec<Block> {
    static CHAIN: OnceLock<Vec<Block>> = OnceLock::new();
    assert!(blocks <= CACHED_BLOCKS, "at most {CACHED_BLOCKS} cached blocks");
    let chain = CHAIN.get_or_init(|| {
        let mut chain = vec![genesis_block()];
        for i in 0..CACHED_BLOCKS {
            let mut votes = vec![Vote::new(format!("voter-{i}"), "blue")];
            if i % 2 == 1 {
                votes.push(Vote::new(format!("voter-{i}-b"), "red"));
            }
            let previous = &chain[chain.len() - 1];
            let block = next_block(previous, votes, find_proof(previous.proof));
            chain.push(block);
        }
        chain
    });
    chain[..=blocks].to_vec()
}

/// A fresh file path under the system temp dir.
pub fn scratch_path(name: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "vote-ledger-{}-{}-{}.json",
        name,
        std::process::id(),
        n
    ))
}
