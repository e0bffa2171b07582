//! Longest-valid-chain rule.

use log::{debug, info, warn};

use crate::error::PeerError;
use crate::models::{Block, ChainResponse};
use crate::validator;

/// Picks the longest valid peer chain that is strictly longer than `local`.
///
/// Peers that could not be reached are skipped, as are responses whose
/// advertised length disagrees with the chain they carry. Equal length never
/// wins.
pub fn resolve_conflicts<I>(local: &[Block], responses: I) -> Option<Vec<Block>>
where
    I: IntoIterator<Item = (String, Result<ChainResponse, PeerError>)>,
{
    let mut max_length = local.len();
    let mut best: Option<Vec<Block>> = None;

    for (peer, response) in responses {
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!("Error fetching chain from {}: {}", peer, err);
                continue;
            }
        };
        if response.length != response.chain.len() {
            warn!(
                "Peer {} advertised length {} but sent {} blocks",
                peer,
                response.length,
                response.chain.len()
            );
            continue;
        }
        if response.length <= max_length {
            debug!("Peer {} chain of length {} is not longer", peer, response.length);
            continue;
        }
        if validator::is_valid(&response.chain) {
            info!("Peer {} offers a longer valid chain ({})", peer, response.length);
            max_length = response.length;
            best = Some(response.chain);
        }
    }
    best
}
