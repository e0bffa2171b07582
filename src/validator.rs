use std::collections::HashSet;

use log::warn;

use crate::error::ChainValidationError;
use crate::hashing::hash_block;
use crate::models::Block;
use crate::pow::validate_proof;

/// Walks the chain and reports the first broken invariant.
///
/// This is the only chain check in the crate: startup, `/validate`, incoming
/// chains and consensus all call through here.
pub fn validate_chain(chain: &[Block]) -> Result<(), ChainValidationError> {
    let genesis = chain.first().ok_or(ChainValidationError::Empty)?;
    if !genesis.is_genesis() {
        return Err(ChainValidationError::InvalidGenesis);
    }
    if genesis.hash != hash_block(genesis) {
        return Err(ChainValidationError::HashMismatch {
            index: genesis.index,
        });
    }

    let mut voters: HashSet<&str> = HashSet::new();
    record_voters(&mut voters, genesis)?;

    for pair in chain.windows(2) {
        check_link(&pair[0], &pair[1], &mut voters)?;
    }
    Ok(())
}

/// Checks `block` against its predecessor and records its voters.
fn check_link<'a>(
    previous: &Block,
    block: &'a Block,
    voters: &mut HashSet<&'a str>,
) -> Result<(), ChainValidationError> {
    if previous.index.checked_add(1) != Some(block.index) {
        return Err(ChainValidationError::IndexGap {
            index: block.index,
            expected: previous.index.saturating_add(1),
        });
    }
    if block.hash != hash_block(block) {
        return Err(ChainValidationError::HashMismatch { index: block.index });
    }
    if block.previous_hash != hash_block(previous) {
        return Err(ChainValidationError::PreviousHashMismatch { index: block.index });
    }
    if !validate_proof(previous.proof, block.proof) {
        return Err(ChainValidationError::InvalidProof { index: block.index });
    }
    record_voters(voters, block)
}

fn record_voters<'a>(
    voters: &mut HashSet<&'a str>,
    block: &'a Block,
) -> Result<(), ChainValidationError> {
    for vote in &block.votes {
        if !voters.insert(vote.voter_id.as_str()) {
            return Err(ChainValidationError::DuplicateVoter {
                index: block.index,
                voter_id: vote.voter_id.clone(),
            });
        }
    }
    Ok(())
}

pub fn is_valid(chain: &[Block]) -> bool {
    match validate_chain(chain) {
        Ok(()) => true,
        Err(err) => {
            warn!("Chain rejected: {}", err);
            false
        }
    }
}
