use std::collections::HashSet;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use log::{info, warn};

use crate::error::{LedgerError, Result};
use crate::hashing::hash_block;
use crate::models::{
    Block, BlockMode, LedgerSnapshot, MineOutcome, Vote, GENESIS_INDEX, GENESIS_PREVIOUS_HASH,
    GENESIS_PROOF,
};
use crate::pow::{find_proof, validate_proof};
use crate::store::ChainStore;
use crate::validator;

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Seals a block: fills in `hash` from the other fields.
fn seal(
    index: u64,
    timestamp: String,
    votes: Vec<Vote>,
    proof: u64,
    previous_hash: String,
) -> Block {
    let mut block = Block {
        index,
        timestamp,
        votes,
        proof,
        previous_hash,
        hash: String::new(),
    };
    block.hash = hash_block(&block);
    block
}

pub fn genesis_block() -> Block {
    seal(
        GENESIS_INDEX,
        now_timestamp(),
        Vec::new(),
        GENESIS_PROOF,
        GENESIS_PREVIOUS_HASH.to_string(),
    )
}

/// Builds the successor of `previous` carrying `votes`. The caller supplies a
/// proof that satisfies the predicate against `previous.proof`.
pub fn next_block(previous: &Block, votes: Vec<Vote>, proof: u64) -> Block {
    seal(
        previous.index + 1,
        now_timestamp(),
        votes,
        proof,
        hash_block(previous),
    )
}

/// Input of one proof search, frozen when mining starts.
#[derive(Debug, Clone)]
pub struct MiningJob {
    votes: Vec<Vote>,
    previous: Block,
}

impl MiningJob {
    pub fn previous_proof(&self) -> u64 {
        self.previous.proof
    }

    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }
}

/// The node's chain, its pending votes and the voter registry.
///
/// Every mutation that touches the chain is written to the store before it
/// becomes visible; a failed save leaves the ledger as it was.
pub struct Ledger {
    chain: Vec<Block>,
    pending_votes: Vec<Vote>,
    voters: HashSet<String>,
    is_valid: bool,
    store: Arc<dyn ChainStore>,
}

impl Ledger {
    /// Loads the stored chain, or creates and persists a genesis block when
    /// none exists. A stored chain that fails validation is kept as is and
    /// flags the ledger as needing a reset.
    pub fn open(store: Arc<dyn ChainStore>) -> Result<Self> {
        let (chain, is_valid) = match store.load()? {
            Some(chain) => {
                let is_valid = validator::is_valid(&chain);
                if !is_valid {
                    warn!("Invalid chain detected. Manual intervention required.");
                }
                (chain, is_valid)
            }
            None => {
                let chain = vec![genesis_block()];
                store.save(&chain)?;
                info!("No existing ledger, created genesis block");
                (chain, true)
            }
        };
        let voters = collect_voters(&chain);
        Ok(Self {
            chain,
            pending_votes: Vec::new(),
            voters,
            is_valid,
            store,
        })
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending_votes(&self) -> &[Vote] {
        &self.pending_votes
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.voters.contains(voter_id)
    }

    fn tip(&self) -> Option<&Block> {
        self.chain.last()
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(LedgerError::NeedsReset)
        }
    }

    /// Queues a vote for the next block and returns that block's index.
    pub fn admit_vote(&mut self, voter_id: &str, candidate: &str) -> Result<u64> {
        if voter_id.is_empty() || candidate.is_empty() {
            return Err(LedgerError::InvalidVote);
        }
        self.ensure_writable()?;
        let pending = self.pending_votes.iter().any(|v| v.voter_id == voter_id);
        if pending || self.has_voted(voter_id) {
            return Err(LedgerError::DuplicateVote {
                voter_id: voter_id.to_string(),
            });
        }
        self.pending_votes.push(Vote::new(voter_id, candidate));
        Ok(self.chain.len() as u64 + 1)
    }

    /// Freezes the votes the next block will carry. `None` when there is
    /// nothing to mine.
    pub fn prepare_mining(&self, mode: BlockMode) -> Result<Option<MiningJob>> {
        self.ensure_writable()?;
        let (Some(previous), false) = (self.tip(), self.pending_votes.is_empty()) else {
            return Ok(None);
        };
        let votes = match mode {
            BlockMode::Batched => self.pending_votes.clone(),
            BlockMode::PerVote => self.pending_votes[..1].to_vec(),
        };
        Ok(Some(MiningJob {
            votes,
            previous: previous.clone(),
        }))
    }

    /// Appends the block for `job` once its proof has been found.
    ///
    /// Votes admitted after the job was prepared stay pending.
    pub fn commit_mining(&mut self, job: MiningJob, proof: u64) -> Result<MineOutcome> {
        self.ensure_writable()?;
        match self.tip() {
            Some(tip) if tip.hash == job.previous.hash => {}
            _ => {
                warn!(
                    "Chain moved past block {} while mining, dropping result",
                    job.previous.index
                );
                return Ok(MineOutcome::Superseded);
            }
        }
        debug_assert!(validate_proof(job.previous.proof, proof));

        let block = next_block(&job.previous, job.votes, proof);
        self.chain.push(block.clone());
        if let Err(err) = self.store.save(&self.chain) {
            self.chain.pop();
            return Err(err.into());
        }

        let committed: HashSet<&str> = block.votes.iter().map(|v| v.voter_id.as_str()).collect();
        self.pending_votes
            .retain(|v| !committed.contains(v.voter_id.as_str()));
        self.voters
            .extend(block.votes.iter().map(|v| v.voter_id.clone()));
        info!(
            "Mined block {} with {} votes (proof {})",
            block.index,
            block.votes.len(),
            block.proof
        );
        Ok(MineOutcome::Mined(block))
    }

    /// Prepares, searches and commits in one call on the current thread.
    pub fn mine_block(&mut self, mode: BlockMode) -> Result<MineOutcome> {
        let Some(job) = self.prepare_mining(mode)? else {
            return Ok(MineOutcome::NothingToMine);
        };
        let proof = find_proof(job.previous_proof());
        self.commit_mining(job, proof)
    }

    /// Swaps in `candidate` if it is strictly longer and valid.
    ///
    /// Returns `Ok(false)` when the candidate is rejected.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<bool> {
        if candidate.len() <= self.chain.len() {
            return Ok(false);
        }
        if !validator::is_valid(&candidate) {
            return Ok(false);
        }
        self.store.save(&candidate)?;

        info!(
            "Replacing chain of length {} with length {}",
            self.chain.len(),
            candidate.len()
        );
        self.voters = collect_voters(&candidate);
        self.chain = candidate;
        self.pending_votes.clear();
        self.is_valid = true;
        Ok(true)
    }

    /// Appends a single block offered by a peer on top of the local tip.
    pub fn append_external_block(&mut self, block: Block) -> Result<()> {
        self.ensure_writable()?;
        let tip = self.tip().ok_or(LedgerError::NeedsReset)?;
        if block.previous_hash != tip.hash {
            return Err(LedgerError::PreviousHashMismatch {
                expected: tip.hash.clone(),
                found: block.previous_hash,
            });
        }
        if !validate_proof(tip.proof, block.proof) {
            return Err(LedgerError::InvalidProof {
                previous_proof: tip.proof,
                proof: block.proof,
            });
        }
        if tip.index.checked_add(1) != Some(block.index) {
            return Err(LedgerError::UnexpectedIndex {
                expected: tip.index.saturating_add(1),
                found: block.index,
            });
        }
        if block.hash != hash_block(&block) {
            return Err(LedgerError::BlockHashMismatch { index: block.index });
        }
        let mut seen = HashSet::new();
        for vote in &block.votes {
            if self.has_voted(&vote.voter_id) || !seen.insert(vote.voter_id.as_str()) {
                return Err(LedgerError::DuplicateVote {
                    voter_id: vote.voter_id.clone(),
                });
            }
        }

        let voter_ids: Vec<String> = block.votes.iter().map(|v| v.voter_id.clone()).collect();
        let index = block.index;
        self.chain.push(block);
        if let Err(err) = self.store.save(&self.chain) {
            self.chain.pop();
            return Err(err.into());
        }
        self.pending_votes
            .retain(|v| !voter_ids.contains(&v.voter_id));
        self.voters.extend(voter_ids);
        info!("Accepted block {} from peer", index);
        Ok(())
    }

    /// Discards an invalid chain and starts over from a fresh genesis block.
    pub fn reset(&mut self) -> Result<&[Block]> {
        if self.is_valid {
            return Err(LedgerError::ResetNotPermitted);
        }
        let chain = vec![genesis_block()];
        self.store.save(&chain)?;
        warn!("Ledger reset to genesis, {} blocks discarded", self.chain.len());
        self.chain = chain;
        self.pending_votes.clear();
        self.voters.clear();
        self.is_valid = true;
        Ok(&self.chain)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            chain: self.chain.clone(),
            length: self.chain.len(),
        }
    }

    /// Validates `chain` if given, the local chain otherwise.
    pub fn validate(&self, chain: Option<&[Block]>) -> bool {
        validator::is_valid(chain.unwrap_or(&self.chain))
    }
}

fn collect_voters(chain: &[Block]) -> HashSet<String> {
    chain
        .iter()
        .flat_map(|block| block.votes.iter().map(|v| v.voter_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_utils::mined_chain;

    fn open_ledger() -> (Ledger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::open(store.clone()).unwrap();
        (ledger, store)
    }

    #[test]
    fn test_open_creates_and_persists_genesis() {
        let (ledger, store) = open_ledger();
        assert_eq!(ledger.len(), 1);
        let genesis = &ledger.chain()[0];
        assert_eq!(genesis.index, GENESIS_INDEX);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.proof, GENESIS_PROOF);
        assert!(ledger.is_valid());
        assert_eq!(store.saved().unwrap(), ledger.chain());
    }

    #[test]
    fn test_open_flags_invalid_chain_without_repair() {
        let mut chain = mined_chain(2);
        chain[1].proof += 1;
        let store = Arc::new(MemoryStore::with_chain(chain.clone()));
        let mut ledger = Ledger::open(store).unwrap();

        assert!(!ledger.is_valid());
        assert_eq!(ledger.chain(), chain.as_slice());
        assert!(matches!(
            ledger.admit_vote("zoe", "blue"),
            Err(LedgerError::NeedsReset)
        ));
    }

    #[test]
    fn test_admit_vote_returns_next_index() {
        let (mut ledger, _) = open_ledger();
        assert_eq!(ledger.admit_vote("alice", "blue").unwrap(), 2);
        assert_eq!(ledger.admit_vote("bob", "red").unwrap(), 2);
        assert_eq!(ledger.pending_votes().len(), 2);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_duplicate_votes_rejected() {
        let (mut ledger, _) = open_ledger();
        ledger.admit_vote("alice", "blue").unwrap();
        // both pending
        assert!(matches!(
            ledger.admit_vote("alice", "red"),
            Err(LedgerError::DuplicateVote { .. })
        ));
        ledger.mine_block(BlockMode::Batched).unwrap();
        // one committed
        assert!(matches!(
            ledger.admit_vote("alice", "red"),
            Err(LedgerError::DuplicateVote { .. })
        ));
        assert_eq!(ledger.admit_vote("carol", "red").unwrap(), 3);
    }

    #[test]
    fn test_empty_fields_rejected() {
        let (mut ledger, _) = open_ledger();
        assert!(matches!(ledger.admit_vote("", "blue"), Err(LedgerError::InvalidVote)));
        assert!(matches!(ledger.admit_vote("alice", ""), Err(LedgerError::InvalidVote)));
    }

    #[test]
    fn test_mine_with_nothing_pending() {
        let (mut ledger, _) = open_ledger();
        assert_eq!(
            ledger.mine_block(BlockMode::Batched).unwrap(),
            MineOutcome::NothingToMine
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_mine_batches_pending_votes() {
        let (mut ledger, store) = open_ledger();
        ledger.admit_vote("alice", "blue").unwrap();
        ledger.admit_vote("bob", "red").unwrap();

        let MineOutcome::Mined(block) = ledger.mine_block(BlockMode::Batched).unwrap() else {
            panic!("expected a block");
        };
        assert_eq!(block.index, 2);
        assert_eq!(block.votes.len(), 2);
        assert_eq!(block.previous_hash, hash_block(&ledger.chain()[0]));
        assert_eq!(block.hash, hash_block(&block));
        assert!(ledger.pending_votes().is_empty());
        assert!(ledger.has_voted("bob"));
        assert_eq!(store.saved().unwrap().len(), 2);
        assert!(ledger.validate(None));
    }

    #[test]
    fn test_per_vote_mode_takes_oldest() {
        let (mut ledger, _) = open_ledger();
        ledger.admit_vote("alice", "blue").unwrap();
        ledger.admit_vote("bob", "red").unwrap();

        let MineOutcome::Mined(block) = ledger.mine_block(BlockMode::PerVote).unwrap() else {
            panic!("expected a block");
        };
        assert_eq!(block.votes, vec![Vote::new("alice", "blue")]);
        assert_eq!(ledger.pending_votes(), &[Vote::new("bob", "red")]);
    }

    #[test]
    fn test_votes_admitted_during_search_stay_pending() {
        let (mut ledger, _) = open_ledger();
        ledger.admit_vote("alice", "blue").unwrap();
        let job = ledger.prepare_mining(BlockMode::Batched).unwrap().unwrap();
        let proof = find_proof(job.previous_proof());

        ledger.admit_vote("bob", "red").unwrap();
        let MineOutcome::Mined(block) = ledger.commit_mining(job, proof).unwrap() else {
            panic!("expected a block");
        };
        assert_eq!(block.votes, vec![Vote::new("alice", "blue")]);
        assert_eq!(ledger.pending_votes(), &[Vote::new("bob", "red")]);
    }

    #[test]
    fn test_commit_after_replacement_is_superseded() {
        let longer = mined_chain(2);
        let store = Arc::new(MemoryStore::with_chain(longer[..1].to_vec()));
        let mut ledger = Ledger::open(store).unwrap();
        ledger.admit_vote("zoe", "blue").unwrap();
        let job = ledger.prepare_mining(BlockMode::Batched).unwrap().unwrap();
        let proof = find_proof(job.previous_proof());

        assert!(ledger.replace_chain(longer.clone()).unwrap());
        assert_eq!(ledger.commit_mining(job, proof).unwrap(), MineOutcome::Superseded);
        assert_eq!(ledger.chain(), longer.as_slice());
    }

    #[test]
    fn test_failed_save_leaves_ledger_untouched() {
        let (mut ledger, store) = open_ledger();
        ledger.admit_vote("alice", "blue").unwrap();
        store.fail_saves(true);

        assert!(matches!(
            ledger.mine_block(BlockMode::Batched),
            Err(LedgerError::Persistence(_))
        ));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.pending_votes().len(), 1);
        assert!(!ledger.has_voted("alice"));

        store.fail_saves(false);
        assert!(matches!(
            ledger.mine_block(BlockMode::Batched).unwrap(),
            MineOutcome::Mined(_)
        ));
    }

    #[test]
    fn test_replace_chain_requires_longer_and_valid() {
        let chain = mined_chain(3);
        let store = Arc::new(MemoryStore::with_chain(chain[..3].to_vec()));
        let mut ledger = Ledger::open(store.clone()).unwrap();
        ledger.admit_vote("zoe", "blue").unwrap();

        // same length
        assert!(!ledger.replace_chain(chain[..3].to_vec()).unwrap());

        // one longer but broken at block 2
        let mut broken = chain.clone();
        broken[1].previous_hash = "1".repeat(64);
        assert!(!ledger.replace_chain(broken).unwrap());
        assert_eq!(ledger.chain(), &chain[..3]);
        assert_eq!(ledger.pending_votes().len(), 1);

        assert!(ledger.replace_chain(chain.clone()).unwrap());
        assert_eq!(ledger.chain(), chain.as_slice());
        assert!(ledger.pending_votes().is_empty());
        assert!(ledger.has_voted(&chain[3].votes[0].voter_id));
        assert_eq!(store.saved().unwrap(), chain);
    }

    #[test]
    fn test_replace_chain_persistence_failure_is_atomic() {
        let chain = mined_chain(2);
        let store = Arc::new(MemoryStore::with_chain(chain[..1].to_vec()));
        let mut ledger = Ledger::open(store.clone()).unwrap();
        store.fail_saves(true);

        assert!(ledger.replace_chain(chain).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_external_block_checks() {
        let chain = mined_chain(2);
        let store = Arc::new(MemoryStore::with_chain(chain[..2].to_vec()));
        let mut ledger = Ledger::open(store).unwrap();

        let mut wrong_link = chain[2].clone();
        wrong_link.previous_hash = "f".repeat(64);
        assert!(matches!(
            ledger.append_external_block(wrong_link),
            Err(LedgerError::PreviousHashMismatch { .. })
        ));

        let mut wrong_proof = chain[2].clone();
        wrong_proof.proof = chain[1].proof;
        assert!(matches!(
            ledger.append_external_block(wrong_proof),
            Err(LedgerError::InvalidProof { .. })
        ));

        let mut wrong_hash = chain[2].clone();
        wrong_hash.votes[0].candidate.push('?');
        assert!(matches!(
            ledger.append_external_block(wrong_hash),
            Err(LedgerError::BlockHashMismatch { .. })
        ));

        let mut wrong_index = chain[2].clone();
        wrong_index.index = u64::MAX;
        assert!(matches!(
            ledger.append_external_block(wrong_index),
            Err(LedgerError::UnexpectedIndex {
                expected: 3,
                found: u64::MAX
            })
        ));

        ledger.append_external_block(chain[2].clone()).unwrap();
        assert_eq!(ledger.chain(), chain.as_slice());
        assert!(ledger.validate(None));
    }

    #[test]
    fn test_external_block_drops_matching_pending_votes() {
        let chain = mined_chain(1);
        let store = Arc::new(MemoryStore::with_chain(chain[..1].to_vec()));
        let mut ledger = Ledger::open(store).unwrap();
        let voter = chain[1].votes[0].voter_id.clone();
        ledger.admit_vote(&voter, "anything").unwrap();
        ledger.admit_vote("zoe", "blue").unwrap();

        ledger.append_external_block(chain[1].clone()).unwrap();
        assert_eq!(ledger.pending_votes(), &[Vote::new("zoe", "blue")]);
        assert!(ledger.has_voted(&voter));
    }

    #[test]
    fn test_reset_only_when_invalid() {
        let (mut ledger, _) = open_ledger();
        assert!(matches!(ledger.reset(), Err(LedgerError::ResetNotPermitted)));

        let mut chain = mined_chain(1);
        chain[1].hash = "0".repeat(64);
        let store = Arc::new(MemoryStore::with_chain(chain));
        let mut ledger = Ledger::open(store.clone()).unwrap();
        assert!(!ledger.is_valid());

        let reset = ledger.reset().unwrap().to_vec();
        assert_eq!(reset.len(), 1);
        assert!(ledger.is_valid());
        assert_eq!(store.saved().unwrap(), reset);
        assert_eq!(ledger.admit_vote("alice", "blue").unwrap(), 2);
    }

    #[test]
    fn test_validate_external_chain_argument() {
        let (ledger, _) = open_ledger();
        let mut chain = mined_chain(1);
        assert!(ledger.validate(Some(&chain)));
        chain[1].proof = 0;
        assert!(!ledger.validate(Some(&chain)));
        assert!(!ledger.validate(Some(&[])));
    }
}
