use serde::{Deserialize, Serialize};

/// Sentinel `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_INDEX: u64 = 1;
pub const GENESIS_PROOF: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: String,
    pub candidate: String,
}

impl Vote {
    pub fn new(voter_id: impl Into<String>, candidate: impl Into<String>) -> Self {
        Self {
            voter_id: voter_id.into(),
            candidate: candidate.into(),
        }
    }
}

/// A committed block. `hash` is the digest of every other field, see
/// [`crate::hashing::hash_block`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: String,
    pub votes: Vec<Vote>,
    pub proof: u64,
    pub previous_hash: String,
    pub hash: String,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.index == GENESIS_INDEX && self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}

/// How many pending votes go into a mined block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BlockMode {
    /// Every pending vote is committed in one block.
    #[default]
    Batched,
    /// One block per vote, oldest first.
    PerVote,
}

/// Result of a mining request. Neither variant is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    Mined(Block),
    NothingToMine,
    /// The chain was replaced while the proof was being searched; the frozen
    /// batch was not committed.
    Superseded,
}

/// Body served by `GET /chain` and fetched from peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: usize,
    #[serde(default)]
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub chain: Vec<Block>,
    pub length: usize,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    #[serde(default)]
    pub voter_id: String,
    #[serde(default)]
    pub candidate: String,
}

#[derive(Debug, Deserialize)]
pub struct PeerRequest {
    #[serde(default)]
    pub peer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainEnvelope {
    pub chain: Vec<Block>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockEnvelope {
    pub block: Block,
}
