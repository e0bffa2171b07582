use thiserror::Error;

/// Why a chain failed validation. `index` is the offending block's index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainValidationError {
    #[error("chain is empty")]
    Empty,
    #[error("genesis block must have previous hash \"0\"")]
    InvalidGenesis,
    #[error("block {index}: stored hash does not match contents")]
    HashMismatch { index: u64 },
    #[error("block {index}: previous hash does not match preceding block")]
    PreviousHashMismatch { index: u64 },
    #[error("block {index}: proof of work does not hold")]
    InvalidProof { index: u64 },
    #[error("block {index}: expected index {expected}")]
    IndexGap { index: u64, expected: u64 },
    #[error("block {index}: voter {voter_id} already voted")]
    DuplicateVoter { index: u64, voter_id: String },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("ledger store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("voter {voter_id} has already cast a vote")]
    DuplicateVote { voter_id: String },
    #[error("missing voter_id or candidate")]
    InvalidVote,
    #[error("invalid peer address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("previous hash does not match: expected {expected}, got {found}")]
    PreviousHashMismatch { expected: String, found: String },
    #[error("invalid proof of work: {proof} after {previous_proof}")]
    InvalidProof { previous_proof: u64, proof: u64 },
    #[error("block {index}: stored hash does not match contents")]
    BlockHashMismatch { index: u64 },
    #[error("unexpected block index {found}, expected {expected}")]
    UnexpectedIndex { expected: u64, found: u64 },
    #[error("ledger failed validation; reset it before writing")]
    NeedsReset,
    #[error("chain is valid, reset not permitted")]
    ResetNotPermitted,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("mining worker failed: {0}")]
    MiningWorker(#[from] tokio::task::JoinError),
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("peer answered with status {0}")]
    Status(u16),
}
