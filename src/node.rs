use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};

use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::models::{Block, BlockMode, ChainResponse, MineOutcome};
use crate::peers::{self, BroadcastReport, PeerSet, PeerTransport};
use crate::pow::find_proof;
use crate::store::ChainStore;

/// What `mine` hands back to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineReport {
    Mined {
        block: Block,
        broadcast: BroadcastReport,
    },
    NothingToMine,
    Superseded,
}

#[derive(Debug, Clone)]
pub struct ConsensusReport {
    pub replaced: bool,
    pub chain: Vec<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStatus {
    pub is_valid: bool,
    pub length: usize,
    pub pending_votes: usize,
}

/// The node's ledger, peers and transport.
///
/// Built once at startup and shared with the adapter. Every ledger mutation
/// goes through the write lock; reads share the read lock and always see a
/// whole chain.
pub struct VotingNode {
    ledger: RwLock<Ledger>,
    mining: Mutex<()>,
    peers: RwLock<PeerSet>,
    transport: Arc<dyn PeerTransport>,
    mode: BlockMode,
}

impl VotingNode {
    pub fn open(
        store: Arc<dyn ChainStore>,
        transport: Arc<dyn PeerTransport>,
        mode: BlockMode,
    ) -> Result<Self> {
        let ledger = Ledger::open(store)?;
        Ok(Self {
            ledger: RwLock::new(ledger),
            mining: Mutex::new(()),
            peers: RwLock::new(PeerSet::new()),
            transport,
            mode,
        })
    }

    pub async fn submit_vote(&self, voter_id: &str, candidate: &str) -> Result<u64> {
        let index = self.ledger.write().await.admit_vote(voter_id, candidate)?;
        info!("Vote from {} queued for block {}", voter_id, index);
        Ok(index)
    }

    /// Mines the pending votes and broadcasts the new block.
    ///
    /// The proof search runs on the blocking pool without the ledger lock,
    /// so votes keep arriving meanwhile; they go into the next block.
    pub async fn mine(&self) -> Result<MineReport> {
        let _mining = self.mining.lock().await;

        let job = self.ledger.read().await.prepare_mining(self.mode)?;
        let Some(job) = job else {
            return Ok(MineReport::NothingToMine);
        };
        let previous_proof = job.previous_proof();
        debug!("Searching proof after {} for {} votes", previous_proof, job.votes().len());
        let proof = tokio::task::spawn_blocking(move || find_proof(previous_proof)).await?;

        let outcome = self.ledger.write().await.commit_mining(job, proof)?;
        match outcome {
            MineOutcome::Mined(block) => {
                let broadcast = self.broadcast(&block).await;
                Ok(MineReport::Mined { block, broadcast })
            }
            MineOutcome::NothingToMine => Ok(MineReport::NothingToMine),
            MineOutcome::Superseded => Ok(MineReport::Superseded),
        }
    }

    async fn broadcast(&self, block: &Block) -> BroadcastReport {
        let peers = self.peers.read().await.to_vec();
        if peers.is_empty() {
            return BroadcastReport::default();
        }
        peers::broadcast_block(self.transport.as_ref(), &peers, block).await
    }

    pub async fn get_chain(&self) -> ChainResponse {
        let snapshot = self.ledger.read().await.snapshot();
        ChainResponse {
            chain: snapshot.chain,
            length: snapshot.length,
            peers: self.peers.read().await.to_vec(),
        }
    }

    pub async fn validate_chain(&self, chain: Option<&[Block]>) -> bool {
        self.ledger.read().await.validate(chain)
    }

    pub async fn chain_status(&self) -> ChainStatus {
        let ledger = self.ledger.read().await;
        ChainStatus {
            is_valid: ledger.is_valid(),
            length: ledger.len(),
            pending_votes: ledger.pending_votes().len(),
        }
    }

    pub async fn register_peer(&self, address: &str) -> Result<bool> {
        let added = self.peers.write().await.register(address)?;
        if added {
            info!("Registered peer {}", address);
        }
        Ok(added)
    }

    /// A full chain pushed by a peer. `Ok(false)` is a normal rejection.
    pub async fn receive_external_chain(&self, chain: Vec<Block>) -> Result<bool> {
        self.ledger.write().await.replace_chain(chain)
    }

    pub async fn receive_external_block(&self, block: Block) -> Result<()> {
        self.ledger.write().await.append_external_block(block)
    }

    /// Asks every peer for its chain and adopts the longest valid one that
    /// beats the local chain.
    pub async fn resolve_consensus(&self) -> Result<ConsensusReport> {
        let peers = self.peers.read().await.to_vec();
        let responses = peers::fetch_all(self.transport.as_ref(), &peers).await;

        let mut ledger = self.ledger.write().await;
        let replaced = match crate::consensus::resolve_conflicts(ledger.chain(), responses) {
            Some(chain) => ledger.replace_chain(chain)?,
            None => false,
        };
        if replaced {
            info!("Chain was replaced with a longer peer chain");
        }
        Ok(ConsensusReport {
            replaced,
            chain: ledger.chain().to_vec(),
        })
    }

    pub async fn reset_ledger(&self) -> Result<Vec<Block>> {
        let mut ledger = self.ledger.write().await;
        match ledger.reset() {
            Ok(chain) => Ok(chain.to_vec()),
            Err(LedgerError::ResetNotPermitted) => {
                warn!("Reset requested on a valid chain");
                Err(LedgerError::ResetNotPermitted)
            }
            Err(err) => Err(err),
        }
    }
}
