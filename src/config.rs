use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::models::BlockMode;

/// Runs a vote ledger node.
#[derive(Debug, Clone, Parser)]
#[command(name = "vote-ledger", version)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, env = "SERVER_PORT", default_value_t = 5555)]
    pub port: u16,

    /// Where the chain snapshot is kept.
    #[arg(long, env = "LEDGER_FILE", default_value = "chain.json")]
    pub data_file: PathBuf,

    /// Keep the chain in memory only.
    #[arg(long, default_value_t = false)]
    pub in_memory: bool,

    #[arg(long, value_enum, default_value_t = BlockMode::Batched)]
    pub mode: BlockMode,

    /// Peer to register at startup; repeat for several.
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    #[arg(long, default_value_t = 5)]
    pub peer_timeout_secs: u64,
}

impl Config {
    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}
