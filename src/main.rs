use std::io;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::{info, warn};

use vote_ledger::api;
use vote_ledger::config::Config;
use vote_ledger::peers::HttpTransport;
use vote_ledger::store::{ChainStore, JsonFileStore, MemoryStore};
use vote_ledger::VotingNode;

fn to_io<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();

    let store: Arc<dyn ChainStore> = if config.in_memory {
        info!("Keeping the ledger in memory only");
        Arc::new(MemoryStore::new())
    } else {
        let store = JsonFileStore::new(&config.data_file);
        info!("Using ledger file {}", store.path().display());
        Arc::new(store)
    };
    let transport = Arc::new(HttpTransport::new(config.peer_timeout()).map_err(to_io)?);
    let node = VotingNode::open(store, transport, config.mode).map_err(to_io)?;

    for peer in &config.peers {
        if let Err(err) = node.register_peer(peer).await {
            warn!("Skipping startup peer: {}", err);
        }
    }

    let status = node.chain_status().await;
    if !status.is_valid {
        warn!("Ledger failed validation; writes are refused until POST /reset_chain");
    }
    info!(
        "Ledger ready with {} blocks, listening on {}:{}",
        status.length, config.host, config.port
    );

    let node = web::Data::new(node);
    HttpServer::new(move || App::new().app_data(node.clone()).configure(api::configure))
        .bind(config.bind_addr())?
        .run()
        .await
}
