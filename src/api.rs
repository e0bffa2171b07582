//! HTTP routes. Handlers only translate between JSON and [`VotingNode`].

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use serde_json::json;

use crate::error::LedgerError;
use crate::models::{BlockEnvelope, ChainEnvelope, PeerRequest, VoteRequest};
use crate::node::{MineReport, VotingNode};

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::DuplicateVote { .. }
            | LedgerError::InvalidVote
            | LedgerError::InvalidAddress { .. }
            | LedgerError::PreviousHashMismatch { .. }
            | LedgerError::InvalidProof { .. }
            | LedgerError::BlockHashMismatch { .. }
            | LedgerError::UnexpectedIndex { .. } => StatusCode::BAD_REQUEST,
            LedgerError::NeedsReset | LedgerError::ResetNotPermitted => StatusCode::CONFLICT,
            LedgerError::Persistence(_) | LedgerError::MiningWorker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/vote", web::post().to(submit_vote))
        .route("/mine", web::get().to(mine))
        .route("/chain", web::get().to(get_chain))
        .route("/validate", web::get().to(validate_local))
        .route("/validate", web::post().to(validate_given))
        .route("/register_peer", web::post().to(register_peer))
        .route("/receive_chain", web::post().to(receive_chain))
        .route("/receive_block", web::post().to(receive_block))
        .route("/consensus", web::get().to(consensus))
        .route("/chain_status", web::get().to(chain_status))
        .route("/reset_chain", web::post().to(reset_chain));
}

async fn submit_vote(
    node: web::Data<VotingNode>,
    vote: web::Json<VoteRequest>,
) -> Result<HttpResponse, LedgerError> {
    let index = node.submit_vote(&vote.voter_id, &vote.candidate).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": format!("Vote registered in block {}!", index),
        "voter_id": vote.voter_id,
        "candidate": vote.candidate,
        "block_index": index,
    })))
}

async fn mine(node: web::Data<VotingNode>) -> Result<HttpResponse, LedgerError> {
    let body = match node.mine().await? {
        MineReport::Mined { block, broadcast } => json!({
            "message": "New block mined successfully!",
            "block": block,
            "broadcast": {
                "delivered": broadcast.delivered,
                "failed": broadcast.failed,
            },
        }),
        MineReport::NothingToMine => json!({ "message": "No votes to mine." }),
        MineReport::Superseded => json!({
            "message": "Chain was replaced while mining; votes were not committed."
        }),
    };
    Ok(HttpResponse::Ok().json(body))
}

async fn get_chain(node: web::Data<VotingNode>) -> impl Responder {
    HttpResponse::Ok().json(node.get_chain().await)
}

fn validation_response(is_valid: bool) -> HttpResponse {
    let message = if is_valid {
        "Blockchain is valid!"
    } else {
        "Blockchain is invalid!"
    };
    let mut response = if is_valid {
        HttpResponse::Ok()
    } else {
        HttpResponse::BadRequest()
    };
    response.json(json!({ "is_valid": is_valid, "message": message }))
}

async fn validate_local(node: web::Data<VotingNode>) -> impl Responder {
    validation_response(node.validate_chain(None).await)
}

async fn validate_given(
    node: web::Data<VotingNode>,
    body: web::Json<ChainEnvelope>,
) -> impl Responder {
    validation_response(node.validate_chain(Some(body.chain.as_slice())).await)
}

async fn register_peer(
    node: web::Data<VotingNode>,
    body: web::Json<PeerRequest>,
) -> Result<HttpResponse, LedgerError> {
    let added = node.register_peer(&body.peer).await?;
    let message = if added {
        format!("Peer {} registered successfully.", body.peer)
    } else {
        format!("Peer {} was already registered.", body.peer)
    };
    Ok(HttpResponse::Created().json(json!({ "message": message })))
}

async fn receive_chain(
    node: web::Data<VotingNode>,
    body: web::Json<ChainEnvelope>,
) -> Result<HttpResponse, LedgerError> {
    let ChainEnvelope { chain } = body.into_inner();
    if node.receive_external_chain(chain).await? {
        Ok(HttpResponse::Ok().json(json!({ "message": "Chain updated." })))
    } else {
        Ok(HttpResponse::BadRequest()
            .json(json!({ "message": "Received chain is invalid or not longer." })))
    }
}

async fn receive_block(
    node: web::Data<VotingNode>,
    body: web::Json<BlockEnvelope>,
) -> Result<HttpResponse, LedgerError> {
    node.receive_external_block(body.into_inner().block).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Block added to the chain." })))
}

async fn consensus(node: web::Data<VotingNode>) -> Result<HttpResponse, LedgerError> {
    let report = node.resolve_consensus().await?;
    let message = if report.replaced {
        "Chain was replaced with the longer chain."
    } else {
        "Our chain is authoritative."
    };
    Ok(HttpResponse::Ok().json(json!({
        "message": message,
        "replaced": report.replaced,
        "chain": report.chain,
    })))
}

async fn chain_status(node: web::Data<VotingNode>) -> impl Responder {
    let status = node.chain_status().await;
    let message = if status.is_valid {
        "Chain is valid."
    } else {
        "Chain is invalid."
    };
    HttpResponse::Ok().json(json!({
        "is_valid": status.is_valid,
        "length": status.length,
        "pending_votes": status.pending_votes,
        "message": message,
    }))
}

async fn reset_chain(node: web::Data<VotingNode>) -> Result<HttpResponse, LedgerError> {
    let chain = node.reset_ledger().await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Blockchain has been reset to the genesis block.",
        "chain": chain,
    })))
}
