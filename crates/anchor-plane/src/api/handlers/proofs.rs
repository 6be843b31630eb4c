//! Proof anchoring and verification handlers

use anchor_core::{Metadata, PayloadHash, VerificationStatus};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::{entry_type_or_proof, AppState};
use crate::api::error::ApiError;

/// Request to anchor a content hash
#[derive(Debug, Deserialize)]
pub struct AnchorProofRequest {
    /// 64 hex characters, any case
    pub payload_hash: String,

    /// Entry type tag, `PROOF` when omitted
    #[serde(default)]
    pub entry_type: Option<String>,

    /// Opaque caller context stored with the entry
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
pub struct AnchorProofResponse {
    pub anchor_id: String,
    pub sequence_number: u64,
    pub created_at: i64,
    pub entry_type: String,
    pub payload_hash: PayloadHash,
    pub previous_signature: String,
    pub signature: String,
}

/// Request to compare a hash against the ledger
#[derive(Debug, Deserialize)]
pub struct VerifyProofRequest {
    pub payload_hash: String,
    #[serde(default)]
    pub entry_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyProofResponse {
    pub matched: bool,
    pub status: VerificationStatus,
    pub anchored_hash: PayloadHash,
    pub anchored_at: i64,
    pub anchor_id: String,
    pub sequence_number: u64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchored_at: Option<i64>,
}

/// Anchor a content hash
///
/// POST /v1/proofs/anchor
pub async fn anchor_proof(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnchorProofRequest>,
) -> Result<(StatusCode, Json<AnchorProofResponse>), ApiError> {
    let entry_type = entry_type_or_proof(request.entry_type.as_deref())?;
    let entry = state
        .ledger
        .append(&request.payload_hash, entry_type, request.metadata)
        .await?;

    info!(
        anchor_id = %entry.anchor_id,
        sequence = entry.sequence_number,
        "Anchored proof"
    );

    Ok((
        StatusCode::CREATED,
        Json(AnchorProofResponse {
            anchor_id: entry.anchor_id,
            sequence_number: entry.sequence_number,
            created_at: entry.created_at,
            entry_type: entry.entry_type.to_string(),
            payload_hash: entry.payload_hash,
            previous_signature: entry.previous_signature,
            signature: entry.signature,
        }),
    ))
}

/// Compare a hash with the latest anchor of its type
///
/// POST /v1/proofs/verify
///
/// A mismatch is a 200 with status `COMPROMISED`; 404 means nothing of
/// that type has been anchored yet.
pub async fn verify_proof(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyProofRequest>,
) -> Result<Json<VerifyProofResponse>, ApiError> {
    let entry_type = entry_type_or_proof(request.entry_type.as_deref())?;
    let outcome = state
        .verifier
        .verify(&request.payload_hash, &entry_type)
        .await?;

    Ok(Json(VerifyProofResponse {
        matched: outcome.matched,
        status: outcome.status,
        anchored_hash: outcome.anchored_hash,
        anchored_at: outcome.anchored_at,
        anchor_id: outcome.anchor_id,
        sequence_number: outcome.sequence_number,
    }))
}

/// Check whether a hash was ever anchored
///
/// POST /v1/proofs/history
pub async fn verify_history(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyProofRequest>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let entry_type = entry_type_or_proof(request.entry_type.as_deref())?;
    let found = state
        .verifier
        .verify_against_history(&request.payload_hash, &entry_type)
        .await?;

    Ok(Json(match found {
        Some(entry) => HistoryResponse {
            found: true,
            anchor_id: Some(entry.anchor_id),
            sequence_number: Some(entry.sequence_number),
            anchored_at: Some(entry.created_at),
        },
        None => HistoryResponse {
            found: false,
            anchor_id: None,
            sequence_number: None,
            anchored_at: None,
        },
    }))
}
