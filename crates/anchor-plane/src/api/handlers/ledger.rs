//! Ledger inspection handlers

use anchor_core::LedgerEntry;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::api::error::ApiError;

/// Largest page served by `/v1/ledger/entries`
pub const MAX_PAGE_SIZE: usize = 1000;

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Serialize)]
pub struct HeightResponse {
    pub height: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListEntriesQuery {
    #[serde(default)]
    pub from: Option<u64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListEntriesResponse {
    pub entries: Vec<LedgerEntry>,
    /// Sequence number to request next, absent at the end of the chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_from: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct IntegrityResponse {
    pub valid: bool,
    pub first_broken_sequence: Option<u64>,
    pub entries_checked: u64,
}

/// Current chain height
///
/// GET /v1/ledger/height
pub async fn ledger_height(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HeightResponse>, ApiError> {
    let height = state.ledger.height().await?;
    Ok(Json(HeightResponse { height }))
}

/// Page through entries in sequence order
///
/// GET /v1/ledger/entries?from=1&limit=100
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<ListEntriesResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let entries = state
        .ledger
        .entries(query.from.unwrap_or(1), limit)
        .await?;
    let next_from = if entries.len() == limit {
        entries.last().map(|e| e.sequence_number + 1)
    } else {
        None
    };

    Ok(Json(ListEntriesResponse { entries, next_from }))
}

/// Re-derive every signature and check linkage
///
/// GET /v1/ledger/integrity
pub async fn chain_integrity(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IntegrityResponse>, ApiError> {
    let report = state.ledger.verify_chain_integrity().await?;
    Ok(Json(IntegrityResponse {
        valid: report.valid,
        first_broken_sequence: report.first_broken_sequence,
        entries_checked: report.entries_checked,
    }))
}
