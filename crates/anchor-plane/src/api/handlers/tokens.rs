//! Privileged access token handlers

use anchor_core::{AccessToken, TokenState};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::api::error::ApiError;
use crate::issuer::RevokeOutcome;

/// Request to issue a token
#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    pub subject_id: String,
    pub scope_id: String,
}

/// Issued token, returned exactly once
#[derive(Debug, Serialize)]
pub struct IssueTokenResponse {
    pub token: AccessToken,
    pub issued_at: i64,
    pub expires_at: i64,
    /// Ledger entry holding the token fingerprint
    pub anchor_id: String,
    pub sequence_number: u64,
    pub credential_ref: String,
}

/// Request naming an existing token
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenStatusResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TokenState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Issue a privileged access token
///
/// POST /v1/tokens
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IssueTokenRequest>,
) -> Result<(StatusCode, Json<IssueTokenResponse>), ApiError> {
    let issued = state
        .issuer
        .issue(&request.subject_id, &request.scope_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IssueTokenResponse {
            token: issued.token,
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
            anchor_id: issued.anchor_id,
            sequence_number: issued.sequence_number,
            credential_ref: issued.credential_ref,
        }),
    ))
}

/// Revoke a token
///
/// POST /v1/tokens/revoke
pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<RevokeOutcome>, ApiError> {
    let token = parse_token(&request.token)?;
    let outcome = state.issuer.revoke(&token).await?;
    Ok(Json(outcome))
}

/// Report whether a token is usable
///
/// POST /v1/tokens/status
pub async fn token_status(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenStatusResponse>, ApiError> {
    let token = parse_token(&request.token)?;

    let response = match state.issuer.status(&token) {
        Some(status) => TokenStatusResponse {
            active: status.active,
            state: Some(status.state),
            subject_id: Some(status.issued_to),
            scope_id: Some(status.scope_id),
            expires_at: Some(status.expires_at),
        },
        None => TokenStatusResponse {
            active: false,
            state: None,
            subject_id: None,
            scope_id: None,
            expires_at: None,
        },
    };
    Ok(Json(response))
}

fn parse_token(raw: &str) -> Result<AccessToken, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::BadRequest("token must not be empty".into()));
    }
    Ok(AccessToken::from_string(raw))
}
