//! API error types and responses

use anchor_core::{AnchorError, ErrorClass};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Anchor(#[from] AnchorError),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn error_code(err: &AnchorError) -> &'static str {
    match err {
        AnchorError::MalformedPayloadHash(_) => "MALFORMED_PAYLOAD_HASH",
        AnchorError::MissingField(_) => "MISSING_FIELD",
        AnchorError::InvalidEntryType(_) => "INVALID_ENTRY_TYPE",
        AnchorError::DuplicateAnchor(_) => "DUPLICATE_ANCHOR",
        AnchorError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
        AnchorError::ProvisioningFailed(_) => "PROVISIONING_FAILED",
        AnchorError::NoAnchorFound(_) => "NO_ANCHOR_FOUND",
        AnchorError::TokenNotFound => "TOKEN_NOT_FOUND",
        AnchorError::MfaRequired(_) => "MFA_REQUIRED",
        AnchorError::IssuanceRateExceeded { .. } => "ISSUANCE_RATE_EXCEEDED",
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Anchor(err) => match err.class() {
                ErrorClass::Validation => StatusCode::BAD_REQUEST,
                ErrorClass::Conflict => StatusCode::CONFLICT,
                ErrorClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorClass::NotFound => StatusCode::NOT_FOUND,
                ErrorClass::Authorization => match err {
                    AnchorError::IssuanceRateExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                    _ => StatusCode::FORBIDDEN,
                },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, details) = match &self {
            ApiError::BadRequest(_) => ("BAD_REQUEST", None),
            ApiError::Anchor(err) => {
                let details = match err {
                    AnchorError::NoAnchorFound(entry_type) => Some(serde_json::json!({
                        "entry_type": entry_type.as_str(),
                    })),
                    AnchorError::MfaRequired(subject) => Some(serde_json::json!({
                        "subject_id": subject,
                        "remediation": "enroll a second factor with the identity provider",
                    })),
                    AnchorError::IssuanceRateExceeded {
                        subject,
                        limit,
                        window_secs,
                    } => Some(serde_json::json!({
                        "subject_id": subject,
                        "limit": limit,
                        "window_secs": window_secs,
                    })),
                    other if other.is_retryable() => Some(serde_json::json!({
                        "retryable": true,
                    })),
                    _ => None,
                };
                (error_code(err), details)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
