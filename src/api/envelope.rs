//! Response envelope and gateway error taxonomy

use serde_json::{Map, Value};

use super::transport::{TransportError, TransportResponse};

/// Used when the transport reports a failure without a usable message.
pub const SERVER_UNAVAILABLE: &str = "Server is unavailable, please try again later.";
const DEFAULT_ERROR_STATUS: u16 = 500;
const MISSING_STATUS: &str = "response carried no application status";

/// Every backend response unwraps into this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiEnvelope {
    pub body: Value,
    pub status: i64,
    pub message: String,
}

/// A business-level failure delivered over a successful transport call.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEnvelope {
    pub envelope: ApiEnvelope,
    pub error: Value,
}

/// Failure channel shared by every request issued through the gateway.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The backend answered, but its embedded status is not the success code.
    #[error("request rejected (status {}): {}", .0.envelope.status, .0.envelope.message)]
    Rejected(Box<RejectedEnvelope>),

    /// 401 that the gateway will not recover: a failed login or a replay that expired again.
    #[error("unauthorized: {0}")]
    Unauthorized(TransportError),

    /// The refresh endpoint failed; the session has been logged out.
    #[error("session refresh failed: {0}")]
    Refresh(String),

    /// No refresh token was available; the session has been logged out.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// Any other transport failure, normalized.
    #[error("HTTP {status}: {message}")]
    Transport {
        status: u16,
        message: String,
        body: Value,
    },
}

impl ApiError {
    /// Status code a caller would show next to the message.
    pub fn status(&self) -> u16 {
        match self {
            Self::Rejected(r) => u16::try_from(r.envelope.status).unwrap_or(DEFAULT_ERROR_STATUS),
            Self::Unauthorized(_) | Self::Refresh(_) | Self::SessionExpired => 401,
            Self::Transport { status, .. } => *status,
        }
    }
}

/// Unwrap a transport success against the configured success code.
///
/// Only an embedded application status equal to `success_code` unwraps. A
/// reply without one (empty, non-JSON, or missing the field) is rejected and
/// carries the HTTP status instead.
pub fn interpret(resp: TransportResponse, success_code: u16) -> Result<ApiEnvelope, ApiError> {
    let data = resp.data;
    let embedded = data.get("status").and_then(Value::as_i64);
    let envelope = ApiEnvelope {
        body: data.get("body").cloned().unwrap_or(Value::Null),
        status: embedded.unwrap_or_else(|| i64::from(resp.status)),
        message: data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };

    if embedded == Some(i64::from(success_code)) {
        return Ok(envelope);
    }

    let error = match data.get("error").filter(|e| !e.is_null()) {
        Some(e) => e.clone(),
        None if embedded.is_none() => Value::String(MISSING_STATUS.to_string()),
        None => Value::String(envelope.message.clone()),
    };
    Err(ApiError::Rejected(Box::new(RejectedEnvelope { envelope, error })))
}

/// Normalize a non-401 transport failure into `{status, message, body: {}}`.
pub fn normalize(err: TransportError) -> ApiError {
    let message = err
        .data
        .as_ref()
        .and_then(|d| d.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .unwrap_or_else(|| SERVER_UNAVAILABLE.to_string());

    ApiError::Transport {
        status: err.status.unwrap_or(DEFAULT_ERROR_STATUS),
        message,
        body: Value::Object(Map::new()),
    }
}
