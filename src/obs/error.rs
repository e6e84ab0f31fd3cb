//! Errors surfaced by the obs-websocket client.

use std::time::Duration;
use thiserror::Error;

use super::protocol::{status_code, RequestStatus};

#[derive(Debug, Clone, Error)]
pub enum ObsError {
    #[error("not connected to OBS")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("unsupported obs-websocket RPC version {offered} (client speaks {supported})")]
    UnsupportedRpcVersion { offered: u32, supported: u32 },

    /// The remote does not know this request type or kind. Usually an
    /// OBS/plugin version mismatch; retrying will not help.
    #[error("OBS does not support {request_type} (code {code}): {comment}")]
    InvalidRequestKind {
        request_type: String,
        code: u16,
        comment: String,
    },

    #[error("{request_type} got no response within {}ms", timeout.as_millis())]
    Timeout {
        request_type: String,
        timeout: Duration,
    },

    #[error("{request_type} could not be processed (code {code}): {comment}")]
    ProcessingFailed {
        request_type: String,
        code: u16,
        comment: String,
    },

    #[error("{request_type} failed (code {code}): {comment}")]
    Request {
        request_type: String,
        code: u16,
        comment: String,
    },

    #[error("malformed message: {0}")]
    Protocol(String),

    #[error("client is shutting down")]
    Shutdown,
}

impl ObsError {
    /// Map a failed `requestStatus` onto the error taxonomy.
    pub fn from_status(request_type: &str, status: &RequestStatus) -> Self {
        let request_type = request_type.to_string();
        let comment = status.comment.clone().unwrap_or_default();
        let code = status.code;
        match code {
            status_code::UNKNOWN_REQUEST_TYPE | status_code::INVALID_INPUT_KIND => {
                Self::InvalidRequestKind {
                    request_type,
                    code,
                    comment,
                }
            }
            status_code::REQUEST_PROCESSING_FAILED | status_code::NOT_READY => {
                Self::ProcessingFailed {
                    request_type,
                    code,
                    comment,
                }
            }
            _ => Self::Request {
                request_type,
                code,
                comment,
            },
        }
    }

    pub fn is_invalid_request_kind(&self) -> bool {
        matches!(self, Self::InvalidRequestKind { .. })
    }

    /// Remote accepted the request but did not complete it in time.
    pub fn is_processing_failure(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ProcessingFailed { .. })
    }

    /// Errors that leave the connection up and the daemon running.
    pub fn is_non_fatal(&self) -> bool {
        self.is_invalid_request_kind() || self.is_processing_failure()
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Transport(_) | Self::Shutdown)
    }

    /// The `requestStatus.code`, when the remote produced one.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::InvalidRequestKind { code, .. }
            | Self::ProcessingFailed { code, .. }
            | Self::Request { code, .. } => Some(*code),
            _ => None,
        }
    }
}
