//! obs-websocket v5 wire format.
//!
//! Every frame is a JSON text message `{"op": <opcode>, "d": {...}}`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::error::ObsError;

/// RPC version this client speaks.
pub const RPC_VERSION: u32 = 1;

pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

/// `requestStatus.code` values the daemon cares about.
pub mod status_code {
    pub const SUCCESS: u16 = 100;
    pub const MISSING_REQUEST_TYPE: u16 = 203;
    pub const UNKNOWN_REQUEST_TYPE: u16 = 204;
    pub const NOT_READY: u16 = 207;
    pub const OUTPUT_RUNNING: u16 = 500;
    pub const OUTPUT_NOT_RUNNING: u16 = 501;
    pub const RESOURCE_NOT_FOUND: u16 = 600;
    pub const RESOURCE_ALREADY_EXISTS: u16 = 601;
    pub const INVALID_INPUT_KIND: u16 = 605;
    pub const REQUEST_PROCESSING_FAILED: u16 = 702;
}

/// Event subscription bit flags sent in Identify.
pub mod subscription {
    pub const GENERAL: u32 = 1 << 0;
    pub const SCENES: u32 = 1 << 2;
    pub const INPUTS: u32 = 1 << 3;
    pub const OUTPUTS: u32 = 1 << 6;
    pub const SCENE_ITEMS: u32 = 1 << 7;

    pub const DAEMON_DEFAULT: u32 = GENERAL | SCENES | INPUTS | OUTPUTS | SCENE_ITEMS;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub obs_web_socket_version: String,
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_subscriptions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(Hello),
    Identify(Identify),
    Identified(Identified),
    Event(Event),
    Request(Request),
    RequestResponse(RequestResponse),
    /// An opcode this client does not handle.
    Unknown { op: u8 },
}

#[derive(Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

impl Message {
    pub fn op(&self) -> u8 {
        match self {
            Self::Hello(_) => op::HELLO,
            Self::Identify(_) => op::IDENTIFY,
            Self::Identified(_) => op::IDENTIFIED,
            Self::Event(_) => op::EVENT,
            Self::Request(_) => op::REQUEST,
            Self::RequestResponse(_) => op::REQUEST_RESPONSE,
            Self::Unknown { op } => *op,
        }
    }

    pub fn encode(&self) -> Result<String, ObsError> {
        let d = match self {
            Self::Hello(m) => serde_json::to_value(m),
            Self::Identify(m) => serde_json::to_value(m),
            Self::Identified(m) => serde_json::to_value(m),
            Self::Event(m) => serde_json::to_value(m),
            Self::Request(m) => serde_json::to_value(m),
            Self::RequestResponse(m) => serde_json::to_value(m),
            Self::Unknown { op } => {
                return Err(ObsError::Protocol(format!("cannot encode unknown op {}", op)))
            }
        }
        .map_err(|e| ObsError::Protocol(e.to_string()))?;

        Ok(json!({ "op": self.op(), "d": d }).to_string())
    }

    pub fn decode(text: &str) -> Result<Self, ObsError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ObsError::Protocol(format!("invalid frame: {}", e)))?;

        let d = envelope.d;
        let message = match envelope.op {
            op::HELLO => Self::Hello(from_data(envelope.op, d)?),
            op::IDENTIFY => Self::Identify(from_data(envelope.op, d)?),
            op::IDENTIFIED => Self::Identified(from_data(envelope.op, d)?),
            op::EVENT => Self::Event(from_data(envelope.op, d)?),
            op::REQUEST => Self::Request(from_data(envelope.op, d)?),
            op::REQUEST_RESPONSE => Self::RequestResponse(from_data(envelope.op, d)?),
            other => Self::Unknown { op: other },
        };
        Ok(message)
    }
}

fn from_data<T: serde::de::DeserializeOwned>(op: u8, d: Value) -> Result<T, ObsError> {
    serde_json::from_value(d).map_err(|e| ObsError::Protocol(format!("op {}: {}", op, e)))
}

/// Authentication string for Identify:
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`.
pub fn auth_response(password: &str, challenge: &AuthChallenge) -> String {
    let secret = STANDARD.encode(Sha256::digest(
        format!("{}{}", password, challenge.salt).as_bytes(),
    ));
    STANDARD.encode(Sha256::digest(
        format!("{}{}", secret, challenge.challenge).as_bytes(),
    ))
}
