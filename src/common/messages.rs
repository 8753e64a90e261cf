//! Wire-level request and response types consumed by the lookup engine.
//!
//! Encoding and decoding are owned by the surrounding stack; the engine only
//! builds requests and pattern matches on decoded responses.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::common::{Id, PeerInfo};

/// A GET_VALUE request for a target content id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetValueRequest {
    pub target: Id,
}

/// A response to a [GetValueRequest].
///
/// Carries a record, a list of peers closer to the target, or both.
/// Provenance of the record is implicit in the session it arrived on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetValueResponse {
    pub target: Id,
    pub record: Option<Bytes>,
    pub closer_peers: Vec<PeerInfo>,
}

/// A decoded protocol message, as delivered by the session layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    GetValueRequest(GetValueRequest),
    GetValueResponse(GetValueResponse),
}
