//! Wire protocol for the capture-agent message boundary.
//!
//! The boundary itself is an untyped broadcast channel carrying JSON text
//! frames; this module is the typed edge of it. Snapshot requests carry a
//! correlation id so late or duplicate responses can be discarded, and the
//! ambient change notifications carry no payload guarantee at all.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::link::LinkStatus;
use crate::normalize::RawLinkPayload;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;
pub const CURRENT_PROTOCOL_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeEnvelope {
    #[serde(default = "default_version")]
    pub version: u16,
    pub sender_id: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub msg: BridgeMsg,
}

fn default_version() -> u16 {
    CURRENT_PROTOCOL_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum BridgeMsg {
    /// Request a full snapshot of all links the agent holds.
    GetSnapshot,
    /// Full-replacement snapshot; raw payloads, normalized on receipt.
    SnapshotResponse(SnapshotResponsePayload),
    /// Ambient notification: the agent mutated its data independently.
    DataChanged,
    /// Ambient notification: the agent captured or merged new links.
    LinksUpserted,
    /// Ask the agent to mirror a local status change. Fire-and-forget.
    UpdateLinksStatus(UpdateLinksStatusPayload),
    /// Ask the agent to forget removed links. Fire-and-forget.
    DeleteLinks(DeleteLinksPayload),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotResponsePayload {
    #[serde(default)]
    pub links: Vec<RawLinkPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateLinksStatusPayload {
    pub links: Vec<LinkStatusUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkStatusUpdate {
    pub id: String,
    pub status: LinkStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteLinksPayload {
    pub link_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

pub fn encode_frame(envelope: &BridgeEnvelope, max_frame_bytes: usize) -> Result<String, FrameError> {
    let encoded =
        serde_json::to_string(envelope).map_err(|err| FrameError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    Ok(encoded)
}

pub fn decode_frame(frame: &str, max_frame_bytes: usize) -> Result<BridgeEnvelope, FrameError> {
    let raw = frame.trim();
    if raw.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    serde_json::from_str(raw).map_err(|err| FrameError::Decode(err.to_string()))
}
