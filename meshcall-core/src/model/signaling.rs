use crate::utils::default_stun_urls;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(urls: Vec<String>) -> Self {
        Self {
            urls,
            username: None,
            credential: None,
        }
    }

    /// Free public STUN servers, used when nothing better is known.
    pub fn default_stun() -> Vec<Self> {
        vec![Self::stun(default_stun_urls())]
    }
}

/// A trickled ICE candidate, in the shape browsers produce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// Session description handed to a peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionDescription {
    Offer(String),
    Answer(String),
}

impl SessionDescription {
    pub fn sdp(&self) -> &str {
        match self {
            SessionDescription::Offer(sdp) | SessionDescription::Answer(sdp) => sdp,
        }
    }
}

/// Opaque connection-setup payload exchanged between two peers through the
/// relay. The relay never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d")]
pub enum SignalMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate(IceCandidate),
    /// Asks the initiating side of the pair for a fresh offer.
    Renegotiate,
}

impl SignalMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate(_) => "ice",
            SignalMessage::Renegotiate => "renegotiate",
        }
    }
}
