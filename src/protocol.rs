//! Wire types for the realtime session and the stats endpoint.
//!
//! Inbound WebSocket frames are JSON objects discriminated by a `type` field:
//!
//! | `type`     | meaning                                              |
//! |------------|------------------------------------------------------|
//! | `system`   | non-attributable notice (welcome, "X left the chat") |
//! | `message`  | broadcast chat line with moderation flags            |
//! | `analysis` | analysis + coaching for the sender's own last message |
//!
//! Anything else decodes to [`InboundFrame::Unknown`] and is dropped by the
//! session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModchatError;

// ---------------------------------------------------------------------------
// Analysis payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToxicityAnalysis {
    /// Backend score in `[0, 1]`.
    pub score: f64,
    pub is_toxic: bool,
    /// category name → score
    #[serde(default)]
    pub categories: BTreeMap<String, f64>,
    #[serde(default)]
    pub top_categories: Vec<String>,
}

/// A categorical label with confidence, used for both intent and tone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub toxicity: ToxicityAnalysis,
    pub intent: Classification,
    pub tone: Classification,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoachingResult {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub suggested_rewrite: Option<String>,
}

impl CoachingResult {
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.suggested_rewrite.is_none()
    }
}

// ---------------------------------------------------------------------------
// Inbound frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNotice {
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBroadcast {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub username: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_toxic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toxicity_score: Option<f64>,
}

/// Analysis of the sender's own most recent message. The backend flattens the
/// processed message record into the frame, so the echo fields are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFrame {
    pub analysis: AnalysisResult,
    #[serde(default)]
    pub coaching: Option<CoachingResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    System(SystemNotice),
    Message(ChatBroadcast),
    Analysis(Box<AnalysisFrame>),
    /// A frame whose `type` is missing or not recognised.
    Unknown { kind: String },
}

impl InboundFrame {
    /// The wire `type` value this frame was decoded from.
    pub fn kind(&self) -> &str {
        match self {
            InboundFrame::System(_) => "system",
            InboundFrame::Message(_) => "message",
            InboundFrame::Analysis(_) => "analysis",
            InboundFrame::Unknown { kind } => kind,
        }
    }
}

/// Decode one inbound text frame.
///
/// # Returns
/// - `Ok(InboundFrame::Unknown)` for well-formed JSON with an unrecognised
///   or missing `type`.
/// - `Err(ModchatError::Json)` when the text is not JSON, or a known `type`
///   lacks required fields.
pub fn decode_frame(text: &str) -> Result<InboundFrame, ModchatError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ModchatError::json("inbound frame", e))?;
    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    match kind.as_str() {
        "system" => serde_json::from_value(value)
            .map(InboundFrame::System)
            .map_err(|e| ModchatError::json("system frame", e)),
        "message" => serde_json::from_value(value)
            .map(InboundFrame::Message)
            .map_err(|e| ModchatError::json("message frame", e)),
        "analysis" => serde_json::from_value::<AnalysisFrame>(value)
            .map(|f| InboundFrame::Analysis(Box::new(f)))
            .map_err(|e| ModchatError::json("analysis frame", e)),
        _ => Ok(InboundFrame::Unknown { kind }),
    }
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// The only frame the client sends: `{"message": text}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub message: String,
}

impl OutboundFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            message: text.into(),
        }
    }

    pub fn encode(&self) -> Result<String, ModchatError> {
        serde_json::to_string(self).map_err(|e| ModchatError::json("outbound frame", e))
    }
}

// ---------------------------------------------------------------------------
// Stats endpoint
// ---------------------------------------------------------------------------

/// Body of `GET /api/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_messages: u64,
    pub toxic_messages: u64,
    pub clean_messages: u64,
    /// Percentage in `[0, 100]`.
    pub toxicity_rate: f64,
    /// intent label → count
    #[serde(default)]
    pub intents: BTreeMap<String, u64>,
    /// tone label → count
    #[serde(default)]
    pub tones: BTreeMap<String, u64>,
    pub active_connections: u64,
}
