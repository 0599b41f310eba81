//! Session view state: connection state machine, append-only chat log and
//! the latest self-analysis.
//!
//! Everything here is synchronous and network-free. The realtime client in
//! [`crate::client`] owns a `SessionView` behind a mutex and feeds decoded
//! frames into [`SessionView::apply`] one at a time, in arrival order.

use serde::Serialize;

use crate::protocol::{AnalysisResult, CoachingResult, InboundFrame};

/// Username shown on non-attributable system notices.
pub const SYSTEM_USERNAME: &str = "System";

/// Connection lifecycle of the realtime session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting before reconnect attempt `attempt` (1-based).
    Reconnecting { attempt: u32 },
    /// The connection failed and will not be retried automatically.
    Errored(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            ConnectionState::Errored(reason) => write!(f, "error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    System,
    Chat,
}

/// One line of the chat log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub kind: EntryKind,
    pub id: Option<i64>,
    pub username: String,
    pub text: String,
    pub timestamp: String,
    pub is_toxic: Option<bool>,
    pub toxicity_score: Option<f64>,
}

impl LogEntry {
    pub fn system(text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::System,
            id: None,
            username: SYSTEM_USERNAME.to_string(),
            text: text.into(),
            timestamp: timestamp.into(),
            is_toxic: None,
            toxicity_score: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == EntryKind::System
    }

    /// Flagged by the backend as toxic.
    pub fn is_flagged(&self) -> bool {
        self.is_toxic.unwrap_or(false)
    }
}

/// Latest analysis of the user's own message, with its coaching.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfAnalysis {
    pub analysis: AnalysisResult,
    pub coaching: CoachingResult,
}

/// What applying one frame did to the view.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Appended(LogEntry),
    AnalysisReplaced,
    Ignored { kind: String },
}

/// Notifications from the realtime client to whatever presents the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A user-facing notice that must be shown prominently.
    Notice(String),
    StateChanged(ConnectionState),
    Appended(LogEntry),
    AnalysisUpdated,
    /// Log and analysis were cleared by a disconnect.
    Cleared,
}

/// Client-held state of one chat session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub identifier: Option<String>,
    pub state: ConnectionState,
    pub log: Vec<LogEntry>,
    pub latest: Option<SelfAnalysis>,
    /// Bumped on every connect and disconnect; frames tagged with an older
    /// epoch are discarded.
    #[serde(skip)]
    epoch: u64,
}

impl Default for SessionView {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionView {
    pub fn new() -> Self {
        Self {
            identifier: None,
            state: ConnectionState::Disconnected,
            log: Vec::new(),
            latest: None,
            epoch: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a new connection epoch for `identifier` and return it.
    pub fn begin(&mut self, identifier: &str) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.identifier = Some(identifier.to_string());
        self.state = ConnectionState::Connecting;
        self.epoch
    }

    /// Route one decoded frame into the view.
    pub fn apply(&mut self, frame: InboundFrame) -> FrameOutcome {
        match frame {
            InboundFrame::System(notice) => {
                let entry = LogEntry::system(notice.message, notice.timestamp);
                self.log.push(entry.clone());
                FrameOutcome::Appended(entry)
            }
            InboundFrame::Message(msg) => {
                let entry = LogEntry {
                    kind: EntryKind::Chat,
                    id: msg.id,
                    username: msg.username,
                    text: msg.message,
                    timestamp: msg.timestamp,
                    is_toxic: msg.is_toxic,
                    toxicity_score: msg.toxicity_score,
                };
                self.log.push(entry.clone());
                FrameOutcome::Appended(entry)
            }
            InboundFrame::Analysis(frame) => {
                let frame = *frame;
                self.latest = Some(SelfAnalysis {
                    analysis: frame.analysis,
                    coaching: frame.coaching.unwrap_or_default(),
                });
                FrameOutcome::AnalysisReplaced
            }
            InboundFrame::Unknown { kind } => FrameOutcome::Ignored { kind },
        }
    }

    /// Apply `frame` only if it belongs to the current epoch. Returns `None`
    /// for stale frames.
    pub fn apply_if_current(&mut self, epoch: u64, frame: InboundFrame) -> Option<FrameOutcome> {
        if epoch != self.epoch {
            return None;
        }
        Some(self.apply(frame))
    }

    /// Drop all client-held history and end the current epoch.
    pub fn clear(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.log.clear();
        self.latest = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Whether `username` is the identifier this session connected with.
    pub fn is_own(&self, username: &str) -> bool {
        self.identifier.as_deref() == Some(username)
    }
}
