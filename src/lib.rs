//! # modchat
//!
//! Client for a real-time moderated chat. The backend scores every message
//! for toxicity, classifies its intent and tone, and generates coaching; this
//! crate joins the chat over WebSocket, keeps the session's view state, polls
//! the moderation statistics and renders all of it to a terminal.
//!
//! - [`client::SessionClient`]: one WebSocket session, frame routing,
//!   reconnect with backoff.
//! - [`session::SessionView`]: append-only log, latest self-analysis,
//!   connection state machine.
//! - [`stats::StatsPoller`]: fixed-interval polling of `/api/stats`.
//! - [`api::ApiClient`]: typed wrappers over the REST endpoints.
//! - [`render`]: terminal formatting.

pub mod api;
pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod render;
pub mod session;
pub mod stats;

pub use client::SessionClient;
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::ModchatError;
pub use protocol::{AnalysisResult, CoachingResult, InboundFrame, SessionStats};
pub use session::{ConnectionState, LogEntry, SessionEvent, SessionView};
pub use stats::{StatsPoller, StatsState};
