//! Crate-level error type.

use thiserror::Error;

/// Errors produced by the session client, the REST client and config loading.
///
/// Each variant carries enough context to diagnose the failure without
/// needing to inspect the originating error directly.
#[derive(Debug, Error)]
pub enum ModchatError {
    /// `connect` was called with an empty (or whitespace-only) identifier.
    #[error("a non-empty username is required to connect")]
    EmptyIdentifier,

    /// A TCP-level or handshake-level connection could not be established.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// The WebSocket failed after the handshake (read error, unexpected close).
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The remote server replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// A body or frame could not be parsed as the expected JSON structure.
    #[error("JSON parse error in {context}: {detail}")]
    Json { context: String, detail: String },

    /// Invalid configuration value or unreadable config file.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ModchatError {
    pub(crate) fn json(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ModchatError::Json {
            context: context.into(),
            detail: err.to_string(),
        }
    }

    /// Whether the failure is a rejected local precondition rather than a
    /// transport problem.
    pub fn is_precondition(&self) -> bool {
        matches!(self, ModchatError::EmptyIdentifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_http_contains_status_and_url() {
        let err = ModchatError::Http {
            status: 503,
            url: "http://localhost:8000/api/stats".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("503"), "expected status in display: {s}");
        assert!(s.contains("/api/stats"), "expected url: {s}");
    }

    #[test]
    fn display_connect_contains_detail() {
        let err = ModchatError::Connect {
            url: "ws://localhost:8000/ws/ana".to_string(),
            detail: "connection refused".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("ws://localhost:8000/ws/ana"), "url in display: {s}");
        assert!(s.contains("connection refused"), "detail in display: {s}");
    }

    #[test]
    fn json_helper_keeps_context() {
        let err = ModchatError::json("stats body", "missing field `tones`");
        let s = err.to_string();
        assert!(s.contains("stats body"));
        assert!(s.contains("missing field"));
    }

    #[test]
    fn only_empty_identifier_is_precondition() {
        assert!(ModchatError::EmptyIdentifier.is_precondition());
        assert!(!ModchatError::WebSocket("closed".into()).is_precondition());
        assert!(!ModchatError::Config("bad".into()).is_precondition());
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ModchatError = io.into();
        assert!(matches!(err, ModchatError::Io(_)));
    }
}
