//! HTTP client for the moderation backend's REST endpoints.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::error::ModchatError;
use crate::protocol::{AnalysisResult, CoachingResult, SessionStats};

/// Body of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    /// model name → loaded
    #[serde(default)]
    pub models: BTreeMap<String, bool>,
    #[serde(default)]
    pub connections: u64,
    #[serde(default)]
    pub timestamp: String,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// One stored message as returned by `GET /api/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub username: String,
    pub message: String,
    #[serde(default)]
    pub toxicity_score: f64,
    #[serde(default)]
    pub is_toxic: bool,
    #[serde(default)]
    pub toxic_categories: BTreeMap<String, f64>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub intent_confidence: f64,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub tone_confidence: f64,
    #[serde(default)]
    pub coaching_message: Option<String>,
    #[serde(default)]
    pub suggested_rewrite: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<StoredMessage>,
    pub count: u64,
}

/// Body of `POST /api/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    pub message: String,
    pub analysis: AnalysisResult,
    #[serde(default)]
    pub coaching: CoachingResult,
    #[serde(default)]
    pub timestamp: String,
}

/// Body of `DELETE /api/messages/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub message: String,
    pub id: i64,
}

/// Typed wrapper over the backend's HTTP API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        // reqwest::Client::builder() can fail in extreme environments;
        // fall back to a default client instead of panicking.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: config.api_url.clone(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch the current moderation statistics from `/api/stats`.
    ///
    /// # Returns
    /// - `Err(ModchatError::Connect)` when the request cannot be sent.
    /// - `Err(ModchatError::Http)` on a non-2xx status.
    /// - `Err(ModchatError::Json)` when the body does not match [`SessionStats`].
    pub async fn fetch_stats(&self) -> Result<SessionStats, ModchatError> {
        self.get_json("/api/stats", &[]).await
    }

    /// `GET /api/health`
    pub async fn health(&self) -> Result<HealthReport, ModchatError> {
        self.get_json("/api/health", &[]).await
    }

    /// Most recent stored messages of `room`, oldest first.
    pub async fn recent_messages(&self, limit: u32, room: &str) -> Result<MessagePage, ModchatError> {
        let limit = limit.to_string();
        self.get_json("/api/messages", &[("limit", limit.as_str()), ("room_id", room)])
            .await
    }

    /// Run the backend analysis on `message` without a WebSocket session. The
    /// backend reads both values from the query string.
    pub async fn analyze(&self, message: &str, username: &str) -> Result<AnalyzeResponse, ModchatError> {
        let url = self.url("/api/analyze");
        let resp = self
            .http
            .post(&url)
            .query(&[("message", message), ("username", username)])
            .send()
            .await
            .map_err(|e| connect_error(&url, e))?;
        read_json(resp, url).await
    }

    /// Delete a stored message (moderation action).
    pub async fn delete_message(&self, id: i64) -> Result<DeleteAck, ModchatError> {
        let url = self.url(&format!("/api/messages/{id}"));
        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| connect_error(&url, e))?;
        read_json(resp, url).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ModchatError> {
        let url = self.url(path);
        let mut req = self.http.get(&url);
        if !query.is_empty() {
            req = req.query(query);
        }
        let resp = req.send().await.map_err(|e| connect_error(&url, e))?;
        read_json(resp, url).await
    }
}

fn connect_error(url: &str, err: reqwest::Error) -> ModchatError {
    ModchatError::Connect {
        url: url.to_string(),
        detail: err.to_string(),
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response, url: String) -> Result<T, ModchatError> {
    if !resp.status().is_success() {
        return Err(ModchatError::Http {
            status: resp.status().as_u16(),
            url,
        });
    }
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ModchatError::json(format!("body of {url}"), e))?;
    serde_json::from_slice(&bytes).map_err(|e| ModchatError::json(format!("body of {url}"), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_uses_configured_base_url() {
        let cfg = ClientConfig {
            api_url: "http://mod.internal:9000".into(),
            ..ClientConfig::default()
        };
        let api = ApiClient::new(&cfg);
        assert_eq!(api.base_url(), "http://mod.internal:9000");
        assert_eq!(api.url("/api/stats"), "http://mod.internal:9000/api/stats");
    }

    #[test]
    fn health_report_parses_backend_shape() {
        let report: HealthReport = serde_json::from_str(
            r#"{"status":"healthy","models":{"toxicity_detector":true,"intent_classifier":true,"tone_analyzer":false},"connections":2,"timestamp":"2026-10-17T09:00:00"}"#,
        )
        .unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.models.get("tone_analyzer"), Some(&false));
        assert_eq!(report.connections, 2);
    }

    #[test]
    fn stored_message_tolerates_null_columns() {
        let msg: StoredMessage = serde_json::from_str(
            r#"{"id":3,"username":"bo","message":"hi","toxicity_score":0.02,"is_toxic":false,
                "toxic_categories":{},"intent":null,"intent_confidence":0,"tone":null,
                "tone_confidence":0,"coaching_message":null,"suggested_rewrite":null,
                "timestamp":null,"room_id":"general"}"#,
        )
        .unwrap();
        assert_eq!(msg.id, 3);
        assert!(msg.intent.is_none());
        assert_eq!(msg.room_id.as_deref(), Some("general"));
    }

    #[test]
    fn delete_ack_parses() {
        let ack: DeleteAck =
            serde_json::from_str(r#"{"message":"Message deleted successfully","id":12}"#).unwrap();
        assert_eq!(ack.id, 12);
    }

    #[tokio::test]
    async fn unreachable_backend_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let cfg = ClientConfig {
            api_url: format!("http://127.0.0.1:{port}"),
            ..ClientConfig::default()
        };
        let err = ApiClient::new(&cfg).fetch_stats().await.unwrap_err();
        assert!(matches!(err, ModchatError::Connect { .. }), "got {err:?}");
    }
}
