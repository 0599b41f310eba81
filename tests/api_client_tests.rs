//! REST client against a one-shot HTTP responder.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_test::{assert_err, assert_ok};

use modchat::api::ApiClient;
use modchat::stats::StatsSource;
use modchat::{ClientConfig, ModchatError};

#[derive(Debug)]
struct SeenRequest {
    method: String,
    path: String,
}

/// Serve exactly one request with `status` and `body`, reporting what was
/// asked for.
async fn respond_once(status: &'static str, body: &str) -> (ApiClient, oneshot::Receiver<SeenRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = body.to_string();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let mut headers = [httparse::EMPTY_HEADER; 32];
            let mut req = httparse::Request::new(&mut headers);
            if let Ok(httparse::Status::Complete(_)) = req.parse(&buf) {
                let seen = SeenRequest {
                    method: req.method.unwrap_or_default().to_string(),
                    path: req.path.unwrap_or_default().to_string(),
                };
                let _ = tx.send(seen);
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
    });

    let config = ClientConfig {
        api_url: format!("http://{addr}"),
        request_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    };
    (ApiClient::new(&config), rx)
}

const STATS_BODY: &str = r#"{
    "total_messages": 12,
    "toxic_messages": 3,
    "clean_messages": 9,
    "toxicity_rate": 25.0,
    "intents": {"question": 5, "insult": 2},
    "tones": {"neutral": 8},
    "active_connections": 4
}"#;

#[tokio::test]
async fn fetch_stats_reads_the_stats_endpoint() {
    let (api, seen) = respond_once("200 OK", STATS_BODY).await;

    let stats = assert_ok!(api.fetch_stats().await);
    assert_eq!(stats.total_messages, 12);
    assert_eq!(stats.toxicity_rate, 25.0);
    assert_eq!(stats.intents.get("question"), Some(&5));
    assert_eq!(stats.active_connections, 4);

    let seen = seen.await.unwrap();
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.path, "/api/stats");
}

#[tokio::test]
async fn api_client_is_a_stats_source() {
    let (api, _seen) = respond_once("200 OK", STATS_BODY).await;
    let stats = assert_ok!(StatsSource::fetch(&api).await);
    assert_eq!(stats.tones.get("neutral"), Some(&8));
}

#[tokio::test]
async fn non_success_status_is_an_http_error() {
    let (api, _seen) = respond_once("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
    let err = assert_err!(api.fetch_stats().await);
    assert!(matches!(err, ModchatError::Http { status: 500, .. }), "got {err:?}");
}

#[tokio::test]
async fn malformed_body_is_a_json_error() {
    let (api, _seen) = respond_once("200 OK", r#"{"total_messages": "lots"}"#).await;
    let err = assert_err!(api.fetch_stats().await);
    assert!(matches!(err, ModchatError::Json { .. }), "got {err:?}");
}

#[tokio::test]
async fn recent_messages_sends_limit_and_room() {
    let body = r#"{
        "messages": [{
            "id": 7,
            "username": "ana",
            "message": "hello",
            "toxicity_score": 0.02,
            "is_toxic": false,
            "timestamp": "2026-10-17T12:00:00"
        }],
        "count": 1
    }"#;
    let (api, seen) = respond_once("200 OK", body).await;

    let page = assert_ok!(api.recent_messages(20, "lobby").await);
    assert_eq!(page.count, 1);
    assert_eq!(page.messages[0].id, 7);
    assert_eq!(page.messages[0].username, "ana");

    let seen = seen.await.unwrap();
    assert_eq!(seen.path, "/api/messages?limit=20&room_id=lobby");
}

#[tokio::test]
async fn analyze_posts_message_and_username_as_query() {
    let body = r#"{
        "username": "ana",
        "message": "you are all idiots",
        "analysis": {
            "toxicity": {"score": 0.88, "is_toxic": true, "categories": {"insult": 0.8}, "top_categories": ["insult"]},
            "intent": {"type": "insult", "confidence": 0.9, "explanation": "name calling"},
            "tone": {"type": "aggressive", "confidence": 0.7, "explanation": ""}
        },
        "coaching": {"message": "Try a calmer phrasing.", "suggested_rewrite": "I disagree with everyone here."},
        "timestamp": "2026-10-17T12:00:00"
    }"#;
    let (api, seen) = respond_once("200 OK", body).await;

    let resp = assert_ok!(api.analyze("you are all idiots", "ana").await);
    assert!(resp.analysis.toxicity.is_toxic);
    assert_eq!(resp.analysis.tone.label, "aggressive");
    assert_eq!(
        resp.coaching.suggested_rewrite.as_deref(),
        Some("I disagree with everyone here.")
    );

    let seen = seen.await.unwrap();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.path, "/api/analyze?message=you+are+all+idiots&username=ana");
}

#[tokio::test]
async fn delete_targets_the_message_id() {
    let (api, seen) = respond_once("200 OK", r#"{"message":"Message deleted","id":5}"#).await;

    let ack = assert_ok!(api.delete_message(5).await);
    assert_eq!(ack.id, 5);

    let seen = seen.await.unwrap();
    assert_eq!(seen.method, "DELETE");
    assert_eq!(seen.path, "/api/messages/5");
}

#[tokio::test]
async fn missing_message_is_a_404() {
    let (api, _seen) = respond_once("404 Not Found", r#"{"detail":"Message not found"}"#).await;
    let err = assert_err!(api.delete_message(999).await);
    assert!(matches!(err, ModchatError::Http { status: 404, .. }));
}
