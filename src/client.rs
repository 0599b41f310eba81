//! Realtime session client.
//!
//! Owns at most one WebSocket connection to `{ws_url}/ws/{identifier}`. A
//! single driver task reads frames in arrival order, routes them into the
//! shared [`SessionView`] and forwards outbound frames queued by
//! [`SessionClient::send`]. Connection loss is handled by the driver according
//! to the configured [`ReconnectPolicy`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::ModchatError;
use crate::protocol::{decode_frame, OutboundFrame};
use crate::session::{ConnectionState, FrameOutcome, SessionEvent, SessionView};

/// Notice shown when `connect` is called without a username.
pub const EMPTY_IDENTIFIER_NOTICE: &str = "Please enter a username";

/// Notice shown when the connection cannot be established or is lost for good.
pub const CONNECTION_ERROR_NOTICE: &str =
    "Connection error. Please check if the backend is running.";

/// How long `disconnect` waits for the driver to send its Close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Shared handle to the session view.
pub type SharedView = Arc<Mutex<SessionView>>;

fn lock_view(view: &Mutex<SessionView>) -> MutexGuard<'_, SessionView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Connection {
    outbound: mpsc::UnboundedSender<WsMessage>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Client for one chat session.
///
/// ```rust,ignore
/// let (mut client, mut events) = SessionClient::new(ClientConfig::default());
/// client.connect("ana").await?;
/// client.send("hello everyone");
/// while let Some(event) = events.recv().await { /* render */ }
/// ```
pub struct SessionClient {
    config: ClientConfig,
    view: SharedView,
    events: mpsc::UnboundedSender<SessionEvent>,
    conn: Option<Connection>,
}

impl SessionClient {
    /// Create a disconnected client and the receiving end of its event stream.
    pub fn new(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let client = Self {
            config,
            view: Arc::new(Mutex::new(SessionView::new())),
            events,
            conn: None,
        };
        (client, rx)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Clone of the current view.
    pub fn snapshot(&self) -> SessionView {
        lock_view(&self.view).clone()
    }

    pub fn state(&self) -> ConnectionState {
        lock_view(&self.view).state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Open the session for `identifier`.
    ///
    /// An empty or whitespace-only identifier emits a notice and returns
    /// [`ModchatError::EmptyIdentifier`] without touching the network. An
    /// existing connection is torn down first (the log is kept).
    ///
    /// # Errors
    /// - `EmptyIdentifier` when the identifier is blank.
    /// - `Connect` when the handshake fails or times out; the state becomes
    ///   [`ConnectionState::Errored`].
    pub async fn connect(&mut self, identifier: &str) -> Result<(), ModchatError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            self.emit(SessionEvent::Notice(EMPTY_IDENTIFIER_NOTICE.to_string()));
            return Err(ModchatError::EmptyIdentifier);
        }

        if let Some(conn) = self.conn.take() {
            stop_connection(conn).await;
        }

        let epoch = lock_view(&self.view).begin(identifier);
        self.emit(SessionEvent::StateChanged(ConnectionState::Connecting));

        let url = self.config.session_url(identifier);
        info!(url = %url, "connecting to chat session");

        let ws = match open_socket(&url, self.config.connect_timeout).await {
            Ok(ws) => ws,
            Err(e) => {
                error!(error = %e, url = %url, "chat session connection failed");
                let state = ConnectionState::Errored(e.to_string());
                lock_view(&self.view).state = state.clone();
                self.emit(SessionEvent::Notice(CONNECTION_ERROR_NOTICE.to_string()));
                self.emit(SessionEvent::StateChanged(state));
                return Err(e);
            }
        };

        lock_view(&self.view).state = ConnectionState::Connected;
        self.emit(SessionEvent::StateChanged(ConnectionState::Connected));
        info!(url = %url, "chat session connected");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let driver = Driver {
            url,
            epoch,
            policy: self.config.reconnect.clone(),
            connect_timeout: self.config.connect_timeout,
            view: Arc::clone(&self.view),
            events: self.events.clone(),
            outbound_rx,
            shutdown_rx,
        };
        let task = tokio::spawn(driver.run(ws));

        self.conn = Some(Connection {
            outbound,
            shutdown,
            task,
        });
        Ok(())
    }

    /// Queue `{"message": text}` for transmission.
    ///
    /// Only while [`ConnectionState::Connected`]; otherwise this is a no-op
    /// and no network call is made. Returns whether the frame was queued.
    pub fn send(&self, text: &str) -> bool {
        let Some(conn) = &self.conn else {
            return false;
        };
        if !self.is_connected() {
            debug!("send ignored: session is not connected");
            return false;
        }
        match OutboundFrame::new(text).encode() {
            Ok(json) => conn.outbound.send(WsMessage::Text(json)).is_ok(),
            Err(e) => {
                warn!(error = %e, "could not encode outbound frame");
                false
            }
        }
    }

    /// Close the connection and discard the log and the latest analysis.
    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            stop_connection(conn).await;
            info!("chat session closed");
        }
        lock_view(&self.view).clear();
        self.emit(SessionEvent::Cleared);
        self.emit(SessionEvent::StateChanged(ConnectionState::Disconnected));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = conn.shutdown.send(true);
        }
    }
}

async fn stop_connection(conn: Connection) {
    let _ = conn.shutdown.send(true);
    let mut task = conn.task;
    if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
        warn!("session driver did not stop in time, aborting");
        task.abort();
    }
}

async fn open_socket(url: &str, timeout: Duration) -> Result<WsStream, ModchatError> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(ModchatError::Connect {
            url: url.to_string(),
            detail: e.to_string(),
        }),
        Err(_) => Err(ModchatError::Connect {
            url: url.to_string(),
            detail: format!("timed out after {}ms", timeout.as_millis()),
        }),
    }
}

// ---------------------------------------------------------------------------
// Driver task
// ---------------------------------------------------------------------------

enum Exit {
    Shutdown,
    Lost(ModchatError),
}

struct Driver {
    url: String,
    epoch: u64,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    view: SharedView,
    events: mpsc::UnboundedSender<SessionEvent>,
    outbound_rx: mpsc::UnboundedReceiver<WsMessage>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Driver {
    async fn run(mut self, mut ws: WsStream) {
        loop {
            let reason = match self.pump(ws).await {
                Exit::Shutdown => return,
                Exit::Lost(err) => err,
            };

            warn!(error = %reason, url = %self.url, "chat session connection lost");
            // Frames queued for the dead socket are not replayed.
            while self.outbound_rx.try_recv().is_ok() {}

            match self.reconnect(&reason).await {
                Some(next) => ws = next,
                None => return,
            }
        }
    }

    /// Multiplex inbound frames, outbound frames and the shutdown signal until
    /// the socket ends.
    async fn pump(&mut self, ws: WsStream) -> Exit {
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return Exit::Shutdown;
                    }
                }

                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(WsMessage::Text(text))) => self.handle_text(&text),
                        Some(Ok(WsMessage::Close(_))) | None => {
                            return Exit::Lost(ModchatError::WebSocket(
                                "connection closed by server".to_string(),
                            ));
                        }
                        Some(Ok(_)) => {} // binary / ping / pong
                        Some(Err(e)) => return Exit::Lost(ModchatError::WebSocket(e.to_string())),
                    }
                }

                outbound = self.outbound_rx.recv() => {
                    match outbound {
                        Some(msg) => {
                            if let Err(e) = sink.send(msg).await {
                                return Exit::Lost(ModchatError::WebSocket(e.to_string()));
                            }
                        }
                        None => {
                            let _ = sink.send(WsMessage::Close(None)).await;
                            return Exit::Shutdown;
                        }
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        let outcome = lock_view(&self.view).apply_if_current(self.epoch, frame);
        match outcome {
            Some(FrameOutcome::Appended(entry)) => self.emit(SessionEvent::Appended(entry)),
            Some(FrameOutcome::AnalysisReplaced) => self.emit(SessionEvent::AnalysisUpdated),
            Some(FrameOutcome::Ignored { kind }) => {
                debug!(kind = %kind, "dropping frame with unrecognised type");
            }
            None => debug!("dropping frame from a closed session"),
        }
    }

    /// Retry with backoff. Returns `None` on shutdown or when the policy is
    /// exhausted (state left as `Errored`).
    async fn reconnect(&mut self, reason: &ModchatError) -> Option<WsStream> {
        let mut attempt: u32 = 0;
        let mut last_error = reason.to_string();

        loop {
            attempt = attempt.saturating_add(1);
            if !self.policy.allows(attempt) {
                error!(
                    attempts = attempt - 1,
                    url = %self.url,
                    "giving up on chat session"
                );
                self.emit(SessionEvent::Notice(CONNECTION_ERROR_NOTICE.to_string()));
                self.set_state(ConnectionState::Errored(last_error));
                return None;
            }

            self.set_state(ConnectionState::Reconnecting { attempt });
            let wait = self.policy.delay_for(attempt);
            info!(attempt, wait_ms = wait.as_millis() as u64, "reconnecting chat session");

            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        return None;
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match open_socket(&self.url, self.connect_timeout).await {
                Ok(ws) => {
                    info!(attempt, "chat session reconnected");
                    self.set_state(ConnectionState::Connected);
                    return Some(ws);
                }
                Err(e) => {
                    warn!(error = %e, attempt, "reconnect attempt failed");
                    last_error = e.to_string();
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let mut view = lock_view(&self.view);
        if view.epoch() != self.epoch {
            return;
        }
        view.state = state.clone();
        drop(view);
        self.emit(SessionEvent::StateChanged(state));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
