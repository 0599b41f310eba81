//! Command runners behind the `modchat` binary.
//!
//! `run_chat` is the interactive session: stdin lines are either slash
//! commands or chat messages, session events are printed as they arrive, and
//! the stats poller runs in the background while the session is connected.

use std::time::Duration;

use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::client::SessionClient;
use crate::config::ClientConfig;
use crate::error::ModchatError;
use crate::render;
use crate::session::{ConnectionState, SessionEvent};
use crate::stats::{StatsHandle, StatsPoller, StatsSource, StatsState};

pub const HELP: &str = "\
Commands:
  /connect [name]  join again (optionally as someone else)
  /disconnect      leave the chat and clear history
  /log             show the chat history of this session
  /analysis        show the analysis of your last message
  /rewrite         toggle the suggested polite rewrite
  /stats           show moderation statistics
  /help            show this help
  /quit            leave and exit
Anything else is sent as a chat message; start it with // to send a line
that begins with a slash.";

/// One line of user input, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send(String),
    Connect(Option<String>),
    Disconnect,
    Log,
    Analysis,
    Rewrite,
    Stats,
    Help,
    Quit,
    /// Blank line; nothing to do.
    Empty,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let text = line.trim_end_matches(&['\r', '\n'][..]);
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Send(text.to_string());
    };
    if command.starts_with('/') {
        // `//shrug` sends `/shrug`.
        let escaped = text.trim_start();
        return Input::Send(escaped[1..].to_string());
    }

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "connect" | "join" => Input::Connect((!rest.is_empty()).then(|| rest.to_string())),
        "disconnect" | "leave" => Input::Disconnect,
        "log" | "history" => Input::Log,
        "analysis" => Input::Analysis,
        "rewrite" => Input::Rewrite,
        "stats" => Input::Stats,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => Input::Unknown(other.to_string()),
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

fn print_notice(text: &str) {
    println!("{} {}", "!".red().bold(), text.bold());
}

fn describe_state(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Connected => format!("{}", "● Live".green().bold()),
        ConnectionState::Connecting => "connecting...".yellow().to_string(),
        ConnectionState::Reconnecting { attempt } => {
            format!("reconnecting (attempt {attempt})...").yellow().to_string()
        }
        ConnectionState::Disconnected => "disconnected".dimmed().to_string(),
        ConnectionState::Errored(reason) => format!("connection failed: {reason}").red().to_string(),
    }
}

/// Stats polling tied to the connection: a poller runs only while the session
/// is connected and starts over at `Loading` on every new connection.
struct StatsPanel<S: StatsSource + Clone> {
    /// `None` when polling is switched off.
    source: Option<S>,
    poll_interval: Duration,
    running: Option<(StatsHandle, watch::Receiver<StatsState>)>,
}

impl<S: StatsSource + Clone> StatsPanel<S> {
    fn new(source: Option<S>, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
            running: None,
        }
    }

    fn follow(&mut self, state: &ConnectionState) {
        if !state.is_connected() {
            self.stop();
            return;
        }
        if self.running.is_some() {
            return;
        }
        if let Some(source) = &self.source {
            let spawned = StatsPoller::builder(source.clone())
                .poll_interval(self.poll_interval)
                .spawn();
            self.running = Some(spawned);
            debug!("stats polling started");
        }
    }

    fn stop(&mut self) {
        if let Some((handle, _rx)) = self.running.take() {
            handle.stop();
            debug!("stats polling stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn current(&self) -> Option<StatsState> {
        self.running.as_ref().map(|(_, rx)| rx.borrow().clone())
    }
}

struct ChatUi<S: StatsSource + Clone> {
    client: SessionClient,
    stats: StatsPanel<S>,
    show_rewrite: bool,
}

impl<S: StatsSource + Clone> ChatUi<S> {
    fn on_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Notice(text) => print_notice(&text),
            SessionEvent::StateChanged(state) => {
                println!("{}", describe_state(&state));
                self.stats.follow(&state);
            }
            SessionEvent::Appended(entry) => {
                let view = self.client.snapshot();
                println!("{}", render::render_entry(&entry, view.identifier.as_deref()));
            }
            SessionEvent::AnalysisUpdated => self.print_analysis(),
            SessionEvent::Cleared => println!("{}", "history cleared".dimmed()),
        }
    }

    fn print_analysis(&self) {
        let view = self.client.snapshot();
        print_lines(render::render_analysis(view.latest.as_ref(), self.show_rewrite));
    }

    fn print_stats(&self) {
        match self.stats.current() {
            Some(state) => print_lines(render::render_stats(&state)),
            None if self.stats.source.is_none() => {
                println!("{}", "statistics polling is off".dimmed())
            }
            None => println!("{}", "statistics are shown while connected".dimmed()),
        }
    }

    /// Returns `false` when the session should end.
    async fn on_input(&mut self, input: Input) -> bool {
        match input {
            Input::Empty => {}
            Input::Send(text) => {
                if !self.client.send(&text) {
                    println!("{}", "not connected; use /connect to join".dimmed());
                }
            }
            Input::Connect(name) => {
                let name = name
                    .or_else(|| self.client.snapshot().identifier)
                    .unwrap_or_default();
                // Failures are reported through session events.
                let _ = self.client.connect(&name).await;
            }
            Input::Disconnect => {
                self.client.disconnect().await;
                self.stats.stop();
            }
            Input::Log => {
                let view = self.client.snapshot();
                print_lines(render::render_log(&view.log, view.identifier.as_deref()));
            }
            Input::Analysis => self.print_analysis(),
            Input::Rewrite => {
                self.show_rewrite = !self.show_rewrite;
                self.print_analysis();
            }
            Input::Stats => self.print_stats(),
            Input::Help => println!("{HELP}"),
            Input::Unknown(cmd) => {
                println!("unknown command /{cmd}; try /help, or //{cmd} to send it as text")
            }
            Input::Quit => return false,
        }
        true
    }
}

/// Interactive chat session on stdin/stdout.
pub async fn run_chat(
    config: ClientConfig,
    username: Option<String>,
    with_stats: bool,
) -> Result<(), ModchatError> {
    let mut input = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    println!("{}", "🛡️ Real-Time Chat Moderation".bold());
    println!(
        "{}",
        "AI-powered toxicity detection • Intent classification • Communication coaching".dimmed()
    );

    let stats = StatsPanel::new(
        with_stats.then(|| ApiClient::new(&config)),
        config.poll_interval,
    );
    let (client, mut events) = SessionClient::new(config);
    let mut ui = ChatUi {
        client,
        stats,
        show_rewrite: false,
    };

    let mut username = username;
    loop {
        let name = match username.take() {
            Some(name) => name,
            None => {
                println!("Enter your username:");
                match input.next().await {
                    Some(line) => line?,
                    None => return Ok(()),
                }
            }
        };
        let result = ui.client.connect(&name).await;
        while let Ok(event) = events.try_recv() {
            ui.on_event(event);
        }
        match result {
            Ok(()) => break,
            Err(e) if e.is_precondition() => continue,
            // Connection errors leave the user at the prompt; /connect retries.
            Err(_) => break,
        }
    }
    println!("{}", "type /help for commands".dimmed());

    loop {
        tokio::select! {
            line = input.next() => {
                let keep_going = match line {
                    Some(Ok(line)) => ui.on_input(parse_input(&line)).await,
                    Some(Err(e)) => return Err(e.into()),
                    None => false,
                };
                while let Ok(event) = events.try_recv() {
                    ui.on_event(event);
                }
                if !keep_going {
                    break;
                }
            }
            Some(event) = events.recv() => ui.on_event(event),
        }
    }

    ui.client.disconnect().await;
    ui.stats.stop();
    info!("chat session ended");
    Ok(())
}

/// Print statistics once, or keep refreshing until Ctrl-C.
pub async fn run_stats(config: ClientConfig, watch: bool) -> Result<(), ModchatError> {
    let api = ApiClient::new(&config);
    if !watch {
        let stats = api.fetch_stats().await?;
        print_lines(render::render_stats(&StatsState::Loaded(stats)));
        return Ok(());
    }

    let (handle, mut rx) = StatsPoller::builder(api)
        .poll_interval(config.poll_interval)
        .spawn();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                print_lines(render::render_stats(&state));
                println!();
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    handle.stop();
    Ok(())
}

pub async fn run_health(config: ClientConfig) -> Result<(), ModchatError> {
    let report = ApiClient::new(&config).health().await?;
    let status = if report.is_healthy() {
        report.status.green().bold()
    } else {
        report.status.red().bold()
    };
    println!("status       {status}");
    println!("connections  {}", report.connections);
    for (model, loaded) in &report.models {
        let mark = if *loaded { "✓".green() } else { "✗".red() };
        println!("  {mark} {model}");
    }
    Ok(())
}

pub async fn run_history(config: ClientConfig, limit: u32, room: &str) -> Result<(), ModchatError> {
    let page = ApiClient::new(&config).recent_messages(limit, room).await?;
    if page.messages.is_empty() {
        println!("{}", render::EMPTY_LOG.dimmed());
        return Ok(());
    }
    for msg in &page.messages {
        let entry = crate::session::LogEntry {
            kind: crate::session::EntryKind::Chat,
            id: Some(msg.id),
            username: msg.username.clone(),
            text: msg.message.clone(),
            timestamp: msg.timestamp.clone().unwrap_or_default(),
            is_toxic: Some(msg.is_toxic),
            toxicity_score: Some(msg.toxicity_score),
        };
        println!("#{:<5} {}", msg.id, render::render_entry(&entry, None));
    }
    println!("{}", format!("{} message(s)", page.count).dimmed());
    Ok(())
}

pub async fn run_analyze(config: ClientConfig, message: &str, username: &str) -> Result<(), ModchatError> {
    let resp = ApiClient::new(&config).analyze(message, username).await?;
    let latest = crate::session::SelfAnalysis {
        analysis: resp.analysis,
        coaching: resp.coaching,
    };
    print_lines(render::render_analysis(Some(&latest), true));
    Ok(())
}

pub async fn run_delete(config: ClientConfig, id: i64) -> Result<(), ModchatError> {
    let ack = ApiClient::new(&config).delete_message(id).await?;
    println!("{} (id {})", ack.message, ack.id);
    Ok(())
}
