use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{normalize_base_url, ClientConfig};
use crate::error::ModchatError;

#[derive(Parser, Debug)]
#[command(name = "modchat")]
#[command(version)]
#[command(about = "Terminal client for a real-time moderated chat with AI toxicity, intent and tone analysis")]
pub struct Args {
    /// TOML config file (api_url, ws_url, poll_interval_secs, [reconnect])
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the HTTP API (overrides config and MODCHAT_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Base URL of the WebSocket host (overrides config and MODCHAT_WS_URL)
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Join the chat room interactively
    Chat {
        /// Username to join with (prompted for when omitted)
        username: Option<String>,

        /// Do not reconnect automatically when the connection drops
        #[arg(long)]
        no_reconnect: bool,

        /// Seconds between statistics refreshes
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Do not poll the statistics endpoint
        #[arg(long)]
        no_stats: bool,
    },

    /// Show moderation statistics
    Stats {
        /// Keep refreshing until interrupted
        #[arg(long, short)]
        watch: bool,
    },

    /// Check backend health
    Health,

    /// Show recent stored messages
    History {
        #[arg(long, default_value = "50")]
        limit: u32,

        #[arg(long, default_value = "general")]
        room: String,
    },

    /// Analyze a message without joining the chat
    Analyze {
        message: String,

        #[arg(long, default_value = "anonymous")]
        username: String,
    },

    /// Delete a stored message by id (moderation action)
    Delete { id: i64 },

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Build the effective configuration: file and environment first, then the
/// command-line overrides.
pub fn resolve_config(args: &Args) -> Result<ClientConfig, ModchatError> {
    let mut config = ClientConfig::load(args.config.as_deref())?;
    apply_overrides(&mut config, args);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut ClientConfig, args: &Args) {
    if let Some(url) = &args.api_url {
        config.api_url = normalize_base_url(url);
    }
    if let Some(url) = &args.ws_url {
        config.ws_url = normalize_base_url(url);
    }
    if let Command::Chat {
        no_reconnect,
        poll_interval,
        ..
    } = &args.command
    {
        if *no_reconnect {
            config.reconnect.enabled = false;
        }
        if let Some(secs) = poll_interval {
            config.poll_interval = Duration::from_secs(*secs);
        }
    }
}
