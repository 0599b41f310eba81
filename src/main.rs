use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use modchat::app;
use modchat::cli::{self, Args, Command};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("modchat=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Command::Completions { shell } = &args.command {
        let mut cmd = Args::command();
        clap_complete::generate(*shell, &mut cmd, "modchat", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();
    let config = cli::resolve_config(&args)?;

    match args.command {
        Command::Chat {
            username, no_stats, ..
        } => app::run_chat(config, username, !no_stats).await?,
        Command::Stats { watch } => app::run_stats(config, watch).await?,
        Command::Health => app::run_health(config).await?,
        Command::History { limit, room } => app::run_history(config, limit, &room).await?,
        Command::Analyze { message, username } => {
            app::run_analyze(config, &message, &username).await?
        }
        Command::Delete { id } => app::run_delete(config, id).await?,
        Command::Completions { .. } => {}
    }

    Ok(())
}
