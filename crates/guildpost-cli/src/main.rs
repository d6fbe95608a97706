use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use guildpost_channels::discord::{DiscordBot, DiscordGateway};
use guildpost_channels::ChatBot;
use guildpost_core::*;

#[derive(Parser)]
#[command(
    name = "guildpost",
    version,
    about = "Discord bot for guild tag forum posts and status broadcasts"
)]
struct Cli {
    #[arg(
        long,
        default_value = ".",
        help = "Bot root directory (contains config.yaml, data/ and icons/)"
    )]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Connect to Discord and serve slash commands")]
    Start,
    #[command(about = "Validate config.yaml")]
    Validate,
    #[command(about = "Print the slash command definitions as JSON")]
    Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "guildpost.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    match cli.command {
        Commands::Validate => {
            let config = load_config(&cli.root)?;
            println!("{}", describe_config(&config));
        }
        Commands::Commands => {
            println!("{}", serde_json::to_string_pretty(&all_commands())?);
        }
        Commands::Start => start_bot(&cli.root).await?,
    }

    Ok(())
}

fn describe_config(config: &BotConfig) -> String {
    format!(
        "Config valid. Content channels: {}, broadcast channels: {}, icons: {}.",
        config.storage.content_channels.display(),
        config.storage.broadcast_channels.display(),
        config.assets.icons_dir.display()
    )
}

async fn start_bot(root: &Path) -> Result<()> {
    let config = load_config(root)?;

    let store = Arc::new(ConfigStore::new(
        &config.storage.content_channels,
        &config.storage.broadcast_channels,
    ));
    let gateway = Arc::new(DiscordGateway::new());
    let notifier = Arc::new(LifecycleNotifier::new(
        gateway.clone(),
        store.clone(),
        Arc::new(StdProcessExit),
        config.status.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        store,
        gateway.clone(),
        notifier.clone(),
        config.assets.icons_dir.clone(),
        config.post.clone(),
    ));

    let (fault_tx, mut fault_rx) = mpsc::unbounded_channel();
    install_panic_hook(fault_tx);

    let bot: Box<dyn ChatBot> = Box::new(DiscordBot::new(
        config.discord.token.clone(),
        gateway,
        dispatcher,
        notifier.clone(),
    ));
    tracing::info!("starting {} bot from {}", bot.platform(), root.display());
    let mut client = tokio::spawn(bot.run());

    let trigger = next_trigger(shutdown_signal(), &mut fault_rx, &mut client).await?;

    // Exits the process. A trigger that lost to an earlier one (`/restart`
    // closing the shards ends the client task too) parks here until that
    // earlier shutdown exits with its own code.
    notifier.shutdown(trigger).await;
    Ok(())
}

/// First of: a signal, a panic reported by the hook, or the client task ending.
async fn next_trigger(
    signal: impl Future<Output = Result<ShutdownTrigger>>,
    faults: &mut mpsc::UnboundedReceiver<String>,
    client: &mut JoinHandle<Result<()>>,
) -> Result<ShutdownTrigger> {
    tokio::select! {
        trigger = signal => trigger,
        Some(fault) = faults.recv() => Ok(ShutdownTrigger::Fault(fault)),
        result = client => Ok(client_exit_trigger(result)),
    }
}

fn client_exit_trigger(result: Result<Result<()>, JoinError>) -> ShutdownTrigger {
    match result {
        Ok(Ok(())) => ShutdownTrigger::Terminate,
        Ok(Err(err)) => ShutdownTrigger::Rejection(format!("{err:#}")),
        Err(err) => ShutdownTrigger::Fault(err.to_string()),
    }
}

/// Forward every panic to the supervisor after the default hook printed it.
fn install_panic_hook(faults: mpsc::UnboundedSender<String>) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        let _ = faults.send(info.to_string());
    }));
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<ShutdownTrigger> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok(ShutdownTrigger::Interrupt)
        }
        _ = sigterm.recv() => Ok(ShutdownTrigger::Terminate),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<ShutdownTrigger> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownTrigger::Interrupt)
}
