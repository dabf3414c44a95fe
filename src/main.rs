// ABOUTME: Main entry point for the herald broadcast bot with registry admin subcommands
// ABOUTME: Loads config, initializes logging and metrics, then runs the bot until Ctrl+C

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use herald::app;
use herald::config::Config;
use herald::platform::TelegramTransport;
use herald_core::{
    AppContext, DeliveryEngine, SubscribeOutcome, SubscriberId, SubscriberRegistry,
    UnsubscribeOutcome,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(author, version, about = "Telegram subscriber bot with a periodic promo broadcast", long_about = None)]
struct Cli {
    /// Path to config.toml (default: HERALD_CONFIG_PATH, ./config.toml, then the XDG config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bot: answer /start and /stop and broadcast on a fixed interval (default)
    Run,
    /// Inspect or edit the subscriber registry without starting the bot
    Subscribers {
        #[command(subcommand)]
        action: SubscribersAction,
    },
    /// Run a single broadcast cycle and exit
    BroadcastOnce,
}

#[derive(Subcommand, Debug)]
enum SubscribersAction {
    /// Print every subscriber ID, one per line
    List,
    /// Add a subscriber ID
    Add {
        #[arg(allow_negative_numbers = true)]
        id: SubscriberId,
    },
    /// Remove a subscriber ID
    Remove {
        #[arg(allow_negative_numbers = true)]
        id: SubscriberId,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Log panics before they take the process down
    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!(panic = %panic_info, "Bot crashed");
        eprintln!("{}", panic_info);
    }));

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logging settings live in the config, so loading it is logged through a
    // temporary stderr subscriber
    let config = herald::logging::with_bootstrap(|| match cli.config.as_deref() {
        Some(path) => Config::load_from(Some(path)),
        None => Config::load(),
    })?;

    let _log_guard = herald::logging::init(&config.logging)?;

    tracing::info!(
        registry = %config.registry.path,
        interval_secs = config.broadcast.interval_secs,
        web_app_url = %config.messages.web_app_url,
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_bot(config).await,
        Command::Subscribers { action } => manage_subscribers(&config, action),
        Command::BroadcastOnce => broadcast_once(config).await,
    }
}

async fn run_bot(config: Config) -> Result<()> {
    if let Some(addr) = config.metrics.prometheus_addr {
        install_metrics_exporter(addr)?;
    }

    let transport = TelegramTransport::new(config.telegram_config()?).await?;
    let ctx = AppContext::new(Arc::new(transport), &config);
    tracing::info!(
        subscribers = ctx.registry.snapshot().len(),
        "Subscriber registry loaded"
    );

    app::run(ctx).await?;
    Ok(())
}

async fn broadcast_once(config: Config) -> Result<()> {
    let transport = TelegramTransport::new(config.telegram_config()?).await?;
    let ctx = AppContext::new(Arc::new(transport), &config);

    let report = DeliveryEngine::run_cycle(&ctx, &CancellationToken::new()).await;
    println!(
        "Cycle {} ({} to {}, {} ms): {} recipients, {} delivered, {} removed, {} kept after failure",
        report.cycle_id,
        report.started_at.to_rfc3339(),
        report.finished_at.to_rfc3339(),
        report.duration().num_milliseconds(),
        report.recipients,
        report.delivered,
        report.removed.len(),
        report.kept.len()
    );

    ctx.transport.shutdown().await
}

fn manage_subscribers(config: &Config, action: SubscribersAction) -> Result<()> {
    let registry = SubscriberRegistry::open(config.registry_path());

    match action {
        SubscribersAction::List => {
            let ids = registry
                .store()
                .try_load()
                .context("Failed to read subscriber registry")?;
            for id in &ids {
                println!("{}", id);
            }
            tracing::info!(count = ids.len(), "Listed subscribers");
        }
        SubscribersAction::Add { id } => match registry.subscribe(id) {
            SubscribeOutcome::Added => println!("Added {}", id),
            SubscribeOutcome::AlreadySubscribed => println!("{} is already subscribed", id),
        },
        SubscribersAction::Remove { id } => match registry.unsubscribe(id) {
            UnsubscribeOutcome::Removed => println!("Removed {}", id),
            UnsubscribeOutcome::NotSubscribed => println!("{} was not subscribed", id),
        },
    }
    Ok(())
}

fn install_metrics_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    herald_core::metrics::describe();
    tracing::info!(addr = %addr, "Prometheus metrics listening");
    Ok(())
}
