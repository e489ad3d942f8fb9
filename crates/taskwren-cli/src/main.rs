mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use taskwren_backend::{Backend, GoogleBackend};
use taskwren_bus::EventBus;
use taskwren_channels::TelegramBot;
use taskwren_core::{
    register_builtin_tools, Orchestrator, SessionGate, SessionStore, ToolRegistry,
};
use taskwren_gateway::{Gateway, RateLimitConfig, RateLimiter};
use taskwren_provider::OllamaProvider;
use taskwren_scheduler::{spawn_user_registration, PrefsStore, ProactiveScheduler};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "taskwren",
    version,
    about = "Personal calendar/task assistant over Telegram, driven by a local model"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "taskwren.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the bot and the proactive scheduler (default).
    Run,
    /// Validate the configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::CheckConfig => {
            AppConfig::load(&cli.config)?;
            println!("configuration ok");
            Ok(())
        }
        Command::Run => run(&cli.config).await,
    }
}

async fn run(config_path: &Path) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    tracing::info!(model = %config.model.model, "starting taskwren");

    let bus = Arc::new(EventBus::new(64));

    let provider = Arc::new(
        OllamaProvider::new(&config.model.base_url, config.model.timeout_secs)
            .with_retries(config.model.transport_retries),
    );
    let backend: Arc<dyn Backend> = Arc::new(GoogleBackend::new(config.google.clone()));

    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, backend.clone())?;
    tracing::info!(tools = registry.len(), "tool registry ready");

    let sessions = Arc::new(SessionStore::new(config.limits.history_cap));
    let gate = SessionGate::new();

    let orchestrator = Arc::new(Orchestrator::new(
        provider,
        Arc::new(registry),
        sessions.clone(),
        gate.clone(),
        bus.publisher(),
        config.core(),
    ));
    let gateway = Arc::new(Gateway::new(
        orchestrator,
        bus.publisher(),
        RateLimiter::new(RateLimitConfig::default()),
    ));

    let prefs = Arc::new(PrefsStore::open(&config.proactive.db_path)?);
    let _registration = spawn_user_registration(
        prefs.clone(),
        bus.clone(),
        config.proactive.default_timezone.clone(),
    );

    let scheduler = Arc::new(ProactiveScheduler::new(
        backend,
        prefs,
        sessions.clone(),
        gate.clone(),
        bus.publisher(),
        config.proactive.clone(),
    ));
    tokio::spawn(async move { scheduler.run().await });

    // Hourly housekeeping: advisory session expiry and gate slot pruning.
    let ttl = chrono::Duration::seconds(config.limits.session_ttl_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            let removed = sessions.purge_idle(ttl).await;
            if removed > 0 {
                tracing::info!(removed, "expired idle sessions");
            }
            gate.prune().await;
        }
    });

    TelegramBot::new(config.telegram.clone(), gateway, bus).run().await
}
