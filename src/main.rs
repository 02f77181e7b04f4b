use anyhow::{Context, Result};
use clap::Parser;
use fxbot::api::{LogNotifier, Notifier, OandaClient, OandaEnvironment, WebhookNotifier};
use fxbot::engine::{run_until, Engine};
use fxbot::execution::ExecutionPolicy;
use fxbot::load_settings;
use fxbot::schedule::NotificationGate;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fxbot", version, about = "Range breakout bot for an OANDA account")]
struct Args {
    /// Settings file (TOML or JSON)
    #[arg(short, long, default_value = "config/fxbot.toml")]
    config: PathBuf,

    /// Trade on the practice (demo) environment
    #[arg(long)]
    practice: bool,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let settings = load_settings(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;

    let environment = if args.practice {
        OandaEnvironment::Practice
    } else {
        OandaEnvironment::Live
    };

    tracing::info!(
        "🚀 fxbot starting on {} {} ({:?}, span {}, {} units)",
        settings.params.instrument,
        settings.params.granularity,
        environment,
        settings.params.span,
        settings.params.units
    );

    let account_id = std::env::var("OANDA_ACCOUNT_ID").context("OANDA_ACCOUNT_ID not set")?;
    let token = std::env::var("OANDA_API_TOKEN").context("OANDA_API_TOKEN not set")?;
    let broker = OandaClient::new(environment, account_id, token)?;

    let notifier = build_notifier()?;
    let engine = Engine::new(broker, settings.params.clone(), &settings.runtime)
        .with_policy(ExecutionPolicy::from(&settings.execution));

    let mut gate = NotificationGate::new(settings.runtime.notify_interval_secs);
    tracing::info!("✓ First status update at {}", gate.next_trigger());
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("\n⚠️  Received Ctrl+C, finishing current frame...");
    };

    run_until(
        &engine,
        notifier.as_ref(),
        &mut gate,
        settings.params.granularity_secs,
        shutdown,
    )
    .await
    .context("history ledger is inconsistent, stopping")?;

    tracing::info!("👋 fxbot stopped");
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn build_notifier() -> Result<Box<dyn Notifier>> {
    match std::env::var("NOTIFY_WEBHOOK_URL") {
        Ok(url) if !url.is_empty() => {
            tracing::info!("✓ Status updates go to webhook");
            Ok(Box::new(WebhookNotifier::new(url)?))
        }
        _ => {
            tracing::info!("NOTIFY_WEBHOOK_URL not set, status updates go to the log");
            Ok(Box::new(LogNotifier))
        }
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fxbot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
