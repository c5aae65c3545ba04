use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_payments::models::{PaymentSession, PollStatus};
use storefront_payments::{
    Config, FileStorage, HostEffects, Notice, NoticeKind, PaymentConfirmation, SetupPrompt,
};

#[derive(Parser, Debug)]
#[command(name = "storefront-payments")]
#[command(about = "Headless payment confirmation runner for the storefront admin panel")]
struct Cli {
    /// URL the browser landed on after the gateway redirect
    #[arg(long)]
    url: Option<String>,

    /// Start tracking a new attempt with this gateway reference
    #[arg(long, requires_all = ["plan_id", "store_id"])]
    reference: Option<String>,

    /// Plan being paid for (with --reference)
    #[arg(long)]
    plan_id: Option<String>,

    /// Store the payment belongs to (with --reference)
    #[arg(long)]
    store_id: Option<String>,

    /// Keep running until polling settles or gives up
    #[arg(long)]
    wait: bool,
}

/// Host that only reports what a browser shell would do.
struct LoggingHost;

#[async_trait]
impl HostEffects for LoggingHost {
    fn notify(&self, notice: Notice) {
        match notice.kind {
            NoticeKind::Success => tracing::info!(reference = %notice.reference, "NOTICE: {}", notice.text),
            NoticeKind::Error => tracing::warn!(reference = %notice.reference, "NOTICE: {}", notice.text),
        }
    }

    async fn refresh_state(&self, store_id: Option<&str>) {
        tracing::info!(store_id = ?store_id, "Would refresh subscription state");
    }

    fn reload(&self) {
        tracing::info!("Would reload the application");
    }

    fn navigate(&self, path: &str) {
        tracing::info!(%path, "Would navigate");
    }

    fn replace_url(&self, url: &str) {
        tracing::info!(%url, "Would replace visible URL");
    }

    fn present_setup(&self, prompt: SetupPrompt) {
        tracing::info!(
            reference = %prompt.reference,
            authorization_id = ?prompt.authorization_id,
            "Would offer recurring billing setup"
        );
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_payments=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let storage_dir = config
        .storage_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let storage = match FileStorage::open(&storage_dir) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(path = %storage.path().display(), "Using payment storage");

    let engine = match PaymentConfirmation::new(&config, Arc::new(storage), Arc::new(LoggingHost)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    if let (Some(reference), Some(plan_id), Some(store_id)) =
        (cli.reference, cli.plan_id, cli.store_id)
    {
        engine.begin(PaymentSession::new(reference, plan_id, store_id));
    }

    match cli.url.as_deref() {
        Some(url) => {
            let report = engine.mount(url).await;
            if let Some(verification) = &report.verification {
                tracing::info!(
                    reference = %verification.reference,
                    status = verification.status.as_str(),
                    "Return URL result"
                );
            }
            if let Some(e) = &report.verify_error {
                tracing::warn!(%url, "Return URL not checked: {}", e);
            }
            tracing::info!(resumed = report.resumed, "Mount complete");
        }
        None => {
            let resumed = engine.scheduler().resume();
            tracing::info!(resumed, "Resume complete");
        }
    }

    if cli.wait {
        let mut updates = engine.subscribe();
        tokio::select! {
            _ = updates.wait_for(|snap| snap.status != PollStatus::Polling) => {}
            _ = shutdown_signal() => {}
        }
        // Let a terminal effect finish its delay before exiting.
        if engine.snapshot().status.is_terminal() {
            tokio::time::sleep(config.timings.failure_delay).await;
        }
    }

    engine.shutdown();
    tracing::info!(status = engine.snapshot().status.as_str(), "Done");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping...");
}
