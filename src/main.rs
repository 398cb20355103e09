//! ValidatingWebhookConfiguration controller
//!
//! Main entry point. Parses options, sets up the Kubernetes client and
//! metrics server, and runs the controller until a shutdown signal.

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use webhook_config_controller::{
    controllers::{self, Context},
    metrics, Options,
};

#[derive(Parser, Debug)]
#[command(name = "webhook-config-controller", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    options: Options,

    /// Port for the metrics and health endpoints
    #[arg(long, env = "METRICS_PORT", default_value_t = 8080)]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing();

    // Invalid options are fatal before anything connects to the cluster
    cli.options.validate()?;

    info!("Starting validatingwebhookconfiguration controller");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let context = Arc::new(Context::new(client, cli.options));
    let cancel = CancellationToken::new();

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(cli.metrics_port));
    info!("Metrics server starting on port {}", cli.metrics_port);

    tokio::spawn(shutdown_signal(cancel.clone()));

    // Handle graceful shutdown
    tokio::select! {
        result = controllers::run(context, cancel.clone()) => {
            if let Err(e) = result {
                error!(error = %e, "Controller failed");
                return Err(e.into());
            }
            if !cancel.is_cancelled() {
                error!("Controller exited unexpectedly");
            }
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
            cancel.cancel();
        }
    }

    info!("Validatingwebhookconfiguration controller stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Cancel `cancel` on SIGTERM or SIGINT
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received CTRL+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    cancel.cancel();
}
