use anyhow::{Context, Result};
use clap::Parser;
use pw_feeder::cli::Cli;
use pw_feeder::{run_feeder, FeederConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cli_debug = cli.debug;
    let config = cli.into_config();

    // RUST_LOG 优先，否则按 debug 开关选择级别
    let debug = config.as_ref().map_or(cli_debug, |c| c.debug);
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "plane.watch feeder started");

    let result = match config.context("Invalid configuration") {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("plane.watch feeder finishing with an error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: FeederConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    run_feeder(config, cancel).await.map_err(|e| {
        let context = if e.is_fatal() {
            "plane.watch feeder failed to start"
        } else {
            "plane.watch feeder stopped unexpectedly"
        };
        anyhow::Error::new(e).context(context)
    })
}

/// 收到 SIGTERM 或 Ctrl-C 时取消根令牌
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
    cancel.cancel();
}
