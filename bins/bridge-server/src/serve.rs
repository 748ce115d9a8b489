use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use bridge_api_server::{ApiError, AppState};
use bridge_bus::TcpConnector;
use bridge_engine::credentials::install_crypto_provider;
use bridge_engine::{Bridge, BridgeConfig};

use crate::cli::Cli;
use crate::error::ServerError;

const DRAIN: Duration = Duration::from_secs(5);

pub async fn run(cli: Cli) -> Result<(), ServerError> {
    tracing::info!(config = %cli.config, "loading configuration");
    let mut config = BridgeConfig::load(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;
    install_crypto_provider();

    tracing::info!(
        secured = config.secured(),
        forwarding = config.delivery.enabled,
        topics = config.topics().count(),
        "bootstrapping bridge"
    );

    let token = CancellationToken::new();
    let bridge = Bridge::bootstrap(&config, Arc::new(TcpConnector), token.clone()).await?;

    // --- API server ---
    let state = AppState::from_bridge(&bridge, &config.server);
    let credentials = bridge.credentials().cloned();
    let server = config.server.clone();
    let api_token = token.clone();
    let mut api_handle = tokio::spawn(async move {
        bridge_api_server::run(&server, state, credentials, api_token).await
    });

    tracing::info!("metadata bridge ready");

    // --- Wait for Ctrl+C / SIGTERM, or the API server dying ---
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let api_result = tokio::select! {
        res = tokio::signal::ctrl_c() => { res?; None }
        _ = sigterm.recv() => None,
        res = &mut api_handle => Some(res),
    };
    tracing::info!("shutting down...");
    token.cancel();

    let api_result = match api_result {
        Some(res) => res,
        None => match tokio::time::timeout(DRAIN, &mut api_handle).await {
            Ok(res) => res,
            Err(_) => {
                api_handle.abort();
                Ok(Ok(()))
            }
        },
    };

    bridge.shutdown(DRAIN).await;
    tracing::info!("shutdown complete");

    api_outcome(api_result)
}

fn api_outcome(joined: Result<Result<(), ApiError>, JoinError>) -> Result<(), ServerError> {
    match joined {
        Ok(result) => result.map_err(ServerError::from),
        Err(e) => {
            tracing::error!(error = %e, "api server task failed");
            Err(ServerError::ApiTask(e))
        }
    }
}
