use crate::api::{self, ApiState};
use crate::config::AppConfig;
use crate::faults::RandomFaults;
use crate::observability::logging;
use crate::pipeline::{MemoryBrokers, Pipeline};
use crate::runtime::{Role, RuntimeOptions};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Builder as TokioBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Application entrypoint: parse flags, load configuration, install logging
/// and serve until a shutdown request or Ctrl-C.
pub fn run() -> Result<()> {
    let options = RuntimeOptions::from_env();
    let config = options.resolve_config().context("loading configuration")?;
    logging::init(&config.logging)?;

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .thread_name("seqcheck")
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(serve(config, options.roles()))
}

/// Starts the pipeline for `roles` and serves the HTTP surface on it.
pub async fn serve(config: AppConfig, roles: Vec<Role>) -> Result<()> {
    let addr = config.bind_addr()?;
    let brokers = MemoryBrokers::new(&config)?;
    let faults = Arc::new(RandomFaults::new(config.processor.fault_profile()));
    let pipeline = Arc::new(Pipeline::start(&config, &roles, brokers.handles(), faults).await?);

    let state = ApiState::new(
        Arc::clone(&pipeline),
        Duration::from_millis(config.generator.default_rate_ms),
    );
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, ?roles, "listening");

    let token = pipeline.shutdown_token();
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal(token))
        .await
        .context("http server")?;

    pipeline.shutdown().await;
    brokers.close();
    info!("service stopped");
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => info!("shutdown requested"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                info!("interrupt received");
                token.cancel();
            }
            Err(err) => {
                warn!(error = %err, "unable to listen for interrupt");
                token.cancelled().await;
            }
        },
    }
}
