use airtel_connector::application::engine::CollectionEngine;
use airtel_connector::config::Config;
use airtel_connector::domain::ports::{JobClientRef, OrchestratorRef, ProviderRef};
use airtel_connector::domain::variables::{INIT_TRANSFER_JOB, TRANSACTION_STATUS_JOB};
use airtel_connector::infrastructure::airtel::AirtelClient;
use airtel_connector::infrastructure::zeebe::ZeebeClient;
use airtel_connector::interfaces::http;
use airtel_connector::interfaces::worker::JobWorker;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let provider: ProviderRef = Arc::new(AirtelClient::new(config.airtel()).into_diagnostic()?);
    let zeebe = Arc::new(ZeebeClient::new(config.zeebe()).into_diagnostic()?);
    let orchestrator: OrchestratorRef = zeebe.clone();
    let jobs: JobClientRef = zeebe;

    let engine = Arc::new(CollectionEngine::new(
        provider,
        orchestrator,
        config.max_retry_count,
        config.message_ttl(),
    ));
    if config.skip_provider {
        info!("Provider calls are disabled, every collection will succeed");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = Arc::new(JobWorker::new(jobs, engine.clone(), config.worker()));
    let workers = [INIT_TRANSFER_JOB, TRANSACTION_STATUS_JOB].map(|job_type| {
        tokio::spawn(worker.clone().run(job_type, shutdown_rx.clone()))
    });

    let pruner = {
        let engine = engine.clone();
        let retention = config.record_retention();
        let mut interval = tokio::time::interval(config.prune_interval());
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let pruned = engine.gateway().prune(chrono::Utc::now(), retention);
                        if pruned > 0 {
                            debug!(pruned, "Pruned resolved transactions");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    };

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .into_diagnostic()?;
    info!(address = %config.listen, "Callback server listening");

    axum::serve(listener, http::router(engine))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .into_diagnostic()?;

    let _ = shutdown_tx.send(true);
    for handle in workers {
        handle.await.into_diagnostic()?;
    }
    pruner.await.into_diagnostic()?;

    Ok(())
}
