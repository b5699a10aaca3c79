//! `imagen-worker` -- runs the generation and validation queues in one
//! process and accepts JSON commands on stdin.
//!
//! See [`imagen_worker::config::WorkerConfig::from_env`] for the
//! environment variables.

use std::sync::Arc;
use std::time::Duration;

use imagen_core::retry::RetryPolicy;
use imagen_engine::api::EngineApi;
use imagen_engine::readiness::{wait_until_ready, ReadinessConfig};
use imagen_engine::{GenerationEngine, HttpEngine};
use imagen_queue::backend::{ResultBackend, DEFAULT_SWEEP_INTERVAL};
use imagen_queue::broker::Broker;
use imagen_queue::client::LifecycleClient;
use imagen_queue::submit::{AdmissionController, Submitter};
use imagen_store::ReferenceStore;
use imagen_worker::commands::Console;
use imagen_worker::config::WorkerConfig;
use imagen_worker::generation::GenerationHandler;
use imagen_worker::runner::WorkerRunner;
use imagen_worker::validation::ValidationHandler;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Grace period for blocking tasks at exit.  The stdin reader sits in a
/// blocking read that cannot be cancelled.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "imagen_worker=info,imagen_queue=info,imagen_store=info,imagen_engine=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(
        worker = %config.worker_name,
        engine_url = %config.engine_url,
        reference_dir = %config.reference_dir.display(),
        outputs_dir = %config.outputs_dir.display(),
        max_queue_size = config.max_queue_size,
        "Starting imagen-worker",
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        }
    };
    let result = runtime.block_on(run(config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    if let Err(e) = result {
        tracing::error!(error = %e, "Worker exited with error");
        std::process::exit(1);
    }
}

async fn run(config: WorkerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cancel = CancellationToken::new();

    let store = ReferenceStore::open(&config.reference_dir)?;
    let backend = Arc::new(ResultBackend::new(config.result_ttl));
    let broker = Arc::new(Broker::new(&config.worker_name, Arc::clone(&backend)));

    let api = EngineApi::new(config.engine_url.clone());
    {
        let api = api.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if !wait_until_ready(&api, &ReadinessConfig::default(), &cancel).await {
                tracing::warn!("Generation engine not reachable yet; jobs will retry");
            }
        });
    }
    let engine: Arc<dyn GenerationEngine> = Arc::new(HttpEngine::new(api));

    let generation = WorkerRunner::new(
        Arc::clone(&broker),
        Arc::new(
            GenerationHandler::new(
                store.clone(),
                engine,
                config.data_dir.clone(),
                config.outputs_dir.clone(),
            )
            .with_legacy_reference(config.legacy_reference.clone()),
        ),
        RetryPolicy::generation(),
    )
    .with_timeout(config.job_timeout);

    let validation = WorkerRunner::new(
        Arc::clone(&broker),
        Arc::new(ValidationHandler::new(store.clone())),
        RetryPolicy::validation(),
    )
    .with_timeout(config.job_timeout);

    let mut tasks = Vec::new();
    {
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move { generation.run(cancel).await }));
    }
    {
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move { validation.run(cancel).await }));
    }
    {
        let backend = Arc::clone(&backend);
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            backend.run_sweeper(DEFAULT_SWEEP_INTERVAL, cancel).await
        }));
    }

    let admission = AdmissionController::new(broker.clone(), config.max_queue_size);
    let submitter = Arc::new(Submitter::new(Arc::clone(&broker), admission));
    let console = Console::new(submitter, LifecycleClient::new(backend), store);

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
            }
            cancel.cancel();
        });
    }

    let (responses, mut outbox) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(response) = outbox.recv().await {
            println!("{response}");
        }
    });

    let served = console
        .serve(BufReader::new(tokio::io::stdin()), responses, cancel.clone())
        .await;

    // Runners finish their current job before observing this.
    cancel.cancel();
    for task in tasks {
        task.await?;
    }
    printer.await?;
    served?;
    tracing::info!("imagen-worker stopped");
    Ok(())
}
