use crate::cli::{Cli, Commands};
use ferry::config::Config;
use ferry::observability::{Metrics, MetricsSnapshot};
use ferry::storage::StorageRegistry;
use ferry::transfer::{
    EngineSettings, LogProgress, ProgressTracker, TaskKind, Throttled, TransferElement,
    TransferError, TransferInfo, TransferTask, plan,
};
use ferry::worker::Scheduler;
use ferry::worker::http::{HttpClient, HttpConfig};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(cli: Cli) -> Result<(), AnyError> {
    let config = Config::load_with(cli.config)?;

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let storages = StorageRegistry::from_config(&config.storages)?;
    let http = Arc::new(HttpClient::new(HttpConfig::from(&config.http))?);

    let (kind, elements, ignore_errors) = match cli.command {
        Commands::Fetch(args) => {
            let target = storages.get(&args.storage)?;
            let elements = plan::direct_links(&http, &args.urls, &target, &args.dir);
            (TaskKind::DirectLinks, elements, args.ignore_errors)
        }
        Commands::Import(args) => {
            let target = storages.get(&args.storage)?;
            let elements = plan::local_import(&args.local_dir, &target, &args.dir).await?;
            (TaskKind::Import, elements, args.ignore_errors)
        }
        Commands::Transfer(args) => {
            let source = storages.get(&args.from)?;
            let target = storages.get(&args.to)?;
            let elements = plan::storage_transfer(&source, &args.src, &target, &args.dir).await?;
            (TaskKind::Transfer, elements, args.ignore_errors)
        }
        Commands::Config => return Ok(()),
    };

    if elements.is_empty() {
        info!("Nothing to transfer");
        return Ok(());
    }

    submit_and_wait(&config, kind, elements, ignore_errors, cli.json).await
}

/// Run one task on a fresh scheduler until it finishes or a signal arrives
async fn submit_and_wait(
    config: &Config,
    kind: TaskKind,
    elements: Vec<TransferElement>,
    ignore_errors: bool,
    json: bool,
) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());
    let scheduler = Scheduler::start(&config.scheduler, Arc::clone(&metrics));
    let completion = Arc::new(Completion::new());
    let tracker: Arc<dyn ProgressTracker> = completion.clone();

    let task = TransferTask::builder()
        .id(Uuid::now_v7().to_string())
        .kind(kind)
        .elements(elements)
        .settings(EngineSettings::from(&config.engine))
        .ignore_errors(ignore_errors)
        .progress(tracker)
        .metrics(Arc::clone(&metrics))
        .build();

    let root = CancellationToken::new();
    scheduler.submit(&root, Arc::new(task))?;

    let interrupted = tokio::select! {
        _ = completion.finished.notified() => false,
        _ = shutdown_signal() => true,
    };
    if interrupted {
        root.cancel();
    }
    scheduler.shutdown().await;

    let outcome = completion.outcome();
    let summary = Summary {
        kind,
        interrupted,
        outcome: outcome.clone(),
        metrics: metrics.snapshot(),
    };
    info!(
        bytes = summary.metrics.bytes_transferred,
        elements_failed = summary.metrics.elements_failed,
        "Run summary"
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if interrupted {
        return Err("interrupted".into());
    }
    match outcome {
        Some(Outcome { error: Some(e), .. }) => Err(e.into()),
        Some(Outcome { failed, .. }) if !failed.is_empty() => {
            warn!(count = failed.len(), files = ?failed, "Some files were skipped");
            Ok(())
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    kind: TaskKind,
    interrupted: bool,
    #[serde(flatten)]
    outcome: Option<Outcome>,
    metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
struct Outcome {
    task_id: String,
    title: String,
    total_bytes: u64,
    transferred_bytes: u64,
    error: Option<String>,
    failed: Vec<String>,
}

/// Log progress and wake the caller once the task reports done
struct Completion {
    log: Throttled<LogProgress>,
    finished: Notify,
    outcome: Mutex<Option<Outcome>>,
}

impl Completion {
    fn new() -> Self {
        Self {
            log: Throttled::new(LogProgress),
            finished: Notify::new(),
            outcome: Mutex::new(None),
        }
    }

    fn outcome(&self) -> Option<Outcome> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressTracker for Completion {
    fn on_start(&self, info: &dyn TransferInfo) {
        self.log.on_start(info);
    }

    fn on_progress(&self, info: &dyn TransferInfo) {
        self.log.on_progress(info);
    }

    fn on_done(&self, info: &dyn TransferInfo, error: Option<&TransferError>) {
        self.log.on_done(info, error);
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(Outcome {
            task_id: info.task_id().to_string(),
            title: info.title().to_string(),
            total_bytes: info.total_bytes(),
            transferred_bytes: info.transferred_bytes(),
            error: error.map(ToString::to_string),
            failed: info.failed_files(),
        });
        // Stores a permit if the caller is not waiting yet
        self.finished.notify_one();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, cancelling");
}
