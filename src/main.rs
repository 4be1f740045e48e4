use std::{path::PathBuf, time::Duration};

use clap::Parser;
use docpurge::{
    AppState, build_app,
    config::{DocPurgeConfig, PurgeOverrides},
    db::DbPool,
    observability,
    purge::{PurgeError, PurgeRunner, start_purge_worker},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// How long shutdown waits for in-flight purge runs.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// CLI arguments for docpurge
#[derive(Parser, Debug)]
#[command(version, about = "Retention-based purge of soft-deleted documents", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Run one purge in the foreground and print its report as JSON
    ///
    /// Exits 1 if the run could not start and 2 if any batch failed.
    Purge {
        /// Days a soft-deleted document is kept
        #[arg(long)]
        retention_days: Option<u32>,
        /// Records per batch
        #[arg(long)]
        batch_size: Option<u32>,
        /// Extra attempts per failed batch
        #[arg(long)]
        max_retries: Option<u32>,
        /// Page through eligible records without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Run database migrations and exit
    ///
    /// Useful for Kubernetes init containers or CI/CD pipelines.
    Migrate,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(args.config.as_ref());

    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Failed to initialize tracing: {e}");
        std::process::exit(1);
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Purge {
            retention_days,
            batch_size,
            max_retries,
            dry_run,
        } => {
            let overrides = PurgeOverrides {
                retention_days,
                batch_size,
                max_retries,
                dry_run: dry_run.then_some(true),
            };
            run_purge(config, overrides).await
        }
        Command::Migrate => run_migrate(config).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> DocPurgeConfig {
    let Some(path) = path else {
        return DocPurgeConfig::default();
    };

    match DocPurgeConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

/// Connect to the configured database or exit.
async fn connect(config: &DocPurgeConfig) -> DbPool {
    if config.database.is_none() {
        eprintln!("Error: Database is not configured.");
        std::process::exit(1);
    }

    match DbPool::from_config(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_server(config: DocPurgeConfig) {
    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::error!(error = %e, "Failed to initialize metrics");
        std::process::exit(1);
    }

    let state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize application state");
            std::process::exit(1);
        }
    };

    let task_tracker = state.task_tracker.clone();
    let shutdown = CancellationToken::new();

    if let Some(runner) = &state.purge {
        task_tracker.spawn(start_purge_worker(
            runner.clone(),
            config.purge.clone(),
            shutdown.clone(),
        ));
    }

    let app = build_app(&config, state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_addr, error = %e, "Failed to bind to address");
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    // Graceful shutdown: wait for SIGINT/SIGTERM, then for in-flight purges
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(task_tracker, shutdown))
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal(task_tracker: TaskTracker, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received, waiting for in-flight purge runs to complete...");

    // Stops the scheduled worker after its current run. No new runs can be
    // spawned once the tracker is closed.
    shutdown.cancel();
    task_tracker.close();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, task_tracker.wait()).await {
        Ok(()) => tracing::info!("All background tasks completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for purge runs, some batches may not have completed")
        }
    }

    tracing::info!("Shutdown complete");
}

async fn run_purge(config: DocPurgeConfig, overrides: PurgeOverrides) {
    let db = connect(&config).await;
    let runner = PurgeRunner::new(db.documents());
    let purge_config = config.purge.with_overrides(&overrides);

    match runner.run_now(purge_config).await {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!(error = %e, "Failed to serialize purge report"),
            }
            if report.result.has_errors() {
                std::process::exit(2);
            }
        }
        Err(e) => {
            if !matches!(e, PurgeError::InvalidConfig(_)) {
                tracing::error!(error = %e, "Purge run failed to start");
            }
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_migrate(config: DocPurgeConfig) {
    tracing::info!("Running database migrations");

    let db = connect(&config).await;
    match db.run_migrations().await {
        Ok(()) => tracing::info!("Database migrations completed successfully"),
        Err(e) => {
            tracing::error!(error = %e, "Database migrations failed");
            eprintln!("Error: Database migrations failed: {e}");
            std::process::exit(1);
        }
    }
}
