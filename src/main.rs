use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use step_result_cache::cache::disk::JsonStepStore;
use step_result_cache::cache::memory::MemoryStepStore;
use step_result_cache::cache::StepStore;
use step_result_cache::models::ServerConfig;
use step_result_cache::reporter::BroadcastReporter;
use step_result_cache::server::{create_router, AppState};
use step_result_cache::service::StepService;

#[derive(Debug, Parser)]
#[command(name = "step-cache", about = "Job-scoped test-step result cache")]
struct Cli {
    /// Path to a JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Persist step records under this directory instead of memory only.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Sliding per-job time-to-live in seconds.
    #[arg(long)]
    ttl_secs: Option<u64>,

    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => ServerConfig::default(),
    };

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = Some(data_dir.clone());
    }
    if let Some(ttl_secs) = cli.ttl_secs {
        config.job_ttl_secs = ttl_secs;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let config = Arc::new(load_config(&cli)?);
    let ttl = Duration::from_secs(config.job_ttl_secs);

    let store: Arc<dyn StepStore> = match &config.data_dir {
        Some(data_dir) => {
            tracing::info!("Persisting step records under {}", data_dir.display());
            Arc::new(JsonStepStore::new(data_dir.clone(), ttl).await?)
        }
        None => Arc::new(MemoryStepStore::new(ttl)),
    };

    let reporter = Arc::new(BroadcastReporter::new(config.broadcast_capacity));
    let service = Arc::new(StepService::new(store.clone(), reporter));

    // background sweep reclaiming expired jobs
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    let sweep_store = store.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await; // the first tick fires immediately
        loop {
            ticker.tick().await;
            match sweep_store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!("Purged {} expired job(s)", purged),
                Err(e) => tracing::error!("Expiry sweep failed: {}", e),
            }
        }
    });

    let state = Arc::new(AppState {
        service,
        config: config.clone(),
        start_time: Instant::now(),
    });
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
