//! Terrain API service.
//!
//! HTTP server for terrain views (WTS), DEM downloads, terrain profiles
//! and TK25 sheet numbers.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use terrain_api::cleanup::{SweepConfig, SweepTask};
use terrain_api::config::AppConfig;
use terrain_api::routes::router;
use terrain_api::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "terrain-api")]
#[command(about = "Terrain visualization and elevation server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// YAML file overriding the environment configuration
    #[arg(short, long, env = "TERRAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Ok(threads_str) = env::var("TOKIO_WORKER_THREADS") {
        if let Ok(threads) = threads_str.parse::<usize>() {
            runtime_builder.worker_threads(threads);
        }
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))?;
    Ok(())
}

async fn async_main(args: Args) -> Result<()> {
    // Initialize tracing; RUST_LOG takes precedence over --log-level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("failed to install Prometheus recorder: {}", e))?;

    info!("Prometheus metrics exporter initialized");
    info!(config = ?args.config, "Starting terrain API server");

    let config = AppConfig::load(args.config.as_deref())?;
    let sweep_config = SweepConfig::from_env(&config.session);
    let state = Arc::new(AppState::new(config)?);

    tokio::spawn(SweepTask::new(state.clone(), sweep_config).run_forever());

    let app = router(state, prometheus_handle);

    let addr: SocketAddr = args.listen.parse()?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
