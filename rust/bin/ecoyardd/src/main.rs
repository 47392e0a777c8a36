//! `ecoyardd`: the recycling tracker server.
//!
//! Usage:
//!   ecoyardd [-c <context-name-or-path>] [--listen <addr>] [--in-memory]
//!
//! A context name resolves to `/etc/ecoyard/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly. A missing file
//! means defaults.

mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use ecoyard_core::Module;
use tracing::info;

use config::ServerConfig;

/// Recycling tracker server.
#[derive(Parser, Debug)]
#[command(name = "ecoyardd", about = "Recycling tracker server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", default_value = "./ecoyard.toml")]
    config: String,

    /// Listen address (overrides the config file).
    #[arg(long = "listen")]
    listen: Option<String>,

    /// Keep all documents in memory (overrides the config file).
    #[arg(long = "in-memory")]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;
    server_config.verify()?;

    let core_config = ecoyard_core::ServiceConfig {
        data_dir: Some(std::path::PathBuf::from(&server_config.storage.data_dir)),
        in_memory: cli.in_memory || server_config.storage.in_memory,
        listen: cli
            .listen
            .clone()
            .unwrap_or_else(|| server_config.server.listen.clone()),
        ..Default::default()
    };

    let kv: Arc<dyn ecoyard_kv::KVStore> = if core_config.in_memory {
        info!("Using in-memory document store");
        Arc::new(ecoyard_kv::MemoryKV::new())
    } else {
        if let Some(dir) = &core_config.data_dir {
            std::fs::create_dir_all(dir)?;
        }
        let db_path = core_config.resolve_db_path();
        info!("Opening document store at {}", db_path.display());
        Arc::new(
            ecoyard_kv::RedbStore::open(&db_path)
                .map_err(|e| anyhow::anyhow!("failed to open KV store: {}", e))?,
        )
    };

    let recycling_module = recycling::RecyclingModule::with_kv(kv)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load batches: {}", e))?;
    info!(
        "Recycling module initialized ({} batches)",
        recycling_module.tracker().batches().await.len()
    );

    let module_routes = vec![(recycling_module.name(), recycling_module.routes())];
    let app = routes::build_router(module_routes);

    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("ecoyardd listening on {}", core_config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
