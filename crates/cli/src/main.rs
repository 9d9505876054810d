use std::sync::Arc;

use {
    anyhow::Context,
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    zapgate_common::Notifier,
    zapgate_engine::{MediaFetcher, ProtocolEngine, SidecarEngine, sidecar::DEFAULT_SIDECAR_URL},
    zapgate_gateway::{AppState, GatewayConfig, RealtimeHub},
    zapgate_ingest::IngestPipeline,
    zapgate_media::MediaResolver,
    zapgate_registry::SessionRegistry,
    zapgate_storage::{SqliteStore, Store},
    zapgate_supervisor::Supervisor,
};

#[derive(Parser)]
#[command(name = "zapgate", about = "zapgate — multi-session WhatsApp gateway")]
struct Cli {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "ZAPGATE_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// SQLite database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite://zapgate.db?mode=rwc"
    )]
    database_url: String,

    /// Root directory for materialized media files.
    #[arg(long, env = "ZAPGATE_UPLOADS_DIR", default_value = "uploads")]
    uploads_dir: std::path::PathBuf,

    /// WebSocket URL of the protocol-engine sidecar.
    #[arg(long, env = "ZAPGATE_SIDECAR_URL", default_value = DEFAULT_SIDECAR_URL)]
    sidecar_url: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    let config = GatewayConfig {
        bind: cli.bind,
        database_url: cli.database_url,
        uploads_dir: cli.uploads_dir,
        sidecar_url: cli.sidecar_url,
    };

    let store = Arc::new(
        SqliteStore::new(&config.database_url)
            .await
            .context("opening database")?,
    );
    let engine = Arc::new(
        SidecarEngine::connect(&config.sidecar_url)
            .await
            .context("connecting to protocol-engine sidecar")?,
    );

    let registry = Arc::new(SessionRegistry::new());
    let hub = Arc::new(RealtimeHub::new());
    let resolver = Arc::new(MediaResolver::new(
        Arc::clone(&engine) as Arc<dyn MediaFetcher>,
        config.uploads_dir.clone(),
    ));
    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&registry),
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&resolver),
        Arc::clone(&hub) as Arc<dyn Notifier>,
    ));
    let supervisor = Arc::new(Supervisor::new(
        registry,
        Arc::clone(&engine) as Arc<dyn ProtocolEngine>,
        Arc::clone(&store) as Arc<dyn Store>,
        pipeline,
        Arc::clone(&hub) as Arc<dyn Notifier>,
    ));

    let state = AppState {
        supervisor,
        store,
        resolver,
        hub,
        http: reqwest::Client::new(),
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    };
    zapgate_gateway::serve(state, &config.bind, shutdown).await
}
