use std::path::PathBuf;

/// Runtime configuration, filled in by the CLI.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to.
    pub bind: String,
    /// SQLite database URL.
    pub database_url: String,
    /// Root directory for materialized media files.
    pub uploads_dir: PathBuf,
    /// WebSocket URL of the protocol-engine sidecar.
    pub sidecar_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            database_url: "sqlite://zapgate.db?mode=rwc".into(),
            uploads_dir: PathBuf::from("uploads"),
            sidecar_url: zapgate_engine::sidecar::DEFAULT_SIDECAR_URL.into(),
        }
    }
}
