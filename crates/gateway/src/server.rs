use std::sync::Arc;

use {
    axum::{
        Router,
        routing::{get, post, put},
    },
    tracing::info,
};

use {
    zapgate_media::MediaResolver, zapgate_storage::Store, zapgate_supervisor::Supervisor,
};

use crate::{hub::RealtimeHub, media_routes, routes, ws};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub store: Arc<dyn Store>,
    pub resolver: Arc<MediaResolver>,
    pub hub: Arc<RealtimeHub>,
    pub http: reqwest::Client,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(routes::start_session))
        .route("/api/sessions/{user_id}", get(routes::persisted_sessions))
        .route("/api/sessions/{user_id}/live", get(routes::live_sessions))
        .route("/api/qr/{session_key}", get(routes::qr_image))
        .route("/api/contacts/{user_id}", get(routes::contacts))
        .route(
            "/api/contacts/{id}/{user_id}",
            put(routes::update_contact_alias),
        )
        .route(
            "/api/conversations/{user_id}/{contact}",
            get(routes::conversation),
        )
        .route("/api/send/{user_id}/text", post(routes::send_text))
        .route("/api/send/{user_id}/media", post(routes::send_media))
        .route(
            "/api/messages/{user_id}/{id}/redownload",
            post(media_routes::redownload),
        )
        .route("/uploads/{code}/{file_name}", get(media_routes::serve_upload))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Bind and serve until the shutdown future resolves.
pub async fn serve(
    state: AppState,
    bind: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, "gateway listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
