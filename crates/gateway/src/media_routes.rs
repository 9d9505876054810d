//! Stored-media serving and redownload.

use {
    axum::{
        Json,
        extract::{Path, State},
        http::{StatusCode, header},
        response::IntoResponse,
    },
    serde_json::{Value, json},
    tracing::warn,
};

use {
    zapgate_common::{events, time::iso8601},
    zapgate_media::mime,
};

use crate::{
    error::{ApiError, ApiResult},
    server::AppState,
};

/// `GET /uploads/{code}/{file_name}` — serve a materialized media file.
pub async fn serve_upload(
    State(state): State<AppState>,
    Path((code, file_name)): Path<(String, String)>,
) -> impl IntoResponse {
    let Some(kind) = mime::kind_for_code(&code) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": "unknown media category" })),
        )
            .into_response();
    };

    let file_name = sanitize_file_name(&file_name);
    let path = state.resolver.stored_path(kind, &file_name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let extension = file_name.rsplit('.').next().unwrap_or("");
            let content_type = mime::content_type_for_extension(extension);
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        },
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": "file not found" })),
        )
            .into_response(),
    }
}

/// `POST /api/messages/{user_id}/{id}/redownload` — regenerate a media file
/// from a persisted row and announce the fresh URL to subscribers.
pub async fn redownload(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(i64, i64)>,
) -> ApiResult<Json<Value>> {
    let stored = state
        .store
        .message_by_id(id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no message {id}")))?;

    let (asset, part) = match state
        .resolver
        .redownload(&stored.message_id, &stored.account_jid, &stored.content)
        .await
    {
        Ok(result) => result,
        Err(e @ (zapgate_media::Error::NoMedia { .. } | zapgate_media::Error::InvalidContent(_))) => {
            return Err(ApiError::validation(e.to_string()));
        },
        Err(e) => {
            warn!(message_id = %stored.message_id, error = %e, "media redownload failed");
            state.hub.broadcast(
                events::ERROR,
                &json!({
                    "message": "failed to redownload media",
                    "error": e.to_string(),
                    "session_key": stored.session_key,
                    "user_id": user_id,
                }),
            );
            return Err(ApiError::Internal("media download failed".into()));
        },
    };

    state.hub.broadcast(
        events::MESSAGE_UPDATE,
        &json!({
            "id": stored.id,
            "session_key": stored.session_key,
            "kind": asset.kind.as_str(),
            "file_url": asset.file_url,
            "mimetype": asset.mimetype,
            "duration": part.seconds,
            "timestamp": iso8601(stored.timestamp),
            "remote_party": stored.sender_party,
            "user_id": user_id,
        }),
    );

    Ok(Json(json!({ "ok": true, "file_url": asset.file_url })))
}

/// Keep only safe filename characters; stored names are generated, so
/// anything else is a traversal attempt.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
