//! REST surface over the supervisor and store.

use std::{path::PathBuf, sync::Arc};

use {
    axum::{
        Json,
        extract::{Path, Query, State},
    },
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::info,
};

use zapgate_engine::{MediaKind, MediaSource, OutboundMedia};

use crate::{
    error::{ApiError, ApiResult},
    server::AppState,
};

#[derive(Debug, Deserialize)]
pub struct StartSessionBody {
    pub session_key: Option<String>,
    pub user_id: Option<i64>,
}

/// `POST /api/sessions` — bring a session up under a fresh or caller-chosen
/// key. The key is temporary; it is rekeyed to the account's phone number
/// once the QR scan completes.
pub async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSessionBody>,
) -> ApiResult<Json<Value>> {
    let user_id = body
        .user_id
        .ok_or_else(|| ApiError::validation("user_id is required"))?;
    let session_key = match body.session_key {
        Some(key) if !key.is_empty() => key,
        _ => uuid::Uuid::new_v4().simple().to_string(),
    };

    Arc::clone(&state.supervisor)
        .start(&session_key, user_id)
        .await?;

    info!(session_key, user_id, "session start accepted");
    Ok(Json(json!({ "ok": true, "session_key": session_key })))
}

/// `GET /api/sessions/{user_id}` — persisted session records.
pub async fn persisted_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let sessions = state.store.sessions_by_user(user_id).await?;
    Ok(Json(json!({ "ok": true, "sessions": sessions })))
}

/// `GET /api/sessions/{user_id}/live` — live registry entries.
pub async fn live_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let sessions = state.supervisor.live_sessions(user_id);
    Ok(Json(json!({ "ok": true, "sessions": sessions })))
}

/// `GET /api/qr/{session_key}` — stored QR image for a pending scan.
pub async fn qr_image(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> ApiResult<Json<Value>> {
    match state.supervisor.qr_image(&session_key) {
        Some(qr_code) => Ok(Json(json!({ "ok": true, "qr_code": qr_code }))),
        None => Err(ApiError::not_found(format!(
            "no QR image for session {session_key}"
        ))),
    }
}

/// `GET /api/contacts/{user_id}` — contact directory, most recent first.
pub async fn contacts(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let contacts = state.store.contacts_by_user(user_id).await?;
    Ok(Json(json!({ "ok": true, "contacts": contacts })))
}

#[derive(Debug, Deserialize)]
pub struct AliasBody {
    pub alias: String,
}

/// `PUT /api/contacts/{id}/{user_id}` — set a contact's alias.
pub async fn update_contact_alias(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(i64, i64)>,
    Json(body): Json<AliasBody>,
) -> ApiResult<Json<Value>> {
    if body.alias.is_empty() {
        return Err(ApiError::validation("alias is required"));
    }
    if !state
        .store
        .update_contact_alias(id, user_id, &body.alias)
        .await?
    {
        return Err(ApiError::not_found(format!("no contact {id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub limit: Option<u32>,
}

/// `GET /api/conversations/{user_id}/{contact}` — both directions of one
/// conversation, newest first.
pub async fn conversation(
    State(state): State<AppState>,
    Path((user_id, contact)): Path<(i64, String)>,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Json<Value>> {
    let limit = query.limit.unwrap_or(50);
    let messages = state.store.conversation(user_id, &contact, limit).await?;
    Ok(Json(json!({ "ok": true, "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub struct SendTextBody {
    pub session_key: String,
    pub to: String,
    pub text: String,
}

/// `POST /api/send/{user_id}/text` — send a text through the live session.
/// The engine echoes the sent message back, which is how it reaches the
/// message log (with `from_me` set), so there is a single append path.
pub async fn send_text(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(body): Json<SendTextBody>,
) -> ApiResult<Json<Value>> {
    if body.session_key.is_empty() || body.to.is_empty() || body.text.is_empty() {
        return Err(ApiError::validation("session_key, to and text are required"));
    }
    let receipt = state
        .supervisor
        .send_text(&body.session_key, &body.to, &body.text)
        .await?;
    info!(user_id, session_key = body.session_key, "text sent");
    Ok(Json(json!({ "ok": true, "message_id": receipt.message_id })))
}

#[derive(Debug, Deserialize)]
pub struct SendMediaBody {
    pub session_key: String,
    pub to: String,
    pub kind: MediaKind,
    /// Remote source: fetched over HTTP.
    pub url: Option<String>,
    /// Local source: a path readable by this process.
    pub path: Option<PathBuf>,
    pub mimetype: Option<String>,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    pub duration_secs: Option<u32>,
}

/// `POST /api/send/{user_id}/media` — send image/audio/video/document.
/// Bytes come from a URL or a server-local path; multipart parsing is
/// handled by the frontend proxy, not here.
pub async fn send_media(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(body): Json<SendMediaBody>,
) -> ApiResult<Json<Value>> {
    if body.session_key.is_empty() || body.to.is_empty() {
        return Err(ApiError::validation("session_key and to are required"));
    }

    let source = match (&body.url, &body.path) {
        (Some(url), None) => {
            let bytes = state
                .http
                .get(url.as_str())
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| ApiError::validation(format!("could not fetch media url: {e}")))?
                .bytes()
                .await
                .map_err(|e| ApiError::validation(format!("could not fetch media url: {e}")))?;
            MediaSource::Bytes(bytes.to_vec())
        },
        (None, Some(path)) => MediaSource::Path(path.clone()),
        _ => {
            return Err(ApiError::validation(
                "exactly one of url or path is required",
            ));
        },
    };

    let receipt = state
        .supervisor
        .send_media(
            &body.session_key,
            &body.to,
            OutboundMedia {
                kind: body.kind,
                source,
                mimetype: body.mimetype,
                caption: body.caption,
                file_name: body.file_name,
                duration_secs: body.duration_secs,
            },
        )
        .await?;
    info!(
        user_id,
        session_key = body.session_key,
        kind = body.kind.as_str(),
        "media sent"
    );
    Ok(Json(json!({ "ok": true, "message_id": receipt.message_id })))
}
