//! WebSocket client for the Baileys sidecar process.
//!
//! The sidecar owns the actual protocol sockets; this client speaks a small
//! JSON frame protocol to it: session commands flow out, per-session events
//! flow back, and request/reply pairs are correlated by UUID.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    futures::{SinkExt, StreamExt},
    serde::{Deserialize, Serialize},
    tokio::sync::{mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use crate::{
    Error, Result,
    traits::{
        DisconnectReason, EngineEvent, EngineHandle, EngineIdentity, EngineSession, MediaFetcher,
        MediaSource, OutboundMedia, ProtocolEngine, SentReceipt, SessionConfig,
    },
    types::{InboundMessage, MediaKind, MediaRequest},
};

/// Default WebSocket URL of the sidecar.
pub const DEFAULT_SIDECAR_URL: &str = "ws://127.0.0.1:8777";

/// Commands sent to the sidecar.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Command {
    Start {
        session_key: String,
    },
    SendText {
        request_id: String,
        session_key: String,
        to: String,
        text: String,
    },
    SendMedia {
        request_id: String,
        session_key: String,
        to: String,
        kind: MediaKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        mimetype: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<u32>,
        /// Base64-encoded payload bytes.
        bytes: String,
    },
    SaveCreds {
        request_id: String,
        session_key: String,
    },
    RemoveCreds {
        request_id: String,
        session_key: String,
    },
    DownloadMedia {
        request_id: String,
        message: MediaRequest,
    },
}

/// Frames received from the sidecar.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SidecarFrame {
    Qr {
        session_key: String,
        image: String,
    },
    Open {
        session_key: String,
        jid: String,
    },
    Close {
        session_key: String,
        #[serde(default)]
        logged_out: bool,
        message: Option<String>,
    },
    Creds {
        session_key: String,
    },
    Message {
        session_key: String,
        message: InboundMessage,
    },
    History {
        session_key: String,
        #[serde(default)]
        messages: Vec<InboundMessage>,
    },
    Ack {
        request_id: String,
        #[serde(default)]
        ok: bool,
        message_id: Option<String>,
        /// Base64-encoded reply payload (media downloads).
        data: Option<String>,
        error: Option<String>,
    },
}

#[derive(Debug)]
struct Ack {
    ok: bool,
    message_id: Option<String>,
    data: Option<String>,
    error: Option<String>,
}

struct Shared {
    out: mpsc::Sender<Message>,
    pending: Mutex<HashMap<String, oneshot::Sender<Ack>>>,
    sessions: Mutex<HashMap<String, mpsc::Sender<EngineEvent>>>,
}

/// Engine implementation backed by a sidecar WebSocket connection.
pub struct SidecarEngine {
    shared: Arc<Shared>,
}

impl SidecarEngine {
    /// Connect to a running sidecar and start the read/write pumps.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = connect_async(url).await?;
        let (mut sink, mut stream) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);
        let shared = Arc::new(Shared {
            out: out_tx,
            pending: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        });

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let reader = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(txt)) => route_frame(&reader, txt.as_str()).await,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {},
                    Err(e) => {
                        warn!(error = %e, "sidecar read error");
                        break;
                    },
                }
            }
            // Dropping the waiters fails all in-flight requests; dropping
            // the session senders ends every receive loop.
            reader.pending.lock().unwrap().clear();
            reader.sessions.lock().unwrap().clear();
            info!("sidecar connection closed");
        });

        info!(url, "connected to sidecar");
        Ok(Self { shared })
    }
}

async fn route_frame(shared: &Arc<Shared>, raw: &str) {
    let frame: SidecarFrame = match serde_json::from_str(raw) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "unparseable sidecar frame");
            return;
        },
    };

    match frame {
        SidecarFrame::Qr { session_key, image } => {
            forward(shared, &session_key, EngineEvent::QrChallenge { image }).await;
        },
        SidecarFrame::Open { session_key, jid } => {
            forward(
                shared,
                &session_key,
                EngineEvent::ConnectionOpen {
                    identity: EngineIdentity { jid },
                },
            )
            .await;
        },
        SidecarFrame::Close {
            session_key,
            logged_out,
            message,
        } => {
            let reason = if logged_out {
                DisconnectReason::LoggedOut
            } else {
                DisconnectReason::Recoverable {
                    message: message.unwrap_or_else(|| "connection closed".into()),
                }
            };
            forward(shared, &session_key, EngineEvent::ConnectionClose { reason }).await;
        },
        SidecarFrame::Creds { session_key } => {
            forward(shared, &session_key, EngineEvent::CredentialsUpdated).await;
        },
        SidecarFrame::Message {
            session_key,
            message,
        } => {
            forward(shared, &session_key, EngineEvent::MessageReceived(message)).await;
        },
        SidecarFrame::History {
            session_key,
            messages,
        } => {
            forward(shared, &session_key, EngineEvent::HistorySync { messages }).await;
        },
        SidecarFrame::Ack {
            request_id,
            ok,
            message_id,
            data,
            error,
        } => {
            let waiter = shared.pending.lock().unwrap().remove(&request_id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(Ack {
                        ok,
                        message_id,
                        data,
                        error,
                    });
                },
                None => debug!(request_id, "ack for unknown request"),
            }
        },
    }
}

async fn forward(shared: &Arc<Shared>, session_key: &str, event: EngineEvent) {
    let tx = shared.sessions.lock().unwrap().get(session_key).cloned();
    match tx {
        Some(tx) => {
            if tx.send(event).await.is_err() {
                shared.sessions.lock().unwrap().remove(session_key);
            }
        },
        None => debug!(session_key, "event for unknown session"),
    }
}

impl Shared {
    async fn send_command(&self, command: &Command) -> Result<()> {
        let json = serde_json::to_string(command)?;
        self.out
            .send(Message::text(json))
            .await
            .map_err(|_| Error::protocol("sidecar connection closed"))
    }

    async fn request(&self, request_id: String, command: Command) -> Result<Ack> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(request_id.clone(), tx);
        if let Err(e) = self.send_command(&command).await {
            self.pending.lock().unwrap().remove(&request_id);
            return Err(e);
        }
        rx.await
            .map_err(|_| Error::protocol("sidecar connection closed before reply"))
    }
}

#[async_trait::async_trait]
impl ProtocolEngine for SidecarEngine {
    async fn connect(&self, config: SessionConfig) -> Result<EngineSession> {
        let (tx, rx) = mpsc::channel(256);
        self.shared
            .sessions
            .lock()
            .unwrap()
            .insert(config.session_key.clone(), tx);

        let start = Command::Start {
            session_key: config.session_key.clone(),
        };
        if let Err(e) = self.shared.send_command(&start).await {
            self.shared
                .sessions
                .lock()
                .unwrap()
                .remove(&config.session_key);
            return Err(e);
        }

        Ok(EngineSession {
            events: rx,
            handle: Arc::new(SidecarHandle {
                session_key: config.session_key,
                shared: Arc::clone(&self.shared),
            }),
        })
    }
}

#[async_trait::async_trait]
impl MediaFetcher for SidecarEngine {
    async fn download_media(&self, request: &MediaRequest) -> Result<Vec<u8>> {
        let request_id = Uuid::new_v4().to_string();
        let ack = self
            .shared
            .request(
                request_id.clone(),
                Command::DownloadMedia {
                    request_id,
                    message: request.clone(),
                },
            )
            .await?;
        if !ack.ok {
            return Err(Error::media_download(
                ack.error.unwrap_or_else(|| "engine refused download".into()),
            ));
        }
        let data = ack
            .data
            .ok_or_else(|| Error::media_download("reply carried no payload"))?;
        BASE64
            .decode(data)
            .map_err(|e| Error::media_download(format!("invalid payload encoding: {e}")))
    }
}

/// Per-session control handle over the shared sidecar connection.
pub struct SidecarHandle {
    session_key: String,
    shared: Arc<Shared>,
}

impl SidecarHandle {
    fn receipt(ack: Ack) -> Result<SentReceipt> {
        if ack.ok {
            Ok(SentReceipt {
                message_id: ack.message_id.unwrap_or_default(),
            })
        } else {
            Err(Error::protocol(
                ack.error.unwrap_or_else(|| "send rejected".into()),
            ))
        }
    }

    async fn acked(&self, request_id: String, command: Command) -> Result<()> {
        let ack = self.shared.request(request_id, command).await?;
        if ack.ok {
            Ok(())
        } else {
            Err(Error::protocol(
                ack.error.unwrap_or_else(|| "command rejected".into()),
            ))
        }
    }
}

#[async_trait::async_trait]
impl EngineHandle for SidecarHandle {
    async fn send_text(&self, to: &str, text: &str) -> Result<SentReceipt> {
        let request_id = Uuid::new_v4().to_string();
        let ack = self
            .shared
            .request(
                request_id.clone(),
                Command::SendText {
                    request_id,
                    session_key: self.session_key.clone(),
                    to: to.to_string(),
                    text: text.to_string(),
                },
            )
            .await?;
        Self::receipt(ack)
    }

    async fn send_media(&self, to: &str, media: OutboundMedia) -> Result<SentReceipt> {
        let bytes = match media.source {
            MediaSource::Path(path) => tokio::fs::read(path).await?,
            MediaSource::Bytes(bytes) => bytes,
        };
        let request_id = Uuid::new_v4().to_string();
        let ack = self
            .shared
            .request(
                request_id.clone(),
                Command::SendMedia {
                    request_id,
                    session_key: self.session_key.clone(),
                    to: to.to_string(),
                    kind: media.kind,
                    mimetype: media.mimetype,
                    caption: media.caption,
                    file_name: media.file_name,
                    duration: media.duration_secs,
                    bytes: BASE64.encode(bytes),
                },
            )
            .await?;
        Self::receipt(ack)
    }

    async fn save_credentials(&self) -> Result<()> {
        let request_id = Uuid::new_v4().to_string();
        self.acked(
            request_id.clone(),
            Command::SaveCreds {
                request_id,
                session_key: self.session_key.clone(),
            },
        )
        .await
    }

    async fn remove_credentials(&self) -> Result<()> {
        let request_id = Uuid::new_v4().to_string();
        self.acked(
            request_id.clone(),
            Command::RemoveCreds {
                request_id,
                session_key: self.session_key.clone(),
            },
        )
        .await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_deserialize() {
        let f: SidecarFrame = serde_json::from_str(
            r#"{"type":"close","session_key":"abc","logged_out":true}"#,
        )
        .unwrap();
        assert!(matches!(
            f,
            SidecarFrame::Close {
                logged_out: true,
                ..
            }
        ));

        let f: SidecarFrame = serde_json::from_str(
            r#"{"type":"message","session_key":"abc","message":{
                "key":{"id":"1","remoteJid":"551199@s.whatsapp.net","fromMe":false},
                "message":{"conversation":"oi"},
                "messageTimestamp":1700000000
            }}"#,
        )
        .unwrap();
        match f {
            SidecarFrame::Message { message, .. } => {
                assert_eq!(message.key.id, "1");
                assert_eq!(
                    message.message.unwrap().body_text(),
                    Some("oi")
                );
            },
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[test]
    fn commands_serialize_with_tag() {
        let cmd = Command::Start {
            session_key: "abc".into(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "start");
        assert_eq!(json["session_key"], "abc");

        let cmd = Command::DownloadMedia {
            request_id: "r1".into(),
            message: MediaRequest::new(
                "m1",
                "551199@s.whatsapp.net",
                crate::types::MessagePayload::with_media(
                    MediaKind::Image,
                    crate::types::MediaPart::default(),
                ),
            ),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "download_media");
        assert_eq!(json["message"]["key"]["id"], "m1");
    }
}
