use std::sync::Arc;

use {
    serde_json::json,
    tracing::{debug, warn},
};

use {
    zapgate_common::{
        Notifier, events,
        time::{iso8601, now_ms},
    },
    zapgate_engine::{InboundMessage, MediaKind, MediaRequest, jid},
    zapgate_media::MediaResolver,
    zapgate_registry::{SessionEntry, SessionRegistry},
    zapgate_storage::{NewContact, NewMessage, Store},
};

use crate::{Result, outcome::IngestOutcome};

/// Events older than this at arrival are dropped, so a bulk history replay
/// on reconnect cannot flood storage.
pub const FRESHNESS_WINDOW_MS: i64 = 96 * 60 * 60 * 1000;

/// The ingestion pipeline. One instance serves all sessions.
pub struct IngestPipeline {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn Store>,
    resolver: Arc<MediaResolver>,
    notifier: Arc<dyn Notifier>,
}

impl IngestPipeline {
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn Store>,
        resolver: Arc<MediaResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            store,
            resolver,
            notifier,
        }
    }

    /// Run one inbound event through every gate.
    ///
    /// `session_key` is the key the session was originally started under;
    /// the effective key is resolved through the pending index, so events
    /// arriving on a pre-auth key land under the rekeyed session.
    pub async fn ingest(
        &self,
        session_key: &str,
        message: &InboundMessage,
    ) -> Result<IngestOutcome> {
        // Gate 1: effective key. Unresolvable means authentication has not
        // completed; nothing may be persisted yet.
        let Some((effective_key, entry, phone_number)) = self.resolve(session_key) else {
            debug!(session_key, "dropping message before authentication");
            return Ok(IngestOutcome::Invalid);
        };
        let account_jid = entry
            .account_jid
            .clone()
            .unwrap_or_else(|| phone_number.clone());

        // Gate 2: required identifiers and a payload.
        let Some(payload) = &message.message else {
            return Ok(IngestOutcome::Invalid);
        };
        if message.key.id.is_empty() || message.key.remote_jid.is_empty() {
            return Ok(IngestOutcome::Invalid);
        }

        // Gate 3: dedup. The engine replays history; replays are no-ops.
        if self
            .store
            .message_exists(&message.key.id, &effective_key)
            .await?
        {
            return Ok(IngestOutcome::Duplicate);
        }

        // Gate 4: freshness.
        let now = now_ms();
        let timestamp = message
            .message_timestamp
            .map(|secs| secs * 1000)
            .unwrap_or(now);
        if timestamp < now - FRESHNESS_WINDOW_MS {
            return Ok(IngestOutcome::Stale);
        }

        // Classification.
        let remote = message.key.remote_jid.as_str();
        let (sender_party, recipient_party) = if message.key.from_me {
            (jid::SELF_PARTY, remote)
        } else {
            (remote, jid::SELF_PARTY)
        };

        self.store
            .insert_message(&NewMessage {
                message_id: message.key.id.clone(),
                sender_party: sender_party.to_string(),
                recipient_party: recipient_party.to_string(),
                content: payload.content_string(),
                kind: payload.kind(),
                timestamp,
                session_key: effective_key.clone(),
                phone_number: phone_number.clone(),
                account_jid: account_jid.clone(),
                user_id: entry.user_id,
            })
            .await?;

        let party_kind = jid::classify(remote);
        if party_kind == jid::PartyKind::Individual {
            let inserted = self
                .store
                .upsert_contact(&NewContact {
                    contact_party: remote.to_string(),
                    user_id: entry.user_id,
                    phone_number: phone_number.clone(),
                    jid: account_jid.clone(),
                })
                .await?;
            if let Some(id) = inserted {
                self.notifier
                    .emit(
                        events::NEW_CONTACT,
                        json!({
                            "id": id,
                            "contact": remote,
                            "phone_number": phone_number,
                            "jid": account_jid,
                            "user_id": entry.user_id,
                        }),
                    )
                    .await;
            }
        }

        self.dispatch(session_key, &effective_key, &entry, message, timestamp)
            .await;

        Ok(match party_kind {
            jid::PartyKind::Individual => IngestOutcome::InsertedIndividual,
            jid::PartyKind::Group => IngestOutcome::InsertedGroup,
            _ => IngestOutcome::InsertedBroadcast,
        })
    }

    /// Effective key, registry entry and phone number for an authenticated
    /// session, in one pass.
    fn resolve(&self, session_key: &str) -> Option<(String, SessionEntry, String)> {
        let effective_key = self.registry.resolve_pending(session_key)?;
        let entry = self.registry.get(&effective_key)?;
        let phone_number = entry.phone_number.clone()?;
        Some((effective_key, entry, phone_number))
    }

    /// Fan the persisted message out: materialize media when present,
    /// otherwise emit a lightweight preview straight from the content.
    async fn dispatch(
        &self,
        session_key: &str,
        effective_key: &str,
        entry: &SessionEntry,
        message: &InboundMessage,
        timestamp: i64,
    ) {
        let Some(payload) = &message.message else {
            return;
        };
        let raw = serde_json::to_value(message).unwrap_or(serde_json::Value::Null);
        let base = json!({
            "session_key": session_key,
            "current_session_key": effective_key,
            "message": raw,
            "timestamp": iso8601(timestamp),
            "from_app": message.from_app(),
            "user_id": entry.user_id,
        });

        if let Some((kind, part)) = payload.media() {
            let request = MediaRequest {
                key: message.key.clone(),
                message: payload.clone(),
            };
            match self.resolver.materialize(&request, kind, part).await {
                Ok(asset) => {
                    let mut event = base;
                    event["kind"] = json!(kind.as_str());
                    event["file_url"] = json!(asset.file_url);
                    event["mimetype"] = json!(asset.mimetype);
                    match kind {
                        MediaKind::Audio | MediaKind::Video => {
                            event["duration"] = json!(part.seconds);
                        },
                        MediaKind::Image | MediaKind::Document => {
                            event["caption"] = json!(part.caption.as_deref().unwrap_or(""));
                        },
                    }
                    self.notify_message(event, message, part.caption.as_deref(), entry)
                        .await;
                },
                Err(e) => {
                    warn!(
                        session_key = effective_key,
                        message_id = %message.key.id,
                        error = %e,
                        "media download failed"
                    );
                    // The persisted row is untouched; the file stays
                    // regenerable through redownload.
                    self.notifier
                        .emit(
                            events::ERROR,
                            json!({
                                "message": format!("failed to download {} message", kind.as_str()),
                                "error": e.to_string(),
                                "session_key": effective_key,
                                "user_id": entry.user_id,
                            }),
                        )
                        .await;
                },
            }
        } else {
            let mut event = base;
            event["kind"] = json!(payload.kind());
            event["file_url"] = json!("");
            self.notify_message(event, message, payload.body_text(), entry)
                .await;
        }
    }

    async fn notify_message(
        &self,
        event: serde_json::Value,
        message: &InboundMessage,
        preview: Option<&str>,
        entry: &SessionEntry,
    ) {
        self.notifier.emit(events::NEW_MESSAGE, event).await;
        self.notifier
            .emit(
                events::NEW_MESSAGE_NOTIFY,
                json!({
                    "remote_party": message.key.remote_jid,
                    "push_name": message.push_name,
                    "text": preview.unwrap_or_default(),
                    "user_id": entry.user_id,
                }),
            )
            .await;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use {
        zapgate_engine::{MessageKey, MessagePayload},
        zapgate_storage::SqliteStore,
    };

    use super::*;

    /// Notifier double that records every emitted event.
    struct Recorder {
        events: Mutex<Vec<(String, serde_json::Value)>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn emit(&self, event: &str, payload: serde_json::Value) {
            self.events.lock().unwrap().push((event.to_string(), payload));
        }
    }

    impl Recorder {
        fn named(&self, name: &str) -> Vec<serde_json::Value> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(e, _)| e == name)
                .map(|(_, p)| p.clone())
                .collect()
        }
    }

    struct StubFetcher {
        fail: bool,
    }

    #[async_trait]
    impl zapgate_engine::MediaFetcher for StubFetcher {
        async fn download_media(&self, _request: &MediaRequest) -> zapgate_engine::Result<Vec<u8>> {
            if self.fail {
                Err(zapgate_engine::Error::media_download("stream closed"))
            } else {
                Ok(b"bytes".to_vec())
            }
        }
    }

    struct Fixture {
        pipeline: IngestPipeline,
        registry: Arc<SessionRegistry>,
        store: Arc<SqliteStore>,
        notifier: Arc<Recorder>,
        _uploads: tempfile::TempDir,
    }

    async fn fixture(fail_media: bool) -> Fixture {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteStore::init(&pool).await.unwrap();
        let store = Arc::new(SqliteStore::with_pool(pool));

        let registry = Arc::new(SessionRegistry::new());
        registry.register("tmp-1", 7).unwrap();
        registry.rekey("tmp-1", "5511999990000");
        registry.mark_connected(
            "5511999990000",
            "5511999990000",
            "5511999990000:1@s.whatsapp.net",
        );

        let uploads = tempfile::tempdir().unwrap();
        let resolver = Arc::new(MediaResolver::new(
            Arc::new(StubFetcher { fail: fail_media }),
            uploads.path(),
        ));
        let notifier = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });

        Fixture {
            pipeline: IngestPipeline::new(
                Arc::clone(&registry),
                Arc::clone(&store) as Arc<dyn Store>,
                resolver,
                Arc::clone(&notifier) as Arc<dyn Notifier>,
            ),
            registry,
            store,
            notifier,
            _uploads: uploads,
        }
    }

    const REMOTE: &str = "5511888887777@s.whatsapp.net";

    fn text_message(id: &str, remote: &str, from_me: bool, ts_secs: i64) -> InboundMessage {
        InboundMessage {
            key: MessageKey {
                id: id.into(),
                remote_jid: remote.into(),
                from_me,
            },
            message: Some(
                serde_json::from_value(json!({ "conversation": "oi" })).unwrap(),
            ),
            message_timestamp: Some(ts_secs),
            push_name: Some("Maria".into()),
            status: None,
        }
    }

    fn now_secs() -> i64 {
        now_ms() / 1000
    }

    #[tokio::test]
    async fn individual_message_persists_and_emits_contact() {
        let f = fixture(false).await;

        let outcome = f
            .pipeline
            .ingest("tmp-1", &text_message("1", REMOTE, false, now_secs()))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::InsertedIndividual);

        let rows = f.store.conversation(7, REMOTE, 50).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sender_party, REMOTE);
        assert_eq!(rows[0].recipient_party, "me");
        assert_eq!(rows[0].session_key, "5511999990000");
        assert_eq!(rows[0].content, "oi");
        assert_eq!(rows[0].kind, "conversation");

        let contacts = f.notifier.named(events::NEW_CONTACT);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0]["contact"], REMOTE);
        assert_eq!(contacts[0]["phone_number"], "5511999990000");

        let notifies = f.notifier.named(events::NEW_MESSAGE_NOTIFY);
        assert_eq!(notifies.len(), 1);
        assert_eq!(notifies[0]["text"], "oi");
    }

    #[tokio::test]
    async fn replayed_message_is_a_noop() {
        let f = fixture(false).await;
        let message = text_message("1", REMOTE, false, now_secs());

        f.pipeline.ingest("tmp-1", &message).await.unwrap();
        let outcome = f.pipeline.ingest("tmp-1", &message).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Duplicate);

        assert_eq!(f.store.conversation(7, REMOTE, 50).await.unwrap().len(), 1);
        assert_eq!(f.notifier.named(events::NEW_CONTACT).len(), 1);
        assert_eq!(f.notifier.named(events::NEW_MESSAGE).len(), 1);
    }

    #[tokio::test]
    async fn stale_message_is_dropped() {
        let f = fixture(false).await;
        let five_days_ago = now_secs() - 5 * 24 * 60 * 60;

        let outcome = f
            .pipeline
            .ingest("tmp-1", &text_message("1", REMOTE, false, five_days_ago))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Stale);

        assert!(f.store.conversation(7, REMOTE, 50).await.unwrap().is_empty());
        assert!(f.notifier.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_before_authentication_is_dropped() {
        let f = fixture(false).await;
        f.registry.register("tmp-2", 8).unwrap();

        let outcome = f
            .pipeline
            .ingest("tmp-2", &text_message("1", REMOTE, false, now_secs()))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Invalid);
        assert!(f.store.conversation(8, REMOTE, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_message_skips_contact() {
        let f = fixture(false).await;

        let outcome = f
            .pipeline
            .ingest(
                "tmp-1",
                &text_message("1", "1234-5678@g.us", false, now_secs()),
            )
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::InsertedGroup);
        assert!(f.notifier.named(events::NEW_CONTACT).is_empty());

        let outcome = f
            .pipeline
            .ingest(
                "tmp-1",
                &text_message("2", "status@broadcast", false, now_secs()),
            )
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::InsertedBroadcast);
    }

    #[tokio::test]
    async fn own_message_swaps_parties_and_upserts_contact() {
        let f = fixture(false).await;

        let outcome = f
            .pipeline
            .ingest("tmp-1", &text_message("1", REMOTE, true, now_secs()))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::InsertedIndividual);

        let rows = f.store.conversation(7, REMOTE, 50).await.unwrap();
        assert_eq!(rows[0].sender_party, "me");
        assert_eq!(rows[0].recipient_party, REMOTE);
        assert_eq!(f.notifier.named(events::NEW_CONTACT).len(), 1);
    }

    #[tokio::test]
    async fn missing_payload_is_invalid() {
        let f = fixture(false).await;
        let mut message = text_message("1", REMOTE, false, now_secs());
        message.message = None;

        let outcome = f.pipeline.ingest("tmp-1", &message).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Invalid);
        assert!(f.store.conversation(7, REMOTE, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_timestamp_falls_back_to_arrival_time() {
        let f = fixture(false).await;
        let mut message = text_message("1", REMOTE, false, 0);
        message.message_timestamp = None;

        let outcome = f.pipeline.ingest("tmp-1", &message).await.unwrap();
        assert_eq!(outcome, IngestOutcome::InsertedIndividual);
    }

    fn image_message(id: &str) -> InboundMessage {
        let payload: MessagePayload = serde_json::from_value(json!({
            "imageMessage": {
                "mimetype": "image/jpeg",
                "caption": "holiday",
                "mediaKey": "c2VjcmV0",
            }
        }))
        .unwrap();
        InboundMessage {
            key: MessageKey {
                id: id.into(),
                remote_jid: REMOTE.into(),
                from_me: false,
            },
            message: Some(payload),
            message_timestamp: Some(now_secs()),
            push_name: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn media_message_is_materialized_and_enriched() {
        let f = fixture(false).await;

        let outcome = f.pipeline.ingest("tmp-1", &image_message("m1")).await.unwrap();
        assert_eq!(outcome, IngestOutcome::InsertedIndividual);

        let messages = f.notifier.named(events::NEW_MESSAGE);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["kind"], "image");
        assert_eq!(messages[0]["caption"], "holiday");
        let url = messages[0]["file_url"].as_str().unwrap();
        assert!(url.starts_with("/uploads/m/"));
        assert!(url.ends_with("-m1.jpg"));

        // The persisted content is the raw payload, so redownload stays
        // possible after the file is deleted.
        let rows = f.store.conversation(7, REMOTE, 50).await.unwrap();
        assert_eq!(rows[0].kind, "imageMessage");
        assert!(rows[0].content.contains("c2VjcmV0"));
    }

    #[tokio::test]
    async fn media_failure_keeps_row_and_emits_error() {
        let f = fixture(true).await;

        let outcome = f.pipeline.ingest("tmp-1", &image_message("m1")).await.unwrap();
        assert_eq!(outcome, IngestOutcome::InsertedIndividual);

        assert_eq!(f.store.conversation(7, REMOTE, 50).await.unwrap().len(), 1);
        assert!(f.notifier.named(events::NEW_MESSAGE).is_empty());
        let errors = f.notifier.named(events::ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["message"], "failed to download image message");
    }

    #[tokio::test]
    async fn audio_event_carries_duration() {
        let f = fixture(false).await;
        let payload: MessagePayload = serde_json::from_value(json!({
            "audioMessage": { "mimetype": "audio/ogg; codecs=opus", "seconds": 12 }
        }))
        .unwrap();
        let message = InboundMessage {
            key: MessageKey {
                id: "a1".into(),
                remote_jid: REMOTE.into(),
                from_me: false,
            },
            message: Some(payload),
            message_timestamp: Some(now_secs()),
            push_name: None,
            status: None,
        };

        f.pipeline.ingest("tmp-1", &message).await.unwrap();

        let messages = f.notifier.named(events::NEW_MESSAGE);
        assert_eq!(messages[0]["duration"], 12);
        assert!(
            messages[0]["file_url"]
                .as_str()
                .unwrap()
                .ends_with("-a1.ogg")
        );
    }
}
