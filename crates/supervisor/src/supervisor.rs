use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    serde_json::json,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    zapgate_common::{Notifier, events},
    zapgate_engine::{
        EngineEvent, EngineHandle, EngineSession, OutboundMedia, ProtocolEngine, SentReceipt,
        SessionConfig,
    },
    zapgate_ingest::IngestPipeline,
    zapgate_registry::{SessionEntry, SessionRegistry},
    zapgate_storage::{NewSessionRecord, Store},
};

use crate::{Error, Result};

/// Recoverable disconnects are retried this many times before giving up.
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Fixed delay between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

struct LiveSession {
    handle: Arc<dyn EngineHandle>,
    cancel: CancellationToken,
}

/// Top-level orchestrator: owns the per-session receive loops and the map
/// of live engine handles.
pub struct Supervisor {
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn ProtocolEngine>,
    store: Arc<dyn Store>,
    pipeline: Arc<IngestPipeline>,
    notifier: Arc<dyn Notifier>,
    live: Mutex<HashMap<String, LiveSession>>,
}

impl Supervisor {
    pub fn new(
        registry: Arc<SessionRegistry>,
        engine: Arc<dyn ProtocolEngine>,
        store: Arc<dyn Store>,
        pipeline: Arc<IngestPipeline>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            engine,
            store,
            pipeline,
            notifier,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Bring a session up and spawn its receive loop.
    ///
    /// Engine construction failure purges the registry entry and propagates
    /// — the only fatal, caller-visible error path. Everything later is
    /// handled inside the loop.
    pub fn start<'a>(
        self: Arc<Self>,
        session_key: &'a str,
        user_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.registry.register(session_key, user_id)?;

            let session = match self
                .engine
                .connect(SessionConfig {
                    session_key: session_key.to_string(),
                    user_id,
                })
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    self.registry.remove(session_key);
                    return Err(Error::Engine(e));
                },
            };

            let cancel = CancellationToken::new();
            self.live.lock().unwrap().insert(
                session_key.to_string(),
                LiveSession {
                    handle: Arc::clone(&session.handle),
                    cancel: cancel.clone(),
                },
            );

            info!(session_key, user_id, "session started");

            let supervisor = Arc::clone(&self);
            let key = session_key.to_string();
            tokio::spawn(async move {
                supervisor.run_session(key, user_id, session, cancel).await;
            });
            Ok(())
        })
    }

    /// Cancel a session's receive loop and drop its state.
    pub fn stop(&self, session_key: &str) {
        if let Some(live) = self.live.lock().unwrap().remove(session_key) {
            live.cancel.cancel();
        }
        self.registry.remove(session_key);
        info!(session_key, "session stopped");
    }

    /// Stored QR image for a session awaiting scan.
    pub fn qr_image(&self, session_key: &str) -> Option<String> {
        self.registry.get(session_key).and_then(|e| e.qr_image)
    }

    /// Live registry entries for a user.
    pub fn live_sessions(&self, user_id: i64) -> Vec<SessionEntry> {
        self.registry.list_by_user(user_id)
    }

    pub async fn send_text(&self, session_key: &str, to: &str, text: &str) -> Result<SentReceipt> {
        let handle = self.handle_for(session_key)?;
        Ok(handle.send_text(to, text).await?)
    }

    pub async fn send_media(
        &self,
        session_key: &str,
        to: &str,
        media: OutboundMedia,
    ) -> Result<SentReceipt> {
        let handle = self.handle_for(session_key)?;
        Ok(handle.send_media(to, media).await?)
    }

    fn handle_for(&self, session_key: &str) -> Result<Arc<dyn EngineHandle>> {
        self.live
            .lock()
            .unwrap()
            .get(session_key)
            .map(|live| Arc::clone(&live.handle))
            .ok_or_else(|| Error::not_connected(session_key))
    }

    /// The per-session receive loop. `current_key` tracks the effective
    /// registry key, which moves from the original key to the phone number
    /// on successful authentication.
    async fn run_session(
        self: Arc<Self>,
        original_key: String,
        user_id: i64,
        mut session: EngineSession,
        cancel: CancellationToken,
    ) {
        let mut current_key = original_key.clone();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = session.events.recv() => event,
            };

            let Some(event) = event else {
                // Channel gone without a close event: the engine died out
                // from under us. Same path as a recoverable disconnect.
                warn!(session_key = %current_key, "engine event channel closed");
                match self
                    .reconnect(&original_key, &current_key, user_id, &cancel)
                    .await
                {
                    Some(next) => {
                        session = next;
                        continue;
                    },
                    None => break,
                }
            };

            match event {
                EngineEvent::QrChallenge { image } => {
                    self.registry.set_qr(&current_key, image.clone());
                    self.notifier
                        .emit(
                            events::QR_CODE,
                            json!({
                                "session_key": original_key,
                                "qr_code": image,
                                "user_id": user_id,
                            }),
                        )
                        .await;
                },
                EngineEvent::ConnectionOpen { identity } => {
                    self.on_connected(&original_key, &mut current_key, user_id, &identity)
                        .await;
                },
                EngineEvent::CredentialsUpdated => {
                    // Saved synchronously relative to the event, no batching.
                    if let Err(e) = session.handle.save_credentials().await {
                        warn!(session_key = %current_key, error = %e, "credential save failed");
                    }
                },
                EngineEvent::MessageReceived(message) => {
                    self.ingest_one(&original_key, &message).await;
                },
                EngineEvent::HistorySync { messages } => {
                    // Replayed history takes the same pipeline as live
                    // events; dedup and the staleness gate make it safe.
                    debug!(session_key = %current_key, count = messages.len(), "history sync");
                    for message in &messages {
                        self.ingest_one(&original_key, message).await;
                    }
                },
                EngineEvent::ConnectionClose { reason } => {
                    if reason.is_terminal() {
                        let pending = self
                            .on_logged_out(&original_key, &current_key, user_id, &session)
                            .await;
                        if let Some(pending) = pending {
                            let supervisor = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = supervisor
                                    .start(&pending.original_session_key, pending.user_id)
                                    .await
                                {
                                    warn!(
                                        session_key = %pending.original_session_key,
                                        error = %e,
                                        "restart after logout failed"
                                    );
                                }
                            });
                        }
                        break;
                    }
                    match self
                        .reconnect(&original_key, &current_key, user_id, &cancel)
                        .await
                    {
                        Some(next) => session = next,
                        None => break,
                    }
                },
            }
        }
    }

    async fn on_connected(
        &self,
        original_key: &str,
        current_key: &mut String,
        user_id: i64,
        identity: &zapgate_engine::EngineIdentity,
    ) {
        let phone_number = identity.phone_number();

        if phone_number != *current_key {
            if self.registry.rekey(current_key, &phone_number) {
                let mut live = self.live.lock().unwrap();
                if let Some(session) = live.remove(current_key.as_str()) {
                    live.insert(phone_number.clone(), session);
                }
            }
            *current_key = phone_number.clone();
        }

        self.registry
            .mark_connected(current_key, &phone_number, &identity.jid);

        match self
            .store
            .save_session(&NewSessionRecord {
                user_id,
                phone_number: phone_number.clone(),
                session_key: original_key.to_string(),
            })
            .await
        {
            Ok(Some(_)) => info!(session_key = %current_key, user_id, "session record persisted"),
            Ok(None) => {},
            Err(e) => warn!(session_key = %current_key, error = %e, "session record save failed"),
        }

        info!(session_key = original_key, phone_number = %phone_number, "connected");
        self.notifier
            .emit(
                events::CONNECTION_STATUS,
                json!({
                    "session_key": original_key,
                    "current_session_key": current_key,
                    "status": "connected",
                    "user_id": user_id,
                }),
            )
            .await;
    }

    /// Terminal logout: purge credentials and drop all session state.
    /// Returns the pending record when the session should restart under its
    /// original key.
    async fn on_logged_out(
        &self,
        original_key: &str,
        current_key: &str,
        user_id: i64,
        session: &EngineSession,
    ) -> Option<zapgate_registry::PendingSession> {
        if let Err(e) = session.handle.remove_credentials().await {
            warn!(session_key = current_key, error = %e, "credential purge failed");
        }

        self.live.lock().unwrap().remove(current_key);
        let pending = self.registry.finish_logout(current_key, original_key);

        self.notifier
            .emit(
                events::SESSION_DISCONNECTED,
                json!({ "session_key": current_key, "user_id": user_id }),
            )
            .await;

        match &pending {
            Some(pending) => info!(
                session_key = %pending.original_session_key,
                user_id = pending.user_id,
                "logged out, restarting under original key"
            ),
            None => info!(session_key = current_key, "logged out, session terminated"),
        }
        pending
    }

    /// Bounded reconnect: at most [`MAX_RECONNECT_ATTEMPTS`] tries, a fixed
    /// delay apart, driven by this loop rather than rescheduled callbacks.
    /// Returns the fresh session, or None once the budget is exhausted.
    async fn reconnect(
        &self,
        original_key: &str,
        current_key: &str,
        user_id: i64,
        cancel: &CancellationToken,
    ) -> Option<EngineSession> {
        loop {
            let attempt = self.registry.mark_reconnecting(current_key)?;
            if attempt > MAX_RECONNECT_ATTEMPTS {
                info!(session_key = current_key, "reconnect budget exhausted, giving up");
                self.live.lock().unwrap().remove(current_key);
                self.registry.remove(current_key);
                self.notifier
                    .emit(
                        events::SESSION_DISCONNECTED,
                        json!({ "session_key": current_key, "user_id": user_id }),
                    )
                    .await;
                return None;
            }

            info!(session_key = current_key, attempt, "reconnecting");
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {},
            }

            match self
                .engine
                .connect(SessionConfig {
                    session_key: original_key.to_string(),
                    user_id,
                })
                .await
            {
                Ok(session) => {
                    if let Some(live) = self.live.lock().unwrap().get_mut(current_key) {
                        live.handle = Arc::clone(&session.handle);
                    }
                    return Some(session);
                },
                Err(e) => {
                    warn!(session_key = current_key, attempt, error = %e, "reconnect failed");
                },
            }
        }
    }

    async fn ingest_one(&self, original_key: &str, message: &zapgate_engine::InboundMessage) {
        match self.pipeline.ingest(original_key, message).await {
            Ok(outcome) => {
                debug!(
                    session_key = original_key,
                    message_id = %message.key.id,
                    outcome = outcome.as_str(),
                    "message ingested"
                );
            },
            // Infra failure drops this event only; the stream continues.
            Err(e) => {
                warn!(
                    session_key = original_key,
                    message_id = %message.key.id,
                    error = %e,
                    "message dropped on infrastructure error"
                );
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use {async_trait::async_trait, tokio::sync::mpsc};

    use {
        zapgate_engine::{
            DisconnectReason, EngineIdentity, InboundMessage, MediaFetcher, MediaRequest,
            MessageKey, Result as EngineResult,
        },
        zapgate_media::MediaResolver,
        zapgate_registry::ConnectionState,
        zapgate_storage::{
            ContactRecord, NewContact, NewMessage, Result as StoreResult, SessionRecord,
            StoredMessage,
        },
    };

    use super::*;

    const JID: &str = "5511999990000:1@s.whatsapp.net";
    const PHONE: &str = "5511999990000";

    enum Script {
        Fail,
        Events(Vec<EngineEvent>),
    }

    #[derive(Default)]
    struct Counters {
        saves: AtomicUsize,
        removals: AtomicUsize,
    }

    /// Engine double: each connect call pops the next script entry. Event
    /// senders are kept alive so channels only close on drop of the engine.
    struct TestEngine {
        scripts: Mutex<VecDeque<Script>>,
        connects: Mutex<Vec<String>>,
        counters: Arc<Counters>,
        _senders: Mutex<Vec<mpsc::Sender<EngineEvent>>>,
    }

    impl TestEngine {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                connects: Mutex::new(Vec::new()),
                counters: Arc::new(Counters::default()),
                _senders: Mutex::new(Vec::new()),
            })
        }

        fn connect_keys(&self) -> Vec<String> {
            self.connects.lock().unwrap().clone()
        }
    }

    struct TestHandle {
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl EngineHandle for TestHandle {
        async fn send_text(&self, _to: &str, _text: &str) -> EngineResult<SentReceipt> {
            Ok(SentReceipt {
                message_id: "sent-1".into(),
            })
        }

        async fn send_media(&self, _to: &str, _media: OutboundMedia) -> EngineResult<SentReceipt> {
            Ok(SentReceipt {
                message_id: "sent-2".into(),
            })
        }

        async fn save_credentials(&self) -> EngineResult<()> {
            self.counters.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn remove_credentials(&self) -> EngineResult<()> {
            self.counters.removals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl ProtocolEngine for TestEngine {
        async fn connect(&self, config: SessionConfig) -> EngineResult<EngineSession> {
            self.connects.lock().unwrap().push(config.session_key);
            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(Script::Fail) => Err(zapgate_engine::Error::protocol("refused")),
                Some(Script::Events(events)) => {
                    let (tx, rx) = mpsc::channel(64);
                    for event in events {
                        tx.send(event).await.expect("scripted channel");
                    }
                    self._senders.lock().unwrap().push(tx);
                    Ok(EngineSession {
                        events: rx,
                        handle: Arc::new(TestHandle {
                            counters: Arc::clone(&self.counters),
                        }),
                    })
                },
                // Unscripted connects succeed with a quiet session.
                None => {
                    let (tx, rx) = mpsc::channel(64);
                    self._senders.lock().unwrap().push(tx);
                    Ok(EngineSession {
                        events: rx,
                        handle: Arc::new(TestHandle {
                            counters: Arc::clone(&self.counters),
                        }),
                    })
                },
            }
        }
    }

    struct NullFetcher;

    #[async_trait]
    impl MediaFetcher for NullFetcher {
        async fn download_media(&self, _request: &MediaRequest) -> EngineResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

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

    /// Store double backed by plain vectors. The tests run on a paused
    /// clock, so everything they await must stay inside the runtime; a
    /// real pool's worker thread would race the auto-advancing timer.
    #[derive(Default)]
    struct MemoryStore {
        messages: Mutex<Vec<StoredMessage>>,
        contacts: Mutex<Vec<ContactRecord>>,
        sessions: Mutex<Vec<SessionRecord>>,
    }

    #[async_trait]
    impl Store for MemoryStore {
        async fn message_exists(&self, message_id: &str, session_key: &str) -> StoreResult<bool> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .any(|m| m.message_id == message_id && m.session_key == session_key))
        }

        async fn insert_message(&self, message: &NewMessage) -> StoreResult<i64> {
            let mut messages = self.messages.lock().unwrap();
            let id = messages.len() as i64 + 1;
            messages.push(StoredMessage {
                id,
                message_id: message.message_id.clone(),
                sender_party: message.sender_party.clone(),
                recipient_party: message.recipient_party.clone(),
                content: message.content.clone(),
                kind: message.kind.clone(),
                timestamp: message.timestamp,
                session_key: message.session_key.clone(),
                phone_number: message.phone_number.clone(),
                account_jid: message.account_jid.clone(),
                user_id: message.user_id,
            });
            Ok(id)
        }

        async fn message_by_id(&self, id: i64, user_id: i64) -> StoreResult<Option<StoredMessage>> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .find(|m| m.id == id && m.user_id == user_id)
                .cloned())
        }

        async fn conversation(
            &self,
            user_id: i64,
            contact_party: &str,
            limit: u32,
        ) -> StoreResult<Vec<StoredMessage>> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| {
                    m.user_id == user_id
                        && (m.sender_party == contact_party || m.recipient_party == contact_party)
                })
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn upsert_contact(&self, contact: &NewContact) -> StoreResult<Option<i64>> {
            let mut contacts = self.contacts.lock().unwrap();
            if contacts.iter().any(|c| {
                c.contact_party == contact.contact_party
                    && c.user_id == contact.user_id
                    && c.phone_number == contact.phone_number
            }) {
                return Ok(None);
            }
            let id = contacts.len() as i64 + 1;
            contacts.push(ContactRecord {
                id,
                contact_party: contact.contact_party.clone(),
                user_id: contact.user_id,
                phone_number: contact.phone_number.clone(),
                jid: contact.jid.clone(),
                alias: None,
                last_seen: 0,
            });
            Ok(Some(id))
        }

        async fn contacts_by_user(&self, user_id: i64) -> StoreResult<Vec<ContactRecord>> {
            Ok(self
                .contacts
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn update_contact_alias(&self, id: i64, user_id: i64, alias: &str) -> StoreResult<bool> {
            let mut contacts = self.contacts.lock().unwrap();
            match contacts.iter_mut().find(|c| c.id == id && c.user_id == user_id) {
                Some(contact) => {
                    contact.alias = Some(alias.to_string());
                    Ok(true)
                },
                None => Ok(false),
            }
        }

        async fn save_session(&self, session: &NewSessionRecord) -> StoreResult<Option<i64>> {
            let mut sessions = self.sessions.lock().unwrap();
            if sessions
                .iter()
                .any(|s| s.user_id == session.user_id && s.phone_number == session.phone_number)
            {
                return Ok(None);
            }
            let id = sessions.len() as i64 + 1;
            sessions.push(SessionRecord {
                id,
                user_id: session.user_id,
                phone_number: session.phone_number.clone(),
                session_key: session.session_key.clone(),
            });
            Ok(Some(id))
        }

        async fn sessions_by_user(&self, user_id: i64) -> StoreResult<Vec<SessionRecord>> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    struct Fixture {
        supervisor: Arc<Supervisor>,
        registry: Arc<SessionRegistry>,
        store: Arc<MemoryStore>,
        engine: Arc<TestEngine>,
        notifier: Arc<Recorder>,
        _uploads: tempfile::TempDir,
    }

    async fn fixture(scripts: Vec<Script>) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let registry = Arc::new(SessionRegistry::new());
        let engine = TestEngine::new(scripts);
        let notifier = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        let uploads = tempfile::tempdir().unwrap();
        let resolver = Arc::new(MediaResolver::new(Arc::new(NullFetcher), uploads.path()));

        let pipeline = Arc::new(IngestPipeline::new(
            Arc::clone(&registry),
            Arc::clone(&store) as Arc<dyn Store>,
            resolver,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        ));

        Fixture {
            supervisor: Arc::new(Supervisor::new(
                Arc::clone(&registry),
                Arc::clone(&engine) as Arc<dyn ProtocolEngine>,
                Arc::clone(&store) as Arc<dyn Store>,
                pipeline,
                Arc::clone(&notifier) as Arc<dyn Notifier>,
            )),
            registry,
            store,
            engine,
            notifier,
            _uploads: uploads,
        }
    }

    /// Let spawned receive loops drain their scripted events. Time is
    /// paused, so each short sleep auto-advances the clock past the loops'
    /// own reconnect timers.
    async fn settle() {
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    fn open_event() -> EngineEvent {
        EngineEvent::ConnectionOpen {
            identity: EngineIdentity { jid: JID.into() },
        }
    }

    fn text_event(id: &str) -> EngineEvent {
        EngineEvent::MessageReceived(inbound(id))
    }

    fn inbound(id: &str) -> InboundMessage {
        InboundMessage {
            key: MessageKey {
                id: id.into(),
                remote_jid: "5511888887777@s.whatsapp.net".into(),
                from_me: false,
            },
            message: Some(serde_json::from_value(json!({ "conversation": "oi" })).unwrap()),
            message_timestamp: Some(zapgate_common::time::now_ms() / 1000),
            push_name: None,
            status: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn construction_failure_purges_entry_and_propagates() {
        let f = fixture(vec![Script::Fail]).await;

        let err = Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
        assert!(f.registry.get("tmp-1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_start_is_a_conflict() {
        let f = fixture(vec![Script::Events(vec![])]).await;

        Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap();
        let err = Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn qr_challenge_moves_to_awaiting_scan() {
        let f = fixture(vec![Script::Events(vec![EngineEvent::QrChallenge {
            image: "data:image/png;base64,QQ==".into(),
        }])])
        .await;

        Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap();
        settle().await;

        let entry = f.registry.get("tmp-1").unwrap();
        assert_eq!(entry.state, ConnectionState::AwaitingScan);
        assert_eq!(
            f.supervisor.qr_image("tmp-1").as_deref(),
            Some("data:image/png;base64,QQ==")
        );
        let events = f.notifier.named(events::QR_CODE);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["session_key"], "tmp-1");
    }

    #[tokio::test(start_paused = true)]
    async fn connection_open_rekeys_and_persists_session_record() {
        let f = fixture(vec![Script::Events(vec![open_event(), open_event()])]).await;

        Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap();
        settle().await;

        assert!(f.registry.get("tmp-1").is_none());
        let entry = f.registry.get(PHONE).unwrap();
        assert_eq!(entry.state, ConnectionState::Connected);
        assert_eq!(entry.phone_number.as_deref(), Some(PHONE));
        assert_eq!(entry.reconnect_count, 0);

        // Second open is idempotent: still one session record.
        let sessions = f.store.sessions_by_user(7).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].phone_number, PHONE);
        assert_eq!(sessions[0].session_key, "tmp-1");

        let statuses = f.notifier.named(events::CONNECTION_STATUS);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0]["session_key"], "tmp-1");
        assert_eq!(statuses[0]["current_session_key"], PHONE);

        // Sends route by the rekeyed key.
        assert!(f.supervisor.send_text(PHONE, "x", "hi").await.is_ok());
        assert!(matches!(
            f.supervisor.send_text("tmp-1", "x", "hi").await,
            Err(Error::NotConnected { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn credentials_are_saved_per_update() {
        let f = fixture(vec![Script::Events(vec![
            EngineEvent::CredentialsUpdated,
            EngineEvent::CredentialsUpdated,
        ])])
        .await;

        Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap();
        settle().await;

        assert_eq!(f.engine.counters.saves.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn messages_flow_through_the_pipeline() {
        let f = fixture(vec![Script::Events(vec![
            open_event(),
            text_event("m1"),
            EngineEvent::HistorySync {
                messages: vec![inbound("m1"), inbound("m2")],
            },
        ])])
        .await;

        Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap();
        settle().await;

        // m1 deduped across live + history; m2 from history only.
        assert!(f.store.message_exists("m1", PHONE).await.unwrap());
        assert!(f.store.message_exists("m2", PHONE).await.unwrap());
        assert_eq!(
            f.store
                .conversation(7, "5511888887777@s.whatsapp.net", 50)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recoverable_close_retries_at_most_three_times() {
        let f = fixture(vec![
            Script::Events(vec![EngineEvent::ConnectionClose {
                reason: DisconnectReason::Recoverable {
                    message: "stream error".into(),
                },
            }]),
            Script::Fail,
            Script::Fail,
            Script::Fail,
        ])
        .await;

        Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap();
        settle().await;

        // Initial connect plus exactly three reconnect attempts.
        assert_eq!(f.engine.connect_keys(), vec!["tmp-1"; 4]);
        assert!(f.registry.get("tmp-1").is_none(), "entry removed after give-up");
        assert_eq!(f.notifier.named(events::SESSION_DISCONNECTED).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_success_resumes_the_loop() {
        let f = fixture(vec![
            Script::Events(vec![EngineEvent::ConnectionClose {
                reason: DisconnectReason::Recoverable {
                    message: "stream error".into(),
                },
            }]),
            Script::Events(vec![open_event()]),
        ])
        .await;

        Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap();
        settle().await;

        assert_eq!(f.engine.connect_keys().len(), 2);
        let entry = f.registry.get(PHONE).unwrap();
        assert_eq!(entry.state, ConnectionState::Connected);
        assert_eq!(entry.reconnect_count, 0, "connect resets the counter");
    }

    #[tokio::test(start_paused = true)]
    async fn logout_restarts_under_the_original_key() {
        let f = fixture(vec![Script::Events(vec![
            open_event(),
            EngineEvent::ConnectionClose {
                reason: DisconnectReason::LoggedOut,
            },
        ])])
        .await;

        Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap();
        settle().await;

        // Credentials purged, rekeyed entry gone, restarted under "tmp-1".
        assert_eq!(f.engine.counters.removals.load(Ordering::SeqCst), 1);
        assert!(f.registry.get(PHONE).is_none());
        let entry = f.registry.get("tmp-1").unwrap();
        assert_eq!(entry.user_id, 7);
        assert_eq!(entry.state, ConnectionState::Initializing);
        assert_eq!(f.engine.connect_keys(), vec!["tmp-1", "tmp-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_loop_and_clears_state() {
        let f = fixture(vec![Script::Events(vec![])]).await;

        Arc::clone(&f.supervisor).start("tmp-1", 7).await.unwrap();
        f.supervisor.stop("tmp-1");
        settle().await;

        assert!(f.registry.get("tmp-1").is_none());
        assert!(matches!(
            f.supervisor.send_text("tmp-1", "x", "hi").await,
            Err(Error::NotConnected { .. })
        ));
    }
}
