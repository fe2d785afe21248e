//! Async driver around the reconciliation store
//!
//! The store decides; `ChatClient` performs the I/O it asks for (history
//! fetches, `markSeen` frames, per-message seen marks, translations and cache
//! writes) and feeds the
//! results back in. The store lock is never held across an `.await`.

use crate::api::{HttpMessageApi, MessageApi};
use crate::cache::PeerCache;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::live::{EventStream, LiveChannel, OutgoingSender};
use crate::reconcile::{Effect, ReconciliationStore, TranslationJob};
use crate::throttle::TypingThrottle;
use crate::translate::{translate_or_original, LibreTranslate, Translator};
use parking_lot::{Mutex, MutexGuard};
use quickchat_common::{ClientEvent, Message, SendMessageInput, ServerEvent, UserId};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub struct ChatClient {
    store: Arc<Mutex<ReconciliationStore>>,
    api: Arc<dyn MessageApi>,
    translator: Arc<dyn Translator>,
    live: Option<OutgoingSender>,
    cache: PeerCache,
    translate_timeout: Duration,
    throttle: Mutex<TypingThrottle>,
    translations: Mutex<JoinSet<()>>,
}

impl ChatClient {
    pub fn new(
        identity: impl Into<UserId>,
        language: impl Into<String>,
        config: &ClientConfig,
        api: Arc<dyn MessageApi>,
        translator: Arc<dyn Translator>,
        live: Option<OutgoingSender>,
    ) -> Self {
        let identity = identity.into();
        let store = ReconciliationStore::new(identity.clone(), language)
            .with_typing_expiry(config.typing_expiry);
        Self {
            store: Arc::new(Mutex::new(store)),
            api,
            translator,
            live,
            cache: PeerCache::for_identity(config.cache_dir(), &identity),
            translate_timeout: config.translate_timeout,
            throttle: Mutex::new(TypingThrottle::new(config.typing_throttle)),
            translations: Mutex::new(JoinSet::new()),
        }
    }

    /// Sign in against a running server: HTTP store, LibreTranslate and a
    /// live channel. Returns the client and its pushed event stream.
    pub async fn connect(
        config: &ClientConfig,
        identity: &str,
        language: &str,
    ) -> Result<(Self, EventStream)> {
        let api = HttpMessageApi::new(&config.server_url, identity)?;
        let translator = LibreTranslate::new(config.translate_url.clone());
        let channel = LiveChannel::connect(&config.server_url, identity).await?;

        let client = Self::new(
            identity,
            language,
            config,
            Arc::new(api),
            Arc::new(translator),
            Some(channel.outgoing),
        );
        client.load_cache().await;
        if let Err(e) = client.refresh_conversations().await {
            warn!("Initial conversation list failed: {}", e);
        }
        info!("{} signed in", identity);
        Ok((client, channel.events))
    }

    /// Seed the store from the durable peer cache.
    pub async fn load_cache(&self) {
        let state = self.cache.load().await;
        self.store.lock().load_cache(state);
    }

    /// Read access to the reconciled state.
    pub fn state(&self) -> MutexGuard<'_, ReconciliationStore> {
        self.store.lock()
    }

    pub fn identity(&self) -> UserId {
        self.store.lock().viewer().to_string()
    }

    /// Translation target for messages folded from now on.
    pub fn set_language(&self, language: &str) {
        self.store.lock().set_language(language);
        info!("{} now reads in {}", self.identity(), language);
    }

    pub async fn open_conversation(&self, peer: &str) {
        let effects = self.store.lock().select_peer(peer);
        self.run_effects(effects).await;
    }

    pub fn close_conversation(&self) {
        self.store.lock().close();
    }

    /// Persist a message, showing it optimistically until the store answers.
    ///
    /// On failure the local entry is withdrawn and the error carries the
    /// unsent input. Nothing is resent automatically.
    pub async fn send(&self, peer: &str, mut input: SendMessageInput) -> Result<Message> {
        if input.sender_language.is_none() {
            let language = self.store.lock().language().to_string();
            input = input.with_language(language);
        }
        let token = self
            .store
            .lock()
            .begin_send(peer, input.clone())
            .ok_or(ClientError::EmptyMessage)?;

        match self.api.send(peer, &input).await {
            Ok(message) => {
                let effects = self.store.lock().complete_send(&token, message.clone());
                self.run_effects(effects).await;
                Ok(message)
            }
            Err(e) => {
                warn!("Send to {} failed: {}", peer, e);
                let unsent = self.store.lock().fail_send(&token).unwrap_or(input);
                Err(ClientError::Persistence {
                    reason: e.to_string(),
                    unsent,
                })
            }
        }
    }

    /// Fold one pushed event.
    pub async fn handle_event(&self, event: ServerEvent) {
        debug!("Live event {}", event.name());
        let effects = self.store.lock().apply_event(event, Instant::now());
        self.run_effects(effects).await;
    }

    /// Drain a live event stream until it ends.
    pub async fn run_live(&self, mut events: EventStream) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("Live stream ended for {}", self.identity());
    }

    pub async fn refresh_conversations(&self) -> Result<()> {
        let summaries = self.api.conversations().await?;
        let effects = self.store.lock().apply_conversation_list(summaries);
        self.run_effects(effects).await;
        Ok(())
    }

    /// Local keystroke in the composer for `peer`. Throttled.
    pub fn notify_typing(&self, peer: &str) {
        if !self.throttle.lock().should_send(peer, Instant::now()) {
            return;
        }
        self.emit(ClientEvent::Typing {
            to: peer.to_string(),
        });
    }

    /// Drop all state for this identity, including the cache file.
    pub async fn logout(&self) -> Result<()> {
        self.translations.lock().abort_all();
        self.store.lock().clear();
        self.throttle.lock().reset();
        self.cache.remove().await?;
        info!("{} signed out", self.identity());
        Ok(())
    }

    /// Wait for every translation started so far.
    pub async fn settle_translations(&self) {
        let mut pending = std::mem::take(&mut *self.translations.lock());
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!("Translation task failed: {}", e);
                }
            }
        }
    }

    async fn run_effects(&self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        let mut persist = false;

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::FetchHistory { peer, generation } => match self.api.history(&peer).await {
                    Ok(messages) => {
                        let more = self
                            .store
                            .lock()
                            .apply_snapshot(&peer, generation, messages);
                        queue.extend(more);
                    }
                    Err(e) => warn!("History fetch for {} failed: {}", peer, e),
                },
                Effect::NotifySeen { viewer, peer } => {
                    self.emit(ClientEvent::MarkSeen {
                        from: viewer,
                        to: peer,
                    });
                }
                Effect::MarkMessageSeen { peer, message_id } => {
                    match self.api.mark_seen(&message_id).await {
                        Ok(()) => {
                            self.store.lock().apply_message_seen(&peer, &message_id);
                        }
                        Err(e) => warn!("Marking {} seen failed: {}", message_id, e),
                    }
                }
                Effect::Translate(job) => self.spawn_translation(job),
                Effect::PersistCache => persist = true,
            }
        }

        if persist {
            let store = &self.store;
            let saved = self
                .cache
                .save_latest(|| store.lock().cache_state().clone())
                .await;
            if let Err(e) = saved {
                warn!("Failed to write peer cache {:?}: {}", self.cache.path(), e);
            }
        }
    }

    fn spawn_translation(&self, job: TranslationJob) {
        let store = self.store.clone();
        let translator = self.translator.clone();
        let timeout = self.translate_timeout;

        let mut translations = self.translations.lock();
        while let Some(finished) = translations.try_join_next() {
            if let Err(e) = finished {
                if !e.is_cancelled() {
                    warn!("Translation task failed: {}", e);
                }
            }
        }
        translations.spawn(async move {
            let text = translate_or_original(
                translator.as_ref(),
                &job.text,
                &job.source,
                &job.target,
                timeout,
            )
            .await;
            if text != job.text {
                store
                    .lock()
                    .apply_translation(&job.peer, &job.message_id, text);
            }
        });
    }

    fn emit(&self, event: ClientEvent) {
        match &self.live {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("Live channel closed, dropping outgoing event");
                }
            }
            None => debug!("No live channel, dropping outgoing event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::TranslationError;
    use async_trait::async_trait;
    use chrono::Utc;
    use quickchat_common::ConversationSummary;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeApi {
        history: Mutex<Vec<Message>>,
        history_calls: Mutex<usize>,
        marked: Mutex<Vec<String>>,
        fail_send: bool,
    }

    #[async_trait]
    impl MessageApi for FakeApi {
        async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
            Ok(Vec::new())
        }

        async fn history(&self, _peer: &str) -> Result<Vec<Message>> {
            *self.history_calls.lock() += 1;
            Ok(self.history.lock().clone())
        }

        async fn send(&self, peer: &str, input: &SendMessageInput) -> Result<Message> {
            if self.fail_send {
                return Err(ClientError::Api {
                    status: 500,
                    message: "disk full".into(),
                });
            }
            Ok(Message::new("alice", peer, input.clone()))
        }

        async fn mark_seen(&self, id: &str) -> Result<()> {
            self.marked.lock().push(id.to_string());
            Ok(())
        }
    }

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(&self, _: &str, _: &str, _: &str) -> std::result::Result<String, TranslationError> {
            Err(TranslationError::Status(500))
        }
    }

    struct Shouting;

    #[async_trait]
    impl Translator for Shouting {
        async fn translate(&self, text: &str, _: &str, _: &str) -> std::result::Result<String, TranslationError> {
            Ok(text.to_uppercase())
        }
    }

    fn incoming(id: &str, text: &str, language: &str) -> Message {
        Message {
            id: id.to_string(),
            sender_id: "bob".to_string(),
            receiver_id: "alice".to_string(),
            text: Some(text.to_string()),
            image_ref: None,
            sender_language: language.to_string(),
            created_at: Utc::now(),
            seen: false,
        }
    }

    fn make_client(
        temp_dir: &TempDir,
        api: Arc<FakeApi>,
        translator: Arc<dyn Translator>,
        language: &str,
    ) -> (ChatClient, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = ClientConfig::with_base_dir(temp_dir.path());
        let client = ChatClient::new("alice", language, &config, api, translator, Some(tx));
        (client, rx)
    }

    #[tokio::test]
    async fn test_open_emits_exactly_one_mark_seen() {
        let temp_dir = TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default());
        let (client, mut rx) = make_client(&temp_dir, api.clone(), Arc::new(Shouting), "en");

        for i in 1..=3 {
            client
                .handle_event(ServerEvent::NewMessage {
                    message: incoming(&format!("m{i}"), "hi", "en"),
                })
                .await;
        }
        assert_eq!(client.state().unseen("bob"), 3);
        assert_eq!(client.state().first_unread("bob"), Some("m1"));

        *api.history.lock() = vec![incoming("m1", "hi", "en")];
        client.open_conversation("bob").await;
        client.open_conversation("bob").await;

        let mut marks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            marks.push(event);
        }
        assert_eq!(
            marks,
            vec![ClientEvent::MarkSeen {
                from: "alice".into(),
                to: "bob".into()
            }]
        );
        assert_eq!(client.state().unseen("bob"), 0);
        assert_eq!(client.state().history("bob").len(), 1);
        assert_eq!(*api.history_calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_message_pushed_into_open_conversation_marked_seen() {
        let temp_dir = TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default());
        let (client, mut rx) = make_client(&temp_dir, api.clone(), Arc::new(Shouting), "en");

        client
            .handle_event(ServerEvent::NewMessage {
                message: incoming("m1", "closed", "en"),
            })
            .await;
        client.open_conversation("bob").await;
        client
            .handle_event(ServerEvent::NewMessage {
                message: incoming("m2", "open", "en"),
            })
            .await;

        assert_eq!(*api.marked.lock(), vec!["m2".to_string()]);
        let state = client.state();
        let entry = state.history("bob").iter().find(|e| e.message.id == "m2");
        assert!(entry.is_some_and(|e| e.message.seen));
        drop(state);

        // Still one markSeen frame for the open itself
        let mut frames = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, ClientEvent::MarkSeen { .. }));
            frames += 1;
        }
        assert_eq!(frames, 1);
    }

    #[tokio::test]
    async fn test_finished_translations_are_reaped() {
        let temp_dir = TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default());
        let (client, _rx) = make_client(&temp_dir, api, Arc::new(Shouting), "fr");
        client.open_conversation("bob").await;

        for i in 1..=5 {
            client
                .handle_event(ServerEvent::NewMessage {
                    message: incoming(&format!("m{i}"), "hello", "en"),
                })
                .await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(client.translations.lock().len(), 1);
        client.settle_translations().await;
        assert!(client
            .state()
            .history("bob")
            .iter()
            .all(|e| e.display_text() == Some("HELLO")));
    }

    #[tokio::test]
    async fn test_language_switch_applies_to_sends() {
        let temp_dir = TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default());
        let (client, _rx) = make_client(&temp_dir, api, Arc::new(Shouting), "en");
        client.open_conversation("bob").await;

        client.set_language("de");
        let sent = client
            .send("bob", SendMessageInput::text("hallo"))
            .await
            .unwrap();

        assert_eq!(sent.sender_language, "de");
        assert_eq!(client.state().language(), "de");
    }

    #[tokio::test]
    async fn test_failing_translator_shows_original() {
        let temp_dir = TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default());
        let (client, _rx) = make_client(&temp_dir, api, Arc::new(FailingTranslator), "fr");

        client.open_conversation("bob").await;
        client
            .handle_event(ServerEvent::NewMessage {
                message: incoming("m1", "hello", "en"),
            })
            .await;
        client.settle_translations().await;

        let state = client.state();
        assert_eq!(state.history("bob")[0].display_text(), Some("hello"));
    }

    #[tokio::test]
    async fn test_translation_replaces_text_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default());
        let (client, _rx) = make_client(&temp_dir, api, Arc::new(Shouting), "fr");

        client.open_conversation("bob").await;
        client
            .handle_event(ServerEvent::NewMessage {
                message: incoming("m1", "hello", "en"),
            })
            .await;
        client.settle_translations().await;

        assert_eq!(client.state().history("bob")[0].display_text(), Some("HELLO"));
    }

    #[tokio::test]
    async fn test_failed_send_returns_input() {
        let temp_dir = TempDir::new().unwrap();
        let api = Arc::new(FakeApi {
            fail_send: true,
            ..Default::default()
        });
        let (client, _rx) = make_client(&temp_dir, api, Arc::new(Shouting), "en");
        client.open_conversation("bob").await;

        let err = client
            .send("bob", SendMessageInput::text("keep me"))
            .await
            .unwrap_err();

        assert_eq!(
            err.unsent().and_then(|i| i.text.as_deref()),
            Some("keep me")
        );
        assert!(client.state().history("bob").is_empty());
    }

    #[tokio::test]
    async fn test_send_then_echo_one_copy() {
        let temp_dir = TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default());
        let (client, _rx) = make_client(&temp_dir, api, Arc::new(Shouting), "en");
        client.open_conversation("bob").await;

        let sent = client
            .send("bob", SendMessageInput::text("hello"))
            .await
            .unwrap();
        client
            .handle_event(ServerEvent::NewMessage {
                message: sent.clone(),
            })
            .await;

        let state = client.state();
        assert_eq!(state.history("bob").len(), 1);
        assert_eq!(state.history("bob")[0].message.id, sent.id);
        assert_eq!(state.history("bob")[0].message.sender_language, "en");
    }

    #[tokio::test]
    async fn test_typing_hints_throttled() {
        let temp_dir = TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default());
        let (client, mut rx) = make_client(&temp_dir, api, Arc::new(Shouting), "en");

        client.notify_typing("bob");
        client.notify_typing("bob");

        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEvent::Typing { to: "bob".into() }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cache_survives_restart_and_logout_clears() {
        let temp_dir = TempDir::new().unwrap();
        let api = Arc::new(FakeApi::default());
        {
            let (client, _rx) = make_client(&temp_dir, api.clone(), Arc::new(Shouting), "en");
            client
                .handle_event(ServerEvent::NewMessage {
                    message: incoming("m1", "hi", "en"),
                })
                .await;
        }

        let (client, _rx) = make_client(&temp_dir, api, Arc::new(Shouting), "en");
        client.load_cache().await;
        assert_eq!(client.state().unseen("bob"), 1);
        assert_eq!(client.state().first_unread("bob"), Some("m1"));

        client.logout().await.unwrap();
        assert_eq!(client.state().unseen("bob"), 0);
        client.load_cache().await;
        assert_eq!(client.state().unseen("bob"), 0);
    }
}
