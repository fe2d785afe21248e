use super::types::{
    ConversationStatus, Effect, HistoryEntry, PeerCacheState, SendToken, TranslationJob,
};
use quickchat_common::{
    ConversationSummary, Message, MessageId, SendMessageInput, ServerEvent, UserId,
    DEFAULT_LANGUAGE,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Prefix of ids given to optimistic local entries.
pub const LOCAL_ID_PREFIX: &str = "local-";

const DEFAULT_TYPING_EXPIRY: Duration = Duration::from_millis(3000);

#[derive(Debug, Default)]
struct Conversation {
    status: ConversationStatus,
    history: Vec<HistoryEntry>,
}

impl Conversation {
    fn contains(&self, id: &str) -> bool {
        self.history.iter().any(|e| e.message.id == id)
    }
}

#[derive(Debug)]
struct PendingSend {
    peer: UserId,
    input: SendMessageInput,
}

pub struct ReconciliationStore {
    viewer: UserId,
    language: String,
    open_peer: Option<UserId>,
    /// Bumped on every Closed -> Open; tags history fetches.
    generation: u64,
    conversations: HashMap<UserId, Conversation>,
    cache: PeerCacheState,
    pending: HashMap<MessageId, PendingSend>,
    /// Peer -> instant its typing hint expires
    typing: HashMap<UserId, Instant>,
    typing_expiry: Duration,
    online: BTreeSet<UserId>,
}

impl ReconciliationStore {
    pub fn new(viewer: impl Into<UserId>, language: impl Into<String>) -> Self {
        let language = language.into();
        Self {
            viewer: viewer.into(),
            language: if language.trim().is_empty() {
                DEFAULT_LANGUAGE.to_string()
            } else {
                language
            },
            open_peer: None,
            generation: 0,
            conversations: HashMap::new(),
            cache: PeerCacheState::default(),
            pending: HashMap::new(),
            typing: HashMap::new(),
            typing_expiry: DEFAULT_TYPING_EXPIRY,
            online: BTreeSet::new(),
        }
    }

    pub fn with_typing_expiry(mut self, expiry: Duration) -> Self {
        self.typing_expiry = expiry;
        self
    }

    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    /// Seed durable state loaded at login.
    pub fn load_cache(&mut self, cache: PeerCacheState) {
        self.cache = cache;
        if let Some(peer) = &self.open_peer {
            self.cache.unseen.remove(peer);
            self.cache.first_unread.remove(peer);
        }
    }

    pub fn cache_state(&self) -> &PeerCacheState {
        &self.cache
    }

    // ----- conversation lifecycle -----

    /// User selected `peer`: Closed -> Open.
    ///
    /// Closes whichever conversation was open. Selecting the peer that is
    /// already open is not a transition and yields nothing.
    pub fn select_peer(&mut self, peer: &str) -> Vec<Effect> {
        if self.is_open(peer) {
            return Vec::new();
        }

        self.close();
        self.generation += 1;
        self.conversations
            .entry(peer.to_string())
            .or_default()
            .status = ConversationStatus::Open;
        self.open_peer = Some(peer.to_string());

        self.cache.unseen.remove(peer);
        self.cache.first_unread.remove(peer);
        self.cache.read_peers.insert(peer.to_string());

        debug!(
            "[Reconcile] {} opened conversation with {} (generation {})",
            self.viewer, peer, self.generation
        );

        vec![
            Effect::FetchHistory {
                peer: peer.to_string(),
                generation: self.generation,
            },
            Effect::NotifySeen {
                viewer: self.viewer.clone(),
                peer: peer.to_string(),
            },
            Effect::PersistCache,
        ]
    }

    /// Open -> Closed for the current conversation, if any.
    pub fn close(&mut self) {
        if let Some(peer) = self.open_peer.take() {
            if let Some(conversation) = self.conversations.get_mut(&peer) {
                conversation.status = ConversationStatus::Closed;
            }
        }
    }

    pub fn open_peer(&self) -> Option<&str> {
        self.open_peer.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self, peer: &str) -> ConversationStatus {
        self.conversations
            .get(peer)
            .map(|c| c.status)
            .unwrap_or_default()
    }

    fn is_open(&self, peer: &str) -> bool {
        self.open_peer.as_deref() == Some(peer)
    }

    // ----- REST snapshots -----

    /// Fold in a full history fetched for `generation`.
    ///
    /// Replaces the displayed history wholesale when the fetch still belongs
    /// to the current open; a late snapshot only refreshes the list preview.
    /// Unconfirmed local sends survive the replace, and translations already
    /// made for ids that are still present are kept.
    pub fn apply_snapshot(
        &mut self,
        peer: &str,
        generation: u64,
        messages: Vec<Message>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(last) = messages.last() {
            if self.remember_last(peer, last) {
                effects.push(Effect::PersistCache);
            }
        }

        if !self.is_open(peer) || generation != self.generation {
            debug!(
                "[Reconcile] Dropping stale snapshot for {} (generation {}, current {})",
                peer, generation, self.generation
            );
            return effects;
        }

        let viewer = &self.viewer;
        let conversation = self.conversations.entry(peer.to_string()).or_default();
        let mut translated: HashMap<MessageId, String> = HashMap::new();
        let mut shown: HashSet<MessageId> = HashSet::new();
        let mut pending = Vec::new();
        for entry in std::mem::take(&mut conversation.history) {
            if entry.pending {
                pending.push(entry);
                continue;
            }
            if let Some(text) = entry.translated {
                translated.insert(entry.message.id.clone(), text);
            }
            shown.insert(entry.message.id);
        }

        conversation.history = messages
            .into_iter()
            .map(|message| HistoryEntry {
                translated: translated.remove(&message.id),
                message,
                pending: false,
            })
            .collect();

        // A send persisted before this fetch is already in the snapshot; its
        // local entry goes, oldest pending first, one snapshot message each.
        let mut claimed: HashSet<MessageId> = HashSet::new();
        pending.retain(|local| {
            let persisted = conversation.history.iter().find(|e| {
                &e.message.sender_id == viewer
                    && !shown.contains(&e.message.id)
                    && !claimed.contains(&e.message.id)
                    && e.message.text == local.message.text
                    && e.message.image_ref == local.message.image_ref
            });
            match persisted {
                Some(entry) => {
                    debug!(
                        "[Reconcile] Snapshot holds {} for local {}",
                        entry.message.id, local.message.id
                    );
                    claimed.insert(entry.message.id.clone());
                    false
                }
                None => true,
            }
        });
        conversation.history.extend(pending);

        effects
    }

    /// Merge the conversation list: unseen counts by maximum, previews by recency.
    ///
    /// A summary carries a count but not the oldest unread id, so a raised
    /// count leaves `first_unread` as it was; the marker is only set by
    /// messages pushed while the conversation is closed.
    pub fn apply_conversation_list(&mut self, summaries: Vec<ConversationSummary>) -> Vec<Effect> {
        let mut changed = false;
        for summary in summaries {
            if let Some(last) = &summary.last_message {
                changed |= self.remember_last(&summary.peer_id, last);
            }
            if self.is_open(&summary.peer_id) {
                continue;
            }
            let local = self.unseen(&summary.peer_id);
            if summary.unseen > local {
                self.cache.unseen.insert(summary.peer_id, summary.unseen);
                changed = true;
            }
        }

        if changed {
            vec![Effect::PersistCache]
        } else {
            Vec::new()
        }
    }

    // ----- live events -----

    pub fn apply_event(&mut self, event: ServerEvent, now: Instant) -> Vec<Effect> {
        match event {
            ServerEvent::OnlineUsers(users) => {
                self.apply_online_users(users);
                Vec::new()
            }
            ServerEvent::Typing { from } => {
                self.apply_typing(&from, now);
                Vec::new()
            }
            ServerEvent::SeenUpdate { user_id } => self.apply_seen_update(&user_id),
            ServerEvent::NewMessage { message } => self.apply_incoming(message),
        }
    }

    /// Fold a pushed message (from the peer, or the relay echo of our own).
    pub fn apply_incoming(&mut self, message: Message) -> Vec<Effect> {
        let Some(peer) = message.peer_of(&self.viewer).map(str::to_string) else {
            warn!(
                "[Reconcile] Message {} does not involve {}, ignoring",
                message.id, self.viewer
            );
            return Vec::new();
        };

        let already_latest = self
            .cache
            .last_messages
            .get(&peer)
            .map(|m| m.id == message.id)
            .unwrap_or(false);
        let mut persist = self.remember_last(&peer, &message);
        let mut effects = Vec::new();

        if message.sender_id == self.viewer {
            self.apply_echo(&peer, message);
        } else if self.is_open(&peer) {
            self.typing.remove(&peer);
            let job = self.translation_job(&peer, &message);
            let conversation = self.conversations.entry(peer.clone()).or_default();
            if !conversation.contains(&message.id) {
                if !message.seen {
                    effects.push(Effect::MarkMessageSeen {
                        peer,
                        message_id: message.id.clone(),
                    });
                }
                conversation.history.push(HistoryEntry::new(message));
                effects.extend(job.map(Effect::Translate));
            }
        } else {
            self.typing.remove(&peer);
            if !already_latest {
                *self.cache.unseen.entry(peer.clone()).or_insert(0) += 1;
                self.cache.first_unread.entry(peer).or_insert(message.id);
                persist = true;
            }
        }

        if persist {
            effects.push(Effect::PersistCache);
        }
        effects
    }

    /// Relay echo of the viewer's own message. Only an open conversation
    /// shows it; a matching optimistic entry is swapped in place.
    fn apply_echo(&mut self, peer: &str, message: Message) {
        let Some(conversation) = self.conversations.get_mut(peer) else {
            return;
        };
        if !conversation.status.is_open() || conversation.contains(&message.id) {
            return;
        }

        if let Some(entry) = conversation.history.iter_mut().find(|e| {
            e.pending && e.message.text == message.text && e.message.image_ref == message.image_ref
        }) {
            debug!(
                "[Reconcile] Echo {} confirms local {}",
                message.id, entry.message.id
            );
            entry.message = message;
            entry.pending = false;
            return;
        }

        conversation.history.push(HistoryEntry::new(message));
    }

    /// A peer viewed our messages; refetch if that conversation is on screen.
    pub fn apply_seen_update(&mut self, peer: &str) -> Vec<Effect> {
        if self.is_open(peer) {
            vec![Effect::FetchHistory {
                peer: peer.to_string(),
                generation: self.generation,
            }]
        } else {
            Vec::new()
        }
    }

    pub fn apply_typing(&mut self, from: &str, now: Instant) {
        if from == self.viewer {
            return;
        }
        self.typing.insert(from.to_string(), now + self.typing_expiry);
    }

    pub fn is_typing(&self, peer: &str, now: Instant) -> bool {
        self.typing
            .get(peer)
            .map(|expires_at| now < *expires_at)
            .unwrap_or(false)
    }

    /// Drop expired typing hints.
    pub fn expire_typing(&mut self, now: Instant) {
        self.typing.retain(|_, expires_at| now < *expires_at);
    }

    pub fn apply_online_users(&mut self, users: Vec<UserId>) {
        self.online = users.into_iter().collect();
    }

    pub fn is_online(&self, peer: &str) -> bool {
        self.online.contains(peer)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.online.iter().cloned().collect()
    }

    /// Replace the displayed text of `message_id` with its translation.
    pub fn apply_translation(&mut self, peer: &str, message_id: &str, text: String) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let Some(entry) = self
            .conversations
            .get_mut(peer)
            .and_then(|c| c.history.iter_mut().find(|e| e.message.id == message_id))
        else {
            return false;
        };
        if entry.message.text.as_deref() == Some(text.as_str()) {
            return false;
        }
        entry.translated = Some(text);
        true
    }

    /// The store confirmed `message_id` as seen by the viewer.
    pub fn apply_message_seen(&mut self, peer: &str, message_id: &str) -> bool {
        let Some(entry) = self
            .conversations
            .get_mut(peer)
            .and_then(|c| c.history.iter_mut().find(|e| e.message.id == message_id))
        else {
            return false;
        };
        let changed = !entry.message.seen;
        entry.message.seen = true;
        changed
    }

    // ----- local sends -----

    /// Append an optimistic local entry for a send about to be issued.
    pub fn begin_send(&mut self, peer: &str, input: SendMessageInput) -> Option<SendToken> {
        if input.is_empty() {
            return None;
        }

        let mut message = Message::new(self.viewer.clone(), peer, input.clone());
        message.id = format!("{}{}", LOCAL_ID_PREFIX, message.id);
        if input.sender_language.is_none() {
            message.sender_language = self.language.clone();
        }

        let token = SendToken(message.id.clone());
        self.pending.insert(
            token.0.clone(),
            PendingSend {
                peer: peer.to_string(),
                input,
            },
        );
        self.conversations
            .entry(peer.to_string())
            .or_default()
            .history
            .push(HistoryEntry {
                message,
                translated: None,
                pending: true,
            });

        Some(token)
    }

    /// The store accepted the send: swap the local entry for the persisted one.
    pub fn complete_send(&mut self, token: &SendToken, persisted: Message) -> Vec<Effect> {
        let Some(pending) = self.pending.remove(&token.0) else {
            warn!("[Reconcile] Unknown send token {}", token.0);
            return Vec::new();
        };

        let mut effects = Vec::new();
        if self.remember_last(&pending.peer, &persisted) {
            effects.push(Effect::PersistCache);
        }

        if let Some(conversation) = self.conversations.get_mut(&pending.peer) {
            let already = conversation.contains(&persisted.id);
            let local = conversation
                .history
                .iter()
                .position(|e| e.pending && e.message.id == token.0);

            match local {
                Some(pos) if already => {
                    conversation.history.remove(pos);
                }
                Some(pos) => conversation.history[pos] = HistoryEntry::new(persisted),
                None if !already && conversation.status.is_open() => {
                    conversation.history.push(HistoryEntry::new(persisted));
                }
                None => {}
            }
        }

        effects
    }

    /// The store rejected the send: drop the local entry and return the input.
    pub fn fail_send(&mut self, token: &SendToken) -> Option<SendMessageInput> {
        let pending = self.pending.remove(&token.0)?;
        if let Some(conversation) = self.conversations.get_mut(&pending.peer) {
            conversation
                .history
                .retain(|e| !(e.pending && e.message.id == token.0));
        }
        Some(pending.input)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ----- views -----

    pub fn history(&self, peer: &str) -> &[HistoryEntry] {
        self.conversations
            .get(peer)
            .map(|c| c.history.as_slice())
            .unwrap_or(&[])
    }

    pub fn unseen(&self, peer: &str) -> u32 {
        self.cache.unseen.get(peer).copied().unwrap_or(0)
    }

    pub fn last_message(&self, peer: &str) -> Option<&Message> {
        self.cache.last_messages.get(peer)
    }

    pub fn first_unread(&self, peer: &str) -> Option<&str> {
        self.cache.first_unread.get(peer).map(String::as_str)
    }

    pub fn has_read(&self, peer: &str) -> bool {
        self.cache.read_peers.contains(peer)
    }

    /// Forget everything about the current identity.
    pub fn clear(&mut self) {
        self.open_peer = None;
        self.generation = 0;
        self.conversations.clear();
        self.cache = PeerCacheState::default();
        self.pending.clear();
        self.typing.clear();
        self.online.clear();
    }

    // ----- helpers -----

    /// Record `message` as the preview for `peer` unless a newer one is held.
    fn remember_last(&mut self, peer: &str, message: &Message) -> bool {
        let keep_current = self
            .cache
            .last_messages
            .get(peer)
            .map(|current| current.created_at > message.created_at || current == message)
            .unwrap_or(false);
        if keep_current {
            return false;
        }
        self.cache
            .last_messages
            .insert(peer.to_string(), message.clone());
        true
    }

    fn translation_job(&self, peer: &str, message: &Message) -> Option<TranslationJob> {
        let text = message.text.as_deref().filter(|t| !t.trim().is_empty())?;
        if message.sender_language == self.language {
            return None;
        }
        Some(TranslationJob {
            peer: peer.to_string(),
            message_id: message.id.clone(),
            text: text.to_string(),
            source: message.sender_language.clone(),
            target: self.language.clone(),
        })
    }
}
