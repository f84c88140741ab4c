//! Turn-taking over a single conversation.
//!
//! The controller owns the conversation for the lifetime of the process.
//! A turn appends the user message at once, asks the completion client for
//! a reply, then appends either the reply or an error placeholder. Every
//! mutation is published to subscribers and queued for a background flush.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::ai::CompletionClient;
use crate::error::{Error, Result};
use crate::flush::Flusher;
use crate::state::Message;
use crate::store::ConversationStore;

pub const DEFAULT_MAX_INPUT_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    /// A completion request is in flight; new submissions are rejected
    Sending,
}

/// What a front-end needs to render: the messages plus the pending flag
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub state: TurnState,
}

impl ConversationSnapshot {
    pub fn is_pending(&self) -> bool {
        self.state == TurnState::Sending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model's reply was appended
    Replied,
    /// The request failed and an error placeholder was appended
    Failed,
    /// History was cleared while the request was in flight; nothing appended
    Discarded,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub max_input_chars: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }
}

struct Inner {
    messages: Vec<Message>,
    state: TurnState,
    // Bumped by clear_history so an in-flight turn can tell its history is gone
    epoch: u64,
}

/// Settles a turn whose `submit` future was dropped or unwound mid-request.
///
/// The abandoned user message gets an error placeholder and the state goes
/// back to `Idle`, so later submissions are not stuck on `Busy`.
struct TurnGuard<'a> {
    controller: &'a ConversationController,
    epoch: u64,
    armed: bool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut inner = self.controller.lock();
        inner.state = TurnState::Idle;
        if inner.epoch == self.epoch {
            warn!("turn abandoned before a reply arrived");
            inner.messages.push(Message::error_reply());
            self.controller.publish(&inner);
        } else {
            self.controller.notify(&inner);
        }
    }
}

pub struct ConversationController {
    client: Arc<dyn CompletionClient>,
    inner: Mutex<Inner>,
    flusher: Flusher,
    updates: watch::Sender<ConversationSnapshot>,
    options: ControllerOptions,
}

impl ConversationController {
    /// Build a controller hydrated from `store`.
    ///
    /// History is loaded before this returns, so no submission can race it.
    pub async fn new(
        client: Arc<dyn CompletionClient>,
        store: Arc<dyn ConversationStore>,
        options: ControllerOptions,
    ) -> Self {
        let messages = store.load().await;
        info!(count = messages.len(), "conversation hydrated");

        let (updates, _) = watch::channel(ConversationSnapshot {
            messages: messages.clone(),
            state: TurnState::Idle,
        });

        Self {
            client,
            inner: Mutex::new(Inner {
                messages,
                state: TurnState::Idle,
                epoch: 0,
            }),
            flusher: Flusher::spawn(store),
            updates,
            options,
        }
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let inner = self.lock();
        Self::snapshot_of(&inner)
    }

    /// Receive a fresh snapshot after every mutation or state change
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.updates.subscribe()
    }

    pub fn max_input_chars(&self) -> usize {
        self.options.max_input_chars
    }

    /// Run one turn for `text`.
    ///
    /// Returns `Validation` for empty or over-long input and `Busy` while
    /// another turn is in flight; neither touches the conversation. A failed
    /// completion is not an error here: it becomes an error placeholder and
    /// the outcome is `Failed`.
    pub async fn submit(&self, text: &str) -> Result<TurnOutcome> {
        let text = self.validate(text)?;

        let epoch = {
            let mut inner = self.lock();
            if inner.state == TurnState::Sending {
                return Err(Error::Busy);
            }
            inner.messages.push(Message::user(text.clone()));
            inner.state = TurnState::Sending;
            self.publish(&inner);
            inner.epoch
        };

        let mut guard = TurnGuard {
            controller: self,
            epoch,
            armed: true,
        };
        let result = self.client.complete(&text).await;
        guard.armed = false;

        let mut inner = self.lock();
        inner.state = TurnState::Idle;

        if inner.epoch != epoch {
            debug!("history cleared during turn, dropping reply");
            self.notify(&inner);
            return Ok(TurnOutcome::Discarded);
        }

        let outcome = match result {
            Ok(reply) => {
                inner.messages.push(Message::assistant(reply));
                TurnOutcome::Replied
            }
            Err(e) => {
                error!(error = %e, "completion failed");
                inner.messages.push(Message::error_reply());
                TurnOutcome::Failed
            }
        };
        self.publish(&inner);

        Ok(outcome)
    }

    /// Drop the whole conversation, in memory and on disk
    pub fn clear_history(&self) {
        let mut inner = self.lock();
        inner.messages.clear();
        inner.epoch += 1;
        self.notify(&inner);
        self.flusher.clear();
        info!("history cleared");
    }

    /// Wait until every queued history write has been applied
    pub async fn flushed(&self) {
        self.flusher.flushed().await;
    }

    fn validate(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("message is empty"));
        }

        let chars = text.chars().count();
        if chars > self.options.max_input_chars {
            return Err(Error::validation(format!(
                "message is {} characters, limit is {}",
                chars, self.options.max_input_chars
            )));
        }

        Ok(text.to_string())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot_of(inner: &Inner) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: inner.messages.clone(),
            state: inner.state,
        }
    }

    fn notify(&self, inner: &Inner) {
        self.updates.send_replace(Self::snapshot_of(inner));
    }

    fn publish(&self, inner: &Inner) {
        self.notify(inner);
        self.flusher.save(inner.messages.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Sender, ERROR_REPLY};
    use crate::store::JsonFileStore;
    use async_trait::async_trait;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::Notify;

    struct FixedClient {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedClient {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for FixedClient {
        async fn complete(&self, user_text: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(user_text.to_string());
            Ok(self.reply.clone())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn complete(&self, _user_text: &str) -> Result<String> {
            Err(Error::remote("connection reset"))
        }
    }

    /// Holds every request until the gate is opened
    struct GatedClient {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl CompletionClient for GatedClient {
        async fn complete(&self, _user_text: &str) -> Result<String> {
            self.gate.notified().await;
            Ok("late reply".to_string())
        }
    }

    fn temp_store() -> (TempDir, Arc<JsonFileStore>) {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("messages.json")));
        (dir, store)
    }

    async fn controller(
        client: Arc<dyn CompletionClient>,
        store: Arc<JsonFileStore>,
    ) -> ConversationController {
        ConversationController::new(client, store, ControllerOptions::default()).await
    }

    #[tokio::test]
    async fn test_successful_turn_appends_user_then_reply() {
        let (_dir, store) = temp_store();
        let client = Arc::new(FixedClient::new("Hello!"));
        let ctrl = controller(client.clone(), store).await;

        let outcome = ctrl.submit("hi").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Replied);

        let snapshot = ctrl.snapshot();
        assert_eq!(snapshot.state, TurnState::Idle);
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[0].sender, Sender::User);
        assert_eq!(snapshot.messages[0].content, "hi");
        assert_eq!(snapshot.messages[1].sender, Sender::Assistant);
        assert_eq!(snapshot.messages[1].content, "Hello!");
        assert!(!snapshot.messages[1].is_error);
        assert_ne!(snapshot.messages[0].id, snapshot.messages[1].id);
    }

    #[tokio::test]
    async fn test_input_is_trimmed_before_sending() {
        let (_dir, store) = temp_store();
        let client = Arc::new(FixedClient::new("ok"));
        let ctrl = controller(client.clone(), store).await;

        ctrl.submit("  what is rust?\n").await.unwrap();

        assert_eq!(ctrl.snapshot().messages[0].content, "what is rust?");
        assert_eq!(*client.prompts.lock().unwrap(), vec!["what is rust?".to_string()]);
    }

    #[tokio::test]
    async fn test_each_turn_adds_two_messages() {
        let (_dir, store) = temp_store();
        let ctrl = controller(Arc::new(FixedClient::new("ok")), store).await;

        for i in 1..=3 {
            ctrl.submit(&format!("question {}", i)).await.unwrap();
            assert_eq!(ctrl.snapshot().messages.len(), i * 2);
        }
    }

    #[tokio::test]
    async fn test_failed_completion_becomes_error_message() {
        let (_dir, store) = temp_store();
        let ctrl = controller(Arc::new(FailingClient), store).await;

        let outcome = ctrl.submit("hi").await.unwrap();
        assert_eq!(outcome, TurnOutcome::Failed);

        let snapshot = ctrl.snapshot();
        assert_eq!(snapshot.state, TurnState::Idle);
        assert_eq!(snapshot.messages.len(), 2);
        let last = snapshot.messages.last().unwrap();
        assert_eq!(last.sender, Sender::Assistant);
        assert!(last.is_error);
        assert_eq!(last.content, ERROR_REPLY);
    }

    #[tokio::test]
    async fn test_blank_submission_is_rejected() {
        let (_dir, store) = temp_store();
        let client = Arc::new(FixedClient::new("ok"));
        let ctrl = controller(client.clone(), store).await;

        for text in ["", "   ", "\n\t "] {
            assert!(matches!(ctrl.submit(text).await, Err(Error::Validation(_))));
        }
        assert!(ctrl.snapshot().messages.is_empty());
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_over_long_submission_is_rejected() {
        let (_dir, store) = temp_store();
        let ctrl = ConversationController::new(
            Arc::new(FixedClient::new("ok")),
            store,
            ControllerOptions { max_input_chars: 5 },
        )
        .await;

        assert!(matches!(ctrl.submit("toolong").await, Err(Error::Validation(_))));
        assert!(ctrl.snapshot().messages.is_empty());

        // Limit counts characters, not bytes
        assert!(ctrl.submit("héllo").await.is_ok());
    }

    #[tokio::test]
    async fn test_submit_while_sending_is_rejected() {
        let (_dir, store) = temp_store();
        let gate = Arc::new(Notify::new());
        let ctrl = Arc::new(controller(Arc::new(GatedClient { gate: gate.clone() }), store).await);
        let mut updates = ctrl.subscribe();

        let first = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move { ctrl.submit("first").await })
        };

        updates.wait_for(|s| s.is_pending()).await.unwrap();

        // User message is visible before the reply arrives
        let pending = ctrl.snapshot();
        assert_eq!(pending.messages.len(), 1);
        assert_eq!(pending.messages[0].content, "first");

        assert_eq!(ctrl.submit("second").await, Err(Error::Busy));
        assert_eq!(ctrl.snapshot().messages.len(), 1);

        gate.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), TurnOutcome::Replied);

        let settled = ctrl.snapshot();
        assert_eq!(settled.state, TurnState::Idle);
        assert_eq!(settled.messages.len(), 2);
        assert_eq!(settled.messages[1].content, "late reply");

        // Idle again, so the next turn goes through
        gate.notify_one();
        assert!(ctrl.submit("second").await.is_ok());
        assert_eq!(ctrl.snapshot().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_subscribers_see_pending_then_settled() {
        let (_dir, store) = temp_store();
        let gate = Arc::new(Notify::new());
        let ctrl = Arc::new(controller(Arc::new(GatedClient { gate: gate.clone() }), store).await);
        let mut updates = ctrl.subscribe();

        let turn = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move { ctrl.submit("hi").await })
        };

        updates.changed().await.unwrap();
        let pending = updates.borrow_and_update().clone();
        assert!(pending.is_pending());
        assert_eq!(pending.messages.len(), 1);
        assert_eq!(pending.messages[0].sender, Sender::User);

        gate.notify_one();
        updates.changed().await.unwrap();
        let settled = updates.borrow_and_update().clone();
        assert_eq!(settled.state, TurnState::Idle);
        assert_eq!(settled.messages.len(), 2);
        assert_eq!(settled.messages[1].content, "late reply");

        assert_eq!(turn.await.unwrap().unwrap(), TurnOutcome::Replied);
        assert_eq!(settled, ctrl.snapshot());
    }

    #[tokio::test]
    async fn test_dropped_turn_returns_to_idle() {
        let (_dir, store) = temp_store();
        let gate = Arc::new(Notify::new());
        let ctrl = controller(Arc::new(GatedClient { gate: gate.clone() }), store.clone()).await;
        let updates = ctrl.subscribe();

        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(20), ctrl.submit("hi")).await;
        assert!(timed_out.is_err());

        let snapshot = ctrl.snapshot();
        assert_eq!(snapshot.state, TurnState::Idle);
        assert_eq!(snapshot.messages.len(), 2);
        assert!(snapshot.messages[1].is_error);
        assert_eq!(*updates.borrow(), snapshot);

        gate.notify_one();
        assert_eq!(ctrl.submit("again").await.unwrap(), TurnOutcome::Replied);
        assert_eq!(ctrl.snapshot().messages.len(), 4);

        ctrl.flushed().await;
        assert_eq!(store.load().await, ctrl.snapshot().messages);
    }

    #[tokio::test]
    async fn test_every_turn_is_flushed() {
        let (_dir, store) = temp_store();
        let ctrl = controller(Arc::new(FixedClient::new("Hello!")), store.clone()).await;

        ctrl.submit("hi").await.unwrap();
        ctrl.flushed().await;

        assert_eq!(store.load().await, ctrl.snapshot().messages);
    }

    #[tokio::test]
    async fn test_hydrates_from_store() {
        let (_dir, store) = temp_store();
        let saved = vec![Message::user("earlier"), Message::assistant("answer")];
        store.save(&saved).await.unwrap();

        let ctrl = controller(Arc::new(FixedClient::new("ok")), store).await;
        assert_eq!(ctrl.snapshot().messages, saved);

        ctrl.submit("next").await.unwrap();
        let messages = ctrl.snapshot().messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[..2], saved[..]);
    }

    #[tokio::test]
    async fn test_clear_history_empties_memory_and_disk() {
        let (_dir, store) = temp_store();
        let ctrl = controller(Arc::new(FixedClient::new("ok")), store.clone()).await;

        ctrl.submit("hi").await.unwrap();
        ctrl.clear_history();
        ctrl.flushed().await;

        assert!(ctrl.snapshot().messages.is_empty());
        assert!(store.load().await.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_clear_during_turn_discards_stale_reply() {
        let (_dir, store) = temp_store();
        let gate = Arc::new(Notify::new());
        let ctrl = Arc::new(
            controller(Arc::new(GatedClient { gate: gate.clone() }), store.clone()).await,
        );
        let mut updates = ctrl.subscribe();

        let turn = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move { ctrl.submit("hi").await })
        };
        updates.wait_for(|s| s.is_pending()).await.unwrap();

        ctrl.clear_history();
        assert!(ctrl.snapshot().messages.is_empty());
        assert!(ctrl.snapshot().is_pending());

        gate.notify_one();
        assert_eq!(turn.await.unwrap().unwrap(), TurnOutcome::Discarded);

        let snapshot = ctrl.snapshot();
        assert!(snapshot.messages.is_empty());
        assert_eq!(snapshot.state, TurnState::Idle);

        ctrl.flushed().await;
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_memory_state() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let store = Arc::new(JsonFileStore::new(blocker.join("messages.json")));

        let ctrl = controller(Arc::new(FixedClient::new("Hello!")), store).await;

        assert_eq!(ctrl.submit("hi").await.unwrap(), TurnOutcome::Replied);
        ctrl.flushed().await;
        assert_eq!(ctrl.snapshot().messages.len(), 2);

        // Next turn is not blocked by the failed write
        assert_eq!(ctrl.submit("again").await.unwrap(), TurnOutcome::Replied);
        assert_eq!(ctrl.snapshot().messages.len(), 4);
    }
}
