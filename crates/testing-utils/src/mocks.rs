//! Mock implementations for all port and repository traits
//!
//! These are in-memory doubles with call counters so tests can assert on
//! side effects (subscriptions opened and closed, miss-writes, opening
//! messages) without a real conversation service.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{Stream, StreamExt};

use dispatch_domain::{
    Contract, ContractId, ContractRepository, Conversation, ConversationBackend, ConversationId,
    ConversationStatus, NewConversation, StatusStream, TimeSource,
};
use dispatch_errors::{DispatchError, DispatchResult};

type FeedSender = UnboundedSender<DispatchResult<ConversationStatus>>;

#[derive(Default)]
struct BackendState {
    statuses: HashMap<ConversationId, ConversationStatus>,
    feeds: HashMap<ConversationId, Vec<FeedSender>>,
    watch_rejections: HashMap<ConversationId, DispatchError>,
    subscriptions: HashMap<ConversationId, usize>,
    subscription_attempts: HashMap<ConversationId, usize>,
    creation_failures: HashMap<ContractId, DispatchError>,
    creation_delays: HashMap<ContractId, Duration>,
    created: Vec<NewConversation>,
    missed_marks: Vec<ConversationId>,
    mark_missed_failures: usize,
    opening_messages: Vec<(ConversationId, String, String)>,
    opening_message_attempts: usize,
    opening_message_failures: usize,
}

/// Mock implementation of ConversationBackend for testing
///
/// Conversations created for contract `x` get the id `conv-x` and start in
/// `CREATED` unless a status was set for that id beforehand.
#[derive(Clone, Default)]
pub struct MockConversationBackend {
    state: Arc<Mutex<BackendState>>,
    open_feeds: Arc<AtomicUsize>,
    closed_feeds: Arc<AtomicUsize>,
}

impl MockConversationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_id_for(contract_id: &ContractId) -> ConversationId {
        ConversationId::new(format!("conv-{contract_id}"))
    }

    /// Set the current status without notifying live feeds
    pub fn set_status(&self, conversation_id: &ConversationId, status: ConversationStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(conversation_id.clone(), status);
    }

    /// Set the current status and push it to every live feed
    pub fn push_status(&self, conversation_id: &ConversationId, status: ConversationStatus) {
        let mut state = self.state.lock().unwrap();
        state.statuses.insert(conversation_id.clone(), status);
        if let Some(feeds) = state.feeds.get_mut(conversation_id) {
            feeds.retain(|feed| feed.unbounded_send(Ok(status)).is_ok());
        }
    }

    /// Push an error item into every live feed of the conversation
    pub fn push_feed_error(&self, conversation_id: &ConversationId, error: DispatchError) {
        let mut state = self.state.lock().unwrap();
        if let Some(feeds) = state.feeds.get_mut(conversation_id) {
            feeds.retain(|feed| feed.unbounded_send(Err(error.clone())).is_ok());
        }
    }

    /// End every live feed of the conversation
    pub fn close_feeds(&self, conversation_id: &ConversationId) {
        self.state.lock().unwrap().feeds.remove(conversation_id);
    }

    /// Make every subscribe call for the conversation fail
    pub fn reject_watch(&self, conversation_id: &ConversationId, error: DispatchError) {
        self.state
            .lock()
            .unwrap()
            .watch_rejections
            .insert(conversation_id.clone(), error);
    }

    pub fn fail_creation(&self, contract_id: &ContractId, error: DispatchError) {
        self.state
            .lock()
            .unwrap()
            .creation_failures
            .insert(contract_id.clone(), error);
    }

    pub fn set_creation_delay(&self, contract_id: &ContractId, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .creation_delays
            .insert(contract_id.clone(), delay);
    }

    /// Fail the next `count` miss-writes
    pub fn fail_mark_missed(&self, count: usize) {
        self.state.lock().unwrap().mark_missed_failures = count;
    }

    /// Fail the next `count` opening-message writes
    pub fn fail_opening_messages(&self, count: usize) {
        self.state.lock().unwrap().opening_message_failures = count;
    }

    pub fn status(&self, conversation_id: &ConversationId) -> Option<ConversationStatus> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .get(conversation_id)
            .copied()
    }

    /// Every create call, successful or not
    pub fn created_requests(&self) -> Vec<NewConversation> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn creation_count(&self) -> usize {
        self.state.lock().unwrap().created.len()
    }

    /// Successful subscriptions for the conversation
    pub fn subscription_count(&self, conversation_id: &ConversationId) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }

    /// All subscribe calls for the conversation, including rejected ones
    pub fn subscription_attempts(&self, conversation_id: &ConversationId) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscription_attempts
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_subscription_attempts(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .subscription_attempts
            .values()
            .sum()
    }

    pub fn open_feed_count(&self) -> usize {
        self.open_feeds.load(Ordering::SeqCst)
    }

    pub fn closed_feed_count(&self) -> usize {
        self.closed_feeds.load(Ordering::SeqCst)
    }

    pub fn missed_marks(&self) -> Vec<ConversationId> {
        self.state.lock().unwrap().missed_marks.clone()
    }

    /// Successful opening messages as (conversation id, text, author)
    pub fn opening_messages(&self) -> Vec<(ConversationId, String, String)> {
        self.state.lock().unwrap().opening_messages.clone()
    }

    pub fn opening_message_attempts(&self) -> usize {
        self.state.lock().unwrap().opening_message_attempts
    }
}

#[async_trait]
impl ConversationBackend for MockConversationBackend {
    async fn create_conversation(&self, request: &NewConversation) -> DispatchResult<Conversation> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.created.push(request.clone());
            state.creation_delays.get(&request.contract_id).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.creation_failures.get(&request.contract_id) {
            return Err(error.clone());
        }

        let id = Self::conversation_id_for(&request.contract_id);
        let status = *state
            .statuses
            .entry(id.clone())
            .or_insert(ConversationStatus::Created);

        Ok(Conversation {
            id,
            contract_id: request.contract_id.clone(),
            status,
        })
    }

    async fn fetch_status(
        &self,
        conversation_id: &ConversationId,
    ) -> DispatchResult<ConversationStatus> {
        self.status(conversation_id)
            .ok_or_else(|| DispatchError::conversation_not_found(conversation_id.as_str()))
    }

    async fn watch_status(&self, conversation_id: &ConversationId) -> DispatchResult<StatusStream> {
        let mut state = self.state.lock().unwrap();
        *state
            .subscription_attempts
            .entry(conversation_id.clone())
            .or_insert(0) += 1;

        if let Some(error) = state.watch_rejections.get(conversation_id) {
            return Err(error.clone());
        }

        let (sender, receiver) = unbounded();
        state
            .feeds
            .entry(conversation_id.clone())
            .or_default()
            .push(sender);
        *state
            .subscriptions
            .entry(conversation_id.clone())
            .or_insert(0) += 1;
        self.open_feeds.fetch_add(1, Ordering::SeqCst);

        Ok(TrackedFeed {
            receiver,
            open_feeds: Arc::clone(&self.open_feeds),
            closed_feeds: Arc::clone(&self.closed_feeds),
        }
        .boxed())
    }

    async fn mark_missed(&self, conversation_id: &ConversationId) -> DispatchResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.mark_missed_failures > 0 {
            state.mark_missed_failures -= 1;
            return Err(DispatchError::backend_error("mark missed rejected"));
        }

        state
            .statuses
            .insert(conversation_id.clone(), ConversationStatus::Missed);
        state.missed_marks.push(conversation_id.clone());
        Ok(())
    }

    async fn create_opening_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
        author: &str,
    ) -> DispatchResult<()> {
        let mut state = self.state.lock().unwrap();
        state.opening_message_attempts += 1;
        if state.opening_message_failures > 0 {
            state.opening_message_failures -= 1;
            return Err(DispatchError::network_error("opening message write failed"));
        }

        state.opening_messages.push((
            conversation_id.clone(),
            text.to_string(),
            author.to_string(),
        ));
        Ok(())
    }
}

/// Status feed that reports its own closing to the owning mock
struct TrackedFeed {
    receiver: UnboundedReceiver<DispatchResult<ConversationStatus>>,
    open_feeds: Arc<AtomicUsize>,
    closed_feeds: Arc<AtomicUsize>,
}

impl Stream for TrackedFeed {
    type Item = DispatchResult<ConversationStatus>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl Drop for TrackedFeed {
    fn drop(&mut self) {
        self.open_feeds.fetch_sub(1, Ordering::SeqCst);
        self.closed_feeds.fetch_add(1, Ordering::SeqCst);
    }
}

/// Mock implementation of ContractRepository for testing
#[derive(Debug, Clone)]
pub struct MockContractRepository {
    contracts: Arc<Mutex<Vec<Contract>>>,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockContractRepository {
    pub fn with_contracts(contracts: Vec<Contract>) -> Self {
        Self {
            contracts: Arc::new(Mutex::new(contracts)),
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            contracts: Arc::new(Mutex::new(Vec::new())),
            failure: Some(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockContractRepository {
    fn default() -> Self {
        Self::with_contracts(Vec::new())
    }
}

#[async_trait]
impl ContractRepository for MockContractRepository {
    async fn list_contracts(&self) -> DispatchResult<Vec<Contract>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(DispatchError::backend_error(message.clone())),
            None => Ok(self.contracts.lock().unwrap().clone()),
        }
    }
}

/// Time source that always reports the same instant
#[derive(Debug, Clone)]
pub struct FixedTimeSource {
    now: DateTime<Utc>,
}

impl FixedTimeSource {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

#[async_trait]
impl TimeSource for FixedTimeSource {
    async fn current_time(&self) -> DispatchResult<DateTime<Utc>> {
        Ok(self.now)
    }
}

/// Time source that is always unreachable
#[derive(Debug, Clone, Default)]
pub struct FailingTimeSource {
    calls: Arc<AtomicUsize>,
}

impl FailingTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimeSource for FailingTimeSource {
    async fn current_time(&self) -> DispatchResult<DateTime<Utc>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DispatchError::network_error("time service unreachable"))
    }
}
