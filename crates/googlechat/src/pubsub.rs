//! Pub/Sub pull transport: one long-lived listener per enabled account.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::{sync::watch, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    Result,
    accounts::ResolvedGoogleChatAccount,
    client::{ClientRegistry, GoogleChatClient},
    event::ReceivedMessage,
    inbound::{InboundOutcome, InboundPipeline},
};

/// Pause after a failed pull before trying again.
const PULL_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Pause after a pull that returned nothing.
const EMPTY_PULL_DELAY: Duration = Duration::from_millis(500);

/// Lifecycle of a pull listener. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Starting,
    Listening,
    Stopped,
}

/// A pull subscription as seen by the listener.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Full resource path, for logs.
    fn name(&self) -> &str;

    async fn pull(&self, max_messages: u32) -> Result<Vec<ReceivedMessage>>;

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()>;

    /// Ask the broker to redeliver.
    async fn nack(&self, ack_ids: &[String]) -> Result<()>;
}

/// Opens the subscription for an account. Injected into the plugin so tests
/// and emulators can substitute their own transport.
pub trait SubscriptionConnector: Send + Sync {
    fn connect(&self, account: &ResolvedGoogleChatAccount) -> Result<Arc<dyn Subscription>>;
}

/// Subscription backed by the Pub/Sub REST API.
pub struct RestSubscription {
    client: Arc<GoogleChatClient>,
    path: String,
}

impl RestSubscription {
    pub fn new(client: Arc<GoogleChatClient>, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

#[async_trait]
impl Subscription for RestSubscription {
    fn name(&self) -> &str {
        &self.path
    }

    async fn pull(&self, max_messages: u32) -> Result<Vec<ReceivedMessage>> {
        self.client.pull(&self.path, max_messages).await
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()> {
        self.client.acknowledge(&self.path, ack_ids).await
    }

    async fn nack(&self, ack_ids: &[String]) -> Result<()> {
        self.client.modify_ack_deadline(&self.path, ack_ids, 0).await
    }
}

/// Default connector: REST subscriptions on cached clients.
pub struct RestConnector {
    clients: Arc<ClientRegistry>,
}

impl RestConnector {
    pub fn new(clients: Arc<ClientRegistry>) -> Self {
        Self { clients }
    }
}

impl SubscriptionConnector for RestConnector {
    fn connect(&self, account: &ResolvedGoogleChatAccount) -> Result<Arc<dyn Subscription>> {
        let client = self.clients.client_for(account)?;
        Ok(Arc::new(RestSubscription::new(
            client,
            account.subscription_path(),
        )))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PullTiming {
    pub retry_delay: Duration,
    pub empty_delay: Duration,
}

impl Default for PullTiming {
    fn default() -> Self {
        Self {
            retry_delay: PULL_RETRY_DELAY,
            empty_delay: EMPTY_PULL_DELAY,
        }
    }
}

/// Handle to a running pull loop.
pub struct PullListener {
    account_id: String,
    cancel: CancellationToken,
    state: watch::Receiver<ListenerState>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PullListener {
    /// Start pulling. Cancelling `cancel` (or calling [`Self::stop`]) ends
    /// the loop after the message currently being processed.
    pub fn spawn(
        subscription: Arc<dyn Subscription>,
        pipeline: Arc<InboundPipeline>,
        cancel: CancellationToken,
    ) -> Self {
        Self::spawn_with_timing(subscription, pipeline, cancel, PullTiming::default())
    }

    pub(crate) fn spawn_with_timing(
        subscription: Arc<dyn Subscription>,
        pipeline: Arc<InboundPipeline>,
        cancel: CancellationToken,
        timing: PullTiming,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ListenerState::Starting);
        let account_id = pipeline.account_id().to_string();
        let task = tokio::spawn(run_pull_loop(
            subscription,
            pipeline,
            cancel.clone(),
            state_tx,
            timing,
        ));
        Self {
            account_id,
            cancel,
            state: state_rx,
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.clone()
    }

    /// Cancel and wait for the loop to exit. Safe to call more than once.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(account_id = %self.account_id, "google chat pull task ended abnormally: {e}");
        }
    }
}

impl Drop for PullListener {
    /// A listener that is dropped without `stop` still ends its loop.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_pull_loop(
    subscription: Arc<dyn Subscription>,
    pipeline: Arc<InboundPipeline>,
    cancel: CancellationToken,
    state: watch::Sender<ListenerState>,
    timing: PullTiming,
) {
    let account_id = pipeline.account_id().to_string();
    info!(
        account_id = %account_id,
        subscription = subscription.name(),
        "starting google chat pull listener"
    );
    state.send_replace(ListenerState::Listening);

    'listen: loop {
        let max_messages = pipeline.account().pull_max_messages;
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = subscription.pull(max_messages) => result,
        };

        match batch {
            Ok(messages) if messages.is_empty() => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(timing.empty_delay) => {},
                }
            },
            Ok(messages) => {
                debug!(account_id = %account_id, count = messages.len(), "pulled google chat messages");
                for received in messages {
                    // Unprocessed messages are left for redelivery.
                    if cancel.is_cancelled() {
                        break 'listen;
                    }
                    process_received(subscription.as_ref(), &pipeline, received).await;
                }
            },
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "google chat pull failed");
                pipeline.runtime.record_error(&e);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(timing.retry_delay) => {},
                }
            },
        }
    }

    state.send_replace(ListenerState::Stopped);
    info!(account_id = %account_id, "google chat pull listener stopped");
}

/// Handle one message, then ack it, or nack it if it could not be processed.
/// Policy denials are acked: the message was understood, just not admitted.
async fn process_received(
    subscription: &dyn Subscription,
    pipeline: &InboundPipeline,
    received: ReceivedMessage,
) {
    let account_id = pipeline.account_id();
    let ack_ids = [received.ack_id];
    match pipeline.handle_pubsub(&received.message).await {
        Ok(outcome) => {
            if let InboundOutcome::Denied(reason) = &outcome {
                debug!(account_id, %reason, "acking denied google chat message");
            }
            if let Err(e) = subscription.acknowledge(&ack_ids).await {
                warn!(account_id, error = %e, "failed to ack google chat message");
            }
        },
        Err(e) => {
            warn!(account_id, error = %e, "failed to process google chat message; requesting redelivery");
            pipeline.runtime.record_error(&e);
            if let Err(e) = subscription.nack(&ack_ids).await {
                warn!(account_id, error = %e, "failed to nack google chat message");
            }
        },
    }
}
