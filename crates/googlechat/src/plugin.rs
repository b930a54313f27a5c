use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    async_trait::async_trait,
    chatrelay_channels::{
        ChannelEvent, ChannelEventSink, ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin,
        ChannelStatus, message_log::MessageLog, pairing::PairingLookup,
    },
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    CHANNEL_ID, Error, Result,
    accounts::{
        AccountDescription, DmPolicySummary, ResolvedGoogleChatAccount, describe_account,
        list_account_ids, list_enabled_accounts, resolve_account, resolve_dm_policy,
    },
    client::ClientRegistry,
    config::GoogleChatConfig,
    inbound::InboundPipeline,
    outbound::GoogleChatOutbound,
    pubsub::{ListenerState, PullListener, RestConnector, SubscriptionConnector},
    state::RuntimeRegistry,
    webhook::WEBHOOK_TIMEOUT,
};

/// Google Chat channel plugin.
///
/// Owns the shared config, the client cache and one pull listener per
/// started account. The webhook router borrows it through an `Arc`.
pub struct GoogleChatPlugin {
    config: Arc<RwLock<GoogleChatConfig>>,
    clients: Arc<ClientRegistry>,
    connector: Option<Arc<dyn SubscriptionConnector>>,
    runtime: RuntimeRegistry,
    listeners: tokio::sync::Mutex<HashMap<String, PullListener>>,
    outbound: GoogleChatOutbound,
    message_log: Option<Arc<dyn MessageLog>>,
    event_sink: Option<Arc<dyn ChannelEventSink>>,
    pairing: Option<Arc<dyn PairingLookup>>,
    webhook_timeout: Duration,
}

impl GoogleChatPlugin {
    pub fn new(config: GoogleChatConfig) -> Self {
        let config = Arc::new(RwLock::new(config));
        let clients = Arc::new(ClientRegistry::default());
        let runtime = RuntimeRegistry::default();
        let outbound = GoogleChatOutbound {
            config: Arc::clone(&config),
            clients: Arc::clone(&clients),
            runtime: runtime.clone(),
        };
        Self {
            config,
            clients,
            connector: None,
            runtime,
            listeners: tokio::sync::Mutex::new(HashMap::new()),
            outbound,
            message_log: None,
            event_sink: None,
            pairing: None,
            webhook_timeout: WEBHOOK_TIMEOUT,
        }
    }

    /// Replace the client cache, e.g. to point at an emulator.
    pub fn with_clients(mut self, clients: Arc<ClientRegistry>) -> Self {
        self.outbound.clients = Arc::clone(&clients);
        self.clients = clients;
        self
    }

    /// Replace the pull transport. Defaults to REST subscriptions.
    pub fn with_connector(mut self, connector: Arc<dyn SubscriptionConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn ChannelEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn with_message_log(mut self, log: Arc<dyn MessageLog>) -> Self {
        self.message_log = Some(log);
        self
    }

    pub fn with_pairing(mut self, pairing: Arc<dyn PairingLookup>) -> Self {
        self.pairing = Some(pairing);
        self
    }

    /// Budget for handling one webhook delivery.
    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = timeout;
        self
    }

    pub fn webhook_timeout(&self) -> Duration {
        self.webhook_timeout
    }

    pub fn config_snapshot(&self) -> GoogleChatConfig {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the configuration. Running listeners pick up policy changes
    /// on their next message; transport changes need a restart.
    pub fn update_config(&self, config: GoogleChatConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    pub fn resolve_account(&self, account_id: Option<&str>) -> ResolvedGoogleChatAccount {
        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        resolve_account(&config, account_id)
    }

    /// Like [`Self::resolve_account`], but only for IDs the config knows.
    /// An absent ID means the default account.
    pub fn resolve_known_account(
        &self,
        account_id: Option<&str>,
    ) -> chatrelay_channels::Result<ResolvedGoogleChatAccount> {
        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = account_id.map(str::trim).filter(|id| !id.is_empty())
            && !list_account_ids(&config).iter().any(|known| known == id)
        {
            return Err(chatrelay_channels::Error::unknown_account(id));
        }
        Ok(resolve_account(&config, account_id))
    }

    pub fn describe_account(&self, account_id: &str) -> AccountDescription {
        describe_account(&self.resolve_account(Some(account_id)))
    }

    pub fn dm_policy(&self, account_id: &str) -> DmPolicySummary {
        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        resolve_dm_policy(&config, Some(account_id))
    }

    pub fn set_account_enabled(&self, account_id: &str, enabled: bool) {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        config.set_account_enabled(account_id, enabled);
    }

    /// Stop the account's listener and remove its configuration.
    pub async fn delete_account(&self, account_id: &str) -> bool {
        self.stop_listener(account_id).await;
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        config.delete_account(account_id)
    }

    /// Inbound pipeline for one account, shared by both transports.
    pub fn pipeline(&self, account_id: &str) -> InboundPipeline {
        InboundPipeline {
            account_id: account_id.to_string(),
            config: Arc::clone(&self.config),
            runtime: self.runtime.get_or_create(account_id),
            event_sink: self.event_sink.clone(),
            message_log: self.message_log.clone(),
            pairing: self.pairing.clone(),
        }
    }

    pub async fn listener_state(&self, account_id: &str) -> Option<ListenerState> {
        let listeners = self.listeners.lock().await;
        listeners.get(account_id).map(PullListener::state)
    }

    /// Start a pull listener for an account.
    ///
    /// Fails for disabled or unconfigured accounts; other accounts are not
    /// affected. Starting a running account restarts its listener.
    pub async fn start_listener(&self, account_id: &str) -> Result<()> {
        let account = self.resolve_account(Some(account_id));
        let account_id = account.account_id.clone();
        if !account.enabled {
            return Err(chatrelay_channels::Error::unavailable(format!(
                "google chat account '{account_id}' is disabled"
            ))
            .into());
        }
        if account.project_id.is_empty() {
            return Err(Error::not_configured(&account_id, "project_id is empty"));
        }
        if account.subscription.is_empty() {
            return Err(Error::not_configured(&account_id, "subscription is empty"));
        }

        let runtime = self.runtime.get_or_create(&account_id);
        let subscription = match &self.connector {
            Some(connector) => connector.connect(&account),
            None => RestConnector::new(Arc::clone(&self.clients)).connect(&account),
        }
        .inspect_err(|e| runtime.record_error(e))?;

        // The map stays locked from stopping the old listener until the new
        // one is registered, so concurrent restarts cannot orphan a loop.
        let restarted = {
            let mut listeners = self.listeners.lock().await;
            let previous = listeners.remove(&account_id);
            if let Some(previous) = &previous {
                previous.stop().await;
            }
            let listener = PullListener::spawn(
                subscription,
                Arc::new(self.pipeline(&account_id)),
                CancellationToken::new(),
            );
            listeners.insert(account_id.clone(), listener);
            previous.is_some()
        };
        if restarted {
            self.announce_stopped(&account_id).await;
        }
        runtime.mark_started();
        info!(account_id = %account_id, "google chat account started");

        if let Some(sink) = &self.event_sink {
            sink.emit(ChannelEvent::ListenerStarted {
                channel_type: CHANNEL_ID.to_string(),
                account_id,
            })
            .await;
        }
        Ok(())
    }

    /// Stop an account's listener. Returns whether one was running.
    pub async fn stop_listener(&self, account_id: &str) -> bool {
        let listener = self.listeners.lock().await.remove(account_id);
        let Some(listener) = listener else {
            return false;
        };
        listener.stop().await;
        self.announce_stopped(account_id).await;
        true
    }

    async fn announce_stopped(&self, account_id: &str) {
        self.runtime.get_or_create(account_id).mark_stopped();
        info!(account_id, "google chat account stopped");
        if let Some(sink) = &self.event_sink {
            sink.emit(ChannelEvent::ListenerStopped {
                channel_type: CHANNEL_ID.to_string(),
                account_id: account_id.to_string(),
            })
            .await;
        }
    }

    /// Start every enabled account. A failing account does not prevent the
    /// others from starting; failures are returned per account.
    pub async fn start_enabled_accounts(&self) -> Vec<(String, Error)> {
        let accounts = {
            let config = self.config.read().unwrap_or_else(|e| e.into_inner());
            list_enabled_accounts(&config)
        };
        let mut failures = Vec::new();
        for account in accounts {
            if let Err(e) = self.start_listener(&account.account_id).await {
                warn!(account_id = %account.account_id, error = %e, "failed to start google chat account");
                failures.push((account.account_id, e));
            }
        }
        failures
    }

    /// Stop every running listener.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.listeners.lock().await.keys().cloned().collect();
        for id in ids {
            self.stop_listener(&id).await;
        }
    }

    pub fn health_snapshot(&self, account_id: &str) -> ChannelHealthSnapshot {
        let account = self.resolve_account(Some(account_id));
        let runtime = self.runtime.get_or_create(&account.account_id);
        let mut snapshot = runtime.snapshot(&account.account_id, account.is_configured());
        if account.is_configured() {
            snapshot.details = Some(account.subscription_path());
        }
        snapshot
    }
}

#[async_trait]
impl ChannelPlugin for GoogleChatPlugin {
    fn id(&self) -> &str {
        CHANNEL_ID
    }

    fn name(&self) -> &str {
        "Google Chat"
    }

    async fn start_account(&self, account_id: &str) -> anyhow::Result<()> {
        Ok(self.start_listener(account_id).await?)
    }

    async fn stop_account(&self, account_id: &str) -> anyhow::Result<()> {
        self.stop_listener(account_id).await;
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn ChannelOutbound> {
        Some(&self.outbound)
    }

    fn status(&self) -> Option<&dyn ChannelStatus> {
        Some(self)
    }
}

#[async_trait]
impl ChannelStatus for GoogleChatPlugin {
    async fn probe(&self, account_id: &str) -> chatrelay_channels::Result<ChannelHealthSnapshot> {
        let account = self.resolve_known_account(Some(account_id))?;
        Ok(self.health_snapshot(&account.account_id))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            event::ReceivedMessage,
            inbound::test_support::RecordingSink,
            pubsub::Subscription,
        },
        std::sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    struct IdleSubscription;

    #[async_trait]
    impl Subscription for IdleSubscription {
        fn name(&self) -> &str {
            "idle"
        }

        async fn pull(&self, _max_messages: u32) -> Result<Vec<ReceivedMessage>> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Vec::new())
        }

        async fn acknowledge(&self, _ack_ids: &[String]) -> Result<()> {
            Ok(())
        }

        async fn nack(&self, _ack_ids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        connected: Mutex<Vec<String>>,
    }

    impl SubscriptionConnector for CountingConnector {
        fn connect(&self, account: &ResolvedGoogleChatAccount) -> Result<Arc<dyn Subscription>> {
            self.connected
                .lock()
                .unwrap()
                .push(account.subscription_path());
            Ok(Arc::new(IdleSubscription))
        }
    }

    /// Connector whose subscriptions all bump one shared pull counter.
    #[derive(Default)]
    struct PullCountingConnector {
        pulls: Arc<AtomicUsize>,
    }

    struct CountedSubscription {
        pulls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Subscription for CountedSubscription {
        fn name(&self) -> &str {
            "counted"
        }

        async fn pull(&self, _max_messages: u32) -> Result<Vec<ReceivedMessage>> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(Vec::new())
        }

        async fn acknowledge(&self, _ack_ids: &[String]) -> Result<()> {
            Ok(())
        }

        async fn nack(&self, _ack_ids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    impl SubscriptionConnector for PullCountingConnector {
        fn connect(&self, _account: &ResolvedGoogleChatAccount) -> Result<Arc<dyn Subscription>> {
            Ok(Arc::new(CountedSubscription {
                pulls: Arc::clone(&self.pulls),
            }))
        }
    }

    fn configured() -> GoogleChatConfig {
        let mut config = GoogleChatConfig::default();
        config.base.project_id = Some("proj".into());
        config.base.subscription = Some("chat-sub".into());
        config
    }

    #[tokio::test]
    async fn start_fails_for_unconfigured_account_naming_it() {
        let mut config = GoogleChatConfig::default();
        config.accounts.insert("work".into(), crate::GoogleChatAccountConfig {
            subscription: Some("chat-sub".into()),
            ..Default::default()
        });
        let plugin = GoogleChatPlugin::new(config);

        let err = plugin.start_account("work").await.unwrap_err();
        assert!(err.to_string().contains("'work'"));
        assert!(err.to_string().contains("project_id"));
        assert!(!plugin.resolve_account(Some("work")).is_configured());
    }

    #[tokio::test]
    async fn start_fails_for_disabled_account() {
        let mut config = configured();
        config.base.enabled = Some(false);
        let plugin = GoogleChatPlugin::new(config);

        let err = plugin.start_listener("default").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Channel(chatrelay_channels::Error::Unavailable { .. })
        ));
        assert!(err.to_string().contains("'default' is disabled"));
        assert!(!err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn unknown_accounts_are_rejected() {
        let mut config = configured();
        config.accounts.insert("work".into(), Default::default());
        let plugin = GoogleChatPlugin::new(config);

        assert_eq!(
            plugin.resolve_known_account(Some(" work ")).unwrap().account_id,
            "work"
        );
        assert_eq!(plugin.resolve_known_account(None).unwrap().account_id, "work");
        let err = plugin.resolve_known_account(Some("bogus")).unwrap_err();
        assert!(matches!(err, chatrelay_channels::Error::UnknownAccount { .. }));
        assert!(plugin.probe("bogus").await.is_err());
        assert!(plugin.runtime.get("bogus").is_none());
    }

    #[tokio::test]
    async fn start_and_stop_lifecycle() {
        let connector = Arc::new(CountingConnector::default());
        let sink = Arc::new(RecordingSink::default());
        let plugin = GoogleChatPlugin::new(configured())
            .with_connector(connector.clone())
            .with_event_sink(sink.clone());

        plugin.start_account("default").await.unwrap();
        assert_eq!(*connector.connected.lock().unwrap(), vec![
            "projects/proj/subscriptions/chat-sub"
        ]);
        assert!(plugin.probe("default").await.unwrap().running);
        assert!(plugin.listener_state("default").await.is_some());

        plugin.stop_account("default").await.unwrap();
        plugin.stop_account("default").await.unwrap();
        let snapshot = plugin.probe("default").await.unwrap();
        assert!(!snapshot.running);
        assert!(snapshot.last_start_at.is_some());
        assert!(snapshot.last_stop_at.is_some());
        assert!(plugin.listener_state("default").await.is_none());

        let events = sink.events.lock().unwrap();
        assert!(matches!(events[0], ChannelEvent::ListenerStarted { .. }));
        assert!(matches!(events[1], ChannelEvent::ListenerStopped { .. }));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_restarts_leave_one_stoppable_listener() {
        let connector = Arc::new(PullCountingConnector::default());
        let pulls = Arc::clone(&connector.pulls);
        let plugin = GoogleChatPlugin::new(configured()).with_connector(connector);

        plugin.start_account("default").await.unwrap();
        let (first, second) = tokio::join!(
            plugin.start_account("default"),
            plugin.start_account("default")
        );
        first.unwrap();
        second.unwrap();

        plugin.stop_all().await;
        assert!(plugin.listener_state("default").await.is_none());
        assert!(!plugin.probe("default").await.unwrap().running);

        let after_stop = pulls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pulls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn start_enabled_accounts_collects_failures() {
        let mut config = configured();
        config.accounts.insert("good".into(), Default::default());
        config.accounts.insert("broken".into(), crate::GoogleChatAccountConfig {
            subscription: Some(" ".into()),
            ..Default::default()
        });
        config.accounts.insert("off".into(), crate::GoogleChatAccountConfig {
            enabled: Some(false),
            ..Default::default()
        });
        let plugin = GoogleChatPlugin::new(config)
            .with_connector(Arc::new(CountingConnector::default()));

        let failures = plugin.start_enabled_accounts().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "broken");
        assert!(plugin.probe("good").await.unwrap().running);
        assert!(!plugin.probe("off").await.unwrap().running);
        plugin.stop_all().await;
        assert!(!plugin.probe("good").await.unwrap().running);
    }

    #[tokio::test]
    async fn probe_reports_configuration() {
        let plugin = GoogleChatPlugin::new(GoogleChatConfig::default());
        let snapshot = plugin.probe("default").await.unwrap();
        assert!(!snapshot.configured);
        assert!(!snapshot.running);

        plugin.update_config(configured());
        let snapshot = plugin.probe("default").await.unwrap();
        assert!(snapshot.configured);
        assert_eq!(
            snapshot.details.as_deref(),
            Some("projects/proj/subscriptions/chat-sub")
        );
    }

    #[tokio::test]
    async fn delete_account_stops_listener_and_clears_config() {
        let plugin = GoogleChatPlugin::new(configured())
            .with_connector(Arc::new(CountingConnector::default()));
        plugin.start_account("default").await.unwrap();

        assert!(plugin.delete_account("default").await);
        assert!(plugin.listener_state("default").await.is_none());
        assert!(!plugin.describe_account("default").configured);
    }

    #[test]
    fn enable_toggle_updates_shared_config() {
        let plugin = GoogleChatPlugin::new(configured());
        plugin.set_account_enabled("default", false);
        assert!(!plugin.resolve_account(None).enabled);
        assert_eq!(plugin.config_snapshot().base.enabled, Some(false));
        assert_eq!(plugin.dm_policy("default").policy_path, "dm_policy");
    }

    #[test]
    fn exposes_outbound_and_status() {
        let plugin = GoogleChatPlugin::new(GoogleChatConfig::default());
        assert_eq!(plugin.id(), "googlechat");
        assert!(plugin.outbound().is_some());
        assert!(plugin.status().is_some());
    }
}
