use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::Config;
use crate::constants::{BITCOIN_POLL_INTERVAL_SECS, WALLET_POLL_INTERVAL_SECS};
use crate::models::{Ecosystem, WalletEvent};
use crate::providers::{AccountSignal, WalletProvider, WalletProviders};
use crate::services::notification_service::NotificationService;
use crate::utils::short_address;

/// Handlers run synchronously on the emitting task and must not call back
/// into the observer.
pub type WalletEventHandler = Arc<dyn Fn(&WalletEvent) + Send + Sync>;

/// Last observed address per ecosystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalletAddresses {
    pub evm: Option<String>,
    pub solana: Option<String>,
    pub bitcoin: Option<String>,
}

impl WalletAddresses {
    pub fn get(&self, ecosystem: Ecosystem) -> Option<&str> {
        match ecosystem {
            Ecosystem::Evm => self.evm.as_deref(),
            Ecosystem::Solana => self.solana.as_deref(),
            Ecosystem::Bitcoin => self.bitcoin.as_deref(),
        }
    }

    fn set(&mut self, ecosystem: Ecosystem, address: Option<String>) {
        match ecosystem {
            Ecosystem::Evm => self.evm = address,
            Ecosystem::Solana => self.solana = address,
            Ecosystem::Bitcoin => self.bitcoin = address,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverSettings {
    /// Fallback poll for wallets without a push channel.
    pub poll_interval: Duration,
    pub bitcoin_poll_interval: Duration,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(WALLET_POLL_INTERVAL_SECS),
            bitcoin_poll_interval: Duration::from_secs(BITCOIN_POLL_INTERVAL_SECS),
        }
    }
}

impl ObserverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.wallet_poll_interval(),
            bitcoin_poll_interval: config.bitcoin_poll_interval(),
        }
    }
}

/// Classifies an address transition.
///
/// | previous | next | event |
/// |---|---|---|
/// | none | X | connect |
/// | X | none | disconnect |
/// | X | Y | account changed |
/// | X | X | nothing |
pub fn classify_transition(
    ecosystem: Ecosystem,
    previous: Option<&str>,
    next: Option<&str>,
) -> Option<WalletEvent> {
    match (previous, next) {
        (None, Some(address)) => Some(WalletEvent::Connect {
            ecosystem,
            address: address.to_string(),
        }),
        (Some(_), None) => Some(WalletEvent::Disconnect { ecosystem }),
        (Some(old), Some(new)) if !ecosystem.addresses_equal(old, new) => {
            Some(WalletEvent::AccountChanged {
                ecosystem,
                address: new.to_string(),
            })
        }
        _ => None,
    }
}

#[derive(Default)]
struct ObserverState {
    addresses: WalletAddresses,
    subscribers: Vec<(u64, WalletEventHandler)>,
    next_subscriber_id: u64,
    watchers: Vec<JoinHandle<()>>,
}

struct ObserverInner {
    providers: WalletProviders,
    notices: NotificationService,
    settings: ObserverSettings,
    state: Mutex<ObserverState>,
    // Held across classification and delivery so events reach handlers in
    // transition order.
    emit_lock: Mutex<()>,
}

/// Watches the three wallets and turns raw account changes into
/// connect/disconnect/account-changed events.
#[derive(Clone)]
pub struct WalletObserver {
    inner: Arc<ObserverInner>,
}

/// Registration handle; dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes the handler"]
pub struct Subscription {
    id: u64,
    observer: Weak<ObserverInner>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.observer.upgrade() {
            WalletObserver { inner }.unsubscribe(self.id);
        }
    }
}

impl WalletObserver {
    pub fn new(
        providers: WalletProviders,
        notices: NotificationService,
        settings: ObserverSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                providers,
                notices,
                settings,
                state: Mutex::new(ObserverState::default()),
                emit_lock: Mutex::new(()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ObserverState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers `handler`. The first subscriber starts the wallet watchers
    /// when a Tokio runtime is available.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&WalletEvent) + Send + Sync + 'static,
    {
        let mut state = self.state();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.push((id, Arc::new(handler)));

        if state.watchers.is_empty() {
            if tokio::runtime::Handle::try_current().is_ok() {
                tracing::info!("Starting wallet observers");
                state.watchers = self.spawn_watchers();
            } else {
                tracing::debug!("No async runtime, wallet observers not started");
            }
        }

        Subscription {
            id,
            observer: Arc::downgrade(&self.inner),
        }
    }

    fn unsubscribe(&self, id: u64) {
        let watchers = {
            let mut state = self.state();
            state.subscribers.retain(|(sub_id, _)| *sub_id != id);
            if state.subscribers.is_empty() {
                std::mem::take(&mut state.watchers)
            } else {
                Vec::new()
            }
        };
        if !watchers.is_empty() {
            tracing::info!("Stopping wallet observers");
            watchers.iter().for_each(JoinHandle::abort);
        }
    }

    /// Stops the watchers and drops every subscriber.
    pub fn stop(&self) {
        let watchers = {
            let mut state = self.state();
            state.subscribers.clear();
            std::mem::take(&mut state.watchers)
        };
        if !watchers.is_empty() {
            tracing::info!("Stopping wallet observers");
        }
        watchers.iter().for_each(JoinHandle::abort);
    }

    pub fn is_watching(&self) -> bool {
        !self.state().watchers.is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn addresses(&self) -> WalletAddresses {
        self.state().addresses.clone()
    }

    /// Records the latest address for `ecosystem` and emits the resulting
    /// event, if any, to every subscriber.
    pub fn update_address(
        &self,
        ecosystem: Ecosystem,
        address: Option<String>,
    ) -> Option<WalletEvent> {
        let address = address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        let _emit = self.inner.emit_lock.lock().unwrap_or_else(|e| e.into_inner());
        let (event, handlers) = {
            let mut state = self.state();
            let event =
                classify_transition(ecosystem, state.addresses.get(ecosystem), address.as_deref());
            if event.is_some() {
                state.addresses.set(ecosystem, address);
            }
            let handlers: Vec<WalletEventHandler> = state
                .subscribers
                .iter()
                .map(|(_, handler)| handler.clone())
                .collect();
            (event, handlers)
        };

        let event = event?;
        match &event {
            WalletEvent::Connect { address, .. } => {
                tracing::info!("{} wallet connected: {}", ecosystem.label(), short_address(address));
            }
            WalletEvent::Disconnect { .. } => {
                tracing::info!("{} wallet disconnected", ecosystem.label());
            }
            WalletEvent::AccountChanged { address, .. } => {
                tracing::info!(
                    "{} wallet account changed: {}",
                    ecosystem.label(),
                    short_address(address)
                );
                self.inner
                    .notices
                    .success(format!("{} wallet account changed", ecosystem.label()));
            }
        }

        for handler in handlers {
            handler(&event);
        }
        Some(event)
    }

    fn spawn_watchers(&self) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.clone().watch_evented(Ecosystem::Evm)),
            tokio::spawn(self.clone().watch_evented(Ecosystem::Solana)),
            tokio::spawn(self.clone().watch_bitcoin()),
        ]
    }

    // Watcher for wallets that can push account changes.
    async fn watch_evented(self, ecosystem: Ecosystem) {
        let provider = self.inner.providers.get(ecosystem);
        if !provider.is_installed().await {
            tracing::debug!("{} wallet not installed, observer idle", ecosystem.label());
            return;
        }

        // Subscribe before the initial query so no change is missed in between.
        let signals = provider.account_signals();

        match ecosystem {
            Ecosystem::Solana => match provider.reconnect_silently().await {
                Ok(Some(account)) => {
                    self.update_address(ecosystem, Some(account));
                    tracing::info!("Successfully auto-reconnected to Phantom wallet");
                }
                Ok(None) => {}
                Err(err) => tracing::info!(
                    "Phantom auto-reconnect failed, user will need to connect manually: {}",
                    err
                ),
            },
            _ => match provider.current_account().await {
                Ok(Some(account)) => {
                    self.update_address(ecosystem, Some(account));
                }
                Ok(None) => {}
                Err(err) => tracing::warn!("Error getting {} accounts: {}", ecosystem.label(), err),
            },
        }

        match signals {
            Some(rx) => self.follow_signals(ecosystem, rx, provider).await,
            None => self.poll_account(ecosystem, provider).await,
        }
    }

    async fn follow_signals(
        &self,
        ecosystem: Ecosystem,
        mut rx: broadcast::Receiver<AccountSignal>,
        provider: Arc<dyn WalletProvider>,
    ) {
        loop {
            match rx.recv().await {
                Ok(signal) => {
                    self.update_address(ecosystem, signal.account);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "{} account signals lagged by {}, resyncing",
                        ecosystem.label(),
                        skipped
                    );
                    if let Ok(account) = provider.current_account().await {
                        self.update_address(ecosystem, account);
                    }
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("{} account signal channel closed", ecosystem.label());
                    break;
                }
            }
        }
    }

    // Errors keep the last known state.
    async fn poll_account(&self, ecosystem: Ecosystem, provider: Arc<dyn WalletProvider>) {
        let period = self.inner.settings.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match provider.current_account().await {
                Ok(account) => {
                    self.update_address(ecosystem, account);
                }
                Err(err) => {
                    tracing::debug!("{} poll failed, keeping last state: {}", ecosystem.label(), err);
                }
            }
        }
    }

    // sats-connect has no events: reconnect once, then poll. Any failure
    // counts as a disconnect.
    async fn watch_bitcoin(self) {
        let provider = self.inner.providers.get(Ecosystem::Bitcoin);
        match provider.current_account().await {
            Ok(Some(account)) => {
                self.update_address(Ecosystem::Bitcoin, Some(account));
                tracing::info!("Successfully auto-reconnected to Bitcoin wallet");
            }
            Ok(None) => {}
            Err(err) => tracing::debug!(
                "Bitcoin auto-reconnect failed, user will need to connect manually: {}",
                err
            ),
        }

        let period = self.inner.settings.bitcoin_poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let account = provider.current_account().await.unwrap_or_else(|err| {
                tracing::debug!("Bitcoin wallet poll failed: {}", err);
                None
            });
            self.update_address(Ecosystem::Bitcoin, account);
        }
    }
}
