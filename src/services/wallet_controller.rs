use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, watch};

use crate::constants::WALLET_EVENT_CHANNEL_CAPACITY;
use crate::error::WalletError;
use crate::models::{ConnectedWalletSet, Ecosystem, WalletEvent, WalletHandle};
use crate::providers::{ConnectContext, WalletProviders};
use crate::services::notification_service::NotificationService;
use crate::services::wallet_observer::{Subscription, WalletObserver};
use crate::services::wallet_storage::WalletStorage;
use crate::utils::short_address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectOutcome {
    Connected { wallet: WalletHandle },
    /// The caller should follow `url` into the wallet app.
    Redirecting { url: String },
}

struct ControllerInner {
    providers: WalletProviders,
    observer: WalletObserver,
    storage: Arc<WalletStorage>,
    notices: NotificationService,
    snapshot: RwLock<ConnectedWalletSet>,
    busy: [AtomicBool; 3],
    events: broadcast::Sender<WalletEvent>,
    subscription: Mutex<Option<Subscription>>,
    persist_tx: watch::Sender<PersistRequest>,
    persisted: watch::Receiver<u64>,
    background_writer: bool,
}

#[derive(Debug, Clone, Default)]
struct PersistRequest {
    version: u64,
    wallets: ConnectedWalletSet,
}

impl ControllerInner {
    // Observer events are the only writer of the snapshot.
    fn apply_event(&self, event: &WalletEvent) {
        {
            let mut snapshot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
            match event.address() {
                Some(address) => snapshot.set(WalletHandle::new(event.ecosystem(), address)),
                None => snapshot.clear(event.ecosystem()),
            }
            // Queued under the snapshot lock so writes land in event order.
            self.persist(snapshot.clone());
        }
        // No WebSocket clients is fine.
        let _ = self.events.send(event.clone());
    }

    // Hands the snapshot to the writer task, or writes inline without a
    // runtime.
    fn persist(&self, wallets: ConnectedWalletSet) {
        if self.background_writer {
            self.persist_tx.send_modify(|request| {
                request.version += 1;
                request.wallets = wallets;
            });
        } else if let Err(err) = self.storage.save(&wallets) {
            tracing::warn!(
                "Failed to persist wallet state to {}: {}",
                self.storage.path().display(),
                err
            );
        }
    }
}

// Writes the latest queued snapshot off the async workers. Intermediate
// snapshots are skipped when writes fall behind.
async fn persistence_worker(
    storage: Arc<WalletStorage>,
    mut requests: watch::Receiver<PersistRequest>,
    persisted: watch::Sender<u64>,
) {
    while requests.changed().await.is_ok() {
        let request = requests.borrow_and_update().clone();
        let writer = storage.clone();
        match tokio::task::spawn_blocking(move || writer.save(&request.wallets)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(
                "Failed to persist wallet state to {}: {}",
                storage.path().display(),
                err
            ),
            Err(err) => tracing::error!("Wallet state writer panicked: {}", err),
        }
        persisted.send_replace(request.version);
    }
    tracing::debug!("Wallet state writer stopped");
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn busy_slot(ecosystem: Ecosystem) -> usize {
    match ecosystem {
        Ecosystem::Evm => 0,
        Ecosystem::Solana => 1,
        Ecosystem::Bitcoin => 2,
    }
}

/// Connect, disconnect and restore flows for the three wallets.
#[derive(Clone)]
pub struct WalletController {
    inner: Arc<ControllerInner>,
}

impl WalletController {
    pub fn new(
        providers: WalletProviders,
        observer: WalletObserver,
        storage: WalletStorage,
        notices: NotificationService,
    ) -> Self {
        let (events, _) = broadcast::channel(WALLET_EVENT_CHANNEL_CAPACITY);
        let storage = Arc::new(storage);
        let (persist_tx, requests) = watch::channel(PersistRequest::default());
        let (acks, persisted) = watch::channel(0);
        let background_writer = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(persistence_worker(storage.clone(), requests, acks));
                true
            }
            Err(_) => false,
        };
        let inner = Arc::new(ControllerInner {
            providers,
            observer,
            storage,
            notices,
            snapshot: RwLock::new(ConnectedWalletSet::default()),
            busy: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
            events,
            subscription: Mutex::new(None),
            persist_tx,
            persisted,
            background_writer,
        });

        let weak = Arc::downgrade(&inner);
        let subscription = inner.observer.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_event(event);
            }
        });
        *inner.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);

        Self { inner }
    }

    pub fn snapshot(&self) -> ConnectedWalletSet {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WalletEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_connecting(&self, ecosystem: Ecosystem) -> bool {
        self.inner.busy[busy_slot(ecosystem)].load(Ordering::Acquire)
    }

    pub fn observer(&self) -> &WalletObserver {
        &self.inner.observer
    }

    /// Waits until every snapshot queued so far is on disk.
    pub async fn flush(&self) {
        if !self.inner.background_writer {
            return;
        }
        let target = self.inner.persist_tx.borrow().version;
        let mut persisted = self.inner.persisted.clone();
        if persisted.wait_for(|version| *version >= target).await.is_err() {
            tracing::warn!("Wallet state writer is gone, latest state may be unsaved");
        }
    }

    // Internal helper that claims the per-ecosystem busy flag.
    fn try_begin(&self, ecosystem: Ecosystem) -> Option<BusyGuard<'_>> {
        let flag = &self.inner.busy[busy_slot(ecosystem)];
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }

    fn notify_not_installed(&self, ecosystem: Ecosystem) {
        self.inner
            .notices
            .error(format!("{} wallet is not installed", ecosystem.display_name()));
    }

    /// Prompts the wallet of `ecosystem`. At most one attempt per ecosystem
    /// runs at a time; a concurrent call fails with `ConnectInProgress`.
    pub async fn connect(
        &self,
        ecosystem: Ecosystem,
        ctx: &ConnectContext,
    ) -> Result<ConnectOutcome, WalletError> {
        let _busy = self
            .try_begin(ecosystem)
            .ok_or(WalletError::ConnectInProgress)?;
        let provider = self.inner.providers.get(ecosystem);

        // Mobile browsers have no injected provider; the adapter decides.
        if !ctx.is_mobile() && !provider.is_installed().await {
            self.notify_not_installed(ecosystem);
            return Err(WalletError::ProviderNotInstalled);
        }

        match provider.connect(ctx).await {
            Ok(wallet) => {
                self.inner
                    .observer
                    .update_address(ecosystem, Some(wallet.address.clone()));
                self.inner
                    .notices
                    .success(format!("{} wallet connected", ecosystem.label()));
                Ok(ConnectOutcome::Connected { wallet })
            }
            Err(WalletError::Redirecting { url }) => Ok(ConnectOutcome::Redirecting { url }),
            Err(WalletError::ProviderNotInstalled) => {
                self.notify_not_installed(ecosystem);
                Err(WalletError::ProviderNotInstalled)
            }
            Err(err) => {
                tracing::error!("Error connecting {} wallet: {}", ecosystem.label(), err);
                self.inner.notices.error(format!(
                    "Failed to connect {} wallet: {}",
                    ecosystem.label(),
                    err
                ));
                Err(err)
            }
        }
    }

    pub async fn disconnect(&self, ecosystem: Ecosystem) {
        self.inner.providers.get(ecosystem).disconnect().await;
        self.inner.observer.update_address(ecosystem, None);
        self.inner
            .notices
            .success(format!("{} wallet disconnected", ecosystem.label()));
    }

    /// Restores persisted wallets that are still connected and prunes the
    /// rest from the state file.
    pub async fn restore(&self) -> ConnectedWalletSet {
        let stored = self.inner.storage.load();
        for wallet in stored.connected() {
            let provider = self.inner.providers.get(wallet.ecosystem);
            if provider.check_still_connected(wallet).await {
                tracing::info!(
                    "Restored {} wallet {}",
                    wallet.ecosystem.label(),
                    short_address(&wallet.address)
                );
                self.inner
                    .observer
                    .update_address(wallet.ecosystem, Some(wallet.address.clone()));
            } else {
                tracing::info!(
                    "Stored {} wallet is no longer connected",
                    wallet.ecosystem.label()
                );
            }
        }

        let snapshot = self.snapshot();
        self.inner.persist(snapshot.clone());
        self.flush().await;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::MockSet;
    use crate::services::wallet_observer::tests::quiet_settings;
    use std::path::PathBuf;
    use std::time::Duration;

    fn state_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "wallet-controller-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("connected_wallets.json");
        let _ = std::fs::remove_file(&path);
        path
    }

    fn controller(mocks: &MockSet, path: &PathBuf) -> (WalletController, NotificationService) {
        let notices = NotificationService::new();
        let observer = WalletObserver::new(mocks.providers(), notices.clone(), quiet_settings());
        let controller = WalletController::new(
            mocks.providers(),
            observer,
            WalletStorage::new(path),
            notices.clone(),
        );
        (controller, notices)
    }

    #[tokio::test]
    async fn connect_updates_snapshot_and_persists() {
        // Memastikan koneksi sukses memperbarui snapshot dan file state
        let mocks = MockSet::new();
        mocks.evm.set_connect_result(Ok("0xAbC0000000000000000000000000000000001234"));
        let path = state_path("connect");
        let (controller, notices) = controller(&mocks, &path);
        let mut events = controller.subscribe_events();

        let outcome = controller
            .connect(Ecosystem::Evm, &ConnectContext::default())
            .await
            .unwrap();
        assert!(matches!(outcome, ConnectOutcome::Connected { .. }));

        let snapshot = controller.snapshot();
        assert_eq!(
            snapshot.evm.as_ref().map(|w| w.address.as_str()),
            Some("0xAbC0000000000000000000000000000000001234")
        );
        controller.flush().await;
        assert_eq!(WalletStorage::new(&path).load(), snapshot);
        assert!(matches!(
            events.recv().await.unwrap(),
            WalletEvent::Connect { ecosystem: Ecosystem::Evm, .. }
        ));
        assert!(notices
            .recent()
            .iter()
            .any(|n| n.message == "EVM wallet connected"));
        assert!(!controller.is_connecting(Ecosystem::Evm));
    }

    #[tokio::test]
    async fn missing_wallet_posts_not_installed_notice() {
        // Memastikan wallet yang tidak terpasang menghasilkan notifikasi
        let mocks = MockSet::new();
        mocks.bitcoin.set_installed(false);
        let (controller, notices) = controller(&mocks, &state_path("missing"));

        let err = controller
            .connect(Ecosystem::Bitcoin, &ConnectContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, WalletError::ProviderNotInstalled);
        assert_eq!(mocks.bitcoin.connect_calls.load(Ordering::SeqCst), 0);
        assert_eq!(notices.recent()[0].message, "Bitcoin wallet is not installed");
        assert!(controller.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_connect_is_rejected() {
        // Memastikan koneksi ganda untuk ekosistem yang sama ditolak
        let mocks = MockSet::new();
        mocks.solana.set_connect_result(Ok("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"));
        mocks.solana.set_connect_delay(Duration::from_millis(200));
        let (controller, _) = controller(&mocks, &state_path("concurrent"));
        let ctx = ConnectContext::default();

        let (first, second) = tokio::join!(
            controller.connect(Ecosystem::Solana, &ctx),
            controller.connect(Ecosystem::Solana, &ctx)
        );
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), WalletError::ConnectInProgress);
        assert_eq!(mocks.solana.connect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn redirect_is_not_an_error() {
        // Memastikan redirect mobile dikembalikan sebagai outcome, bukan error
        let mocks = MockSet::new();
        mocks.solana.set_connect_result(Err(WalletError::Redirecting {
            url: "https://phantom.app/ul/browse/x".to_string(),
        }));
        let (controller, notices) = controller(&mocks, &state_path("redirect"));
        let ctx = ConnectContext {
            user_agent: Some("Mozilla/5.0 (Linux; Android 14) Mobile".to_string()),
            dapp_url: None,
        };

        let outcome = controller.connect(Ecosystem::Solana, &ctx).await.unwrap();
        assert_eq!(
            outcome,
            ConnectOutcome::Redirecting {
                url: "https://phantom.app/ul/browse/x".to_string()
            }
        );
        assert!(controller.snapshot().solana.is_none());
        assert!(notices.recent().is_empty());
    }

    #[tokio::test]
    async fn rejection_leaves_state_unchanged() {
        // Memastikan penolakan user tidak mengubah state
        let mocks = MockSet::new();
        let (controller, notices) = controller(&mocks, &state_path("rejected"));

        let err = controller
            .connect(Ecosystem::Evm, &ConnectContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, WalletError::UserRejected);
        assert!(controller.snapshot().is_empty());
        assert_eq!(
            notices.recent()[0].level,
            crate::services::notification_service::NoticeLevel::Error
        );
        assert!(!controller.is_connecting(Ecosystem::Evm));
    }

    #[tokio::test]
    async fn disconnect_clears_slot() {
        // Memastikan disconnect mengosongkan slot ekosistem
        let mocks = MockSet::new();
        mocks.bitcoin.set_connect_result(Ok("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"));
        let (controller, notices) = controller(&mocks, &state_path("disconnect"));

        controller
            .connect(Ecosystem::Bitcoin, &ConnectContext::default())
            .await
            .unwrap();
        controller.disconnect(Ecosystem::Bitcoin).await;

        assert!(controller.snapshot().bitcoin.is_none());
        assert_eq!(mocks.bitcoin.disconnect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            notices.recent().last().map(|n| n.message.clone()).as_deref(),
            Some("BITCOIN wallet disconnected")
        );
    }

    #[tokio::test]
    async fn restore_keeps_only_live_wallets() {
        // Memastikan restore hanya memulihkan wallet yang masih terhubung
        let mocks = MockSet::new();
        mocks.bitcoin.set_still_connected(false);
        let path = state_path("restore");
        let mut stored = ConnectedWalletSet::default();
        stored.set(WalletHandle::new(Ecosystem::Evm, "0xabc"));
        stored.set(WalletHandle::new(Ecosystem::Bitcoin, "bc1qpay"));
        WalletStorage::new(&path).save(&stored).unwrap();

        let (controller, _) = controller(&mocks, &path);
        let restored = controller.restore().await;

        assert_eq!(restored.evm.as_ref().map(|w| w.address.as_str()), Some("0xabc"));
        assert!(restored.bitcoin.is_none());
        assert_eq!(WalletStorage::new(&path).load(), restored);
    }

    #[tokio::test]
    async fn observer_changes_flow_into_snapshot() {
        // Memastikan pergantian akun dari observer masuk ke snapshot
        let mocks = MockSet::new();
        let (controller, _) = controller(&mocks, &state_path("observer"));

        controller
            .observer()
            .update_address(Ecosystem::Solana, Some("A".to_string()));
        controller
            .observer()
            .update_address(Ecosystem::Solana, Some("B".to_string()));
        assert_eq!(
            controller.snapshot().solana,
            Some(WalletHandle::new(Ecosystem::Solana, "B"))
        );
    }

    #[tokio::test]
    async fn state_file_follows_rapid_changes() {
        // Memastikan file state berakhir pada snapshot terakhir walau perubahan beruntun
        let mocks = MockSet::new();
        let path = state_path("rapid");
        let (controller, _) = controller(&mocks, &path);

        for address in ["A", "B", "C"] {
            controller
                .observer()
                .update_address(Ecosystem::Solana, Some(address.to_string()));
        }
        controller
            .observer()
            .update_address(Ecosystem::Evm, Some("0xabc".to_string()));
        controller.observer().update_address(Ecosystem::Evm, None);
        controller.flush().await;

        let stored = WalletStorage::new(&path).load();
        assert_eq!(stored, controller.snapshot());
        assert_eq!(stored.solana, Some(WalletHandle::new(Ecosystem::Solana, "C")));
        assert!(stored.evm.is_none());
    }

    #[test]
    fn state_is_written_inline_without_runtime() {
        // Memastikan state tetap ditulis langsung saat tidak ada runtime async
        let mocks = MockSet::new();
        let path = state_path("inline");
        let (controller, _) = controller(&mocks, &path);

        controller
            .observer()
            .update_address(Ecosystem::Bitcoin, Some("bc1qpay".to_string()));
        assert_eq!(
            WalletStorage::new(&path).load().bitcoin,
            Some(WalletHandle::new(Ecosystem::Bitcoin, "bc1qpay"))
        );
    }
}
