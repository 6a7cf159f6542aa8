// ── Controller context ──
//
// Owns the channel and every entity store for one controller. Stores are
// wired at construction; `connect` starts the link plus a watcher that
// re-requests every collection each time the link opens.

use std::sync::Arc;
use std::time::Duration;

use espgrow_api::{
    BackupClient, Channel, ConfigBundle, ConnectionState, Connector, Subscription,
    WebSocketConnector,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::error::CoreError;
use crate::store::{DeviceStore, RuleStore, SensorStore, SettingsStore, SystemStore};

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    channel: Channel,
    stores: Stores,
    subscriptions: Mutex<Vec<Subscription>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
struct Stores {
    devices: DeviceStore,
    sensors: SensorStore,
    rules: RuleStore,
    system: SystemStore,
    settings: SettingsStore,
}

impl Controller {
    /// Create a controller talking WebSocket. Does NOT connect -- call
    /// [`connect()`](Self::connect).
    pub fn new(config: ControllerConfig) -> Result<Self, CoreError> {
        Self::with_connector(config, WebSocketConnector)
    }

    /// Create a controller over an arbitrary transport.
    pub fn with_connector(
        config: ControllerConfig,
        connector: impl Connector,
    ) -> Result<Self, CoreError> {
        let zone = config.schedule_zone()?;
        let channel = Channel::new(connector, config.channel_config());

        let stores = Stores {
            devices: DeviceStore::new(channel.clone(), config.toggle_timeout),
            sensors: SensorStore::new(channel.clone()),
            rules: RuleStore::new(channel.clone(), zone),
            system: SystemStore::new(channel.clone()),
            settings: SettingsStore::new(channel.clone()),
        };

        let mut subscriptions = stores.devices.attach();
        subscriptions.extend(stores.sensors.attach());
        subscriptions.extend(stores.rules.attach());
        subscriptions.extend(stores.system.attach());
        subscriptions.extend(stores.settings.attach());
        debug!(handlers = subscriptions.len(), "stores attached");

        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                channel,
                stores,
                subscriptions: Mutex::new(subscriptions),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Start the link and keep it up.
    ///
    /// Every transition into `Open` requests sensors, devices, rules,
    /// settings and system info. Must be called from within a Tokio
    /// runtime.
    pub fn connect(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::ControllerDisconnected);
        }

        {
            let mut handles = self.inner.task_handles.lock();
            handles.retain(|h| !h.is_finished());
            if handles.is_empty() {
                // Subscribe before connecting so the first open is seen.
                let state = self.inner.channel.watch_state();
                handles.push(tokio::spawn(refresh_on_open(
                    self.inner.stores.clone(),
                    state,
                    self.inner.cancel.clone(),
                )));
            }
        }

        info!(url = %self.inner.config.url, "connecting to controller");
        self.inner.channel.connect(self.inner.config.url.clone());
        Ok(())
    }

    /// Force a fresh connection to the same URL.
    pub fn reconnect(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::ControllerDisconnected);
        }
        self.inner.channel.disconnect();
        self.connect()
    }

    /// Wait until the link is open.
    pub async fn wait_open(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut rx = self.inner.channel.watch_state();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| s.is_open() || *s == ConnectionState::Closed),
        )
        .await;

        match waited {
            Ok(Ok(state)) if state.is_open() => Ok(()),
            Ok(_) => Err(CoreError::ControllerDisconnected),
            Err(_) => Err(CoreError::ConnectionFailed {
                url: self.inner.config.url.to_string(),
                reason: self
                    .inner
                    .channel
                    .last_error()
                    .unwrap_or_else(|| format!("not open after {}s", timeout.as_secs())),
            }),
        }
    }

    /// Tear down the link, stop background tasks and detach every store.
    ///
    /// The controller cannot be reconnected afterwards.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.channel.disconnect();

        let handles: Vec<JoinHandle<()>> = self.inner.task_handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        let subscriptions: Vec<Subscription> = self.inner.subscriptions.lock().drain(..).collect();
        let detached = subscriptions.iter().filter(|s| s.unsubscribe()).count();
        debug!(detached, "controller shut down");
    }

    // ── State observation ────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.channel.state()
    }

    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.channel.watch_state()
    }

    // ── Stores ───────────────────────────────────────────────────────

    pub fn devices(&self) -> &DeviceStore {
        &self.inner.stores.devices
    }

    pub fn sensors(&self) -> &SensorStore {
        &self.inner.stores.sensors
    }

    pub fn rules(&self) -> &RuleStore {
        &self.inner.stores.rules
    }

    pub fn system(&self) -> &SystemStore {
        &self.inner.stores.system
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.inner.stores.settings
    }

    // ── Backup / restore (HTTP) ──────────────────────────────────────

    /// Download the controller's devices, rules and sensors.
    pub async fn backup(&self) -> Result<ConfigBundle, CoreError> {
        let client = BackupClient::new(&self.inner.config.url, self.inner.config.request_timeout)?;
        Ok(client.backup().await?)
    }

    /// Replace the controller's configuration. The controller re-pushes
    /// all three collections afterwards.
    pub async fn restore(&self, bundle: &ConfigBundle) -> Result<(), CoreError> {
        let client = BackupClient::new(&self.inner.config.url, self.inner.config.request_timeout)?;
        client.restore(bundle).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("url", &self.inner.config.url.as_str())
            .field("channel", &self.inner.channel)
            .finish_non_exhaustive()
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Re-request every collection on each transition into `Open`.
async fn refresh_on_open(
    stores: Stores,
    mut state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    let mut was_open = false;
    loop {
        let open = state.borrow_and_update().is_open();
        if open && !was_open {
            request_all(&stores);
        }
        was_open = open;

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("refresh watcher exiting");
}

fn request_all(stores: &Stores) {
    let requests: [(&str, Result<(), CoreError>); 5] = [
        ("sensors", stores.sensors.request()),
        ("devices", stores.devices.request()),
        ("rules", stores.rules.request()),
        ("settings", stores.settings.request()),
        ("system_info", stores.system.request_info()),
    ];
    for (what, result) in requests {
        if let Err(e) = result {
            warn!(what, error = %e, "initial request failed");
        }
    }
    debug!("link open, collections requested");
}
