//! Poll coordination for one device, plus a registry running several.
//!
//! A [`Coordinator`] owns its SNMP session exclusively. Polls run one at a
//! time on a fixed interval; ticks that fire while a poll is still in
//! flight are skipped, not queued. Every state change is published as a
//! whole [`DeviceView`] through a `watch` channel, so readers never see a
//! half-replaced snapshot.

use crate::config::{CoordinatorSettings, MonitorFile, SessionConfig};
use crate::error::{MonitorError, Result};
use crate::metrics::catalogue::OID_SYS_UPTIME;
use crate::metrics::{Snapshot, SnapshotAssembler};
use crate::snmp::{fetch_scalar, Connector, SnmpTransport};
use futures_util::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

/// Coordinator state machine: `Idle -> Polling -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Polling,
}

/// Error as shown to consumers: a stable kind code plus a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
}

impl From<&MonitorError> for ErrorReport {
    fn from(err: &MonitorError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Everything a consumer may read about one device, published atomically.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub name: String,
    pub state: PollState,
    /// Sequence of the cached snapshot; 0 before the first success
    pub sequence: u64,
    pub consecutive_failures: u32,
    /// True once consecutive failures reach the staleness threshold
    pub stale: bool,
    pub last_error: Option<ErrorReport>,
    #[serde(skip)]
    pub snapshot: Option<Arc<Snapshot>>,
}

/// Polls one device and caches its last good snapshot.
pub struct Coordinator {
    name: String,
    config: SessionConfig,
    settings: CoordinatorSettings,
    connector: Arc<dyn Connector>,
    assembler: SnapshotAssembler,
    session: Option<Box<dyn SnmpTransport>>,
    state: PollState,
    consecutive_failures: u32,
    sequence: u64,
    last_good: Option<Arc<Snapshot>>,
    last_error: Option<MonitorError>,
    publisher: watch::Sender<DeviceView>,
}

impl Coordinator {
    pub fn new(
        name: impl Into<String>,
        config: SessionConfig,
        settings: CoordinatorSettings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let name = name.into();
        let (publisher, _) = watch::channel(DeviceView {
            name: name.clone(),
            state: PollState::Idle,
            sequence: 0,
            consecutive_failures: 0,
            stale: false,
            last_error: None,
            snapshot: None,
        });
        Self {
            name,
            config,
            assembler: SnapshotAssembler::new(&settings),
            settings,
            connector,
            session: None,
            state: PollState::Idle,
            consecutive_failures: 0,
            sequence: 0,
            last_good: None,
            last_error: None,
            publisher,
        }
    }

    /// Replace the assembler, e.g. to poll a reduced sensor set.
    pub fn with_assembler(mut self, assembler: SnapshotAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_stale(&self) -> bool {
        self.consecutive_failures >= self.settings.stale_after_failures.max(crate::MIN_STALE_AFTER_FAILURES)
    }

    /// The cached last-good snapshot.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.last_good.clone()
    }

    pub fn last_error(&self) -> Option<&MonitorError> {
        self.last_error.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceView> {
        self.publisher.subscribe()
    }

    /// Swap in a new configuration. The current session is dropped, never patched.
    pub fn reconfigure(&mut self, config: SessionConfig) {
        info!(device = %self.name, host = config.host(), "session configuration replaced");
        self.config = config;
        self.session = None;
    }

    /// Run one poll cycle.
    ///
    /// On success the cached snapshot is replaced and the failure counter
    /// reset. On failure the cached snapshot is kept, the counter goes up by
    /// one and the session is dropped so the next cycle reconnects.
    pub async fn poll_once(&mut self) -> Result<Arc<Snapshot>> {
        self.state = PollState::Polling;
        self.publish();

        let deadline = self.settings.poll_timeout();
        let outcome = match time::timeout(deadline, self.cycle()).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::timeout(format!("poll of {}", self.name))),
        };

        let result = match outcome {
            Ok(mut snapshot) => {
                self.sequence += 1;
                snapshot.sequence = self.sequence;
                let snapshot = Arc::new(snapshot);
                if self.consecutive_failures > 0 {
                    info!(device = %self.name, failures = self.consecutive_failures, "device recovered");
                }
                self.consecutive_failures = 0;
                self.last_error = None;
                self.last_good = Some(snapshot.clone());
                debug!(device = %self.name, sequence = self.sequence, "poll succeeded");
                Ok(snapshot)
            }
            Err(err) => {
                self.consecutive_failures += 1;
                self.session = None;
                if self.is_stale() {
                    error!(device = %self.name, failures = self.consecutive_failures, error = %err, "poll failed, sensors stale");
                } else {
                    warn!(device = %self.name, failures = self.consecutive_failures, error = %err, "poll failed, keeping last snapshot");
                }
                self.last_error = Some(err.clone());
                Err(err)
            }
        };

        self.state = PollState::Idle;
        self.publish();
        result
    }

    async fn cycle(&mut self) -> Result<Snapshot> {
        if self.session.is_none() {
            self.session = Some(self.connector.connect(&self.config).await?);
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| MonitorError::session_error("session not established"))?;
        self.assembler.assemble(session.as_mut()).await
    }

    fn publish(&self) {
        let view = DeviceView {
            name: self.name.clone(),
            state: self.state,
            sequence: self.sequence,
            consecutive_failures: self.consecutive_failures,
            stale: self.is_stale(),
            last_error: self.last_error.as_ref().map(ErrorReport::from),
            snapshot: self.last_good.clone(),
        };
        self.publisher.send_replace(view);
    }

    /// Move the coordinator onto its own task.
    pub fn spawn(self) -> CoordinatorHandle {
        let (commands, receiver) = mpsc::channel(8);
        let view = self.subscribe();
        let name = self.name.clone();
        let task = tokio::spawn(self.run(receiver));
        CoordinatorHandle {
            name,
            commands,
            view,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(device = %self.name, interval_secs = self.config.interval().as_secs(), "poll loop started");
        let mut ticker = new_ticker(&self.config);

        loop {
            let command = tokio::select! {
                _ = ticker.tick() => {
                    let mut interrupted = None;
                    tokio::select! {
                        _ = self.poll_once() => {}
                        command = commands.recv() => interrupted = Some(command),
                    }
                    match interrupted {
                        // A command arrived mid-poll: the poll was cancelled at its
                        // suspension point and its session is not trusted.
                        Some(command) => {
                            self.session = None;
                            self.state = PollState::Idle;
                            self.publish();
                            command
                        }
                        None => continue,
                    }
                }
                command = commands.recv() => command,
            };

            match command {
                Some(Command::Reconfigure(config)) => {
                    self.reconfigure(config);
                    ticker = new_ticker(&self.config);
                }
                Some(Command::PollNow(reply)) => {
                    let _ = reply.send(self.poll_once().await);
                }
                Some(Command::Shutdown) | None => break,
            }
        }

        self.session = None;
        info!(device = %self.name, "poll loop stopped");
    }
}

fn new_ticker(config: &SessionConfig) -> time::Interval {
    let mut ticker = time::interval(config.interval().as_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

enum Command {
    Reconfigure(SessionConfig),
    PollNow(oneshot::Sender<Result<Arc<Snapshot>>>),
    Shutdown,
}

/// Handle to a coordinator running on its own task.
pub struct CoordinatorHandle {
    name: String,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<DeviceView>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CoordinatorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current published view.
    pub fn view(&self) -> DeviceView {
        self.view.borrow().clone()
    }

    /// Latest published snapshot, if any poll has succeeded.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.view.borrow().snapshot.clone()
    }

    pub fn watch(&self) -> watch::Receiver<DeviceView> {
        self.view.clone()
    }

    /// Stream of snapshots, one item per successful poll.
    pub fn snapshots(&self) -> BoxStream<'static, Arc<Snapshot>> {
        let mut last_sequence = 0;
        WatchStream::new(self.view.clone())
            .filter_map(move |view| {
                let fresh = view.snapshot.filter(|s| s.sequence > last_sequence);
                if let Some(snapshot) = &fresh {
                    last_sequence = snapshot.sequence;
                }
                futures_util::future::ready(fresh)
            })
            .boxed()
    }

    /// Hand the coordinator a replacement configuration.
    pub async fn reconfigure(&self, config: SessionConfig) -> Result<()> {
        self.commands
            .send(Command::Reconfigure(config))
            .await
            .map_err(|_| MonitorError::session_error(format!("coordinator {} has stopped", self.name)))
    }

    /// Request an immediate poll and wait for its outcome.
    pub async fn poll_now(&self) -> Result<Arc<Snapshot>> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::PollNow(reply))
            .await
            .map_err(|_| MonitorError::session_error(format!("coordinator {} has stopped", self.name)))?;
        outcome
            .await
            .map_err(|_| MonitorError::session_error(format!("coordinator {} dropped the poll", self.name)))?
    }

    /// Stop the poll loop, cancelling any poll in flight, and wait for the session to close.
    ///
    /// Later calls return immediately.
    pub async fn shutdown(&self) {
        let task = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(task) = task else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(err) = task.await {
            error!(device = %self.name, error = %err, "poll loop task failed");
        }
    }
}

/// One-shot connectivity check used before persisting a configuration.
///
/// Runs a full poll cycle on a fresh session but, unlike steady-state
/// polling, any failure (including an unreadable uptime OID or a table that
/// could not be walked) is returned as its specific error kind.
pub async fn self_test(
    config: &SessionConfig,
    settings: &CoordinatorSettings,
    connector: &dyn Connector,
) -> Result<Snapshot> {
    let run = async {
        let mut session = connector.connect(config).await?;
        fetch_scalar(session.as_mut(), OID_SYS_UPTIME, settings.scalar_timeout()).await?;
        SnapshotAssembler::new(settings).assemble_strict(session.as_mut()).await
    };
    match time::timeout(settings.poll_timeout(), run).await {
        Ok(result) => result,
        Err(_) => Err(MonitorError::timeout("self-test")),
    }
}

/// Independent coordinators for every device in a monitor file.
pub struct DeviceRegistry {
    devices: BTreeMap<String, CoordinatorHandle>,
}

impl DeviceRegistry {
    /// Validate every device and start its poll loop.
    pub fn start(file: &MonitorFile, connector: Arc<dyn Connector>) -> Result<Self> {
        let mut configs = Vec::with_capacity(file.devices.len());
        for device in &file.devices {
            let config = device.session.validate().map_err(|err| {
                error!(device = %device.name, error = %err, "invalid device configuration");
                err
            })?;
            configs.push((device.name.clone(), config));
        }

        let devices = configs
            .into_iter()
            .map(|(name, config)| {
                let handle =
                    Coordinator::new(name.clone(), config, file.coordinator, connector.clone()).spawn();
                (name, handle)
            })
            .collect();
        Ok(Self { devices })
    }

    pub fn get(&self, name: &str) -> Option<&CoordinatorHandle> {
        self.devices.get(name)
    }

    pub fn views(&self) -> Vec<DeviceView> {
        self.devices.values().map(CoordinatorHandle::view).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Stop every poll loop. Safe to call while the registry is still shared.
    pub async fn shutdown(&self) {
        for handle in self.devices.values() {
            handle.shutdown().await;
        }
    }
}
