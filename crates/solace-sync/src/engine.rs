//! # Sync Engine
//!
//! Keeps the syncable part of the app state in step with the user's single
//! cloud record.
//!
//! ## Session Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncEngine                                     │
//! │                                                                         │
//! │   start(remote, user) ───► spawn SessionWorker task                     │
//! │   stop()              ───► abort task, unsubscribe, status = idle       │
//! │   sync_now()/pull_now() ─► Command over mpsc, reply over oneshot        │
//! │                                                                         │
//! │   ┌─────────────────────── SessionWorker ─────────────────────────┐    │
//! │   │                                                                │    │
//! │   │  initial pull, then select! over:                             │    │
//! │   │    • commands            (sync_now / pull_now)                 │    │
//! │   │    • container changes   → (re)arm debounce deadline           │    │
//! │   │    • debounce deadline   → push                                │    │
//! │   │    • push/pull retry     → push / pull (backoff)               │    │
//! │   │    • flush interval      → push                                │    │
//! │   │    • online / foreground → pull (+ push on reconnect)          │    │
//! │   │                                                                │    │
//! │   │  owns: last exchanged fingerprint, backoff, pull block flag    │    │
//! │   └────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All session state lives inside the task. Aborting the task drops it along
//! with any in-flight remote call, so nothing from a stopped session can
//! touch the container, the local store or the status afterwards.
//!
//! ## Push
//! 1. Offline → status `offline`, no call, backoff untouched
//! 2. Extract; unchanged since the last exchanged blob → no call
//! 3. Status `syncing`, upsert `{user_id, data, data_version}`
//! 4. Ok → remember fingerprint, persist confirmation, reset backoff, `idle`
//! 5. Err → `error`, retry after the current backoff delay
//!
//! ## Pull
//! 1. Offline → status `offline`
//! 2. Status `syncing`, fetch the record
//! 3. None → push local state
//! 4. `data_version` too new → `error`, pulls suspended for the session
//! 5. Remote `_localUpdatedAt` newer than the confirmation → merge patch
//! 6. Ok → reset backoff, `idle`; Err → `error`, retry with backoff

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

use solace_core::{
    apply_synced_state, extract_syncable_state, resolve, CloudRecord, Resolution, RetryBackoff,
    SyncSchedule, SyncSchema, SyncStatusInfo, SyncableData,
};

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::container::StateContainer;
use crate::environment::{EnvironmentSignals, HostEnvironment};
use crate::error::{SyncError, SyncResult};
use crate::listeners::ListenerId;
use crate::local::{read_confirmation, write_confirmation, LocalStore, MemoryLocalStore};
use crate::remote::RemoteStore;
use crate::status::{StatusBroadcaster, StatusSubscription};

const COMMAND_BUFFER: usize = 16;

// =============================================================================
// Outcomes
// =============================================================================

/// Result of one push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The record was upserted.
    Pushed,
    /// Nothing changed since the last exchanged blob; no call made.
    Unchanged,
    /// Host is offline; no call made.
    Offline,
    /// The call failed; a retry is scheduled.
    Failed,
    /// No session is running.
    NotRunning,
}

/// Result of one pull attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// A newer remote blob was merged into the container.
    Applied,
    /// Remote was same-or-older than the local confirmation.
    UpToDate,
    /// No cloud record existed; local state was pushed instead.
    NoRemoteRecord(PushOutcome),
    /// The cloud record needs a newer app. Pulls are now suspended.
    SchemaTooNew,
    /// Pulls were already suspended by a schema mismatch.
    Blocked,
    /// Host is offline; no call made.
    Offline,
    /// The call failed; a retry is scheduled.
    Failed,
    /// No session is running.
    NotRunning,
}

enum Command {
    Push(oneshot::Sender<PushOutcome>),
    Pull(oneshot::Sender<PullOutcome>),
}

// =============================================================================
// Engine
// =============================================================================

/// The cloud sync engine. One instance per signed-in app, owned by whatever
/// wires up the authenticated session.
///
/// ## Usage
/// ```rust,ignore
/// let engine = SyncEngine::builder(container)
///     .with_local_store(Arc::new(db))
///     .build()?;
///
/// let _sub = engine.subscribe(|info| println!("sync: {}", info.status));
/// engine.start(Arc::new(remote), "user-123").await?;
/// // ... app runs ...
/// engine.flush_before_exit(Duration::from_secs(5)).await;
/// engine.stop().await;
/// ```
pub struct SyncEngine {
    container: Arc<dyn StateContainer>,
    local: Arc<dyn LocalStore>,
    environment: HostEnvironment,
    clock: Arc<dyn Clock>,
    schedule: SyncSchedule,
    schema: SyncSchema,
    device_id: String,
    status: StatusBroadcaster,
    session: Mutex<Option<Session>>,
}

struct Session {
    user_id: String,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
    container: Arc<dyn StateContainer>,
    listener: ListenerId,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.task.abort();
        self.container.unsubscribe(self.listener);
    }
}

impl SyncEngine {
    /// Starts building an engine around the app's state container.
    pub fn builder(container: Arc<dyn StateContainer>) -> SyncEngineBuilder {
        SyncEngineBuilder::new(container)
    }

    /// Binds the engine to `remote` for `user_id` and begins syncing.
    ///
    /// A running session is stopped first. The first pull is issued right
    /// away from the new session task.
    pub async fn start(&self, remote: Arc<dyn RemoteStore>, user_id: impl Into<String>) -> SyncResult<()> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(SyncError::MissingUserId);
        }

        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            info!(user_id = %previous.user_id, "Restarting sync session");
            Self::shutdown(previous).await;
        }
        self.status.reset();

        let changes = Arc::new(Notify::new());
        let notify = Arc::clone(&changes);
        let listener = self.container.subscribe(Arc::new(move || notify.notify_one()));

        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let worker = SessionWorker {
            user_id: user_id.clone(),
            remote,
            container: Arc::clone(&self.container),
            local: Arc::clone(&self.local),
            clock: Arc::clone(&self.clock),
            schema: self.schema.clone(),
            schedule: self.schedule,
            status: self.status.clone(),
            signals: self.environment.signals(),
            changes,
            backoff: self.schedule.retry_backoff(),
            last_exchanged: None,
            pull_blocked: false,
            debounce_at: None,
            push_retry_at: None,
            pull_retry_at: None,
        };

        let span = info_span!("sync_session", user_id = %user_id, device_id = %self.device_id);
        let task = tokio::spawn(worker.run(command_rx).instrument(span));

        *session = Some(Session {
            user_id,
            commands,
            task,
            container: Arc::clone(&self.container),
            listener,
        });

        Ok(())
    }

    /// Ends the session: timers cancelled, in-flight calls abandoned,
    /// listeners removed, status back to `idle`. No-op when not running.
    pub async fn stop(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        info!(user_id = %session.user_id, "Stopping sync session");
        Self::shutdown(session).await;
        self.status.reset();
    }

    /// Pushes right away, outside the debounce schedule.
    pub async fn sync_now(&self) -> PushOutcome {
        let (reply, rx) = oneshot::channel();
        if !self.send(Command::Push(reply)).await {
            return PushOutcome::NotRunning;
        }
        rx.await.unwrap_or(PushOutcome::NotRunning)
    }

    /// Pulls right away.
    pub async fn pull_now(&self) -> PullOutcome {
        let (reply, rx) = oneshot::channel();
        if !self.send(Command::Pull(reply)).await {
            return PullOutcome::NotRunning;
        }
        rx.await.unwrap_or(PullOutcome::NotRunning)
    }

    /// One best-effort push for when the host is about to terminate.
    ///
    /// Returns `None` if `limit` elapsed first.
    pub async fn flush_before_exit(&self, limit: Duration) -> Option<PushOutcome> {
        match tokio::time::timeout(limit, self.sync_now()).await {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                warn!(limit_ms = limit.as_millis() as u64, "Final push did not finish in time");
                None
            }
        }
    }

    /// Current status.
    pub fn status(&self) -> SyncStatusInfo {
        self.status.current()
    }

    /// Calls `listener` now and on every status transition.
    pub fn subscribe<F>(&self, listener: F) -> StatusSubscription
    where
        F: Fn(&SyncStatusInfo) + Send + Sync + 'static,
    {
        self.status.subscribe(listener)
    }

    /// Async status stream.
    pub fn watch_status(&self) -> tokio::sync::watch::Receiver<SyncStatusInfo> {
        self.status.watch()
    }

    /// True while a session task is alive.
    pub async fn is_running(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    /// The user of the running session.
    pub async fn user_id(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.user_id.clone())
    }

    /// Host signal writer shared with this engine.
    pub fn environment(&self) -> &HostEnvironment {
        &self.environment
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn send(&self, command: Command) -> bool {
        let sender = match self.session.lock().await.as_ref() {
            Some(session) => session.commands.clone(),
            None => return false,
        };
        sender.send(command).await.is_ok()
    }

    async fn shutdown(mut session: Session) {
        session.task.abort();
        match (&mut session.task).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!(error = %e, "Sync session task panicked"),
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    container: Arc<dyn StateContainer>,
    local: Option<Arc<dyn LocalStore>>,
    environment: Option<HostEnvironment>,
    clock: Option<Arc<dyn Clock>>,
    schedule: SyncSchedule,
    schema: SyncSchema,
    device_id: Option<String>,
}

impl SyncEngineBuilder {
    pub fn new(container: Arc<dyn StateContainer>) -> Self {
        SyncEngineBuilder {
            container,
            local: None,
            environment: None,
            clock: None,
            schedule: SyncSchedule::default(),
            schema: SyncSchema::current(),
            device_id: None,
        }
    }

    /// Applies timing and device settings from config.
    pub fn from_config(container: Arc<dyn StateContainer>, config: &SyncConfig) -> Self {
        Self::new(container)
            .with_schedule(config.schedule())
            .with_device_id(config.device_id())
    }

    /// Sets where the confirmation timestamp is persisted.
    pub fn with_local_store(mut self, local: Arc<dyn LocalStore>) -> Self {
        self.local = Some(local);
        self
    }

    /// Shares host signals with the engine.
    pub fn with_environment(mut self, environment: HostEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_schedule(mut self, schedule: SyncSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_schema(mut self, schema: SyncSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Builds the engine. Nothing runs until [`SyncEngine::start`].
    pub fn build(self) -> SyncResult<SyncEngine> {
        if self.schedule.debounce.is_zero() || self.schedule.flush_interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "debounce and flush interval must be greater than zero".into(),
            ));
        }

        let local = self.local.unwrap_or_else(|| {
            warn!("No local store configured, sync confirmations will not survive restarts");
            Arc::new(MemoryLocalStore::new())
        });

        Ok(SyncEngine {
            container: self.container,
            local,
            environment: self.environment.unwrap_or_default(),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            schedule: self.schedule,
            schema: self.schema,
            device_id: self.device_id.unwrap_or_else(|| "unknown-device".to_string()),
            status: StatusBroadcaster::new(),
            session: Mutex::new(None),
        })
    }
}

// =============================================================================
// Session Worker
// =============================================================================

struct SessionWorker {
    user_id: String,
    remote: Arc<dyn RemoteStore>,
    container: Arc<dyn StateContainer>,
    local: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    schema: SyncSchema,
    schedule: SyncSchedule,
    status: StatusBroadcaster,
    signals: EnvironmentSignals,
    changes: Arc<Notify>,
    backoff: RetryBackoff,
    /// Fingerprint of the last blob pushed or applied this session.
    last_exchanged: Option<String>,
    pull_blocked: bool,
    debounce_at: Option<Instant>,
    push_retry_at: Option<Instant>,
    pull_retry_at: Option<Instant>,
}

impl SessionWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Sync session started");

        // Transitions that happened before the session began are not events
        self.signals.online.borrow_and_update();
        self.signals.foreground.borrow_and_update();

        self.pull().await;

        let period = self.schedule.flush_interval;
        let mut flush = interval_at(Instant::now() + period, period);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Push(reply)) => {
                        let outcome = self.push().await;
                        let _ = reply.send(outcome);
                    }
                    Some(Command::Pull(reply)) => {
                        let outcome = self.pull().await;
                        let _ = reply.send(outcome);
                    }
                    None => break,
                },

                _ = self.changes.notified() => {
                    self.debounce_at = Some(Instant::now() + self.schedule.debounce);
                }

                _ = sleep_until_opt(self.debounce_at) => {
                    self.debounce_at = None;
                    self.push().await;
                }

                _ = sleep_until_opt(self.push_retry_at) => {
                    self.push_retry_at = None;
                    debug!("Retrying push");
                    self.push().await;
                }

                _ = sleep_until_opt(self.pull_retry_at) => {
                    self.pull_retry_at = None;
                    debug!("Retrying pull");
                    self.pull().await;
                }

                _ = flush.tick() => {
                    self.push().await;
                }

                changed = self.signals.online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *self.signals.online.borrow_and_update();
                    self.on_connectivity(online).await;
                }

                changed = self.signals.foreground.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let foreground = *self.signals.foreground.borrow_and_update();
                    if foreground {
                        debug!("App returned to foreground");
                        self.pull().await;
                    }
                }
            }
        }

        info!("Sync session ended");
    }

    async fn on_connectivity(&mut self, online: bool) {
        if !online {
            info!("Connectivity lost");
            self.status.offline();
            return;
        }

        info!("Connectivity restored");
        match self.pull().await {
            PullOutcome::NoRemoteRecord(_) | PullOutcome::Failed | PullOutcome::Offline => {}
            _ => {
                self.push().await;
            }
        }
    }

    // =========================================================================
    // Push
    // =========================================================================

    async fn push(&mut self) -> PushOutcome {
        if !self.signals.is_online() {
            self.status.offline();
            return PushOutcome::Offline;
        }

        let blob = extract_syncable_state(&self.schema, &self.container.snapshot(), self.clock.now_ms());
        let fingerprint = match blob.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                error!(error = %e, "Could not serialize syncable state");
                self.status.error(SyncError::from(e).to_string());
                return PushOutcome::Failed;
            }
        };

        if self.last_exchanged.as_deref() == Some(fingerprint.as_str()) {
            debug!("Syncable state unchanged, skipping push");
            return PushOutcome::Unchanged;
        }

        self.status.syncing();
        let record = CloudRecord::new(self.user_id.clone(), blob, self.schema.version());

        match self.remote.upsert(&record).await {
            Ok(()) => {
                let pushed_at = record.data.local_updated_at;
                info!(local_updated_at = pushed_at, fields = record.data.fields.len(), "Pushed syncable state");

                self.last_exchanged = Some(fingerprint);
                self.push_retry_at = None;
                if let Err(e) = write_confirmation(self.local.as_ref(), pushed_at).await {
                    warn!(error = %e, "Pushed, but could not persist the sync confirmation");
                }
                self.succeeded();
                PushOutcome::Pushed
            }
            Err(e) => {
                self.push_retry_at = self.failed("push", &e);
                PushOutcome::Failed
            }
        }
    }

    // =========================================================================
    // Pull
    // =========================================================================

    async fn pull(&mut self) -> PullOutcome {
        if self.pull_blocked {
            debug!("Pull suspended until the app is updated");
            return PullOutcome::Blocked;
        }
        if !self.signals.is_online() {
            self.status.offline();
            return PullOutcome::Offline;
        }

        self.status.syncing();

        let record = match self.remote.fetch(&self.user_id).await {
            Ok(record) => record,
            Err(e) => {
                self.pull_retry_at = self.failed("pull", &e);
                return PullOutcome::Failed;
            }
        };

        let Some(record) = record else {
            info!("No cloud record yet, uploading local state");
            self.pull_retry_at = None;
            let outcome = self.push().await;
            if outcome == PushOutcome::Unchanged {
                self.succeeded();
            }
            return PullOutcome::NoRemoteRecord(outcome);
        };

        if !self.schema.accepts(record.data_version) {
            let err = SyncError::SchemaTooNew {
                remote: record.data_version,
                local: self.schema.version(),
            };
            error!(remote = record.data_version, local = self.schema.version(), "Cloud data uses a newer schema");
            self.pull_blocked = true;
            self.pull_retry_at = None;
            self.status.error(err.to_string());
            return PullOutcome::SchemaTooNew;
        }

        let confirmed = match read_confirmation(self.local.as_ref()).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                self.pull_retry_at = self.failed("pull", &e);
                return PullOutcome::Failed;
            }
        };

        let outcome = match resolve(&record.data, confirmed) {
            Resolution::ApplyRemote => {
                self.apply_remote(&record.data).await;
                PullOutcome::Applied
            }
            Resolution::KeepLocal => {
                debug!(
                    remote = record.data.local_updated_at,
                    confirmed = ?confirmed,
                    "Cloud copy is not newer, keeping local state"
                );
                PullOutcome::UpToDate
            }
        };

        self.pull_retry_at = None;
        self.succeeded();
        outcome
    }

    async fn apply_remote(&mut self, remote: &SyncableData) {
        let patch = apply_synced_state(&self.schema, remote);
        let applied = SyncableData {
            local_updated_at: remote.local_updated_at,
            fields: patch.clone(),
        };

        info!(remote = remote.local_updated_at, fields = patch.len(), "Applying newer cloud state");
        self.container.merge(patch);

        if let Err(e) = write_confirmation(self.local.as_ref(), remote.local_updated_at).await {
            warn!(error = %e, "Applied cloud state, but could not persist the sync confirmation");
        }

        match applied.fingerprint() {
            Ok(fingerprint) => self.last_exchanged = Some(fingerprint),
            Err(e) => warn!(error = %e, "Could not fingerprint applied state"),
        }
    }

    // =========================================================================
    // Outcome Bookkeeping
    // =========================================================================

    fn succeeded(&mut self) {
        self.backoff.reset();
        self.status.idle(Some(self.clock.now_ms()));
    }

    /// Records a failure and returns when to retry, if at all.
    fn failed(&mut self, operation: &str, err: &SyncError) -> Option<Instant> {
        self.status.error(err.to_string());

        if !err.is_retryable() {
            error!(operation, error = %err, "Sync failed, not retrying");
            return None;
        }

        let delay = self.backoff.next_delay();
        warn!(
            operation,
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            "Sync failed, will retry"
        );
        Some(Instant::now() + delay)
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
