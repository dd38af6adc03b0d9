//! Fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;

use session_guard::activity::{ActivityBus, ActivitySignal, ActivitySource};
use session_guard::autosave::{BackupStorage, MemoryBackupStorage};
use session_guard::clock::{Clock, ManualClock};
use session_guard::collaborators::{
    EditableSurface, EditorStateAccessor, Navigator, NotificationKind, Notifier, NotifyOptions,
    SessionCleanup,
};
use session_guard::config::Config;
use session_guard::error::{CleanupError, SchedulerError, SessionError, SubscribeError, SurfaceError};
use session_guard::manager::{Collaborators, SessionManager};
use session_guard::scheduler::{RepeatingTask, Scheduler, Task, TaskHandle, TokioScheduler};
use session_guard::session::{Session, SessionProvider, SignOutOptions};

pub const START_EPOCH: i64 = 1_700_000_000;

type SessionResult = Result<Option<Session>, SessionError>;

// ---------------------------------------------------------------------------
// Session provider
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeProvider {
    queued: Mutex<VecDeque<SessionResult>>,
    fallback: Mutex<Option<SessionResult>>,
    calls: AtomicUsize,
    sign_outs: Mutex<Vec<SignOutOptions>>,
    sign_out_error: Mutex<Option<SessionError>>,
}

impl FakeProvider {
    pub fn push(&self, result: SessionResult) {
        self.queued.lock().unwrap().push_back(result);
    }

    pub fn set_fallback(&self, result: SessionResult) {
        *self.fallback.lock().unwrap() = Some(result);
    }

    pub fn fail_sign_out(&self, err: SessionError) {
        *self.sign_out_error.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sign_outs(&self) -> Vec<SignOutOptions> {
        self.sign_outs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn current_session(&self) -> SessionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.queued.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.fallback.lock().unwrap().clone().unwrap_or(Ok(None)))
    }

    async fn end_session(&self, options: SignOutOptions) -> Result<(), SessionError> {
        self.sign_outs.lock().unwrap().push(options);
        match self.sign_out_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Host collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeCleanup {
    stale: AtomicBool,
    calls: AtomicUsize,
}

impl FakeCleanup {
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionCleanup for FakeCleanup {
    fn check_for_stale_session(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    async fn emergency_cleanup(&self) -> Result<(), CleanupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.stale.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<(NotificationKind, String, NotifyOptions)>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<(NotificationKind, String, NotifyOptions)> {
        self.seen.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NotificationKind, message: &str, options: NotifyOptions) {
        self.seen
            .lock()
            .unwrap()
            .push((kind, message.to_string(), options));
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    targets: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &str) {
        self.targets.lock().unwrap().push(target.to_string());
    }
}

/// A canvas whose serialized state the test controls.
pub struct FakeCanvas {
    state: Mutex<String>,
}

impl FakeCanvas {
    pub fn new(state: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state.to_string()),
        })
    }

    pub fn set(&self, state: &str) {
        *self.state.lock().unwrap() = state.to_string();
    }
}

impl EditableSurface for FakeCanvas {
    fn serialize(&self) -> Result<String, SurfaceError> {
        Ok(self.state.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeEditor {
    design: Mutex<Option<String>>,
    canvas: Mutex<Option<Arc<FakeCanvas>>>,
}

impl FakeEditor {
    pub fn open(&self, design_id: &str, canvas: Arc<FakeCanvas>) {
        *self.design.lock().unwrap() = Some(design_id.to_string());
        *self.canvas.lock().unwrap() = Some(canvas);
    }
}

impl EditorStateAccessor for FakeEditor {
    fn active_design_id(&self) -> Option<String> {
        self.design.lock().unwrap().clone()
    }

    fn active_canvas(&self) -> Option<Arc<dyn EditableSurface>> {
        self.canvas
            .lock()
            .unwrap()
            .clone()
            .map(|c| c as Arc<dyn EditableSurface>)
    }
}

/// An activity source that can never be attached to.
pub struct BrokenSource;

impl ActivitySource for BrokenSource {
    fn subscribe(&self) -> Result<broadcast::Receiver<ActivitySignal>, SubscribeError> {
        Err(SubscribeError::Other("listener registry unavailable".into()))
    }
}

/// Tokio scheduler that counts cancellations.
#[derive(Default)]
pub struct CountingScheduler {
    inner: TokioScheduler,
    cancels: AtomicUsize,
}

impl CountingScheduler {
    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl Scheduler for CountingScheduler {
    fn schedule_once(&self, delay: Duration, task: Task) -> Result<TaskHandle, SchedulerError> {
        self.inner.schedule_once(delay, task)
    }

    fn schedule_repeating(
        &self,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<TaskHandle, SchedulerError> {
        self.inner.schedule_repeating(period, task)
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.inner.cancel(handle)
    }

    fn active_count(&self) -> usize {
        self.inner.active_count()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub provider: Arc<FakeProvider>,
    pub cleanup: Arc<FakeCleanup>,
    pub notifier: Arc<RecordingNotifier>,
    pub navigator: Arc<RecordingNavigator>,
    pub editor: Arc<FakeEditor>,
    pub scheduler: Arc<CountingScheduler>,
    pub clock: Arc<ManualClock>,
    pub bus: ActivityBus,
}

pub struct HarnessBuilder {
    config: Config,
    storage: Arc<dyn BackupStorage>,
    activity: Option<Arc<dyn ActivitySource>>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn BackupStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn activity(mut self, activity: Arc<dyn ActivitySource>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn build(self) -> Harness {
        let bus = ActivityBus::from_config(&self.config.activity);
        let provider = Arc::new(FakeProvider::default());
        let cleanup = Arc::new(FakeCleanup::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let editor = Arc::new(FakeEditor::default());
        let scheduler = Arc::new(CountingScheduler::default());
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(START_EPOCH, 0).unwrap()));

        let manager = SessionManager::new(
            self.config,
            Collaborators {
                provider: provider.clone(),
                notifier: notifier.clone(),
                editor: editor.clone(),
                cleanup: cleanup.clone(),
                navigator: navigator.clone(),
                activity: self.activity.unwrap_or_else(|| Arc::new(bus.clone())),
                storage: self.storage,
                scheduler: scheduler.clone(),
                clock: clock.clone(),
            },
        );

        Harness {
            manager,
            provider,
            cleanup,
            notifier,
            navigator,
            editor,
            scheduler,
            clock,
            bus,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: Config::default(),
            storage: Arc::new(MemoryBackupStorage::new()),
            activity: None,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// A well-formed credential expiring `secs` after the harness clock.
    pub fn token_expiring_in(&self, secs: i64) -> String {
        let now = self.clock.now().timestamp();
        make_token(now, now + secs)
    }

    pub fn valid_session(&self, secs: i64) -> Session {
        Session::with_credential(self.token_expiring_in(secs))
    }
}

pub fn make_token(issued_at: i64, expiry: i64) -> String {
    let payload = serde_json::json!({ "sub": "user-1", "iat": issued_at, "exp": expiry });
    format!(
        "eyJhbGciOiJIUzI1NiJ9.{}.c2lnbmF0dXJl",
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

/// Let spawned tasks run for a moment of virtual time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
