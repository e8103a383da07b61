//! Session lifecycle and the reactor that drives the engine.
//!
//! While a session is active a single reactor task owns the change
//! observer, both debouncers and the watchdog. Scans run in their own task
//! so observer events keep flowing while the classifier is waiting; a scan
//! requested while another one runs is queued and launched when it ends.

use std::future::Future;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::annotate::{Annotation, AnnotationManager};
use crate::classifier::{Classifier, HttpClassifier};
use crate::config::{Config, Timing};
use crate::document::DocumentHandle;
use crate::error::Result;
use crate::identity::{ConversationIdentity, IdentityResolver};
use crate::observer::{sleep_until_deadline, ChangeObserver, Debouncer, ObserverEvent};
use crate::profile::HostProfile;
use crate::scan::{ScanCoordinator, ScanReport};
use crate::state::SharedSession;
use crate::store::VerdictStore;
use crate::watchdog::ActivityWatchdog;

/// Everything the reactor and the controller share.
struct Engine {
    document: DocumentHandle,
    profile: Arc<HostProfile>,
    resolver: IdentityResolver,
    annotator: AnnotationManager,
    store: Arc<VerdictStore>,
    coordinator: Arc<ScanCoordinator>,
    session: SharedSession,
    timing: Timing,
}

impl Engine {
    fn resolve_conversation(&self) -> ConversationIdentity {
        self.document
            .read(|doc| self.resolver.resolve_conversation_identity(doc))
    }

    fn full_clean(&self) -> usize {
        match self.document.mutate(|doc| self.annotator.full_clean(doc)) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                warn!(target: "session", "Failed to clean annotations: {}", e);
                0
            }
        }
    }

    /// Re-resolves the conversation; on a change, records it and strips
    /// every annotation belonging to the previous one.
    fn detect_conversation_change(&self) -> bool {
        if !self.session.is_active() {
            return false;
        }
        let resolved = self.resolve_conversation();
        match self.session.switch_conversation(resolved.clone()) {
            None => false,
            Some(previous) => {
                info!(target: "session", "Conversation changed: {} -> {}", previous, resolved);
                self.full_clean();
                true
            }
        }
    }
}

struct Reactor {
    engine: Arc<Engine>,
    observer: ChangeObserver,
    watchdog: ActivityWatchdog,
    scan_debounce: Debouncer,
    conversation_check: Debouncer,
    scan_task: Option<JoinHandle<ScanReport>>,
    rescan_pending: bool,
}

impl Reactor {
    fn new(engine: Arc<Engine>, observer: ChangeObserver) -> Self {
        let watchdog = ActivityWatchdog::new(
            engine.timing.watchdog_interval(),
            engine.timing.quiet_threshold(),
        );
        let scan_debounce = Debouncer::new(engine.timing.scan_debounce());
        Self {
            engine,
            observer,
            watchdog,
            scan_debounce,
            conversation_check: Debouncer::new(Duration::ZERO),
            scan_task: None,
            rescan_pending: false,
        }
    }

    async fn run(mut self) {
        // initial sweep of whatever is already rendered
        self.scan_debounce.trigger();

        loop {
            tokio::select! {
                event = self.observer.next_event() => self.on_event(event),
                _ = sleep_until_deadline(self.scan_debounce.deadline()) => {
                    self.scan_debounce.clear();
                    self.launch_scan();
                }
                _ = sleep_until_deadline(self.conversation_check.deadline()) => {
                    self.conversation_check.clear();
                    if self.engine.detect_conversation_change() {
                        self.scan_debounce
                            .trigger_after(self.engine.timing.rescan_after_change());
                    }
                }
                _ = self.watchdog.tick() => {
                    if self.watchdog.should_sweep(&self.engine.session, &self.engine.coordinator) {
                        debug!(target: "session", "watchdog found unannotated messages");
                        self.scan_debounce.trigger();
                    }
                }
                finished = join_scan(&mut self.scan_task) => {
                    self.scan_task = None;
                    if let Err(e) = finished {
                        warn!(target: "session", "Scan task failed: {}", e);
                    }
                    if std::mem::take(&mut self.rescan_pending) {
                        self.launch_scan();
                    }
                }
            }
        }
    }

    fn on_event(&mut self, event: ObserverEvent) {
        if !self.engine.session.is_active() {
            return;
        }
        match event {
            ObserverEvent::Mutations(signals) => {
                self.engine.session.touch();
                if signals.has_conversation_change {
                    self.conversation_check
                        .trigger_after(self.engine.timing.header_settle());
                }
                if signals.has_new_messages {
                    self.scan_debounce.trigger();
                }
            }
            ObserverEvent::NavigationChanged => {
                debug!(target: "session", "navigation changed");
                self.conversation_check
                    .trigger_after(self.engine.timing.navigation_settle());
            }
        }
    }

    fn launch_scan(&mut self) {
        if self.scan_task.is_some() {
            self.rescan_pending = true;
            return;
        }
        let coordinator = self.engine.coordinator.clone();
        self.scan_task = Some(tokio::spawn(async move { coordinator.scan().await }));
    }
}

async fn join_scan(task: &mut Option<JoinHandle<ScanReport>>) -> std::result::Result<ScanReport, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

struct Running {
    reactor: JoinHandle<()>,
    subscriptions: [u64; 2],
}

/// Starts, stops and resets detection over one document.
///
/// The verdict store outlives any number of start/stop cycles; only
/// [`clear_storage`](Self::clear_storage) empties it.
pub struct SessionController {
    engine: Arc<Engine>,
    running: Option<Running>,
}

impl SessionController {
    pub fn new(config: &Config, document: DocumentHandle, classifier: Arc<dyn Classifier>) -> Self {
        let profile = Arc::new(config.profile.clone());
        let resolver = IdentityResolver::new(profile.clone());
        let annotator = AnnotationManager::new(profile.clone(), &config.default_suggestion);
        let store = Arc::new(VerdictStore::new());
        let session = SharedSession::new();
        let coordinator = Arc::new(ScanCoordinator::new(
            document.clone(),
            resolver.clone(),
            store.clone(),
            classifier,
            annotator.clone(),
            session.clone(),
        ));

        Self {
            engine: Arc::new(Engine {
                document,
                profile,
                resolver,
                annotator,
                store,
                coordinator,
                session,
                timing: config.timing.clone(),
            }),
            running: None,
        }
    }

    /// Controller backed by the remote classification service in `config`.
    pub fn from_config(config: &Config, document: DocumentHandle) -> Self {
        let classifier = Arc::new(HttpClassifier::new(&config.api_url));
        Self::new(config, document, classifier)
    }

    pub fn document(&self) -> &DocumentHandle {
        &self.engine.document
    }

    pub fn store(&self) -> &Arc<VerdictStore> {
        &self.engine.store
    }

    pub fn session(&self) -> &SharedSession {
        &self.engine.session
    }

    pub fn is_active(&self) -> bool {
        self.running.is_some()
    }

    /// Begins detection. Returns `false` if it was already running.
    pub fn start(&mut self) -> Result<bool> {
        if self.running.is_some() {
            return Ok(false);
        }

        let conversation = self.engine.resolve_conversation();
        let generation = self.engine.session.activate(conversation.clone());

        let observer = match ChangeObserver::attach(&self.engine.document, self.engine.profile.clone()) {
            Ok(observer) => observer,
            Err(e) => {
                self.engine.session.deactivate();
                return Err(e);
            }
        };
        let subscriptions = observer.subscription_ids();
        let reactor = tokio::spawn(Reactor::new(self.engine.clone(), observer).run());

        self.running = Some(Running {
            reactor,
            subscriptions,
        });
        info!(target: "session", conversation = %conversation, generation, "Detection started");
        Ok(true)
    }

    /// Ends detection and removes every annotation. Returns `false` if it
    /// was not running. Scans still in flight discard their results.
    pub fn stop(&mut self) -> bool {
        let Some(running) = self.running.take() else {
            return false;
        };
        self.shutdown(running);
        self.engine.session.deactivate();
        let cleaned = self.engine.full_clean();
        info!(target: "session", cleaned, "Detection stopped");
        true
    }

    /// Flips the session state and returns the new one.
    pub fn toggle(&mut self) -> Result<bool> {
        if self.is_active() {
            self.stop();
            Ok(false)
        } else {
            self.start()?;
            Ok(true)
        }
    }

    /// Forgets every verdict and removes every annotation, whether or not
    /// detection is running.
    pub fn clear_storage(&self) -> Result<usize> {
        let forgotten = self.engine.store.len();
        let cleaned = self
            .engine
            .document
            .mutate(|doc| self.engine.annotator.reset_all(doc, &self.engine.store))?;
        info!(target: "session", forgotten, cleaned, "Storage cleared");
        Ok(cleaned)
    }

    /// Runs one scan immediately, outside the debounce schedule.
    pub async fn scan_now(&self) -> ScanReport {
        self.engine.coordinator.scan().await
    }

    /// Re-checks the conversation identity now. Returns whether it changed.
    pub fn detect_conversation_change(&self) -> bool {
        self.engine.detect_conversation_change()
    }

    /// Polls until the host has rendered its main pane, then records the
    /// conversation on screen. The future does not borrow the controller, so
    /// commands can be served while it is pending.
    pub fn wait_until_ready(&self) -> impl Future<Output = ConversationIdentity> + Send + 'static {
        let engine = Arc::clone(&self.engine);
        async move {
            while !engine.document.read(|doc| engine.profile.is_ready(doc)) {
                sleep(engine.timing.ready_poll()).await;
            }
            let conversation = engine.resolve_conversation();
            engine.session.switch_conversation(conversation.clone());
            debug!(target: "session", conversation = %conversation, "host ready");
            conversation
        }
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        self.engine
            .document
            .read(|doc| self.engine.annotator.annotations(doc))
    }

    fn shutdown(&self, running: Running) {
        running.reactor.abort();
        self.engine.document.mutate(|doc| {
            for id in running.subscriptions {
                doc.disconnect(id);
            }
        });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            self.shutdown(running);
            self.engine.session.deactivate();
        }
    }
}
