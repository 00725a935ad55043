// Crisis guard: ties detection to the local response and the escalation
//
// Per session the guard is either Clear or Active. Any detection moves it
// to Active; only reset() moves it back. Active is re-read from the
// session store on every page load and never expires on its own.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use super::alert::{AlertSink, AnalysisRequest, CrisisAlert, NoopAlertSink};
use super::audit::{AuditLog, CrisisAction, CrisisEvent};
use super::detector::{
    CrisisDetector, DetectionResult, InputType, DEFAULT_MIN_LENGTH, DEFAULT_SAMPLE_LENGTH,
};
use super::keywords::KeywordSet;
use super::resources::{
    ActionKind, ActionOutcome, CrisisModal, LockNotice, Platform, BANNER_TEXT,
};
use super::scheduler::{Debouncer, TaskScheduler};
use super::session::{ensure_user_id, CrisisSession, MemoryStore, ResilientStore, SessionStore};
use super::ui::CrisisUi;

/// Target for the whole response chain, remote leg included
pub const RESPONSE_BUDGET: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct GuardSettings {
    pub min_length: usize,
    pub sample_length: usize,
    /// Quiet period after the last keystroke before a field is scanned
    pub debounce: Duration,
    pub response_budget: Duration,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            sample_length: DEFAULT_SAMPLE_LENGTH,
            debounce: Duration::from_secs(1),
            response_budget: RESPONSE_BUDGET,
        }
    }
}

/// Facts about the hosting page recorded with audit entries
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub user_agent: Option<String>,
    pub url: Option<String>,
}

/// Snapshot of the guard for status displays
#[derive(Debug, Clone)]
pub struct GuardStatus {
    pub session: CrisisSession,
    pub user_id: String,
    pub monitoring: bool,
    pub pending_timers: usize,
    pub in_flight_tasks: usize,
}

struct GuardInner {
    detector: CrisisDetector,
    session: ResilientStore,
    audit: ResilientStore,
    ui: Arc<dyn CrisisUi>,
    alerts: Arc<dyn AlertSink>,
    scheduler: TaskScheduler,
    debouncer: Debouncer,
    context: PageContext,
    settings: GuardSettings,
    modal: CrisisModal,
    notice: LockNotice,
    monitoring: AtomicBool,
}

/// Cheap to clone; clones share all state
#[derive(Clone)]
pub struct CrisisGuard {
    inner: Arc<GuardInner>,
}

pub struct CrisisGuardBuilder {
    ui: Arc<dyn CrisisUi>,
    keywords: KeywordSet,
    settings: GuardSettings,
    session_store: Option<Arc<dyn SessionStore>>,
    audit_store: Option<Arc<dyn SessionStore>>,
    alerts: Option<Arc<dyn AlertSink>>,
    scheduler: Option<TaskScheduler>,
    runtime: Option<Handle>,
    context: PageContext,
    modal: CrisisModal,
    notice: LockNotice,
}

impl CrisisGuardBuilder {
    pub fn keywords(mut self, keywords: KeywordSet) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn settings(mut self, settings: GuardSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Session-scoped store (crisis flag, level, user id)
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Long-lived store (audit logs)
    pub fn audit_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.audit_store = Some(store);
        self
    }

    pub fn alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Runtime for alerts and debounce timers. Without one they run on
    /// the caller's runtime, or on a background runtime when there is none.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn context(mut self, context: PageContext) -> Self {
        self.context = context;
        self
    }

    /// Modal contents; `CrisisModal::new` guarantees all four actions
    pub fn modal(mut self, modal: CrisisModal) -> Self {
        self.modal = modal;
        self
    }

    pub fn lock_notice(mut self, notice: LockNotice) -> Self {
        self.notice = notice;
        self
    }

    pub fn build(self) -> CrisisGuard {
        let detector = CrisisDetector::new(self.keywords)
            .with_min_length(self.settings.min_length)
            .with_sample_length(self.settings.sample_length);

        let session_backend = self
            .session_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let audit_backend = self
            .audit_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let debouncer = Debouncer::new(self.settings.debounce);
        let mut scheduler = self.scheduler.unwrap_or_default();
        if let Some(handle) = self.runtime {
            scheduler = scheduler.on_runtime(handle);
        }

        CrisisGuard {
            inner: Arc::new(GuardInner {
                detector,
                session: ResilientStore::new("session", session_backend),
                audit: ResilientStore::new("audit", audit_backend),
                ui: self.ui,
                alerts: self.alerts.unwrap_or_else(|| Arc::new(NoopAlertSink)),
                scheduler,
                debouncer,
                context: self.context,
                settings: self.settings,
                modal: self.modal,
                notice: self.notice,
                monitoring: AtomicBool::new(true),
            }),
        }
    }
}

impl CrisisGuard {
    pub fn builder(ui: Arc<dyn CrisisUi>) -> CrisisGuardBuilder {
        CrisisGuardBuilder {
            ui,
            keywords: KeywordSet::default(),
            settings: GuardSettings::default(),
            session_store: None,
            audit_store: None,
            alerts: None,
            scheduler: None,
            runtime: None,
            context: PageContext::default(),
            modal: CrisisModal::default(),
            notice: LockNotice::default(),
        }
    }

    /// Classify text. No side effects.
    pub fn scan(&self, text: &str) -> DetectionResult {
        self.inner.detector.scan(text)
    }

    /// Scan text from an input surface and respond if it matches.
    ///
    /// Returns None while monitoring is switched off.
    pub fn analyze(
        &self,
        text: &str,
        input_type: InputType,
        field_name: Option<&str>,
    ) -> Option<DetectionResult> {
        if !self.is_monitoring() {
            return None;
        }

        let started = Instant::now();
        let result = self.scan(text);

        if result.crisis_detected {
            self.respond(&result, started, input_type, field_name);
        }

        if self.inner.alerts.analysis_enabled()
            && text.chars().count() >= self.inner.settings.min_length
        {
            self.submit_for_analysis(text, input_type, field_name);
        }

        Some(result)
    }

    /// Run the crisis response for a positive detection.
    ///
    /// Modal, navigation lock and session state are in place before the
    /// remote alert is even queued. Does nothing for a clear result.
    pub fn handle_detection(
        &self,
        result: &DetectionResult,
        scan_start: Instant,
    ) -> Option<CrisisEvent> {
        self.respond(result, scan_start, InputType::Manual, None)
    }

    fn respond(
        &self,
        result: &DetectionResult,
        scan_start: Instant,
        input_type: InputType,
        field_name: Option<&str>,
    ) -> Option<CrisisEvent> {
        if !result.crisis_detected {
            return None;
        }
        let inner = &self.inner;

        inner.ui.show_modal(&inner.modal);
        inner.ui.focus_action(inner.modal.first_action());

        inner.ui.lock_navigation(&inner.notice);
        inner.ui.show_banner(BANNER_TEXT);

        let previous = CrisisSession::load(&inner.session);
        let severity = if previous.active {
            previous.severity.max(result.severity)
        } else {
            result.severity
        };
        CrisisSession { active: true, severity }.save(&inner.session);

        if !previous.active {
            tracing::warn!(severity = %severity, "Crisis session activated");
        } else if severity > previous.severity {
            tracing::warn!(from = %previous.severity, to = %severity, "Crisis session escalated");
        }

        let user_id = ensure_user_id(&inner.session);
        self.send_alert(CrisisAlert::from_detection(&user_id, result, Utc::now()), scan_start);

        let response_time = scan_start.elapsed();
        if response_time > inner.settings.response_budget {
            tracing::error!(
                response_ms = response_time.as_millis() as u64,
                "Local crisis response exceeded its budget"
            );
        }

        let event = AuditLog::new(&inner.audit).append_event(CrisisEvent {
            timestamp: Utc::now(),
            user_id,
            severity_level: result.severity,
            detected_keywords: result.matched_phrases.clone(),
            response_time: response_time.as_millis() as u64,
            input_type,
            field_name: field_name.map(str::to_string),
            user_agent: inner.context.user_agent.clone(),
            url: inner.context.url.clone(),
        });

        tracing::warn!(
            severity = %result.severity,
            keyword_count = result.matched_phrases.len(),
            response_ms = event.response_time,
            input_type = input_type.as_str(),
            "Crisis detected, local response applied"
        );

        Some(event)
    }

    fn send_alert(&self, alert: CrisisAlert, scan_start: Instant) {
        let alerts = Arc::clone(&self.inner.alerts);
        let budget = self.inner.settings.response_budget;

        self.inner.scheduler.spawn("crisis-alert", async move {
            match alerts.send_alert(&alert).await {
                Ok(()) => {
                    let elapsed = scan_start.elapsed();
                    if elapsed > budget {
                        tracing::warn!(
                            sink = alerts.name(),
                            latency_ms = elapsed.as_millis() as u64,
                            "Crisis alert delivered after the response budget"
                        );
                    } else {
                        tracing::info!(
                            sink = alerts.name(),
                            latency_ms = elapsed.as_millis() as u64,
                            "Crisis alert delivered"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(sink = alerts.name(), "Crisis alert not delivered: {}", e);
                }
            }
        });
    }

    fn submit_for_analysis(&self, text: &str, input_type: InputType, field_name: Option<&str>) {
        let user_id = ensure_user_id(&self.inner.session);
        let request = AnalysisRequest::new(&user_id, text, input_type, field_name, Utc::now());
        let alerts = Arc::clone(&self.inner.alerts);

        self.inner.scheduler.spawn("crisis-analysis", async move {
            if let Err(e) = alerts.submit_for_analysis(&request).await {
                tracing::warn!(sink = alerts.name(), "Backend analysis failed: {}", e);
            }
        });
    }

    /// Re-apply the lock for an active session. Call once per page load.
    pub fn bootstrap_page_load(&self) -> CrisisSession {
        let inner = &self.inner;
        ensure_user_id(&inner.session);

        let session = CrisisSession::load(&inner.session);
        if session.active {
            inner.ui.lock_navigation(&inner.notice);
            inner.ui.show_banner(BANNER_TEXT);
            tracing::info!(severity = %session.severity, "Existing crisis state restored");
        }
        session
    }

    /// The user activated one of the crisis resources
    pub fn record_action(&self, action: ActionKind) -> ActionOutcome {
        let inner = &self.inner;
        let user_id = ensure_user_id(&inner.session);

        AuditLog::new(&inner.audit).append_action(CrisisAction {
            timestamp: Utc::now(),
            action,
            user_id,
            url: inner.context.url.clone(),
        });

        let platform = Platform::from_user_agent(inner.context.user_agent.as_deref());
        let outcome = action.outcome(platform);
        match &outcome {
            ActionOutcome::OpenUri(uri) => inner.ui.open_uri(uri),
            ActionOutcome::OpenExternal(url) => inner.ui.open_external(url),
            ActionOutcome::Dialog(text) => inner.ui.show_dialog(text),
        }

        tracing::info!(action = %action, platform = ?platform, "Crisis action recorded");
        outcome
    }

    /// Close the modal. The navigation lock stays.
    pub fn dismiss_modal(&self) {
        self.inner.ui.hide_modal();
    }

    /// Administrative reset: clear the session and lift the lock
    pub fn reset(&self) {
        let inner = &self.inner;
        inner.debouncer.cancel_all();
        CrisisSession::clear(&inner.session);

        inner.ui.unlock_navigation();
        inner.ui.hide_banner();
        inner.ui.hide_modal();

        tracing::info!("Crisis state cleared");
    }

    /// Keystroke-level input; scanned once the field has been quiet for
    /// the debounce period
    pub fn on_input_changed(&self, field: &str, text: &str) {
        if !self.is_monitoring() {
            return;
        }

        let guard = self.clone();
        let field_name = field.to_string();
        let text = text.to_string();
        self.inner.debouncer.schedule(&self.inner.scheduler, field, async move {
            guard.analyze(&text, InputType::TextInput, Some(&field_name));
        });
    }

    /// Field lost focus: drop its timer and scan right away
    pub fn on_input_blurred(&self, field: &str, text: &str) -> Option<DetectionResult> {
        self.inner.debouncer.cancel(field);
        self.analyze(text, InputType::TextInput, Some(field))
    }

    /// Scan every text field of a submitted form
    pub fn on_form_submitted<K, V>(&self, fields: &[(K, V)]) -> Vec<DetectionResult>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        fields
            .iter()
            .filter_map(|(name, value)| {
                self.analyze(value.as_ref(), InputType::FormSubmission, Some(name.as_ref()))
            })
            .collect()
    }

    pub fn set_monitoring(&self, enabled: bool) {
        self.inner.monitoring.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.inner.debouncer.cancel_all();
        }
        tracing::info!(enabled, "Crisis monitoring toggled");
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.monitoring.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> CrisisSession {
        CrisisSession::load(&self.inner.session)
    }

    pub fn user_id(&self) -> String {
        ensure_user_id(&self.inner.session)
    }

    pub fn status(&self) -> GuardStatus {
        GuardStatus {
            session: self.session(),
            user_id: self.user_id(),
            monitoring: self.is_monitoring(),
            pending_timers: self.inner.debouncer.pending(),
            in_flight_tasks: self.inner.scheduler.in_flight(),
        }
    }

    pub fn events(&self) -> Vec<CrisisEvent> {
        AuditLog::new(&self.inner.audit).events()
    }

    pub fn actions(&self) -> Vec<CrisisAction> {
        AuditLog::new(&self.inner.audit).actions()
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.inner.scheduler
    }

    /// Wait for queued alerts and fired timers to finish
    pub async fn flush(&self) {
        self.inner.scheduler.flush().await;
    }

    /// Abandon pending timers and in-flight alerts (page teardown)
    pub async fn shutdown(&self) {
        self.inner.debouncer.cancel_all();
        self.inner.scheduler.shutdown().await;
    }
}
