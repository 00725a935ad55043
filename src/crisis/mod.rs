// Crisis signal detection
// Keyword matching, sticky session lock, audit trail and escalation

pub mod alert;
pub mod audit;
pub mod detector;
pub mod guard;
pub mod keywords;
pub mod resources;
pub mod scheduler;
pub mod session;
pub mod ui;

pub use alert::{AlertError, AlertSink, CrisisAlert, HttpAlertSink, NoopAlertSink};
pub use audit::{AuditLog, CrisisAction, CrisisEvent};
pub use detector::{CrisisDetector, DetectionResult, InputType, Severity};
pub use guard::{CrisisGuard, CrisisGuardBuilder, GuardSettings, GuardStatus, PageContext};
pub use keywords::KeywordSet;
pub use resources::{ActionKind, ActionOutcome, CrisisModal, LockNotice, Platform};
pub use scheduler::{Debouncer, TaskScheduler};
pub use session::{CrisisSession, FileStore, MemoryStore, SessionStore, StoreError};
pub use ui::{CrisisUi, HeadlessPage, NavControl, PageEffect, PageSnapshot};
