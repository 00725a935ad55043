// Append-only crisis audit trail
//
// Events (detections) and actions (hotline/text/chat/911 activations) are
// kept as JSON arrays in the long-lived store. Nothing here prunes them;
// export tooling reads them back. Entries are appended as raw JSON values,
// so records this version cannot parse are carried along untouched.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::detector::{InputType, Severity};
use super::resources::ActionKind;
use super::session::{ResilientStore, KEY_CRISIS_ACTIONS, KEY_CRISIS_EVENTS};

/// One handled detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisEvent {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub severity_level: Severity,
    pub detected_keywords: Vec<String>,
    /// Milliseconds from scan start to the local response being in place
    pub response_time: u64,
    #[serde(default)]
    pub input_type: InputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One user activation of a crisis resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisAction {
    pub timestamp: DateTime<Utc>,
    pub action: ActionKind,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
    fn set_timestamp(&mut self, ts: DateTime<Utc>);
}

impl Timestamped for CrisisEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    fn set_timestamp(&mut self, ts: DateTime<Utc>) {
        self.timestamp = ts;
    }
}

impl Timestamped for CrisisAction {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    fn set_timestamp(&mut self, ts: DateTime<Utc>) {
        self.timestamp = ts;
    }
}

/// Audit log over the long-lived store
pub struct AuditLog<'a> {
    store: &'a ResilientStore,
}

impl<'a> AuditLog<'a> {
    pub fn new(store: &'a ResilientStore) -> Self {
        Self { store }
    }

    pub fn append_event(&self, event: CrisisEvent) -> CrisisEvent {
        self.append(KEY_CRISIS_EVENTS, event)
    }

    pub fn append_action(&self, action: CrisisAction) -> CrisisAction {
        self.append(KEY_CRISIS_ACTIONS, action)
    }

    pub fn events(&self) -> Vec<CrisisEvent> {
        self.read(KEY_CRISIS_EVENTS)
    }

    pub fn actions(&self) -> Vec<CrisisAction> {
        self.read(KEY_CRISIS_ACTIONS)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let Some(raw) = self.store.get(key) else {
            return Vec::new();
        };
        let entries = match parse_entries(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(key, "Audit log is unreadable: {}", e);
                return Vec::new();
            }
        };

        let total = entries.len();
        let parsed: Vec<T> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        if parsed.len() < total {
            tracing::debug!(
                key,
                skipped = total - parsed.len(),
                "Unrecognized audit entries skipped"
            );
        }
        parsed
    }

    /// Append an entry under the store's update lock. Wall clocks can step
    /// backwards, so the stored timestamp is clamped to the latest existing
    /// one.
    ///
    /// A log that is not a JSON array is copied to `<key>.corrupt.<millis>`
    /// before a fresh array replaces it.
    fn append<T>(&self, key: &str, entry: T) -> T
    where
        T: Timestamped + Serialize + Clone,
    {
        let set_aside = self.store.get(key).filter(|raw| parse_entries(raw).is_err());
        if let Some(raw) = &set_aside {
            let aside_key = format!("{}.corrupt.{}", key, Utc::now().timestamp_millis());
            tracing::warn!(key, aside_key = %aside_key, "Audit log is unreadable, moved aside");
            self.store.set(&aside_key, raw);
        }

        let mut stored = entry.clone();
        let mut count = 0;
        let written = self.store.update(key, &mut |current| {
            let mut entries = match current.map(parse_entries) {
                None => Vec::new(),
                Some(Ok(entries)) => entries,
                Some(Err(_)) if current == set_aside.as_deref() => Vec::new(),
                Some(Err(e)) => {
                    tracing::error!(
                        key,
                        "Audit log changed while unreadable, entry not stored: {}",
                        e
                    );
                    return None;
                }
            };

            stored = entry.clone();
            if let Some(latest) = entries.iter().filter_map(entry_timestamp).max() {
                if stored.timestamp() < latest {
                    stored.set_timestamp(latest);
                }
            }

            match serde_json::to_value(&stored) {
                Ok(value) => entries.push(value),
                Err(e) => {
                    tracing::error!(key, "Failed to serialize audit entry: {}", e);
                    return None;
                }
            }
            count = entries.len();
            serde_json::to_string(&entries).ok()
        });

        if written.is_some() {
            tracing::debug!(key, entries = count, "Audit entry appended");
        }
        stored
    }
}

fn parse_entries(raw: &str) -> Result<Vec<Value>, serde_json::Error> {
    serde_json::from_str(raw)
}

fn entry_timestamp(entry: &Value) -> Option<DateTime<Utc>> {
    let raw = entry.get("timestamp")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crisis::session::{MemoryStore, SessionStore};
    use chrono::Duration;
    use std::sync::Arc;

    fn event_at(timestamp: DateTime<Utc>) -> CrisisEvent {
        CrisisEvent {
            timestamp,
            user_id: "user-1".to_string(),
            severity_level: Severity::High,
            detected_keywords: vec!["hopeless".to_string()],
            response_time: 3,
            input_type: InputType::TextInput,
            field_name: None,
            user_agent: None,
            url: None,
        }
    }

    #[test]
    fn test_events_append_in_order() {
        let store = ResilientStore::new("audit", Arc::new(MemoryStore::new()));
        let log = AuditLog::new(&store);

        let now = Utc::now();
        log.append_event(event_at(now));
        log.append_event(event_at(now + Duration::seconds(1)));

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].timestamp <= events[1].timestamp);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let store = ResilientStore::new("audit", Arc::new(MemoryStore::new()));
        let log = AuditLog::new(&store);

        let now = Utc::now();
        log.append_event(event_at(now));
        let stored = log.append_event(event_at(now - Duration::minutes(5)));

        assert_eq!(stored.timestamp, now);
        let events = log.events();
        assert_eq!(events[1].timestamp, now);
    }

    #[test]
    fn test_actions_are_separate_from_events() {
        let store = ResilientStore::new("audit", Arc::new(MemoryStore::new()));
        let log = AuditLog::new(&store);

        log.append_action(CrisisAction {
            timestamp: Utc::now(),
            action: ActionKind::TextLine,
            user_id: "user-1".to_string(),
            url: None,
        });

        assert_eq!(log.actions().len(), 1);
        assert!(log.events().is_empty());

        let raw = store.get(KEY_CRISIS_ACTIONS).unwrap();
        assert!(raw.contains("\"action\":\"text_crisis\""));
        assert!(raw.contains("\"userId\":\"user-1\""));
    }

    #[test]
    fn test_corrupt_log_is_moved_aside() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(KEY_CRISIS_EVENTS, "[{\"timestamp\":\"2025-01-01T00:00").unwrap();
        let store = ResilientStore::new("audit", backend.clone());
        let log = AuditLog::new(&store);

        log.append_event(event_at(Utc::now()));
        assert_eq!(log.events().len(), 1);

        // The unreadable text is still there under its own key
        let aside = backend
            .keys()
            .into_iter()
            .find(|k| k.starts_with("crisisEvents.corrupt."))
            .unwrap();
        assert_eq!(
            backend.get(&aside).unwrap().as_deref(),
            Some("[{\"timestamp\":\"2025-01-01T00:00")
        );
    }

    #[test]
    fn test_unknown_entries_are_kept() {
        let store = ResilientStore::new("audit", Arc::new(MemoryStore::new()));
        store.set(KEY_CRISIS_EVENTS, r#"[{"note":"from another tool"}]"#);
        let log = AuditLog::new(&store);

        log.append_event(event_at(Utc::now()));
        assert_eq!(log.events().len(), 1);

        let raw = store.get(KEY_CRISIS_EVENTS).unwrap();
        assert!(raw.contains("from another tool"));
    }

    #[test]
    fn test_legacy_event_without_input_type() {
        let store = ResilientStore::new("audit", Arc::new(MemoryStore::new()));
        store.set(
            KEY_CRISIS_EVENTS,
            r#"[{"timestamp":"2099-01-01T00:00:00.000Z","userId":"anonymous_1","severityLevel":"moderate","detectedKeywords":["hopeless"],"responseTime":8}]"#,
        );
        let log = AuditLog::new(&store);

        let stored = log.append_event(event_at(Utc::now()));
        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].input_type, InputType::Manual);
        assert_eq!(events[0].severity_level, Severity::Moderate);
        // Clamped to the legacy entry's later timestamp
        assert_eq!(stored.timestamp, events[0].timestamp);
        assert_eq!(events[1].timestamp, events[0].timestamp);
    }
}
