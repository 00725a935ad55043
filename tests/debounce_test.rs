// Debounced input capture: per-field timers, blur scans, reset and teardown
//
// Runs on paused tokio time so the 1 s quiet period is exact.

use crisis_guard::crisis::{CrisisGuard, GuardSettings, HeadlessPage, InputType};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const CRISIS_TEXT: &str = "I want to die and feel hopeless";
const BENIGN_TEXT: &str = "Today I walked around the lake";

fn guard() -> (CrisisGuard, Arc<HeadlessPage>) {
    let page = Arc::new(HeadlessPage::lesson_page());
    let guard = CrisisGuard::builder(page.clone())
        .settings(GuardSettings {
            debounce: Duration::from_secs(1),
            ..GuardSettings::default()
        })
        .build();
    (guard, page)
}

/// Type `text` one character at a time, `gap` apart
async fn type_out(guard: &CrisisGuard, field: &str, text: &str, gap: Duration) {
    let mut typed = String::new();
    for ch in text.chars() {
        typed.push(ch);
        guard.on_input_changed(field, &typed);
        sleep(gap).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_scan_waits_for_quiet_period() {
    let (guard, page) = guard();

    type_out(&guard, "journal", CRISIS_TEXT, Duration::from_millis(150)).await;

    // Keystrokes kept resetting the timer: nothing scanned yet
    assert!(guard.events().is_empty());
    assert!(!page.snapshot().is_locked());

    sleep(Duration::from_millis(900)).await;
    let events = guard.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].input_type, InputType::TextInput);
    assert_eq!(events[0].field_name.as_deref(), Some("journal"));
    assert!(page.snapshot().is_locked());

    // No further scans once the field is quiet
    sleep(Duration::from_secs(5)).await;
    assert_eq!(guard.events().len(), 1);
    guard.flush().await;
}

#[tokio::test(start_paused = true)]
async fn test_fields_have_independent_timers() {
    let (guard, _page) = guard();

    guard.on_input_changed("journal", CRISIS_TEXT);
    sleep(Duration::from_millis(600)).await;

    // Typing elsewhere must not push back the journal timer
    guard.on_input_changed("worksheet", BENIGN_TEXT);
    assert_eq!(guard.status().pending_timers, 2);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(guard.events().len(), 1);
    assert_eq!(guard.status().pending_timers, 1);

    sleep(Duration::from_millis(600)).await;
    assert_eq!(guard.status().pending_timers, 0);
    assert_eq!(guard.events().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_blur_scans_immediately_once() {
    let (guard, page) = guard();

    guard.on_input_changed("journal", CRISIS_TEXT);
    let result = guard.on_input_blurred("journal", CRISIS_TEXT).unwrap();
    assert!(result.crisis_detected);
    assert!(page.snapshot().is_locked());
    assert_eq!(guard.events().len(), 1);

    // The pending keystroke timer was cancelled by the blur
    sleep(Duration::from_secs(3)).await;
    assert_eq!(guard.events().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_pending_scans() {
    let (guard, page) = guard();

    guard.on_input_changed("journal", CRISIS_TEXT);
    guard.reset();

    sleep(Duration::from_secs(2)).await;
    assert!(guard.events().is_empty());
    assert!(!page.snapshot().is_locked());
}

#[tokio::test(start_paused = true)]
async fn test_monitoring_off_ignores_keystrokes() {
    let (guard, _page) = guard();
    guard.set_monitoring(false);

    guard.on_input_changed("journal", CRISIS_TEXT);
    assert_eq!(guard.status().pending_timers, 0);
    assert!(guard.on_input_blurred("journal", CRISIS_TEXT).is_none());

    sleep(Duration::from_secs(2)).await;
    assert!(guard.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_timers() {
    let (guard, _page) = guard();

    guard.on_input_changed("journal", CRISIS_TEXT);
    guard.shutdown().await;

    sleep(Duration::from_secs(2)).await;
    assert!(guard.events().is_empty());
}
