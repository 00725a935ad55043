// Crisis resources: modal contents, lock notice, per-platform action dispatch

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const HOTLINE_NUMBER: &str = "988";
pub const TEXT_LINE_NUMBER: &str = "741741";
pub const TEXT_LINE_KEYWORD: &str = "TALK";
pub const CHAT_LINE_URL: &str = "https://988lifeline.org/chat";
pub const EMERGENCY_NUMBER: &str = "911";

pub const BANNER_TEXT: &str =
    "CRISIS SUPPORT ACTIVATED - Professional help is standing by 24/7";

static MOBILE_USER_AGENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Android|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini")
        .expect("mobile user agent regex is valid")
});

/// User-facing crisis actions, in modal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "call_988")]
    CallHotline,
    #[serde(rename = "text_crisis")]
    TextLine,
    #[serde(rename = "chat_crisis")]
    ChatLine,
    #[serde(rename = "call_911")]
    EmergencyCall,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::CallHotline,
        ActionKind::TextLine,
        ActionKind::ChatLine,
        ActionKind::EmergencyCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CallHotline => "call_988",
            ActionKind::TextLine => "text_crisis",
            ActionKind::ChatLine => "chat_crisis",
            ActionKind::EmergencyCall => "call_911",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::CallHotline => "Call 988",
            ActionKind::TextLine => "Text TALK to 741741",
            ActionKind::ChatLine => "Chat online",
            ActionKind::EmergencyCall => "Call 911",
        }
    }

    /// Accepts the audit names plus a few spellings people type on a CLI
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "call-988" | "call-hotline" | "hotline" => Some(ActionKind::CallHotline),
            "text-crisis" | "text-line" | "text" => Some(ActionKind::TextLine),
            "chat-crisis" | "chat-line" | "chat" => Some(ActionKind::ChatLine),
            "call-911" | "emergency-call" | "emergency" => Some(ActionKind::EmergencyCall),
            _ => None,
        }
    }

    /// What activating this action does on the given platform
    pub fn outcome(&self, platform: Platform) -> ActionOutcome {
        match (self, platform) {
            (ActionKind::CallHotline, Platform::Mobile) => {
                ActionOutcome::OpenUri(format!("tel:{}", HOTLINE_NUMBER))
            }
            (ActionKind::CallHotline, Platform::Desktop) => ActionOutcome::Dialog(format!(
                "Call {} from your phone\n\n988 Suicide & Crisis Lifeline\nAvailable 24/7, free and confidential",
                HOTLINE_NUMBER
            )),
            (ActionKind::TextLine, Platform::Mobile) => ActionOutcome::OpenUri(format!(
                "sms:{}&body={}",
                TEXT_LINE_NUMBER, TEXT_LINE_KEYWORD
            )),
            (ActionKind::TextLine, Platform::Desktop) => ActionOutcome::Dialog(format!(
                "Text {} to {}\n\nCrisis Text Line\nAvailable 24/7, free and confidential",
                TEXT_LINE_KEYWORD, TEXT_LINE_NUMBER
            )),
            (ActionKind::ChatLine, _) => ActionOutcome::OpenExternal(CHAT_LINE_URL.to_string()),
            (ActionKind::EmergencyCall, Platform::Mobile) => {
                ActionOutcome::OpenUri(format!("tel:{}", EMERGENCY_NUMBER))
            }
            (ActionKind::EmergencyCall, Platform::Desktop) => ActionOutcome::Dialog(format!(
                "Call {} for immediate emergency assistance",
                EMERGENCY_NUMBER
            )),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device class, decides between native intents and instruction dialogs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mobile,
    Desktop,
}

impl Platform {
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        match user_agent {
            Some(ua) if MOBILE_USER_AGENT.is_match(ua) => Platform::Mobile,
            _ => Platform::Desktop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Native dial/SMS intent (`tel:`, `sms:`)
    OpenUri(String),
    /// External page in a new tab
    OpenExternal(String),
    /// Number and instructions shown to the user
    Dialog(String),
}

/// Contents of the crisis-resources modal. Always offers every
/// `ActionKind`, each once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrisisModal {
    title: String,
    actions: Vec<ActionKind>,
    dismiss_label: String,
}

impl CrisisModal {
    /// `actions` sets the display order and must list every action once
    pub fn new(
        title: impl Into<String>,
        actions: Vec<ActionKind>,
        dismiss_label: impl Into<String>,
    ) -> Result<Self> {
        for kind in ActionKind::ALL {
            let count = actions.iter().filter(|a| **a == kind).count();
            if count != 1 {
                bail!(
                    "Crisis modal must offer '{}' exactly once (found {})",
                    kind.label(),
                    count
                );
            }
        }

        Ok(Self {
            title: title.into(),
            actions,
            dismiss_label: dismiss_label.into(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn actions(&self) -> &[ActionKind] {
        &self.actions
    }

    pub fn dismiss_label(&self) -> &str {
        &self.dismiss_label
    }

    /// Control that receives keyboard focus when the modal opens
    pub fn first_action(&self) -> ActionKind {
        self.actions.first().copied().unwrap_or(ActionKind::CallHotline)
    }
}

impl Default for CrisisModal {
    fn default() -> Self {
        Self {
            title: "988 Suicide & Crisis Lifeline".to_string(),
            actions: ActionKind::ALL.to_vec(),
            dismiss_label: "Close".to_string(),
        }
    }
}

/// Blocking overlay shown while navigation is locked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockNotice {
    pub title: String,
    pub message: String,
    /// Tooltip placed on every disabled navigation control
    pub control_hint: String,
    pub action: ActionKind,
}

impl Default for LockNotice {
    fn default() -> Self {
        Self {
            title: "Course Access Temporarily Blocked".to_string(),
            message: "For your safety, course access has been paused. Please connect with crisis support first."
                .to_string(),
            control_hint: "Course access blocked - please contact crisis support".to_string(),
            action: ActionKind::CallHotline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)";
        let android = "Mozilla/5.0 (Linux; android 14; Pixel 8)";
        let desktop = "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0";

        assert_eq!(Platform::from_user_agent(Some(iphone)), Platform::Mobile);
        assert_eq!(Platform::from_user_agent(Some(android)), Platform::Mobile);
        assert_eq!(Platform::from_user_agent(Some(desktop)), Platform::Desktop);
        assert_eq!(Platform::from_user_agent(None), Platform::Desktop);
    }

    #[test]
    fn test_mobile_outcomes_use_intents() {
        assert_eq!(
            ActionKind::CallHotline.outcome(Platform::Mobile),
            ActionOutcome::OpenUri("tel:988".into())
        );
        assert_eq!(
            ActionKind::TextLine.outcome(Platform::Mobile),
            ActionOutcome::OpenUri("sms:741741&body=TALK".into())
        );
        assert_eq!(
            ActionKind::EmergencyCall.outcome(Platform::Mobile),
            ActionOutcome::OpenUri("tel:911".into())
        );
    }

    #[test]
    fn test_desktop_outcomes_show_instructions() {
        match ActionKind::TextLine.outcome(Platform::Desktop) {
            ActionOutcome::Dialog(text) => assert!(text.contains("Text TALK to 741741")),
            other => panic!("expected dialog, got {:?}", other),
        }
        assert_eq!(
            ActionKind::ChatLine.outcome(Platform::Desktop),
            ActionOutcome::OpenExternal(CHAT_LINE_URL.into())
        );
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(ActionKind::parse("call_988"), Some(ActionKind::CallHotline));
        assert_eq!(ActionKind::parse("Emergency-Call"), Some(ActionKind::EmergencyCall));
        assert_eq!(ActionKind::parse("chat"), Some(ActionKind::ChatLine));
        assert_eq!(ActionKind::parse("fax"), None);
    }

    #[test]
    fn test_modal_focuses_hotline_first() {
        let modal = CrisisModal::default();
        assert_eq!(modal.actions().len(), 4);
        assert_eq!(modal.first_action(), ActionKind::CallHotline);
    }

    #[test]
    fn test_modal_requires_every_action() {
        let reordered = CrisisModal::new(
            "Help is available",
            vec![
                ActionKind::ChatLine,
                ActionKind::CallHotline,
                ActionKind::TextLine,
                ActionKind::EmergencyCall,
            ],
            "Close",
        )
        .unwrap();
        assert_eq!(reordered.first_action(), ActionKind::ChatLine);

        let missing = CrisisModal::new(
            "Help is available",
            vec![ActionKind::CallHotline, ActionKind::TextLine, ActionKind::ChatLine],
            "Close",
        );
        assert!(missing.unwrap_err().to_string().contains("exactly once"));

        let doubled = CrisisModal::new(
            "Help is available",
            vec![
                ActionKind::CallHotline,
                ActionKind::CallHotline,
                ActionKind::TextLine,
                ActionKind::ChatLine,
                ActionKind::EmergencyCall,
            ],
            "Close",
        );
        assert!(doubled.is_err());
    }

    #[test]
    fn test_action_serde_names() {
        let json = serde_json::to_string(&ActionKind::EmergencyCall).unwrap();
        assert_eq!(json, "\"call_911\"");
    }
}
