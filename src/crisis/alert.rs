// Remote escalation to the crisis alerting backend
//
// Delivery is best effort and at most once: one POST, no retries. Callers
// log the typed error; nothing here can touch the local safety response.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::detector::{DetectionResult, InputType, Severity};

/// Upper bound for the remote leg of a detection
pub const ALERT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("alert endpoint returned HTTP {0}")]
    Status(u16),

    #[error("no alert endpoint configured")]
    NotConfigured,
}

impl AlertError {
    pub fn is_transport(&self) -> bool {
        matches!(self, AlertError::Transport(_))
    }
}

/// Body of `POST <backend>/crisis-alert`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisAlert {
    pub user_id: String,
    /// "MODERATE" or "HIGH"
    pub crisis_level: String,
    pub detected_content: String,
    /// RFC 3339 / ISO-8601
    pub timestamp: String,
    pub detected_keywords: Vec<String>,
}

impl CrisisAlert {
    pub fn from_detection(user_id: &str, result: &DetectionResult, at: DateTime<Utc>) -> Self {
        // Only detections are escalated; none never reaches here
        let level = if result.severity == Severity::None {
            Severity::Moderate
        } else {
            result.severity
        };

        Self {
            user_id: user_id.to_string(),
            crisis_level: level.label().to_string(),
            detected_content: result.sampled_text.clone(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            detected_keywords: result.matched_phrases.clone(),
        }
    }
}

/// Full text sent for comprehensive backend analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub user_id: String,
    pub content: String,
    pub timestamp: String,
    pub input_type: InputType,
    pub field_name: Option<String>,
}

impl AnalysisRequest {
    pub fn new(
        user_id: &str,
        content: &str,
        input_type: InputType,
        field_name: Option<&str>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            content: content.to_string(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            input_type,
            field_name: field_name.map(str::to_string),
        }
    }
}

/// Destination for escalations
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, alert: &CrisisAlert) -> Result<(), AlertError>;

    /// Forward text for deeper analysis. Disabled unless a sink opts in.
    async fn submit_for_analysis(&self, _request: &AnalysisRequest) -> Result<(), AlertError> {
        Ok(())
    }

    fn analysis_enabled(&self) -> bool {
        false
    }

    fn name(&self) -> &str;
}

/// Drops every alert. Used when no backend is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopAlertSink;

#[async_trait]
impl AlertSink for NoopAlertSink {
    async fn send_alert(&self, _alert: &CrisisAlert) -> Result<(), AlertError> {
        Err(AlertError::NotConfigured)
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// JSON-over-HTTP alerting backend
#[derive(Clone)]
pub struct HttpAlertSink {
    client: Client,
    alert_url: String,
    analysis_url: Option<String>,
}

impl HttpAlertSink {
    pub fn new(alert_url: impl Into<String>) -> Result<Self, AlertError> {
        Self::with_timeout(alert_url, Duration::from_secs(ALERT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        alert_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            alert_url: alert_url.into(),
            analysis_url: None,
        })
    }

    pub fn with_analysis_url(mut self, url: impl Into<String>) -> Self {
        self.analysis_url = Some(url.into());
        self
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> Result<(), AlertError> {
        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSink for HttpAlertSink {
    async fn send_alert(&self, alert: &CrisisAlert) -> Result<(), AlertError> {
        tracing::debug!(
            url = %self.alert_url,
            severity = %alert.crisis_level,
            keyword_count = alert.detected_keywords.len(),
            "Sending crisis alert"
        );
        self.post(&self.alert_url, alert).await
    }

    async fn submit_for_analysis(&self, request: &AnalysisRequest) -> Result<(), AlertError> {
        let Some(url) = self.analysis_url.as_deref() else {
            return Ok(());
        };
        tracing::debug!(
            url = %url,
            content_length = request.content.len(),
            input_type = request.input_type.as_str(),
            "Submitting text for backend analysis"
        );
        self.post(url, request).await
    }

    fn analysis_enabled(&self) -> bool {
        self.analysis_url.is_some()
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(severity: Severity) -> DetectionResult {
        DetectionResult {
            crisis_detected: true,
            severity,
            matched_phrases: vec!["want to die".to_string(), "hopeless".to_string()],
            sampled_text: "I want to die and feel hopeless".to_string(),
        }
    }

    #[test]
    fn test_alert_wire_format() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let alert = CrisisAlert::from_detection("user-7", &detection(Severity::High), at);

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["userId"], "user-7");
        assert_eq!(json["crisisLevel"], "HIGH");
        assert_eq!(json["detectedContent"], "I want to die and feel hopeless");
        assert_eq!(json["timestamp"], "2026-03-01T12:00:00.000Z");
        assert_eq!(json["detectedKeywords"][1], "hopeless");
    }

    #[test]
    fn test_moderate_label() {
        let alert = CrisisAlert::from_detection("u", &detection(Severity::Moderate), Utc::now());
        assert_eq!(alert.crisis_level, "MODERATE");
    }

    #[test]
    fn test_analysis_request_format() {
        let request = AnalysisRequest::new(
            "u",
            "some text here",
            InputType::FormSubmission,
            Some("journal"),
            Utc::now(),
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["inputType"], "form_submission");
        assert_eq!(json["fieldName"], "journal");
    }

    #[tokio::test]
    async fn test_noop_sink_reports_not_configured() {
        let sink = NoopAlertSink;
        let alert = CrisisAlert::from_detection("u", &detection(Severity::High), Utc::now());
        assert!(matches!(sink.send_alert(&alert).await, Err(AlertError::NotConfigured)));
        assert!(!sink.analysis_enabled());
    }
}
