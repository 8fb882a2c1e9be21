use crate::correlate::Correlation;
use crate::triage::Triage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Payload forwarded to the downstream resolution collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HandoffPayload {
    pub ticket_id: String,
    pub title: String,
    pub summary: String,
    pub created_at: String,
    pub triage: Triage,
    pub correlation: Correlation,
    #[serde(skip_serializing_if = "serde_json::Value::is_null", default)]
    pub context: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandoffResult {
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

/// Capability interface for the resolution collaborator, injected at
/// construction time. Either present or a documented no-op; there is no
/// import-time feature detection.
pub trait ResolutionHandler: Send + Sync {
    fn handle(&self, payload: &HandoffPayload) -> Result<serde_json::Value, String>;
}

/// Best-effort hand-off: an absent handler and a failing handler both yield
/// a `sent: false` result, never an error out of this function.
pub fn dispatch(handler: Option<&dyn ResolutionHandler>, payload: &HandoffPayload) -> HandoffResult {
    let Some(handler) = handler else {
        return HandoffResult {
            sent: false,
            detail: Some("no resolution agent found".to_string()),
            error: None,
            response: None,
        };
    };

    match handler.handle(payload) {
        Ok(response) => {
            info!(ticket_id = %payload.ticket_id, "ticket handed off to resolution agent");
            HandoffResult {
                sent: true,
                detail: None,
                error: None,
                response: Some(response),
            }
        }
        Err(message) => {
            warn!(ticket_id = %payload.ticket_id, error = %message, "resolution hand-off failed");
            HandoffResult {
                sent: false,
                detail: None,
                error: Some(message),
                response: None,
            }
        }
    }
}

/// Resolution collaborator reached over a plain webhook POST.
pub struct WebhookResolutionHandler {
    url: String,
    http: reqwest::blocking::Client,
}

impl WebhookResolutionHandler {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::blocking::Client::new(),
        }
    }
}

impl ResolutionHandler for WebhookResolutionHandler {
    fn handle(&self, payload: &HandoffPayload) -> Result<serde_json::Value, String> {
        let response = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("resolution webhook returned {status}"));
        }
        response
            .json()
            .or_else(|_| Ok(serde_json::json!({"status": "accepted"})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::correlate;
    use crate::triage::parse_alert;

    fn payload() -> HandoffPayload {
        let triage = parse_alert("service-x degraded at 2025-10-23T12:00:00Z");
        let correlation = correlate(&triage, None);
        HandoffPayload {
            ticket_id: "INC0000001".into(),
            title: "Availability alert - service-x".into(),
            summary: "service-x degraded".into(),
            created_at: "2025-10-23T14:00:00+02:00".into(),
            triage,
            correlation,
            context: serde_json::Value::Null,
        }
    }

    struct OkHandler;
    impl ResolutionHandler for OkHandler {
        fn handle(&self, _payload: &HandoffPayload) -> Result<serde_json::Value, String> {
            Ok(serde_json::json!({"note": "received"}))
        }
    }

    struct FailingHandler;
    impl ResolutionHandler for FailingHandler {
        fn handle(&self, _payload: &HandoffPayload) -> Result<serde_json::Value, String> {
            Err("resolution agent unreachable".into())
        }
    }

    #[test]
    fn absent_handler_is_a_noop_with_detail() {
        let result = dispatch(None, &payload());
        assert!(!result.sent);
        assert_eq!(result.detail.as_deref(), Some("no resolution agent found"));
        assert!(result.error.is_none());
    }

    #[test]
    fn present_handler_receives_payload() {
        let result = dispatch(Some(&OkHandler), &payload());
        assert!(result.sent);
        assert_eq!(result.response, Some(serde_json::json!({"note": "received"})));
    }

    #[test]
    fn handler_failure_never_propagates() {
        let result = dispatch(Some(&FailingHandler), &payload());
        assert!(!result.sent);
        assert_eq!(result.error.as_deref(), Some("resolution agent unreachable"));
    }
}
