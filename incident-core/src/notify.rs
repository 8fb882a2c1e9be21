use crate::cet;
use crate::ticket::RAISED_BY;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

/// Outcome of a single delivery attempt. No retry: the result is recorded on
/// the ticket and the flow continues regardless.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub status: DeliveryStatus,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SlackMessage {
    pub ticket_title: String,
    pub ticket_id: String,
    pub details: String,
    pub severity: String,
    pub affected_system: String,
    pub resolution: String,
    /// Post as a threaded reply to this message instead of top-level.
    pub thread_ts: Option<String>,
    /// Mirror a threaded reply to the parent channel. Informational
    /// follow-ups stay thread-only; escalations and critical tickets
    /// broadcast.
    pub reply_broadcast: bool,
}

/// Escalations, failures, and critical-severity tickets are mirrored to the
/// parent channel; everything else stays inside its thread.
pub fn should_broadcast(severity: &str, escalation: bool) -> bool {
    escalation || severity.eq_ignore_ascii_case("critical")
}

/// Block Kit rendering: header, id/severity field pair, optional affected
/// system, details, optional resolution, context footer with creation time
/// and attribution.
pub fn render_blocks(message: &SlackMessage) -> serde_json::Value {
    let mut blocks = vec![
        serde_json::json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("🎫 {}", message.ticket_title),
                "emoji": true
            }
        }),
        serde_json::json!({
            "type": "section",
            "fields": [
                {"type": "mrkdwn", "text": format!("*Ticket ID:*\n`{}`", message.ticket_id)},
                {"type": "mrkdwn", "text": format!("*Severity:*\n{}", message.severity)}
            ]
        }),
    ];

    if !message.affected_system.is_empty() {
        blocks.push(serde_json::json!({
            "type": "section",
            "fields": [
                {"type": "mrkdwn", "text": format!("*Affected System:*\n{}", message.affected_system)}
            ]
        }));
    }

    blocks.push(serde_json::json!({
        "type": "section",
        "text": {"type": "mrkdwn", "text": format!("*Incident Details:*\n{}", message.details)}
    }));

    if !message.resolution.is_empty() {
        blocks.push(serde_json::json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": format!("*Resolution:*\n{}", message.resolution)}
        }));
    }

    blocks.push(serde_json::json!({
        "type": "context",
        "elements": [
            {"type": "mrkdwn", "text": format!("Created: {}", cet::display(Utc::now()))}
        ]
    }));
    blocks.push(serde_json::json!({
        "type": "context",
        "elements": [
            {"type": "mrkdwn", "text": format!("Raised by: {RAISED_BY}")}
        ]
    }));

    serde_json::Value::Array(blocks)
}

/// Plain-text fallback carrying the same essential fields, for transports
/// that do not accept block-structured messages.
pub fn render_plain_text(message: &SlackMessage) -> String {
    let mut out = format!(
        "New Ticket: {}\nTicket ID: {}\nSeverity: {}",
        message.ticket_title, message.ticket_id, message.severity
    );
    if !message.affected_system.is_empty() {
        out.push_str(&format!("\nAffected System: {}", message.affected_system));
    }
    out.push_str(&format!("\nDetails: {}", message.details));
    out.push_str(&format!("\nRaised by: {RAISED_BY}"));
    out
}

pub struct SlackPost<'a> {
    pub channel: &'a str,
    pub blocks: &'a serde_json::Value,
    pub fallback_text: &'a str,
    pub thread_ts: Option<&'a str>,
    pub reply_broadcast: bool,
}

#[derive(Clone, Debug)]
pub struct SlackResponse {
    pub ts: String,
    pub channel_id: String,
}

/// Chat transport seam. The pipeline depends on this trait; the HTTP
/// implementation below is swapped for a fake in tests.
pub trait SlackSink: Send + Sync {
    fn post_message(&self, post: &SlackPost<'_>) -> Result<SlackResponse, String>;
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub token: Option<String>,
    pub channel: String,
}

impl SlackConfig {
    pub fn from_env() -> Self {
        Self {
            token: std::env::var("SLACK_BOT_TOKEN").ok(),
            channel: std::env::var("SLACK_CHANNEL").unwrap_or_else(|_| "#incidents".to_string()),
        }
    }
}

/// Slack Web API sink (`chat.postMessage`).
pub struct SlackApiSink {
    token: Option<String>,
    endpoint: String,
    http: reqwest::blocking::Client,
}

impl SlackApiSink {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            endpoint: "https://slack.com/api/chat.postMessage".to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }
}

impl SlackSink for SlackApiSink {
    fn post_message(&self, post: &SlackPost<'_>) -> Result<SlackResponse, String> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "SLACK_BOT_TOKEN not configured".to_string())?;

        let mut body = serde_json::json!({
            "channel": post.channel,
            "blocks": post.blocks,
            "text": post.fallback_text,
        });
        if let Some(ts) = post.thread_ts {
            body["thread_ts"] = serde_json::json!(ts);
            if post.reply_broadcast {
                body["reply_broadcast"] = serde_json::json!(true);
            }
        }

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .map_err(|e| e.to_string())?;
        let payload: serde_json::Value = response.json().map_err(|e| e.to_string())?;

        if !payload.get("ok").and_then(serde_json::Value::as_bool).unwrap_or(false) {
            let api_error = payload
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            return Err(format!("Slack API error: {api_error}"));
        }

        Ok(SlackResponse {
            ts: payload
                .get("ts")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
            channel_id: payload
                .get("channel")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Deliver one ticket message. A missing sink and every transport failure
/// collapse into a `Failed` result; nothing here can abort the pipeline.
pub fn notify(
    sink: Option<&dyn SlackSink>,
    channel: &str,
    message: &SlackMessage,
) -> DeliveryResult {
    let mut result = DeliveryResult {
        status: DeliveryStatus::Failed,
        channel: channel.to_string(),
        message_ts: None,
        channel_id: None,
        error: None,
    };

    let Some(sink) = sink else {
        result.error = Some("Slack sink unavailable".to_string());
        return result;
    };

    let blocks = render_blocks(message);
    let fallback = render_plain_text(message);
    let post = SlackPost {
        channel,
        blocks: &blocks,
        fallback_text: &fallback,
        thread_ts: message.thread_ts.as_deref(),
        reply_broadcast: message.reply_broadcast,
    };

    match sink.post_message(&post) {
        Ok(response) => {
            info!(ticket_id = %message.ticket_id, ts = %response.ts, "ticket posted to chat");
            result.status = DeliveryStatus::Success;
            result.message_ts = Some(response.ts);
            result.channel_id = Some(response.channel_id);
        }
        Err(message_text) => {
            error!(ticket_id = %message.ticket_id, error = %message_text, "chat delivery failed");
            result.error = Some(message_text);
        }
    }
    result
}
