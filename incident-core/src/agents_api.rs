use crate::runtime::{RunClient, RunState, RunStatus, ToolCall, ToolOutput};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_API_VERSION: &str = "v1";

#[derive(Clone, Debug)]
pub struct AgentsApiConfig {
    pub endpoint: String,
    pub access_token: String,
    pub api_version: String,
}

impl AgentsApiConfig {
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("PROJECT_ENDPOINT").ok()?;
        let access_token = std::env::var("AZURE_ACCESS_TOKEN").ok()?;
        Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_token,
            api_version: std::env::var("AGENTS_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string()),
        })
    }
}

/// Cloud agent-run API over REST. Thread, run, and message resources live
/// remotely; this client only observes runs and submits tool outputs.
pub struct AgentsApiClient {
    config: AgentsApiConfig,
    http: reqwest::blocking::Client,
}

impl AgentsApiClient {
    pub fn new(config: AgentsApiConfig) -> Self {
        Self {
            config,
            http: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint, path)
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value, String> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.config.access_token)
            .query(&[("api-version", self.config.api_version.as_str())])
            .json(body)
            .send()
            .map_err(|e| e.to_string())?;
        read_json(response)
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value, String> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.config.access_token)
            .query(&[("api-version", self.config.api_version.as_str())])
            .query(query)
            .send()
            .map_err(|e| e.to_string())?;
        read_json(response)
    }
}

impl RunClient for AgentsApiClient {
    fn create_message(&self, thread_id: &str, content: &str) -> Result<String, String> {
        let body = serde_json::json!({"role": "user", "content": content});
        let payload = self.post(&format!("/threads/{thread_id}/messages"), &body)?;
        Ok(payload
            .get("id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<RunState, String> {
        let body = serde_json::json!({"assistant_id": agent_id});
        let payload = self.post(&format!("/threads/{thread_id}/runs"), &body)?;
        parse_run(&payload)
    }

    fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunState, String> {
        let payload = self.get(&format!("/threads/{thread_id}/runs/{run_id}"), &[])?;
        parse_run(&payload)
    }

    fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunState, String> {
        debug!(run_id, outputs = outputs.len(), "submitting tool outputs");
        let body = serde_json::json!({
            "tool_outputs": outputs
                .iter()
                .map(|o| serde_json::json!({
                    "tool_call_id": o.tool_call_id,
                    "output": o.output,
                }))
                .collect::<Vec<_>>()
        });
        let payload = self.post(
            &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &body,
        )?;
        parse_run(&payload)
    }

    fn latest_agent_message(&self, thread_id: &str) -> Result<Option<String>, String> {
        let payload = self.get(
            &format!("/threads/{thread_id}/messages"),
            &[("order", "desc"), ("limit", "20")],
        )?;
        let messages: MessageList =
            serde_json::from_value(payload).map_err(|e| format!("invalid message list: {e}"))?;
        Ok(messages
            .data
            .into_iter()
            .find(|m| m.role == "assistant")
            .map(|m| {
                m.content
                    .into_iter()
                    .filter_map(|c| c.text.map(|t| t.value))
                    .collect::<Vec<_>>()
                    .join("\n")
            }))
    }
}

fn read_json(response: reqwest::blocking::Response) -> Result<serde_json::Value, String> {
    let status = response.status();
    if !status.is_success() {
        return Err(format!("agents API returned {status}"));
    }
    response.json().map_err(|e| format!("invalid agents API payload: {e}"))
}

/// Map a raw run resource into `RunState`. Tool-call arguments arrive as a
/// JSON-encoded string and are decoded here; undecodable arguments pass
/// through as a raw string value.
pub fn parse_run(payload: &serde_json::Value) -> Result<RunState, String> {
    let id = payload
        .get("id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| "run payload missing id".to_string())?
        .to_string();
    let status: RunStatus = payload
        .get("status")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| format!("invalid run status: {e}"))?
        .unwrap_or(RunStatus::Unknown);

    let required_action = payload
        .get("required_action")
        .and_then(|a| a.get("submit_tool_outputs"))
        .and_then(|s| s.get("tool_calls"))
        .and_then(serde_json::Value::as_array)
        .map(|calls| calls.iter().filter_map(parse_tool_call).collect::<Vec<_>>());

    let last_error = payload.get("last_error").and_then(|e| {
        e.get("message")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
    });

    Ok(RunState {
        id,
        status,
        required_action,
        last_error,
    })
}

fn parse_tool_call(call: &serde_json::Value) -> Option<ToolCall> {
    let id = call.get("id")?.as_str()?.to_string();
    let function = call.get("function")?;
    let name = function.get("name")?.as_str()?.to_string();
    let arguments = match function.get("arguments") {
        Some(serde_json::Value::String(raw)) => serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.clone())),
        Some(value) => value.clone(),
        None => serde_json::json!({}),
    };
    Some(ToolCall { id, name, arguments })
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_pending_tool_calls() {
        let payload = serde_json::json!({
            "id": "run-1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": {
                            "name": "calculate_benefits",
                            "arguments": "{\"problem_type\": \"high cpu\"}"
                        }
                    }]
                }
            }
        });
        let run = parse_run(&payload).expect("parse");
        assert_eq!(run.status, RunStatus::RequiresAction);
        let calls = run.required_action.expect("calls");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "calculate_benefits");
        assert_eq!(calls[0].arguments["problem_type"], "high cpu");
    }

    #[test]
    fn parses_failed_run_error() {
        let payload = serde_json::json!({
            "id": "run-2",
            "status": "failed",
            "last_error": {"code": "server_error", "message": "model overloaded"}
        });
        let run = parse_run(&payload).expect("parse");
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.last_error.as_deref(), Some("model overloaded"));
    }

    #[test]
    fn unknown_status_does_not_break_parsing() {
        let payload = serde_json::json!({"id": "run-3", "status": "cancelling"});
        let run = parse_run(&payload).expect("parse");
        assert_eq!(run.status, RunStatus::Unknown);
    }

    #[test]
    fn latest_assistant_message_extraction() {
        let payload = serde_json::json!({
            "data": [
                {"role": "user", "content": [{"type": "text", "text": {"value": "question"}}]},
                {"role": "assistant", "content": [
                    {"type": "text", "text": {"value": "line one"}},
                    {"type": "text", "text": {"value": "line two"}}
                ]}
            ]
        });
        let messages: MessageList = serde_json::from_value(payload).expect("parse");
        let text = messages
            .data
            .into_iter()
            .find(|m| m.role == "assistant")
            .map(|m| {
                m.content
                    .into_iter()
                    .filter_map(|c| c.text.map(|t| t.value))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        assert_eq!(text.as_deref(), Some("line one\nline two"));
    }
}
