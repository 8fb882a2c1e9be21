use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Remote run status. The run is an external resource: observed and nudged
/// (by submitting tool outputs), never set directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunState {
    pub id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_action: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Remote agent-run API seam. One implementation speaks the cloud REST API;
/// tests use in-memory fakes.
pub trait RunClient: Send + Sync {
    fn create_message(&self, thread_id: &str, content: &str) -> Result<String, String>;
    fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<RunState, String>;
    fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunState, String>;
    fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunState, String>;
    fn latest_agent_message(&self, thread_id: &str) -> Result<Option<String>, String>;
}

pub type ToolHandler = Box<dyn Fn(&serde_json::Value) -> Result<String, String> + Send + Sync>;

/// Dispatch table from tool name to local handler. One registry replaces the
/// near-identical per-agent copies of the tool-call loop.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&serde_json::Value) -> Result<String, String> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    /// Ok(None) means the tool is unknown here; the call is skipped rather
    /// than failed, matching the submit-what-you-have behavior of the run
    /// API.
    pub fn dispatch(&self, call: &ToolCall) -> Result<Option<ToolOutput>, String> {
        match self.handlers.get(&call.name) {
            Some(handler) => handler(&call.arguments).map(|output| {
                Some(ToolOutput {
                    tool_call_id: call.id.clone(),
                    output,
                })
            }),
            None => Ok(None),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// Longer wait after a transient poll error before retrying.
    pub error_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Terminal result of driving a run. Timeout is deliberately distinct from
/// failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(String),
    Failed(String),
    TimedOut,
}

impl RunOutcome {
    pub fn text(&self) -> &str {
        match self {
            RunOutcome::Completed(text) | RunOutcome::Failed(text) => text,
            RunOutcome::TimedOut => "timed out",
        }
    }
}

/// Drive a remote run to completion: fixed-interval polling up to a timeout,
/// dispatching any requested tool calls through the registry and submitting
/// their outputs as a batch before resuming. A tool-handler error aborts the
/// loop; there is no partial-submission retry.
pub fn poll_run(
    client: &dyn RunClient,
    thread_id: &str,
    run: RunState,
    tools: &ToolRegistry,
    config: &PollConfig,
) -> RunOutcome {
    let deadline = Instant::now() + config.timeout;
    let run_id = run.id.clone();
    let mut run = run;

    loop {
        match run.status {
            RunStatus::Completed => return completed_outcome(client, thread_id),
            RunStatus::Failed => {
                let detail = run
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "run failed".to_string());
                return RunOutcome::Failed(detail);
            }
            RunStatus::RequiresAction => {
                let calls = run.required_action.take().unwrap_or_default();
                debug!(run_id = %run_id, calls = calls.len(), "run requires action");

                let mut outputs = Vec::new();
                for call in &calls {
                    match tools.dispatch(call) {
                        Ok(Some(output)) => outputs.push(output),
                        Ok(None) => warn!(tool = %call.name, "no handler for requested tool"),
                        Err(message) => {
                            error!(tool = %call.name, error = %message, "tool handler failed");
                            return RunOutcome::Failed(format!(
                                "tool '{}' failed: {message}",
                                call.name
                            ));
                        }
                    }
                }

                if !outputs.is_empty() {
                    match client.submit_tool_outputs(thread_id, &run_id, &outputs) {
                        Ok(next) => {
                            run = next;
                            continue;
                        }
                        Err(message) => {
                            return RunOutcome::Failed(format!(
                                "tool output submission failed: {message}"
                            ));
                        }
                    }
                }
            }
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Unknown => {}
        }

        if Instant::now() >= deadline {
            warn!(run_id = %run_id, "run exceeded polling timeout");
            return RunOutcome::TimedOut;
        }
        std::thread::sleep(config.interval);

        match client.get_run(thread_id, &run_id) {
            Ok(next) => run = next,
            Err(message) => {
                debug!(run_id = %run_id, error = %message, "poll error, backing off");
                std::thread::sleep(config.error_backoff);
            }
        }
    }
}

/// Post a user message, start a run, and drive it to completion. The single
/// shared routine behind every agent integration.
pub fn post_and_poll(
    client: &dyn RunClient,
    thread_id: &str,
    agent_id: &str,
    content: &str,
    tools: &ToolRegistry,
    config: &PollConfig,
) -> RunOutcome {
    let message_id = match client.create_message(thread_id, content) {
        Ok(id) => id,
        Err(message) => return RunOutcome::Failed(format!("message creation failed: {message}")),
    };
    debug!(thread_id, message_id = %message_id, "posted message");

    let run = match client.create_run(thread_id, agent_id) {
        Ok(run) => run,
        Err(message) => return RunOutcome::Failed(format!("run creation failed: {message}")),
    };
    poll_run(client, thread_id, run, tools, config)
}

fn completed_outcome(client: &dyn RunClient, thread_id: &str) -> RunOutcome {
    match client.latest_agent_message(thread_id) {
        Ok(Some(text)) => RunOutcome::Completed(text),
        Ok(None) => RunOutcome::Completed("no agent response".to_string()),
        Err(message) => RunOutcome::Failed(format!("error retrieving agent response: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn fast_config() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(30),
            error_backoff: Duration::from_millis(1),
        }
    }

    fn run(status: RunStatus) -> RunState {
        RunState {
            id: "run-1".into(),
            status,
            required_action: None,
            last_error: None,
        }
    }

    /// Fake client that walks a scripted sequence of run states.
    struct ScriptedClient {
        states: Mutex<Vec<RunState>>,
        submitted: Mutex<Vec<ToolOutput>>,
        final_message: Option<String>,
    }

    impl ScriptedClient {
        fn new(states: Vec<RunState>, final_message: Option<&str>) -> Self {
            Self {
                states: Mutex::new(states),
                submitted: Mutex::new(Vec::new()),
                final_message: final_message.map(ToString::to_string),
            }
        }

        fn next_state(&self) -> RunState {
            let mut states = self.states.lock().expect("lock");
            if states.len() > 1 {
                states.remove(0)
            } else {
                states.first().cloned().unwrap_or_else(|| run(RunStatus::InProgress))
            }
        }
    }

    impl RunClient for ScriptedClient {
        fn create_message(&self, _thread_id: &str, _content: &str) -> Result<String, String> {
            Ok("msg-1".into())
        }

        fn create_run(&self, _thread_id: &str, _agent_id: &str) -> Result<RunState, String> {
            Ok(self.next_state())
        }

        fn get_run(&self, _thread_id: &str, _run_id: &str) -> Result<RunState, String> {
            Ok(self.next_state())
        }

        fn submit_tool_outputs(
            &self,
            _thread_id: &str,
            _run_id: &str,
            outputs: &[ToolOutput],
        ) -> Result<RunState, String> {
            self.submitted.lock().expect("lock").extend(outputs.iter().cloned());
            Ok(self.next_state())
        }

        fn latest_agent_message(&self, _thread_id: &str) -> Result<Option<String>, String> {
            Ok(self.final_message.clone())
        }
    }

    #[test]
    fn completed_run_yields_latest_agent_message() {
        let client = ScriptedClient::new(
            vec![run(RunStatus::Queued), run(RunStatus::InProgress), run(RunStatus::Completed)],
            Some("analysis done"),
        );
        let outcome = post_and_poll(
            &client,
            "thread-1",
            "agent-1",
            "analyze",
            &ToolRegistry::new(),
            &fast_config(),
        );
        assert_eq!(outcome, RunOutcome::Completed("analysis done".into()));
    }

    #[test]
    fn failed_run_surfaces_remote_error() {
        let mut failed = run(RunStatus::Failed);
        failed.last_error = Some("model overloaded".into());
        let client = ScriptedClient::new(vec![run(RunStatus::InProgress), failed], None);
        let outcome = poll_run(
            &client,
            "thread-1",
            run(RunStatus::Queued),
            &ToolRegistry::new(),
            &fast_config(),
        );
        assert_eq!(outcome, RunOutcome::Failed("model overloaded".into()));
    }

    #[test]
    fn stuck_run_times_out_distinct_from_failure() {
        let client = ScriptedClient::new(vec![run(RunStatus::InProgress)], None);
        let outcome = poll_run(
            &client,
            "thread-1",
            run(RunStatus::InProgress),
            &ToolRegistry::new(),
            &fast_config(),
        );
        assert_eq!(outcome, RunOutcome::TimedOut);
        assert_eq!(outcome.text(), "timed out");
    }

    #[test]
    fn requires_action_dispatches_and_submits_batch() {
        let mut action = run(RunStatus::RequiresAction);
        action.required_action = Some(vec![
            ToolCall {
                id: "call-1".into(),
                name: "calculate_benefits".into(),
                arguments: serde_json::json!({"problem_type": "high cpu"}),
            },
            ToolCall {
                id: "call-2".into(),
                name: "unknown_tool".into(),
                arguments: serde_json::json!({}),
            },
        ]);
        let client =
            ScriptedClient::new(vec![action, run(RunStatus::Completed)], Some("done"));

        let mut tools = ToolRegistry::new();
        tools.register("calculate_benefits", |args| {
            Ok(format!("handled: {}", args["problem_type"].as_str().unwrap_or("")))
        });

        let outcome = poll_run(
            &client,
            "thread-1",
            client.next_state(),
            &tools,
            &fast_config(),
        );
        assert_eq!(outcome, RunOutcome::Completed("done".into()));

        let submitted = client.submitted.lock().expect("lock");
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].tool_call_id, "call-1");
        assert_eq!(submitted[0].output, "handled: high cpu");
    }

    #[test]
    fn tool_handler_error_aborts_the_loop() {
        let mut action = run(RunStatus::RequiresAction);
        action.required_action = Some(vec![ToolCall {
            id: "call-1".into(),
            name: "calculate_benefits".into(),
            arguments: serde_json::json!({}),
        }]);
        let client = ScriptedClient::new(vec![run(RunStatus::Completed)], Some("unreached"));

        let mut tools = ToolRegistry::new();
        tools.register("calculate_benefits", |_args| Err("bad arguments".into()));

        let outcome = poll_run(&client, "thread-1", action, &tools, &fast_config());
        assert_eq!(
            outcome,
            RunOutcome::Failed("tool 'calculate_benefits' failed: bad arguments".into())
        );
        assert!(client.submitted.lock().expect("lock").is_empty());
    }

    #[test]
    fn status_tags_deserialize_snake_case() {
        let status: RunStatus = serde_json::from_str("\"requires_action\"").expect("parse");
        assert_eq!(status, RunStatus::RequiresAction);
        let status: RunStatus = serde_json::from_str("\"cancelling\"").expect("parse");
        assert_eq!(status, RunStatus::Unknown);
    }
}
