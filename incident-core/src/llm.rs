use crate::cet;
use futures::executor::block_on;
use report_registry::{STATUS_ABNORMALITY, STATUS_HEALTHY};
use rig::client::{completion::CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::openai;
use serde::{Deserialize, Serialize};
use std::future::IntoFuture;
use tracing::warn;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.0,
        }
    }
}

/// Structured result of the log-analysis prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbnormalityReport {
    pub abnormalities_found: bool,
    pub title: String,
    pub short_description: String,
    pub detection_time: String,
    pub application_name: String,
    pub related_log_lines: Vec<String>,
}

/// Ask the model whether the log content shows abnormalities (response-time
/// regressions and trends). Transport errors and unparseable responses both
/// degrade to a structured report rather than an error, so monitoring can
/// always emit a payload.
pub fn analyze_log_content(config: &LlmConfig, log_content: &str) -> AbnormalityReport {
    let prompt = format!(
        "Analyze the following log file for abnormalities, specifically \
         increased response times and trends.\n\
         Log Content:\n---\n{log_content}\n---\n\
         Return JSON only, no markdown, no extra text.\n\
         Schema: {{\"abnormalities_found\": bool, \"title\": \"string\", \
         \"short_description\": \"string\", \"detection_time\": \"ISO8601\", \
         \"application_name\": \"string\", \"related_log_lines\": [\"string\"]}}"
    );

    match run_prompt(config, "You are a log monitoring analyst.", &prompt) {
        Ok(raw) => parse_report(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "could not parse analysis response");
            fallback_report("Analysis Error", "Could not parse model response")
        }),
        Err(e) => {
            warn!(error = %e, "log analysis prompt failed");
            fallback_report("Error", &format!("Error during analysis: {e}"))
        }
    }
}

/// Shape the monitoring payload consumed by the incident pipeline.
pub fn collect_report(analysis: &AbnormalityReport) -> serde_json::Value {
    if !analysis.abnormalities_found {
        return serde_json::json!({
            "status": STATUS_HEALTHY,
            "message": "No abnormalities detected in logs",
            "title": "System Status: Healthy",
            "short_description": "All response times and metrics are within normal parameters",
            "detection_time": cet::now_cet_iso(),
            "application_name": serde_json::Value::Null,
            "related_log_lines": []
        });
    }

    serde_json::json!({
        "status": STATUS_ABNORMALITY,
        "title": analysis.title,
        "short_description": analysis.short_description,
        "detection_time": analysis.detection_time,
        "application_name": analysis.application_name,
        "related_log_lines": analysis.related_log_lines,
        "timestamp_detected": cet::now_cet_iso()
    })
}

fn run_prompt(config: &LlmConfig, preamble: &str, prompt: &str) -> Result<String, String> {
    if config.provider.to_lowercase() != "openai" {
        return Err(format!("unsupported llm provider '{}'", config.provider));
    }

    let client = if config.api_key_env == "OPENAI_API_KEY" {
        openai::Client::from_env()
    } else {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| format!("missing env var {}", config.api_key_env))?;
        openai::Client::new(&api_key).map_err(|e| format!("openai client error: {e}"))?
    };

    let agent = client
        .agent(&config.model)
        .preamble(preamble)
        .temperature(config.temperature)
        .build();

    let fut = agent.prompt(prompt).into_future();
    let out: Result<String, _> = block_on(fut);
    out.map_err(|e| format!("llm prompt failed: {e}"))
}

fn parse_report(raw: &str) -> Result<AbnormalityReport, String> {
    let v: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("invalid analysis json: {e}"))?;
    Ok(AbnormalityReport {
        abnormalities_found: v
            .get("abnormalities_found")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
        title: str_or(&v, "title", "Unknown Issue"),
        short_description: str_or(&v, "short_description", ""),
        detection_time: v
            .get("detection_time")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
            .unwrap_or_else(cet::now_cet_iso),
        application_name: str_or(&v, "application_name", "Unknown"),
        related_log_lines: v
            .get("related_log_lines")
            .and_then(serde_json::Value::as_array)
            .map(|xs| {
                xs.iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default(),
    })
}

fn fallback_report(title: &str, description: &str) -> AbnormalityReport {
    AbnormalityReport {
        abnormalities_found: false,
        title: title.to_string(),
        short_description: description.to_string(),
        detection_time: cet::now_cet_iso(),
        application_name: "Unknown".to_string(),
        related_log_lines: Vec::new(),
    }
}

fn str_or(v: &serde_json::Value, field: &str, default: &str) -> String {
    v.get(field)
        .and_then(serde_json::Value::as_str)
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_analysis_json() {
        let raw = r#"{
          "abnormalities_found": true,
          "title": "Performance Degradation Detected",
          "short_description": "Response times trending upward",
          "detection_time": "2025-10-23T12:00:00Z",
          "application_name": "webshop",
          "related_log_lines": ["2025-10-23 12:00:01 WARN slow response"]
        }"#;
        let parsed = parse_report(raw).expect("parse");
        assert!(parsed.abnormalities_found);
        assert_eq!(parsed.application_name, "webshop");
        assert_eq!(parsed.related_log_lines.len(), 1);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let parsed = parse_report(r#"{"abnormalities_found": true}"#).expect("parse");
        assert_eq!(parsed.title, "Unknown Issue");
        assert_eq!(parsed.application_name, "Unknown");
        assert!(!parsed.detection_time.is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_report("not json at all").is_err());
    }

    #[test]
    fn healthy_analysis_collects_healthy_payload() {
        let analysis = fallback_report("System Status: Healthy", "all good");
        let payload = collect_report(&analysis);
        assert_eq!(payload["status"], STATUS_HEALTHY);
        assert!(payload["application_name"].is_null());
    }

    #[test]
    fn abnormality_collects_full_payload() {
        let analysis = AbnormalityReport {
            abnormalities_found: true,
            title: "Performance Degradation Detected".into(),
            short_description: "Response times trending upward".into(),
            detection_time: "2025-10-23T12:00:00Z".into(),
            application_name: "webshop".into(),
            related_log_lines: vec!["2025-10-23 12:00:01 WARN slow".into()],
        };
        let payload = collect_report(&analysis);
        assert_eq!(payload["status"], STATUS_ABNORMALITY);
        assert_eq!(payload["application_name"], "webshop");
        assert!(payload.get("timestamp_detected").is_some());
        // The collected payload passes registry validation end to end.
        let report = report_registry::parse_report_v1(&payload).expect("valid");
        assert!(report_registry::validate_report_v1(&report).is_ok());
    }
}
