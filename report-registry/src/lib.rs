use serde::{Deserialize, Serialize};

/// Canonical monitoring report exchanged between the monitor stage and the
/// incident pipeline. `report.v1` is the only schema in circulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReportV1 {
    pub status: String,
    pub title: String,
    pub short_description: String,
    pub detection_time: String,
    pub application_name: String,
    pub related_log_lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_detected: Option<String>,
}

pub const REQUIRED_FIELDS: [&str; 6] = [
    "status",
    "title",
    "short_description",
    "detection_time",
    "application_name",
    "related_log_lines",
];

pub const STATUS_ABNORMALITY: &str = "abnormality_detected";
pub const STATUS_HEALTHY: &str = "healthy";
pub const STATUS_ERROR: &str = "error";

/// Parse a raw payload into a report, collecting every missing required field
/// rather than stopping at the first one. Callers surface the full list in
/// their validation-error result. Presence is a key-presence check: healthy
/// reports legitimately carry `application_name: null`.
pub fn parse_report_v1(payload: &serde_json::Value) -> Result<MonitoringReportV1, Vec<String>> {
    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| payload.get(**field).is_none())
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(missing);
    }

    let report = MonitoringReportV1 {
        status: str_field(payload, "status"),
        title: str_field(payload, "title"),
        short_description: str_field(payload, "short_description"),
        detection_time: str_field(payload, "detection_time"),
        application_name: str_field(payload, "application_name"),
        related_log_lines: payload
            .get("related_log_lines")
            .and_then(serde_json::Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|v| v.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        timestamp_detected: payload
            .get("timestamp_detected")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string),
    };
    Ok(report)
}

pub fn validate_report_v1(report: &MonitoringReportV1) -> Result<(), String> {
    match report.status.as_str() {
        STATUS_ABNORMALITY | STATUS_HEALTHY | STATUS_ERROR => {}
        other => return Err(format!("unrecognized monitoring status '{other}'")),
    }
    if report.title.trim().is_empty() {
        return Err("title is required".into());
    }
    Ok(())
}

/// Related log lines are expected to begin with a timestamp token
/// (`YYYY-MM-DD...`). Downstream consumers warn on lines that do not.
pub fn log_line_has_timestamp(line: &str) -> bool {
    let head: Vec<char> = line.chars().take(10).collect();
    if head.len() < 10 {
        return false;
    }
    head.iter().enumerate().all(|(i, c)| match i {
        4 | 7 => *c == '-',
        _ => c.is_ascii_digit(),
    })
}

fn str_field(payload: &serde_json::Value, field: &str) -> String {
    payload
        .get(field)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_payload() -> serde_json::Value {
        serde_json::json!({
            "status": "abnormality_detected",
            "title": "Performance Degradation Detected",
            "short_description": "Response times trending upward",
            "detection_time": "2025-10-23T12:00:00Z",
            "application_name": "webshop",
            "related_log_lines": ["2025-10-23 12:00:01 WARN slow response"],
            "timestamp_detected": "2025-10-23T12:01:00Z"
        })
    }

    #[test]
    fn parses_complete_report() {
        let report = parse_report_v1(&full_payload()).expect("parse");
        assert_eq!(report.application_name, "webshop");
        assert_eq!(report.related_log_lines.len(), 1);
        assert!(validate_report_v1(&report).is_ok());
    }

    #[test]
    fn lists_every_missing_field() {
        let mut payload = full_payload();
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("application_name");
            obj.remove("detection_time");
        }
        let missing = parse_report_v1(&payload).expect_err("must fail");
        assert_eq!(missing, vec!["detection_time", "application_name"]);
    }

    #[test]
    fn explicit_null_field_is_present() {
        // Healthy reports carry application_name: null.
        let mut payload = full_payload();
        payload["status"] = serde_json::json!("healthy");
        payload["application_name"] = serde_json::Value::Null;
        let report = parse_report_v1(&payload).expect("parse");
        assert_eq!(report.application_name, "");
    }

    #[test]
    fn rejects_unknown_status() {
        let mut report = parse_report_v1(&full_payload()).expect("parse");
        report.status = "degraded".into();
        assert!(validate_report_v1(&report).is_err());
    }

    #[test]
    fn log_line_timestamp_heuristic() {
        assert!(log_line_has_timestamp("2025-10-23 12:00:01 WARN slow"));
        assert!(!log_line_has_timestamp("WARN slow response"));
        assert!(!log_line_has_timestamp("2025"));
    }
}
