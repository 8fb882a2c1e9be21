use crate::cet;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Structured fields extracted from raw alert text. Produced once per
/// incident and never mutated afterward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triage {
    pub service: Option<String>,
    pub region: Option<String>,
    pub severity: String,
    pub timestamp: String,
}

pub const DEFAULT_SEVERITY: &str = "Medium";

/// Lightweight heuristic triage of a free-form availability alert. Always
/// returns a best-effort structure; fields that cannot be extracted are None
/// (timestamp falls back to the current time in CET/CEST).
pub fn parse_alert(alert_text: &str) -> Triage {
    let service = find_first(r"(?i)service[-_\s]?[A-Za-z0-9\-]+", alert_text);
    let region = find_first(r"(?i)(eu|us|ap|asia|emea)[-_]?\w*", alert_text);

    let timestamp = find_first(
        r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(Z|[+-]\d{2}:\d{2})",
        alert_text,
    )
    .unwrap_or_else(cet::now_cet_iso);

    let severity = capture_first(r"(?i)\b(critical|high|medium|low)\b", alert_text)
        .map(|s| title_case(&s))
        .unwrap_or_else(|| DEFAULT_SEVERITY.to_string());

    Triage {
        service,
        region,
        severity,
        timestamp,
    }
}

fn find_first(pattern: &str, text: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()
        .and_then(|re| re.find(text).map(|m| m.as_str().to_string()))
}

fn capture_first(pattern: &str, text: &str) -> Option<String> {
    Regex::new(pattern).ok().and_then(|re| {
        re.captures(text)
            .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
    })
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
