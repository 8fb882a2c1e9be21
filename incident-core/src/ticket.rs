use crate::cet;
use crate::correlate::Correlation;
use crate::handoff::HandoffResult;
use crate::metrics::VmMetrics;
use crate::notify::DeliveryResult;
use crate::triage::{self, Triage};
use rand::Rng;
use report_registry::MonitoringReportV1;
use serde::{Deserialize, Serialize};

pub const RAISED_BY: &str = "AIDA - Advanced Incident Detection Agent";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// The only reachable state; no close transition exists in this pipeline.
    Open,
}

/// The normalized incident record. `metrics`, `correlation`,
/// `slack_delivery`, and `resolution_handoff` are write-once after creation:
/// each is populated by exactly one later stage and never revised.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub created_at: String,
    pub status: TicketStatus,
    pub triage: Triage,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<VmMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Correlation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_delivery: Option<DeliveryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_handoff: Option<HandoffResult>,
    pub raised_by: String,
}

/// `INC` plus seven random decimal digits. Collision odds are about 1 in
/// 10^7 per ticket and the ids are not cryptographically unique; acceptable
/// for a demo pipeline, not for production ticketing.
pub fn generate_ticket_id() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..10_000_000);
    format!("INC{n:07}")
}

/// Pure ticket creation from free-form alert text: triage plus templated
/// title. No network calls.
pub fn build_ticket(alert_text: &str, ticket_id: Option<String>) -> Ticket {
    let parsed = triage::parse_alert(alert_text);
    let title = format!(
        "Availability alert - {}",
        parsed.service.as_deref().unwrap_or("unknown-service")
    );
    new_ticket(ticket_id, title, alert_text.trim().to_string(), parsed, Vec::new())
}

/// Ticket creation from a validated monitoring report. The report's
/// detection time lands in triage; `created_at` still reflects when this
/// ticket object was built.
pub fn ticket_from_report(report: &MonitoringReportV1, ticket_id: Option<String>) -> Ticket {
    let parsed = Triage {
        service: Some(report.application_name.clone()),
        region: None,
        severity: triage::DEFAULT_SEVERITY.to_string(),
        timestamp: report.detection_time.clone(),
    };
    new_ticket(
        ticket_id,
        report.title.clone(),
        report.short_description.clone(),
        parsed,
        report.related_log_lines.clone(),
    )
}

fn new_ticket(
    ticket_id: Option<String>,
    title: String,
    summary: String,
    parsed: Triage,
    logs: Vec<String>,
) -> Ticket {
    Ticket {
        id: ticket_id.unwrap_or_else(generate_ticket_id),
        title,
        summary,
        created_at: cet::now_cet_iso(),
        status: TicketStatus::Open,
        triage: parsed,
        logs,
        metrics: None,
        correlation: None,
        slack_delivery: None,
        resolution_handoff: None,
        raised_by: RAISED_BY.to_string(),
    }
}
