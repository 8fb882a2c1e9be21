use crate::cet;
use crate::correlate::{self, Correlation};
use crate::event_log::{Event, EventLog, EventType};
use crate::handoff::{self, HandoffPayload, ResolutionHandler};
use crate::metrics::{MetricsClient, VmMetrics};
use crate::notify::{self, DeliveryResult, SlackMessage, SlackSink};
use crate::ticket::{self, Ticket};
use report_registry::{
    log_line_has_timestamp, parse_report_v1, validate_report_v1, MonitoringReportV1,
    STATUS_ABNORMALITY, STATUS_ERROR, STATUS_HEALTHY,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Static application → virtual machine lookup. Unmapped names pass through
/// as the VM name with a warning.
#[derive(Clone, Debug, Default)]
pub struct VmMap {
    entries: HashMap<String, String>,
}

impl VmMap {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn with_defaults() -> Self {
        let mut entries = HashMap::new();
        entries.insert("webshop".to_string(), "VirtualMachine".to_string());
        entries.insert("webshop-frontend".to_string(), "VirtualMachine".to_string());
        Self { entries }
    }

    pub fn resolve(&self, application_name: &str) -> String {
        match self.entries.get(application_name) {
            Some(vm) => vm.clone(),
            None => {
                warn!(application_name, "no VM mapping, passing name through");
                application_name.to_string()
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub slack_channel: String,
    pub lookback_minutes: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            slack_channel: "#incidents".to_string(),
            lookback_minutes: 30,
        }
    }
}

/// Result of one `process_monitoring_incident` call, serialized with a
/// `status` discriminant of `no_incident` / `success` / `error`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineResult {
    NoIncident {
        message: String,
        title: String,
        detection_time: String,
    },
    Success {
        ticket_id: String,
        incident_id: String,
        title: String,
        application_name: String,
        vm_name: String,
        severity: String,
        description: String,
        metrics: VmMetrics,
        correlation: Correlation,
        slack_delivery: DeliveryResult,
        full_ticket: Ticket,
    },
    Error {
        error: String,
        detail: String,
    },
}

/// One logical flow per incident: validate, build the ticket, then run the
/// best-effort enrichment stages in order. Enrichment failures are recorded
/// on the ticket and never abort the flow; a ticket is always produced and
/// a delivery always attempted once the input validates.
pub struct IncidentPipeline {
    config: PipelineConfig,
    vm_map: VmMap,
    log: EventLog,
    metrics: Box<dyn MetricsClient>,
    slack: Option<Box<dyn SlackSink>>,
    resolution: Option<Box<dyn ResolutionHandler>>,
}

impl IncidentPipeline {
    pub fn new(
        config: PipelineConfig,
        vm_map: VmMap,
        log: EventLog,
        metrics: Box<dyn MetricsClient>,
        slack: Option<Box<dyn SlackSink>>,
        resolution: Option<Box<dyn ResolutionHandler>>,
    ) -> Self {
        Self {
            config,
            vm_map,
            log,
            metrics,
            slack,
            resolution,
        }
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// Entry point for structured monitoring payloads.
    pub fn process_monitoring_incident(&self, payload: &serde_json::Value) -> PipelineResult {
        let report = match parse_report_v1(payload) {
            Ok(report) => report,
            Err(missing) => {
                let detail = format!("Missing required fields: {}", python_list(&missing));
                let _ = self.log.append(&Event {
                    id: None,
                    incident_id: "unassigned".to_string(),
                    event_type: EventType::ReportRejected,
                    description: detail.clone(),
                    details: Some(payload.clone()),
                    timestamp: cet::now_cet_iso(),
                });
                return PipelineResult::Error {
                    error: "Invalid monitoring input".to_string(),
                    detail,
                };
            }
        };
        if let Err(reason) = validate_report_v1(&report) {
            return PipelineResult::Error {
                error: "Invalid monitoring input".to_string(),
                detail: reason,
            };
        }

        let status = report.status.clone();
        match status.as_str() {
            STATUS_HEALTHY => {
                info!(title = %report.title, "monitoring reported no abnormality");
                PipelineResult::NoIncident {
                    message: "monitoring reported no abnormality".to_string(),
                    title: report.title,
                    detection_time: report.detection_time,
                }
            }
            STATUS_ERROR => {
                self.record(
                    "unassigned",
                    EventType::PipelineError,
                    &report.short_description,
                    None,
                );
                PipelineResult::Error {
                    error: "monitoring reported an error".to_string(),
                    detail: report.short_description,
                }
            }
            STATUS_ABNORMALITY => self.open_incident(&report),
            // validate_report_v1 only admits the three statuses above.
            other => PipelineResult::Error {
                error: "Invalid monitoring input".to_string(),
                detail: format!("unrecognized monitoring status '{other}'"),
            },
        }
    }

    /// Entry point for free-form alert text: triage-based ticket, then the
    /// same enrichment stages.
    pub fn raise_incident(&self, alert_text: &str) -> Ticket {
        let mut ticket = ticket::build_ticket(alert_text, None);
        self.record(&ticket.id, EventType::TicketCreated, &ticket.title, None);

        let vm_name = self
            .vm_map
            .resolve(ticket.triage.service.as_deref().unwrap_or("unknown-service"));
        let detection_time = ticket.triage.timestamp.clone();
        self.enrich_and_deliver(&mut ticket, &vm_name, Some(&detection_time));
        ticket
    }

    fn open_incident(&self, report: &MonitoringReportV1) -> PipelineResult {
        for line in &report.related_log_lines {
            if !log_line_has_timestamp(line) {
                warn!(line, "related log line does not start with a timestamp token");
            }
        }

        let mut ticket = ticket::ticket_from_report(report, None);
        self.record(
            &ticket.id,
            EventType::ReportReceived,
            &report.title,
            serde_json::to_value(report).ok(),
        );
        self.record(&ticket.id, EventType::TicketCreated, &ticket.title, None);

        let vm_name = self.vm_map.resolve(&report.application_name);
        self.enrich_and_deliver(&mut ticket, &vm_name, Some(&report.detection_time));

        let metrics = ticket
            .metrics
            .clone()
            .unwrap_or_else(|| VmMetrics::unavailable(&vm_name, crate::metrics::MetricsStatus::Error));
        let correlation = ticket
            .correlation
            .clone()
            .unwrap_or_else(|| correlate::correlate(&ticket.triage, None));
        let slack_delivery = ticket.slack_delivery.clone().unwrap_or(DeliveryResult {
            status: notify::DeliveryStatus::Failed,
            channel: self.config.slack_channel.clone(),
            message_ts: None,
            channel_id: None,
            error: Some("delivery not attempted".to_string()),
        });

        PipelineResult::Success {
            ticket_id: ticket.id.clone(),
            incident_id: ticket.id.clone(),
            title: ticket.title.clone(),
            application_name: report.application_name.clone(),
            vm_name,
            severity: ticket.triage.severity.clone(),
            description: ticket.summary.clone(),
            metrics,
            correlation,
            slack_delivery,
            full_ticket: ticket,
        }
    }

    /// The best-effort stages, in order: metrics, correlation, notification,
    /// hand-off. Each writes its outcome onto the ticket exactly once.
    fn enrich_and_deliver(&self, ticket: &mut Ticket, vm_name: &str, detection_time: Option<&str>) {
        let metrics = self
            .metrics
            .fetch(vm_name, detection_time, self.config.lookback_minutes);
        self.record(
            &ticket.id,
            EventType::MetricsFetched,
            metrics.status.as_str(),
            serde_json::to_value(&metrics).ok(),
        );
        ticket.metrics = Some(metrics);

        let correlation = correlate::correlate(&ticket.triage, ticket.metrics.as_ref());
        self.record(
            &ticket.id,
            EventType::Correlated,
            if correlation.correlated {
                "metrics corroborate the alert"
            } else {
                "metrics do not corroborate the alert"
            },
            serde_json::to_value(&correlation).ok(),
        );
        ticket.correlation = Some(correlation);

        let mut details = ticket.summary.clone();
        if let Some(correlation) = &ticket.correlation {
            for note in &correlation.notes {
                details.push('\n');
                details.push_str(note);
            }
        }
        let message = SlackMessage {
            ticket_title: ticket.title.clone(),
            ticket_id: ticket.id.clone(),
            details,
            severity: ticket.triage.severity.clone(),
            affected_system: vm_name.to_string(),
            resolution: String::new(),
            thread_ts: None,
            reply_broadcast: notify::should_broadcast(&ticket.triage.severity, false),
        };
        let delivery = notify::notify(
            self.slack.as_deref(),
            &self.config.slack_channel,
            &message,
        );
        self.record(
            &ticket.id,
            EventType::NotificationSent,
            match delivery.status {
                notify::DeliveryStatus::Success => "delivered",
                notify::DeliveryStatus::Failed => "delivery failed",
            },
            serde_json::to_value(&delivery).ok(),
        );
        ticket.slack_delivery = Some(delivery);

        let payload = HandoffPayload {
            ticket_id: ticket.id.clone(),
            title: ticket.title.clone(),
            summary: ticket.summary.clone(),
            created_at: ticket.created_at.clone(),
            triage: ticket.triage.clone(),
            correlation: ticket
                .correlation
                .clone()
                .unwrap_or_else(|| correlate::correlate(&ticket.triage, None)),
            context: serde_json::json!({"vm_name": vm_name}),
        };
        let handoff_result = handoff::dispatch(self.resolution.as_deref(), &payload);
        self.record(
            &ticket.id,
            EventType::HandoffDispatched,
            if handoff_result.sent {
                "handed off to resolution agent"
            } else {
                "hand-off skipped or failed"
            },
            serde_json::to_value(&handoff_result).ok(),
        );
        ticket.resolution_handoff = Some(handoff_result);
    }

    fn record(
        &self,
        incident_id: &str,
        event_type: EventType,
        description: &str,
        details: Option<serde_json::Value>,
    ) {
        // Audit trail is best-effort too.
        let _ = self.log.append(&Event {
            id: None,
            incident_id: incident_id.to_string(),
            event_type,
            description: description.to_string(),
            details,
            timestamp: cet::now_cet_iso(),
        });
    }
}

fn python_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| format!("'{i}'")).collect();
    format!("[{}]", quoted.join(", "))
}
