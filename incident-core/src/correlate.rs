use crate::metrics::{MetricsStatus, VmMetrics};
use crate::triage::Triage;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CPU_THRESHOLD_PCT: f64 = 80.0;
pub const MEMORY_THRESHOLD_BYTES: f64 = 1e9;
pub const NETWORK_THRESHOLD_BYTES: f64 = 1e9;
pub const DISK_THRESHOLD_BYTES: f64 = 1e8;

// Placeholder confidence values standing in for a real scoring model. The
// score must not be treated as a meaningful ranking.
pub const SCORE_CORRELATED: f64 = 0.65;
pub const SCORE_UNCORRELATED: f64 = 0.3;

/// Heuristic judgment of whether fetched metrics corroborate the alert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub correlated: bool,
    pub notes: Vec<String>,
    pub ml_score: Option<f64>,
    pub metrics_summary: Option<VmMetrics>,
}

/// Apply independent threshold rules over the fetched metrics. Any triggered
/// rule sets `correlated`; disk volume rules are informational only. Never
/// errors: unusable metrics produce an uncorrelated result with a reason
/// note.
pub fn correlate(triage: &Triage, metrics: Option<&VmMetrics>) -> Correlation {
    let Some(metrics) = metrics else {
        return uncorrelated("no metrics available", None);
    };
    if metrics.status != MetricsStatus::Success {
        let reason = match &metrics.error {
            Some(error) => format!(
                "metrics unavailable ({}): {error}",
                metrics.status.as_str()
            ),
            None => format!("metrics unavailable ({})", metrics.status.as_str()),
        };
        return uncorrelated(&reason, Some(metrics.clone()));
    }

    debug!(
        service = triage.service.as_deref().unwrap_or("unknown-service"),
        vm = %metrics.vm_name,
        "correlating metrics against alert triage"
    );

    let mut correlated = false;
    let mut notes = Vec::new();

    if let Some(cpu) = metrics.cpu_max {
        if cpu > CPU_THRESHOLD_PCT {
            correlated = true;
            notes.push(format!(
                "High CPU usage detected: {cpu:.1}% (threshold {CPU_THRESHOLD_PCT:.0}%)"
            ));
        }
    }
    if let Some(memory) = metrics.memory_max {
        if memory > MEMORY_THRESHOLD_BYTES {
            correlated = true;
            notes.push(format!(
                "High memory usage detected: {:.2} GB",
                memory / 1e9
            ));
        }
    }
    if let Some(net_in) = metrics.network_in_max {
        if net_in > NETWORK_THRESHOLD_BYTES {
            correlated = true;
            notes.push(format!(
                "High inbound network traffic: {:.2} GB",
                net_in / 1e9
            ));
        }
    }
    if let Some(net_out) = metrics.network_out_max {
        if net_out > NETWORK_THRESHOLD_BYTES {
            correlated = true;
            notes.push(format!(
                "High outbound network traffic: {:.2} GB",
                net_out / 1e9
            ));
        }
    }
    // Disk volume is noted for the responder but does not by itself
    // corroborate an availability alert.
    if let Some(read) = metrics.disk_read_max {
        if read > DISK_THRESHOLD_BYTES {
            notes.push(format!("Elevated disk read volume: {:.0} MB", read / 1e6));
        }
    }
    if let Some(write) = metrics.disk_write_max {
        if write > DISK_THRESHOLD_BYTES {
            notes.push(format!("Elevated disk write volume: {:.0} MB", write / 1e6));
        }
    }

    Correlation {
        correlated,
        notes,
        ml_score: Some(if correlated {
            SCORE_CORRELATED
        } else {
            SCORE_UNCORRELATED
        }),
        metrics_summary: Some(metrics.clone()),
    }
}

fn uncorrelated(reason: &str, metrics: Option<VmMetrics>) -> Correlation {
    Correlation {
        correlated: false,
        notes: vec![reason.to_string()],
        ml_score: Some(SCORE_UNCORRELATED),
        metrics_summary: metrics,
    }
}
