use serde::{Deserialize, Serialize};

/// Outcome tag for a metrics fetch. Failures are carried as data, never as
/// errors, so the pipeline can always proceed to correlation with whatever
/// it has.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsStatus {
    Success,
    AzureMonitorUnavailable,
    ResourceIdConstructionFailed,
    SubscriptionIdMissing,
    CredentialFailed,
    BadRequest,
    AuthFailed,
    VmNotFound,
    ApiError,
    NoDataReturned,
    Error,
}

impl MetricsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricsStatus::Success => "success",
            MetricsStatus::AzureMonitorUnavailable => "azure_monitor_unavailable",
            MetricsStatus::ResourceIdConstructionFailed => "resource_id_construction_failed",
            MetricsStatus::SubscriptionIdMissing => "subscription_id_missing",
            MetricsStatus::CredentialFailed => "credential_failed",
            MetricsStatus::BadRequest => "bad_request",
            MetricsStatus::AuthFailed => "auth_failed",
            MetricsStatus::VmNotFound => "vm_not_found",
            MetricsStatus::ApiError => "api_error",
            MetricsStatus::NoDataReturned => "no_data_returned",
            MetricsStatus::Error => "error",
        }
    }
}

/// Per-signal maxima for one virtual machine over the query window. All
/// signal fields are None unless `status` is `Success`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VmMetrics {
    pub vm_name: String,
    pub status: MetricsStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cpu_max: Option<f64>,
    pub memory_max: Option<f64>,
    pub network_in_max: Option<f64>,
    pub network_out_max: Option<f64>,
    pub disk_read_max: Option<f64>,
    pub disk_write_max: Option<f64>,
}

impl VmMetrics {
    pub fn unavailable(vm_name: &str, status: MetricsStatus) -> Self {
        Self {
            vm_name: vm_name.to_string(),
            status,
            error: None,
            cpu_max: None,
            memory_max: None,
            network_in_max: None,
            network_out_max: None,
            disk_read_max: None,
            disk_write_max: None,
        }
    }

    pub fn failed(vm_name: &str, status: MetricsStatus, error: impl Into<String>) -> Self {
        let mut metrics = Self::unavailable(vm_name, status);
        metrics.error = Some(error.into());
        metrics
    }

    pub fn assign(&mut self, signal: &str, value: f64) {
        match signal {
            PERCENTAGE_CPU => self.cpu_max = Some(value),
            AVAILABLE_MEMORY_BYTES => self.memory_max = Some(value),
            NETWORK_IN_TOTAL => self.network_in_max = Some(value),
            NETWORK_OUT_TOTAL => self.network_out_max = Some(value),
            DISK_READ_BYTES => self.disk_read_max = Some(value),
            DISK_WRITE_BYTES => self.disk_write_max = Some(value),
            _ => {}
        }
    }
}

pub const PERCENTAGE_CPU: &str = "Percentage CPU";
pub const AVAILABLE_MEMORY_BYTES: &str = "Available Memory Bytes";
pub const NETWORK_IN_TOTAL: &str = "Network In Total";
pub const NETWORK_OUT_TOTAL: &str = "Network Out Total";
pub const DISK_READ_BYTES: &str = "Disk Read Bytes";
pub const DISK_WRITE_BYTES: &str = "Disk Write Bytes";

/// The six signals queried per VM, in request order.
pub const SIGNALS: [&str; 6] = [
    PERCENTAGE_CPU,
    AVAILABLE_MEMORY_BYTES,
    NETWORK_IN_TOTAL,
    NETWORK_OUT_TOTAL,
    DISK_READ_BYTES,
    DISK_WRITE_BYTES,
];

/// One aggregated data point in a metric time series. Different metric types
/// populate different aggregate fields, so all three are optional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub maximum: Option<f64>,
    pub total: Option<f64>,
    pub average: Option<f64>,
}

impl MetricPoint {
    /// Preferred aggregate for this point: maximum, falling back to total,
    /// falling back to average.
    pub fn value(&self) -> Option<f64> {
        self.maximum.or(self.total).or(self.average)
    }
}

/// Single highest value across all buckets of a series, honoring the
/// per-point aggregate priority.
pub fn highest_value(points: &[MetricPoint]) -> Option<f64> {
    points
        .iter()
        .filter_map(MetricPoint::value)
        .fold(None, |best, v| match best {
            Some(b) if b >= v => Some(b),
            _ => Some(v),
        })
}

/// Source of VM metrics. The fetch itself never errors; every failure mode
/// maps to a `MetricsStatus` tag on the result.
pub trait MetricsClient: Send + Sync {
    /// `detection_time` reflects when the underlying anomaly was detected.
    /// It does NOT bound the query window: the telemetry store only retains
    /// short-term data, so metrics are always queried around current
    /// wall-clock time. Deliberate tradeoff, not a bug.
    fn fetch(&self, vm_name: &str, detection_time: Option<&str>, lookback_minutes: i64)
        -> VmMetrics;
}

/// Stand-in used when no monitoring backend is wired up at all.
pub struct NullMetricsClient;

impl MetricsClient for NullMetricsClient {
    fn fetch(&self, vm_name: &str, _detection_time: Option<&str>, _lookback: i64) -> VmMetrics {
        VmMetrics::unavailable(vm_name, MetricsStatus::AzureMonitorUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_prefers_maximum_over_total_over_average() {
        let p = MetricPoint {
            maximum: Some(9.0),
            total: Some(100.0),
            average: Some(1.0),
        };
        assert_eq!(p.value(), Some(9.0));

        let p = MetricPoint {
            maximum: None,
            total: Some(100.0),
            average: Some(1.0),
        };
        assert_eq!(p.value(), Some(100.0));

        let p = MetricPoint {
            maximum: None,
            total: None,
            average: Some(1.0),
        };
        assert_eq!(p.value(), Some(1.0));
    }

    #[test]
    fn highest_value_spans_buckets() {
        let points = [
            MetricPoint {
                maximum: Some(40.0),
                ..Default::default()
            },
            MetricPoint {
                maximum: None,
                total: Some(95.5),
                average: None,
            },
            MetricPoint {
                maximum: Some(72.0),
                ..Default::default()
            },
        ];
        assert_eq!(highest_value(&points), Some(95.5));
        assert_eq!(highest_value(&[]), None);
        assert_eq!(highest_value(&[MetricPoint::default()]), None);
    }

    #[test]
    fn assign_routes_signals_to_fields() {
        let mut m = VmMetrics::unavailable("vm-a", MetricsStatus::Success);
        m.assign(PERCENTAGE_CPU, 81.0);
        m.assign(DISK_WRITE_BYTES, 5e8);
        m.assign("Unknown Signal", 1.0);
        assert_eq!(m.cpu_max, Some(81.0));
        assert_eq!(m.disk_write_max, Some(5e8));
        assert_eq!(m.memory_max, None);
    }

    #[test]
    fn null_client_tags_monitor_unavailable() {
        let m = NullMetricsClient.fetch("vm-a", None, 30);
        assert_eq!(m.status, MetricsStatus::AzureMonitorUnavailable);
        assert!(m.cpu_max.is_none());
    }

    #[test]
    fn status_tags_serialize_snake_case() {
        let s = serde_json::to_string(&MetricsStatus::NoDataReturned).expect("serialize");
        assert_eq!(s, "\"no_data_returned\"");
        assert_eq!(MetricsStatus::VmNotFound.as_str(), "vm_not_found");
    }
}
