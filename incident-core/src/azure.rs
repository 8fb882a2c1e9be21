use crate::metrics::{MetricPoint, MetricsClient, MetricsStatus, VmMetrics, SIGNALS};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_ENDPOINT: &str = "https://management.azure.com";
const METRICS_API_VERSION: &str = "2018-01-01";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AzureMonitorConfig {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub access_token: Option<String>,
    pub endpoint: String,
}

impl AzureMonitorConfig {
    pub fn from_env() -> Self {
        Self {
            subscription_id: std::env::var("AZURE_SUBSCRIPTION_ID").ok(),
            resource_group: std::env::var("AZURE_RESOURCE_GROUP_NAME").ok(),
            access_token: std::env::var("AZURE_ACCESS_TOKEN").ok(),
            endpoint: std::env::var("AZURE_MANAGEMENT_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
        }
    }
}

/// Azure Monitor metrics client over the management REST API. Queries the
/// maximum of each signal in 5-minute buckets over the lookback window.
pub struct AzureMonitorClient {
    config: AzureMonitorConfig,
    http: reqwest::blocking::Client,
}

impl AzureMonitorClient {
    pub fn new(config: AzureMonitorConfig) -> Self {
        Self {
            config,
            http: reqwest::blocking::Client::new(),
        }
    }

    fn resource_id(&self, vm_name: &str) -> Result<String, MetricsStatus> {
        let subscription = self
            .config
            .subscription_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(MetricsStatus::SubscriptionIdMissing)?;
        let group = self
            .config
            .resource_group
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(MetricsStatus::ResourceIdConstructionFailed)?;
        Ok(format!(
            "/subscriptions/{subscription}/resourceGroups/{group}/providers/Microsoft.Compute/virtualMachines/{vm_name}"
        ))
    }

    fn query_signal(
        &self,
        token: &str,
        resource_id: &str,
        timespan: &str,
        signal: &str,
    ) -> Result<Vec<MetricPoint>, VmFetchError> {
        let url = format!(
            "{}{}/providers/Microsoft.Insights/metrics",
            self.config.endpoint, resource_id
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("api-version", METRICS_API_VERSION),
                ("timespan", timespan),
                ("interval", "PT5M"),
                ("aggregation", "Maximum,Total,Average"),
                ("metricnames", signal),
            ])
            .send()
            .map_err(|e| VmFetchError::Transport(e.to_string()))?;

        let http_status = response.status();
        if !http_status.is_success() {
            return Err(VmFetchError::Http(http_status.as_u16()));
        }

        let body: MetricsResponse = response
            .json()
            .map_err(|e| VmFetchError::Transport(format!("invalid metrics payload: {e}")))?;

        Ok(body
            .value
            .into_iter()
            .flat_map(|m| m.timeseries)
            .flat_map(|ts| ts.data)
            .collect())
    }
}

impl MetricsClient for AzureMonitorClient {
    fn fetch(
        &self,
        vm_name: &str,
        detection_time: Option<&str>,
        lookback_minutes: i64,
    ) -> VmMetrics {
        // The window is anchored at now, not at the detection time: the
        // telemetry store retains short-term data only, and a window around
        // the alert's original timestamp would often be empty.
        if let Some(detected) = detection_time {
            debug!(detected, "detection time recorded but not used for the query window");
        }

        let token = match self.config.access_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => return VmMetrics::unavailable(vm_name, MetricsStatus::CredentialFailed),
        };
        let resource_id = match self.resource_id(vm_name) {
            Ok(id) => id,
            Err(status) => return VmMetrics::unavailable(vm_name, status),
        };

        let end = Utc::now();
        let start = end - Duration::minutes(lookback_minutes);
        let timespan = format!(
            "{}/{}",
            start.format("%Y-%m-%dT%H:%M:%SZ"),
            end.format("%Y-%m-%dT%H:%M:%SZ")
        );

        let mut metrics = VmMetrics::unavailable(vm_name, MetricsStatus::Success);
        let mut any_data = false;
        for signal in SIGNALS {
            match self.query_signal(token, &resource_id, &timespan, signal) {
                Ok(points) => {
                    if let Some(value) = crate::metrics::highest_value(&points) {
                        metrics.assign(signal, value);
                        any_data = true;
                    }
                }
                Err(VmFetchError::Http(code)) => {
                    warn!(vm_name, signal, code, "metrics query rejected");
                    return VmMetrics::unavailable(vm_name, status_for_http(code));
                }
                Err(VmFetchError::Transport(message)) => {
                    warn!(vm_name, signal, %message, "metrics query failed");
                    return VmMetrics::failed(vm_name, MetricsStatus::Error, message);
                }
            }
        }

        if !any_data {
            return VmMetrics::unavailable(vm_name, MetricsStatus::NoDataReturned);
        }
        metrics
    }
}

enum VmFetchError {
    Http(u16),
    Transport(String),
}

fn status_for_http(code: u16) -> MetricsStatus {
    match code {
        400 => MetricsStatus::BadRequest,
        401 | 403 => MetricsStatus::AuthFailed,
        404 => MetricsStatus::VmNotFound,
        _ => MetricsStatus::ApiError,
    }
}

#[derive(Debug, Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    value: Vec<MetricEnvelope>,
}

#[derive(Debug, Deserialize)]
struct MetricEnvelope {
    #[serde(default)]
    timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Deserialize)]
struct TimeSeries {
    #[serde(default)]
    data: Vec<MetricPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AzureMonitorConfig {
        AzureMonitorConfig {
            subscription_id: Some("sub-1".into()),
            resource_group: Some("rg-1".into()),
            access_token: Some("token".into()),
            endpoint: DEFAULT_ENDPOINT.into(),
        }
    }

    #[test]
    fn resource_id_shape() {
        let client = AzureMonitorClient::new(config());
        let id = client.resource_id("VirtualMachine").expect("resource id");
        assert_eq!(
            id,
            "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Compute/virtualMachines/VirtualMachine"
        );
    }

    #[test]
    fn missing_subscription_is_tagged() {
        let mut cfg = config();
        cfg.subscription_id = None;
        let client = AzureMonitorClient::new(cfg);
        let metrics = client.fetch("vm-a", None, 30);
        assert_eq!(metrics.status, MetricsStatus::SubscriptionIdMissing);
        assert!(metrics.cpu_max.is_none());
    }

    #[test]
    fn missing_resource_group_is_tagged() {
        let mut cfg = config();
        cfg.resource_group = None;
        let client = AzureMonitorClient::new(cfg);
        let metrics = client.fetch("vm-a", None, 30);
        assert_eq!(metrics.status, MetricsStatus::ResourceIdConstructionFailed);
    }

    #[test]
    fn missing_token_is_tagged() {
        let mut cfg = config();
        cfg.access_token = None;
        let client = AzureMonitorClient::new(cfg);
        let metrics = client.fetch("vm-a", Some("2025-10-23T12:00:00Z"), 30);
        assert_eq!(metrics.status, MetricsStatus::CredentialFailed);
    }

    #[test]
    fn http_codes_map_to_statuses() {
        assert_eq!(status_for_http(400), MetricsStatus::BadRequest);
        assert_eq!(status_for_http(401), MetricsStatus::AuthFailed);
        assert_eq!(status_for_http(403), MetricsStatus::AuthFailed);
        assert_eq!(status_for_http(404), MetricsStatus::VmNotFound);
        assert_eq!(status_for_http(500), MetricsStatus::ApiError);
    }

    #[test]
    fn parses_metrics_envelope() {
        let raw = r#"{
            "value": [{
                "timeseries": [{
                    "data": [
                        {"timeStamp": "2025-10-23T12:00:00Z", "maximum": 42.5},
                        {"timeStamp": "2025-10-23T12:05:00Z", "total": 91.0}
                    ]
                }]
            }]
        }"#;
        let body: MetricsResponse = serde_json::from_str(raw).expect("parse");
        let points: Vec<MetricPoint> = body
            .value
            .into_iter()
            .flat_map(|m| m.timeseries)
            .flat_map(|ts| ts.data)
            .collect();
        assert_eq!(crate::metrics::highest_value(&points), Some(91.0));
    }
}
