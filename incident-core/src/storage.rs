use serde::{Deserialize, Serialize};
use tracing::info;

/// Location of the application log blob the monitor stage analyzes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogBlobConfig {
    pub account_url: String,
    pub container: String,
    pub blob: String,
    /// SAS token granting read access to the blob. Never hardcoded.
    pub sas_token: String,
}

impl LogBlobConfig {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            account_url: std::env::var("STORAGE_ACCOUNT_URL").ok()?,
            container: std::env::var("STORAGE_CONTAINER").ok()?,
            blob: std::env::var("STORAGE_BLOB").ok()?,
            sas_token: std::env::var("STORAGE_SAS_TOKEN").ok()?,
        })
    }

    pub fn blob_url(&self) -> String {
        let base = self.account_url.trim_end_matches('/');
        let sas = self.sas_token.trim_start_matches('?');
        format!("{base}/{}/{}?{sas}", self.container, self.blob)
    }
}

/// Download the full log blob as text.
pub fn fetch_log_blob(config: &LogBlobConfig) -> Result<String, String> {
    let response = reqwest::blocking::get(config.blob_url()).map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("blob download returned {status}"));
    }
    let content = response.text().map_err(|e| e.to_string())?;
    info!(blob = %config.blob, bytes = content.len(), "log blob retrieved");
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_url_joins_container_blob_and_sas() {
        let config = LogBlobConfig {
            account_url: "https://acct.blob.core.windows.net/".into(),
            container: "logs".into(),
            blob: "AvailabilityLogs.log".into(),
            sas_token: "?sv=2024&sig=abc".into(),
        };
        assert_eq!(
            config.blob_url(),
            "https://acct.blob.core.windows.net/logs/AvailabilityLogs.log?sv=2024&sig=abc"
        );
    }
}
