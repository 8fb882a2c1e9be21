mod webhook;

use incident_core::azure::{AzureMonitorClient, AzureMonitorConfig};
use incident_core::event_log::EventLog;
use incident_core::handoff::WebhookResolutionHandler;
use incident_core::metrics::{MetricsClient, NullMetricsClient};
use incident_core::notify::{SlackApiSink, SlackConfig, SlackSink};
use incident_core::pipeline::{IncidentPipeline, PipelineConfig, PipelineResult, VmMap};
use incident_core::{llm, storage};
use tracing::{error, info, warn};
use webhook::{AppState, Command};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let log = EventLog::open("incidents.db").expect("open event log");
    let (tx, rx) = std::sync::mpsc::channel();

    let pipeline = build_pipeline_from_env(log.clone());
    let llm_config = build_llm_config_from_env();
    let blob_config = storage::LogBlobConfig::from_env();

    std::thread::spawn(move || {
        run_worker(rx, pipeline, llm_config, blob_config);
    });

    let app = webhook::router(AppState { tx, log });
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("bind :8080");

    info!("incident-server listening on :8080");
    axum::serve(listener, app).await.expect("serve");
}

/// Drains commands until every sender is dropped. Runs on a plain thread so
/// the blocking HTTP clients in the pipeline never touch the async runtime.
fn run_worker(
    rx: std::sync::mpsc::Receiver<Command>,
    pipeline: IncidentPipeline,
    llm_config: Option<llm::LlmConfig>,
    blob_config: Option<storage::LogBlobConfig>,
) {
    while let Ok(command) = rx.recv() {
        match command {
            Command::Report(payload) => {
                report_outcome(pipeline.process_monitoring_incident(&payload));
            }
            Command::RawAlert(text) => {
                let ticket = pipeline.raise_incident(&text);
                info!(ticket_id = %ticket.id, title = %ticket.title, "incident raised from alert text");
            }
            Command::MonitorScan => run_monitor_scan(&pipeline, &llm_config, &blob_config),
        }
    }
}

/// One scheduled monitoring pass: download the application log, ask the
/// model for an abnormality report, and feed the report through the same
/// path the webhook uses.
fn run_monitor_scan(
    pipeline: &IncidentPipeline,
    llm_config: &Option<llm::LlmConfig>,
    blob_config: &Option<storage::LogBlobConfig>,
) {
    let Some(blob_config) = blob_config else {
        warn!("monitor scan skipped, log storage is not configured");
        return;
    };
    let Some(llm_config) = llm_config else {
        warn!("monitor scan skipped, no LLM configured");
        return;
    };

    let log_content = match storage::fetch_log_blob(blob_config) {
        Ok(content) => content,
        Err(e) => {
            error!(error = %e, "failed to download application log");
            return;
        }
    };

    let analysis = llm::analyze_log_content(llm_config, &log_content);
    let report = llm::collect_report(&analysis);
    report_outcome(pipeline.process_monitoring_incident(&report));
}

fn report_outcome(result: PipelineResult) {
    match result {
        PipelineResult::NoIncident { title, .. } => {
            info!(%title, "monitoring report processed, no incident");
        }
        PipelineResult::Success {
            ticket_id,
            vm_name,
            correlation,
            ..
        } => {
            info!(
                %ticket_id,
                %vm_name,
                correlated = correlation.correlated,
                "incident processed"
            );
        }
        PipelineResult::Error { error, detail } => {
            error!(%error, %detail, "monitoring report rejected");
        }
    }
}

fn build_pipeline_from_env(log: EventLog) -> IncidentPipeline {
    let slack = SlackConfig::from_env();
    let config = PipelineConfig {
        slack_channel: slack.channel.clone(),
        lookback_minutes: std::env::var("METRICS_LOOKBACK_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(30),
    };

    let azure = AzureMonitorConfig::from_env();
    let metrics: Box<dyn MetricsClient> = if azure.subscription_id.is_some() {
        Box::new(AzureMonitorClient::new(azure))
    } else {
        warn!("AZURE_SUBSCRIPTION_ID not set, VM metrics disabled");
        Box::new(NullMetricsClient)
    };

    let slack_sink: Option<Box<dyn SlackSink>> = match &slack.token {
        Some(token) => Some(Box::new(SlackApiSink::new(Some(token.clone())))),
        None => {
            warn!("SLACK_BOT_TOKEN not set, chat notifications disabled");
            None
        }
    };

    let resolution = std::env::var("RESOLUTION_WEBHOOK_URL")
        .ok()
        .filter(|url| !url.is_empty())
        .map(|url| {
            Box::new(WebhookResolutionHandler::new(url)) as Box<dyn incident_core::handoff::ResolutionHandler>
        });

    IncidentPipeline::new(config, VmMap::with_defaults(), log, metrics, slack_sink, resolution)
}

fn build_llm_config_from_env() -> Option<llm::LlmConfig> {
    let api_key_env = std::env::var("LLM_API_KEY_ENV").unwrap_or_else(|_| "OPENAI_API_KEY".into());
    if std::env::var(&api_key_env).is_err() {
        return None;
    }

    Some(llm::LlmConfig {
        provider: std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".into()),
        model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
        api_key_env,
        temperature: std::env::var("LLM_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0),
    })
}
