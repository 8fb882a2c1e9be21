use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use incident_core::event_log::EventLog;
use report_registry::parse_report_v1;

/// Work items handed from the HTTP layer to the pipeline worker thread. The
/// handlers only validate and enqueue; all network-touching work happens on
/// the worker side of the channel.
pub enum Command {
    Report(serde_json::Value),
    RawAlert(String),
    MonitorScan,
}

#[derive(Clone)]
pub struct AppState {
    pub tx: std::sync::mpsc::Sender<Command>,
    pub log: EventLog,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/monitoring", post(handle_monitoring))
        .route("/webhook/alert", post(handle_alert))
        .route("/monitor/scan", post(handle_scan))
        .route("/incidents", get(list_incidents))
        .route("/incidents/:id/events", get(incident_events))
        .with_state(state)
}

async fn handle_monitoring(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(missing) = parse_report_v1(&payload) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid monitoring input",
                "missing_fields": missing,
            })),
        );
    }
    send(&state.tx, Command::Report(payload))
}

async fn handle_alert(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let text = payload
        .get("alert_text")
        .or_else(|| payload.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let Some(text) = text else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "missing alert_text"})),
        );
    };
    send(&state.tx, Command::RawAlert(text.to_string()))
}

async fn handle_scan(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    send(&state.tx, Command::MonitorScan)
}

async fn list_incidents(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.log.incidents() {
        Ok(ids) => (StatusCode::OK, Json(serde_json::json!({"incidents": ids}))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e})),
        ),
    }
}

async fn incident_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.log.events_for_incident(&id) {
        Ok(events) if events.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("no events for incident '{id}'")})),
        ),
        Ok(events) => match serde_json::to_value(&events) {
            Ok(rendered) => (StatusCode::OK, Json(serde_json::json!({"events": rendered}))),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            ),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e})),
        ),
    }
}

fn send(
    tx: &std::sync::mpsc::Sender<Command>,
    command: Command,
) -> (StatusCode, Json<serde_json::Value>) {
    match tx.send(command) {
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"accepted": true})),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "pipeline worker unavailable"})),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(name: &str) -> (AppState, std::sync::mpsc::Receiver<Command>) {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let log =
            EventLog::open(&format!("/tmp/incident-server-tests/{name}-{nanos}.db")).expect("log");
        let (tx, rx) = std::sync::mpsc::channel();
        (AppState { tx, log }, rx)
    }

    #[tokio::test]
    async fn monitoring_payload_missing_fields_is_rejected() {
        let (state, rx) = state("reject");
        let payload = serde_json::json!({"status": "abnormality_detected"});
        let (code, body) = handle_monitoring(State(state), Json(payload)).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body.0["error"], "Invalid monitoring input");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn valid_monitoring_payload_is_enqueued() {
        let (state, rx) = state("accept");
        let payload = serde_json::json!({
            "status": "abnormality_detected",
            "title": "Performance Degradation Detected",
            "short_description": "Response times trending upward",
            "detection_time": "2025-10-23T12:00:00Z",
            "application_name": "webshop",
            "related_log_lines": []
        });
        let (code, _) = handle_monitoring(State(state), Json(payload)).await;
        assert_eq!(code, StatusCode::ACCEPTED);
        assert!(matches!(rx.try_recv(), Ok(Command::Report(_))));
    }

    #[tokio::test]
    async fn alert_accepts_text_under_either_key() {
        let (state, rx) = state("alert");
        let (code, _) = handle_alert(
            State(state.clone()),
            Json(serde_json::json!({"text": "service-x is down"})),
        )
        .await;
        assert_eq!(code, StatusCode::ACCEPTED);
        match rx.try_recv() {
            Ok(Command::RawAlert(text)) => assert_eq!(text, "service-x is down"),
            other => panic!("expected raw alert, got {:?}", other.is_ok()),
        }

        let (code, _) = handle_alert(State(state), Json(serde_json::json!({}))).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_incident_events_return_not_found() {
        let (state, _rx) = state("events");
        let (code, _) = incident_events(State(state), Path("INC0000000".to_string())).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }
}
