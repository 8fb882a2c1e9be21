pub mod agents_api;
pub mod azure;
pub mod benefits;
pub mod cet;
pub mod correlate;
pub mod event_log;
pub mod handoff;
pub mod llm;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod runtime;
pub mod storage;
pub mod ticket;
pub mod triage;
