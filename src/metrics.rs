//! Prometheus metrics for the transaction pipeline
//!
//! Exposes metrics for:
//! - Transactions submitted, confirmed, failed on-chain and rejected
//! - Confirmation poll attempts
//! - Submission-to-receipt latency

use crate::error::{ClientError, ClientResult};

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "ledger_client_transactions_submitted_total",
        "Total transactions accepted by the node",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_REJECTED: CounterVec = register_counter_vec!(
        "ledger_client_transactions_rejected_total",
        "Total transactions refused at broadcast",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "ledger_client_transactions_confirmed_total",
        "Total transactions with a successful receipt",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "ledger_client_transactions_failed_total",
        "Total transactions whose receipt reports failed execution",
        &["chain_id"]
    ).unwrap();

    pub static ref POLL_ATTEMPTS: CounterVec = register_counter_vec!(
        "ledger_client_confirmation_polls_total",
        "Total pending-status checks",
        &[]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "ledger_client_confirmation_latency_seconds",
        "Time from broadcast to receipt",
        &["chain_id"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
}

/// Render all registered metrics in the text exposition format
pub fn render() -> ClientResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ClientError::Internal(format!("metrics encoding failed: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| ClientError::Internal(format!("metrics are not UTF-8: {}", e)))
}

// Helper functions to record metrics

pub fn record_tx_submitted(chain_id: u64) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_rejected(chain_id: u64) {
    TX_REJECTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_confirmed(chain_id: u64) {
    TX_CONFIRMED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_failed(chain_id: u64) {
    TX_FAILED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_poll_attempt() {
    POLL_ATTEMPTS.with_label_values(&[]).inc();
}

pub fn record_tx_latency(chain_id: u64, latency_secs: f64) {
    TX_LATENCY
        .with_label_values(&[&chain_id.to_string()])
        .observe(latency_secs);
}
