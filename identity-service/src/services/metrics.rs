use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Registry plus the counters registered in it, published together.
pub struct IdentityMetrics {
    registry: Registry,
    auth_events: IntCounterVec,
    provisioning: IntCounterVec,
    baseline_statements: IntCounterVec,
}

static METRICS: OnceLock<IdentityMetrics> = OnceLock::new();

fn counter(name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec, prometheus::Error> {
    IntCounterVec::new(Opts::new(name, help), labels)
}

fn build_metrics() -> Result<IdentityMetrics, prometheus::Error> {
    let registry = Registry::new();

    let auth_events = counter(
        "identity_auth_events_total",
        "Authentication events by flow and outcome",
        &["flow", "outcome"],
    )?;
    let provisioning = counter(
        "identity_provisioning_total",
        "Organization lifecycle operations by outcome",
        &["operation", "outcome"],
    )?;
    let baseline_statements = counter(
        "identity_baseline_statements_total",
        "Tenant baseline DDL statements by outcome",
        &["outcome"],
    )?;

    registry.register(Box::new(auth_events.clone()))?;
    registry.register(Box::new(provisioning.clone()))?;
    registry.register(Box::new(baseline_statements.clone()))?;

    Ok(IdentityMetrics {
        registry,
        auth_events,
        provisioning,
        baseline_statements,
    })
}

/// Create and register the identity counters. Calling it twice is a no-op.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    let _ = METRICS.set(build_metrics()?);
    Ok(())
}

pub fn record_auth_event(flow: &str, outcome: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics.auth_events.with_label_values(&[flow, outcome]).inc();
    }
}

pub fn record_provisioning(operation: &str, outcome: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .provisioning
            .with_label_values(&[operation, outcome])
            .inc();
    }
}

pub fn record_baseline_statement(outcome: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .baseline_statements
            .with_label_values(&[outcome])
            .inc();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match METRICS.get() {
        Some(m) => &m.registry,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}
