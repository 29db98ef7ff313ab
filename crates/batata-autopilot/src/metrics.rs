// Metrics for autopilot and leader reconciliation
// Emitted through the `metrics` facade; the exporter is installed by the host

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use batata_common::HealthReport;

pub const AUTOPILOT_FAILURE_TOLERANCE: &str = "autopilot_failure_tolerance";
pub const AUTOPILOT_HEALTHY: &str = "autopilot_healthy";
pub const RECONCILE_DURATION: &str = "leader_reconcile_duration_seconds";
pub const RECONCILE_WRITES: &str = "leader_reconcile_writes_total";
pub const RECONCILE_FAILURES: &str = "leader_reconcile_failures_total";

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    describe_gauge!(
        AUTOPILOT_FAILURE_TOLERANCE,
        "Number of voting servers the cluster can lose while keeping quorum"
    );
    describe_gauge!(
        AUTOPILOT_HEALTHY,
        "Whether autopilot considers the cluster healthy (1) or not (0)"
    );
    describe_histogram!(
        RECONCILE_DURATION,
        "Duration of one leader reconciliation cycle in seconds"
    );
    describe_counter!(
        RECONCILE_WRITES,
        "Catalog writes issued by leader reconciliation"
    );
    describe_counter!(RECONCILE_FAILURES, "Aborted leader reconciliation cycles");

    tracing::info!("Autopilot metrics initialized");
}

/// Publish the health gauges for one health report
pub fn set_autopilot_health(report: &HealthReport) {
    gauge!(AUTOPILOT_FAILURE_TOLERANCE).set(report.failure_tolerance as f64);
    gauge!(AUTOPILOT_HEALTHY).set(if report.healthy { 1.0 } else { 0.0 });
}

/// Record one catalog write, `kind` is `register`, `update` or `deregister`
pub fn record_reconcile_write(kind: &'static str) {
    counter!(RECONCILE_WRITES, "kind" => kind).increment(1);
}

pub fn record_reconcile_cycle(duration_secs: f64, success: bool) {
    histogram!(RECONCILE_DURATION).record(duration_secs);
    if !success {
        counter!(RECONCILE_FAILURES).increment(1);
    }
}
