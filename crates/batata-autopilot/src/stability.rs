// Stable candidate selection
// Non-voters that stayed healthy for the stabilization window are promotion candidates

use batata_common::{HealthReport, RaftServerEntry, now_millis};

use crate::config::AutopilotConfig;

/// Chooses which configuration entries are stable enough to be promoted
pub trait StabilityPolicy: Send + Sync {
    fn stable_servers(
        &self,
        config: &AutopilotConfig,
        report: &HealthReport,
        servers: &[RaftServerEntry],
    ) -> Vec<RaftServerEntry>;
}

/// Non-voters that have been healthy for at least `server_stabilization_time`
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerStabilizationPolicy;

impl StabilityPolicy for ServerStabilizationPolicy {
    fn stable_servers(
        &self,
        config: &AutopilotConfig,
        report: &HealthReport,
        servers: &[RaftServerEntry],
    ) -> Vec<RaftServerEntry> {
        let now = now_millis();
        let window =
            i64::try_from(config.server_stabilization_time().as_millis()).unwrap_or(i64::MAX);

        servers
            .iter()
            .filter(|s| !s.suffrage.is_potential_voter())
            .filter(|s| {
                report
                    .server(&s.id)
                    .is_some_and(|h| h.healthy && now.saturating_sub(h.stable_since) >= window)
            })
            .cloned()
            .collect()
    }
}
