// Autopilot delegate
// Binds the autopilot engine to the Raft group and gossip pools of this cluster

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use batata_common::{
    AutopilotError, BUILD_TAG, BuildVersion, ConsensusGroup, GossipMember, HealthReport, PORT_TAG,
    RaftServerEntry, Result, ServerInfo, ServerStats, StatsProbe,
};

use crate::config::{AutopilotConfig, AutopilotSettings};
use crate::metrics;
use crate::promotion::PromotionPolicy;
use crate::segment::GossipViewAggregator;
use crate::stability::{ServerStabilizationPolicy, StabilityPolicy};
use crate::stats::{self, Deadline};

/// Host interface the autopilot engine drives on every tick
#[async_trait::async_trait]
pub trait AutopilotDelegate: Send + Sync {
    /// Current autopilot configuration, created on first access
    async fn config(&self) -> AutopilotConfig;

    /// Raft progress of every server member, bounded by `deadline`
    async fn fetch_stats(
        &self,
        members: &[GossipMember],
        deadline: Deadline,
    ) -> HashMap<String, ServerStats>;

    /// `Ok(None)` for members that are not servers
    fn classify(&self, member: &GossipMember) -> Result<Option<ServerInfo>>;

    fn notify_health(&self, report: &HealthReport);

    /// Servers to promote to voter this cycle; applying them is up to the caller
    async fn promote_non_voters(
        &self,
        config: &AutopilotConfig,
        report: &HealthReport,
    ) -> Result<Vec<RaftServerEntry>>;

    fn consensus(&self) -> &Arc<dyn ConsensusGroup>;

    fn gossip(&self) -> &GossipViewAggregator;
}

/// Classify a gossip member as a server.
///
/// Members whose role is not the server role are `Ok(None)` whatever their
/// other tags hold.
pub fn classify_member(member: &GossipMember) -> Result<Option<ServerInfo>> {
    if !member.is_server() {
        return Ok(None);
    }

    let port_tag = member.tag(PORT_TAG).unwrap_or_default();
    let port: u16 = port_tag.parse().map_err(|_| {
        AutopilotError::parse(&member.name, format!("invalid port tag '{}'", port_tag))
    })?;

    let build_tag = member.tag(BUILD_TAG).unwrap_or_default();
    let build = BuildVersion::from_build_tag(build_tag).ok_or_else(|| {
        AutopilotError::parse(&member.name, format!("invalid build tag '{}'", build_tag))
    })?;

    Ok(Some(ServerInfo {
        id: member.server_id().unwrap_or_default().to_string(),
        name: member.name.clone(),
        addr: SocketAddr::new(member.addr, port),
        build,
        status: member.status,
    }))
}

/// Autopilot delegate backed by the consensus group and the gossip view
pub struct ClusterAdapter {
    consensus: Arc<dyn ConsensusGroup>,
    gossip: GossipViewAggregator,
    stats_probe: Arc<dyn StatsProbe>,
    stability: Arc<dyn StabilityPolicy>,
    initial_config: AutopilotConfig,
    stats_timeout: Duration,
    config: RwLock<Option<AutopilotConfig>>,
}

impl ClusterAdapter {
    pub fn new(
        consensus: Arc<dyn ConsensusGroup>,
        gossip: GossipViewAggregator,
        stats_probe: Arc<dyn StatsProbe>,
    ) -> Self {
        Self {
            consensus,
            gossip,
            stats_probe,
            stability: Arc::new(ServerStabilizationPolicy),
            initial_config: AutopilotConfig::default(),
            stats_timeout: AutopilotSettings::default().stats_timeout,
            config: RwLock::new(None),
        }
    }

    pub fn with_stability(mut self, stability: Arc<dyn StabilityPolicy>) -> Self {
        self.stability = stability;
        self
    }

    /// Configuration installed on first access of [`AutopilotDelegate::config`]
    pub fn with_initial_config(mut self, config: AutopilotConfig) -> Self {
        self.initial_config = config;
        self
    }

    /// Take the initial configuration and stats timeout from process settings
    pub fn with_settings(mut self, settings: &AutopilotSettings) -> Self {
        self.initial_config = settings.autopilot.clone();
        self.stats_timeout = settings.stats_timeout;
        self
    }

    /// Deadline for one stats round, `stats_timeout` from now
    pub fn stats_deadline(&self) -> Deadline {
        Deadline::after(self.stats_timeout)
    }

    /// Administrative update.
    ///
    /// Returns `Ok(false)` when `cas` does not match the current
    /// `modify_index`, and a `Config` error when a duration field does not
    /// parse.
    pub async fn set_config(&self, config: AutopilotConfig, cas: Option<u64>) -> Result<bool> {
        config.validate()?;
        let mut guard = self.config.write().await;
        let current = guard.get_or_insert_with(|| self.initial_config.clone());
        if let Some(cas_index) = cas
            && current.modify_index != cas_index
        {
            debug!(
                cas = cas_index,
                modify_index = current.modify_index,
                "Rejected autopilot configuration update"
            );
            return Ok(false);
        }

        let mut new_config = config;
        new_config.create_index = current.create_index;
        new_config.modify_index = current.modify_index + 1;
        *current = new_config;
        info!(
            modify_index = current.modify_index,
            "Updated autopilot configuration"
        );
        Ok(true)
    }
}

#[async_trait::async_trait]
impl AutopilotDelegate for ClusterAdapter {
    async fn config(&self) -> AutopilotConfig {
        if let Some(config) = self.config.read().await.as_ref() {
            return config.clone();
        }
        let mut guard = self.config.write().await;
        guard
            .get_or_insert_with(|| {
                info!("Initialized autopilot configuration");
                self.initial_config.clone()
            })
            .clone()
    }

    async fn fetch_stats(
        &self,
        members: &[GossipMember],
        deadline: Deadline,
    ) -> HashMap<String, ServerStats> {
        let servers: Vec<ServerInfo> = members
            .iter()
            .filter_map(|member| match self.classify(member) {
                Ok(server) => server,
                Err(e) => {
                    warn!("Skipping member for stats: {}", e);
                    None
                }
            })
            .collect();

        stats::fetch_stats(self.stats_probe.clone(), servers, deadline).await
    }

    fn classify(&self, member: &GossipMember) -> Result<Option<ServerInfo>> {
        classify_member(member)
    }

    fn notify_health(&self, report: &HealthReport) {
        if self.consensus.is_leader() {
            metrics::set_autopilot_health(report);
        }
    }

    async fn promote_non_voters(
        &self,
        config: &AutopilotConfig,
        report: &HealthReport,
    ) -> Result<Vec<RaftServerEntry>> {
        let servers = self
            .consensus
            .configuration()
            .await
            .map_err(AutopilotError::ConfigUnavailable)?;

        let stable = self.stability.stable_servers(config, report, &servers);
        if stable.is_empty() {
            return Ok(stable);
        }

        let members = self.gossip.primary_members();
        let promoted = PromotionPolicy::new(config, &members).evaluate(stable, &servers);
        if !promoted.is_empty() {
            let ids: Vec<&str> = promoted.iter().map(|s| s.id.as_str()).collect();
            info!(servers = ?ids, "Selected non-voters for promotion");
        }
        Ok(promoted)
    }

    fn consensus(&self) -> &Arc<dyn ConsensusGroup> {
        &self.consensus
    }

    fn gossip(&self) -> &GossipViewAggregator {
        &self.gossip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use batata_common::{MemberStatus, NONVOTER_TAG, ROLE_TAG, SERVER_ID_TAG, SERVER_ROLE};

    fn member() -> GossipMember {
        GossipMember::new("node-1", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 8301)
    }

    fn server_member() -> GossipMember {
        member()
            .with_tag(ROLE_TAG, SERVER_ROLE)
            .with_tag(SERVER_ID_TAG, "a")
            .with_tag(PORT_TAG, "8300")
            .with_tag(BUILD_TAG, "1.9.3:7f8e9a")
    }

    #[test]
    fn test_classify_server() {
        let info = classify_member(&server_member().with_status(MemberStatus::Failed))
            .unwrap()
            .unwrap();
        assert_eq!(info.id, "a");
        assert_eq!(info.name, "node-1");
        assert_eq!(info.addr.to_string(), "10.0.0.1:8300");
        assert_eq!(info.build, BuildVersion::new(1, 9, 3));
        assert_eq!(info.status, MemberStatus::Failed);
    }

    #[test]
    fn test_classify_non_server_is_absent() {
        assert!(classify_member(&member()).unwrap().is_none());
        // Malformed tags do not matter without the server role
        let client = member()
            .with_tag(ROLE_TAG, "node")
            .with_tag(PORT_TAG, "abc")
            .with_tag(BUILD_TAG, "???")
            .with_tag(NONVOTER_TAG, "1");
        assert!(classify_member(&client).unwrap().is_none());
    }

    #[test]
    fn test_classify_bad_port() {
        let err = classify_member(&server_member().with_tag(PORT_TAG, "abc")).unwrap_err();
        assert!(matches!(err, AutopilotError::Parse { ref member, .. } if member == "node-1"));

        let mut missing = server_member();
        missing.tags.remove(PORT_TAG);
        assert!(matches!(
            classify_member(&missing),
            Err(AutopilotError::Parse { .. })
        ));

        assert!(classify_member(&server_member().with_tag(PORT_TAG, "70000")).is_err());
    }

    #[test]
    fn test_classify_bad_build() {
        let err = classify_member(&server_member().with_tag(BUILD_TAG, "dev")).unwrap_err();
        assert!(matches!(err, AutopilotError::Parse { .. }));
    }
}
