// Leader reconciliation
// Converges the catalog with the aggregated gossip view while this node leads the Raft group

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use batata_common::{
    AutopilotError, CatalogNode, CatalogStore, ConsensusGroup, GossipMember, MemberStatus,
    NodeHealth, NodeRegistration, Result, now_millis,
};

use crate::config::AutopilotSettings;
use crate::metrics;
use crate::segment::{GossipViewAggregator, MIN_TICK};
use crate::signal::StopReceiver;

/// Lifecycle of a reconciliation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Idle,
    Running,
    Stopped,
}

/// Decides whether a catalog node missing from gossip may be deregistered
pub trait ReapPolicy: Send + Sync {
    fn is_reapable(&self, node: &CatalogNode, now_millis: i64) -> bool;
}

/// Reap once the node's last catalog write is older than the grace period
#[derive(Debug, Clone, Copy)]
pub struct ReapGracePeriod(pub Duration);

impl ReapPolicy for ReapGracePeriod {
    fn is_reapable(&self, node: &CatalogNode, now_millis: i64) -> bool {
        let grace = i64::try_from(self.0.as_millis()).unwrap_or(i64::MAX);
        now_millis.saturating_sub(node.updated_at) >= grace
    }
}

/// Catalog writes made by one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub registered: usize,
    pub updated: usize,
    pub deregistered: usize,
    pub reaped: usize,
    pub unchanged: usize,
}

impl ReconcileSummary {
    pub fn writes(&self) -> usize {
        self.registered + self.updated + self.deregistered + self.reaped
    }
}

/// Leader-only loop diffing gossip membership against the catalog
pub struct ReconciliationLoop {
    gossip: GossipViewAggregator,
    consensus: Arc<dyn ConsensusGroup>,
    catalog: Arc<dyn CatalogStore>,
    reap_policy: Arc<dyn ReapPolicy>,
    local_node: String,
    interval: Duration,
    state: RwLock<ReconcileState>,
}

impl ReconciliationLoop {
    pub fn new(
        gossip: GossipViewAggregator,
        consensus: Arc<dyn ConsensusGroup>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        let defaults = AutopilotSettings::default();
        Self {
            gossip,
            consensus,
            catalog,
            reap_policy: Arc::new(ReapGracePeriod(defaults.reap_grace)),
            local_node: defaults.node_name,
            interval: defaults.reconcile_interval,
            state: RwLock::new(ReconcileState::Idle),
        }
    }

    /// Apply node name, interval and reap grace from process settings
    pub fn with_settings(mut self, settings: &AutopilotSettings) -> Self {
        self.local_node = settings.node_name.clone();
        self.reap_policy = Arc::new(ReapGracePeriod(settings.reap_grace));
        self.with_interval(settings.reconcile_interval)
    }

    pub fn with_reap_policy(mut self, policy: Arc<dyn ReapPolicy>) -> Self {
        self.reap_policy = policy;
        self
    }

    /// Intervals shorter than a millisecond are raised to one
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_TICK);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> ReconcileState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ReconcileState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Reconcile on every interval until leadership is lost or `stop` fires.
    ///
    /// Cycles never overlap: the next tick is only awaited once the previous
    /// cycle has finished or been cancelled.
    pub async fn run(&self, mut stop: StopReceiver) {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if *state == ReconcileState::Running {
                warn!("Leader reconciliation already running");
                return;
            }
            *state = ReconcileState::Running;
        }
        info!(interval = ?self.interval, "Starting leader reconciliation");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.stopped() => break,
            }

            if !self.consensus.is_leader() {
                info!("Lost leadership, stopping reconciliation");
                break;
            }

            tokio::select! {
                result = self.reconcile() => {
                    match result {
                        Ok(summary) => debug!(?summary, "Reconciliation cycle complete"),
                        Err(e) => error!("Failed to reconcile: {}", e),
                    }
                }
                _ = stop.stopped() => {
                    info!("Reconciliation cancelled mid-cycle");
                    break;
                }
            }
        }

        self.set_state(ReconcileState::Stopped);
        info!("Stopped leader reconciliation");
    }

    /// Run one full cycle.
    ///
    /// The first failing member aborts the cycle; writes made for earlier
    /// members are kept and the next cycle starts over.
    pub async fn reconcile(&self) -> Result<ReconcileSummary> {
        let started = Instant::now();
        let result = self.reconcile_cycle().await;
        metrics::record_reconcile_cycle(started.elapsed().as_secs_f64(), result.is_ok());
        result
    }

    async fn reconcile_cycle(&self) -> Result<ReconcileSummary> {
        let members = self.gossip.all_members();
        let mut known: HashSet<String> = HashSet::with_capacity(members.len());
        let mut summary = ReconcileSummary::default();

        for member in &members {
            self.reconcile_member(member, &mut summary)
                .await
                .map_err(|source| AutopilotError::ReconcileMember {
                    member: member.name.clone(),
                    source,
                })?;
            known.insert(member.name.clone());
        }

        self.reconcile_reaped(&known, &mut summary).await?;
        Ok(summary)
    }

    async fn reconcile_member(
        &self,
        member: &GossipMember,
        summary: &mut ReconcileSummary,
    ) -> anyhow::Result<()> {
        match member.status {
            MemberStatus::Alive => {
                self.ensure_registered(member, NodeHealth::Passing, summary)
                    .await
            }
            MemberStatus::Failed => {
                self.ensure_registered(member, NodeHealth::Critical, summary)
                    .await
            }
            MemberStatus::Left => {
                if self.catalog.node(&member.name).await?.is_some() {
                    info!(node = %member.name, "Deregistering member that left");
                    self.catalog.deregister(&member.name).await?;
                    metrics::record_reconcile_write("deregister");
                    summary.deregistered += 1;
                } else {
                    summary.unchanged += 1;
                }
                Ok(())
            }
            MemberStatus::Leaving => {
                summary.unchanged += 1;
                Ok(())
            }
        }
    }

    async fn ensure_registered(
        &self,
        member: &GossipMember,
        health: NodeHealth,
        summary: &mut ReconcileSummary,
    ) -> anyhow::Result<()> {
        let desired = NodeRegistration {
            node: member.name.clone(),
            address: member.addr.to_string(),
            health,
        };

        match self.catalog.node(&member.name).await? {
            Some(existing) if desired.matches(&existing) => {
                summary.unchanged += 1;
            }
            Some(existing) => {
                debug!(
                    node = %member.name,
                    from = %existing.health,
                    to = %health,
                    "Updating catalog node"
                );
                self.catalog.register(desired).await?;
                metrics::record_reconcile_write("update");
                summary.updated += 1;
            }
            None => {
                info!(node = %member.name, %health, "Registering member in catalog");
                self.catalog.register(desired).await?;
                metrics::record_reconcile_write("register");
                summary.registered += 1;
            }
        }
        Ok(())
    }

    /// Deregister catalog nodes that no pool knows about any more
    async fn reconcile_reaped(
        &self,
        known: &HashSet<String>,
        summary: &mut ReconcileSummary,
    ) -> Result<()> {
        let nodes = self
            .catalog
            .managed_nodes()
            .await
            .map_err(AutopilotError::Catalog)?;
        let now = now_millis();

        for node in nodes {
            if known.contains(&node.node) || node.node == self.local_node {
                continue;
            }
            if !self.reap_policy.is_reapable(&node, now) {
                debug!(node = %node.node, "Node not yet eligible for reaping");
                continue;
            }

            info!(node = %node.node, "Reaping catalog node missing from gossip");
            self.catalog.deregister(&node.node).await.map_err(|source| {
                AutopilotError::ReconcileMember {
                    member: node.node.clone(),
                    source,
                }
            })?;
            metrics::record_reconcile_write("deregister");
            summary.reaped += 1;
        }
        Ok(())
    }
}
