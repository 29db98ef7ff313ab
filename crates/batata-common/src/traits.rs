//! Collaborator traits for dependency injection
//!
//! The autopilot delegate and the reconciliation loop only see these traits.
//! The Raft node, the gossip pools, the catalog store and the stats RPC are
//! provided by the hosting server.

use std::collections::HashMap;

use crate::model::{
    CatalogNode, GossipMember, NodeRegistration, RaftServerEntry, ServerInfo, ServerStats,
};

/// Read access to the consensus group
#[async_trait::async_trait]
pub trait ConsensusGroup: Send + Sync {
    /// Current Raft configuration; fails when no leader is known or the
    /// local node is partitioned
    async fn configuration(&self) -> anyhow::Result<Vec<RaftServerEntry>>;

    /// Best-effort local leadership; may be stale
    fn is_leader(&self) -> bool;
}

/// One gossip pool (the primary LAN pool or a named segment)
pub trait GossipPool: Send + Sync {
    fn name(&self) -> &str;

    fn members(&self) -> Vec<GossipMember>;

    /// Publish a tag on the local member of this pool
    fn set_tag(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Pool internals such as member counts and health score
    fn stats(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Write API of the strongly consistent catalog
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn node(&self, name: &str) -> anyhow::Result<Option<CatalogNode>>;

    /// Nodes whose registration is owned by reconciliation
    async fn managed_nodes(&self) -> anyhow::Result<Vec<CatalogNode>>;

    async fn register(&self, registration: NodeRegistration) -> anyhow::Result<()>;

    async fn deregister(&self, name: &str) -> anyhow::Result<()>;
}

/// Fetches Raft progress from a single server
#[async_trait::async_trait]
pub trait StatsProbe: Send + Sync {
    async fn probe(&self, server: &ServerInfo) -> anyhow::Result<ServerStats>;
}
