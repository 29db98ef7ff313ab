//! Common test utilities for autopilot integration testing
//!
//! In-memory stand-ins for the collaborators a server hands to the autopilot
//! crate:
//! - FakeConsensus: Raft configuration and leadership flag
//! - FakePool: a gossip pool with a mutable member list
//! - MemoryCatalog: catalog store with call counting and failure injection
//! - FixedProbe: stats probe answering for every server

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;

use batata_common::{
    BUILD_TAG, CatalogNode, CatalogStore, ConsensusGroup, GossipMember, GossipPool, HealthReport,
    MemberStatus, NodeHealth, NodeRegistration, PORT_TAG, ROLE_TAG, RaftServerEntry,
    SERVER_ID_TAG, SERVER_ROLE, ServerHealth, ServerInfo, ServerStats, StatsProbe, format_millis,
    now_millis,
};

/// Zone tag used by the promotion scenarios
pub const ZONE_TAG: &str = "zone";

pub struct FakeConsensus {
    servers: Mutex<Vec<RaftServerEntry>>,
    leader: AtomicBool,
    unavailable: AtomicBool,
}

impl FakeConsensus {
    pub fn new(servers: Vec<RaftServerEntry>) -> Arc<Self> {
        Arc::new(Self {
            servers: Mutex::new(servers),
            leader: AtomicBool::new(true),
            unavailable: AtomicBool::new(false),
        })
    }

    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ConsensusGroup for FakeConsensus {
    async fn configuration(&self) -> anyhow::Result<Vec<RaftServerEntry>> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("no known leader");
        }
        Ok(self.servers.lock().unwrap().clone())
    }

    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }
}

pub struct FakePool {
    name: String,
    members: Mutex<Vec<GossipMember>>,
    pub tags: Mutex<HashMap<String, String>>,
}

impl FakePool {
    pub fn new(name: &str, members: Vec<GossipMember>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            members: Mutex::new(members),
            tags: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_members(&self, members: Vec<GossipMember>) {
        *self.members.lock().unwrap() = members;
    }
}

impl GossipPool for FakePool {
    fn name(&self) -> &str {
        &self.name
    }

    fn members(&self) -> Vec<GossipMember> {
        self.members.lock().unwrap().clone()
    }

    fn set_tag(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.tags
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Catalog kept in a `DashMap`, counting every call it receives
#[derive(Default)]
pub struct MemoryCatalog {
    nodes: DashMap<String, CatalogNode>,
    calls: AtomicUsize,
    writes: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    hang_registers: AtomicBool,
    fail_listing: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed a node as if it had been written at `updated_at`
    pub fn insert(&self, name: &str, address: &str, health: NodeHealth, updated_at: i64) {
        self.nodes.insert(
            name.to_string(),
            CatalogNode {
                node: name.to_string(),
                address: address.to_string(),
                health,
                updated_at,
            },
        );
    }

    /// Make every write for `name` fail
    pub fn fail_writes_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
        self.fail_listing.store(false, Ordering::SeqCst);
    }

    /// Make every `register` call wait forever
    pub fn hang_registers(&self) {
        self.hang_registers.store(true, Ordering::SeqCst);
    }

    /// Make `managed_nodes` fail
    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    pub fn get(&self, name: &str) -> Option<CatalogNode> {
        self.nodes.get(name).map(|n| n.value().clone())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self, name: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(name) {
            anyhow::bail!("catalog write rejected for {}", name);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryCatalog {
    async fn node(&self, name: &str) -> anyhow::Result<Option<CatalogNode>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(name))
    }

    async fn managed_nodes(&self) -> anyhow::Result<Vec<CatalogNode>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            anyhow::bail!("catalog listing unavailable");
        }
        let mut nodes: Vec<CatalogNode> = self.nodes.iter().map(|n| n.value().clone()).collect();
        nodes.sort_by(|a, b| a.node.cmp(&b.node));
        Ok(nodes)
    }

    async fn register(&self, registration: NodeRegistration) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_registers.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.check_write(&registration.node)?;
        self.insert(
            &registration.node,
            &registration.address,
            registration.health,
            now_millis(),
        );
        Ok(())
    }

    async fn deregister(&self, name: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_write(name)?;
        self.nodes.remove(name);
        Ok(())
    }
}

/// Answers every probe with the same stats
pub struct FixedProbe;

#[async_trait::async_trait]
impl StatsProbe for FixedProbe {
    async fn probe(&self, _server: &ServerInfo) -> anyhow::Result<ServerStats> {
        Ok(ServerStats {
            last_contact: Duration::from_millis(4),
            last_term: 3,
            last_index: 120,
        })
    }
}

pub fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
}

pub fn client(name: &str, last: u8) -> GossipMember {
    GossipMember::new(name, ip(last), 8301)
}

/// Server member whose Raft id equals its name
pub fn server(name: &str, last: u8) -> GossipMember {
    client(name, last)
        .with_tag(ROLE_TAG, SERVER_ROLE)
        .with_tag(SERVER_ID_TAG, name)
        .with_tag(PORT_TAG, "8300")
        .with_tag(BUILD_TAG, "1.9.3:7f8e9a")
}

pub fn zoned_server(name: &str, last: u8, zone: &str) -> GossipMember {
    server(name, last).with_tag(ZONE_TAG, zone)
}

pub fn failed(member: GossipMember) -> GossipMember {
    member.with_status(MemberStatus::Failed)
}

/// Report in which every listed server has been healthy for an hour
pub fn stable_report(ids: &[&str]) -> HealthReport {
    HealthReport {
        healthy: true,
        failure_tolerance: 1,
        servers: ids
            .iter()
            .map(|id| ServerHealth {
                id: id.to_string(),
                name: id.to_string(),
                address: format!("{}:8300", id),
                serf_status: MemberStatus::Alive,
                version: "1.9.3".to_string(),
                leader: false,
                last_contact: format_millis(Duration::from_millis(4)),
                last_term: 3,
                last_index: 120,
                healthy: true,
                voter: false,
                stable_since: now_millis() - 3_600_000,
            })
            .collect(),
    }
}
