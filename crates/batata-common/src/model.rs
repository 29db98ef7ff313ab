// Cluster membership and consensus data model
// Shared by the autopilot delegate, the gossip view and leader reconciliation

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{NONVOTER_TAG, ROLE_TAG, SERVER_ID_TAG, SERVER_ROLE};

/// Matches the dotted version inside a build tag such as `1.9.3:abc123`
static BUILD_VERSION_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("Invalid regex pattern"));

/// Gossip status of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Alive,
    Leaving,
    Left,
    Failed,
}

impl Display for MemberStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberStatus::Alive => write!(f, "alive"),
            MemberStatus::Leaving => write!(f, "leaving"),
            MemberStatus::Left => write!(f, "left"),
            MemberStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A member as seen by one gossip pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipMember {
    pub name: String,
    pub addr: IpAddr,
    /// Gossip port, not the RPC port advertised in the `port` tag
    pub port: u16,
    pub tags: HashMap<String, String>,
    pub status: MemberStatus,
}

impl GossipMember {
    pub fn new(name: impl Into<String>, addr: IpAddr, port: u16) -> Self {
        Self {
            name: name.into(),
            addr,
            port,
            tags: HashMap::new(),
            status: MemberStatus::Alive,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: MemberStatus) -> Self {
        self.status = status;
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Whether the `role` tag marks this member as a consensus participant
    pub fn is_server(&self) -> bool {
        self.tag(ROLE_TAG) == Some(SERVER_ROLE)
    }

    pub fn server_id(&self) -> Option<&str> {
        self.tag(SERVER_ID_TAG)
    }

    /// Whether the member opted out of voting with the `nonvoter` tag
    pub fn is_nonvoter(&self) -> bool {
        self.tag(NONVOTER_TAG)
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }
}

/// Build version of a server, taken from its `build` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl BuildVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extract the first `major.minor.patch` found in a build tag.
    ///
    /// Build tags carry suffixes such as `1.9.3:7f8e9a` or `1.10.0-beta1`;
    /// anything around the dotted triple is ignored.
    pub fn from_build_tag(tag: &str) -> Option<Self> {
        let caps = BUILD_VERSION_PATTERN.captures(tag)?;
        let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
        Some(Self::new(part(1)?, part(2)?, part(3)?))
    }
}

impl Display for BuildVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A gossip member classified as a consensus participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Equals the Raft server id of the node
    pub id: String,
    pub name: String,
    pub addr: SocketAddr,
    pub build: BuildVersion,
    pub status: MemberStatus,
}

/// Raft suffrage of a configuration entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suffrage {
    Voter,
    Nonvoter,
    Staging,
}

impl Suffrage {
    /// Voters and servers being staged into voters both count toward a zone's
    /// voting presence
    pub fn is_potential_voter(self) -> bool {
        matches!(self, Suffrage::Voter | Suffrage::Staging)
    }
}

impl Display for Suffrage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Suffrage::Voter => write!(f, "Voter"),
            Suffrage::Nonvoter => write!(f, "Nonvoter"),
            Suffrage::Staging => write!(f, "Staging"),
        }
    }
}

/// One server in the current Raft configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RaftServerEntry {
    #[serde(rename = "ID")]
    pub id: String,
    pub address: String,
    pub suffrage: Suffrage,
}

impl RaftServerEntry {
    pub fn new(id: impl Into<String>, address: impl Into<String>, suffrage: Suffrage) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            suffrage,
        }
    }

    pub fn voter(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(id, address, Suffrage::Voter)
    }

    pub fn nonvoter(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(id, address, Suffrage::Nonvoter)
    }
}

/// Result of probing one server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub last_contact: Duration,
    pub last_term: u64,
    pub last_index: u64,
}

/// Per-server entry of a health report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerHealth {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub serf_status: MemberStatus,
    pub version: String,
    pub leader: bool,
    pub last_contact: String,
    pub last_term: u64,
    pub last_index: u64,
    pub healthy: bool,
    pub voter: bool,
    /// Unix millis since which the server has kept its current health
    pub stable_since: i64,
}

/// Cluster health computed once per health interval by the autopilot engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub failure_tolerance: i32,
    pub servers: Vec<ServerHealth>,
}

impl HealthReport {
    pub fn server(&self, id: &str) -> Option<&ServerHealth> {
        self.servers.iter().find(|s| s.id == id)
    }
}

/// Health of a node as recorded in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeHealth {
    Passing,
    Critical,
}

impl Display for NodeHealth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeHealth::Passing => write!(f, "passing"),
            NodeHealth::Critical => write!(f, "critical"),
        }
    }
}

/// A node registered in the catalog by the leader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogNode {
    pub node: String,
    pub address: String,
    pub health: NodeHealth,
    /// Unix millis of the last write for this node
    pub updated_at: i64,
}

/// Write issued by reconciliation to create or correct a catalog node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeRegistration {
    pub node: String,
    pub address: String,
    pub health: NodeHealth,
}

impl NodeRegistration {
    /// Whether the catalog already holds exactly this registration
    pub fn matches(&self, node: &CatalogNode) -> bool {
        self.node == node.node && self.address == node.address && self.health == node.health
    }
}
