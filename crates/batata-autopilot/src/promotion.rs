// Promotion policy
// Decides which stable non-voters become voters, keeping voters spread over redundancy zones

use std::collections::HashMap;

use tracing::debug;

use batata_common::{GossipMember, MemberStatus, RaftServerEntry};

use crate::config::AutopilotConfig;

/// Pure promotion decision over one snapshot of configuration and membership
pub struct PromotionPolicy<'a> {
    /// Server members keyed by Raft server id
    members: HashMap<&'a str, &'a GossipMember>,
    zone_tag: Option<&'a str>,
}

impl<'a> PromotionPolicy<'a> {
    /// Build the policy from gossip members; members whose role is not the
    /// server role are ignored
    pub fn new(config: &'a AutopilotConfig, members: &'a [GossipMember]) -> Self {
        let members = members
            .iter()
            .filter(|m| m.is_server())
            .filter_map(|m| m.server_id().map(|id| (id, m)))
            .collect();
        Self {
            members,
            zone_tag: config.zone_tag(),
        }
    }

    /// Select the candidates to promote, in candidate order.
    ///
    /// The result is always a subset of `stable`.
    pub fn evaluate(
        &self,
        stable: Vec<RaftServerEntry>,
        servers: &[RaftServerEntry],
    ) -> Vec<RaftServerEntry> {
        let eligible = self.filter_non_voting(stable);
        if eligible.is_empty() {
            return eligible;
        }
        match self.zone_tag {
            Some(tag) => self.filter_zone_servers(tag, eligible, servers),
            None => eligible,
        }
    }

    /// Drop candidates whose member carries the `nonvoter` tag.
    ///
    /// A candidate without a gossip member is kept; only an explicit tag
    /// excludes.
    pub fn filter_non_voting(&self, stable: Vec<RaftServerEntry>) -> Vec<RaftServerEntry> {
        stable
            .into_iter()
            .filter(|server| match self.members.get(server.id.as_str()) {
                Some(member) if member.is_nonvoter() => {
                    debug!(id = %server.id, "Skipping promotion of server tagged nonvoter");
                    false
                }
                _ => true,
            })
            .collect()
    }

    /// Keep at most one new voter per zone that has no viable voter yet.
    ///
    /// A zone slot is taken as soon as a candidate is accepted, so two
    /// candidates of one uncovered zone never both pass in a single call.
    pub fn filter_zone_servers(
        &self,
        zone_tag: &str,
        candidates: Vec<RaftServerEntry>,
        servers: &[RaftServerEntry],
    ) -> Vec<RaftServerEntry> {
        let mut occupied: HashMap<&str, bool> = HashMap::new();
        for server in servers {
            let zone = self.zone_of(zone_tag, &server.id);
            let viable = server.suffrage.is_potential_voter() && !self.is_failed(&server.id);
            let entry = occupied.entry(zone).or_insert(false);
            *entry = *entry || viable;
        }

        let mut promoted = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let zone = self.zone_of(zone_tag, &candidate.id);
            if zone.is_empty() || !occupied.get(zone).copied().unwrap_or(false) {
                occupied.insert(zone, true);
                promoted.push(candidate);
            } else {
                debug!(
                    id = %candidate.id,
                    zone,
                    "Skipping promotion, zone already has a voter"
                );
            }
        }
        promoted
    }

    fn zone_of(&self, zone_tag: &str, id: &str) -> &'a str {
        self.members
            .get(id)
            .copied()
            .and_then(|m| m.tag(zone_tag))
            .unwrap_or("")
    }

    fn is_failed(&self, id: &str) -> bool {
        self.members
            .get(id)
            .is_some_and(|m| m.status == MemberStatus::Failed)
    }
}
