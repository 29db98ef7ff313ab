// Gossip view aggregation across network segments
// Composes the primary LAN pool with named segment pools and advertises segment addresses

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use batata_common::{AutopilotError, GossipMember, GossipPool, Result, SEGMENT_ADDR_TAG_PREFIX};

use crate::config::{AutopilotSettings, SegmentSettings};
use crate::signal::StopSignal;

/// Shortest period accepted for a ticker
pub(crate) const MIN_TICK: Duration = Duration::from_millis(1);

/// A named gossip segment and the address this node advertises for it
#[derive(Clone)]
pub struct Segment {
    pub name: String,
    pub pool: Arc<dyn GossipPool>,
    pub advertise: String,
    pub port: u16,
}

impl Segment {
    pub fn new(settings: &SegmentSettings, pool: Arc<dyn GossipPool>) -> Self {
        Self {
            name: settings.name.clone(),
            pool,
            advertise: settings.advertise.clone(),
            port: settings.port,
        }
    }

    /// Tag key used on the primary pool, `sl_<name>`
    pub fn advertise_tag(&self) -> String {
        format!("{}{}", SEGMENT_ADDR_TAG_PREFIX, self.name)
    }

    pub fn advertise_addr(&self) -> String {
        format!("{}:{}", self.advertise, self.port)
    }
}

/// Source of the segments available to this deployment.
///
/// Deployments without segmentation use [`NoSegments`].
pub trait SegmentStrategy: Send + Sync {
    fn segments(&self) -> Vec<Segment>;

    fn segment(&self, name: &str) -> Option<Segment>;
}

/// Deployment without network segments
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSegments;

impl SegmentStrategy for NoSegments {
    fn segments(&self) -> Vec<Segment> {
        Vec::new()
    }

    fn segment(&self, _name: &str) -> Option<Segment> {
        None
    }
}

/// Fixed set of segments configured at startup
#[derive(Clone, Default)]
pub struct StaticSegments {
    segments: Vec<Segment>,
}

impl StaticSegments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segments.retain(|s| s.name != segment.name);
        self.segments.push(segment);
        self
    }

    /// Build the configured segments, looking up each segment's pool by name
    pub fn from_settings<F>(settings: &[SegmentSettings], pool_for: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<Arc<dyn GossipPool>>,
    {
        settings.iter().try_fold(Self::new(), |segments, s| {
            let pool = pool_for(&s.name).ok_or_else(|| {
                AutopilotError::Config(format!("no gossip pool for segment '{}'", s.name))
            })?;
            Ok(segments.with_segment(Segment::new(s, pool)))
        })
    }
}

impl SegmentStrategy for StaticSegments {
    fn segments(&self) -> Vec<Segment> {
        self.segments.clone()
    }

    fn segment(&self, name: &str) -> Option<Segment> {
        self.segments.iter().find(|s| s.name == name).cloned()
    }
}

/// Single logical gossip view over the primary pool and its segments
#[derive(Clone)]
pub struct GossipViewAggregator {
    primary: Arc<dyn GossipPool>,
    segments: Arc<dyn SegmentStrategy>,
    advertise_interval: Duration,
}

impl GossipViewAggregator {
    pub fn new(primary: Arc<dyn GossipPool>, segments: Arc<dyn SegmentStrategy>) -> Self {
        Self {
            primary,
            segments,
            advertise_interval: AutopilotSettings::default().segment_advertise_interval,
        }
    }

    /// Aggregator over the primary pool only
    pub fn primary_only(primary: Arc<dyn GossipPool>) -> Self {
        Self::new(primary, Arc::new(NoSegments))
    }

    /// Intervals shorter than a millisecond are raised to one
    pub fn with_advertise_interval(mut self, interval: Duration) -> Self {
        self.advertise_interval = interval.max(MIN_TICK);
        self
    }

    pub fn with_settings(self, settings: &AutopilotSettings) -> Self {
        self.with_advertise_interval(settings.segment_advertise_interval)
    }

    pub fn advertise_interval(&self) -> Duration {
        self.advertise_interval
    }

    pub fn primary(&self) -> &Arc<dyn GossipPool> {
        &self.primary
    }

    pub fn primary_members(&self) -> Vec<GossipMember> {
        self.primary.members()
    }

    /// Members of the primary pool followed by the server members of every
    /// segment. Not deduplicated.
    pub fn all_members(&self) -> Vec<GossipMember> {
        let mut members = self.primary.members();
        for segment in self.segments.segments() {
            members.extend(segment.pool.members().into_iter().filter(|m| m.is_server()));
        }
        members
    }

    /// Members of one segment; the empty name selects the primary pool
    pub fn segment_members(&self, name: &str) -> Result<Vec<GossipMember>> {
        if name.is_empty() {
            return Ok(self.primary.members());
        }
        self.segments
            .segment(name)
            .map(|s| s.pool.members())
            .ok_or_else(|| AutopilotError::SegmentsNotSupported(name.to_string()))
    }

    /// Address advertised for a segment, empty when the segment is unknown
    pub fn segment_addr(&self, name: &str) -> String {
        self.segments
            .segment(name)
            .map(|s| s.advertise_addr())
            .unwrap_or_default()
    }

    /// Pool stats of every segment keyed `serf_segment_<name>`
    pub fn segment_stats(&self) -> HashMap<String, HashMap<String, String>> {
        self.segments
            .segments()
            .into_iter()
            .map(|s| (format!("serf_segment_{}", s.name), s.pool.stats()))
            .collect()
    }

    /// Start one task per segment that keeps this node's segment address
    /// published on the primary pool until `stop` fires
    pub fn advertise_segments(&self, stop: &StopSignal) -> Vec<JoinHandle<()>> {
        self.segments
            .segments()
            .into_iter()
            .map(|segment| {
                let primary = self.primary.clone();
                let interval = self.advertise_interval;
                let mut stop = stop.subscribe();
                tokio::spawn(async move {
                    let tag = segment.advertise_tag();
                    let addr = segment.advertise_addr();
                    info!(
                        segment = %segment.name,
                        pool = primary.name(),
                        %addr,
                        "Advertising segment address"
                    );

                    let mut ticker = tokio::time::interval(interval);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                match primary.set_tag(&tag, &addr) {
                                    Ok(()) => debug!(segment = %segment.name, "Republished segment address"),
                                    Err(e) => warn!(segment = %segment.name, "Failed to advertise segment address: {}", e),
                                }
                            }
                            _ = stop.stopped() => {
                                info!(segment = %segment.name, "Stopped segment advertisement");
                                break;
                            }
                        }
                    }
                })
            })
            .collect()
    }
}
