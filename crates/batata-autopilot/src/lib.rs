//! Batata Autopilot - Voter promotion and leader reconciliation
//!
//! This crate provides:
//! - The autopilot delegate binding the engine to the Raft group and gossip
//! - Failure-domain aware promotion of stable non-voters
//! - A single gossip view over the primary pool and network segments
//! - The leader-only loop converging the catalog with gossip membership

pub mod config;
pub mod delegate;
pub mod metrics;
pub mod promotion;
pub mod reconcile;
pub mod segment;
pub mod signal;
pub mod stability;
pub mod stats;

// Re-export commonly used types
pub use config::{AutopilotConfig, AutopilotSettings, SegmentSettings};
pub use delegate::{AutopilotDelegate, ClusterAdapter, classify_member};
pub use promotion::PromotionPolicy;
pub use reconcile::{
    ReapGracePeriod, ReapPolicy, ReconcileState, ReconcileSummary, ReconciliationLoop,
};
pub use segment::{GossipViewAggregator, NoSegments, Segment, SegmentStrategy, StaticSegments};
pub use signal::{StopReceiver, StopSignal};
pub use stability::{ServerStabilizationPolicy, StabilityPolicy};
pub use stats::Deadline;
