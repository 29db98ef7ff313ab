//! Batata Common - Shared types, traits, and utilities
//!
//! This crate provides the foundational types used by the autopilot crates:
//! - Error types
//! - Membership, consensus and catalog data model
//! - Collaborator traits for dependency injection
//! - Utility functions and gossip tag constants

pub mod error;
pub mod model;
pub mod traits;
pub mod utils;

// Re-exports for convenience
pub use error::{AutopilotError, Result};
pub use model::*;
pub use traits::*;
pub use utils::{format_millis, now_millis, parse_duration};

/// Gossip tag holding the member's role
pub const ROLE_TAG: &str = "role";

/// Role tag value carried by consensus participants
pub const SERVER_ROLE: &str = "consul";

/// Gossip tag holding the Raft server id
pub const SERVER_ID_TAG: &str = "id";

/// Gossip tag holding the server RPC port
pub const PORT_TAG: &str = "port";

/// Gossip tag holding the build version string
pub const BUILD_TAG: &str = "build";

/// Gossip tag excluding a server from promotion to voter
pub const NONVOTER_TAG: &str = "nonvoter";

/// Prefix of the tags advertising segment addresses (`sl_<segment>`)
pub const SEGMENT_ADDR_TAG_PREFIX: &str = "sl_";
