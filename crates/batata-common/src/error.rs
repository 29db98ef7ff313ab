//! Error types for Batata autopilot and leader reconciliation
//!
//! Collaborator traits report failures as `anyhow::Error`; this module wraps
//! them into `AutopilotError` so callers can decide how each kind is retried.

/// Autopilot and reconciliation error kinds
#[derive(thiserror::Error, Debug)]
pub enum AutopilotError {
    /// A member tagged as a server carries a malformed `port` or `build` tag.
    #[error("failed to parse server member '{member}': {reason}")]
    Parse { member: String, reason: String },

    /// The consensus group could not report its configuration.
    #[error("failed to get raft configuration: {0}")]
    ConfigUnavailable(#[source] anyhow::Error),

    /// A segment-scoped query on a deployment without that segment.
    #[error("network segments are not supported (segment '{0}')")]
    SegmentsNotSupported(String),

    /// Writing one member into the catalog failed; the whole cycle aborts.
    #[error("failed to reconcile member '{member}': {source}")]
    ReconcileMember {
        member: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("catalog error: {0}")]
    Catalog(#[source] anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AutopilotError {
    pub fn parse(member: impl Into<String>, reason: impl Into<String>) -> Self {
        AutopilotError::Parse {
            member: member.into(),
            reason: reason.into(),
        }
    }

    /// Whether the next scheduled tick may succeed where this one failed.
    ///
    /// `SegmentsNotSupported` marks a capability boundary and parse errors are
    /// tied to the member's tags, so neither is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutopilotError::ConfigUnavailable(_)
                | AutopilotError::ReconcileMember { .. }
                | AutopilotError::Catalog(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AutopilotError>;
