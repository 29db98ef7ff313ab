// Autopilot configuration
// Operator-facing AutopilotConfig plus process settings loaded with the `config` crate

use std::time::Duration;

use serde::{Deserialize, Serialize};

use batata_common::{AutopilotError, Result, parse_duration};

/// Autopilot configuration
///
/// Created lazily from the process settings and afterwards only changed by
/// an administrative compare-and-set on `modify_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AutopilotConfig {
    pub cleanup_dead_servers: bool,
    pub last_contact_threshold: String,
    pub max_trailing_logs: u64,
    pub min_quorum: u64,
    pub server_stabilization_time: String,
    /// Gossip tag naming a server's failure domain; empty disables zone filtering
    pub redundancy_zone_tag: String,
    pub disable_upgrade_migration: bool,
    pub upgrade_version_tag: String,
    pub create_index: u64,
    pub modify_index: u64,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            cleanup_dead_servers: true,
            last_contact_threshold: "200ms".to_string(),
            max_trailing_logs: 250,
            min_quorum: 0,
            server_stabilization_time: "10s".to_string(),
            redundancy_zone_tag: String::new(),
            disable_upgrade_migration: false,
            upgrade_version_tag: String::new(),
            create_index: 1,
            modify_index: 1,
        }
    }
}

impl AutopilotConfig {
    pub fn server_stabilization_time(&self) -> Duration {
        parse_duration(&self.server_stabilization_time).unwrap_or(Duration::from_secs(10))
    }

    pub fn last_contact_threshold(&self) -> Duration {
        parse_duration(&self.last_contact_threshold).unwrap_or(Duration::from_millis(200))
    }

    pub fn zone_tag(&self) -> Option<&str> {
        Some(self.redundancy_zone_tag.as_str()).filter(|t| !t.is_empty())
    }

    /// Reject duration fields that do not parse
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("LastContactThreshold", &self.last_contact_threshold),
            ("ServerStabilizationTime", &self.server_stabilization_time),
        ] {
            if parse_duration(value).is_none() {
                return Err(AutopilotError::Config(format!(
                    "invalid duration '{}' for {}",
                    value, field
                )));
            }
        }
        Ok(())
    }
}

/// A named gossip segment and the address this node advertises for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSettings {
    pub name: String,
    pub advertise: String,
    pub port: u16,
}

/// Process settings for autopilot, reconciliation and segments
#[derive(Debug, Clone)]
pub struct AutopilotSettings {
    pub node_name: String,
    pub stats_timeout: Duration,
    pub reconcile_interval: Duration,
    pub reap_grace: Duration,
    pub segment_advertise_interval: Duration,
    pub segments: Vec<SegmentSettings>,
    /// Initial autopilot configuration used on first access
    pub autopilot: AutopilotConfig,
}

impl Default for AutopilotSettings {
    fn default() -> Self {
        Self {
            node_name: "batata-node".to_string(),
            stats_timeout: Duration::from_secs(1),
            reconcile_interval: Duration::from_secs(60),
            reap_grace: Duration::from_secs(72 * 3600),
            segment_advertise_interval: Duration::from_secs(30),
            segments: Vec::new(),
            autopilot: AutopilotConfig::default(),
        }
    }
}

impl AutopilotSettings {
    /// Read settings from a `config::Config`, falling back to defaults for
    /// missing keys
    pub fn from_config(config: &config::Config) -> Result<Self> {
        let defaults = Self::default();
        let default_ap = &defaults.autopilot;

        let millis = |key: &str, default: Duration, min: u64| -> Result<Duration> {
            let Ok(value) = config.get_int(key) else {
                return Ok(default);
            };
            match u64::try_from(value) {
                Ok(ms) if ms >= min => Ok(Duration::from_millis(ms)),
                _ => Err(AutopilotError::Config(format!(
                    "{} must be at least {}ms, got {}",
                    key, min, value
                ))),
            }
        };
        let duration_str = |key: &str, default: &str| -> Result<String> {
            let value = config
                .get_string(key)
                .unwrap_or_else(|_| default.to_string());
            if parse_duration(&value).is_none() {
                return Err(AutopilotError::Config(format!(
                    "invalid duration '{}' for {}",
                    value, key
                )));
            }
            Ok(value)
        };

        let segments = match config.get::<Vec<SegmentSettings>>("batata.segments") {
            Ok(segments) => segments,
            Err(config::ConfigError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(AutopilotError::Config(e.to_string())),
        };
        if let Some(segment) = segments.iter().find(|s| s.name.is_empty()) {
            return Err(AutopilotError::Config(format!(
                "segment advertised at {}:{} has no name",
                segment.advertise, segment.port
            )));
        }

        let autopilot = AutopilotConfig {
            cleanup_dead_servers: config
                .get_bool("batata.autopilot.cleanup-dead-servers")
                .unwrap_or(default_ap.cleanup_dead_servers),
            last_contact_threshold: duration_str(
                "batata.autopilot.last-contact-threshold",
                &default_ap.last_contact_threshold,
            )?,
            max_trailing_logs: config
                .get_int("batata.autopilot.max-trailing-logs")
                .ok()
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(default_ap.max_trailing_logs),
            min_quorum: config
                .get_int("batata.autopilot.min-quorum")
                .ok()
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(default_ap.min_quorum),
            server_stabilization_time: duration_str(
                "batata.autopilot.server-stabilization-time",
                &default_ap.server_stabilization_time,
            )?,
            redundancy_zone_tag: config
                .get_string("batata.autopilot.redundancy-zone-tag")
                .unwrap_or_default(),
            disable_upgrade_migration: config
                .get_bool("batata.autopilot.disable-upgrade-migration")
                .unwrap_or(default_ap.disable_upgrade_migration),
            upgrade_version_tag: config
                .get_string("batata.autopilot.upgrade-version-tag")
                .unwrap_or_default(),
            ..AutopilotConfig::default()
        };

        Ok(Self {
            node_name: config
                .get_string("batata.node.name")
                .unwrap_or(defaults.node_name),
            stats_timeout: millis("batata.autopilot.stats-timeout-ms", defaults.stats_timeout, 1)?,
            reconcile_interval: millis(
                "batata.reconcile.interval-ms",
                defaults.reconcile_interval,
                1,
            )?,
            reap_grace: millis("batata.reconcile.reap-grace-ms", defaults.reap_grace, 0)?,
            segment_advertise_interval: millis(
                "batata.segments.advertise-interval-ms",
                defaults.segment_advertise_interval,
                1,
            )?,
            segments,
            autopilot,
        })
    }
}
