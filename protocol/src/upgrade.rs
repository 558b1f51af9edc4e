//! # Upgrade Schedule
//!
//! Maps network ids to the instant at which the permissive certificate
//! parser takes over. Before that instant every node on the network rejects
//! certificates with a broken leading proof extension; from that instant on,
//! every node accepts them. The switch is timed network-wide, never
//! negotiated per connection.
//!
//! The schedule is a plain value handed to the upgrader at construction.
//! Nothing global, nothing parsed lazily, nothing that can panic on first
//! use.
//!
//! ## JSON form
//!
//! ```json
//! {
//!   "default": "2020-12-05T05:00:00Z",
//!   "networks": { "1000": "10000-12-01T00:00:00Z", "12345": "2024-01-01T00:00:00Z" }
//! }
//! ```
//!
//! Years beyond 9999 are written with an explicit `+` sign by chrono
//! (`+10000-12-01T00:00:00Z`); both forms are accepted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::config::{
    NETWORK_ID_CAMINO, NETWORK_ID_COLUMBUS, NETWORK_ID_FUJI, NETWORK_ID_KOPERNIKUS,
    NETWORK_ID_MAINNET,
};
use crate::staking::ParseMode;

/// Errors building an [`UpgradeSchedule`].
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The document is not valid JSON or doesn't have the expected shape.
    #[error("malformed upgrade schedule: {0}")]
    Json(#[from] serde_json::Error),

    /// A network key is not a decimal u32.
    #[error("invalid network id {0:?} in upgrade schedule")]
    InvalidNetworkId(String),

    /// A timestamp could not be parsed as RFC 3339.
    #[error("invalid timestamp {value:?} for {key}: {reason}")]
    InvalidTimestamp {
        /// Which entry (`default` or a network id).
        key: String,
        /// The offending value.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// A compiled-in date was out of range. Only reachable if the constants
    /// below are edited into nonsense.
    #[error("invalid built-in date {0}-{1:02}-{2:02}")]
    InvalidBuiltinDate(i32, u32, u32),
}

/// Per-network upgrade epochs with a fallback for unknown networks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeSchedule {
    default_epoch: DateTime<Utc>,
    epochs: HashMap<u32, DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ScheduleDocument {
    default: String,
    #[serde(default)]
    networks: HashMap<String, String>,
}

fn utc_midnight(year: i32, month: u32, day: u32) -> Result<DateTime<Utc>, ScheduleError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or(ScheduleError::InvalidBuiltinDate(year, month, day))
}

fn parse_instant(key: &str, value: &str) -> Result<DateTime<Utc>, ScheduleError> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|first| {
            // Five-digit years only parse with an explicit sign.
            format!("+{value}").parse::<DateTime<Utc>>().map_err(|_| first)
        })
        .map_err(|e| ScheduleError::InvalidTimestamp {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

impl UpgradeSchedule {
    /// A schedule with a single epoch for every network.
    pub fn uniform(epoch: DateTime<Utc>) -> Self {
        Self {
            default_epoch: epoch,
            epochs: HashMap::new(),
        }
    }

    /// The compiled-in schedule.
    ///
    /// Unknown networks (local and custom ones included) have been past
    /// their epoch since 2020-12-05 05:00 UTC. The public networks are held
    /// at 10000-12-01, i.e. "not yet decided".
    pub fn builtin() -> Result<Self, ScheduleError> {
        let default_epoch = utc_midnight(2020, 12, 5)? + chrono::Duration::hours(5);
        let unreachable = utc_midnight(10_000, 12, 1)?;

        let epochs = [
            NETWORK_ID_MAINNET,
            NETWORK_ID_FUJI,
            NETWORK_ID_CAMINO,
            NETWORK_ID_COLUMBUS,
            NETWORK_ID_KOPERNIKUS,
        ]
        .into_iter()
        .map(|id| (id, unreachable))
        .collect();

        Ok(Self {
            default_epoch,
            epochs,
        })
    }

    /// Parse a schedule from its JSON form (see module docs).
    pub fn from_json(json: &str) -> Result<Self, ScheduleError> {
        let doc: ScheduleDocument = serde_json::from_str(json)?;
        let default_epoch = parse_instant("default", &doc.default)?;

        let mut epochs = HashMap::with_capacity(doc.networks.len());
        for (key, value) in &doc.networks {
            let id: u32 = key
                .parse()
                .map_err(|_| ScheduleError::InvalidNetworkId(key.clone()))?;
            epochs.insert(id, parse_instant(key, value)?);
        }

        Ok(Self {
            default_epoch,
            epochs,
        })
    }

    /// Override (or add) the epoch of one network.
    pub fn with_epoch(mut self, network_id: u32, epoch: DateTime<Utc>) -> Self {
        self.epochs.insert(network_id, epoch);
        self
    }

    /// The permissive-parser epoch for `network_id`.
    pub fn epoch(&self, network_id: u32) -> DateTime<Utc> {
        self.epochs
            .get(&network_id)
            .copied()
            .unwrap_or(self.default_epoch)
    }

    /// Parse mode for an instant relative to an epoch. The epoch itself
    /// already counts as "after".
    pub fn mode_at(epoch: DateTime<Utc>, now: DateTime<Utc>) -> ParseMode {
        if now < epoch {
            ParseMode::Strict
        } else {
            ParseMode::Permissive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NETWORK_ID_LOCAL;
    use chrono::Duration;

    #[test]
    fn builtin_holds_public_networks_back() {
        let schedule = UpgradeSchedule::builtin().unwrap();
        let far = schedule.epoch(NETWORK_ID_CAMINO);
        assert_eq!(far, utc_midnight(10_000, 12, 1).unwrap());
        assert_eq!(schedule.epoch(NETWORK_ID_MAINNET), far);
        assert_eq!(
            schedule.epoch(NETWORK_ID_LOCAL).to_rfc3339(),
            "2020-12-05T05:00:00+00:00"
        );
    }

    #[test]
    fn from_json_reads_default_and_overrides() {
        let json = r#"{
            "default": "2021-01-01T00:00:00Z",
            "networks": { "1000": "10000-12-01T00:00:00Z", "7": "2030-06-01T12:00:00+02:00" }
        }"#;
        let schedule = UpgradeSchedule::from_json(json).unwrap();

        assert_eq!(schedule.epoch(42).to_rfc3339(), "2021-01-01T00:00:00+00:00");
        assert_eq!(schedule.epoch(7).to_rfc3339(), "2030-06-01T10:00:00+00:00");
        assert_eq!(
            schedule.epoch(NETWORK_ID_CAMINO),
            UpgradeSchedule::builtin().unwrap().epoch(NETWORK_ID_CAMINO)
        );
    }

    #[test]
    fn from_json_rejects_bad_network_key() {
        let json = r#"{ "default": "2021-01-01T00:00:00Z", "networks": { "camino": "2021-01-01T00:00:00Z" } }"#;
        assert!(matches!(
            UpgradeSchedule::from_json(json),
            Err(ScheduleError::InvalidNetworkId(k)) if k == "camino"
        ));
    }

    #[test]
    fn from_json_rejects_bad_timestamp() {
        let json = r#"{ "default": "yesterday" }"#;
        assert!(matches!(
            UpgradeSchedule::from_json(json),
            Err(ScheduleError::InvalidTimestamp { key, .. }) if key == "default"
        ));
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(matches!(
            UpgradeSchedule::from_json("not json"),
            Err(ScheduleError::Json(_))
        ));
    }

    #[test]
    fn epoch_boundary_is_inclusive() {
        let epoch = utc_midnight(2025, 3, 1).unwrap();
        assert_eq!(
            UpgradeSchedule::mode_at(epoch, epoch - Duration::seconds(1)),
            ParseMode::Strict
        );
        assert_eq!(UpgradeSchedule::mode_at(epoch, epoch), ParseMode::Permissive);
        assert_eq!(
            UpgradeSchedule::mode_at(epoch, epoch + Duration::seconds(1)),
            ParseMode::Permissive
        );
    }

    #[test]
    fn with_epoch_overrides_single_network() {
        let early = utc_midnight(2001, 1, 1).unwrap();
        let schedule = UpgradeSchedule::builtin()
            .unwrap()
            .with_epoch(NETWORK_ID_CAMINO, early);
        assert_eq!(schedule.epoch(NETWORK_ID_CAMINO), early);
        assert_ne!(schedule.epoch(NETWORK_ID_COLUMBUS), early);
    }
}
