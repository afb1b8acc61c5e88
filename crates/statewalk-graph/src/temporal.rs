//! Validity intervals for state snapshots.
//!
//! States are valid over `[tmin, tmax)`: the state is known to hold at
//! `tmin` and not known to hold at `tmax`, so abutting intervals never both
//! contain the same instant. The closed convention is available only as an
//! explicit [`Bounds::Closed`].

use crate::error::GraphError;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub type Instant = DateTime<Utc>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bounds {
    /// `tmin <= t < tmax`
    #[default]
    HalfOpen,
    /// `tmin <= t <= tmax`
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub tmin: Instant,
    pub tmax: Instant,
}

impl Interval {
    pub fn new(tmin: Instant, tmax: Instant) -> Result<Self, GraphError> {
        if tmin > tmax {
            return Err(GraphError::InvalidInterval {
                tmin: format_instant(tmin),
                tmax: format_instant(tmax),
            });
        }
        Ok(Self { tmin, tmax })
    }

    /// Parse both endpoints from their stored string form.
    pub fn parse(tmin: &str, tmax: &str) -> Result<Self, GraphError> {
        Self::new(parse_instant(tmin)?, parse_instant(tmax)?)
    }

    pub fn contains(&self, t: Instant, bounds: Bounds) -> bool {
        match bounds {
            Bounds::HalfOpen => self.tmin <= t && t < self.tmax,
            Bounds::Closed => self.tmin <= t && t <= self.tmax,
        }
    }

    /// Non-empty intersection with `window`.
    pub fn overlaps(&self, window: &Interval, bounds: Bounds) -> bool {
        match bounds {
            Bounds::HalfOpen => self.tmin < window.tmax && self.tmax > window.tmin,
            Bounds::Closed => self.tmin <= window.tmax && self.tmax >= window.tmin,
        }
    }
}

/// Parse an RFC 3339 timestamp or a naive `YYYY-MM-DD HH:MM:SS[.fff]`
/// (taken as UTC). Fractional seconds are kept.
pub fn parse_instant(raw: &str) -> Result<Instant, GraphError> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(t.and_utc());
        }
    }
    Err(GraphError::InvalidTimestamp(raw.to_string()))
}

/// Canonical RFC 3339 form. Sub-second digits appear only when non-zero.
pub fn format_instant(t: Instant) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
