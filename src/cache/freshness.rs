//! Cache freshness policy
//!
//! Decides whether a viewport can be served from the cached region snapshot.
//! Pure and deterministic: no I/O, no clock reads, safe to call on every
//! viewport change.

use serde::Serialize;
use std::fmt;

use crate::clock::Timestamp;
use crate::constants::DEFAULT_EXPIRY_WINDOW_MS;
use crate::geo::GeoPoint;
use crate::region::CachedRegionSnapshot;

/// Outcome of a freshness check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessDecision {
    /// Snapshot is young enough and close enough
    Hit,
    /// Snapshot is young enough but was captured for a different area
    Stale,
    /// No usable snapshot (absent or expired)
    Miss,
}

impl FreshnessDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreshnessDecision::Hit => "hit",
            FreshnessDecision::Stale => "stale",
            FreshnessDecision::Miss => "miss",
        }
    }
}

impl fmt::Display for FreshnessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age/distance policy for region snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    expiry_window_ms: u64,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRY_WINDOW_MS)
    }
}

impl FreshnessPolicy {
    pub const fn new(expiry_window_ms: u64) -> Self {
        Self { expiry_window_ms }
    }

    pub fn expiry_window_ms(&self) -> u64 {
        self.expiry_window_ms
    }

    /// True once a snapshot captured at `captured_at` is past the window at `now`
    pub fn is_expired(&self, captured_at: Timestamp, now: Timestamp) -> bool {
        now.saturating_sub(captured_at) > self.expiry_window_ms
    }

    /// Classify `snapshot` for a request at `requested_center` with tolerance `radius_km`.
    ///
    /// - absent → `Miss`
    /// - age strictly greater than the window → `Miss`
    /// - distance strictly greater than the radius → `Stale`
    /// - otherwise → `Hit`
    ///
    /// A negative or NaN radius is treated as zero.
    pub fn evaluate(
        &self,
        snapshot: Option<&CachedRegionSnapshot>,
        requested_center: GeoPoint,
        radius_km: f64,
        now: Timestamp,
    ) -> FreshnessDecision {
        let Some(snapshot) = snapshot else {
            return FreshnessDecision::Miss;
        };

        if self.is_expired(snapshot.captured_at(), now) {
            return FreshnessDecision::Miss;
        }

        // f64::max returns the non-NaN operand
        let radius_km = radius_km.max(0.0);
        let distance_km = snapshot.center().distance_km(&requested_center);
        if distance_km > radius_km {
            return FreshnessDecision::Stale;
        }

        FreshnessDecision::Hit
    }
}
