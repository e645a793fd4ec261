//! Region data model
//!
//! - `Event` / `Location`: map items returned by the backend for a region
//! - `RegionData`: one network result set
//! - `CachedRegionSnapshot`: a result set tagged with the center and time it was captured for

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::clock::Timestamp;
use crate::constants::SNAPSHOT_SCHEMA_VERSION;
use crate::geo::GeoPoint;

/// An event pinned on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub position: GeoPoint,
    /// Primary thumbnail shown on the map marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Backend fields the cache carries through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A venue or place pinned on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub position: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    pub fn new(id: impl Into<String>, title: impl Into<String>, position: GeoPoint) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            position,
            image_url: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_image(mut self, uri: impl Into<String>) -> Self {
        self.image_url = Some(uri.into());
        self
    }
}

impl Location {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: GeoPoint) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            image_url: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_image(mut self, uri: impl Into<String>) -> Self {
        self.image_url = Some(uri.into());
        self
    }
}

/// The events and locations of one region, as returned by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionData {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl RegionData {
    pub fn new(events: Vec<Event>, locations: Vec<Location>) -> Self {
        Self { events, locations }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.locations.is_empty()
    }
}

/// A persisted region result set.
///
/// Snapshots are immutable: the store shares them behind `Arc` and replaces
/// the whole value on every save, so events and locations always come from the
/// same fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRegionSnapshot {
    version: u32,
    events: Vec<Event>,
    locations: Vec<Location>,
    center: GeoPoint,
    captured_at: Timestamp,
}

impl CachedRegionSnapshot {
    pub fn new(data: RegionData, center: GeoPoint, captured_at: Timestamp) -> Self {
        Self {
            version: SNAPSHOT_SCHEMA_VERSION,
            events: data.events,
            locations: data.locations,
            center,
            captured_at,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    /// Age at `now`; a capture time in the future counts as age zero
    pub fn age_ms(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.captured_at)
    }

    /// Copy the result set out for delivery to a caller
    pub fn to_region_data(&self) -> RegionData {
        RegionData {
            events: self.events.clone(),
            locations: self.locations.clone(),
        }
    }

    /// Primary image URIs of all events and locations, deduplicated, in order
    pub fn image_uris(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.events
            .iter()
            .filter_map(|e| e.image_url.as_deref())
            .chain(self.locations.iter().filter_map(|l| l.image_url.as_deref()))
            .filter(|uri| !uri.is_empty())
            .filter(|uri| seen.insert(*uri))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CachedRegionSnapshot {
        let center = GeoPoint::new(-80.19, 25.77);
        let events = vec![
            Event::new("e1", "Beach cleanup", center).with_image("https://img/a.jpg"),
            Event::new("e2", "Jazz night", center).with_image("https://img/b.jpg"),
            Event::new("e3", "No image", center),
        ];
        let locations = vec![
            Location::new("l1", "Pier", center).with_image("https://img/a.jpg"),
            Location::new("l2", "Park", center).with_image(""),
        ];
        CachedRegionSnapshot::new(RegionData::new(events, locations), center, 10_000)
    }

    #[test]
    fn test_image_uris_are_deduplicated_in_order() {
        assert_eq!(
            sample().image_uris(),
            vec!["https://img/a.jpg".to_string(), "https://img/b.jpg".to_string()]
        );
    }

    #[test]
    fn test_age_saturates_for_future_capture() {
        let snapshot = sample();
        assert_eq!(snapshot.age_ms(15_000), 5_000);
        assert_eq!(snapshot.age_ms(5_000), 0);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["capturedAt"], 10_000);
        assert_eq!(json["center"]["longitude"], -80.19);
        assert_eq!(json["events"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_backend_fields_survive_round_trip() {
        let raw = r#"{"id":"e9","title":"Gala","position":{"longitude":1.0,"latitude":2.0},"price":25,"host":{"name":"Ana"}}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.extra["price"], 25);
        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["host"]["name"], "Ana");
    }
}
