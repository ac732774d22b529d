//! Zones and the station lookup service a zone may offer.

use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Finds where a ship can be brought back to.
pub trait StationLookup: Send + Sync {
    /// Position of the station nearest to `from` whose faction matches.
    ///
    /// With no eligible station the origin is returned.
    fn nearest_station_position(&self, from: Vec3, faction: &str) -> Vec3;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub faction: String,
    pub position: Vec3,
}

impl Station {
    pub fn new(name: impl Into<String>, faction: impl Into<String>, position: Vec3) -> Self {
        Self {
            name: name.into(),
            faction: faction.into(),
            position,
        }
    }
}

/// Linear scan over a zone's stations. Zones hold a handful, never thousands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationIndex {
    stations: Vec<Station>,
}

impl StationIndex {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }
}

impl StationLookup for StationIndex {
    fn nearest_station_position(&self, from: Vec3, faction: &str) -> Vec3 {
        self.stations
            .iter()
            .filter(|s| s.faction == faction)
            .min_by(|a, b| {
                a.position
                    .distance_squared(from)
                    .total_cmp(&b.position.distance_squared(from))
            })
            .map(|s| s.position)
            .unwrap_or(Vec3::ZERO)
    }
}

/// A named region of space, optionally served by a station lookup.
pub struct Zone {
    name: String,
    lookup: Option<Arc<dyn StationLookup>>,
}

impl Zone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lookup: None,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn StationLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn station_lookup(&self) -> Option<Arc<dyn StationLookup>> {
        self.lookup.clone()
    }
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("name", &self.name)
            .field("has_lookup", &self.lookup.is_some())
            .finish()
    }
}
