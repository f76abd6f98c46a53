//! Marker placement for schools that share a coordinate.
//!
//! Split sites and shared campuses often geocode to the same point. Each
//! repeat is nudged diagonally by a fixed offset so every marker stays
//! clickable. Positions are for rendering only; records are not touched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{LatLng, LayoutConfig, SchoolRecord};

/// Where to draw one school's marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedMarker {
    pub urn: u32,
    pub position: LatLng,
    /// Number of earlier records at the same true coordinate
    pub stack_index: u32,
}

pub struct MarkerLayoutResolver {
    config: LayoutConfig,
}

impl MarkerLayoutResolver {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    /// Place markers in list order. Records without coordinates are skipped.
    pub fn resolve(&self, records: &[SchoolRecord]) -> Vec<PlacedMarker> {
        let mut seen: HashMap<(u64, u64), u32> = HashMap::new();
        let mut markers = Vec::with_capacity(records.len());

        for record in records {
            let Some(location) = record.location() else {
                continue;
            };

            let count = seen.entry(coordinate_key(&location)).or_insert(0);
            let stack_index = *count;
            *count += 1;

            let offset = stack_index as f64 * self.config.offset_degrees;
            markers.push(PlacedMarker {
                urn: record.urn,
                position: LatLng::new(location.latitude + offset, location.longitude + offset),
                stack_index,
            });
        }

        markers
    }
}

impl Default for MarkerLayoutResolver {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

/// Exact-equality key. `-0.0` and `0.0` compare equal, so fold them.
fn coordinate_key(location: &LatLng) -> (u64, u64) {
    let norm = |v: f64| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
    (norm(location.latitude), norm(location.longitude))
}
