//! # Catchment Circle
//!
//! Derives the admissions-distance overlay for a selected school.
//!
//! The API returns catchment history newest year first. Recent years
//! frequently have no published distance yet, so the resolver takes the
//! first entry that has one rather than strictly the latest year.

use geo::{Destination, Haversine, LineString, Point, Polygon};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::geo_utils::miles_to_km;
use crate::{CatchmentEntry, LatLng, SchoolDetail};

/// A radius overlay drawn around a school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchmentCircle {
    pub urn: u32,
    pub center: LatLng,
    pub radius_miles: f64,
    pub year: i32,
    /// e.g. "0.8 mi (2023)"
    pub label: String,
}

impl CatchmentCircle {
    pub fn radius_km(&self) -> f64 {
        miles_to_km(self.radius_miles)
    }

    /// Closed ring approximating the circle on the sphere.
    ///
    /// `segments` is clamped to at least 8. Coordinates are (lng, lat).
    pub fn to_polygon(&self, segments: usize) -> Polygon<f64> {
        let segments = segments.max(8);
        let radius_m = self.radius_km() * 1000.0;
        let origin = Point::new(self.center.longitude, self.center.latitude);

        let mut ring: Vec<(f64, f64)> = (0..segments)
            .map(|i| {
                let bearing = 360.0 * i as f64 / segments as f64;
                let p = Haversine::destination(origin, bearing, radius_m);
                (p.x(), p.y())
            })
            .collect();
        if let Some(&first) = ring.first() {
            ring.push(first);
        }

        Polygon::new(LineString::from(ring), vec![])
    }
}

pub struct CatchmentCircleResolver;

impl CatchmentCircleResolver {
    /// First history entry with a published distance.
    pub fn select_entry(history: &[CatchmentEntry]) -> Option<&CatchmentEntry> {
        history.iter().find(|e| e.last_distance_offered.is_some())
    }

    /// Circle for a loaded detail, if one qualifies.
    pub fn resolve(detail: &SchoolDetail) -> Option<CatchmentCircle> {
        let center = detail.school.location()?;
        let entry = Self::select_entry(&detail.catchment)?;
        let radius_miles = entry.last_distance_offered?;

        debug!(
            "[CatchmentCircleResolver] urn {}: {} mi from {}",
            detail.school.urn, radius_miles, entry.year
        );

        Some(CatchmentCircle {
            urn: detail.school.urn,
            center,
            radius_miles,
            year: entry.year,
            label: format!("{} mi ({})", format_miles(radius_miles), entry.year),
        })
    }
}

/// Up to two decimals, trailing zeros dropped.
pub fn format_miles(miles: f64) -> String {
    let fixed = format!("{:.2}", miles);
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}
