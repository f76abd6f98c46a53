//! # schoolmap
//!
//! View-synchronization engine for a school search map.
//!
//! This library keeps four things consistent while the user pans, zooms,
//! searches, filters, or changes their home location:
//! - The map viewport and the debounced remote fetch it triggers
//! - The filtered, sorted result list
//! - Marker positions for schools that share a coordinate
//! - Distances from the persisted home location
//!
//! ## Features
//!
//! - **`persistence`** - SQLite storage for the home location
//! - **`runtime`** - Async [`MapSession`] driver built on tokio
//! - **`http`** - reqwest client for the school API (implies `runtime`)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use schoolmap::{BoundsFetchScheduler, MapBounds, SchedulerConfig};
//!
//! let mut scheduler = BoundsFetchScheduler::new(SchedulerConfig::default());
//! let t0 = Instant::now();
//!
//! scheduler.viewport_changed(MapBounds::new(51.50, 51.52, -0.14, -0.10), t0);
//! assert!(scheduler.poll(t0 + Duration::from_millis(100)).is_none());
//!
//! let request = scheduler.poll(t0 + Duration::from_millis(300)).unwrap();
//! assert_eq!(request.query.bounds.north, 51.52);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, SchoolMapError};

// Configuration structs with documented defaults
pub mod config;
pub use config::{ApiConfig, EngineConfig, LayoutConfig, RadiusConfig, SchedulerConfig};

// Geographic utilities (haversine, rounding, unit conversion)
pub mod geo_utils;

// School records, admissions history, classification enums
pub mod school;
pub use school::{CatchmentEntry, Phase, Rating, SchoolDetail, SchoolRecord};

// Persisted home location with change broadcast
pub mod home;
pub use home::{
    HomeBackend, HomeLocation, HomeLocationStore, MemoryHomeBackend, SubscriptionId,
};

// SQLite backend for the home location
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteHomeBackend;

// Distance-from-home enrichment and sorting
pub mod enrich;
pub use enrich::{enrich, enrich_one};

// Remote and local filters
pub mod filter;
pub use filter::{CategoryToggles, FilterPipeline, FilterState, RemoteFilters, SchoolCategory};

// Marker placement for coincident coordinates
pub mod layout;
pub use layout::{MarkerLayoutResolver, PlacedMarker};

// Catchment circle derived from admissions history
pub mod catchment;
pub use catchment::{CatchmentCircle, CatchmentCircleResolver};

// Remote school API contract
pub mod api;
pub use api::{
    QueryResolution, RadiusQuery, SchoolApi, ViewportPage, ViewportQuery,
};

// Debounced, token-guarded fetch scheduling
pub mod scheduler;
pub use scheduler::{
    BoundsFetchScheduler, FetchDisposition, FetchRequest, RadiusFetchPlanner, RadiusRequest,
    RequestToken, SchedulerState, TokenCounter,
};

// Per-page composition of all of the above
pub mod controller;
pub use controller::{
    Command, DetailState, DisplaySnapshot, PageMode, ResolvePurpose, ViewController,
};

// Async event loop driving a controller
#[cfg(feature = "runtime")]
pub mod session;
#[cfg(feature = "runtime")]
pub use session::{MapSession, SessionHandle, UiEvent};

// HTTP implementation of the school API
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::HttpSchoolApi;

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate.
///
/// # Example
/// ```
/// use schoolmap::LatLng;
/// let point = LatLng::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// The rectangular extent currently visible on the map.
///
/// `west` may be greater than `east` when the viewport crosses the
/// antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapBounds {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl MapBounds {
    /// Create bounds from south, north, west, east edges.
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        Self {
            south,
            north,
            west,
            east,
        }
    }

    /// Whether the bounds are usable for a query.
    pub fn is_valid(&self) -> bool {
        self.south.is_finite()
            && self.north.is_finite()
            && self.west.is_finite()
            && self.east.is_finite()
            && self.south < self.north
    }

    /// True when the viewport crosses ±180° longitude.
    pub fn wraps_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Longitude ranges covered by the viewport, west to east.
    ///
    /// One range normally, two when the viewport wraps.
    pub fn longitude_ranges(&self) -> Vec<(f64, f64)> {
        if self.wraps_antimeridian() {
            vec![(self.west, 180.0), (-180.0, self.east)]
        } else {
            vec![(self.west, self.east)]
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
