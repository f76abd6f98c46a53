//! School records as returned by the school API.
//!
//! Field names follow the API's JSON (`urn`, `type`, `ofsted_rating`, ...).
//! Metric columns the engine never reads are kept verbatim in
//! [`SchoolRecord::metrics`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{LatLng, SchoolMapError};

/// Admissions policy value marking a selective (grammar) school.
pub const SELECTIVE_POLICY: &str = "Selective";

// ============================================================================
// Records
// ============================================================================

/// A school as returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRecord {
    /// Unique Reference Number
    pub urn: u32,
    pub name: String,
    /// Establishment type label, e.g. "Academy converter", "Other independent school"
    #[serde(rename = "type", default)]
    pub school_type: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub admissions_policy: Option<String>,
    #[serde(default)]
    pub ofsted_rating: Option<String>,
    #[serde(default)]
    pub ofsted_date: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub age_low: Option<u8>,
    #[serde(default)]
    pub age_high: Option<u8>,
    #[serde(default)]
    pub num_pupils: Option<u32>,
    #[serde(default)]
    pub ks2_reading: Option<f64>,
    #[serde(default)]
    pub ks2_maths: Option<f64>,
    #[serde(default)]
    pub ks4_attainment8: Option<f64>,
    #[serde(default)]
    pub ks4_progress8: Option<f64>,
    #[serde(default)]
    pub fsm_percent: Option<f64>,
    /// Distance from the query center in km (radius searches only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    /// Distance from the home location in km (client-derived)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_from_home: Option<f64>,
    /// Remaining columns (destinations, ethnicity breakdown, ...)
    #[serde(flatten)]
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

impl SchoolRecord {
    /// Minimal record, mostly useful for tests and fixtures.
    pub fn new(urn: u32, name: &str) -> Self {
        Self {
            urn,
            name: name.to_string(),
            school_type: None,
            phase: None,
            admissions_policy: None,
            ofsted_rating: None,
            ofsted_date: None,
            postcode: None,
            latitude: None,
            longitude: None,
            age_low: None,
            age_high: None,
            num_pupils: None,
            ks2_reading: None,
            ks2_maths: None,
            ks4_attainment8: None,
            ks4_progress8: None,
            fsm_percent: None,
            distance_km: None,
            distance_from_home: None,
            metrics: serde_json::Map::new(),
        }
    }

    /// Builder-style coordinate setter.
    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Coordinates, when both are present.
    pub fn location(&self) -> Option<LatLng> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
            _ => None,
        }
    }

    /// Whether the type label names an independent school.
    pub fn is_independent(&self) -> bool {
        self.school_type
            .as_deref()
            .map(|t| t.to_lowercase().contains("independent"))
            .unwrap_or(false)
    }

    /// Selective admissions and not independent.
    pub fn is_grammar(&self) -> bool {
        self.admissions_policy.as_deref() == Some(SELECTIVE_POLICY) && !self.is_independent()
    }
}

/// One year of admissions outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchmentEntry {
    pub year: i32,
    /// Furthest distance (miles) at which a place was offered
    #[serde(default)]
    pub last_distance_offered: Option<f64>,
    #[serde(default)]
    pub offers_made: Option<u32>,
    #[serde(default)]
    pub applications: Option<u32>,
}

/// Full detail for a single school, including admissions history.
///
/// The API orders `catchment` newest year first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolDetail {
    #[serde(flatten)]
    pub school: SchoolRecord,
    #[serde(default)]
    pub catchment: Vec<CatchmentEntry>,
}

// ============================================================================
// Filter Enums
// ============================================================================

/// Education phase, as used in the `phase` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "Primary")]
    Primary,
    #[serde(rename = "Secondary")]
    Secondary,
    #[serde(rename = "All-through")]
    AllThrough,
    #[serde(rename = "Nursery")]
    Nursery,
    #[serde(rename = "16 plus")]
    SixteenPlus,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Primary,
        Phase::Secondary,
        Phase::AllThrough,
        Phase::Nursery,
        Phase::SixteenPlus,
    ];

    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Primary => "Primary",
            Phase::Secondary => "Secondary",
            Phase::AllThrough => "All-through",
            Phase::Nursery => "Nursery",
            Phase::SixteenPlus => "16 plus",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = SchoolMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SchoolMapError::Config {
                message: format!("unknown phase: {}", s),
            })
    }
}

/// Inspection rating, as used in the `rating` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    #[serde(rename = "Outstanding")]
    Outstanding,
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Requires improvement")]
    RequiresImprovement,
    #[serde(rename = "Inadequate")]
    Inadequate,
}

impl Rating {
    pub const ALL: [Rating; 4] = [
        Rating::Outstanding,
        Rating::Good,
        Rating::RequiresImprovement,
        Rating::Inadequate,
    ];

    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Outstanding => "Outstanding",
            Rating::Good => "Good",
            Rating::RequiresImprovement => "Requires improvement",
            Rating::Inadequate => "Inadequate",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = SchoolMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rating::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SchoolMapError::Config {
                message: format!("unknown rating: {}", s),
            })
    }
}
