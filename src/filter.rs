//! # Filter Pipeline
//!
//! Two kinds of filters apply to a result set:
//!
//! - **Remote** ([`RemoteFilters`]): phase and rating. These only become
//!   query parameters; the engine never re-checks them locally.
//! - **Local** ([`CategoryToggles`], viewport pages only): hide
//!   independent and/or grammar schools from the already-fetched set
//!   without another round trip.

use serde::{Deserialize, Serialize};

use crate::{Phase, Rating, SchoolRecord};

/// Filters forwarded to the school API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFilters {
    pub phase: Option<Phase>,
    pub rating: Option<Rating>,
}

impl RemoteFilters {
    pub fn new(phase: Option<Phase>, rating: Option<Rating>) -> Self {
        Self { phase, rating }
    }
}

/// Local category visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryToggles {
    /// Default: true
    pub show_independent: bool,
    /// Default: true
    pub show_grammar: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            show_independent: true,
            show_grammar: true,
        }
    }
}

impl CategoryToggles {
    /// Whether a record of this category is visible.
    pub fn allows(&self, category: SchoolCategory) -> bool {
        match category {
            SchoolCategory::Independent => self.show_independent,
            SchoolCategory::Grammar => self.show_grammar,
            SchoolCategory::Other => true,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.show_independent && self.show_grammar
    }
}

/// Mutually exclusive local classification of a school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchoolCategory {
    Independent,
    Grammar,
    Other,
}

impl SchoolCategory {
    pub fn classify(record: &SchoolRecord) -> Self {
        if record.is_independent() {
            SchoolCategory::Independent
        } else if record.is_grammar() {
            SchoolCategory::Grammar
        } else {
            SchoolCategory::Other
        }
    }
}

/// All filter state owned by a page.
///
/// Radius pages carry `radius_km`; viewport pages use `toggles`. The
/// unused half stays at its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub remote: RemoteFilters,
    pub toggles: CategoryToggles,
    pub radius_km: Option<f64>,
}

impl FilterState {
    pub fn viewport() -> Self {
        Self {
            remote: RemoteFilters::default(),
            toggles: CategoryToggles::default(),
            radius_km: None,
        }
    }

    pub fn radius(radius_km: f64) -> Self {
        Self {
            remote: RemoteFilters::default(),
            toggles: CategoryToggles::default(),
            radius_km: Some(radius_km),
        }
    }
}

/// Applies the local stage of the filter pipeline.
pub struct FilterPipeline;

impl FilterPipeline {
    /// Drop records whose category is toggled off. Order is preserved.
    pub fn apply(records: &[SchoolRecord], toggles: &CategoryToggles) -> Vec<SchoolRecord> {
        if toggles.is_passthrough() {
            return records.to_vec();
        }
        records
            .iter()
            .filter(|r| toggles.allows(SchoolCategory::classify(r)))
            .cloned()
            .collect()
    }
}
