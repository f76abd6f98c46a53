//! Contract with the remote school API.
//!
//! [`SchoolApi`] is what the controller's commands are executed against.
//! The HTTP implementation lives in `http` (feature `http`); tests use
//! in-process fakes.

use serde::{Deserialize, Serialize};

use crate::{LatLng, MapBounds, Phase, Rating, Result, SchoolDetail, SchoolRecord};

/// Parameters of a bounding-box search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportQuery {
    pub bounds: MapBounds,
    pub phase: Option<Phase>,
    pub rating: Option<Rating>,
    pub limit: u32,
}

/// Parameters of a fixed-radius search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiusQuery {
    pub center: LatLng,
    pub radius_km: f64,
    pub phase: Option<Phase>,
    pub rating: Option<Rating>,
    pub limit: u32,
}

/// Bounding-box search result.
///
/// `total` counts every match; `schools` may be truncated by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewportPage {
    pub total: u32,
    pub schools: Vec<SchoolRecord>,
}

/// Outcome of free-text search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryResolution {
    /// The text was a postcode that resolved to a coordinate
    Postcode {
        postcode: String,
        latitude: f64,
        longitude: f64,
    },
    /// Name match (also the fallback when a postcode lookup fails)
    Name {
        query: String,
        #[serde(default)]
        results: Vec<SchoolRecord>,
    },
}

impl QueryResolution {
    /// Resolved coordinate, for postcode results.
    pub fn location(&self) -> Option<LatLng> {
        match self {
            QueryResolution::Postcode {
                latitude,
                longitude,
                ..
            } => Some(LatLng::new(*latitude, *longitude)),
            QueryResolution::Name { .. } => None,
        }
    }
}

/// The remote school API.
///
/// Futures are not required to be `Send`; the session drives them on a
/// single task.
#[allow(async_fn_in_trait)]
pub trait SchoolApi {
    /// Schools inside a bounding box.
    async fn search_by_viewport(&self, query: &ViewportQuery) -> Result<ViewportPage>;

    /// Schools within `radius_km` of a point, nearest first, with `distance_km`.
    async fn search_by_radius(&self, query: &RadiusQuery) -> Result<Vec<SchoolRecord>>;

    /// One school with its admissions history.
    async fn get_detail(&self, urn: u32) -> Result<SchoolDetail>;

    /// Postcode lookup or name search.
    async fn resolve_query(&self, text: &str) -> Result<QueryResolution>;
}

/// Cheap client-side UK postcode check, matching the server's heuristic.
pub fn looks_like_postcode(text: &str) -> bool {
    let cleaned: Vec<char> = text
        .trim()
        .chars()
        .filter(|c| *c != ' ')
        .flat_map(|c| c.to_uppercase())
        .collect();

    (5..=8).contains(&cleaned.len())
        && cleaned.first().is_some_and(|c| c.is_alphabetic())
        && cleaned.iter().any(|c| c.is_ascii_digit())
        && cleaned.last().is_some_and(|c| c.is_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postcode_heuristic() {
        assert!(looks_like_postcode("SW1A 1AA"));
        assert!(looks_like_postcode("e1 6an"));
        assert!(looks_like_postcode("  M1 1AE "));
        assert!(!looks_like_postcode("Camden"));
        assert!(!looks_like_postcode("St Mary's Primary"));
        assert!(!looks_like_postcode("12345"));
        assert!(!looks_like_postcode("SW1A 1A1"));
        assert!(!looks_like_postcode("W1"));
    }

    #[test]
    fn test_decode_postcode_resolution() {
        let json = r#"{"type": "postcode", "postcode": "SW1A 1AA", "latitude": 51.501, "longitude": -0.1416}"#;
        let resolution: QueryResolution = serde_json::from_str(json).unwrap();
        assert_eq!(resolution.location(), Some(LatLng::new(51.501, -0.1416)));
    }

    #[test]
    fn test_decode_name_resolution() {
        let json = r#"{"type": "name", "query": "cass", "results": [{"urn": 100000, "name": "Sir John Cass"}]}"#;
        let resolution: QueryResolution = serde_json::from_str(json).unwrap();
        match resolution {
            QueryResolution::Name { query, results } => {
                assert_eq!(query, "cass");
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].urn, 100000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_viewport_page() {
        let json = r#"{"total": 1600, "schools": []}"#;
        let page: ViewportPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.total, 1600);
        assert!(page.schools.is_empty());
    }
}
