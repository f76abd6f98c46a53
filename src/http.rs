//! HTTP client for the school API.
//!
//! Endpoints:
//! - `GET /api/schools/bounds` - bounding-box search, `{total, schools}`
//! - `GET /api/schools` - radius search, nearest first
//! - `GET /api/schools/{urn}` - detail with catchment history
//! - `GET /api/search?q=` - postcode lookup or name search
//!
//! Requests are never retried. A failure is reported once and the caller
//! keeps whatever it was showing.

use futures::future::try_join_all;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::looks_like_postcode;
use crate::{
    ApiConfig, QueryResolution, RadiusQuery, Result, SchoolApi, SchoolDetail, SchoolMapError,
    SchoolRecord, ViewportPage, ViewportQuery,
};

type Params = Vec<(&'static str, String)>;

/// [`SchoolApi`] over HTTP/JSON.
pub struct HttpSchoolApi {
    client: Client,
    base_url: String,
}

impl HttpSchoolApi {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SchoolMapError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        info!("[HttpSchoolApi] Using {}", config.base_url);
        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// Client configured from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(ApiConfig::from_env()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = self.url(path);
        let response = self.client.get(&url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchoolMapError::Http {
                message: format!("{} returned {}", path, status),
                status_code: Some(status.as_u16()),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

/// Query parameters for one longitude range of a viewport query.
fn bounds_params(query: &ViewportQuery, west: f64, east: f64) -> Params {
    let mut params = vec![
        ("lat_min", query.bounds.south.to_string()),
        ("lat_max", query.bounds.north.to_string()),
        ("lng_min", west.to_string()),
        ("lng_max", east.to_string()),
    ];
    if let Some(phase) = query.phase {
        params.push(("phase", phase.as_str().to_string()));
    }
    if let Some(rating) = query.rating {
        params.push(("rating", rating.as_str().to_string()));
    }
    params.push(("limit", query.limit.to_string()));
    params
}

fn radius_params(query: &RadiusQuery) -> Params {
    let mut params = vec![
        ("lat", query.center.latitude.to_string()),
        ("lng", query.center.longitude.to_string()),
        ("radius_km", query.radius_km.to_string()),
    ];
    if let Some(phase) = query.phase {
        params.push(("phase", phase.as_str().to_string()));
    }
    if let Some(rating) = query.rating {
        params.push(("rating", rating.as_str().to_string()));
    }
    params.push(("limit", query.limit.to_string()));
    params
}

/// Combine the halves of an antimeridian-crossing viewport.
fn merge_pages(pages: Vec<ViewportPage>) -> ViewportPage {
    pages.into_iter().fold(ViewportPage::default(), |mut acc, page| {
        acc.total += page.total;
        acc.schools.extend(page.schools);
        acc
    })
}

impl SchoolApi for HttpSchoolApi {
    async fn search_by_viewport(&self, query: &ViewportQuery) -> Result<ViewportPage> {
        let ranges = query.bounds.longitude_ranges();
        if ranges.len() > 1 {
            debug!("[HttpSchoolApi] Viewport wraps the antimeridian, splitting");
        }

        let requests = ranges.into_iter().map(|(west, east)| {
            let params = bounds_params(query, west, east);
            async move { self.get_json::<ViewportPage>("/api/schools/bounds", &params).await }
        });
        let page = merge_pages(try_join_all(requests).await?);

        debug!(
            "[HttpSchoolApi] Bounds search: {} total, {} returned",
            page.total,
            page.schools.len()
        );
        Ok(page)
    }

    async fn search_by_radius(&self, query: &RadiusQuery) -> Result<Vec<SchoolRecord>> {
        let schools: Vec<SchoolRecord> = self
            .get_json("/api/schools", &radius_params(query))
            .await?;
        debug!("[HttpSchoolApi] Radius search: {} schools", schools.len());
        Ok(schools)
    }

    async fn get_detail(&self, urn: u32) -> Result<SchoolDetail> {
        match self
            .get_json::<SchoolDetail>(&format!("/api/schools/{}", urn), &[])
            .await
        {
            Err(SchoolMapError::Http {
                status_code: Some(code),
                ..
            }) if code == StatusCode::NOT_FOUND.as_u16() => Err(SchoolMapError::NotFound { urn }),
            other => other,
        }
    }

    async fn resolve_query(&self, text: &str) -> Result<QueryResolution> {
        debug!(
            "[HttpSchoolApi] Resolving '{}' (postcode-like: {})",
            text,
            looks_like_postcode(text)
        );
        let resolution: QueryResolution = self
            .get_json("/api/search", &[("q", text.trim().to_string())])
            .await?;

        if looks_like_postcode(text) && matches!(resolution, QueryResolution::Name { .. }) {
            warn!("[HttpSchoolApi] Postcode-like '{}' fell back to name search", text);
        }
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LatLng, MapBounds, Phase, Rating};

    fn viewport(bounds: MapBounds) -> ViewportQuery {
        ViewportQuery {
            bounds,
            phase: Some(Phase::Secondary),
            rating: None,
            limit: 1501,
        }
    }

    #[test]
    fn test_bounds_params() {
        let query = viewport(MapBounds::new(51.45, 51.55, -0.2, 0.0));
        let params = bounds_params(&query, -0.2, 0.0);
        assert_eq!(
            params,
            vec![
                ("lat_min", "51.45".to_string()),
                ("lat_max", "51.55".to_string()),
                ("lng_min", "-0.2".to_string()),
                ("lng_max", "0".to_string()),
                ("phase", "Secondary".to_string()),
                ("limit", "1501".to_string()),
            ]
        );
    }

    #[test]
    fn test_radius_params() {
        let query = RadiusQuery {
            center: LatLng::new(51.5, -0.12),
            radius_km: 5.0,
            phase: None,
            rating: Some(Rating::RequiresImprovement),
            limit: 200,
        };
        let params = radius_params(&query);
        assert_eq!(params[0], ("lat", "51.5".to_string()));
        assert_eq!(params[2], ("radius_km", "5".to_string()));
        assert_eq!(params[3], ("rating", "Requires improvement".to_string()));
        assert_eq!(params[4], ("limit", "200".to_string()));
    }

    #[test]
    fn test_merge_pages() {
        let merged = merge_pages(vec![
            ViewportPage {
                total: 2,
                schools: vec![SchoolRecord::new(1, "A"), SchoolRecord::new(2, "B")],
            },
            ViewportPage {
                total: 1,
                schools: vec![SchoolRecord::new(3, "C")],
            },
        ]);
        assert_eq!(merged.total, 3);
        assert_eq!(merged.schools.len(), 3);
    }

    #[test]
    fn test_url_building() {
        let api = HttpSchoolApi::new(ApiConfig::with_base_url("http://localhost:8000/").unwrap())
            .unwrap();
        assert_eq!(
            api.url("/api/schools/100000"),
            "http://localhost:8000/api/schools/100000"
        );
    }
}
