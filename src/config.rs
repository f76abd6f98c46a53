//! Engine configuration.
//!
//! Each struct documents its defaults. [`ApiConfig::from_env`] is the only
//! place that reads the environment.

use std::time::Duration;

use crate::{Result, SchoolMapError};

/// Configuration for the viewport fetch scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Quiet period after the last viewport change before fetching.
    /// Default: 300 ms
    pub debounce: Duration,

    /// Result count above which the set is discarded and the user is asked
    /// to zoom in.
    /// Default: 1500
    pub too_many_threshold: u32,

    /// Row limit sent with viewport queries. One more than the threshold so
    /// the server can signal overflow without returning everything.
    /// Default: 1501
    pub viewport_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            too_many_threshold: 1500,
            viewport_limit: 1501,
        }
    }
}

/// Configuration for fixed-radius pages.
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusConfig {
    /// Search radius around the current center.
    /// Default: 5.0 km
    pub radius_km: f64,

    /// Maximum results requested.
    /// Default: 200
    pub limit: u32,
}

impl Default for RadiusConfig {
    fn default() -> Self {
        Self {
            radius_km: 5.0,
            limit: 200,
        }
    }
}

/// Configuration for marker layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Offset applied per duplicate, in degrees on both axes.
    /// Default: 0.00008 (~9 m)
    pub offset_degrees: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            offset_degrees: 0.00008,
        }
    }
}

/// Configuration for the HTTP school API client.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Base URL without trailing slash.
    /// Default: http://127.0.0.1:8000
    pub base_url: String,

    /// Per-request timeout.
    /// Default: 30 s
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    /// Read `SCHOOLMAP_API_URL` and `SCHOOLMAP_HTTP_TIMEOUT_SECS`, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SCHOOLMAP_API_URL") {
            config.base_url = normalize_base_url(&url)?;
        }

        if let Ok(raw) = std::env::var("SCHOOLMAP_HTTP_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| SchoolMapError::Config {
                message: format!("SCHOOLMAP_HTTP_TIMEOUT_SECS is not a number: {}", raw),
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Config pointing at a specific base URL.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            ..Self::default()
        })
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(SchoolMapError::Config {
            message: format!("API URL must start with http:// or https://: {}", raw),
        });
    }
    Ok(trimmed.to_string())
}

/// All engine configuration in one place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub radius: RadiusConfig,
    pub layout: LayoutConfig,
}
