//! # Fetch Scheduling
//!
//! Turns viewport and filter changes into remote fetches.
//!
//! ## Viewport pages
//!
//! [`BoundsFetchScheduler`] is a sans-IO state machine:
//!
//! ```text
//! Idle ──viewport──▶ Debouncing ──deadline──▶ Fetching ──complete──▶ Idle
//!                      ▲    │ viewport (restart)
//!                      └────┘
//! ```
//!
//! Callers feed it `Instant`s and ask [`next_deadline`] when to call
//! [`poll`] again. It never sleeps or spawns.
//!
//! ## Radius pages
//!
//! [`RadiusFetchPlanner`] fetches immediately on every center or filter
//! change.
//!
//! Both stamp each request with a [`RequestToken`]; only a response
//! carrying the most recently issued token is applied.
//!
//! [`next_deadline`]: BoundsFetchScheduler::next_deadline
//! [`poll`]: BoundsFetchScheduler::poll

use std::fmt;
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::filter::RemoteFilters;
use crate::{
    LatLng, MapBounds, RadiusConfig, RadiusQuery, Result, SchedulerConfig, SchoolMapError,
    SchoolRecord, ViewportPage, ViewportQuery,
};

// ============================================================================
// Request Tokens
// ============================================================================

/// Monotonic id stamped on each request of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestToken(u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues tokens for one request stream and answers "is this the newest?".
#[derive(Debug, Default)]
pub struct TokenCounter {
    latest: u64,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> RequestToken {
        self.latest += 1;
        RequestToken(self.latest)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest != 0 && token.0 == self.latest
    }

    pub fn latest(&self) -> Option<RequestToken> {
        (self.latest != 0).then_some(RequestToken(self.latest))
    }
}

// ============================================================================
// Shared Types
// ============================================================================

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// Waiting for the viewport to settle
    Debouncing { deadline: Instant },
    /// A request is outstanding and no newer viewport is pending
    Fetching { token: RequestToken },
}

/// A viewport fetch the caller should execute.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub token: RequestToken,
    pub query: ViewportQuery,
}

/// A radius fetch the caller should execute.
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusRequest {
    pub token: RequestToken,
    pub query: RadiusQuery,
}

/// What to do with a completed fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchDisposition {
    /// Display these records
    Apply(Vec<SchoolRecord>),
    /// Too many matches: show nothing and ask the user to zoom in
    TooMany { total: u32 },
    /// Transport failure: keep the previous display
    Failed(SchoolMapError),
    /// Superseded by a newer request: ignore
    Stale,
}

// ============================================================================
// Bounds Fetch Scheduler
// ============================================================================

/// Debounced, token-guarded viewport fetching.
pub struct BoundsFetchScheduler {
    config: SchedulerConfig,
    latest_bounds: Option<MapBounds>,
    filters: RemoteFilters,
    deadline: Option<Instant>,
    in_flight: Option<RequestToken>,
    tokens: TokenCounter,
    too_many: bool,
}

impl BoundsFetchScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            latest_bounds: None,
            filters: RemoteFilters::default(),
            deadline: None,
            in_flight: None,
            tokens: TokenCounter::new(),
            too_many: false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if let Some(deadline) = self.deadline {
            SchedulerState::Debouncing { deadline }
        } else if let Some(token) = self.in_flight {
            SchedulerState::Fetching { token }
        } else {
            SchedulerState::Idle
        }
    }

    /// Record a settled viewport and (re)start the quiet period.
    pub fn viewport_changed(&mut self, bounds: MapBounds, now: Instant) {
        if !bounds.is_valid() {
            warn!("[BoundsFetchScheduler] Ignoring invalid bounds {:?}", bounds);
            return;
        }
        self.latest_bounds = Some(bounds);
        self.deadline = Some(now + self.config.debounce);
    }

    /// When [`poll`](Self::poll) should next be called, if at all.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Issue the debounced fetch once the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<FetchRequest> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.issue()
            }
            _ => None,
        }
    }

    /// Apply new phase/rating filters.
    ///
    /// With a known viewport this fetches immediately and cancels any
    /// pending quiet period. Without one it only records the filters.
    pub fn filters_changed(&mut self, filters: RemoteFilters) -> Option<FetchRequest> {
        if filters == self.filters {
            return None;
        }
        self.filters = filters;

        if self.latest_bounds.is_none() {
            debug!("[BoundsFetchScheduler] Filters changed before any viewport");
            return None;
        }
        self.deadline = None;
        self.issue()
    }

    /// Fetch again with the latest bounds and filters, bypassing the debounce.
    pub fn refetch(&mut self) -> Option<FetchRequest> {
        self.deadline = None;
        self.issue()
    }

    /// Route a completed fetch.
    pub fn complete(&mut self, token: RequestToken, result: Result<ViewportPage>) -> FetchDisposition {
        if !self.tokens.is_current(token) {
            debug!("[BoundsFetchScheduler] Dropping stale response {}", token);
            return FetchDisposition::Stale;
        }
        self.in_flight = None;

        match result {
            Ok(page) if page.total > self.config.too_many_threshold => {
                info!(
                    "[BoundsFetchScheduler] {} matches exceeds {}, asking to zoom in",
                    page.total, self.config.too_many_threshold
                );
                self.too_many = true;
                FetchDisposition::TooMany { total: page.total }
            }
            Ok(page) => {
                debug!(
                    "[BoundsFetchScheduler] {} applied ({} schools)",
                    token,
                    page.schools.len()
                );
                self.too_many = false;
                FetchDisposition::Apply(page.schools)
            }
            Err(e) => {
                warn!("[BoundsFetchScheduler] Fetch {} failed: {}", token, e);
                FetchDisposition::Failed(e)
            }
        }
    }

    pub fn too_many_schools(&self) -> bool {
        self.too_many
    }

    pub fn latest_bounds(&self) -> Option<MapBounds> {
        self.latest_bounds
    }

    pub fn filters(&self) -> RemoteFilters {
        self.filters
    }

    fn issue(&mut self) -> Option<FetchRequest> {
        let bounds = self.latest_bounds?;
        let token = self.tokens.issue();
        self.in_flight = Some(token);

        debug!(
            "[BoundsFetchScheduler] Fetch {} for {:.4},{:.4} .. {:.4},{:.4}",
            token, bounds.south, bounds.west, bounds.north, bounds.east
        );

        Some(FetchRequest {
            token,
            query: ViewportQuery {
                bounds,
                phase: self.filters.phase,
                rating: self.filters.rating,
                limit: self.config.viewport_limit,
            },
        })
    }
}

// ============================================================================
// Radius Fetch Planner
// ============================================================================

/// Immediate, token-guarded radius fetching.
pub struct RadiusFetchPlanner {
    config: RadiusConfig,
    center: Option<LatLng>,
    filters: RemoteFilters,
    tokens: TokenCounter,
}

impl RadiusFetchPlanner {
    pub fn new(config: RadiusConfig) -> Self {
        Self {
            config,
            center: None,
            filters: RemoteFilters::default(),
            tokens: TokenCounter::new(),
        }
    }

    /// Move the search center and fetch.
    pub fn recenter(&mut self, center: LatLng) -> Option<RadiusRequest> {
        if !center.is_valid() {
            warn!("[RadiusFetchPlanner] Ignoring invalid center {:?}", center);
            return None;
        }
        self.center = Some(center);
        self.refetch()
    }

    /// Apply new filters and refetch at the last center.
    pub fn filters_changed(&mut self, filters: RemoteFilters) -> Option<RadiusRequest> {
        if filters == self.filters {
            return None;
        }
        self.filters = filters;
        self.refetch()
    }

    /// Fetch at the last center, if any.
    pub fn refetch(&mut self) -> Option<RadiusRequest> {
        let center = self.center?;
        let token = self.tokens.issue();
        debug!(
            "[RadiusFetchPlanner] Fetch {} at {:.4},{:.4} r={}km",
            token, center.latitude, center.longitude, self.config.radius_km
        );
        Some(RadiusRequest {
            token,
            query: RadiusQuery {
                center,
                radius_km: self.config.radius_km,
                phase: self.filters.phase,
                rating: self.filters.rating,
                limit: self.config.limit,
            },
        })
    }

    /// Route a completed fetch.
    pub fn complete(
        &mut self,
        token: RequestToken,
        result: Result<Vec<SchoolRecord>>,
    ) -> FetchDisposition {
        if !self.tokens.is_current(token) {
            debug!("[RadiusFetchPlanner] Dropping stale response {}", token);
            return FetchDisposition::Stale;
        }
        match result {
            Ok(schools) => FetchDisposition::Apply(schools),
            Err(e) => {
                warn!("[RadiusFetchPlanner] Fetch {} failed: {}", token, e);
                FetchDisposition::Failed(e)
            }
        }
    }

    pub fn center(&self) -> Option<LatLng> {
        self.center
    }

    pub fn filters(&self) -> RemoteFilters {
        self.filters
    }

    pub fn radius_km(&self) -> f64 {
        self.config.radius_km
    }
}

// ============================================================================
// Tests
// ============================================================================
