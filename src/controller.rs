//! # View Controller
//!
//! Per-page composition of the engine. A controller owns everything a map
//! page shows and turns UI intents into [`Command`]s for the caller to
//! execute against a [`SchoolApi`](crate::SchoolApi). Completed commands
//! come back through the `apply_*` methods.
//!
//! The controller keeps the last server result untouched (`base`) and
//! derives the visible list from it on every read:
//!
//! ```text
//! base ─▶ FilterPipeline ─▶ enrich(home) ─▶ schools ─▶ MarkerLayoutResolver ─▶ markers
//! ```
//!
//! so toggles and home changes never need a refetch, and clearing home
//! simply drops the derived distances and sort.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::catchment::{CatchmentCircle, CatchmentCircleResolver};
use crate::enrich::{enrich, enrich_one};
use crate::filter::{CategoryToggles, FilterPipeline, FilterState, RemoteFilters};
use crate::layout::{MarkerLayoutResolver, PlacedMarker};
use crate::scheduler::{
    BoundsFetchScheduler, FetchDisposition, FetchRequest, RadiusFetchPlanner, RadiusRequest,
    RequestToken, TokenCounter,
};
use crate::{
    EngineConfig, HomeLocation, HomeLocationStore, LatLng, MapBounds, Phase, QueryResolution,
    Rating, Result, SchoolDetail, SchoolMapError, SchoolRecord, ViewportPage,
};

// ============================================================================
// Types
// ============================================================================

/// Which kind of map page this controller drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageMode {
    /// Results follow the visible map area
    #[default]
    Viewport,
    /// Results are a fixed radius around a chosen center
    Radius,
}

/// Why free text is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvePurpose {
    /// Search box: move the map / search center
    Recenter,
    /// Home input: store the resolved postcode as home
    SetHome,
}

/// Remote work requested by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FetchViewport(FetchRequest),
    FetchRadius(RadiusRequest),
    FetchDetail {
        token: RequestToken,
        urn: u32,
    },
    ResolveQuery {
        token: RequestToken,
        text: String,
        purpose: ResolvePurpose,
    },
}

/// Selected school detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DetailState {
    #[default]
    None,
    Loading {
        urn: u32,
    },
    Loaded {
        detail: Box<SchoolDetail>,
    },
    NotFound {
        urn: u32,
    },
    Failed {
        urn: u32,
        message: String,
    },
}

/// Everything the UI renders, derived in one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplaySnapshot {
    pub mode: PageMode,
    /// Visible records in display order
    pub schools: Vec<SchoolRecord>,
    /// One marker per visible record with coordinates
    pub markers: Vec<PlacedMarker>,
    pub too_many_schools: bool,
    pub catchment: Option<CatchmentCircle>,
    pub detail: DetailState,
    pub home: Option<HomeLocation>,
    /// Radius mode: search center. Viewport mode: requested map center.
    pub center: Option<LatLng>,
    /// Name matches from the search box
    pub search_results: Vec<SchoolRecord>,
    /// Last fetch failure, cleared by the next successful fetch
    pub error: Option<String>,
    /// Inline message for the home input
    pub home_error: Option<String>,
}

// ============================================================================
// View Controller
// ============================================================================

pub struct ViewController {
    mode: PageMode,
    store: Arc<HomeLocationStore>,
    scheduler: BoundsFetchScheduler,
    radius: RadiusFetchPlanner,
    layout: MarkerLayoutResolver,
    filters: FilterState,

    /// Last applied server result, unfiltered and unenriched
    base: Vec<SchoolRecord>,
    home: Option<HomeLocation>,
    center: Option<LatLng>,
    /// Radius mode: the user picked the center, so home changes don't move it
    center_explicit: bool,

    detail_tokens: TokenCounter,
    pending_detail: Option<(RequestToken, u32)>,
    detail: DetailState,
    catchment: Option<CatchmentCircle>,

    resolve_tokens: TokenCounter,
    /// One in-flight lookup per purpose; a search never supersedes a home lookup
    pending_search: Option<RequestToken>,
    pending_home: Option<RequestToken>,
    search_results: Vec<SchoolRecord>,

    error: Option<String>,
    home_error: Option<String>,
}

impl ViewController {
    pub fn new(mode: PageMode, config: EngineConfig, store: Arc<HomeLocationStore>) -> Self {
        let filters = match mode {
            PageMode::Viewport => FilterState::viewport(),
            PageMode::Radius => FilterState::radius(config.radius.radius_km),
        };
        let home = store.get();

        Self {
            mode,
            store,
            scheduler: BoundsFetchScheduler::new(config.scheduler),
            radius: RadiusFetchPlanner::new(config.radius),
            layout: MarkerLayoutResolver::new(config.layout),
            filters,
            base: Vec::new(),
            home,
            center: None,
            center_explicit: false,
            detail_tokens: TokenCounter::new(),
            pending_detail: None,
            detail: DetailState::None,
            catchment: None,
            resolve_tokens: TokenCounter::new(),
            pending_search: None,
            pending_home: None,
            search_results: Vec::new(),
            error: None,
            home_error: None,
        }
    }

    pub fn mode(&self) -> PageMode {
        self.mode
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn store(&self) -> &Arc<HomeLocationStore> {
        &self.store
    }

    /// Initial commands. Radius pages default their center to home.
    pub fn start(&mut self) -> Vec<Command> {
        match (self.mode, self.home.as_ref()) {
            (PageMode::Radius, Some(home)) if !self.center_explicit => {
                let center = home.location();
                self.recenter(center).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Viewport
    // ------------------------------------------------------------------------

    pub fn viewport_changed(&mut self, bounds: MapBounds, now: Instant) {
        if self.mode != PageMode::Viewport {
            debug!("[ViewController] Viewport change ignored in radius mode");
            return;
        }
        self.scheduler.viewport_changed(bounds, now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.mode {
            PageMode::Viewport => self.scheduler.next_deadline(),
            PageMode::Radius => None,
        }
    }

    pub fn poll(&mut self, now: Instant) -> Option<Command> {
        self.scheduler.poll(now).map(Command::FetchViewport)
    }

    // ------------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------------

    pub fn set_phase(&mut self, phase: Option<Phase>) -> Option<Command> {
        let remote = RemoteFilters {
            phase,
            ..self.filters.remote
        };
        self.set_remote_filters(remote)
    }

    pub fn set_rating(&mut self, rating: Option<Rating>) -> Option<Command> {
        let remote = RemoteFilters {
            rating,
            ..self.filters.remote
        };
        self.set_remote_filters(remote)
    }

    pub fn set_remote_filters(&mut self, remote: RemoteFilters) -> Option<Command> {
        self.filters.remote = remote;
        match self.mode {
            PageMode::Viewport => self
                .scheduler
                .filters_changed(remote)
                .map(Command::FetchViewport),
            PageMode::Radius => self.radius.filters_changed(remote).map(Command::FetchRadius),
        }
    }

    /// Local toggles; applied to the current set without refetching.
    pub fn set_category_toggles(&mut self, toggles: CategoryToggles) {
        if self.mode != PageMode::Viewport {
            debug!("[ViewController] Category toggles ignored in radius mode");
            return;
        }
        self.filters.toggles = toggles;
    }

    // ------------------------------------------------------------------------
    // Location & Search
    // ------------------------------------------------------------------------

    /// Explicit center (map click, geolocation).
    pub fn set_center(&mut self, center: LatLng) -> Option<Command> {
        if !center.is_valid() {
            warn!("[ViewController] Ignoring invalid center {:?}", center);
            return None;
        }
        self.center_explicit = true;
        self.recenter(center)
    }

    /// Search box submission.
    pub fn search(&mut self, text: &str) -> Option<Command> {
        self.resolve(text, ResolvePurpose::Recenter)
    }

    /// Home input submission.
    pub fn set_home_from_query(&mut self, text: &str) -> Option<Command> {
        self.home_error = None;
        self.resolve(text, ResolvePurpose::SetHome)
    }

    pub fn clear_home(&mut self) -> Vec<Command> {
        if let Err(e) = self.store.clear() {
            warn!("[ViewController] Could not clear home: {}", e);
            self.home_error = Some(e.user_message());
            return Vec::new();
        }
        self.home_error = None;
        self.on_home_changed(None)
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    pub fn select_school(&mut self, urn: u32) -> Command {
        let token = self.detail_tokens.issue();
        self.pending_detail = Some((token, urn));
        self.detail = DetailState::Loading { urn };
        self.catchment = None;
        Command::FetchDetail { token, urn }
    }

    pub fn clear_selection(&mut self) {
        self.pending_detail = None;
        self.detail = DetailState::None;
        self.catchment = None;
    }

    // ------------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------------

    pub fn apply_viewport_response(&mut self, token: RequestToken, result: Result<ViewportPage>) {
        match self.scheduler.complete(token, result) {
            FetchDisposition::Apply(schools) => {
                self.base = schools;
                self.error = None;
            }
            FetchDisposition::TooMany { .. } => {
                self.base.clear();
                self.error = None;
            }
            FetchDisposition::Failed(e) => self.error = Some(failure_message("Viewport fetch", &e)),
            FetchDisposition::Stale => {}
        }
    }

    pub fn apply_radius_response(
        &mut self,
        token: RequestToken,
        result: Result<Vec<SchoolRecord>>,
    ) {
        match self.radius.complete(token, result) {
            FetchDisposition::Apply(schools) => {
                self.base = schools;
                self.error = None;
            }
            FetchDisposition::Failed(e) => self.error = Some(failure_message("Radius fetch", &e)),
            FetchDisposition::TooMany { .. } | FetchDisposition::Stale => {}
        }
    }

    pub fn apply_detail_response(&mut self, token: RequestToken, result: Result<SchoolDetail>) {
        let urn = match self.pending_detail {
            Some((pending, urn)) if pending == token => urn,
            _ => {
                debug!("[ViewController] Dropping stale detail {}", token);
                return;
            }
        };
        self.pending_detail = None;

        match result {
            Ok(mut detail) => {
                if let Some(home) = &self.home {
                    detail.school = enrich_one(detail.school, home);
                }
                self.catchment = CatchmentCircleResolver::resolve(&detail);
                self.detail = DetailState::Loaded {
                    detail: Box::new(detail),
                };
            }
            Err(SchoolMapError::NotFound { .. }) => {
                self.catchment = None;
                self.detail = DetailState::NotFound { urn };
            }
            Err(e) => {
                self.catchment = None;
                self.detail = DetailState::Failed {
                    urn,
                    message: failure_message(&format!("Detail fetch for {}", urn), &e),
                };
            }
        }
    }

    pub fn apply_resolution(
        &mut self,
        token: RequestToken,
        purpose: ResolvePurpose,
        result: Result<QueryResolution>,
    ) -> Vec<Command> {
        let pending = self.pending_resolve(purpose);
        if *pending != Some(token) {
            debug!("[ViewController] Dropping stale {:?} resolution {}", purpose, token);
            return Vec::new();
        }
        *pending = None;

        match (purpose, result) {
            (ResolvePurpose::Recenter, Ok(resolution)) => match resolution.location() {
                Some(center) => {
                    self.search_results.clear();
                    self.set_center(center).into_iter().collect()
                }
                None => {
                    if let QueryResolution::Name { results, .. } = resolution {
                        self.search_results = results;
                    }
                    Vec::new()
                }
            },
            (ResolvePurpose::Recenter, Err(e)) => {
                self.error = Some(e.user_message());
                Vec::new()
            }
            (
                ResolvePurpose::SetHome,
                Ok(QueryResolution::Postcode {
                    postcode,
                    latitude,
                    longitude,
                }),
            ) => {
                let home = HomeLocation::new(&postcode, latitude, longitude);
                match self.store.set(home.clone()) {
                    Ok(()) => {
                        self.home_error = None;
                        self.on_home_changed(Some(home))
                    }
                    Err(e) => {
                        self.home_error = Some(e.user_message());
                        Vec::new()
                    }
                }
            }
            (ResolvePurpose::SetHome, Ok(QueryResolution::Name { query, .. })) => {
                info!("[ViewController] '{}' did not resolve to a postcode", query);
                self.home_error = Some(SchoolMapError::PostcodeNotFound { query }.user_message());
                Vec::new()
            }
            (ResolvePurpose::SetHome, Err(e)) => {
                self.home_error = Some(e.user_message());
                Vec::new()
            }
        }
    }

    /// React to a home change from this or any other page.
    pub fn on_home_changed(&mut self, home: Option<HomeLocation>) -> Vec<Command> {
        if home == self.home {
            return Vec::new();
        }
        self.home = home;

        if let DetailState::Loaded { detail } = &mut self.detail {
            detail.school = match &self.home {
                Some(home) => enrich_one(detail.school.clone(), home),
                None => SchoolRecord {
                    distance_from_home: None,
                    ..detail.school.clone()
                },
            };
        }

        match (self.mode, self.home.as_ref()) {
            (PageMode::Radius, Some(home)) if !self.center_explicit => {
                let center = home.location();
                self.recenter(center).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> DisplaySnapshot {
        let schools = self.visible_schools();
        let markers = self.layout.resolve(&schools);

        DisplaySnapshot {
            mode: self.mode,
            schools,
            markers,
            too_many_schools: self.mode == PageMode::Viewport && self.scheduler.too_many_schools(),
            catchment: self.catchment.clone(),
            detail: self.detail.clone(),
            home: self.home.clone(),
            center: self.center,
            search_results: self.search_results.clone(),
            error: self.error.clone(),
            home_error: self.home_error.clone(),
        }
    }

    fn visible_schools(&self) -> Vec<SchoolRecord> {
        match self.mode {
            PageMode::Viewport => {
                let filtered = FilterPipeline::apply(&self.base, &self.filters.toggles);
                enrich(filtered, self.home.as_ref())
            }
            // Server already sorted by distance_km from the center
            PageMode::Radius => self.base.clone(),
        }
    }

    fn recenter(&mut self, center: LatLng) -> Option<Command> {
        self.center = Some(center);
        match self.mode {
            PageMode::Radius => self.radius.recenter(center).map(Command::FetchRadius),
            // The map pans; the resulting viewport event drives the fetch
            PageMode::Viewport => None,
        }
    }

    fn pending_resolve(&mut self, purpose: ResolvePurpose) -> &mut Option<RequestToken> {
        match purpose {
            ResolvePurpose::Recenter => &mut self.pending_search,
            ResolvePurpose::SetHome => &mut self.pending_home,
        }
    }

    fn resolve(&mut self, text: &str, purpose: ResolvePurpose) -> Option<Command> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let token = self.resolve_tokens.issue();
        *self.pending_resolve(purpose) = Some(token);
        Some(Command::ResolveQuery {
            token,
            text: text.to_string(),
            purpose,
        })
    }
}

/// Log a failed request and return the text to show for it.
///
/// Network failures log at warn level, anything else at error.
fn failure_message(what: &str, e: &SchoolMapError) -> String {
    if e.is_transport() {
        warn!("[ViewController] {} failed: {}", what, e);
    } else {
        error!("[ViewController] {} failed: {}", what, e);
    }
    e.user_message()
}

// ============================================================================
// Tests
// ============================================================================
