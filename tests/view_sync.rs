//! End-to-end tests for `MapSession` against an in-process API.
//!
//! All tests run on a paused tokio clock, so debounce timing is exact and
//! the suite finishes instantly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use schoolmap::{
    CatchmentEntry, DetailState, EngineConfig, HomeLocation, HomeLocationStore, LatLng,
    MapBounds, MapSession, OptionExt, PageMode, Phase, QueryResolution, RadiusQuery, Result,
    SchoolApi, SchoolDetail, SchoolRecord, SessionHandle, UiEvent, ViewportPage,
    ViewportQuery,
};
use tokio::time::{sleep, Instant};

// ============================================================================
// Fake API
// ============================================================================

#[derive(Default)]
struct FakeState {
    viewport_calls: Vec<(Instant, ViewportQuery)>,
    viewport_replies: VecDeque<(Duration, Result<ViewportPage>)>,
    radius_calls: Vec<RadiusQuery>,
    details: HashMap<u32, SchoolDetail>,
    resolutions: HashMap<String, QueryResolution>,
}

#[derive(Clone, Default)]
struct FakeApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    fn reply_viewport(&self, delay: Duration, reply: Result<ViewportPage>) {
        self.state
            .lock()
            .unwrap()
            .viewport_replies
            .push_back((delay, reply));
    }

    fn add_detail(&self, detail: SchoolDetail) {
        self.state
            .lock()
            .unwrap()
            .details
            .insert(detail.school.urn, detail);
    }

    fn add_postcode(&self, postcode: &str, latitude: f64, longitude: f64) {
        self.state.lock().unwrap().resolutions.insert(
            postcode.to_string(),
            QueryResolution::Postcode {
                postcode: postcode.to_string(),
                latitude,
                longitude,
            },
        );
    }

    fn viewport_calls(&self) -> Vec<(Instant, ViewportQuery)> {
        self.state.lock().unwrap().viewport_calls.clone()
    }

    fn radius_calls(&self) -> Vec<RadiusQuery> {
        self.state.lock().unwrap().radius_calls.clone()
    }
}

impl SchoolApi for FakeApi {
    async fn search_by_viewport(&self, query: &ViewportQuery) -> Result<ViewportPage> {
        let (delay, reply) = {
            let mut state = self.state.lock().unwrap();
            state.viewport_calls.push((Instant::now(), query.clone()));
            state
                .viewport_replies
                .pop_front()
                .unwrap_or((Duration::ZERO, Ok(default_page())))
        };
        sleep(delay).await;
        reply
    }

    async fn search_by_radius(&self, query: &RadiusQuery) -> Result<Vec<SchoolRecord>> {
        self.state.lock().unwrap().radius_calls.push(query.clone());
        let mut near = SchoolRecord::new(20, "Radius near").at(51.502, -0.14);
        near.distance_km = Some(0.15);
        let mut far = SchoolRecord::new(21, "Radius far").at(51.52, -0.12);
        far.distance_km = Some(2.5);
        Ok(vec![near, far])
    }

    async fn get_detail(&self, urn: u32) -> Result<SchoolDetail> {
        self.state
            .lock()
            .unwrap()
            .details
            .get(&urn)
            .cloned()
            .ok_or_not_found(urn)
    }

    async fn resolve_query(&self, text: &str) -> Result<QueryResolution> {
        let state = self.state.lock().unwrap();
        Ok(state
            .resolutions
            .get(text)
            .cloned()
            .unwrap_or_else(|| QueryResolution::Name {
                query: text.to_string(),
                results: vec![],
            }))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn bounds(west: f64) -> MapBounds {
    MapBounds::new(51.45, 51.55, west, west + 0.2)
}

fn home() -> HomeLocation {
    HomeLocation::new("SW1A 1AA", 51.5010, -0.1416)
}

/// Server order: far, unlocated, near.
fn default_page() -> ViewportPage {
    ViewportPage {
        total: 3,
        schools: vec![
            SchoolRecord::new(1, "Far").at(51.54, -0.05),
            SchoolRecord::new(2, "Unlocated"),
            SchoolRecord::new(3, "Near").at(51.502, -0.14),
        ],
    }
}

fn urns(handle: &SessionHandle) -> Vec<u32> {
    handle.snapshot().schools.iter().map(|s| s.urn).collect()
}

fn session(
    api: &FakeApi,
    store: &Arc<HomeLocationStore>,
    mode: PageMode,
) -> (MapSession<FakeApi>, SessionHandle) {
    MapSession::new(api.clone(), Arc::clone(store), mode, EngineConfig::default())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_of_viewport_events_fetches_once() {
    init_logging();
    let api = FakeApi::default();
    let store = Arc::new(HomeLocationStore::in_memory());
    let (session, handle) = session(&api, &store, PageMode::Viewport);
    let t0 = Instant::now();

    let driver = {
        let api = api.clone();
        async move {
            handle.send(UiEvent::ViewportChanged(bounds(-0.30))).unwrap();
            sleep(ms(100)).await;
            handle.send(UiEvent::ViewportChanged(bounds(-0.20))).unwrap();
            sleep(ms(50)).await;
            handle.send(UiEvent::ViewportChanged(bounds(-0.10))).unwrap();

            sleep(ms(250)).await;
            assert!(api.viewport_calls().is_empty(), "fetched before settling");

            sleep(ms(1000)).await;
            let calls = api.viewport_calls();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].1.bounds, bounds(-0.10));
            assert!(calls[0].0 >= t0 + ms(450));
            assert_eq!(urns(&handle), vec![1, 2, 3]);
        }
    };

    tokio::join!(session.run(), driver);
}

#[tokio::test(start_paused = true)]
async fn test_stale_response_never_overwrites_newer() {
    init_logging();
    let api = FakeApi::default();
    api.reply_viewport(
        ms(500),
        Ok(ViewportPage {
            total: 1600,
            schools: vec![],
        }),
    );
    api.reply_viewport(ms(10), Ok(default_page()));

    let store = Arc::new(HomeLocationStore::in_memory());
    let (session, handle) = session(&api, &store, PageMode::Viewport);

    let driver = {
        let api = api.clone();
        async move {
            // First fetch issued at 300ms, answers at 800ms
            handle.send(UiEvent::ViewportChanged(bounds(-0.30))).unwrap();
            sleep(ms(350)).await;
            // Second fetch issued at 650ms, answers at 660ms
            handle.send(UiEvent::ViewportChanged(bounds(-0.10))).unwrap();

            sleep(ms(350)).await;
            assert_eq!(api.viewport_calls().len(), 2);
            assert_eq!(urns(&handle), vec![1, 2, 3]);

            sleep(ms(300)).await;
            let snapshot = handle.snapshot();
            assert!(!snapshot.too_many_schools);
            assert_eq!(snapshot.schools.len(), 3);
        }
    };

    tokio::join!(session.run(), driver);
}

#[tokio::test(start_paused = true)]
async fn test_too_many_then_zoom_in() {
    init_logging();
    let api = FakeApi::default();
    api.reply_viewport(
        Duration::ZERO,
        Ok(ViewportPage {
            total: 1600,
            schools: vec![],
        }),
    );
    api.reply_viewport(Duration::ZERO, Ok(default_page()));

    let store = Arc::new(HomeLocationStore::in_memory());
    let (session, handle) = session(&api, &store, PageMode::Viewport);

    let driver = async move {
        handle.send(UiEvent::ViewportChanged(bounds(-1.0))).unwrap();
        sleep(ms(400)).await;
        let snapshot = handle.snapshot();
        assert!(snapshot.too_many_schools);
        assert!(snapshot.schools.is_empty());

        handle.send(UiEvent::ViewportChanged(bounds(-0.1))).unwrap();
        sleep(ms(400)).await;
        let snapshot = handle.snapshot();
        assert!(!snapshot.too_many_schools);
        assert_eq!(snapshot.schools.len(), 3);
    };

    tokio::join!(session.run(), driver);
}

#[tokio::test(start_paused = true)]
async fn test_filter_change_fetches_immediately() {
    init_logging();
    let api = FakeApi::default();
    let store = Arc::new(HomeLocationStore::in_memory());
    let (session, handle) = session(&api, &store, PageMode::Viewport);

    let driver = {
        let api = api.clone();
        async move {
            handle.send(UiEvent::ViewportChanged(bounds(-0.1))).unwrap();
            sleep(ms(400)).await;
            assert_eq!(api.viewport_calls().len(), 1);

            let changed_at = Instant::now();
            handle
                .send(UiEvent::SetPhase(Some(Phase::Secondary)))
                .unwrap();
            sleep(ms(1)).await;

            let calls = api.viewport_calls();
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[1].1.phase, Some(Phase::Secondary));
            assert!(calls[1].0 - changed_at < ms(1));
        }
    };

    tokio::join!(session.run(), driver);
}

#[tokio::test(start_paused = true)]
async fn test_home_change_from_elsewhere_rederives() {
    init_logging();
    let api = FakeApi::default();
    let store = Arc::new(HomeLocationStore::in_memory());
    let (session, handle) = session(&api, &store, PageMode::Viewport);

    let driver = {
        let store = Arc::clone(&store);
        async move {
            handle.send(UiEvent::ViewportChanged(bounds(-0.2))).unwrap();
            sleep(ms(400)).await;
            assert_eq!(urns(&handle), vec![1, 2, 3]);

            // Another page sets home
            store.set(home()).unwrap();
            sleep(ms(1)).await;
            let snapshot = handle.snapshot();
            assert_eq!(urns(&handle), vec![3, 1, 2]);
            assert!(snapshot.schools[0].distance_from_home.unwrap() < 0.5);
            assert_eq!(snapshot.home, Some(home()));

            store.clear().unwrap();
            sleep(ms(1)).await;
            let snapshot = handle.snapshot();
            assert_eq!(urns(&handle), vec![1, 2, 3]);
            assert!(snapshot
                .schools
                .iter()
                .all(|s| s.distance_from_home.is_none()));

            // Only the initial viewport fetch
            assert_eq!(api.viewport_calls().len(), 1);
        }
    };

    tokio::join!(session.run(), driver);
}

#[tokio::test(start_paused = true)]
async fn test_set_home_from_postcode() {
    init_logging();
    let api = FakeApi::default();
    api.add_postcode("SW1A 1AA", 51.5010, -0.1416);
    let store = Arc::new(HomeLocationStore::in_memory());
    let (session, handle) = session(&api, &store, PageMode::Viewport);

    let driver = {
        let store = Arc::clone(&store);
        async move {
            handle
                .send(UiEvent::SetHomeFromQuery("SW1A 1AA".to_string()))
                .unwrap();
            sleep(ms(1)).await;
            assert_eq!(store.get(), Some(home()));
            assert_eq!(handle.snapshot().home, Some(home()));

            handle
                .send(UiEvent::SetHomeFromQuery("Atlantis".to_string()))
                .unwrap();
            sleep(ms(1)).await;
            assert_eq!(store.get(), Some(home()));
            let snapshot = handle.snapshot();
            assert!(snapshot.home_error.unwrap().contains("Atlantis"));

            handle.send(UiEvent::ClearHome).unwrap();
            sleep(ms(1)).await;
            assert_eq!(store.get(), None);
            assert_eq!(handle.snapshot().home, None);
        }
    };

    tokio::join!(session.run(), driver);
}

#[tokio::test(start_paused = true)]
async fn test_selection_draws_catchment() {
    init_logging();
    let api = FakeApi::default();
    api.add_detail(SchoolDetail {
        school: SchoolRecord::new(3, "Near").at(51.502, -0.14),
        catchment: vec![
            CatchmentEntry {
                year: 2024,
                last_distance_offered: None,
                offers_made: Some(60),
                applications: Some(400),
            },
            CatchmentEntry {
                year: 2023,
                last_distance_offered: Some(0.8),
                offers_made: Some(60),
                applications: Some(380),
            },
        ],
    });
    let store = Arc::new(HomeLocationStore::in_memory());
    let (session, handle) = session(&api, &store, PageMode::Viewport);

    let driver = async move {
        handle.send(UiEvent::SelectSchool(3)).unwrap();
        sleep(ms(1)).await;
        let snapshot = handle.snapshot();
        let circle = snapshot.catchment.unwrap();
        assert_eq!(circle.label, "0.8 mi (2023)");
        assert_eq!(circle.center, LatLng::new(51.502, -0.14));
        assert!(matches!(snapshot.detail, DetailState::Loaded { .. }));

        handle.send(UiEvent::SelectSchool(999)).unwrap();
        sleep(ms(1)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.detail, DetailState::NotFound { urn: 999 });
        assert!(snapshot.catchment.is_none());
    };

    tokio::join!(session.run(), driver);
}

#[tokio::test(start_paused = true)]
async fn test_radius_page_centers_on_home() {
    init_logging();
    let api = FakeApi::default();
    let store = Arc::new(HomeLocationStore::in_memory());
    store.set(home()).unwrap();
    let (session, handle) = session(&api, &store, PageMode::Radius);

    let driver = {
        let api = api.clone();
        async move {
            sleep(ms(1)).await;
            let calls = api.radius_calls();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].center, home().location());
            assert_eq!(calls[0].radius_km, 5.0);

            let snapshot = handle.snapshot();
            assert_eq!(snapshot.schools.len(), 2);
            assert_eq!(snapshot.schools[0].distance_km, Some(0.15));

            handle.send(UiEvent::SetPhase(Some(Phase::Primary))).unwrap();
            sleep(ms(1)).await;
            let calls = api.radius_calls();
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[1].center, home().location());
            assert_eq!(calls[1].phase, Some(Phase::Primary));
        }
    };

    tokio::join!(session.run(), driver);
}

#[tokio::test(start_paused = true)]
async fn test_session_stops_and_unsubscribes() {
    init_logging();
    let api = FakeApi::default();
    let store = Arc::new(HomeLocationStore::in_memory());
    let (session, handle) = session(&api, &store, PageMode::Viewport);

    let driver = async move {
        sleep(ms(1)).await;
        drop(handle);
    };

    tokio::join!(session.run(), driver);
    assert_eq!(store.subscriber_count(), 0);

    // Home changes after the session is gone are harmless
    store.set(home()).unwrap();
}
