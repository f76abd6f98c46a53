//! # Map Session
//!
//! Async driver for a [`ViewController`].
//!
//! [`MapSession::run`] is a single task that selects over three sources:
//!
//! 1. UI events from the [`SessionHandle`]
//! 2. The scheduler's debounce deadline
//! 3. In-flight API calls
//!
//! After each step it publishes a fresh [`DisplaySnapshot`] on a `watch`
//! channel (only when something visible changed). Home store
//! notifications are bridged into the event queue, so a home change made
//! on another page re-derives this page too.
//!
//! The session never spawns. API futures need not be `Send`.
//!
//! ```rust,ignore
//! let (session, handle) = MapSession::new(api, store, PageMode::Viewport, EngineConfig::default());
//! tokio::task::spawn_local(session.run());
//! handle.send(UiEvent::ViewportChanged(bounds))?;
//! ```

use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::controller::{Command, DisplaySnapshot, PageMode, ResolvePurpose, ViewController};
use crate::filter::CategoryToggles;
use crate::scheduler::RequestToken;
use crate::{
    EngineConfig, HomeLocation, HomeLocationStore, LatLng, MapBounds, Phase, QueryResolution,
    Rating, Result, SchoolApi, SchoolDetail, SchoolMapError, SchoolRecord, SubscriptionId,
    ViewportPage,
};

/// Something the user did.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// The map settled on new bounds
    ViewportChanged(MapBounds),
    SetPhase(Option<Phase>),
    SetRating(Option<Rating>),
    SetCategoryToggles(CategoryToggles),
    /// Explicit search center (radius pages)
    SetCenter(LatLng),
    /// Search box submission
    Search(String),
    /// Home input submission
    SetHomeFromQuery(String),
    ClearHome,
    SelectSchool(u32),
    ClearSelection,
    /// Forwarded from the home store subscription
    HomeChanged(Option<HomeLocation>),
}

/// UI-side handle: send events, watch snapshots.
///
/// Dropping every handle ends [`MapSession::run`].
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<UiEvent>,
    snapshots: watch::Receiver<DisplaySnapshot>,
}

impl SessionHandle {
    pub fn send(&self, event: UiEvent) -> Result<()> {
        self.events.send(event).map_err(|_| SchoolMapError::Internal {
            message: "map session has stopped".to_string(),
        })
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> DisplaySnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver for awaiting changes.
    pub fn snapshots(&self) -> watch::Receiver<DisplaySnapshot> {
        self.snapshots.clone()
    }
}

enum Completion {
    Viewport(RequestToken, Result<ViewportPage>),
    Radius(RequestToken, Result<Vec<SchoolRecord>>),
    Detail(RequestToken, Result<SchoolDetail>),
    Resolve(RequestToken, ResolvePurpose, Result<QueryResolution>),
}

/// Event loop binding a controller to a [`SchoolApi`].
pub struct MapSession<A> {
    api: Arc<A>,
    controller: ViewController,
    events: mpsc::UnboundedReceiver<UiEvent>,
    bridge: mpsc::WeakUnboundedSender<UiEvent>,
    snapshots: watch::Sender<DisplaySnapshot>,
}

impl<A: SchoolApi + 'static> MapSession<A> {
    pub fn new(
        api: A,
        store: Arc<HomeLocationStore>,
        mode: PageMode,
        config: EngineConfig,
    ) -> (Self, SessionHandle) {
        let controller = ViewController::new(mode, config, store);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(controller.snapshot());

        let session = Self {
            api: Arc::new(api),
            controller,
            events: events_rx,
            bridge: events_tx.downgrade(),
            snapshots: snapshots_tx,
        };
        let handle = SessionHandle {
            events: events_tx,
            snapshots: snapshots_rx,
        };
        (session, handle)
    }

    /// Run until every [`SessionHandle`] is dropped.
    pub async fn run(mut self) {
        let subscription = self.subscribe_home();
        let mut in_flight: FuturesUnordered<LocalBoxFuture<'static, Completion>> =
            FuturesUnordered::new();

        info!("[MapSession] Started ({:?})", self.controller.mode());
        for command in self.controller.start() {
            in_flight.push(self.execute(command));
        }
        self.publish();

        loop {
            let deadline = self.controller.next_deadline().map(Instant::from_std);

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => {
                        for command in self.handle_event(event) {
                            in_flight.push(self.execute(command));
                        }
                    }
                    None => break,
                },
                _ = sleep_until(deadline), if deadline.is_some() => {
                    if let Some(command) = self.controller.poll(now()) {
                        in_flight.push(self.execute(command));
                    }
                }
                Some(completion) = in_flight.next(), if !in_flight.is_empty() => {
                    for command in self.complete(completion) {
                        in_flight.push(self.execute(command));
                    }
                }
            }

            self.publish();
        }

        self.controller.store().unsubscribe(subscription);
        info!(
            "[MapSession] Stopped, {} requests abandoned",
            in_flight.len()
        );
    }

    fn subscribe_home(&self) -> SubscriptionId {
        let bridge = self.bridge.clone();
        self.controller.store().subscribe(move |home| {
            if let Some(tx) = bridge.upgrade() {
                let _ = tx.send(UiEvent::HomeChanged(home.cloned()));
            }
        })
    }

    fn handle_event(&mut self, event: UiEvent) -> Vec<Command> {
        debug!("[MapSession] {:?}", event);
        let c = &mut self.controller;
        match event {
            UiEvent::ViewportChanged(bounds) => {
                c.viewport_changed(bounds, now());
                Vec::new()
            }
            UiEvent::SetPhase(phase) => c.set_phase(phase).into_iter().collect(),
            UiEvent::SetRating(rating) => c.set_rating(rating).into_iter().collect(),
            UiEvent::SetCategoryToggles(toggles) => {
                c.set_category_toggles(toggles);
                Vec::new()
            }
            UiEvent::SetCenter(center) => c.set_center(center).into_iter().collect(),
            UiEvent::Search(text) => c.search(&text).into_iter().collect(),
            UiEvent::SetHomeFromQuery(text) => c.set_home_from_query(&text).into_iter().collect(),
            UiEvent::ClearHome => c.clear_home(),
            UiEvent::SelectSchool(urn) => vec![c.select_school(urn)],
            UiEvent::ClearSelection => {
                c.clear_selection();
                Vec::new()
            }
            UiEvent::HomeChanged(home) => c.on_home_changed(home),
        }
    }

    fn complete(&mut self, completion: Completion) -> Vec<Command> {
        let c = &mut self.controller;
        match completion {
            Completion::Viewport(token, result) => {
                c.apply_viewport_response(token, result);
                Vec::new()
            }
            Completion::Radius(token, result) => {
                c.apply_radius_response(token, result);
                Vec::new()
            }
            Completion::Detail(token, result) => {
                c.apply_detail_response(token, result);
                Vec::new()
            }
            Completion::Resolve(token, purpose, result) => {
                c.apply_resolution(token, purpose, result)
            }
        }
    }

    fn execute(&self, command: Command) -> LocalBoxFuture<'static, Completion> {
        let api = Arc::clone(&self.api);
        match command {
            Command::FetchViewport(request) => async move {
                let result = api.search_by_viewport(&request.query).await;
                Completion::Viewport(request.token, result)
            }
            .boxed_local(),
            Command::FetchRadius(request) => async move {
                let result = api.search_by_radius(&request.query).await;
                Completion::Radius(request.token, result)
            }
            .boxed_local(),
            Command::FetchDetail { token, urn } => async move {
                let result = api.get_detail(urn).await;
                Completion::Detail(token, result)
            }
            .boxed_local(),
            Command::ResolveQuery {
                token,
                text,
                purpose,
            } => async move {
                let result = api.resolve_query(&text).await;
                Completion::Resolve(token, purpose, result)
            }
            .boxed_local(),
        }
    }

    fn publish(&self) {
        let next = self.controller.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
