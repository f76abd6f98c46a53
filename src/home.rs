//! # Home Location Store
//!
//! The single persisted reference point ("home") and its change broadcast.
//!
//! The store is created once and shared as `Arc<HomeLocationStore>` with
//! every page that shows distances. `set` and `clear` write through to a
//! [`HomeBackend`] and then call every subscriber synchronously. The store
//! only announces *that* home changed; subscribers re-run enrichment on
//! their own data.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{LatLng, Result, SchoolMapError};

// ============================================================================
// Types
// ============================================================================

/// User-designated reference coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeLocation {
    pub postcode: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl HomeLocation {
    pub fn new(postcode: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            postcode: postcode.to_string(),
            latitude,
            longitude,
        }
    }

    pub fn location(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// Handle returned by [`HomeLocationStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(Option<&HomeLocation>) + Send + Sync>;

// ============================================================================
// Backends
// ============================================================================

/// Durable storage for the single home key.
pub trait HomeBackend: Send {
    /// Read the stored value, if any.
    fn load(&mut self) -> Result<Option<HomeLocation>>;

    /// Replace the stored value.
    fn save(&mut self, home: &HomeLocation) -> Result<()>;

    /// Delete the stored value. Deleting an absent value is not an error.
    fn remove(&mut self) -> Result<()>;
}

/// Backend that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryHomeBackend {
    value: Option<HomeLocation>,
}

impl MemoryHomeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-seeded with a value, as if persisted by an earlier run.
    pub fn with_value(home: HomeLocation) -> Self {
        Self { value: Some(home) }
    }
}

impl HomeBackend for MemoryHomeBackend {
    fn load(&mut self) -> Result<Option<HomeLocation>> {
        Ok(self.value.clone())
    }

    fn save(&mut self, home: &HomeLocation) -> Result<()> {
        self.value = Some(home.clone());
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        self.value = None;
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

struct StoreState {
    current: Option<HomeLocation>,
    backend: Box<dyn HomeBackend>,
}

/// Process-wide home location with a typed subscription list.
pub struct HomeLocationStore {
    state: Mutex<StoreState>,
    listeners: Mutex<BTreeMap<SubscriptionId, Listener>>,
    next_id: AtomicU64,
}

impl HomeLocationStore {
    /// Open the store, loading any persisted value from `backend`.
    pub fn open<B: HomeBackend + 'static>(mut backend: B) -> Result<Self> {
        let current = backend.load()?;
        match &current {
            Some(home) => info!("[HomeLocationStore] Loaded home {}", home.postcode),
            None => debug!("[HomeLocationStore] No home location stored"),
        }

        Ok(Self {
            state: Mutex::new(StoreState {
                current,
                backend: Box::new(backend),
            }),
            listeners: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Store without durable backing.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(StoreState {
                current: None,
                backend: Box::new(MemoryHomeBackend::new()),
            }),
            listeners: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> Option<HomeLocation> {
        self.lock_state().ok().and_then(|s| s.current.clone())
    }

    /// Persist a new home and notify subscribers.
    ///
    /// Invalid coordinates or a backend failure leave the store unchanged
    /// and notify nobody.
    pub fn set(&self, home: HomeLocation) -> Result<()> {
        if !home.location().is_valid() {
            return Err(SchoolMapError::InvalidCoordinates {
                message: format!("{}, {}", home.latitude, home.longitude),
            });
        }

        {
            let mut state = self.lock_state()?;
            state.backend.save(&home)?;
            state.current = Some(home.clone());
        }

        info!("[HomeLocationStore] Home set to {}", home.postcode);
        self.notify(Some(&home));
        Ok(())
    }

    /// Remove the home and notify subscribers.
    pub fn clear(&self) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            state.backend.remove()?;
            state.current = None;
        }

        info!("[HomeLocationStore] Home cleared");
        self.notify(None);
        Ok(())
    }

    /// Register a callback invoked after every `set`/`clear`.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(Option<&HomeLocation>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.insert(id, Arc::new(listener));
            }
            Err(e) => warn!("[HomeLocationStore] Listener list poisoned: {}", e),
        }
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(&id);
        }
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn notify(&self, home: Option<&HomeLocation>) {
        // Snapshot so listeners may call back into the store
        let listeners: Vec<Listener> = match self.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(e) => {
                warn!("[HomeLocationStore] Listener list poisoned: {}", e);
                return;
            }
        };

        debug!(
            "[HomeLocationStore] Notifying {} subscribers",
            listeners.len()
        );
        for listener in listeners {
            listener(home);
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|e| SchoolMapError::Internal {
            message: format!("home store lock poisoned: {}", e),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
