//! Shared UI state with synchronous, ordered change notification.
//!
//! Every mutation swaps in a new immutable [`AppState`] snapshot and queues it for
//! delivery. Snapshots reach subscribers in the order mutations were applied, even
//! when a subscriber mutates the store from inside its own callback: that mutation
//! is queued behind the snapshot currently being delivered.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::{Movie, MovieDetails};
use crate::storage::{read_json, write_json, KeyValueStore, FAVORITES_KEY};

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub movies: Vec<Movie>,
    pub selected_movie: Option<MovieDetails>,
    pub search_query: String,
    pub current_page: u32,
    pub total_pages: u32,
    pub favorite_movies: Vec<i64>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            movies: Vec::new(),
            selected_movie: None,
            search_query: String::new(),
            current_page: 1,
            total_pages: 1,
            favorite_movies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&AppState) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    /// Version current at subscription time; older broadcasts are skipped.
    joined_at: u64,
    callback: Callback,
}

struct Delivery {
    version: u64,
    state: Arc<AppState>,
    /// `Some` for the initial snapshot handed to a single new subscriber.
    target: Option<SubscriptionId>,
}

struct Inner {
    state: Arc<AppState>,
    version: u64,
    next_id: u64,
    subscribers: Vec<Subscriber>,
    pending: VecDeque<Delivery>,
    delivering: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    storage: Arc<dyn KeyValueStore>,
}

/// Cheap to clone; clones share one state.
#[derive(Clone)]
pub struct AppStore {
    shared: Arc<Shared>,
}

impl AppStore {
    /// Builds the store with favorites restored from `storage`.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let favorite_movies = read_json::<Vec<i64>>(storage.as_ref(), FAVORITES_KEY)
            .map(dedupe)
            .unwrap_or_default();
        debug!("Restored {} favorite movies", favorite_movies.len());
        let state = AppState {
            favorite_movies,
            ..AppState::default()
        };
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: Arc::new(state),
                    version: 0,
                    next_id: 0,
                    subscribers: Vec::new(),
                    pending: VecDeque::new(),
                    delivering: false,
                }),
                storage,
            }),
        }
    }

    pub fn current_state(&self) -> Arc<AppState> {
        self.lock().state.clone()
    }

    pub fn set_movies(&self, movies: Vec<Movie>, current_page: u32, total_pages: u32) {
        self.apply(|state| {
            Some(AppState {
                movies,
                current_page,
                total_pages,
                ..state.clone()
            })
        });
    }

    pub fn set_selected_movie(&self, movie: Option<MovieDetails>) {
        self.apply(|state| {
            Some(AppState {
                selected_movie: movie,
                ..state.clone()
            })
        });
    }

    pub fn set_search_query(&self, query: impl Into<String>) {
        let search_query = query.into();
        self.apply(|state| {
            Some(AppState {
                search_query,
                ..state.clone()
            })
        });
    }

    /// Adding an id that is already a favorite changes nothing and broadcasts nothing.
    pub fn add_to_favorites(&self, id: i64) {
        self.apply(|state| {
            if state.favorite_movies.contains(&id) {
                return None;
            }
            let mut favorite_movies = state.favorite_movies.clone();
            favorite_movies.push(id);
            self.persist_favorites(&favorite_movies);
            Some(AppState {
                favorite_movies,
                ..state.clone()
            })
        });
    }

    pub fn remove_from_favorites(&self, id: i64) {
        self.apply(|state| {
            let favorite_movies: Vec<i64> = state
                .favorite_movies
                .iter()
                .copied()
                .filter(|f| *f != id)
                .collect();
            self.persist_favorites(&favorite_movies);
            Some(AppState {
                favorite_movies,
                ..state.clone()
            })
        });
    }

    /// Emits whether `id` is a favorite now, then again on every broadcast.
    pub fn is_favorite(&self, id: i64) -> StateStream<bool> {
        self.stream(move |state| state.favorite_movies.contains(&id))
    }

    /// Registers `callback`, invoking it with the current snapshot right away and with
    /// every later snapshot in mutation order until [`AppStore::unsubscribe`].
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AppState) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.lock();
            let id = SubscriptionId(inner.next_id);
            inner.next_id += 1;
            let version = inner.version;
            inner.subscribers.push(Subscriber {
                id,
                joined_at: version,
                callback: Arc::new(callback),
            });
            let state = inner.state.clone();
            inner.pending.push_back(Delivery {
                version,
                state,
                target: Some(id),
            });
            id
        };
        self.drain();
        id
    }

    /// Returns whether `id` was still registered. Calling it twice is harmless.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id);
        before != inner.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// A projection of the state that yields one value per broadcast.
    pub fn stream<T, F>(&self, project: F) -> StateStream<T>
    where
        T: Send + 'static,
        F: Fn(&AppState) -> T + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |state| {
            let _ = tx.send(project(state));
        });
        StateStream {
            rx,
            store: self.clone(),
            id,
            closed: false,
        }
    }

    fn persist_favorites(&self, favorites: &[i64]) {
        if let Err(e) = write_json(self.shared.storage.as_ref(), FAVORITES_KEY, favorites) {
            warn!("Failed to persist favorites: {:#}", e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, mutate: impl FnOnce(&AppState) -> Option<AppState>) {
        {
            let mut inner = self.lock();
            let Some(next) = mutate(&inner.state) else {
                return;
            };
            let next = Arc::new(next);
            inner.version += 1;
            inner.state = next.clone();
            let version = inner.version;
            inner.pending.push_back(Delivery {
                version,
                state: next,
                target: None,
            });
        }
        self.drain();
    }

    /// Delivers queued snapshots unless another call further up the stack already is.
    fn drain(&self) {
        {
            let mut inner = self.lock();
            if inner.delivering {
                return;
            }
            inner.delivering = true;
        }
        let _unwind = DeliveryGuard(self);
        loop {
            let (delivery, recipients) = {
                let mut inner = self.lock();
                let Some(delivery) = inner.pending.pop_front() else {
                    inner.delivering = false;
                    return;
                };
                let recipients: Vec<(SubscriptionId, Callback)> = inner
                    .subscribers
                    .iter()
                    .filter(|s| match delivery.target {
                        Some(target) => s.id == target,
                        None => s.joined_at < delivery.version,
                    })
                    .map(|s| (s.id, s.callback.clone()))
                    .collect();
                (delivery, recipients)
            };
            for (id, callback) in recipients {
                // A callback earlier in this round may have unsubscribed this one.
                let still_subscribed = self.lock().subscribers.iter().any(|s| s.id == id);
                if still_subscribed {
                    callback(&delivery.state);
                }
            }
        }
    }
}

/// Releases the delivery flag when a callback panics, so later mutations still drain.
struct DeliveryGuard<'a>(&'a AppStore);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().delivering = false;
        }
    }
}

/// Values projected from each snapshot. Dropping or closing it unsubscribes.
pub struct StateStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
    store: AppStore,
    id: SubscriptionId,
    closed: bool,
}

impl<T> StateStream<T> {
    /// Waits for the next value; `None` once closed and drained.
    pub async fn next(&mut self) -> Option<T> {
        if self.closed {
            return self.rx.try_recv().ok();
        }
        self.rx.recv().await
    }

    /// The next already-emitted value, if any.
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drops every value emitted so far and returns the newest.
    pub fn latest(&mut self) -> Option<T> {
        let mut last = None;
        while let Ok(value) = self.rx.try_recv() {
            last = Some(value);
        }
        last
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.store.unsubscribe(self.id);
        }
    }
}

impl<T> Drop for StateStream<T> {
    fn drop(&mut self) {
        self.close();
    }
}

fn dedupe(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}
