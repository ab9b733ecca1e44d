//! Cached access to the TMDB endpoints the views use.
//!
//! Successful responses are memoized per logical request for the lifetime of the
//! catalog. There is no eviction: the map only shrinks through [`MovieCatalog::clear_cache`].
//! Failures are never cached, and two overlapping misses for the same key both hit
//! the network.

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::models::{DetailsPayload, MovieDetails, MovieResponse};
use crate::tmdb::TmdbApi;

pub const IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";
pub const BACKDROP_BASE: &str = "https://image.tmdb.org/t/p/w1280";
pub const POSTER_PLACEHOLDER: &str = "/assets/placeholder-movie.jpg";
pub const BACKDROP_PLACEHOLDER: &str = "/assets/placeholder-backdrop.jpg";

pub const MAX_CAST: usize = 10;
pub const MAX_CREW: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Popular(u32),
    Search { query: String, page: u32 },
    Details(i64),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Popular(page) => write!(f, "popular_{page}"),
            CacheKey::Search { query, page } => write!(f, "search_{query}_{page}"),
            CacheKey::Details(id) => write!(f, "details_{id}"),
        }
    }
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Page(Arc<MovieResponse>),
    Details(Arc<MovieDetails>),
}

trait Cached: Sized {
    fn into_entry(value: Arc<Self>) -> CacheEntry;
    fn from_entry(entry: &CacheEntry) -> Option<Arc<Self>>;
}

impl Cached for MovieResponse {
    fn into_entry(value: Arc<Self>) -> CacheEntry {
        CacheEntry::Page(value)
    }

    fn from_entry(entry: &CacheEntry) -> Option<Arc<Self>> {
        match entry {
            CacheEntry::Page(p) => Some(p.clone()),
            CacheEntry::Details(_) => None,
        }
    }
}

impl Cached for MovieDetails {
    fn into_entry(value: Arc<Self>) -> CacheEntry {
        CacheEntry::Details(value)
    }

    fn from_entry(entry: &CacheEntry) -> Option<Arc<Self>> {
        match entry {
            CacheEntry::Details(d) => Some(d.clone()),
            CacheEntry::Page(_) => None,
        }
    }
}

pub struct MovieCatalog {
    api: Arc<dyn TmdbApi>,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
    loading: watch::Sender<bool>,
    in_flight: AtomicUsize,
}

/// Keeps the loading flag raised while alive. Dropping the last guard lowers it,
/// including when the request future is cancelled mid-flight.
struct InFlight<'a> {
    catalog: &'a MovieCatalog,
}

impl<'a> InFlight<'a> {
    fn begin(catalog: &'a MovieCatalog) -> Self {
        catalog.loading.send_if_modified(|loading| {
            catalog.in_flight.fetch_add(1, Ordering::SeqCst);
            let changed = !*loading;
            *loading = true;
            changed
        });
        Self { catalog }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let in_flight = &self.catalog.in_flight;
        self.catalog.loading.send_if_modified(|loading| {
            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                *loading = false;
                true
            } else {
                false
            }
        });
    }
}

impl MovieCatalog {
    pub fn new(api: Arc<dyn TmdbApi>) -> Self {
        let (loading, _) = watch::channel(false);
        Self {
            api,
            cache: Mutex::new(HashMap::new()),
            loading,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub async fn fetch_popular(&self, page: u32) -> Result<Arc<MovieResponse>> {
        self.get_or_fetch(CacheKey::Popular(page), self.api.popular(page))
            .await
    }

    /// Blank queries mean "show popular".
    pub async fn search(&self, query: &str, page: u32) -> Result<Arc<MovieResponse>> {
        if query.trim().is_empty() {
            return self.fetch_popular(page).await;
        }
        let key = CacheKey::Search {
            query: query.to_string(),
            page,
        };
        self.get_or_fetch(key, self.api.search_movies(query, page))
            .await
    }

    pub async fn fetch_details(&self, id: i64) -> Result<Arc<MovieDetails>> {
        let fetch = async move {
            let payload = self.api.movie_with_credits(id).await?;
            Ok(merge_credits(payload))
        };
        self.get_or_fetch(CacheKey::Details(id), fetch).await
    }

    pub fn image_url(&self, path: &str) -> String {
        image_url(path)
    }

    pub async fn clear_cache(&self) {
        let mut cache = self.cache.lock().await;
        info!("Clearing {} cached responses", cache.len());
        cache.clear();
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Shared loading signal: true while at least one request is outstanding.
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    async fn get_or_fetch<T, F>(&self, key: CacheKey, fetch: F) -> Result<Arc<T>>
    where
        T: Cached,
        F: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.cache.lock().await.get(&key).and_then(T::from_entry) {
            debug!(key = %key, "cache hit");
            return Ok(hit);
        }

        debug!(key = %key, "cache miss, fetching");
        let _in_flight = InFlight::begin(self);
        let value = match fetch.await {
            Ok(v) => Arc::new(v),
            Err(e) => {
                warn!(key = %key, "TMDB request failed: {:#}", e);
                return Err(e);
            }
        };
        self.cache
            .lock()
            .await
            .insert(key, T::into_entry(value.clone()));
        Ok(value)
    }
}

pub fn image_url(path: &str) -> String {
    if path.is_empty() {
        POSTER_PLACEHOLDER.to_string()
    } else {
        format!("{IMAGE_BASE}{path}")
    }
}

pub fn backdrop_url(path: &str) -> String {
    if path.is_empty() {
        BACKDROP_PLACEHOLDER.to_string()
    } else {
        format!("{BACKDROP_BASE}{path}")
    }
}

fn merge_credits(payload: DetailsPayload) -> MovieDetails {
    let DetailsPayload {
        mut details,
        credits,
    } = payload;
    let credits = credits.unwrap_or_default();
    details.cast = credits.cast.into_iter().take(MAX_CAST).collect();
    details.crew = credits.crew.into_iter().take(MAX_CREW).collect();
    if details.movie.genre_ids.is_empty() {
        details.movie.genre_ids = details.genres.iter().map(|g| g.id).collect();
    }
    details
}
