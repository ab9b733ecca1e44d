//! The listing and detail flows: fetch through the catalog, then publish into the store.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::catalog::MovieCatalog;
use crate::models::{MovieDetails, MovieResponse};
use crate::store::AppStore;

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq)]
pub enum DetailsOutcome {
    Shown(Arc<MovieDetails>),
    /// The details could not be loaded; the caller should return to the listing.
    NavigateHome,
}

#[derive(Clone)]
pub struct Browser {
    catalog: Arc<MovieCatalog>,
    store: AppStore,
}

impl Browser {
    pub fn new(catalog: Arc<MovieCatalog>, store: AppStore) -> Self {
        Self { catalog, store }
    }

    pub fn catalog(&self) -> &MovieCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &AppStore {
        &self.store
    }

    pub async fn load_popular(&self, page: u32) -> Result<Arc<MovieResponse>> {
        let response = self.catalog.fetch_popular(page).await?;
        self.publish(&response);
        Ok(response)
    }

    /// Records the query, then shows its first page.
    pub async fn run_search(&self, query: &str) -> Result<Arc<MovieResponse>> {
        self.store.set_search_query(query);
        let response = self.catalog.search(query, 1).await?;
        self.publish(&response);
        Ok(response)
    }

    /// Pages through the current search, or through popular when there is none.
    pub async fn change_page(&self, page: u32) -> Result<Arc<MovieResponse>> {
        let query = self.store.current_state().search_query.clone();
        let response = if query.is_empty() {
            self.catalog.fetch_popular(page).await?
        } else {
            self.catalog.search(&query, page).await?
        };
        self.publish(&response);
        Ok(response)
    }

    pub async fn open_details(&self, id: i64) -> DetailsOutcome {
        match self.catalog.fetch_details(id).await {
            Ok(details) => {
                self.store.set_selected_movie(Some((*details).clone()));
                DetailsOutcome::Shown(details)
            }
            Err(e) => {
                error!("Error loading movie details for {}: {:#}", id, e);
                DetailsOutcome::NavigateHome
            }
        }
    }

    /// Flips membership based on the current snapshot; returns the new membership.
    pub fn toggle_favorite(&self, id: i64) -> bool {
        if self.store.current_state().favorite_movies.contains(&id) {
            self.store.remove_from_favorites(id);
            false
        } else {
            self.store.add_to_favorites(id);
            true
        }
    }

    fn publish(&self, response: &MovieResponse) {
        info!(
            "Showing page {} of {} ({} movies)",
            response.page,
            response.total_pages,
            response.results.len()
        );
        self.store.set_movies(
            response.results.clone(),
            response.page,
            response.total_pages,
        );
    }
}

/// Collapses bursts of search input into the last value after a quiet period,
/// skipping values equal to the previous emission.
pub struct SearchDebouncer {
    input: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl SearchDebouncer {
    pub fn spawn(quiet: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (input, mut raw) = mpsc::unbounded_channel::<String>();
        let (output, settled) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut last_emitted: Option<String> = None;
            while let Some(mut query) = raw.recv().await {
                loop {
                    match tokio::time::timeout(quiet, raw.recv()).await {
                        Ok(Some(newer)) => query = newer,
                        Ok(None) | Err(_) => break,
                    }
                }
                if last_emitted.as_deref() == Some(query.as_str()) {
                    continue;
                }
                last_emitted = Some(query.clone());
                if output.send(query).is_err() {
                    break;
                }
            }
        });
        (Self { input, task }, settled)
    }

    pub fn push(&self, query: impl Into<String>) {
        let _ = self.input.send(query.into());
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
