use anyhow::anyhow;
use cinelist::browse::{Browser, DetailsOutcome};
use cinelist::catalog::{MovieCatalog, MAX_CAST, MAX_CREW};
use cinelist::models::{
    CastMember, Credits, CrewMember, DetailsPayload, Movie, MovieDetails, MovieResponse,
};
use cinelist::storage::MemoryStorage;
use cinelist::store::AppStore;
use cinelist::tmdb::TmdbApi;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Default)]
struct FakeTmdb {
    popular_calls: Mutex<Vec<u32>>,
    search_calls: Mutex<Vec<(String, u32)>>,
    details_calls: AtomicUsize,
    fail: AtomicBool,
    /// When set, every request waits for a permit before answering.
    gate: Option<Arc<Semaphore>>,
    cast: usize,
    crew: usize,
}

impl FakeTmdb {
    fn popular_count(&self) -> usize {
        self.popular_calls.lock().unwrap().len()
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }

    fn check_failure(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("/movie/popular -> 503 Service Unavailable: down"));
        }
        Ok(())
    }
}

fn movie(id: i64, title: &str) -> Movie {
    Movie {
        id,
        title: title.to_string(),
        overview: format!("{title} overview"),
        poster_path: format!("/{id}.jpg"),
        backdrop_path: format!("/{id}-wide.jpg"),
        release_date: "2023-01-01".to_string(),
        vote_average: 8.0,
        vote_count: 1000,
        genre_ids: vec![1, 2],
    }
}

fn two_item_page(page: u32) -> MovieResponse {
    MovieResponse {
        page,
        results: vec![movie(1, "First"), movie(2, "Second")],
        total_pages: 10,
        total_results: 100,
    }
}

#[async_trait::async_trait]
impl TmdbApi for FakeTmdb {
    async fn popular(&self, page: u32) -> anyhow::Result<MovieResponse> {
        self.popular_calls.lock().unwrap().push(page);
        self.wait_gate().await;
        self.check_failure()?;
        Ok(two_item_page(page))
    }

    async fn search_movies(&self, query: &str, page: u32) -> anyhow::Result<MovieResponse> {
        self.search_calls
            .lock()
            .unwrap()
            .push((query.to_string(), page));
        self.wait_gate().await;
        self.check_failure()?;
        Ok(MovieResponse {
            page,
            results: vec![movie(30, query)],
            total_pages: 3,
            total_results: 21,
        })
    }

    async fn movie_with_credits(&self, id: i64) -> anyhow::Result<DetailsPayload> {
        self.details_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        self.check_failure()?;
        Ok(DetailsPayload {
            details: MovieDetails {
                movie: movie(id, "Detailed"),
                genres: vec![],
                runtime: 120,
                budget: 1_000_000,
                revenue: 5_000_000,
                production_companies: vec![],
                cast: vec![],
                crew: vec![],
            },
            credits: Some(Credits {
                cast: (0..self.cast)
                    .map(|i| CastMember {
                        id: i as i64,
                        name: format!("Actor {i}"),
                        character: format!("Role {i}"),
                        profile_path: String::new(),
                    })
                    .collect(),
                crew: (0..self.crew)
                    .map(|i| CrewMember {
                        id: i as i64,
                        name: format!("Crew {i}"),
                        job: "Director".to_string(),
                        profile_path: String::new(),
                    })
                    .collect(),
            }),
        })
    }
}

fn catalog_with(fake: FakeTmdb) -> (Arc<MovieCatalog>, Arc<FakeTmdb>) {
    let fake = Arc::new(fake);
    (Arc::new(MovieCatalog::new(fake.clone())), fake)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for condition");
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn distinct_pages_get_distinct_entries() {
    let (catalog, fake) = catalog_with(FakeTmdb::default());
    let first = catalog.fetch_popular(1).await.unwrap();
    let second = catalog.fetch_popular(2).await.unwrap();
    assert_eq!(first.page, 1);
    assert_eq!(second.page, 2);
    assert_eq!(*fake.popular_calls.lock().unwrap(), vec![1, 2]);
    assert_eq!(catalog.cached_entries().await, 2);
}

#[tokio::test]
async fn repeat_fetch_is_served_from_cache_without_loading() {
    let (catalog, fake) = catalog_with(FakeTmdb::default());
    let mut loading = catalog.loading();

    let first = catalog.fetch_popular(1).await.unwrap();
    assert!(loading.has_changed().unwrap());
    loading.borrow_and_update();
    assert!(!catalog.is_loading());

    let second = catalog.fetch_popular(1).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fake.popular_count(), 1);
    assert!(!loading.has_changed().unwrap());
}

#[tokio::test]
async fn clearing_the_cache_forces_a_new_request() {
    let (catalog, fake) = catalog_with(FakeTmdb::default());
    catalog.fetch_popular(1).await.unwrap();
    catalog.clear_cache().await;
    assert_eq!(catalog.cached_entries().await, 0);
    catalog.fetch_popular(1).await.unwrap();
    assert_eq!(fake.popular_count(), 2);
}

#[tokio::test]
async fn blank_search_is_popular() {
    let (catalog, fake) = catalog_with(FakeTmdb::default());
    let popular = catalog.fetch_popular(1).await.unwrap();
    let empty = catalog.search("", 1).await.unwrap();
    let spaces = catalog.search("   ", 1).await.unwrap();
    assert!(Arc::ptr_eq(&popular, &empty));
    assert!(Arc::ptr_eq(&popular, &spaces));
    assert_eq!(fake.popular_count(), 1);
    assert!(fake.search_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn searches_are_cached_per_query_and_page() {
    let (catalog, fake) = catalog_with(FakeTmdb::default());
    catalog.search("alien", 1).await.unwrap();
    catalog.search("alien", 1).await.unwrap();
    catalog.search("alien", 2).await.unwrap();
    catalog.search("aliens", 1).await.unwrap();
    assert_eq!(
        *fake.search_calls.lock().unwrap(),
        vec![
            ("alien".to_string(), 1),
            ("alien".to_string(), 2),
            ("aliens".to_string(), 1)
        ]
    );
}

#[tokio::test]
async fn details_credits_are_bounded() {
    let (catalog, fake) = catalog_with(FakeTmdb {
        cast: 40,
        crew: 12,
        ..FakeTmdb::default()
    });
    let details = catalog.fetch_details(550).await.unwrap();
    assert_eq!(details.cast.len(), MAX_CAST);
    assert_eq!(details.crew.len(), MAX_CREW);
    assert_eq!(details.cast[0].name, "Actor 0");

    let again = catalog.fetch_details(550).await.unwrap();
    assert!(Arc::ptr_eq(&details, &again));
    assert_eq!(fake.details_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn short_credits_are_kept_whole() {
    let (catalog, _) = catalog_with(FakeTmdb {
        cast: 4,
        crew: 2,
        ..FakeTmdb::default()
    });
    let details = catalog.fetch_details(1).await.unwrap();
    assert_eq!(details.cast.len(), 4);
    assert_eq!(details.crew.len(), 2);
}

#[tokio::test]
async fn failures_propagate_and_are_not_cached() {
    let (catalog, fake) = catalog_with(FakeTmdb::default());
    fake.fail.store(true, Ordering::SeqCst);
    let err = catalog.fetch_popular(1).await.unwrap_err();
    assert!(err.to_string().contains("503"));
    assert!(!catalog.is_loading());
    assert_eq!(catalog.cached_entries().await, 0);

    fake.fail.store(false, Ordering::SeqCst);
    catalog.fetch_popular(1).await.unwrap();
    assert_eq!(fake.popular_count(), 2);
}

#[tokio::test]
async fn loading_stays_up_until_the_last_overlapping_request_finishes() {
    let gate = Arc::new(Semaphore::new(0));
    let (catalog, fake) = catalog_with(FakeTmdb {
        gate: Some(gate.clone()),
        ..FakeTmdb::default()
    });

    let first = tokio::spawn({
        let catalog = catalog.clone();
        async move { catalog.fetch_popular(1).await.map(|_| ()) }
    });
    let second = tokio::spawn({
        let catalog = catalog.clone();
        async move { catalog.fetch_popular(2).await.map(|_| ()) }
    });
    wait_until(|| fake.popular_count() == 2).await;
    assert!(catalog.is_loading());

    gate.add_permits(1);
    wait_until(|| first.is_finished() || second.is_finished()).await;
    assert!(catalog.is_loading());

    gate.add_permits(1);
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert!(!catalog.is_loading());
}

#[tokio::test]
async fn duplicate_in_flight_requests_are_not_merged() {
    let gate = Arc::new(Semaphore::new(0));
    let (catalog, fake) = catalog_with(FakeTmdb {
        gate: Some(gate.clone()),
        ..FakeTmdb::default()
    });
    let a = tokio::spawn({
        let catalog = catalog.clone();
        async move { catalog.fetch_popular(1).await.map(|_| ()) }
    });
    let b = tokio::spawn({
        let catalog = catalog.clone();
        async move { catalog.fetch_popular(1).await.map(|_| ()) }
    });
    wait_until(|| fake.popular_count() == 2).await;
    gate.add_permits(2);
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert_eq!(catalog.cached_entries().await, 1);
}

#[tokio::test]
async fn cancelled_request_releases_loading() {
    let gate = Arc::new(Semaphore::new(0));
    let (catalog, fake) = catalog_with(FakeTmdb {
        gate: Some(gate),
        ..FakeTmdb::default()
    });
    let pending = tokio::spawn({
        let catalog = catalog.clone();
        async move { catalog.fetch_popular(1).await.map(|_| ()) }
    });
    wait_until(|| fake.popular_count() == 1).await;
    assert!(catalog.is_loading());
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());
    assert!(!catalog.is_loading());
    assert_eq!(catalog.cached_entries().await, 0);
}

fn browser() -> (Browser, Arc<FakeTmdb>) {
    let (catalog, fake) = catalog_with(FakeTmdb {
        cast: 2,
        crew: 1,
        ..FakeTmdb::default()
    });
    let store = AppStore::new(Arc::new(MemoryStorage::new()));
    (Browser::new(catalog, store), fake)
}

#[tokio::test]
async fn popular_page_lands_in_the_store() {
    let (browser, _) = browser();
    let response = browser.load_popular(1).await.unwrap();
    let state = browser.store().current_state();
    assert_eq!(state.movies, response.results);
    assert_eq!(state.movies.len(), 2);
    assert_eq!(state.current_page, 1);
    assert_eq!(state.total_pages, response.total_pages);
}

#[tokio::test]
async fn paging_follows_the_active_search() {
    let (browser, fake) = browser();
    browser.run_search("heat").await.unwrap();
    assert_eq!(browser.store().current_state().search_query, "heat");

    browser.change_page(2).await.unwrap();
    let state = browser.store().current_state();
    assert_eq!(state.current_page, 2);
    assert_eq!(state.total_pages, 3);
    assert_eq!(
        *fake.search_calls.lock().unwrap(),
        vec![("heat".to_string(), 1), ("heat".to_string(), 2)]
    );

    browser.store().set_search_query("");
    browser.change_page(3).await.unwrap();
    assert_eq!(*fake.popular_calls.lock().unwrap(), vec![3]);
}

#[tokio::test]
async fn opening_details_selects_the_movie() {
    let (browser, _) = browser();
    let DetailsOutcome::Shown(details) = browser.open_details(11).await else {
        panic!("expected details");
    };
    let selected = browser.store().current_state().selected_movie.clone();
    assert_eq!(selected.as_ref(), Some(&*details));
    assert_eq!(details.cast.len(), 2);
}

#[tokio::test]
async fn failed_details_send_the_view_home() {
    let (browser, fake) = browser();
    fake.fail.store(true, Ordering::SeqCst);
    assert_eq!(browser.open_details(11).await, DetailsOutcome::NavigateHome);
    assert!(browser.store().current_state().selected_movie.is_none());
    assert!(!browser.catalog().is_loading());
}

#[tokio::test]
async fn toggling_favorites_flips_membership() {
    let (browser, _) = browser();
    assert!(browser.toggle_favorite(7));
    assert_eq!(browser.store().current_state().favorite_movies, vec![7]);
    assert!(!browser.toggle_favorite(7));
    assert!(browser.store().current_state().favorite_movies.is_empty());
}
