use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::models::Movie;

pub const HERO_SLIDES: usize = 5;
pub const HERO_MIN_RATING: f64 = 7.0;
pub const AUTO_ADVANCE_PERIOD: Duration = Duration::from_secs(6);

/// Banner candidates: well-rated movies that have a backdrop, in listing order.
pub fn select_hero_movies(movies: &[Movie]) -> Vec<Movie> {
    movies
        .iter()
        .filter(|m| !m.backdrop_path.is_empty() && m.vote_average > HERO_MIN_RATING)
        .take(HERO_SLIDES)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Carousel {
    slides: Vec<Movie>,
    index: usize,
}

impl Carousel {
    pub fn new(slides: Vec<Movie>) -> Self {
        Self { slides, index: 0 }
    }

    pub fn slides(&self) -> &[Movie] {
        &self.slides
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Movie> {
        self.slides.get(self.index)
    }

    pub fn next(&mut self) {
        if !self.slides.is_empty() {
            self.index = (self.index + 1) % self.slides.len();
        }
    }

    pub fn previous(&mut self) {
        if !self.slides.is_empty() {
            self.index = if self.index == 0 {
                self.slides.len() - 1
            } else {
                self.index - 1
            };
        }
    }

    /// Out-of-range indices are ignored.
    pub fn go_to(&mut self, index: usize) {
        if index < self.slides.len() {
            self.index = index;
        }
    }
}

/// Advances a shared carousel on a timer until stopped or dropped.
pub struct AutoAdvance {
    task: JoinHandle<()>,
    advances: Arc<AtomicUsize>,
}

impl AutoAdvance {
    /// Returns `None` when there is nothing to rotate through (fewer than two slides).
    pub fn start(carousel: Arc<Mutex<Carousel>>, period: Duration) -> Option<Self> {
        let slides = carousel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        if slides < 2 {
            debug!("Not starting auto-advance for {} slide(s)", slides);
            return None;
        }
        let advances = Arc::new(AtomicUsize::new(0));
        let counter = advances.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                carousel
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .next();
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        Some(Self { task, advances })
    }

    pub fn advances(&self) -> usize {
        self.advances.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for AutoAdvance {
    fn drop(&mut self) {
        self.task.abort();
    }
}
