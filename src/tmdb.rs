use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::models::{DetailsPayload, MovieResponse};

pub const TMDB_BASE: &str = "https://api.themoviedb.org/3";

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

/// The remote calls the catalog needs. Implemented by [`TmdbClient`] and by test fakes.
#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn popular(&self, page: u32) -> Result<MovieResponse>;
    async fn search_movies(&self, query: &str, page: u32) -> Result<MovieResponse>;
    async fn movie_with_credits(&self, id: i64) -> Result<DetailsPayload>;
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let user_agent = format!("cinelist/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api_key.clone().context("TMDB_API_KEY not set")?;
        Self::new(api_key, config.base_url.clone())
    }

    /// `endpoint` is the path without the query string, so errors never echo the api key.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &str,
    ) -> Result<T> {
        let url = format!(
            "{}{endpoint}?api_key={}{query}",
            self.base_url, self.api_key
        );
        debug!(endpoint = %endpoint, "TMDB request");
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("request to {endpoint} failed"))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("reading body failed")?;
        if !status.is_success() {
            return Err(anyhow!("{} -> {}: {}", endpoint, status, text));
        }
        let parsed: T = serde_json::from_str(&text)
            .with_context(|| format!("JSON parse failed for {endpoint}"))?;
        Ok(parsed)
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn popular(&self, page: u32) -> Result<MovieResponse> {
        self.get_json("/movie/popular", &format!("&page={page}"))
            .await
    }

    async fn search_movies(&self, query: &str, page: u32) -> Result<MovieResponse> {
        let params = format!("&query={}&page={page}", urlencoding::encode(query));
        self.get_json("/search/movie", &params).await
    }

    async fn movie_with_credits(&self, id: i64) -> Result<DetailsPayload> {
        self.get_json(&format!("/movie/{id}"), "&append_to_response=credits")
            .await
    }
}
