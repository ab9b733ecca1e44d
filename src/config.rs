use std::env;
use std::path::PathBuf;

use crate::tmdb::TMDB_BASE;

const DEFAULT_STORAGE_PATH: &str = "cinelist-storage.json";

pub const REQUIRED_ENV: [&str; 1] = ["TMDB_API_KEY"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Only required by commands that talk to TMDB.
    pub api_key: Option<String>,
    pub base_url: String,
    pub storage_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let api_key = env::var("TMDB_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let base_url = env::var("TMDB_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| TMDB_BASE.to_string());
        let storage_path = env::var("CINELIST_STORAGE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH));
        Self {
            api_key,
            base_url,
            storage_path,
        }
    }
}
