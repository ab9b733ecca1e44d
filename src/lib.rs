pub mod auth;
pub mod browse;
pub mod carousel;
pub mod catalog;
pub mod config;
pub mod models;
pub mod storage;
pub mod store;
pub mod tmdb;
pub mod utils;
