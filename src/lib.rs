//! Per-keyword RSS 2.0 feeds built from aggregated news-trend data.
//!
//! - [`feed`] - data model and XML rendering
//! - [`storage`] - one-file-per-keyword persistence
//! - [`service`] - feed building from aggregation results and read-side queries
//! - [`tools`] - request/response wrappers with coded errors
//! - [`config`] - optional TOML configuration

pub mod config;
pub mod feed;
pub mod service;
pub mod storage;
pub mod tools;
