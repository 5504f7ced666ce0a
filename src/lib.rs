//! Shieldstats - request statistics and usage charts for an ad-blocking /
//! DNS-filtering service.
//!
//! # Overview
//!
//! Request activity is recorded per category ("all" requests seen and
//! "blocked" requests) in hourly buckets. A downsampler turns one
//! category's buckets into at most fifty plot-ready points for a selected
//! time window, together with the window's request and saved-bandwidth
//! totals. A background refresher keeps the latest chart warm and reacts to
//! new data as it arrives.
//!
//! # Modules
//!
//! - [`model`]: Records, categories, windows, chart points and API bodies
//! - [`window`]: Resolving a time window into begin/end bounds
//! - [`aggregation`]: The downsampler and chart computation
//! - [`storage`]: SQLite statistics store with change notifications
//! - [`refresh`]: Periodic and change-driven chart refresh
//! - [`api`]: HTTP API handlers

pub mod aggregation;
pub mod api;
pub mod model;
pub mod refresh;
pub mod storage;
pub mod window;
