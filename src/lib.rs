//! Prometheus exporter for Colorado DWR streamflow telemetry.
//!
//! On each `/metrics` request, the exporter scrapes the DWR telemetry REST
//! API for every configured streamflow gauge (bounded concurrency, retries
//! with backoff per gauge) and serves the resulting snapshot as Prometheus
//! gauges.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ gauges file  │────>│     Scraper      │────>│ MetricsRegistry │
//! │   (JSON5)    │     │ (bounded fan-out)│     │   + /metrics    │
//! └──────────────┘     └──────────────────┘     └─────────────────┘
//!                               │
//!                               v
//!                      ┌──────────────────┐
//!                      │   DWR REST API   │
//!                      │ (retry/backoff)  │
//!                      └──────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! dwr-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod client;
pub mod config;
pub mod fetcher;
pub mod gauges;
pub mod http;
pub mod registry;
pub mod scraper;

pub use client::{FetchError, ReqwestTransport, RetryPolicy, RetryingClient};
pub use config::ExporterConfig;
pub use fetcher::{DwrFetcher, FailureReason, FetchGauge, FetchOutcome};
pub use gauges::{GaugeTarget, load_gauges};
pub use http::HttpServer;
pub use registry::{MetricsRegistry, SharedRegistry};
pub use scraper::{Scraper, Snapshot, SnapshotEntry};
