//! Unit Router - a process-affine routing gateway.
//!
//! The router sits in front of an ordered pool of interchangeable hosts (compute or
//! messenger units) and sends every request for a given process to the same host, without
//! any shared state between router instances. When that host is unreachable the request
//! fails over, in a fixed order, to the next host of the pool.
//!
//! # Features
//! - Deterministic placement: FNV-1a of the process id picks the primary host, the rest of
//!   the pool follows in cyclic order
//! - Proxy mode with sequential failover on transport errors, or redirect mode (HTTP 307)
//! - Owner-based override sending all processes of selected owners to a subrouter, with a
//!   TTL cache in front of a GraphQL owner registry (fails open on any registry trouble)
//! - Process id extraction from paths, the `process-id` query parameter or ANS-104 bodies
//! - Configuration from TOML / YAML / JSON with `UNIT_ROUTER_*` environment overrides
//! - Structured tracing via `tracing` and metrics via the `metrics` facade
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use unit_router::{
//!     HttpClientAdapter, RequestDispatcher,
//!     adapters::GraphqlOwnerRegistry,
//!     core::{HostUrl, TtlOwnerCache},
//!     metrics::RecorderSink,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = unit_router::config::loader::load_config("config.toml").await?;
//! let client = Arc::new(HttpClientAdapter::new(Duration::from_secs(5))?);
//! let registry = Arc::new(GraphqlOwnerRegistry::new(
//!     &HostUrl::new("https://arweave.net/graphql")?,
//!     Duration::from_secs(2),
//! )?);
//! let dispatcher = RequestDispatcher::from_config(
//!     &cfg,
//!     client,
//!     registry,
//!     Arc::new(TtlOwnerCache::new(Duration::from_secs(3600))),
//!     Arc::new(RecorderSink),
//! )?;
//! // Wire it into the provided HttpHandler adapter (see binary crate)
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! routing logic inside `core`. Selection is a pure function; the only shared mutable state
//! is the owner cache.
//!
//! # Error Handling
//! Domain layers return `thiserror` enums; the binary boundary uses `eyre` with `WrapErr`
//! context.
//!
//! # Concurrency & Data Structures
//! The owner cache uses `scc::HashMap`; entries are cloned out before any await.
// Re-export public modules with explicit visibility controls
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{GraphqlOwnerRegistry, HttpClientAdapter, HttpHandler},
    core::RequestDispatcher,
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
