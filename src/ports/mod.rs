//! Ports: the traits the routing core depends on.
//!
//! Adapters in [`crate::adapters`] (and [`crate::metrics`]) implement them;
//! tests substitute in-memory fakes.
pub mod http_client;
pub mod http_server;
pub mod metrics_sink;
pub mod owner_cache;
pub mod owner_registry;

pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
pub use http_server::HandlerError;
pub use metrics_sink::{MetricsSink, OutcomeRecord, RouteKind};
pub use owner_cache::OwnerCache;
pub use owner_registry::{OwnerRegistry, RegistryError};
