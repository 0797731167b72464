use std::{fmt, time::Duration};

/// Which candidate sequence served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Pool,
    Subrouter,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKind::Pool => write!(f, "pool"),
            RouteKind::Subrouter => write!(f, "subrouter"),
        }
    }
}

/// Post-hoc description of one dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    pub process_id: String,
    /// Host that answered, or the last host tried on failure
    pub host: String,
    pub route: RouteKind,
    /// Number of hosts contacted (0 in redirect mode)
    pub attempts: usize,
    pub latency: Duration,
    pub success: bool,
}

/// Fire-and-forget receiver of outcome records.
///
/// Errors are logged by the caller and otherwise ignored; they never change
/// the response sent to the client.
pub trait MetricsSink: Send + Sync + 'static {
    fn record(&self, outcome: &OutcomeRecord) -> eyre::Result<()>;
}
