//! Per-request orchestration: extract the process id, decide pool or
//! subrouter, build the candidate sequence, run failover and report the outcome.
use std::{sync::Arc, time::Instant};

use axum::body::Body as AxumBody;
use bytes::Bytes;
use eyre::WrapErr;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{Request, Response};
use thiserror::Error;

use crate::{
    config::{DispatchStrategy, RouterConfig, UnitKind},
    core::{
        failover::{BufferedRequest, FailoverError, FailoverExecutor},
        host::HostPool,
        owner_resolver::{OwnerResolver, RouteDecision, SubrouterPolicy},
        process_id::{PROCESS_ID_QUERY_PARAM, ProcessIdExtractor},
        selector::{CandidateSequence, DeterministicSelector},
    },
    ports::{
        http_client::HttpClient,
        http_server::HandlerError,
        metrics_sink::{MetricsSink, OutcomeRecord, RouteKind},
        owner_cache::OwnerCache,
        owner_registry::OwnerRegistry,
    },
};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("no process id found in path, `{PROCESS_ID_QUERY_PARAM}` query parameter or body")]
    MissingProcessId,

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error(transparent)]
    Failover(#[from] FailoverError),
}

impl From<DispatchError> for HandlerError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::MissingProcessId => HandlerError::BadRequest(err.to_string()),
            DispatchError::BodyTooLarge(_) => HandlerError::PayloadTooLarge(err.to_string()),
            DispatchError::BodyRead(_) => HandlerError::BadRequest(err.to_string()),
            DispatchError::Failover(ref failover) if failover.is_timeout() => {
                HandlerError::GatewayTimeout(err.to_string())
            }
            DispatchError::Failover(FailoverError::EmptySequence) => {
                HandlerError::InternalError(err.to_string())
            }
            DispatchError::Failover(_) => HandlerError::BadGateway(err.to_string()),
        }
    }
}

/// Routes one request end to end.
pub struct RequestDispatcher {
    pool: HostPool,
    strategy: DispatchStrategy,
    extractor: ProcessIdExtractor,
    resolver: OwnerResolver,
    executor: FailoverExecutor,
    metrics: Arc<dyn MetricsSink>,
    max_body_bytes: usize,
}

impl RequestDispatcher {
    pub fn new(
        pool: HostPool,
        strategy: DispatchStrategy,
        extractor: ProcessIdExtractor,
        resolver: OwnerResolver,
        executor: FailoverExecutor,
        metrics: Arc<dyn MetricsSink>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            pool,
            strategy,
            extractor,
            resolver,
            executor,
            metrics,
            max_body_bytes,
        }
    }

    /// Wire a dispatcher from validated configuration and the outer adapters.
    pub fn from_config(
        config: &RouterConfig,
        client: Arc<dyn HttpClient>,
        registry: Arc<dyn OwnerRegistry>,
        cache: Arc<dyn OwnerCache>,
        metrics: Arc<dyn MetricsSink>,
    ) -> eyre::Result<Self> {
        let pool = HostPool::new(config.hosts.as_slice()).wrap_err("Invalid host pool")?;
        let policy = SubrouterPolicy::from_config(&config.subrouter)
            .wrap_err("Invalid subrouter configuration")?;
        if policy.is_none() && config.subrouter.is_partial() {
            tracing::warn!(
                "Subrouter section is incomplete (url, registry_url and owners are all required); owner override disabled"
            );
        }

        let attempt_timeout = config
            .timeouts
            .attempt_duration()
            .wrap_err("Invalid timeouts.attempt")?;
        let registry_timeout = config
            .timeouts
            .registry_duration()
            .wrap_err("Invalid timeouts.registry")?;

        Ok(Self::new(
            pool,
            config.strategy,
            ProcessIdExtractor::new(config.unit),
            OwnerResolver::new(policy, registry, cache, registry_timeout),
            FailoverExecutor::new(client, attempt_timeout),
            metrics,
            config.max_body_bytes,
        ))
    }

    pub fn pool(&self) -> &HostPool {
        &self.pool
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    pub fn unit(&self) -> UnitKind {
        self.extractor.unit()
    }

    pub fn subrouter_enabled(&self) -> bool {
        self.resolver.is_enabled()
    }

    pub async fn dispatch(
        &self,
        request: Request<AxumBody>,
    ) -> Result<Response<AxumBody>, DispatchError> {
        let started = Instant::now();
        let (parts, body) = request.into_parts();
        let body = self.buffer_body(body).await?;

        let extracted = self
            .extractor
            .extract(&parts.uri, &body)
            .ok_or(DispatchError::MissingProcessId)?;
        let process_id = extracted.process_id;
        let span = tracing::Span::current();
        span.record("process.id", process_id.as_str());

        let decision = match extracted.spawn_owner.as_deref() {
            Some(owner) => self.resolver.resolve_with_owner(&process_id, owner).await,
            None => self.resolver.resolve(&process_id).await,
        };
        let (route, sequence) = match decision {
            RouteDecision::Pool => (
                RouteKind::Pool,
                DeterministicSelector::select(&process_id, &self.pool),
            ),
            RouteDecision::Subrouter(host) => {
                (RouteKind::Subrouter, CandidateSequence::single(host))
            }
        };
        span.record("route", route.to_string().as_str());
        tracing::debug!(
            process_id = %process_id,
            route = %route,
            candidates = sequence.len(),
            primary = ?sequence.primary().map(|h| h.url().as_str()),
            "candidate sequence built"
        );

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let buffered = BufferedRequest::new(parts.method, path_and_query, parts.headers, body);

        let result = self
            .executor
            .execute(&sequence, self.strategy, &buffered)
            .await;

        let outcome = match &result {
            Ok(dispatched) => OutcomeRecord {
                process_id: process_id.to_string(),
                host: dispatched.host.url().to_string(),
                route,
                attempts: dispatched.attempts,
                latency: started.elapsed(),
                success: true,
            },
            Err(e) => OutcomeRecord {
                process_id: process_id.to_string(),
                host: e
                    .last_host()
                    .map(|h| h.url().to_string())
                    .unwrap_or_default(),
                route,
                attempts: sequence.len(),
                latency: started.elapsed(),
                success: false,
            },
        };
        if let Err(e) = self.metrics.record(&outcome) {
            tracing::warn!(error = %e, "failed to record dispatch outcome");
        }

        match result {
            Ok(dispatched) => Ok(dispatched.response),
            Err(e) => {
                tracing::error!(process_id = %process_id, route = %route, error = %e, "all candidates failed");
                Err(e.into())
            }
        }
    }

    async fn buffer_body(&self, body: AxumBody) -> Result<Bytes, DispatchError> {
        match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(DispatchError::BodyTooLarge(self.max_body_bytes))
            }
            Err(e) => Err(DispatchError::BodyRead(e.to_string())),
        }
    }
}
