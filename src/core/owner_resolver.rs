//! Owner-based subrouter override.
//!
//! Processes whose owner belongs to a configured allow-set are sent to a
//! different downstream router instead of the host pool. The owner comes from
//! an external registry and is cached; any registry trouble fails open to
//! normal pool routing.
use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::{
    config::SubrouterConfig,
    core::{
        host::{Host, HostError, HostUrl},
        process_id::ProcessId,
    },
    metrics,
    ports::{owner_cache::OwnerCache, owner_registry::OwnerRegistry},
};

/// Index reported for the subrouter host, which is not part of the pool.
pub const SUBROUTER_HOST_INDEX: usize = usize::MAX;

/// Fully specified subrouter override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubrouterPolicy {
    subrouter: Host,
    registry_url: HostUrl,
    owners: HashSet<String>,
}

impl SubrouterPolicy {
    pub fn new(
        subrouter_url: &str,
        registry_url: &str,
        owners: impl IntoIterator<Item = String>,
    ) -> Result<Self, HostError> {
        Ok(Self {
            subrouter: Host::new(SUBROUTER_HOST_INDEX, HostUrl::new(subrouter_url)?),
            registry_url: HostUrl::new(registry_url)?,
            owners: owners
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        })
    }

    /// Build the policy from configuration.
    ///
    /// Returns `Ok(None)` unless the subrouter URL, registry URL and a
    /// non-empty owner list are all present: a partial configuration disables
    /// the override entirely. URLs that are present but malformed are an error.
    pub fn from_config(config: &SubrouterConfig) -> Result<Option<Self>, HostError> {
        let owners = config
            .owners
            .as_ref()
            .filter(|owners| owners.iter().any(|o| !o.trim().is_empty()));

        match (&config.url, &config.registry_url, owners) {
            (Some(url), Some(registry_url), Some(owners)) => {
                Self::new(url, registry_url, owners.iter().cloned()).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn subrouter(&self) -> &Host {
        &self.subrouter
    }

    pub fn registry_url(&self) -> &HostUrl {
        &self.registry_url
    }

    pub fn is_overridden(&self, owner: &str) -> bool {
        self.owners.contains(owner)
    }
}

/// Where a request for a process should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Normal deterministic pool routing
    Pool,
    /// Owner is overridden; send everything to this host
    Subrouter(Host),
}

impl RouteDecision {
    pub fn uses_subrouter(&self) -> bool {
        matches!(self, RouteDecision::Subrouter(_))
    }

    pub fn target_host(&self) -> Option<&Host> {
        match self {
            RouteDecision::Pool => None,
            RouteDecision::Subrouter(host) => Some(host),
        }
    }
}

/// Decides pool-vs-subrouter for a process id.
pub struct OwnerResolver {
    policy: Option<SubrouterPolicy>,
    registry: Arc<dyn OwnerRegistry>,
    cache: Arc<dyn OwnerCache>,
    lookup_timeout: Duration,
}

impl OwnerResolver {
    pub fn new(
        policy: Option<SubrouterPolicy>,
        registry: Arc<dyn OwnerRegistry>,
        cache: Arc<dyn OwnerCache>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            policy,
            registry,
            cache,
            lookup_timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.is_some()
    }

    pub fn policy(&self) -> Option<&SubrouterPolicy> {
        self.policy.as_ref()
    }

    pub async fn resolve(&self, process_id: &ProcessId) -> RouteDecision {
        let Some(policy) = &self.policy else {
            return RouteDecision::Pool;
        };

        let owner = match self.cache.get(process_id).await {
            Some(owner) => {
                metrics::increment_owner_lookup("cache_hit");
                owner
            }
            None => match self.fetch_owner(process_id).await {
                Some(owner) => owner,
                None => return RouteDecision::Pool,
            },
        };

        Self::decide(policy, process_id, &owner)
    }

    /// Route a process whose owner is already known, such as a spawn that
    /// carries its signer. The registry is skipped and the owner is cached so
    /// later messages to the process land on the same side.
    pub async fn resolve_with_owner(&self, process_id: &ProcessId, owner: &str) -> RouteDecision {
        let Some(policy) = &self.policy else {
            return RouteDecision::Pool;
        };

        metrics::increment_owner_lookup("data_item");
        self.cache.put(process_id, owner.to_string()).await;
        Self::decide(policy, process_id, owner)
    }

    fn decide(policy: &SubrouterPolicy, process_id: &ProcessId, owner: &str) -> RouteDecision {
        if policy.is_overridden(owner) {
            tracing::debug!(process_id = %process_id, owner = %owner, "owner routed to subrouter");
            RouteDecision::Subrouter(policy.subrouter().clone())
        } else {
            RouteDecision::Pool
        }
    }

    /// Registry lookup bounded by `lookup_timeout`. Only successful answers are cached.
    async fn fetch_owner(&self, process_id: &ProcessId) -> Option<String> {
        match tokio::time::timeout(self.lookup_timeout, self.registry.lookup_owner(process_id))
            .await
        {
            Ok(Ok(Some(owner))) => {
                metrics::increment_owner_lookup("fetched");
                self.cache.put(process_id, owner.clone()).await;
                Some(owner)
            }
            Ok(Ok(None)) => {
                metrics::increment_owner_lookup("not_found");
                tracing::debug!(process_id = %process_id, "owner not found in registry");
                None
            }
            Ok(Err(e)) => {
                metrics::increment_owner_lookup("error");
                tracing::warn!(process_id = %process_id, error = %e, "owner lookup failed; using pool routing");
                None
            }
            Err(_) => {
                metrics::increment_owner_lookup("timeout");
                tracing::warn!(
                    process_id = %process_id,
                    timeout = ?self.lookup_timeout,
                    "owner lookup timed out; using pool routing"
                );
                None
            }
        }
    }
}
