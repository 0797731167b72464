use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    core::{host::HostUrl, process_id::ProcessId},
    ports::owner_registry::{OwnerRegistry, RegistryError},
};

const OWNER_QUERY: &str =
    "query($ids: [ID!]!) { transactions(ids: $ids) { edges { node { owner { address } } } } }";

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'static str,
    variables: Variables<'a>,
}

#[derive(Serialize)]
struct Variables<'a> {
    ids: [&'a str; 1],
}

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<TransactionsData>,
    #[serde(default)]
    errors: Vec<GraphqlErrorMessage>,
}

#[derive(Deserialize)]
struct GraphqlErrorMessage {
    message: String,
}

#[derive(Deserialize)]
struct TransactionsData {
    transactions: Transactions,
}

#[derive(Deserialize)]
struct Transactions {
    edges: Vec<Edge>,
}

#[derive(Deserialize)]
struct Edge {
    node: Node,
}

#[derive(Deserialize)]
struct Node {
    owner: Owner,
}

#[derive(Deserialize)]
struct Owner {
    address: String,
}

/// Owner registry backed by an Arweave-style GraphQL gateway.
pub struct GraphqlOwnerRegistry {
    endpoint: String,
    client: Client,
}

impl GraphqlOwnerRegistry {
    pub fn new(endpoint: &HostUrl, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("unit-router/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build registry HTTP client")?;

        Ok(Self {
            endpoint: endpoint.as_str().to_string(),
            client,
        })
    }

    fn owner_from(response: GraphqlResponse) -> Result<Option<String>, RegistryError> {
        if let Some(error) = response.errors.first() {
            return Err(RegistryError::Malformed(format!(
                "GraphQL error: {}",
                error.message
            )));
        }
        let data = response
            .data
            .ok_or_else(|| RegistryError::Malformed("response has no data".to_string()))?;

        Ok(data
            .transactions
            .edges
            .into_iter()
            .next()
            .map(|edge| edge.node.owner.address))
    }
}

#[async_trait]
impl OwnerRegistry for GraphqlOwnerRegistry {
    async fn lookup_owner(&self, process_id: &ProcessId) -> Result<Option<String>, RegistryError> {
        let request = GraphqlRequest {
            query: OWNER_QUERY,
            variables: Variables {
                ids: [process_id.as_str()],
            },
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RegistryError::Status(status.as_u16()));
        }

        let body = resp
            .json::<GraphqlResponse>()
            .await
            .map_err(|e| RegistryError::Malformed(e.to_string()))?;

        let owner = Self::owner_from(body)?;
        tracing::debug!(process_id = %process_id, owner = ?owner, "registry lookup complete");
        Ok(owner)
    }
}

/// Registry wired in when the subrouter override is disabled; it is never consulted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOwnerRegistry;

#[async_trait]
impl OwnerRegistry for NoopOwnerRegistry {
    async fn lookup_owner(&self, _process_id: &ProcessId) -> Result<Option<String>, RegistryError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::post};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;

    async fn graphql(Json(request): Json<Value>) -> axum::response::Response {
        assert!(
            request["query"]
                .as_str()
                .unwrap_or_default()
                .contains("transactions(ids: $ids)")
        );
        match request["variables"]["ids"][0].as_str().unwrap_or_default() {
            "known" => Json(json!({
                "data": { "transactions": { "edges": [
                    { "node": { "owner": { "address": "vip-address" } } }
                ] } }
            }))
            .into_response(),
            "unknown" => Json(json!({ "data": { "transactions": { "edges": [] } } })).into_response(),
            "errors" => Json(json!({ "errors": [ { "message": "rate limited" } ] })).into_response(),
            "garbage" => "not json".into_response(),
            _ => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        }
    }

    async fn registry() -> GraphqlOwnerRegistry {
        let app = Router::new().route("/graphql", post(graphql));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let endpoint = HostUrl::new(&format!("http://{addr}/graphql")).unwrap();
        GraphqlOwnerRegistry::new(&endpoint, Duration::from_secs(2)).unwrap()
    }

    fn pid(s: &str) -> ProcessId {
        ProcessId::new(s).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lookup_known_owner() {
        let registry = registry().await;
        assert_eq!(
            registry.lookup_owner(&pid("known")).await.unwrap(),
            Some("vip-address".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lookup_without_edges_is_not_found() {
        let registry = registry().await;
        assert_eq!(registry.lookup_owner(&pid("unknown")).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_error_status() {
        let registry = registry().await;
        assert!(matches!(
            registry.lookup_owner(&pid("down")).await,
            Err(RegistryError::Status(503))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_payloads() {
        let registry = registry().await;
        assert!(matches!(
            registry.lookup_owner(&pid("garbage")).await,
            Err(RegistryError::Malformed(_))
        ));
        assert!(matches!(
            registry.lookup_owner(&pid("errors")).await,
            Err(RegistryError::Malformed(message)) if message.contains("rate limited")
        ));
    }

    #[tokio::test]
    async fn test_unreachable_registry() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = HostUrl::new(&format!("http://{addr}/graphql")).unwrap();
        let registry = GraphqlOwnerRegistry::new(&endpoint, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            registry.lookup_owner(&pid("known")).await,
            Err(RegistryError::Request(_))
        ));
    }
}
