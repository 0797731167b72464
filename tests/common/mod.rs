// Shared helpers: real axum backends, a real gateway, and a closed port.
#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, Request},
    http::{HeaderMap, Method, StatusCode, Uri},
    middleware,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use unit_router::{
    HttpClientAdapter, HttpHandler, RequestDispatcher,
    adapters::request_id_middleware,
    config::RouterConfig,
    core::TtlOwnerCache,
    metrics::RecorderSink,
    ports::owner_registry::OwnerRegistry,
};

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{addr}")
}

/// A host that answers every request with `status` and a JSON echo of what it received.
pub async fn spawn_backend(name: &'static str, status: StatusCode) -> String {
    let app = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| async move {
            let header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            let echo = json!({
                "host": name,
                "method": method.as_str(),
                "uri": uri.to_string(),
                "body": String::from_utf8_lossy(&body),
                "forwarded_for": header("x-forwarded-for"),
                "forwarded_proto": header("x-forwarded-proto"),
                "request_id": header("x-request-id"),
            });
            (status, [("x-served-by", name)], echo.to_string())
        },
    );
    serve(app).await
}

/// URL of a port nothing listens on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Run a full gateway for `config` and return its base URL.
pub async fn spawn_gateway(config: RouterConfig, registry: Arc<dyn OwnerRegistry>) -> String {
    let attempt_timeout = config.timeouts.attempt_duration().unwrap();
    let cache_ttl = config.subrouter.cache_ttl_duration().unwrap();
    let dispatcher = RequestDispatcher::from_config(
        &config,
        Arc::new(HttpClientAdapter::new(attempt_timeout).unwrap()),
        registry,
        Arc::new(TtlOwnerCache::new(cache_ttl)),
        Arc::new(RecorderSink),
    )
    .unwrap();
    let handler = Arc::new(HttpHandler::new(Arc::new(dispatcher), false));

    let app = Router::new()
        .fallback(
            move |ConnectInfo(client_addr): ConnectInfo<SocketAddr>, req: Request| {
                let handler = handler.clone();
                async move { handler.handle_request(req, Some(client_addr)).await.unwrap() }
            },
        )
        .layer(middleware::from_fn(request_id_middleware));
    serve(app).await
}

pub fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub async fn json_body(response: reqwest::Response) -> Value {
    let text = response.text().await.unwrap();
    serde_json::from_str(&text).unwrap_or_else(|_| panic!("not json: {text}"))
}
