use std::{future::IntoFuture, net::SocketAddr, path::Path, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request},
    middleware,
    response::Response,
    routing::any,
    serve::{Listener, ListenerExt},
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tower_http::trace::TraceLayer;
use unit_router::{
    adapters::{
        GraphqlOwnerRegistry, HttpClientAdapter, HttpHandler, NoopOwnerRegistry,
        request_id_middleware, request_timing_middleware,
    },
    config::{
        RouterConfig, RouterConfigValidator, TlsConfig,
        loader::{DEFAULT_CONFIG_TEMPLATE, load_config},
    },
    core::{HostUrl, RequestDispatcher, SubrouterPolicy, TtlOwnerCache},
    metrics::{self, RecorderSink},
    ports::{http_client::HttpClient, owner_registry::OwnerRegistry},
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the router (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

struct AxumListener<S> {
    stream: S,
    local_addr: SocketAddr,
}

impl<S, I, E> Listener for AxumListener<S>
where
    S: futures_util::Stream<Item = Result<(I, SocketAddr), E>> + Unpin + Send + 'static,
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    type Io = I;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.stream.next().await {
                Some(Ok((io, addr))) => return (io, addr),
                Some(Err(e)) => tracing::debug!("Accept error: {}", e),
                None => std::future::pending().await,
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config: RouterConfig = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    tracing_setup::init_tracing(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already; continuing.",
            e
        );
    }

    metrics::init_metrics().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;

    RouterConfigValidator::validate(&config).context("Invalid configuration")?;

    let attempt_timeout = config
        .timeouts
        .attempt_duration()
        .context("Invalid timeouts.attempt")?;
    let http_client: Arc<dyn HttpClient> = Arc::new(
        HttpClientAdapter::new(attempt_timeout).context("Failed to create HTTP client adapter")?,
    );

    let registry: Arc<dyn OwnerRegistry> = match &config.subrouter.registry_url {
        Some(url) => {
            let registry_timeout = config
                .timeouts
                .registry_duration()
                .context("Invalid timeouts.registry")?;
            Arc::new(
                GraphqlOwnerRegistry::new(&HostUrl::new(url)?, registry_timeout)
                    .context("Failed to create owner registry client")?,
            )
        }
        None => Arc::new(NoopOwnerRegistry),
    };

    let cache_ttl = config
        .subrouter
        .cache_ttl_duration()
        .context("Invalid subrouter.cache_ttl")?;
    let owner_cache = Arc::new(TtlOwnerCache::new(cache_ttl));

    let dispatcher = RequestDispatcher::from_config(
        &config,
        http_client,
        registry,
        owner_cache.clone(),
        Arc::new(RecorderSink),
    )
    .context("Failed to build request dispatcher")?;

    let sweeper = dispatcher
        .subrouter_enabled()
        .then(|| owner_cache.clone().spawn_sweeper());

    for host in dispatcher.pool().hosts() {
        tracing::info!(index = host.index(), url = %host.url(), "Configured host");
    }
    tracing::info!(
        "Starting unit router on {} (unit: {}, strategy: {}, hosts: {}, subrouter: {}, TLS: {})",
        config.listen_addr,
        dispatcher.unit(),
        dispatcher.strategy(),
        dispatcher.pool().len(),
        dispatcher.subrouter_enabled(),
        config.tls.is_some()
    );

    let http_handler = Arc::new(HttpHandler::new(
        Arc::new(dispatcher),
        config.tls.is_some(),
    ));

    let make_request_route = |handler: Arc<HttpHandler>| {
        any(
            move |ConnectInfo(client_addr): ConnectInfo<SocketAddr>, req: Request| {
                let handler = handler.clone();
                async move {
                    match handler.handle_request(req, Some(client_addr)).await {
                        Ok(response) => response,
                        Err(e) => {
                            tracing::error!("Request handling error: {:?}", e);
                            Response::builder()
                                .status(500)
                                .body(Body::from("Internal Server Error"))
                                .unwrap_or_else(|_| {
                                    Response::new(Body::from("Internal Server Error"))
                                })
                        }
                    }
                }
            },
        )
    };

    let app = Router::new()
        .route("/{*path}", make_request_route(http_handler.clone()))
        .route("/", make_request_route(http_handler.clone()))
        .layer(middleware::from_fn(request_timing_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let shutdown_for_server = graceful_shutdown.clone();
    let shutdown_signal = async move {
        shutdown_for_server.wait_for_shutdown_signal().await;
    };

    let server_result = match &config.tls {
        Some(tls) => {
            let tls_listener = build_tls_listener(listener, tls)?;
            let server = axum::serve(
                tls_listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal);
            serve_until_drained(server, &graceful_shutdown).await
        }
        None => {
            let server = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal);
            serve_until_drained(server, &graceful_shutdown).await
        }
    };

    if let Some(handle) = sweeper {
        handle.abort();
    }
    server_result?;

    tracing::info!("Graceful shutdown completed");
    tracing_setup::shutdown_tracing();

    Ok(())
}

/// Run the server; after a shutdown signal, in-flight requests get the drain
/// timeout to finish before the remaining connections are dropped.
async fn serve_until_drained<F>(server: F, shutdown: &GracefulShutdown) -> Result<()>
where
    F: IntoFuture<Output = std::io::Result<()>>,
{
    let drain_deadline = async {
        shutdown.wait_for_shutdown_signal().await;
        tokio::time::sleep(shutdown.shutdown_timeout()).await;
    };

    tokio::select! {
        result = server.into_future() => result.context("Server error"),
        _ = drain_deadline => {
            tracing::warn!(
                "In-flight requests did not finish within {:?}; closing remaining connections",
                shutdown.shutdown_timeout()
            );
            Ok(())
        }
    }
}

/// Wrap the TCP listener with rustls using the configured PEM files.
fn build_tls_listener(
    listener: tokio::net::TcpListener,
    tls: &TlsConfig,
) -> Result<
    axum::serve::TapIo<
        AxumListener<tls_listener::TlsListener<tokio::net::TcpListener, tokio_rustls::TlsAcceptor>>,
        impl FnMut(&mut tokio_rustls::server::TlsStream<tokio::net::TcpStream>) + Send + 'static,
    >,
> {
    use std::{fs::File, io::BufReader};

    use rustls::ServerConfig;
    use rustls_pemfile::{certs, pkcs8_private_keys};
    use tls_listener::TlsListener;

    tracing::info!("Starting server with manual TLS");
    let cert_file =
        &mut BufReader::new(File::open(&tls.cert_path).context("failed to open cert file")?);
    let key_file =
        &mut BufReader::new(File::open(&tls.key_path).context("failed to open key file")?);

    let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>()?;
    let key = pkcs8_private_keys(key_file)
        .next()
        .transpose()?
        .ok_or_else(|| eyre!("No PKCS#8 private key found in key file"))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key.into())?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    let local_addr = listener.local_addr().context("Failed to get local addr")?;
    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(config));
    let stream = TlsListener::new(acceptor, listener);

    Ok(AxumListener { stream, local_addr }.tap_io(|_io| {}))
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match RouterConfigValidator::validate(&config) {
        Ok(()) => {
            let subrouter_complete = matches!(
                SubrouterPolicy::from_config(&config.subrouter),
                Ok(Some(_))
            );
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Unit: {}", config.unit);
            println!("   • Strategy: {}", config.strategy);
            println!("   • Hosts: {}", config.hosts.len());
            for (index, host) in config.hosts.iter().enumerate() {
                println!("       {index}. {host}");
            }
            println!("   • Subrouter Override: {subrouter_complete}");
            if config.subrouter.is_partial() {
                println!(
                    "   ⚠️  Subrouter section is incomplete (url, registry_url and owners are all required); the override stays disabled"
                );
            }
            println!("   • TLS Enabled: {}", config.tls.is_some());
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all URLs start with http:// or https://");
            println!("   • List every host exactly once");
            println!("   • Use humantime durations such as '5s' or '1h'");
            println!("   • Verify listen address format (e.g., '127.0.0.1:3000')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'unit-router serve --config {config_path}' to start the router");
    Ok(())
}
