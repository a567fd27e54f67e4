// src/main.rs
use agent_gateway::{
    config::{self, Config},
    metrics::MetricsRegistry,
    proxy::Proxy,
    server::{shutdown_signal, RequestHandler, ServerBuilder},
};
use anyhow::{Context, Result};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agent_gateway=info".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path.display());
    }
    let config: Arc<Config> = Arc::new(config::load_config(config_path.as_deref())?);

    // Initialize metrics
    let metrics = match &config.metrics {
        Some(metrics_config) => {
            let registry = MetricsRegistry::new()?;
            let collector = registry.collector();
            let metrics_addr: SocketAddr = ([0, 0, 0, 0], metrics_config.port).into();
            start_metrics_server(metrics_addr, registry, metrics_config.path.clone())?;
            Some(collector)
        }
        None => None,
    };

    let gateway = &config.gateway;
    let proxy = Arc::new(Proxy::new(gateway, metrics)?);

    info!("Forwarding to upstream at {}", proxy.upstream().authority());
    info!("Web UI enabled: {}", proxy.policy().web_ui_enabled());
    info!(
        "API endpoints available: {}",
        proxy.policy().allowed_prefixes().join(", ")
    );

    let handler = RequestHandler::new(proxy);
    let addr: SocketAddr = ([0, 0, 0, 0], gateway.listen_port).into();
    info!("Starting gateway on {}", addr);

    ServerBuilder::new(addr)
        .with_handler(handler)
        .serve(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

fn start_metrics_server(addr: SocketAddr, registry: MetricsRegistry, path: String) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path); // keep this for logging
    let service_path = metrics_path.clone(); // clone for the service closure

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    let mut response = Response::new(Body::empty());
                    if req.uri().path() != path.as_str() {
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        *response.body_mut() = Body::from("Not Found");
                        return Ok::<_, Infallible>(response);
                    }

                    match registry.gather() {
                        Ok(metrics) => {
                            response.headers_mut().insert(
                                CONTENT_TYPE,
                                HeaderValue::from_static("text/plain; version=0.0.4"),
                            );
                            *response.body_mut() = Body::from(metrics);
                        }
                        Err(e) => {
                            error!("Failed to encode metrics: {}", e);
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                        }
                    }
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind metrics server on {}", addr))?
        .serve(make_service);

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}
