// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::server::handler::RequestHandler;
use crate::server::listener::bind_tcp;
use anyhow::{Context, Result};
use hyper::server::conn::Http;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Builder pattern so `main.rs` can inject its Proxy-backed handler.
pub struct ServerBuilder {
    addr: SocketAddr,
    handler: Option<RequestHandler>,
}

impl ServerBuilder {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, handler: None }
    }

    pub fn with_handler(mut self, handler: RequestHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Bind the listener (failing loudly) and serve until `shutdown` resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let handler = self
            .handler
            .context("handler must be set via with_handler()")?;

        let listener = bind_tcp(self.addr).await?;
        tracing::info!("HTTP server listening on {}", self.addr);

        serve_listener(listener, handler, shutdown).await
    }
}

/// Accept loop over an already-bound listener. In-flight connections keep
/// running on their own tasks after shutdown stops the loop.
pub async fn serve_listener(
    listener: TcpListener,
    handler: RequestHandler,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::warn!(%err, "accept failed");
                    continue;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("No longer accepting connections");
                return Ok(());
            }
        };
        let svc = handler.for_peer(peer);

        // One Tokio task per connection; upgrades are handed back to the proxy.
        tokio::spawn(async move {
            let http = Http::new();
            if let Err(err) = http.serve_connection(stream, svc).with_upgrades().await {
                tracing::debug!(%peer, %err, "connection error");
            }
        });
    }
}
